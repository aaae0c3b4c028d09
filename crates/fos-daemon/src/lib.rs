//! # fos-daemon
//!
//! The network surface of the file operation service: JSON-RPC 2.0
//! dispatch over HTTP POST, plus a health endpoint for probes.
//!
//! The daemon owns no state of its own — everything lives in the
//! filesystem tree under the configured root and in the external lock
//! coordinator. Requests are served concurrently; coordination exists
//! only where `fos-core` requires it (append leases).

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod health;
pub mod http;
pub mod rpc;
