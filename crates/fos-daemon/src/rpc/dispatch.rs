//! Request dispatch: envelope handling, method routing, parameter
//! binding, and error translation.
//!
//! The dispatcher is transport-agnostic — it consumes a raw body and
//! produces an optional response body. Batches are processed
//! sequentially in request order, so the response array lines up with
//! the non-notification sub-requests. Each sub-request runs under the
//! request-scoped deadline; exceeding it yields `-32603` and any
//! partially completed filesystem side effects stay as they are.

use std::sync::Arc;
use std::time::Duration;

use fos_core::error::FsError;
use fos_core::ops::FileOps;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use super::envelope::{Envelope, INTERNAL_ERROR, INVALID_PARAMS, Response, RpcError};

/// Default per-request deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Routes JSON-RPC requests to file operations.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    ops: Arc<FileOps>,
    request_timeout: Duration,
}

impl Dispatcher {
    /// Creates a dispatcher with the default request deadline.
    #[must_use]
    pub fn new(ops: Arc<FileOps>) -> Self {
        Self {
            ops,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Overrides the per-request deadline.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Handles a raw request body.
    ///
    /// Returns `None` when no response body must be written (a single
    /// notification, or a batch consisting entirely of notifications).
    pub async fn handle(&self, body: &[u8]) -> Option<String> {
        let parsed: Value = match serde_json::from_slice(body) {
            Ok(value) => value,
            Err(error) => {
                debug!(%error, "request body is not valid JSON");
                return serialize(&Response::failure(
                    Value::Null,
                    RpcError::parse_error(error),
                ));
            },
        };

        match parsed {
            Value::Array(elements) => {
                if elements.is_empty() {
                    return serialize(&Response::failure(
                        Value::Null,
                        RpcError::invalid_request("batch must not be empty"),
                    ));
                }
                let mut responses = Vec::new();
                for element in &elements {
                    if let Some(response) = self.handle_element(element).await {
                        responses.push(response);
                    }
                }
                if responses.is_empty() {
                    None
                } else {
                    serialize(&responses)
                }
            },
            element @ Value::Object(_) => {
                let response = self.handle_element(&element).await?;
                serialize(&response)
            },
            _ => {
                debug!("request body is neither an object nor an array");
                serialize(&Response::failure(
                    Value::Null,
                    RpcError::invalid_request("request must be an object or a non-empty array"),
                ))
            },
        }
    }

    /// Handles one batch element; `None` means notification, no
    /// response.
    async fn handle_element(&self, element: &Value) -> Option<Response> {
        let envelope = match Envelope::parse(element) {
            Ok(envelope) => envelope,
            // A malformed element cannot be identified as a
            // notification, so it always gets an error response.
            Err(response) => return Some(response),
        };

        let respond_id = envelope.respond_id();
        let is_notification = envelope.is_notification();
        trace!(method = %envelope.method, notification = is_notification, "dispatching");

        let outcome = tokio::time::timeout(
            self.request_timeout,
            self.invoke(&envelope.method, envelope.params.as_ref()),
        )
        .await;

        let response = match outcome {
            Ok(Ok(result)) => Response::success(respond_id, result),
            Ok(Err(error)) => Response::failure(respond_id, error),
            Err(_elapsed) => {
                debug!(method = %envelope.method, "request deadline exceeded");
                Response::failure(respond_id, RpcError::deadline_exceeded())
            },
        };

        if is_notification { None } else { Some(response) }
    }

    /// Binds parameters and invokes the matched operation.
    async fn invoke(&self, method: &str, params: Option<&Value>) -> Result<Value, RpcError> {
        let params = Params::new(params);
        match method {
            "getFileInfo" => {
                let path = params.string(0, "path")?;
                params.expect_arity(1)?;
                let info = self.ops.stat(&path).map_err(translate)?;
                to_json(&info)
            },
            "listDirectory" => {
                let path = params.string(0, "path")?;
                params.expect_arity(1)?;
                let entries = self.ops.list(&path).map_err(translate)?;
                to_json(&entries)
            },
            "create" => {
                let path = params.string(0, "path")?;
                let entry_type = params.string(1, "type")?;
                params.expect_arity(2)?;
                match entry_type.as_str() {
                    "FILE" => self.ops.create_file(&path).map_err(translate)?,
                    "DIRECTORY" => self.ops.create_dir(&path).map_err(translate)?,
                    other => {
                        return Err(RpcError::invalid_params(format!(
                            "type must be FILE or DIRECTORY, got {other:?}"
                        )));
                    },
                }
                Ok(Value::Bool(true))
            },
            "delete" => {
                let path = params.string(0, "path")?;
                let recursive = params.boolean(1, "recursive")?;
                params.expect_arity(2)?;
                let removed = self.ops.delete(&path, recursive).map_err(translate)?;
                Ok(Value::Bool(removed))
            },
            "move" => {
                let source = params.string(0, "sourcePath")?;
                let target = params.string(1, "targetPath")?;
                params.expect_arity(2)?;
                self.ops.rename(&source, &target).map_err(translate)?;
                Ok(Value::Bool(true))
            },
            "copy" => {
                let source = params.string(0, "sourcePath")?;
                let target = params.string(1, "targetPath")?;
                params.expect_arity(2)?;
                self.ops.copy(&source, &target).map_err(translate)?;
                Ok(Value::Bool(true))
            },
            "append" => {
                let path = params.string(0, "path")?;
                let data = params.string(1, "data")?;
                params.expect_arity(2)?;
                self.ops.append(&path, &data).await.map_err(translate)?;
                Ok(Value::Bool(true))
            },
            "read" => {
                let path = params.string(0, "path")?;
                let offset = params.integer(1, "offset")?;
                let length = params.integer(2, "length")?;
                params.expect_arity(3)?;
                let contents = self.ops.read(&path, offset, length).map_err(translate)?;
                Ok(Value::String(contents))
            },
            other => Err(RpcError::method_not_found(other)),
        }
    }
}

/// Translates a core error into the protocol error table.
fn translate(error: FsError) -> RpcError {
    let (code, message) = if error.is_invalid_input() {
        (INVALID_PARAMS, "Invalid params")
    } else {
        (INTERNAL_ERROR, "Internal error")
    };
    RpcError {
        code,
        message: message.to_string(),
        data: Some(serde_json::json!({
            "kind": error.kind(),
            "detail": error.to_string(),
        })),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError {
        code: INTERNAL_ERROR,
        message: "Internal error".to_string(),
        data: Some(serde_json::json!({
            "kind": "IOError",
            "detail": format!("result serialization failed: {e}"),
        })),
    })
}

fn serialize<T: serde::Serialize>(value: &T) -> Option<String> {
    match serde_json::to_string(value) {
        Ok(body) => Some(body),
        Err(error) => {
            // Response types serialize infallibly in practice; emit a
            // last-resort error body rather than an empty reply.
            tracing::error!(%error, "failed to serialize response body");
            Some(
                r#"{"jsonrpc":"2.0","error":{"code":-32603,"message":"Internal error"},"id":null}"#
                    .to_string(),
            )
        },
    }
}

/// Uniform access to positional (array) or named (object) parameters.
struct Params<'a> {
    positional: Option<&'a Vec<Value>>,
    named: Option<&'a Map<String, Value>>,
}

impl<'a> Params<'a> {
    fn new(params: Option<&'a Value>) -> Self {
        Self {
            positional: params.and_then(Value::as_array),
            named: params.and_then(Value::as_object),
        }
    }

    fn get(&self, index: usize, name: &str) -> Result<&'a Value, RpcError> {
        if let Some(list) = self.positional {
            return list
                .get(index)
                .ok_or_else(|| RpcError::invalid_params(format!("missing parameter: {name}")));
        }
        if let Some(map) = self.named {
            return map
                .get(name)
                .ok_or_else(|| RpcError::invalid_params(format!("missing parameter: {name}")));
        }
        Err(RpcError::invalid_params(format!(
            "missing parameter: {name}"
        )))
    }

    fn string(&self, index: usize, name: &str) -> Result<String, RpcError> {
        self.get(index, name)?
            .as_str()
            .map(ToOwned::to_owned)
            .ok_or_else(|| RpcError::invalid_params(format!("{name} must be a string")))
    }

    fn boolean(&self, index: usize, name: &str) -> Result<bool, RpcError> {
        self.get(index, name)?
            .as_bool()
            .ok_or_else(|| RpcError::invalid_params(format!("{name} must be a boolean")))
    }

    fn integer(&self, index: usize, name: &str) -> Result<i64, RpcError> {
        self.get(index, name)?
            .as_i64()
            .ok_or_else(|| RpcError::invalid_params(format!("{name} must be an integer")))
    }

    /// Rejects surplus positional arguments. Named parameters beyond
    /// the bound set are tolerated, matching common client behavior.
    fn expect_arity(&self, expected: usize) -> Result<(), RpcError> {
        if let Some(list) = self.positional {
            if list.len() != expected {
                return Err(RpcError::invalid_params(format!(
                    "expected {expected} parameters, got {}",
                    list.len()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use fos_core::lock::{LockClient, MemoryLockBackend};
    use fos_core::path::RootDir;
    use serde_json::json;
    use tempfile::TempDir;

    use super::super::envelope::{INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR};
    use super::*;

    struct Fixture {
        _dir: TempDir,
        dispatcher: Dispatcher,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = RootDir::new(dir.path().canonicalize().unwrap()).unwrap();
        let locks = LockClient::new(Arc::new(MemoryLockBackend::new()))
            .with_retry(2, Duration::from_millis(2));
        Fixture {
            dispatcher: Dispatcher::new(Arc::new(FileOps::new(root, locks))),
            _dir: dir,
        }
    }

    async fn call(f: &Fixture, body: Value) -> Value {
        let raw = f
            .dispatcher
            .handle(body.to_string().as_bytes())
            .await
            .expect("expected a response body");
        serde_json::from_str(&raw).unwrap()
    }

    fn request(method: &str, params: Value, id: i64) -> Value {
        json!({"jsonrpc": "2.0", "method": method, "params": params, "id": id})
    }

    #[tokio::test]
    async fn malformed_json_yields_parse_error() {
        let f = fixture();
        let response = serde_json::from_str::<Value>(
            &f.dispatcher.handle(b"{not json").await.unwrap(),
        )
        .unwrap();
        assert_eq!(response["error"]["code"], json!(PARSE_ERROR));
        assert_eq!(response["id"], Value::Null);
    }

    #[tokio::test]
    async fn non_envelope_bodies_are_invalid_requests() {
        let f = fixture();
        for body in [json!("hello"), json!(42), json!([])] {
            let response = call(&f, body.clone()).await;
            assert_eq!(response["error"]["code"], json!(INVALID_REQUEST), "{body}");
        }
    }

    #[tokio::test]
    async fn unknown_method_not_found() {
        let f = fixture();
        let response = call(&f, request("chmod", json!(["a"]), 1)).await;
        assert_eq!(response["error"]["code"], json!(METHOD_NOT_FOUND));
        assert_eq!(response["id"], json!(1));
    }

    #[tokio::test]
    async fn create_stat_delete_lifecycle() {
        let f = fixture();

        let created = call(&f, request("create", json!(["test.txt", "FILE"]), 1)).await;
        assert_eq!(created["result"], json!(true));

        let info = call(&f, request("getFileInfo", json!(["test.txt"]), 2)).await;
        assert_eq!(
            info["result"],
            json!({"name": "test.txt", "path": "test.txt", "size": 0})
        );

        let deleted = call(&f, request("delete", json!(["test.txt", true]), 3)).await;
        assert_eq!(deleted["result"], json!(true));

        let again = call(&f, request("delete", json!(["test.txt", true]), 4)).await;
        assert_eq!(again["result"], json!(false));
    }

    #[tokio::test]
    async fn named_parameters_bind() {
        let f = fixture();
        let created = call(
            &f,
            request("create", json!({"path": "n.txt", "type": "FILE"}), 1),
        )
        .await;
        assert_eq!(created["result"], json!(true));

        let read = call(
            &f,
            request(
                "read",
                json!({"path": "n.txt", "offset": 0, "length": 16}),
                2,
            ),
        )
        .await;
        assert_eq!(read["result"], json!(""));
    }

    #[tokio::test]
    async fn bad_create_type_is_invalid_params() {
        let f = fixture();
        let response = call(&f, request("create", json!(["x", "SYMLINK"]), 1)).await;
        assert_eq!(response["error"]["code"], json!(INVALID_PARAMS));
    }

    #[tokio::test]
    async fn wrong_arity_and_types_are_invalid_params() {
        let f = fixture();
        for params in [
            json!([]),
            json!(["a", "FILE", "extra"]),
            json!([42, "FILE"]),
            json!({"path": "a"}),
        ] {
            let response = call(&f, request("create", params.clone(), 9)).await;
            assert_eq!(
                response["error"]["code"],
                json!(INVALID_PARAMS),
                "{params}"
            );
        }

        let response = call(&f, request("delete", json!(["a", "yes"]), 1)).await;
        assert_eq!(response["error"]["code"], json!(INVALID_PARAMS));

        let response = call(&f, request("read", json!(["a", "0", 5]), 1)).await;
        assert_eq!(response["error"]["code"], json!(INVALID_PARAMS));
    }

    #[tokio::test]
    async fn escape_attempt_maps_to_invalid_params_with_kind() {
        let f = fixture();
        let response = call(&f, request("getFileInfo", json!(["../../etc/passwd"]), 5)).await;
        assert_eq!(response["error"]["code"], json!(INVALID_PARAMS));
        assert_eq!(response["error"]["data"]["kind"], json!("PathEscape"));
        assert_eq!(response["error"]["message"], json!("Invalid params"));
    }

    #[tokio::test]
    async fn internal_error_kinds_are_discriminated() {
        let f = fixture();
        let response = call(&f, request("getFileInfo", json!(["missing.txt"]), 6)).await;
        assert_eq!(response["error"]["code"], json!(INTERNAL_ERROR));
        assert_eq!(response["error"]["data"]["kind"], json!("NotFound"));
        assert_eq!(response["error"]["message"], json!("Internal error"));
    }

    #[tokio::test]
    async fn append_then_windowed_read() {
        let f = fixture();
        call(&f, request("create", json!(["t", "DIRECTORY"]), 1)).await;
        call(&f, request("create", json!(["t/x.txt", "FILE"]), 2)).await;

        let appended = call(&f, request("append", json!(["t/x.txt", "Hello"]), 3)).await;
        assert_eq!(appended["result"], json!(true));
        call(&f, request("append", json!(["t/x.txt", " world!"]), 4)).await;

        let full = call(&f, request("read", json!(["t/x.txt", 0, 10000]), 5)).await;
        assert_eq!(full["result"], json!("Hello world!"));

        let window = call(&f, request("read", json!(["t/x.txt", 6, 5]), 6)).await;
        assert_eq!(window["result"], json!("world"));
    }

    #[tokio::test]
    async fn single_notification_produces_no_body() {
        let f = fixture();
        let out = f
            .dispatcher
            .handle(
                json!({"jsonrpc": "2.0", "method": "create", "params": ["n.txt", "FILE"]})
                    .to_string()
                    .as_bytes(),
            )
            .await;
        assert!(out.is_none());
        // The side effect still happened.
        let info = call(&f, request("getFileInfo", json!(["n.txt"]), 1)).await;
        assert_eq!(info["result"]["size"], json!(0));
    }

    #[tokio::test]
    async fn batch_mixes_requests_and_notifications() {
        let f = fixture();
        let body = json!([
            {"jsonrpc": "2.0", "method": "create", "params": ["a", "FILE"], "id": 1},
            {"jsonrpc": "2.0", "method": "delete", "params": ["a", true]},
        ]);
        let response = call(&f, body).await;
        let array = response.as_array().unwrap();
        assert_eq!(array.len(), 1);
        assert_eq!(array[0]["id"], json!(1));
        assert_eq!(array[0]["result"], json!(true));
    }

    #[tokio::test]
    async fn all_notification_batch_produces_no_body() {
        let f = fixture();
        let body = json!([
            {"jsonrpc": "2.0", "method": "create", "params": ["a", "FILE"]},
            {"jsonrpc": "2.0", "method": "create", "params": ["b", "FILE"]},
        ]);
        assert!(
            f.dispatcher
                .handle(body.to_string().as_bytes())
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn batch_responses_preserve_request_order() {
        let f = fixture();
        let body = json!([
            request("create", json!(["one", "FILE"]), 11),
            request("getFileInfo", json!(["one"]), 12),
            request("getFileInfo", json!(["two"]), 13),
        ]);
        let response = call(&f, body).await;
        let ids: Vec<&Value> = response
            .as_array()
            .unwrap()
            .iter()
            .map(|r| &r["id"])
            .collect();
        assert_eq!(ids, [&json!(11), &json!(12), &json!(13)]);
        assert_eq!(response[2]["error"]["data"]["kind"], json!("NotFound"));
    }

    #[tokio::test]
    async fn malformed_batch_element_gets_its_own_error() {
        let f = fixture();
        let body = json!([
            request("create", json!(["ok.txt", "FILE"]), 1),
            "not an object",
        ]);
        let response = call(&f, body).await;
        let array = response.as_array().unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array[0]["result"], json!(true));
        assert_eq!(array[1]["error"]["code"], json!(INVALID_REQUEST));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_exceeded_maps_to_internal_error() {
        struct StallingBackend;

        #[async_trait::async_trait]
        impl fos_core::lock::LockBackend for StallingBackend {
            async fn set_if_absent(
                &self,
                _key: &str,
                _token: &str,
                _ttl: Duration,
            ) -> Result<bool, fos_core::lock::LockBackendError> {
                // Slower than the request deadline below.
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(true)
            }

            async fn delete(
                &self,
                _key: &str,
            ) -> Result<(), fos_core::lock::LockBackendError> {
                Ok(())
            }
        }

        impl std::fmt::Debug for StallingBackend {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("StallingBackend")
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let root = RootDir::new(dir.path().canonicalize().unwrap()).unwrap();
        let locks = LockClient::new(Arc::new(StallingBackend));
        let dispatcher = Dispatcher::new(Arc::new(FileOps::new(root, locks)))
            .with_request_timeout(Duration::from_millis(50));

        let raw = dispatcher
            .handle(
                json!({"jsonrpc": "2.0", "method": "append", "params": ["x", "y"], "id": 1})
                    .to_string()
                    .as_bytes(),
            )
            .await
            .unwrap();
        let response: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(response["error"]["code"], json!(INTERNAL_ERROR));
        assert_eq!(response["error"]["data"]["kind"], json!("DeadlineExceeded"));
    }
}
