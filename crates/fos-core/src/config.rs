//! Service configuration and validation.
//!
//! The daemon resolves raw values from its CLI/environment layer and
//! hands them here; this module owns validation and normalization so a
//! misconfigured process fails at startup with a descriptive message
//! instead of failing requests later.

use std::path::PathBuf;

/// Lock coordinator connection settings.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Coordinator hostname.
    pub host: String,
    /// Coordinator TCP port.
    pub port: u16,
    /// Coordinator password.
    pub password: String,
}

/// Validated process configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Canonicalized root directory bounding all file operations.
    pub root_dir: PathBuf,
    /// Lock coordinator settings.
    pub redis: RedisConfig,
}

/// Startup configuration failures.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// No root directory was supplied by any configuration source.
    #[error(
        "root directory must be configured via command line or the FOS_ROOT_DIR environment variable"
    )]
    MissingRootDir,

    /// The root directory does not exist or is not a directory.
    #[error("root directory must exist and be a directory: {path}")]
    InvalidRootDir {
        /// The supplied path.
        path: String,
    },

    /// The root directory could not be canonicalized.
    #[error("failed to canonicalize root directory {path}: {source}")]
    CanonicalizeRootDir {
        /// The supplied path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// No coordinator host was supplied.
    #[error(
        "coordinator host must be configured via command line or the FOS_REDIS_HOST environment variable"
    )]
    MissingRedisHost,

    /// The coordinator port was missing or not a valid port number.
    #[error("coordinator port must be an integer between 1 and 65535, got {value:?}")]
    InvalidRedisPort {
        /// The supplied value, if any.
        value: Option<String>,
    },

    /// No coordinator password was supplied.
    #[error(
        "coordinator password must be configured via command line or the FOS_REDIS_PASSWORD environment variable"
    )]
    MissingRedisPassword,
}

impl ServiceConfig {
    /// Validates raw configuration values into a [`ServiceConfig`].
    ///
    /// The root directory must exist and be a directory; it is
    /// canonicalized so the prefix check in path resolution works
    /// against a stable absolute form. The port must parse into
    /// 1–65535 and the password must be non-empty.
    ///
    /// # Errors
    ///
    /// A [`ConfigError`] describing the first missing or invalid
    /// value.
    pub fn resolve(
        root_dir: Option<String>,
        redis_host: Option<String>,
        redis_port: Option<String>,
        redis_password: Option<String>,
    ) -> Result<Self, ConfigError> {
        let root_raw = root_dir
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingRootDir)?;

        let root_path = PathBuf::from(&root_raw);
        if !root_path.is_dir() {
            return Err(ConfigError::InvalidRootDir { path: root_raw });
        }
        let root_dir =
            root_path
                .canonicalize()
                .map_err(|source| ConfigError::CanonicalizeRootDir {
                    path: root_raw,
                    source,
                })?;

        let host = redis_host
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingRedisHost)?;

        let port = match &redis_port {
            Some(raw) => match raw.trim().parse::<u16>() {
                Ok(port) if port > 0 => port,
                _ => {
                    return Err(ConfigError::InvalidRedisPort {
                        value: redis_port.clone(),
                    });
                },
            },
            None => return Err(ConfigError::InvalidRedisPort { value: None }),
        };

        let password = redis_password
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingRedisPassword)?;

        Ok(Self {
            root_dir,
            redis: RedisConfig {
                host,
                port,
                password,
            },
        })
    }
}
