//! Configuration manager for chatdesk.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AppState;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_UPLOAD_DIRECTORY: &str = "uploads";
const DEFAULT_UPLOAD_SIZE: usize = 5 * 1024 * 1024; // 5 MiB.
const DEFAULT_CHAT_TITLE: &str = "New conversation";
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Instance name.
    pub name: String,
    /// Public base URL of current instance.
    pub url: String,
    #[serde(default)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Related to JsonWebToken configuration.
    #[serde(skip_serializing)]
    pub token: Option<Token>,
    /// Related to PostgreSQL configuration.
    #[serde(skip_serializing)]
    pub postgres: Option<Postgres>,
    /// Related to Argon2 configuration.
    #[serde(skip_serializing)]
    pub argon2: Option<Argon2>,
    /// Related to image uploads.
    #[serde(default, skip_serializing)]
    pub upload: Upload,
    /// Related to conversations.
    #[serde(default, skip_serializing)]
    pub chat: Chat,
}

/// PostgreSQL configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Postgres {
    /// Hostname:(?port) for PostgreSQL instance.
    pub address: String,
    /// Database name.
    pub database: Option<String>,
    /// Username credential to connect.
    pub username: Option<String>,
    /// Password credential to connect.
    pub password: Option<String>,
    /// Maximum pool connections.
    pub pool_size: Option<u32>,
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing.
    pub memory_cost: u32,
    /// Iterations of hash.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 64, // 64 MiB.
            iterations: 4,
            parallelism: 2,
            hash_length: 32,
        }
    }
}

/// Json Web Token configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Token {
    /// HMAC secret. Falls back on `TOKEN_SECRET` environment variable.
    pub secret: Option<String>,
    /// Update token audience.
    pub audience: Option<String>,
    /// Token lifetime, in days.
    pub expiration_days: Option<u64>,
}

/// Image upload configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Upload {
    /// Directory where files are written and served from.
    pub directory: PathBuf,
    /// Maximum accepted file size, in bytes.
    pub max_size: usize,
    /// Accepted file extensions.
    pub extensions: Vec<String>,
}

impl Default for Upload {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_UPLOAD_DIRECTORY),
            max_size: DEFAULT_UPLOAD_SIZE,
            extensions: ["png", "jpg", "jpeg", "gif", "webp"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Conversation configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Chat {
    /// Title given to conversations created without one.
    pub default_title: String,
}

impl Default for Chat {
    fn default() -> Self {
        Self {
            default_title: DEFAULT_CHAT_TITLE.to_owned(),
        }
    }
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Instance version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Public URL of an uploaded file.
    pub fn upload_url(&self, file_name: &str) -> String {
        format!("{}/uploads/{file_name}", self.url.trim_end_matches('/'))
    }

    /// Normalizes a URL string by ensuring it starts with a valid scheme
    /// (`http` or `https`).
    fn normalize_url(&self, url: &str) -> Result<String, url::ParseError> {
        let url_with_scheme =
            if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("https://{url}")
            };

        let parsed_url = Url::parse(&url_with_scheme)?;
        Ok(parsed_url.to_string())
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Result<Arc<Self>, url::ParseError> {
        let file_path = if self.path.is_file() {
            &self.path
        } else {
            &Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        match File::open(file_path) {
            Ok(file) => {
                let mut config: Configuration =
                    match serde_yaml::from_reader(file) {
                        Ok(config) => config,
                        Err(err) => {
                            return Ok(Arc::new(self.error(err)));
                        },
                    };

                // set app version.
                config.version = VERSION.to_owned();
                config.url = self.normalize_url(&config.url)?;

                Ok(Arc::new(config))
            },
            Err(err) => Ok(Arc::new(self.error(err))),
        }
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, path = ?self.path, "`config.yaml` file not found or invalid");
        Self {
            version: VERSION.to_owned(),
            url: "http://localhost:8080/".to_owned(),
            ..Default::default()
        }
    }
}
