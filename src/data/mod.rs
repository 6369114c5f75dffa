pub mod batch;
pub mod data_brokers;
pub mod store;

use thiserror::Error;

/// Errors raised while fetching or archiving a single item.
///
/// Batch wrappers catch these per request, log them and move on.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("API error: {0}")]
    Api(String),

    #[error("malformed response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid date: {0}")]
    InvalidDate(#[from] chrono::ParseError),

    #[error("missing API key for {0}; set it in config.toml or APP__{1}__API_KEY")]
    MissingApiKey(&'static str, &'static str),

    #[error("unsupported {kind}: {value}")]
    Unsupported { kind: &'static str, value: String },
}

impl DataError {
    pub fn unsupported(kind: &'static str, value: impl Into<String>) -> Self {
        Self::Unsupported {
            kind,
            value: value.into(),
        }
    }
}
