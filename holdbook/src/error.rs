use thiserror::Error;

#[derive(Error, Debug)]
pub enum HoldbookError {
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("API error code {code}: {message}")]
    Api { code: i32, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, HoldbookError>;
