use thiserror::Error;

/// Errors surfaced by the server client and thumbnail engine.
///
/// Per-entry parse failures and malformed size strings are not errors;
/// the listing parser contains them and keeps going.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Server returned HTTP {0}")]
    Http(reqwest::StatusCode),

    #[error("Image decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, ClientError>;
