pub mod notifications;
pub mod provider;
pub mod read;
pub mod submit;

pub use notifications::{Notifier, NotificationStream};
pub use provider::{Candidate, Provider, Resolver};
pub use submit::Submitter;

use thiserror::Error;

/// Error type for transport operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("failed: {0}")]
    Failed(reqwest::StatusCode),
    #[error("failed: {status}: {body}")]
    FailedWithBody {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("invalid data: {0}")]
    InvalidData(#[from] serde_json::Error),
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid URL scheme: {0} (expected {1})")]
    InvalidScheme(String, &'static str),
    #[error("no read endpoints configured")]
    NoCandidates,
    #[error("all provider candidates exhausted")]
    Unavailable,
    #[error("unknown stage: {0}")]
    UnknownStage(String),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("remote estimation unsupported")]
    EstimateUnsupported,
    #[error("user declined the signature request")]
    UserDeclined,
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("timed out waiting for confirmation of {0}")]
    ConfirmationTimeout(String),
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Normalize a base URL so that `join` appends instead of replacing the
/// last path segment.
pub(crate) fn ensure_trailing_slash(url: &mut url::Url) {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
}

pub(crate) fn parse_base(raw: &str, schemes: &'static str) -> Result<url::Url> {
    let mut url = url::Url::parse(raw)?;
    if !schemes.split('|').any(|scheme| scheme == url.scheme()) {
        return Err(Error::InvalidScheme(url.scheme().to_string(), schemes));
    }
    ensure_trailing_slash(&mut url);
    Ok(url)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_scheme_is_validated() {
        let err = parse_base("ftp://example.com", "http|https").unwrap_err();
        assert!(matches!(err, Error::InvalidScheme(scheme, _) if scheme == "ftp"));
        assert!(parse_base("http://localhost:8080", "http|https").is_ok());
        assert!(parse_base("wss://push.example/key", "ws|wss").is_ok());
        assert!(parse_base("http://push.example", "ws|wss").is_err());
    }

    #[test]
    fn join_appends_after_normalization() {
        let base = parse_base("http://example.com/v3/KEY", "http|https").unwrap();
        let joined = base.join("network").unwrap();
        assert_eq!(joined.as_str(), "http://example.com/v3/KEY/network");
    }
}
