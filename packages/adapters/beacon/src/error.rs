use reqwest::StatusCode;
use services::disconnect::is_connection_failure;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("connection lost: {0}")]
    Disconnected(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("beacon node responded with {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("other error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || is_connection_failure(&err) {
            Self::Disconnected(err.to_string())
        } else if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::Other(format!("malformed response: {err}"))
        } else {
            Self::Other(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for services::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Disconnected(e) => Self::Disconnected(e),
            Error::Timeout(e) => Self::Timeout(e),
            Error::Http { .. } | Error::Other(_) => Self::Other(err.to_string()),
        }
    }
}
