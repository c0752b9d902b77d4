use std::fmt::Display;

use actix_web::{ResponseError, http::StatusCode};
use tokio::task::JoinError;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Other(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
}

pub trait WithContext<T> {
    fn with_context<C, F>(self, context: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Other(error.to_string())
    }
}

impl From<JoinError> for Error {
    fn from(error: JoinError) -> Self {
        Self::Other(error.to_string())
    }
}

impl From<services::Error> for Error {
    fn from(error: services::Error) -> Self {
        if error.is_unreachable() {
            Self::Network(error.to_string())
        } else {
            Self::Other(error.to_string())
        }
    }
}

impl From<eth::Error> for Error {
    fn from(error: eth::Error) -> Self {
        Self::from(services::Error::from(error))
    }
}

impl From<beacon::Error> for Error {
    fn from(error: beacon::Error) -> Self {
        Self::from(services::Error::from(error))
    }
}

impl From<etherscan::Error> for Error {
    fn from(error: etherscan::Error) -> Self {
        Self::from(services::Error::from(error))
    }
}

impl From<metrics::prometheus::Error> for Error {
    fn from(error: metrics::prometheus::Error) -> Self {
        Self::Other(format!("metrics registration failed: {error}"))
    }
}

impl From<config::ConfigError> for Error {
    fn from(error: config::ConfigError) -> Self {
        Self::Other(error.to_string())
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Network(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl<T> WithContext<T> for Result<T> {
    fn with_context<C, F>(self, context: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        if let Err(err) = self {
            let new_err = match err {
                Error::Other(e) => Error::Other(format!("{}: {}", context(), e)),
                Error::Network(e) => Error::Network(format!("{}: {}", context(), e)),
                Error::BadRequest(e) => Error::BadRequest(format!("{}: {}", context(), e)),
            };
            Err(new_err)
        } else {
            self
        }
    }
}
