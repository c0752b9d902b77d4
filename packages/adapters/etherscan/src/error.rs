use reqwest::StatusCode;
use services::disconnect::is_connection_failure;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("connection lost: {0}")]
    Disconnected(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("gas oracle responded with {0}")]
    Http(StatusCode),
    #[error("gas oracle rejected the request: {0}")]
    Rejected(String),
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
            Self::Other(format!("malformed gas oracle response: {err}"))
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
            Error::Http(_) | Error::Rejected(_) | Error::Other(_) => Self::Other(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(Error::Disconnected("refused".into()), true; "disconnect")]
    #[test_case(Error::Timeout("slow".into()), false; "timeout")]
    #[test_case(Error::Http(StatusCode::TOO_MANY_REQUESTS), false; "http status")]
    #[test_case(Error::Rejected("Invalid API Key".into()), false; "rejected")]
    fn only_unreachable_oracles_count_as_disconnects(err: Error, expected: bool) {
        let err = services::Error::from(err);

        assert_eq!(services::disconnect::is_disconnected(&err), expected);
    }
}
