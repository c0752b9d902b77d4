use alloy::transports::{RpcError, TransportErrorKind, http::reqwest};
use services::{disconnect::is_connection_failure, transaction_manager::normalize_revert_message};

/// JSON-RPC code geth uses for `execution reverted`.
const EXECUTION_REVERTED_CODE: i64 = 3;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("connection lost: {0}")]
    Disconnected(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("{0}")]
    Reverted(String),
    #[error("other error: {0}")]
    Other(String),
}

impl From<RpcError<TransportErrorKind>> for Error {
    fn from(err: RpcError<TransportErrorKind>) -> Self {
        match err {
            RpcError::ErrorResp(payload)
                if payload.code == EXECUTION_REVERTED_CODE
                    || payload.message.to_ascii_lowercase().contains("revert") =>
            {
                Self::Reverted(normalize_revert_message(&payload.message))
            }
            RpcError::Transport(TransportErrorKind::BackendGone) => {
                Self::Disconnected(err.to_string())
            }
            RpcError::Transport(TransportErrorKind::Custom(ref source)) => {
                if let Some(http_err) = source.downcast_ref::<reqwest::Error>() {
                    if http_err.is_connect() {
                        return Self::Disconnected(err.to_string());
                    }
                    if http_err.is_timeout() {
                        return Self::Timeout(err.to_string());
                    }
                }

                if is_connection_failure(&**source) {
                    Self::Disconnected(err.to_string())
                } else {
                    Self::Other(err.to_string())
                }
            }
            _ => Self::Other(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || is_connection_failure(&err) {
            Self::Disconnected(err.to_string())
        } else if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else {
            Self::Other(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for services::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Disconnected(err) => Self::Disconnected(err),
            Error::Timeout(err) => Self::Timeout(err),
            Error::Reverted(err) => Self::Reverted(err),
            Error::Other(err) => Self::Other(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use alloy::{
        rpc::json_rpc::ErrorPayload,
        transports::{RpcError, TransportErrorKind},
    };
    use test_case::test_case;

    use super::*;

    fn error_response(code: i64, message: &str) -> RpcError<TransportErrorKind> {
        RpcError::ErrorResp(ErrorPayload {
            code,
            message: message.to_owned().into(),
            data: None,
        })
    }

    fn classify(err: RpcError<TransportErrorKind>) -> services::Error {
        Error::from(err).into()
    }

    #[test]
    fn backend_gone_is_a_disconnect() {
        let err = RpcError::Transport(TransportErrorKind::BackendGone);

        assert!(matches!(classify(err), services::Error::Disconnected(_)));
    }

    #[test_case(io::ErrorKind::ConnectionRefused; "refused")]
    #[test_case(io::ErrorKind::ConnectionReset; "reset")]
    #[test_case(io::ErrorKind::NetworkUnreachable; "unreachable")]
    fn connection_level_io_errors_are_disconnects(kind: io::ErrorKind) {
        let err = TransportErrorKind::custom(io::Error::new(kind, "tcp connect error"));

        assert!(matches!(classify(err), services::Error::Disconnected(_)));
    }

    #[test]
    fn dns_failure_is_a_disconnect() {
        let err = TransportErrorKind::custom_str(
            "error trying to connect: dns error: failed to lookup address information",
        );

        assert!(matches!(classify(err), services::Error::Disconnected(_)));
    }

    #[test]
    fn geth_revert_is_a_revert() {
        let err = error_response(3, "execution reverted: not enough collateral");

        assert_eq!(
            classify(err),
            services::Error::Reverted("execution reverted: not enough collateral".into())
        );
    }

    #[test]
    fn nethermind_revert_is_normalized() {
        let err = error_response(-32015, "Reverted 0x6e6f7065");

        assert_eq!(
            classify(err),
            services::Error::Reverted("reverted: nope".into())
        );
    }

    #[test_case(error_response(-32000, "nonce too low"); "nonce too low")]
    #[test_case(error_response(-32601, "the method eth_foo does not exist"); "unknown method")]
    #[test_case(TransportErrorKind::http_error(503, "upstream unavailable".into()); "http status")]
    #[test_case(RpcError::NullResp; "null response")]
    #[test_case(TransportErrorKind::custom_str("invalid type: map, expected a string"); "decode")]
    fn answered_requests_are_not_disconnects(err: RpcError<TransportErrorKind>) {
        assert!(matches!(classify(err), services::Error::Other(_)));
    }
}
