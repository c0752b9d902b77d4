//! Decides which failures are eligible for failover.
//!
//! Only a lost or refused transport connection counts as a disconnect. Anything
//! the endpoint actually answered (error responses, HTTP statuses, bodies that
//! fail to decode) and whole-request timeouts stay application errors, so an
//! invalid request is never retried against another endpoint.

use std::io;

use crate::Error;

const RESOLUTION_FAILURES: &[&str] = &[
    "dns error",
    "failed to lookup address",
    "name or service not known",
    "no such host",
    "nodename nor servname provided",
    "temporary failure in name resolution",
];

const CONNECTION_FAILURES: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection aborted",
    "broken pipe",
];

pub fn is_disconnected(err: &Error) -> bool {
    matches!(err, Error::Disconnected(_))
}

/// Walks the source chain of a raw transport error looking for a connection-level
/// failure. Adapters call this before mapping into [`Error`].
pub fn is_connection_failure(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);

    while let Some(err) = current {
        let io_failure = err
            .downcast_ref::<io::Error>()
            .is_some_and(|io_err| is_connection_io_kind(io_err.kind()));

        if io_failure || mentions_connection_failure(&err.to_string()) {
            return true;
        }

        current = err.source();
    }

    false
}

fn is_connection_io_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable
    )
}

fn mentions_connection_failure(msg: &str) -> bool {
    let msg = msg.to_ascii_lowercase();

    RESOLUTION_FAILURES
        .iter()
        .chain(CONNECTION_FAILURES)
        .any(|needle| msg.contains(needle))
}
