//! Conversion of Redis and serialization errors.

use sf_trust::RelayStateError;

/// Converts a `fred` Redis error to a [`RelayStateError`].
#[allow(clippy::needless_pass_by_value)]
pub fn from_redis_error(err: fred::error::Error) -> RelayStateError {
    let kind = match err.kind() {
        fred::error::ErrorKind::IO | fred::error::ErrorKind::Timeout => "connection",
        fred::error::ErrorKind::Config => "configuration",
        _ => "command",
    };
    RelayStateError::Store(format!("redis {kind} error: {err}"))
}

/// Converts a record serialization error to a [`RelayStateError`].
#[allow(clippy::needless_pass_by_value)]
pub fn from_serde_error(err: serde_json::Error) -> RelayStateError {
    RelayStateError::Store(format!("malformed relay state record: {err}"))
}
