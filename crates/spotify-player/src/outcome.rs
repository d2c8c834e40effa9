//! Per-command results: success, the two playback-specific refusals, or any other status

use std::fmt;

/// Result of one playback command.
///
/// `T` is the success payload: `()` for fire-and-forget commands, the raw
/// response body for `list_devices`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome<T = ()> {
    Success(T),
    /// `play` answered 404: no device is active to receive playback.
    NoActiveDevice,
    /// `play` answered 403, typically a non-premium account.
    Forbidden,
    /// Any other unexpected status.
    TransportFailure { status: u16, body: String },
}

impl<T> CommandOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Success payload, if any.
    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }

    /// Short label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::NoActiveDevice => "no_active_device",
            Self::Forbidden => "forbidden",
            Self::TransportFailure { .. } => "transport_failure",
        }
    }
}

impl<T> fmt::Display for CommandOutcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(_) => f.write_str("ok"),
            Self::NoActiveDevice => f.write_str("no active device"),
            Self::Forbidden => f.write_str("forbidden (premium account required?)"),
            Self::TransportFailure { status, body } => write!(f, "HTTP {status}: {body}"),
        }
    }
}
