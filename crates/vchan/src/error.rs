//! Channel errors.
//!
//! End-of-stream is deliberately *not* here: `read` reports it as
//! `Ok(None)` and `write` as [`WriteStatus::Eof`](crate::WriteStatus::Eof),
//! because a departed peer is an ordinary outcome of the protocol, not a
//! failure. Everything in [`Error`] means the attach handshake failed, the
//! shared page is corrupt, or the substrate was misused.

use std::fmt;

use vchan_primitives::{EventError, GrantError, PortParseError};

/// Failure raised by channel construction, I/O, or teardown.
#[derive(Debug)]
pub enum Error {
    /// A ring order field on the control page is outside 10..=20.
    BadOrder(u16),
    /// A liveness byte on the control page is outside 0..=2.
    BadLive(u8),
    /// The advertised ring ref was not a decimal grant reference.
    RingRefParse(String),
    /// The advertised event channel was not a decimal port.
    PortParse(PortParseError),
    /// The grant substrate refused an operation.
    Grant(GrantError),
    /// The event substrate refused an operation.
    Event(EventError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadOrder(order) => write!(f, "bad ring order on control page: {order}"),
            Self::BadLive(live) => write!(f, "bad liveness byte on control page: {live}"),
            Self::RingRefParse(raw) => write!(f, "not a decimal grant ref: {raw:?}"),
            Self::PortParse(err) => write!(f, "bad advertised event channel: {err}"),
            Self::Grant(err) => write!(f, "grant substrate: {err}"),
            Self::Event(err) => write!(f, "event substrate: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::PortParse(err) => Some(err),
            Self::Grant(err) => Some(err),
            Self::Event(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PortParseError> for Error {
    fn from(err: PortParseError) -> Self {
        Self::PortParse(err)
    }
}

impl From<GrantError> for Error {
    fn from(err: GrantError) -> Self {
        Self::Grant(err)
    }
}

impl From<EventError> for Error {
    fn from(err: EventError) -> Self {
        Self::Event(err)
    }
}
