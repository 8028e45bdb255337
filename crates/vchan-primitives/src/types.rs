//! Identifier types shared by the capability traits.

use std::fmt;

/// Size of a shareable page in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Wait token for event channels.
///
/// Event delivery is counted, not queued: a receiver passes the last counter
/// value it has seen and is woken once the counter moves past it. Fresh
/// channels start from [`Events::initial_token`](crate::Events::initial_token).
pub type Token = u64;

/// Identifies an isolation domain (a VM, in the usual deployment).
///
/// The in-memory substrate treats domain ids as opaque labels and never
/// validates them against a hypervisor topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Domain(u32);

impl Domain {
    /// Wrap a raw domain id.
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// The raw domain id.
    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An event-channel port, or the application-level port distinguishing
/// logical channels between the same pair of domains.
///
/// Ports travel as decimal strings in advertisement records, so `Port`
/// round-trips through [`Display`](fmt::Display) and [`Port::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Port(u32);

impl Port {
    /// Wrap a raw port number.
    #[inline]
    pub const fn new(port: u32) -> Self {
        Self(port)
    }

    /// The raw port number.
    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Parse a port from its on-the-wire decimal form.
    pub fn parse(raw: &str) -> Result<Self, PortParseError> {
        raw.parse::<u32>()
            .map(Self)
            .map_err(|_| PortParseError { raw: raw.to_string() })
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The advertised event channel was not a decimal port number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortParseError {
    raw: String,
}

impl PortParseError {
    /// The string that failed to parse.
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for PortParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not a decimal event port: {:?}", self.raw)
    }
}

impl std::error::Error for PortParseError {}

/// Requested access for a share or mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

/// A substrate still held resources when the test suite asked it to prove
/// everything had been released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleResources {
    resource: &'static str,
    remaining: usize,
}

impl StaleResources {
    pub fn new(resource: &'static str, remaining: usize) -> Self {
        Self { resource, remaining }
    }

    /// What kind of resource leaked.
    pub fn resource(&self) -> &'static str {
        self.resource
    }

    /// How many of them were left.
    pub fn remaining(&self) -> usize {
        self.remaining
    }
}

impl fmt::Display for StaleResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} left behind at shutdown", self.remaining, self.resource)
    }
}

impl std::error::Error for StaleResources {}
