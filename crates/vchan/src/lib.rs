//! Inter-domain bidirectional byte streams over a shared control page.
//!
//! Two peers in separate isolation domains (a *server* that allocates and
//! a *client* that maps) share one 4 KiB control page and a pair of byte
//! rings, and wake each other over an event channel:
//!
//! ```text
//!            control page (4096 B)
//!  ┌────────────────────────────────────────┐
//!  │ counters │ orders │ live │ notify │refs│
//!  ├────────────────────────────────────────┤
//!  │   left ring: client writes, server     │   small rings live here;
//!  │   reads                                │   big ones spill onto
//!  ├────────────────────────────────────────┤   separately granted pages
//!  │   right ring: server writes, client    │
//!  │   reads                                │
//!  └────────────────────────────────────────┘
//! ```
//!
//! The transport is reliable, ordered, and flow-controlled by the rings
//! themselves; there is no framing, each direction is a plain byte stream.
//!
//! # Usage
//!
//! ```ignore
//! use vchan::Channel;
//! use vchan_primitives::{Domain, MemEvents, MemGrants, MemRegistry, Port};
//!
//! // Server side (blocks until the client attaches):
//! let mut server = Channel::server(grants, events, registry, domain, port, 1024, 1024)?;
//!
//! // Client side (blocks until the advertisement exists):
//! let mut client = Channel::client(grants, events, registry, domain, port)?;
//!
//! client.write(b"hello")?;
//! let chunk = server.read()?; // Some(b"hello"), None once the peer left
//!
//! client.close()?;
//! server.close()?;
//! ```
//!
//! The substrate handles are any implementations of the three capability
//! traits in [`vchan_primitives`]; the `Mem*` ones connect two threads in
//! one process and are what the test suite uses.

pub mod error;
pub mod location;
pub mod ring;

#[cfg(not(loom))]
pub mod channel;
#[cfg(not(loom))]
pub mod layout;

#[cfg(not(loom))]
mod client;
#[cfg(not(loom))]
mod server;


#[cfg(not(loom))]
pub use channel::{Channel, State, WriteStatus};
pub use error::Error;
pub use location::BufferLocation;

#[cfg(not(loom))]
use vchan_primitives::{Domain, Events, Grants, Port, Registry};

/// Serve a channel for `domain` on `port`; blocks until the client attaches.
///
/// Free-function form of [`Channel::server`].
#[cfg(not(loom))]
pub fn server<G: Grants, E: Events, R: Registry>(
    grants: G,
    events: E,
    registry: R,
    domain: Domain,
    port: Port,
    read_size: u32,
    write_size: u32,
) -> Result<Channel<G, E, R>, Error> {
    Channel::server(grants, events, registry, domain, port, read_size, write_size)
}

/// Attach to the channel `domain` advertised on `port`; blocks until the
/// advertisement exists.
///
/// Free-function form of [`Channel::client`].
#[cfg(not(loom))]
pub fn client<G: Grants, E: Events, R: Registry>(
    grants: G,
    events: E,
    registry: R,
    domain: Domain,
    port: Port,
) -> Result<Channel<G, E, R>, Error> {
    Channel::client(grants, events, registry, domain, port)
}
