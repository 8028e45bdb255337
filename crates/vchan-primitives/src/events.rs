//! The event capability: counted cross-domain wake-ups.
//!
//! An event channel is a pair of bound ports, one per domain. Sending on a
//! channel bumps a counter on the far port and wakes anyone waiting there;
//! receiving hands back the counter so a waiter can never miss a signal
//! that raced its decision to sleep (compare the token, then sleep).
//!
//! [`MemEvents`] is the in-memory reference implementation: a port table
//! behind a mutex plus one broadcast condvar. Ports are handed out from a
//! small counter and double as channel handles.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex};

use crate::types::{Domain, Port, StaleResources, Token};

/// Event-channel capability of a domain.
pub trait Events {
    /// Handle for a connected (or listening) channel.
    type Channel;

    /// Allocate a fresh unbound port for `peer` to connect to.
    ///
    /// Returns the port (to advertise) and the local channel handle; in the
    /// reference implementation these are the same integer.
    fn listen(&self, peer: Domain) -> Result<(Port, Self::Channel), EventError>;

    /// Allocate a local port and bind it to `port` on `peer`.
    fn connect(&self, peer: Domain, port: Port) -> Result<Self::Channel, EventError>;

    /// Signal the far end of the channel.
    fn send(&self, channel: &Self::Channel) -> Result<(), EventError>;

    /// Wait until this channel's counter moves past `token`; returns the
    /// new counter value. Blocks; never fails.
    fn recv(&self, channel: &Self::Channel, token: Token) -> Token;

    /// Tear down a port, clearing its binding and counter.
    fn close(&self, port: Port) -> Result<(), EventError>;

    /// The local port that owns a channel handle.
    fn channel_port(&self, channel: &Self::Channel) -> Port;

    /// Token to pass to the first [`recv`](Events::recv) on a channel.
    fn initial_token(&self) -> Token {
        0
    }

    /// Fail if any port is still allocated.
    fn assert_cleaned_up(&self) -> Result<(), StaleResources> {
        Ok(())
    }
}

/// Misuse of the event capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventError {
    /// No such port on this substrate.
    UnknownPort(Port),
    /// The port already has a peer bound to it.
    AlreadyConnected(Port),
}

impl fmt::Display for EventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownPort(port) => write!(f, "no such event port: {port}"),
            Self::AlreadyConnected(port) => write!(f, "event port {port} already connected"),
        }
    }
}

impl std::error::Error for EventError {}

/// In-memory event channels connecting peers in the same process.
///
/// Clones share one port table, so hand one clone to each peer.
#[derive(Clone, Default)]
pub struct MemEvents {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    ports: Mutex<PortTable>,
    wake: Condvar,
}

struct PortTable {
    next: u32,
    entries: HashMap<u32, PortEntry>,
}

impl Default for PortTable {
    fn default() -> Self {
        Self {
            next: 1,
            entries: HashMap::new(),
        }
    }
}

struct PortEntry {
    #[allow(dead_code)]
    peer: Domain,
    bound_to: Option<u32>,
    counter: Token,
}

impl PortTable {
    fn alloc(&mut self, peer: Domain, bound_to: Option<u32>) -> u32 {
        let port = self.next;
        self.next += 1;
        self.entries.insert(
            port,
            PortEntry {
                peer,
                bound_to,
                counter: 0,
            },
        );
        port
    }
}

impl Events for MemEvents {
    type Channel = Port;

    fn listen(&self, peer: Domain) -> Result<(Port, Port), EventError> {
        let mut table = self.inner.ports.lock().unwrap();
        let port = Port::new(table.alloc(peer, None));
        tracing::debug!(%peer, %port, "listening event port");
        Ok((port, port))
    }

    fn connect(&self, peer: Domain, port: Port) -> Result<Port, EventError> {
        let mut table = self.inner.ports.lock().unwrap();
        let remote = table
            .entries
            .get(&port.get())
            .ok_or(EventError::UnknownPort(port))?;
        if remote.bound_to.is_some() {
            return Err(EventError::AlreadyConnected(port));
        }
        let local = table.alloc(peer, Some(port.get()));
        table.entries.get_mut(&port.get()).unwrap().bound_to = Some(local);
        tracing::debug!(%peer, remote = %port, local, "connected event channel");
        Ok(Port::new(local))
    }

    fn send(&self, channel: &Port) -> Result<(), EventError> {
        let mut table = self.inner.ports.lock().unwrap();
        let entry = table
            .entries
            .get(&channel.get())
            .ok_or(EventError::UnknownPort(*channel))?;
        // An unbound channel (or one whose peer has already closed) has
        // nobody to wake.
        let Some(peer) = entry.bound_to else {
            return Ok(());
        };
        if let Some(far) = table.entries.get_mut(&peer) {
            far.counter += 1;
        }
        drop(table);
        self.inner.wake.notify_all();
        Ok(())
    }

    fn recv(&self, channel: &Port, token: Token) -> Token {
        let mut table = self.inner.ports.lock().unwrap();
        loop {
            let entry = table
                .entries
                .get(&channel.get())
                .expect("recv on a closed event port");
            if entry.counter > token {
                return entry.counter;
            }
            table = self.inner.wake.wait(table).unwrap();
        }
    }

    fn close(&self, port: Port) -> Result<(), EventError> {
        let mut table = self.inner.ports.lock().unwrap();
        let entry = table
            .entries
            .remove(&port.get())
            .ok_or(EventError::UnknownPort(port))?;
        if let Some(peer) = entry.bound_to
            && let Some(far) = table.entries.get_mut(&peer)
        {
            far.bound_to = None;
        }
        drop(table);
        self.inner.wake.notify_all();
        Ok(())
    }

    fn channel_port(&self, channel: &Port) -> Port {
        *channel
    }

    fn assert_cleaned_up(&self) -> Result<(), StaleResources> {
        let table = self.inner.ports.lock().unwrap();
        if table.entries.is_empty() {
            Ok(())
        } else {
            Err(StaleResources::new("event ports", table.entries.len()))
        }
    }
}
