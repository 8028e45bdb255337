//! The channel handle and its stream operations.
//!
//! A [`Channel`] is one peer's end of an established connection: a view of
//! the control page, the two ring placements (one to read, one to write),
//! the event channel for wake-ups, and the grant resources this side owns.
//! The server end holds shares, the client end holds mappings; everything
//! else is symmetric, so both ends run the same read/write code.
//!
//! Construction lives in the server/client attach paths
//! ([`Channel::server`], [`Channel::client`]); this module is steady-state
//! I/O and teardown.

use vchan_primitives::{Domain, Events, Grants, Port, Registry, Token};

use crate::error::Error;
use crate::layout::{ControlPage, PeerSide, RingSide};
use crate::ring::{RingView, notify_bit, request_notify, take_notify};

/// Connection state, as one peer observes the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// The peer has left; only draining remains.
    Exited,
    /// The peer is attached and serving.
    Connected,
    /// The peer has not attached yet.
    WaitingForConnection,
}

impl State {
    pub(crate) fn from_raw(live: u8) -> Result<Self, Error> {
        match live {
            0 => Ok(Self::Exited),
            1 => Ok(Self::Connected),
            2 => Ok(Self::WaitingForConnection),
            other => Err(Error::BadLive(other)),
        }
    }

    pub(crate) fn as_raw(self) -> u8 {
        match self {
            Self::Exited => 0,
            Self::Connected => 1,
            Self::WaitingForConnection => 2,
        }
    }
}

/// Outcome of a `write`/`writev`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// Every byte was accepted into the ring.
    Complete,
    /// The peer left the stream; `written` bytes were delivered first.
    Eof { written: usize },
}

impl WriteStatus {
    /// True if the peer is gone and the write fell short.
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Eof { .. })
    }
}

/// One ring's placement: which side it is on the control page, where its
/// bytes live, and how big it is.
#[derive(Clone, Copy)]
pub(crate) struct RingSlot {
    pub(crate) side: RingSide,
    pub(crate) data: vchan_primitives::Region,
    pub(crate) size: u32,
}

/// The grant resources owned by one end of the channel.
pub(crate) enum Role<G: Grants> {
    Server {
        control: Option<G::Share>,
        rings: Vec<G::Share>,
    },
    Client {
        control: Option<G::Mapping>,
        rings: Vec<G::Mapping>,
    },
}

/// One end of an established vchan connection.
///
/// Generic over the three substrate capabilities; see the crate docs for
/// the in-memory wiring used by tests.
pub struct Channel<G: Grants, E: Events, R: Registry> {
    pub(crate) grants: G,
    pub(crate) events: E,
    pub(crate) registry: R,
    /// The remote domain.
    pub(crate) domain: Domain,
    /// The application port the channel was advertised under.
    pub(crate) port: Port,
    pub(crate) page: ControlPage,
    pub(crate) role: Role<G>,
    pub(crate) read_ring: RingSlot,
    pub(crate) write_ring: RingSlot,
    pub(crate) event: E::Channel,
    /// Our own event port, released on close.
    pub(crate) event_port: Port,
    pub(crate) token: Token,
    /// Bytes the application has consumed but not yet acknowledged through
    /// the consumer index. Published at the start of the next `read`.
    pub(crate) ack_up_to: u32,
    pub(crate) closed: bool,
}

impl<G: Grants, E: Events, R: Registry> Channel<G, E, R> {
    /// The remote domain this channel is connected to.
    pub fn remote_domain(&self) -> Domain {
        self.domain
    }

    /// The application port this channel was advertised under.
    pub fn remote_port(&self) -> Port {
        self.port
    }

    #[inline]
    fn own_side(&self) -> PeerSide {
        match self.role {
            Role::Server { .. } => PeerSide::Server,
            Role::Client { .. } => PeerSide::Client,
        }
    }

    /// The peer's state, which is the state of the channel as far as this
    /// side is concerned.
    pub fn state(&self) -> Result<State, Error> {
        State::from_raw(self.page.live(self.own_side().opposite()))
    }

    #[inline]
    fn ring(&self, slot: RingSlot) -> RingView<'_> {
        RingView::new(
            self.page.prod_atomic(slot.side),
            self.page.cons_atomic(slot.side),
            slot.data,
            slot.size,
        )
    }

    /// Clear `bit` from our notify byte; if the peer asked for it, send one
    /// event. Runs after progress in `bit`'s direction.
    fn send_notify(&self, bit: u8) -> Result<(), Error> {
        if take_notify(self.page.notify_atomic(self.own_side()), bit) {
            self.events.send(&self.event)?;
        }
        Ok(())
    }

    /// Readable bytes; insufficient counts arm the peer's Write notify
    /// before the re-read, so a sleeper cannot miss the next publish.
    fn fast_data_ready(&self, request: u32) -> u32 {
        let ring = self.ring(self.read_ring);
        let avail = ring.available(self.ack_up_to);
        if avail >= request {
            return avail;
        }
        request_notify(self.page.notify_atomic(self.own_side().opposite()), notify_bit::WRITE);
        ring.available(self.ack_up_to)
    }

    /// Writable space; insufficient counts arm the peer's Read notify
    /// before the re-read.
    fn fast_buffer_space(&self, request: u32) -> u32 {
        let ring = self.ring(self.write_ring);
        let space = ring.space();
        if space >= request {
            return space;
        }
        request_notify(self.page.notify_atomic(self.own_side().opposite()), notify_bit::READ);
        ring.space()
    }

    /// Bytes ready to `read` right now. An empty answer arms the notify
    /// protocol, so a later event is guaranteed once data appears.
    pub fn data_ready(&self) -> usize {
        self.fast_data_ready(1) as usize
    }

    /// Space `write` could take right now without blocking. An empty answer
    /// arms the notify protocol.
    pub fn buffer_space(&self) -> usize {
        self.fast_buffer_space(1) as usize
    }

    /// Read the next chunk of the stream.
    ///
    /// Acknowledges everything returned by the *previous* call, then hands
    /// out up to one contiguous span of the ring. Blocks while the ring is
    /// empty and the peer is connected; returns `Ok(None)` once the peer
    /// has left and the ring is drained.
    pub fn read(&mut self) -> Result<Option<&[u8]>, Error> {
        let slot = self.read_ring;
        self.ring(slot).publish_cons(self.ack_up_to);
        self.send_notify(notify_bit::READ)?;

        loop {
            let avail = self.fast_data_ready(1);
            if avail == 0 {
                if self.state()? != State::Connected {
                    return Ok(None);
                }
                tracing::trace!(port = %self.port, "read: ring empty, waiting");
                self.token = self.events.recv(&self.event, self.token);
                continue;
            }

            // Hand out one contiguous span, bounded by the `avail` we
            // loaded above (acquire) so a racing publish cannot widen the
            // chunk past what the next ack will cover.
            let start = self.ack_up_to;
            let idx = start & (slot.size - 1);
            let len = avail.min(slot.size - idx) as usize;
            self.ack_up_to = start.wrapping_add(len as u32);
            let chunk = unsafe { core::slice::from_raw_parts(slot.data.offset(idx as usize), len) };
            return Ok(Some(chunk));
        }
    }

    /// Write the whole buffer to the stream.
    ///
    /// Blocks whenever the ring is full and the peer is connected. If the
    /// peer leaves mid-write, reports how much was delivered.
    pub fn write(&mut self, buf: &[u8]) -> Result<WriteStatus, Error> {
        let mut written = 0usize;
        while written < buf.len() {
            let space = self.fast_buffer_space((buf.len() - written) as u32);
            if self.state()? != State::Connected {
                return Ok(WriteStatus::Eof { written });
            }
            if space == 0 {
                tracing::trace!(port = %self.port, "write: ring full, waiting");
                self.token = self.events.recv(&self.event, self.token);
                continue;
            }

            let n = self.ring(self.write_ring).produce(&buf[written..]);
            written += n as usize;
            self.send_notify(notify_bit::WRITE)?;
        }
        Ok(WriteStatus::Complete)
    }

    /// Write a sequence of buffers in order, stopping at the first
    /// end-of-stream.
    pub fn writev(&mut self, bufs: &[&[u8]]) -> Result<WriteStatus, Error> {
        let mut total = 0usize;
        for buf in bufs {
            match self.write(buf)? {
                WriteStatus::Complete => total += buf.len(),
                WriteStatus::Eof { written } => {
                    return Ok(WriteStatus::Eof { written: total + written });
                }
            }
        }
        Ok(WriteStatus::Complete)
    }

    /// Tear the channel down: announce the exit, wake the peer, and release
    /// every resource this side owns.
    ///
    /// The server unshares its grants and withdraws the advertisement; the
    /// client unmaps. Dropping the handle does the same on a best-effort
    /// basis, but only an explicit close reports substrate failures.
    pub fn close(mut self) -> Result<(), Error> {
        self.shutdown()
    }

    pub(crate) fn shutdown(&mut self) -> Result<(), Error> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        self.page.set_live(self.own_side(), State::Exited.as_raw());
        self.events.send(&self.event)?;
        self.events.close(self.event_port)?;

        match &mut self.role {
            Role::Server { control, rings } => {
                self.registry.delete(self.domain, self.port);
                for share in rings.drain(..) {
                    self.grants.unshare(share)?;
                }
                if let Some(page) = control.take() {
                    self.grants.unshare(page)?;
                }
            }
            Role::Client { control, rings } => {
                for mapping in rings.drain(..) {
                    self.grants.unmap(mapping)?;
                }
                if let Some(page) = control.take() {
                    self.grants.unmap(page)?;
                }
            }
        }
        tracing::debug!(domain = %self.domain, port = %self.port, "channel closed");
        Ok(())
    }
}

impl<G: Grants, E: Events, R: Registry> Drop for Channel<G, E, R> {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
