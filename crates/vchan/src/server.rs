//! Server construction: allocate, publish, wait for the client.

use vchan_primitives::{AccessMode, Advert, Domain, Events, GrantRef, Grants, Port, Registry, Share};

use crate::channel::{Channel, Role, RingSlot, State};
use crate::error::Error;
use crate::layout::{ControlPage, PeerSide, RingSide};
use crate::location::{BufferLocation, RingPlacement, resolve_conflicts};
use crate::ring::notify_bit;

impl<G: Grants, E: Events, R: Registry> Channel<G, E, R> {
    /// Allocate a channel for `domain` to attach to, advertise it under
    /// `port`, and block until the client connects.
    ///
    /// `read_size`/`write_size` are the requested ring capacities in bytes;
    /// each is rounded up to the cheapest placement that holds it (and
    /// clamped to the largest placement if nothing does). The server reads
    /// the left ring and writes the right one.
    pub fn server(
        grants: G,
        events: E,
        registry: R,
        domain: Domain,
        port: Port,
        read_size: u32,
        write_size: u32,
    ) -> Result<Self, Error> {
        let (read_loc, write_loc) = resolve_conflicts(
            BufferLocation::smallest_for(read_size),
            BufferLocation::smallest_for(write_size),
        );

        let control = grants.share(domain, 1, AccessMode::ReadWrite)?;
        let page = ControlPage::new(control.region());
        page.zero_counters();
        page.set_order(RingSide::Left, read_loc.order());
        page.set_order(RingSide::Right, write_loc.order());

        let mut rings = Vec::new();
        let mut refs: Vec<GrantRef> = Vec::new();
        let read_ring =
            alloc_ring(&grants, domain, RingSide::Left, read_loc, &control, &mut rings, &mut refs)?;
        let write_ring =
            alloc_ring(&grants, domain, RingSide::Right, write_loc, &control, &mut rings, &mut refs)?;
        for (index, gref) in refs.iter().enumerate() {
            page.set_grant_ref(index, *gref);
        }

        page.set_live(PeerSide::Client, State::WaitingForConnection.as_raw());
        page.set_live(PeerSide::Server, State::Connected.as_raw());
        // The client's first write should wake us; nothing is owed the
        // other way until the client asks.
        page.set_notify(PeerSide::Client, notify_bit::WRITE);
        page.set_notify(PeerSide::Server, 0);

        let (event_port, event) = events.listen(domain)?;
        registry.write(
            domain,
            port,
            Advert {
                ring_ref: control.grants()[0].to_string(),
                event_channel: event_port.to_string(),
            },
        );
        tracing::debug!(
            %domain,
            %port,
            left_order = read_loc.order(),
            right_order = write_loc.order(),
            "serving channel, waiting for client"
        );

        let mut token = events.initial_token();
        loop {
            match State::from_raw(page.live(PeerSide::Client))? {
                State::WaitingForConnection => token = events.recv(&event, token),
                // Connected, or attached and already gone again.
                _ => break,
            }
        }
        tracing::debug!(%domain, %port, "client attached");

        Ok(Channel {
            grants,
            events,
            registry,
            domain,
            port,
            page,
            role: Role::Server { control: Some(control), rings },
            read_ring,
            write_ring,
            event,
            event_port,
            token,
            ack_up_to: 0,
            closed: false,
        })
    }
}

/// Place one ring: a slice of the control page, or freshly shared pages
/// whose grant refs go into the header array.
fn alloc_ring<G: Grants>(
    grants: &G,
    domain: Domain,
    side: RingSide,
    loc: BufferLocation,
    control: &G::Share,
    shares: &mut Vec<G::Share>,
    refs: &mut Vec<GrantRef>,
) -> Result<RingSlot, Error> {
    match loc.placement() {
        RingPlacement::InPage { offset, size } => Ok(RingSlot {
            side,
            data: control.region().slice(offset, size as usize),
            size,
        }),
        RingPlacement::External { pages, size } => {
            let share = grants.share(domain, pages, AccessMode::ReadWrite)?;
            refs.extend_from_slice(share.grants());
            let slot = RingSlot { side, data: share.region(), size };
            shares.push(share);
            Ok(slot)
        }
    }
}
