//! Client construction: discover, map, connect, signal.

use vchan_primitives::{
    AccessMode, Domain, Events, GrantRef, Grants, Mapping, Port, Region, Registry,
};

use crate::channel::{Channel, Role, RingSlot, State};
use crate::error::Error;
use crate::layout::{ControlPage, HEADER_SIZE, PeerSide, RingSide};
use crate::location::{RingPlacement, placements};
use crate::ring::notify_bit;

struct Attachment<G: Grants, E: Events> {
    page: ControlPage,
    left_ring: RingSlot,
    right_ring: RingSlot,
    rings: Vec<G::Mapping>,
    event: E::Channel,
    event_port: Port,
}

impl<G: Grants, E: Events, R: Registry> Channel<G, E, R> {
    /// Attach to the channel `domain` advertised under `port`.
    ///
    /// Blocks until the advertisement exists, maps the control page and the
    /// negotiated rings, flips the connection live, and wakes the server.
    /// The client reads the right ring and writes the left one.
    pub fn client(
        grants: G,
        events: E,
        registry: R,
        domain: Domain,
        port: Port,
    ) -> Result<Self, Error> {
        let advert = registry.read(domain, port);
        let ring_ref: GrantRef = advert
            .ring_ref
            .parse()
            .map_err(|_| Error::RingRefParse(advert.ring_ref.clone()))?;
        let listen_port = Port::parse(&advert.event_channel)?;

        let control = grants.map(domain, ring_ref, AccessMode::ReadWrite)?;
        let attachment = match attach::<G, E>(&grants, &events, domain, listen_port, control.region())
        {
            Ok(attachment) => attachment,
            Err(err) => {
                let _ = grants.unmap(control);
                return Err(err);
            }
        };
        tracing::debug!(%domain, %port, %listen_port, "attached to channel");

        let token = events.initial_token();
        Ok(Channel {
            grants,
            events,
            registry,
            domain,
            port,
            page: attachment.page,
            role: Role::Client { control: Some(control), rings: attachment.rings },
            read_ring: attachment.right_ring,
            write_ring: attachment.left_ring,
            event: attachment.event,
            event_port: attachment.event_port,
            token,
            ack_up_to: 0,
            closed: false,
        })
    }
}

/// Everything between mapping the control page and owning a live channel.
/// On failure, releases whatever it acquired; the caller still owns the
/// control mapping.
fn attach<G: Grants, E: Events>(
    grants: &G,
    events: &E,
    domain: Domain,
    listen_port: Port,
    full: Region,
) -> Result<Attachment<G, E>, Error> {
    let probe = ControlPage::new(full);
    let (left_place, right_place) =
        placements(probe.order(RingSide::Left), probe.order(RingSide::Right))?;

    // Trim the header view down to exactly the refs the orders promise;
    // anything past that is not ours to read.
    let refs_len = left_place.pages() + right_place.pages();
    let page = ControlPage::new(full.slice(0, HEADER_SIZE + 4 * refs_len));
    let left_refs: Vec<GrantRef> = (0..left_place.pages()).map(|i| page.grant_ref(i)).collect();
    let right_refs: Vec<GrantRef> = (0..right_place.pages())
        .map(|i| page.grant_ref(left_place.pages() + i))
        .collect();

    page.set_live(PeerSide::Client, State::Connected.as_raw());
    // Symmetric to the server's init: its first write should wake us.
    page.set_notify(PeerSide::Server, notify_bit::WRITE);

    let event = events.connect(domain, listen_port)?;
    let event_port = events.channel_port(&event);

    let mut rings = Vec::new();
    let mapped: Result<(RingSlot, RingSlot), Error> = (|| {
        let left =
            map_ring(grants, domain, RingSide::Left, left_place, full, &left_refs, &mut rings)?;
        let right =
            map_ring(grants, domain, RingSide::Right, right_place, full, &right_refs, &mut rings)?;
        events.send(&event)?;
        Ok((left, right))
    })();

    match mapped {
        Ok((left_ring, right_ring)) => Ok(Attachment {
            page,
            left_ring,
            right_ring,
            rings,
            event,
            event_port,
        }),
        Err(err) => {
            for mapping in rings.drain(..) {
                let _ = grants.unmap(mapping);
            }
            let _ = events.close(event_port);
            Err(err)
        }
    }
}

/// Locate one ring: a slice of the mapped control page, or a mapping of
/// the advertised grants.
fn map_ring<G: Grants>(
    grants: &G,
    domain: Domain,
    side: RingSide,
    place: RingPlacement,
    control: Region,
    refs: &[GrantRef],
    mappings: &mut Vec<G::Mapping>,
) -> Result<RingSlot, Error> {
    match place {
        RingPlacement::InPage { offset, size } => Ok(RingSlot {
            side,
            data: control.slice(offset, size as usize),
            size,
        }),
        RingPlacement::External { pages, size } => {
            debug_assert_eq!(refs.len(), pages);
            let grant_vec: Vec<(Domain, GrantRef)> = refs.iter().map(|&g| (domain, g)).collect();
            let mapping = grants.mapv(&grant_vec, AccessMode::ReadWrite)?;
            let slot = RingSlot {
                side,
                data: mapping.region().slice(0, size as usize),
                size,
            };
            mappings.push(mapping);
            Ok(slot)
        }
    }
}
