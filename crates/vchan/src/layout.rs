//! Control-page codec.
//!
//! The control page is 4096 bytes, packed, little-endian:
//!
//! ```text
//! offset  size  field
//!      0     4  left ring consumer index
//!      4     4  left ring producer index
//!      8     4  right ring consumer index
//!     12     4  right ring producer index
//!     16     2  left ring order
//!     18     2  right ring order
//!     20     1  client liveness
//!     21     1  server liveness
//!     22     1  client notify bits
//!     23     1  server notify bits
//!     24   4·K  grant refs (left ring first, then right)
//! ```
//!
//! This module is pure load/store: counters as release/acquire 32-bit
//! atomics, liveness as release/acquire bytes, notify bytes exposed as raw
//! atomics for the signalling protocol, orders and grant refs as plain
//! little-endian scalars (they have a single writer and are fixed before
//! the peer attaches). What the values *mean* is the channel's business.

use vchan_primitives::Region;
use vchan_primitives::sync::{AtomicU8, AtomicU32, Ordering};

/// Bytes of fixed header before the grant-ref array.
pub const HEADER_SIZE: usize = 24;

const LEFT_CONS: usize = 0;
const LEFT_PROD: usize = 4;
const RIGHT_CONS: usize = 8;
const RIGHT_PROD: usize = 12;
const LEFT_ORDER: usize = 16;
const RIGHT_ORDER: usize = 18;
const CLI_LIVE: usize = 20;
const SRV_LIVE: usize = 21;
const CLI_NOTIFY: usize = 22;
const SRV_NOTIFY: usize = 23;
const GRANT_REFS: usize = 24;

/// The two data rings, named from the server's point of view: the server
/// reads *left* and writes *right*.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingSide {
    Left,
    Right,
}

/// The two peers, for fields that exist once per side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerSide {
    Client,
    Server,
}

impl PeerSide {
    /// The other peer.
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Self::Client => Self::Server,
            Self::Server => Self::Client,
        }
    }
}

/// Typed view of a mapped (or freshly shared) control page.
///
/// Copyable; carries no ownership of the underlying page.
#[derive(Clone, Copy)]
pub struct ControlPage {
    region: Region,
}

impl ControlPage {
    /// Wrap a page view. The view must cover at least the fixed header and
    /// be 4-byte aligned (page mappings always are).
    pub fn new(region: Region) -> Self {
        assert!(region.len() >= HEADER_SIZE, "control view smaller than header");
        assert!(region.as_ptr() as usize % 4 == 0, "control page misaligned");
        Self { region }
    }

    /// The underlying view.
    #[inline]
    pub fn region(&self) -> Region {
        self.region
    }

    #[inline]
    fn atomic_u32(&self, off: usize) -> &AtomicU32 {
        unsafe { AtomicU32::from_ptr(self.region.offset(off) as *mut u32) }
    }

    #[inline]
    fn atomic_u8(&self, off: usize) -> &AtomicU8 {
        unsafe { AtomicU8::from_ptr(self.region.offset(off)) }
    }

    /// Producer counter of a ring, as a raw atomic. Stored little-endian;
    /// ring views do the byte-order conversion.
    #[inline]
    pub fn prod_atomic(&self, side: RingSide) -> &AtomicU32 {
        self.atomic_u32(match side {
            RingSide::Left => LEFT_PROD,
            RingSide::Right => RIGHT_PROD,
        })
    }

    /// Consumer counter of a ring, as a raw atomic.
    #[inline]
    pub fn cons_atomic(&self, side: RingSide) -> &AtomicU32 {
        self.atomic_u32(match side {
            RingSide::Left => LEFT_CONS,
            RingSide::Right => RIGHT_CONS,
        })
    }

    /// Zero all four ring counters.
    pub fn zero_counters(&self) {
        for off in [LEFT_CONS, LEFT_PROD, RIGHT_CONS, RIGHT_PROD] {
            self.atomic_u32(off).store(0, Ordering::Release);
        }
    }

    /// Ring order field.
    #[inline]
    pub fn order(&self, side: RingSide) -> u16 {
        let off = match side {
            RingSide::Left => LEFT_ORDER,
            RingSide::Right => RIGHT_ORDER,
        };
        let ptr = self.region.offset(off);
        u16::from_le_bytes(unsafe { [*ptr, *ptr.add(1)] })
    }

    /// Set a ring order field.
    #[inline]
    pub fn set_order(&self, side: RingSide, order: u16) {
        let off = match side {
            RingSide::Left => LEFT_ORDER,
            RingSide::Right => RIGHT_ORDER,
        };
        let bytes = order.to_le_bytes();
        unsafe {
            *self.region.offset(off) = bytes[0];
            *self.region.offset(off + 1) = bytes[1];
        }
    }

    /// Liveness byte of one peer.
    #[inline]
    pub fn live(&self, side: PeerSide) -> u8 {
        let off = match side {
            PeerSide::Client => CLI_LIVE,
            PeerSide::Server => SRV_LIVE,
        };
        self.atomic_u8(off).load(Ordering::Acquire)
    }

    /// Set the liveness byte of one peer. Only that peer writes its byte.
    #[inline]
    pub fn set_live(&self, side: PeerSide, live: u8) {
        let off = match side {
            PeerSide::Client => CLI_LIVE,
            PeerSide::Server => SRV_LIVE,
        };
        self.atomic_u8(off).store(live, Ordering::Release);
    }

    /// Notify byte of one peer, as a raw atomic. Both peers mutate these
    /// (the owner clears, the remote sets), hence byte-granular atomics.
    #[inline]
    pub fn notify_atomic(&self, side: PeerSide) -> &AtomicU8 {
        self.atomic_u8(match side {
            PeerSide::Client => CLI_NOTIFY,
            PeerSide::Server => SRV_NOTIFY,
        })
    }

    /// Overwrite a notify byte. Only valid before the peer attaches.
    #[inline]
    pub fn set_notify(&self, side: PeerSide, bits: u8) {
        self.notify_atomic(side).store(bits, Ordering::Release);
    }

    /// Grant ref at `index` in the array after the header.
    ///
    /// # Panics
    ///
    /// Panics if the entry lies outside the view; attach re-slices the view
    /// so that exactly the negotiated refs are reachable.
    #[inline]
    pub fn grant_ref(&self, index: usize) -> u32 {
        assert!(GRANT_REFS + 4 * index + 4 <= self.region.len(), "grant ref {index} out of view");
        let ptr = self.region.offset(GRANT_REFS + 4 * index);
        u32::from_le_bytes(unsafe { [*ptr, *ptr.add(1), *ptr.add(2), *ptr.add(3)] })
    }

    /// Store a grant ref at `index` in the array after the header.
    #[inline]
    pub fn set_grant_ref(&self, index: usize, gref: u32) {
        assert!(GRANT_REFS + 4 * index + 4 <= self.region.len(), "grant ref {index} out of view");
        let bytes = gref.to_le_bytes();
        for (i, b) in bytes.into_iter().enumerate() {
            unsafe { *self.region.offset(GRANT_REFS + 4 * index + i) = b };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vchan_primitives::{HeapRegion, PAGE_SIZE};

    fn page() -> (HeapRegion, ControlPage) {
        let owner = HeapRegion::new_zeroed(PAGE_SIZE);
        let page = ControlPage::new(owner.region());
        (owner, page)
    }

    fn byte_at(owner: &HeapRegion, off: usize) -> u8 {
        unsafe { *owner.region().offset(off) }
    }

    #[test]
    fn orders_land_at_bytes_16_and_18() {
        let (owner, page) = page();
        page.set_order(RingSide::Left, 10);
        page.set_order(RingSide::Right, 0x0102);

        assert_eq!(byte_at(&owner, 16), 10);
        assert_eq!(byte_at(&owner, 17), 0);
        assert_eq!(byte_at(&owner, 18), 0x02);
        assert_eq!(byte_at(&owner, 19), 0x01);
        assert_eq!(page.order(RingSide::Left), 10);
        assert_eq!(page.order(RingSide::Right), 0x0102);
    }

    #[test]
    fn counters_are_little_endian_words() {
        let (owner, page) = page();
        page.prod_atomic(RingSide::Left)
            .store(0x0403_0201u32.to_le(), Ordering::Release);
        page.cons_atomic(RingSide::Right)
            .store(0xAABB_CCDDu32.to_le(), Ordering::Release);

        assert_eq!(byte_at(&owner, 4), 0x01);
        assert_eq!(byte_at(&owner, 5), 0x02);
        assert_eq!(byte_at(&owner, 6), 0x03);
        assert_eq!(byte_at(&owner, 7), 0x04);
        assert_eq!(byte_at(&owner, 8), 0xDD);
        assert_eq!(byte_at(&owner, 11), 0xAA);
    }

    #[test]
    fn live_and_notify_bytes_are_adjacent_but_distinct() {
        let (owner, page) = page();
        page.set_live(PeerSide::Client, 2);
        page.set_live(PeerSide::Server, 1);
        page.set_notify(PeerSide::Client, 0x01);
        page.set_notify(PeerSide::Server, 0x03);

        assert_eq!(byte_at(&owner, 20), 2);
        assert_eq!(byte_at(&owner, 21), 1);
        assert_eq!(byte_at(&owner, 22), 0x01);
        assert_eq!(byte_at(&owner, 23), 0x03);

        // Byte-granular ops on a notify byte must not disturb neighbours.
        page.notify_atomic(PeerSide::Client).fetch_and(!0x01, Ordering::AcqRel);
        assert_eq!(byte_at(&owner, 20), 2);
        assert_eq!(byte_at(&owner, 21), 1);
        assert_eq!(byte_at(&owner, 22), 0);
        assert_eq!(byte_at(&owner, 23), 0x03);
    }

    #[test]
    fn grant_refs_follow_the_header() {
        let (owner, page) = page();
        page.set_grant_ref(0, 0x1111_2222);
        page.set_grant_ref(3, 7);

        assert_eq!(byte_at(&owner, 24), 0x22);
        assert_eq!(byte_at(&owner, 25), 0x22);
        assert_eq!(byte_at(&owner, 26), 0x11);
        assert_eq!(byte_at(&owner, 27), 0x11);
        assert_eq!(byte_at(&owner, 24 + 12), 7);
        assert_eq!(page.grant_ref(0), 0x1111_2222);
        assert_eq!(page.grant_ref(3), 7);
    }

    #[test]
    #[should_panic(expected = "out of view")]
    fn resliced_view_rejects_refs_past_the_end() {
        let owner = HeapRegion::new_zeroed(PAGE_SIZE);
        let view = ControlPage::new(owner.region().slice(0, HEADER_SIZE + 4));
        let _ = view.grant_ref(1);
    }
}
