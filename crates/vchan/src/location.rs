//! Ring buffer placement: where each ring's bytes live, and how that is
//! negotiated.
//!
//! A ring either squats inside the control page (1024 bytes at offset 1024,
//! or 2048 bytes at offset 2048) or spills onto separately granted pages.
//! The on-page encoding is a single `order` per ring: `10` and `11` for the
//! two in-page regions, `n + 12` for an external ring of `2^n` pages.

use crate::error::Error;

/// Where one ring's buffer lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferLocation {
    /// 1024 bytes at offset 1024 of the control page.
    Offset1024,
    /// 2048 bytes at offset 2048 of the control page.
    Offset2048,
    /// `2^n` dedicated pages, `0 <= n <= 8`.
    ///
    /// Eight is the ceiling: two maximal grant-ref arrays still have to fit
    /// in the control page after the header.
    External(u8),
}

/// A decoded placement: concrete offset/size inside the control page, or a
/// page count for an externally granted buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingPlacement {
    InPage { offset: usize, size: u32 },
    External { pages: usize, size: u32 },
}

impl RingPlacement {
    /// Grant refs this placement occupies in the control-page array.
    #[inline]
    pub fn pages(&self) -> usize {
        match *self {
            RingPlacement::InPage { .. } => 0,
            RingPlacement::External { pages, .. } => pages,
        }
    }

    /// Ring size in bytes.
    #[inline]
    pub fn size(&self) -> u32 {
        match *self {
            RingPlacement::InPage { size, .. } | RingPlacement::External { size, .. } => size,
        }
    }
}

impl BufferLocation {
    /// The largest expressible location.
    pub const MAX: BufferLocation = BufferLocation::External(8);

    /// On-page encoding of this location.
    pub fn order(self) -> u16 {
        match self {
            Self::Offset1024 => 10,
            Self::Offset2048 => 11,
            Self::External(n) => 12 + n as u16,
        }
    }

    /// Decode an order field.
    pub fn from_order(order: u16) -> Result<Self, Error> {
        match order {
            10 => Ok(Self::Offset1024),
            11 => Ok(Self::Offset2048),
            12..=20 => Ok(Self::External((order - 12) as u8)),
            other => Err(Error::BadOrder(other)),
        }
    }

    /// Ring capacity in bytes.
    pub fn capacity(self) -> u32 {
        1u32 << self.order()
    }

    /// The cheapest location able to hold `bytes`, or [`MAX`](Self::MAX)
    /// when nothing can.
    pub fn smallest_for(bytes: u32) -> Self {
        if bytes <= Self::Offset1024.capacity() {
            return Self::Offset1024;
        }
        if bytes <= Self::Offset2048.capacity() {
            return Self::Offset2048;
        }
        for n in 0..=8 {
            let loc = Self::External(n);
            if bytes <= loc.capacity() {
                return loc;
            }
        }
        Self::MAX
    }

    /// Where this location puts the ring, ignoring in-page collisions.
    pub fn placement(self) -> RingPlacement {
        match self {
            Self::Offset1024 => RingPlacement::InPage { offset: 1024, size: 1024 },
            Self::Offset2048 => RingPlacement::InPage { offset: 2048, size: 2048 },
            Self::External(n) => RingPlacement::External {
                pages: 1 << n,
                size: self.capacity(),
            },
        }
    }
}

/// Resolve in-page collisions in the server's `(read, write)` choice.
///
/// Each in-page region exists once, so two rings cannot both claim it. The
/// write ring yields: it is bumped to the other in-page region, or off the
/// page entirely.
pub fn resolve_conflicts(
    read: BufferLocation,
    write: BufferLocation,
) -> (BufferLocation, BufferLocation) {
    use BufferLocation::*;
    match (read, write) {
        (Offset1024, Offset1024) => (Offset1024, Offset2048),
        (Offset2048, Offset2048) => (Offset2048, External(0)),
        other => other,
    }
}

/// Decode the `(left_order, right_order)` pair a client found on the page
/// into concrete placements.
///
/// Two rows exist only for robustness against non-conforming servers: a
/// colliding `(10, 10)` parks the right ring in the 2048 region (1024 bytes
/// of it), and a colliding `(11, 11)` sends the right ring to a single
/// external page holding a 2048-byte ring.
pub fn placements(left_order: u16, right_order: u16) -> Result<(RingPlacement, RingPlacement), Error> {
    use BufferLocation::*;
    let left_loc = BufferLocation::from_order(left_order)?;
    let right_loc = BufferLocation::from_order(right_order)?;

    let left = left_loc.placement();
    let right = match (left_loc, right_loc) {
        (Offset1024, Offset1024) => RingPlacement::InPage { offset: 2048, size: 1024 },
        (Offset2048, Offset2048) => RingPlacement::External { pages: 1, size: 2048 },
        _ => right_loc.placement(),
    };
    Ok((left, right))
}
