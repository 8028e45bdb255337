//! The grant capability: sharing pages to a peer domain and mapping pages
//! granted by one.
//!
//! A [`Share`] is the issuer's side: it owns the backing pages and carries
//! one grant reference per page. A [`Mapping`] is the peer's side: a
//! contiguous view of somebody else's pages, obtained from a single grant
//! ([`Grants::map`]) or a vector of them ([`Grants::mapv`]).
//!
//! [`MemGrants`] is the in-memory reference implementation. It backs pages
//! with heap allocations and keeps two tables keyed by grant ref (one for
//! single-page shares, served by `map`; one for multi-page shares keyed by
//! their first ref, served by `mapv`) plus the set of refs currently
//! mapped, which is how `DoubleMap` and `UnmapNotMapped` are detected.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::region::{HeapRegion, Region};
use crate::types::{AccessMode, Domain, PAGE_SIZE, StaleResources};

/// A grant reference: the token a peer presents to map one shared page.
pub type GrantRef = u32;

/// The issuing side of a grant: owns the pages it covers.
pub trait Share {
    /// Grant references, one per page, in page order.
    fn grants(&self) -> &[GrantRef];

    /// View of the backing pages as one contiguous buffer.
    fn region(&self) -> Region;
}

/// The mapping side of a grant: a view of a peer's pages.
pub trait Mapping {
    /// View of the mapped pages as one contiguous buffer.
    fn region(&self) -> Region;
}

/// Page share/map capability of a domain.
pub trait Grants {
    type Share: Share;
    type Mapping: Mapping;

    /// Share `pages` fresh pages with `peer`.
    fn share(
        &self,
        peer: Domain,
        pages: usize,
        mode: AccessMode,
    ) -> Result<Self::Share, GrantError>;

    /// Revoke a share. The grant refs it carried become invalid.
    fn unshare(&self, share: Self::Share) -> Result<(), GrantError>;

    /// Map a single page granted by `peer`.
    fn map(
        &self,
        peer: Domain,
        grant: GrantRef,
        mode: AccessMode,
    ) -> Result<Self::Mapping, GrantError>;

    /// Map a vector of grants as one contiguous buffer.
    fn mapv(
        &self,
        grants: &[(Domain, GrantRef)],
        mode: AccessMode,
    ) -> Result<Self::Mapping, GrantError>;

    /// Release a mapping.
    fn unmap(&self, mapping: Self::Mapping) -> Result<(), GrantError>;

    /// Fail if any share or mapping is still outstanding.
    ///
    /// End-of-test hygiene check; a production substrate may leave this as
    /// the default no-op.
    fn assert_cleaned_up(&self) -> Result<(), StaleResources> {
        Ok(())
    }
}

/// Misuse of the grant capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantError {
    /// The grant is already mapped.
    DoubleMap(GrantRef),
    /// Unmapping a grant that is not mapped.
    UnmapNotMapped(GrantRef),
    /// Unsharing a grant that is not shared.
    UnshareNotShared(GrantRef),
    /// No share is registered under this grant ref.
    UnknownGrant(GrantRef),
}

impl fmt::Display for GrantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DoubleMap(gref) => write!(f, "grant {gref} is already mapped"),
            Self::UnmapNotMapped(gref) => write!(f, "grant {gref} is not mapped"),
            Self::UnshareNotShared(gref) => write!(f, "grant {gref} is not shared"),
            Self::UnknownGrant(gref) => write!(f, "no such grant: {gref}"),
        }
    }
}

impl std::error::Error for GrantError {}

/// In-memory grant table connecting peers in the same process.
///
/// Clones share one table, so hand one clone to each peer.
#[derive(Clone, Default)]
pub struct MemGrants {
    inner: Arc<Mutex<GrantTable>>,
}

struct GrantTable {
    next_ref: GrantRef,
    /// Single-page shares, keyed by their one grant ref.
    singles: HashMap<GrantRef, ShareEntry>,
    /// Multi-page shares, keyed by their first grant ref.
    multis: HashMap<GrantRef, ShareEntry>,
    /// First refs of live mappings.
    mapped: HashSet<GrantRef>,
}

impl Default for GrantTable {
    fn default() -> Self {
        Self {
            next_ref: 1,
            singles: HashMap::new(),
            multis: HashMap::new(),
            mapped: HashSet::new(),
        }
    }
}

struct ShareEntry {
    #[allow(dead_code)]
    peer: Domain,
    grants: Vec<GrantRef>,
    backing: Arc<HeapRegion>,
}

/// A share handed out by [`MemGrants`].
pub struct MemShare {
    grants: Vec<GrantRef>,
    backing: Arc<HeapRegion>,
}

impl Share for MemShare {
    fn grants(&self) -> &[GrantRef] {
        &self.grants
    }

    fn region(&self) -> Region {
        self.backing.region()
    }
}

/// A mapping handed out by [`MemGrants`].
pub struct MemMapping {
    first: GrantRef,
    backing: Arc<HeapRegion>,
}

impl Mapping for MemMapping {
    fn region(&self) -> Region {
        self.backing.region()
    }
}

impl Grants for MemGrants {
    type Share = MemShare;
    type Mapping = MemMapping;

    fn share(
        &self,
        peer: Domain,
        pages: usize,
        _mode: AccessMode,
    ) -> Result<MemShare, GrantError> {
        assert!(pages > 0, "cannot share zero pages");
        let backing = Arc::new(HeapRegion::new_zeroed(pages * PAGE_SIZE));

        let mut table = self.inner.lock().unwrap();
        let first = table.next_ref;
        table.next_ref += pages as GrantRef;
        let grants: Vec<GrantRef> = (0..pages as GrantRef).map(|i| first + i).collect();

        let entry = ShareEntry {
            peer,
            grants: grants.clone(),
            backing: backing.clone(),
        };
        if pages == 1 {
            table.singles.insert(first, entry);
        } else {
            table.multis.insert(first, entry);
        }
        tracing::debug!(%peer, first, pages, "shared pages");

        Ok(MemShare { grants, backing })
    }

    fn unshare(&self, share: MemShare) -> Result<(), GrantError> {
        let first = share.grants[0];
        let mut table = self.inner.lock().unwrap();
        let removed = if share.grants.len() == 1 {
            table.singles.remove(&first)
        } else {
            table.multis.remove(&first)
        };
        match removed {
            // Outstanding mappings keep the backing pages alive through
            // their own Arc; revoking the grant only forbids new maps.
            Some(_) => Ok(()),
            None => Err(GrantError::UnshareNotShared(first)),
        }
    }

    fn map(
        &self,
        _peer: Domain,
        grant: GrantRef,
        _mode: AccessMode,
    ) -> Result<MemMapping, GrantError> {
        let mut table = self.inner.lock().unwrap();
        let backing = table
            .singles
            .get(&grant)
            .ok_or(GrantError::UnknownGrant(grant))?
            .backing
            .clone();
        if !table.mapped.insert(grant) {
            return Err(GrantError::DoubleMap(grant));
        }
        Ok(MemMapping { first: grant, backing })
    }

    fn mapv(
        &self,
        grants: &[(Domain, GrantRef)],
        mode: AccessMode,
    ) -> Result<MemMapping, GrantError> {
        assert!(!grants.is_empty(), "cannot map an empty grant vector");
        if grants.len() == 1 {
            let (peer, grant) = grants[0];
            return self.map(peer, grant, mode);
        }

        let first = grants[0].1;
        let mut table = self.inner.lock().unwrap();
        let entry = table
            .multis
            .get(&first)
            .ok_or(GrantError::UnknownGrant(first))?;
        // The caller must present the share's refs exactly as issued.
        if entry.grants.len() != grants.len()
            || entry.grants.iter().zip(grants).any(|(a, (_, b))| a != b)
        {
            return Err(GrantError::UnknownGrant(first));
        }
        let backing = entry.backing.clone();
        if !table.mapped.insert(first) {
            return Err(GrantError::DoubleMap(first));
        }
        Ok(MemMapping { first, backing })
    }

    fn unmap(&self, mapping: MemMapping) -> Result<(), GrantError> {
        let mut table = self.inner.lock().unwrap();
        if table.mapped.remove(&mapping.first) {
            Ok(())
        } else {
            Err(GrantError::UnmapNotMapped(mapping.first))
        }
    }

    fn assert_cleaned_up(&self) -> Result<(), StaleResources> {
        let table = self.inner.lock().unwrap();
        let shares = table.singles.len() + table.multis.len();
        if shares > 0 {
            return Err(StaleResources::new("grant shares", shares));
        }
        if !table.mapped.is_empty() {
            return Err(StaleResources::new("grant mappings", table.mapped.len()));
        }
        Ok(())
    }
}
