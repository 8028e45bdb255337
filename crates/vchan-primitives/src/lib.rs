//! Hypervisor capability primitives for the vchan transport.
//!
//! A vchan channel runs over three facilities supplied by the host
//! environment, each expressed here as a small trait:
//!
//! - [`Grants`]: share and map fixed-size memory pages across domains
//! - [`Events`]: allocate, connect and signal inter-domain event ports
//! - [`Registry`]: advertise and discover `(ring_ref, event_channel)`
//!   records keyed by a `(domain, port)` pair
//!
//! Each trait ships with an in-memory reference implementation
//! ([`MemGrants`], [`MemEvents`], [`MemRegistry`]) that connects two peers
//! running as threads in the same process. The reference substrate is what
//! the channel test suite runs on; a production substrate would wrap the
//! actual hypercall interfaces behind the same traits.
//!
//! All three reference implementations track the resources they hand out and
//! support an end-of-test [`assert_cleaned_up`](Grants::assert_cleaned_up)
//! check that fails with [`StaleResources`] if anything leaked.

pub mod events;
pub mod grants;
pub mod region;
pub mod registry;
pub mod sync;
pub mod types;

pub use events::{EventError, Events, MemEvents};
pub use grants::{GrantError, GrantRef, Grants, Mapping, MemGrants, MemMapping, MemShare, Share};
pub use region::{HeapRegion, Region};
pub use registry::{Advert, MemRegistry, Registry};
pub use types::{AccessMode, Domain, PAGE_SIZE, Port, PortParseError, StaleResources, Token};
