//! Atomics facade: `core::sync::atomic` normally, `loom` under `cfg(loom)`.

#[cfg(not(loom))]
pub use core::sync::atomic::{AtomicU8, AtomicU32, Ordering, fence};
#[cfg(loom)]
pub use loom::sync::atomic::{AtomicU8, AtomicU32, Ordering, fence};

#[cfg(loom)]
pub use loom::thread;
#[cfg(not(loom))]
pub use std::thread;
