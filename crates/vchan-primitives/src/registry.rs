//! The registry capability: a tiny shared configuration store where a
//! server advertises its channel endpoint and a client discovers it.
//!
//! One record per `(domain, port)` key: the grant ref of the control page
//! and the event port to connect to, both as decimal strings.
//! [`Registry::read`] blocks until the record exists, which is the only
//! rendezvous the protocol needs: the client may start before the server.
//!
//! [`MemRegistry`] is the in-memory reference implementation: a map behind
//! a mutex plus a broadcast condvar. Publishing a key that already exists
//! replaces the record and wakes waiters again.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

use crate::types::{Domain, Port, StaleResources};

/// An advertised channel endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advert {
    /// Decimal grant ref of the control page.
    pub ring_ref: String,
    /// Decimal event port the server listens on.
    pub event_channel: String,
}

/// Shared-configuration capability of a domain.
pub trait Registry {
    /// Publish (or replace) the record under `(domain, port)`.
    fn write(&self, domain: Domain, port: Port, advert: Advert);

    /// Fetch the record under `(domain, port)`, blocking until it exists.
    fn read(&self, domain: Domain, port: Port) -> Advert;

    /// Remove the record under `(domain, port)`.
    fn delete(&self, domain: Domain, port: Port);

    /// Fail if any record is still published.
    fn assert_cleaned_up(&self) -> Result<(), StaleResources> {
        Ok(())
    }
}

/// In-memory registry connecting peers in the same process.
///
/// Clones share one table, so hand one clone to each peer.
#[derive(Clone, Default)]
pub struct MemRegistry {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    table: Mutex<HashMap<(Domain, Port), Advert>>,
    published: Condvar,
}

impl Registry for MemRegistry {
    fn write(&self, domain: Domain, port: Port, advert: Advert) {
        let mut table = self.inner.table.lock().unwrap();
        tracing::debug!(%domain, %port, ring_ref = %advert.ring_ref, event_channel = %advert.event_channel, "published advert");
        table.insert((domain, port), advert);
        drop(table);
        self.inner.published.notify_all();
    }

    fn read(&self, domain: Domain, port: Port) -> Advert {
        let mut table = self.inner.table.lock().unwrap();
        loop {
            if let Some(advert) = table.get(&(domain, port)) {
                return advert.clone();
            }
            table = self.inner.published.wait(table).unwrap();
        }
    }

    fn delete(&self, domain: Domain, port: Port) {
        let mut table = self.inner.table.lock().unwrap();
        table.remove(&(domain, port));
    }

    fn assert_cleaned_up(&self) -> Result<(), StaleResources> {
        let table = self.inner.table.lock().unwrap();
        if table.is_empty() {
            Ok(())
        } else {
            Err(StaleResources::new("registry entries", table.len()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    const DOM: Domain = Domain::new(3);
    const PORT: Port = Port::new(5);

    fn advert(n: u32) -> Advert {
        Advert {
            ring_ref: n.to_string(),
            event_channel: "1".to_string(),
        }
    }

    #[test]
    fn read_returns_the_published_record() {
        let registry = MemRegistry::default();
        registry.write(DOM, PORT, advert(42));
        assert_eq!(registry.read(DOM, PORT), advert(42));

        registry.delete(DOM, PORT);
        registry.assert_cleaned_up().unwrap();
    }

    #[test]
    fn read_blocks_until_write() {
        let registry = MemRegistry::default();
        let reader = {
            let registry = registry.clone();
            thread::spawn(move || registry.read(DOM, PORT))
        };
        thread::sleep(Duration::from_millis(50));
        registry.write(DOM, PORT, advert(7));
        assert_eq!(reader.join().unwrap(), advert(7));
    }

    #[test]
    fn rewrite_replaces_and_wakes() {
        let registry = MemRegistry::default();
        registry.write(DOM, PORT, advert(1));
        registry.write(DOM, PORT, advert(2));
        assert_eq!(registry.read(DOM, PORT), advert(2));
    }

    #[test]
    fn keys_are_independent() {
        let registry = MemRegistry::default();
        registry.write(DOM, PORT, advert(1));
        registry.write(DOM, Port::new(6), advert(2));
        assert_eq!(registry.read(DOM, PORT), advert(1));
        assert_eq!(registry.read(DOM, Port::new(6)), advert(2));
    }

    #[test]
    fn leftover_records_fail_the_cleanup_check() {
        let registry = MemRegistry::default();
        registry.write(DOM, PORT, advert(1));
        let err = registry.assert_cleaned_up().unwrap_err();
        assert_eq!(err.resource(), "registry entries");
        assert_eq!(err.remaining(), 1);
    }
}
