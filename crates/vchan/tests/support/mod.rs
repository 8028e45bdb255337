//! Shared wiring for the integration tests: an in-memory substrate and a
//! connected channel pair running one peer per thread.

#![allow(dead_code)]

use std::thread;

use vchan::Channel;
use vchan_primitives::{
    Domain, Events as _, Grants as _, MemEvents, MemGrants, MemRegistry, Port, Registry as _,
};

pub const DOM: Domain = Domain::new(0);
pub const PORT: Port = Port::new(1);

pub type MemChannel = Channel<MemGrants, MemEvents, MemRegistry>;

/// One in-memory substrate; clone the handles freely, they share state.
#[derive(Clone, Default)]
pub struct Substrate {
    pub grants: MemGrants,
    pub events: MemEvents,
    pub registry: MemRegistry,
}

impl Substrate {
    pub fn new() -> Self {
        init_tracing();
        Self::default()
    }

    /// Serve on a fresh thread (the call blocks until a client attaches).
    pub fn spawn_server(
        &self,
        read_size: u32,
        write_size: u32,
    ) -> thread::JoinHandle<MemChannel> {
        let Substrate { grants, events, registry } = self.clone();
        thread::spawn(move || {
            vchan::server(grants, events, registry, DOM, PORT, read_size, write_size).unwrap()
        })
    }

    pub fn client(&self) -> MemChannel {
        let Substrate { grants, events, registry } = self.clone();
        vchan::client(grants, events, registry, DOM, PORT).unwrap()
    }

    /// Every substrate must be empty once both ends have closed.
    pub fn assert_cleaned_up(&self) {
        self.grants.assert_cleaned_up().unwrap();
        self.events.assert_cleaned_up().unwrap();
        self.registry.assert_cleaned_up().unwrap();
    }
}

/// A connected `(server, client)` pair plus the substrate underneath it.
pub fn pair(read_size: u32, write_size: u32) -> (MemChannel, MemChannel, Substrate) {
    let substrate = Substrate::new();
    let server = substrate.spawn_server(read_size, write_size);
    let client = substrate.client();
    (server.join().unwrap(), client, substrate)
}

/// Deterministic byte pattern for payload checks.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Drain `total` bytes out of a channel, however it chunks them.
pub fn read_exact(channel: &mut MemChannel, total: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(total);
    while out.len() < total {
        let chunk = channel
            .read()
            .unwrap()
            .expect("stream ended before the expected bytes arrived");
        out.extend_from_slice(chunk);
    }
    assert_eq!(out.len(), total, "read overshot the expected byte count");
    out
}

pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
