//! Teardown ordering, end-of-stream reporting, and resource hygiene.

mod support;

use std::thread;
use std::time::Duration;

use support::{pair, pattern, read_exact};
use vchan::WriteStatus;

#[test]
fn server_close_then_client_close() {
    let (server, mut client, substrate) = pair(1024, 1024);
    server.close().unwrap();

    assert_eq!(client.read().unwrap(), None);
    assert_eq!(client.write(b"anyone?").unwrap(), WriteStatus::Eof { written: 0 });
    assert_eq!(client.writev(&[b"still", b"there?"]).unwrap(), WriteStatus::Eof { written: 0 });
    assert_eq!(client.state().unwrap(), vchan::State::Exited);

    client.close().unwrap();
    substrate.assert_cleaned_up();
}

#[test]
fn client_close_then_server_close() {
    let (mut server, client, substrate) = pair(1024, 1024);
    client.close().unwrap();

    assert_eq!(server.read().unwrap(), None);
    assert_eq!(server.write(b"gone").unwrap(), WriteStatus::Eof { written: 0 });
    assert_eq!(server.state().unwrap(), vchan::State::Exited);

    server.close().unwrap();
    substrate.assert_cleaned_up();
}

#[test]
fn buffered_data_outlives_the_writer() {
    let (mut server, mut client, substrate) = pair(1024, 1024);

    assert_eq!(server.write(b"tail").unwrap(), WriteStatus::Complete);
    server.close().unwrap();

    // The bytes were already in the ring; they drain before the Eof shows.
    assert_eq!(client.read().unwrap().unwrap(), b"tail");
    assert_eq!(client.read().unwrap(), None);

    client.close().unwrap();
    substrate.assert_cleaned_up();
}

#[test]
fn dropping_both_ends_releases_everything() {
    let (server, client, substrate) = pair(9000, 5000);
    drop(client);
    drop(server);
    substrate.assert_cleaned_up();
}

#[test]
fn blocked_writer_wakes_on_peer_close() {
    let (server, client, substrate) = pair(1024, 16);

    let writer = {
        let mut client = client;
        thread::spawn(move || {
            let status = client.write(&pattern(5000)).unwrap();
            (status, client)
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!writer.is_finished(), "writer should be parked on the full ring");
    server.close().unwrap();

    let (status, client) = writer.join().unwrap();
    assert_eq!(status, WriteStatus::Eof { written: 1024 });

    client.close().unwrap();
    substrate.assert_cleaned_up();
}

#[test]
fn blocked_reader_wakes_on_peer_close() {
    let (server, client, substrate) = pair(1024, 1024);

    let reader = {
        let mut server = server;
        thread::spawn(move || {
            let end = server.read().unwrap().map(<[u8]>::to_vec);
            (end, server)
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!reader.is_finished(), "reader should be parked on the empty ring");
    client.close().unwrap();

    let (end, server) = reader.join().unwrap();
    assert_eq!(end, None);

    server.close().unwrap();
    substrate.assert_cleaned_up();
}

#[test]
fn close_after_close_is_a_quiet_drop() {
    // `close` consumes the handle, so the only second close is the drop
    // that runs right after it; the substrate must not see a second
    // release of anything.
    let (server, client, substrate) = pair(1024, 1024);
    client.close().unwrap();
    server.close().unwrap();
    substrate.assert_cleaned_up();
}

#[test]
fn the_substrate_outlives_a_channel() {
    // A second connection over the same substrate must find no residue of
    // the first: no stale grants, ports, or adverts.
    let (server, client, substrate) = pair(1024, 1024);
    client.close().unwrap();
    server.close().unwrap();
    substrate.assert_cleaned_up();

    let server = substrate.spawn_server(2048, 2048);
    let mut client = substrate.client();
    let mut server = server.join().unwrap();

    assert_eq!(client.write(b"again").unwrap(), WriteStatus::Complete);
    assert_eq!(read_exact(&mut server, 5), b"again");

    client.close().unwrap();
    server.close().unwrap();
    substrate.assert_cleaned_up();
}
