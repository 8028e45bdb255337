//! Load tests: sustained transfer, tiny chunks, echo traffic.

mod support;

use std::thread;

use support::{pair, pattern, read_exact};
use vchan::WriteStatus;

#[test]
fn sustained_transfer_through_a_small_ring() {
    let (mut server, client, substrate) = pair(1024, 16);
    let payload = pattern(200_000);

    let writer = {
        let payload = payload.clone();
        let mut client = client;
        thread::spawn(move || {
            // Uneven chunk sizes so the wrap point keeps moving.
            let mut at = 0;
            for size in (1usize..=13).cycle() {
                if at >= payload.len() {
                    break;
                }
                let end = (at + size).min(payload.len());
                assert_eq!(client.write(&payload[at..end]).unwrap(), WriteStatus::Complete);
                at = end;
            }
            client
        })
    };

    let got = read_exact(&mut server, payload.len());
    assert_eq!(got, payload);

    writer.join().unwrap().close().unwrap();
    server.close().unwrap();
    substrate.assert_cleaned_up();
}

#[test]
fn echo_roundtrip_under_load() {
    let (server, client, substrate) = pair(4096, 4096);

    // Server: echo until the client hangs up.
    let echo = {
        let mut server = server;
        thread::spawn(move || {
            let mut echoed = 0usize;
            loop {
                let chunk = match server.read().unwrap() {
                    Some(chunk) => chunk.to_vec(),
                    None => break,
                };
                echoed += chunk.len();
                if server.write(&chunk).unwrap().is_eof() {
                    break;
                }
            }
            (echoed, server)
        })
    };

    let mut client = client;
    let mut sent = 0usize;
    // Chunks stay well under both ring sizes, so a full write-then-read
    // cycle can never wedge on a full ring.
    for round in 0..200usize {
        let chunk: Vec<u8> = (0..(round % 900) + 1).map(|i| (i ^ round) as u8).collect();
        assert_eq!(client.write(&chunk).unwrap(), WriteStatus::Complete);
        let back = read_exact(&mut client, chunk.len());
        assert_eq!(back, chunk);
        sent += chunk.len();
    }
    client.close().unwrap();

    let (echoed, server) = echo.join().unwrap();
    assert_eq!(echoed, sent);
    server.close().unwrap();
    substrate.assert_cleaned_up();
}

#[test]
fn chunks_never_exceed_the_ring() {
    let (mut server, client, substrate) = pair(1024, 16);

    let writer = {
        let mut client = client;
        thread::spawn(move || {
            assert_eq!(client.write(&pattern(50_000)).unwrap(), WriteStatus::Complete);
            client
        })
    };

    let mut seen = 0usize;
    while seen < 50_000 {
        let chunk = server.read().unwrap().unwrap();
        assert!(!chunk.is_empty());
        assert!(chunk.len() <= 1024, "chunk larger than the ring: {}", chunk.len());
        seen += chunk.len();
    }
    assert_eq!(seen, 50_000);

    writer.join().unwrap().close().unwrap();
    server.close().unwrap();
    substrate.assert_cleaned_up();
}
