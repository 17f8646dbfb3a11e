//! Drives a [`SourceSession`] and an [`IngestSession`] against each other
//! directly, byte for byte, with no real socket involved — both sides are
//! sans-IO state machines, so the full version/salt/challenge/response/
//! authorized handshake plus the first audio write can be exercised as a
//! single in-process round trip.

use radiant_relay_core::{
    ingest::{Authenticator, IngestSession},
    relay::ResourceTable,
    source::SourceSession,
    Config,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

struct FixedAuth;

impl Authenticator for FixedAuth {
    fn password_for(&self, user: &str) -> Option<String> {
        (user == "bob").then(|| "hunter2".to_string())
    }
}

#[test]
fn full_v2_handshake_authorizes_and_forwards_audio() {
    let config = Config::default().block_size(3).block_count(10);
    let resources = Arc::new(ResourceTable::new(config));

    let mut client = SourceSession::new("bob", "hunter2", 2, 0);
    let mut server = IngestSession::new(Arc::new(FixedAuth), resources.clone());

    let authorized = Arc::new(AtomicBool::new(false));
    let authorized_flag = authorized.clone();
    client.events.authorized.subscribe(move |_| authorized_flag.store(true, Ordering::SeqCst));

    // 1. Client sends the pre-framing handshake line.
    let handshake_line = client.handshake_line();
    assert_eq!(handshake_line, b"MR.DJ 2/0\r\n".to_vec());

    // 2. Server replies OK, framed Salt and Challenge commands.
    let server_reply = server
        .receive_handshake_line(std::str::from_utf8(&handshake_line).unwrap())
        .unwrap();
    assert!(server_reply.starts_with(b"OK\r\n"));

    // 3. Client consumes the "OK" line, then the framed Salt/Challenge.
    let ok_line_len = b"OK\r\n".len();
    let user_cmd = client.receive_handshake_reply("OK\r\n").unwrap();
    let response_cmd = client.feed(&server_reply[ok_line_len..]).unwrap();

    // 4. Server consumes the client's "User:" command, then its "Response:".
    let empty = server.feed(&user_cmd).unwrap();
    assert!(empty.is_empty());
    let authorized_frame = server.feed(&response_cmd).unwrap();
    assert!(!authorized_frame.is_empty());
    assert_eq!(server.resource_name(), Some("bob"));

    // 5. Client consumes "Authorized: bob", transitioning to Broadcasting.
    let trailing = client.feed(&authorized_frame).unwrap();
    assert!(trailing.is_empty());
    assert!(authorized.load(Ordering::SeqCst));

    // 6. Client writes audio; server forwards it into the resource table.
    let audio_frame = client.write(b"abcdefghi");
    let trailing = server.feed(&audio_frame).unwrap();
    assert!(trailing.is_empty());

    assert!(resources.get("bob").is_some());
    assert_eq!(client.offset(), 9);
}

#[test]
fn wrong_password_is_denied_and_never_creates_a_resource() {
    let config = Config::default();
    let resources = Arc::new(ResourceTable::new(config));

    let mut client = SourceSession::new("bob", "wrong-password", 2, 0);
    let mut server = IngestSession::new(Arc::new(FixedAuth), resources.clone());

    let handshake_line = client.handshake_line();
    let server_reply = server
        .receive_handshake_line(std::str::from_utf8(&handshake_line).unwrap())
        .unwrap();

    let ok_line_len = b"OK\r\n".len();
    let user_cmd = client.receive_handshake_reply("OK\r\n").unwrap();
    let response_cmd = client.feed(&server_reply[ok_line_len..]).unwrap();

    server.feed(&user_cmd).unwrap();
    let error_frame = server.feed(&response_cmd).unwrap();
    assert!(!error_frame.is_empty());

    client.feed(&error_frame).unwrap();
    assert!(resources.get("bob").is_none());
}
