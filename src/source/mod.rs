//! Broadcaster-side (client) state machine for the source ingestion
//! protocol: version negotiation, challenge/response authentication, and
//! the framed audio/command write path once broadcasting.
//!
//! This type is transport-agnostic ("sans-IO"): it consumes bytes handed
//! to it by [`feed`][SourceSession::feed] and produces bytes the caller is
//! responsible for writing to the actual connection. This keeps the
//! protocol state machine directly testable without a live socket.

pub mod command;

use crate::{
    codec::{self, Channel, FrameDecoder},
    constants::{PROTOCOL_V1_MAJOR, V1_AUDIO_CHANNEL, V1_CMD_CHANNEL, V2_AUDIO_CHANNEL, V2_CMD_CHANNEL},
    error::{ProtocolErrorCode, SessionError, SessionResult},
    observer::Subject,
};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use tracing::{info, warn};

/// Lifecycle states shared by [`SourceSession`] and
/// [`crate::ingest::IngestSession`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionState {
    /// Handshake line sent/received; framing not yet chosen.
    Version,
    /// Framing chosen; salt/challenge/response exchange in progress.
    Authentication,
    /// Authorized; audio and further commands may flow.
    Broadcasting,
    /// Terminal: either side has ended the session.
    Closed,
}

/// The multicast notification points a [`SourceSession`] exposes.
#[derive(Default)]
pub struct SourceEvents {
    /// Fired once the caller reports the transport has connected.
    pub connecting_made: Subject<()>,
    /// Fired when the transport is lost, carrying a human-readable reason.
    pub connection_lost: Subject<String>,
    /// Fired once the server authorizes this session.
    pub authorized: Subject<()>,
    /// Fired whenever the server reports a new listener count.
    pub listener_count_changed: Subject<u64>,
    /// Fired after `write` hands off `n` audio bytes to the caller.
    pub data_written: Subject<usize>,
    /// Fired by [`SourceSession::mark_sent`] once bytes are actually on
    /// the wire.
    pub data_sent: Subject<usize>,
    /// Fired on any protocol-level or server-reported error, as `(code, msg)`.
    pub error: Subject<(u16, String)>,
}

/// Client-side state machine for the source ingestion handshake.
pub struct SourceSession {
    state: SessionState,
    user: String,
    password: String,
    major: u16,
    minor: u16,
    salt: Option<String>,
    challenge: Option<String>,
    offset: u64,
    listener_count: u64,
    decoder: Option<FrameDecoder>,
    cmd_lines: command::LineBuffer,
    audio_channel: Channel,
    cmd_channel: Channel,
    /// Multicast notification points; subscribe before driving the session.
    pub events: SourceEvents,
}

impl SourceSession {
    /// Creates a session that will advertise `major`/`minor` and
    /// authenticate as `user`/`password` once challenged.
    pub fn new(user: impl Into<String>, password: impl Into<String>, major: u16, minor: u16) -> Self {
        SourceSession {
            state: SessionState::Version,
            user: user.into(),
            password: password.into(),
            major,
            minor,
            salt: None,
            challenge: None,
            offset: 0,
            listener_count: 0,
            decoder: None,
            cmd_lines: command::LineBuffer::new(),
            audio_channel: Channel::Id(V2_AUDIO_CHANNEL),
            cmd_channel: Channel::Id(V2_CMD_CHANNEL),
            events: SourceEvents::default(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Bytes of audio written since authorization.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Most recently reported listener count.
    pub fn listener_count(&self) -> u64 {
        self.listener_count
    }

    /// The pre-framing handshake line to send first.
    pub fn handshake_line(&self) -> Vec<u8> {
        format!("MR.DJ {}/{}\r\n", self.major, self.minor).into_bytes()
    }

    /// Call once the caller's transport has connected, before sending the
    /// handshake line.
    pub fn on_connected(&self) {
        self.events.connecting_made.notify(&());
    }

    /// Call once the caller's transport is lost, for whatever reason.
    pub fn on_disconnected(&mut self, reason: impl Into<String>) {
        self.state = SessionState::Closed;
        let reason = reason.into();
        info!(reason = %reason, "source connection lost");
        self.events.connection_lost.notify(&reason);
    }

    /// Records that `n` bytes already handed to the caller have actually
    /// reached the transport. Call this from a counting write wrapper
    /// (see [`crate::transport::CountingWriter`]) rather than reaching
    /// into the transport itself.
    pub fn mark_sent(&self, n: usize) {
        self.events.data_sent.notify(&n);
    }

    /// Processes the server's single-line reply to the handshake.
    ///
    /// Returns the command bytes to send next (the initial `User:` line)
    /// on success, or an error carrying the numeric protocol code on
    /// failure. Either outcome transitions `state`.
    pub fn receive_handshake_reply(&mut self, line: &str) -> SessionResult<Vec<u8>> {
        let line = line.trim_end_matches(['\r', '\n']);

        match line {
            "OK" => {
                let (audio, cmd) = if self.major == PROTOCOL_V1_MAJOR {
                    (
                        Channel::Name(V1_AUDIO_CHANNEL.to_string()),
                        Channel::Name(V1_CMD_CHANNEL.to_string()),
                    )
                } else {
                    (Channel::Id(V2_AUDIO_CHANNEL), Channel::Id(V2_CMD_CHANNEL))
                };
                self.audio_channel = audio;
                self.cmd_channel = cmd;
                self.decoder = Some(if self.major == PROTOCOL_V1_MAJOR {
                    FrameDecoder::v1()
                } else {
                    FrameDecoder::v2()
                });
                self.state = SessionState::Authentication;

                let user = self.user.clone();
                Ok(self.encode_on_cmd_channel(&command::encode_command("User", &user)))
            },
            "OLD_PROTOCOL" => Err(self.fail_handshake(ProtocolErrorCode::OldProtocol)),
            "BAD_PROTOCOL" => Err(self.fail_handshake(ProtocolErrorCode::BadProtocol)),
            _ => Err(self.fail_handshake(ProtocolErrorCode::Unknown)),
        }
    }

    fn fail_handshake(&mut self, code: ProtocolErrorCode) -> SessionError {
        self.state = SessionState::Closed;
        warn!(code = code.code(), reason = %code, "handshake rejected");
        self.events.error.notify(&(code.code(), code.to_string()));
        SessionError::Protocol(code)
    }

    /// Feeds freshly received bytes through the frame decoder and the
    /// command-line buffer, dispatching any complete commands.
    ///
    /// Returns bytes the caller should write back (e.g. an auth
    /// `Response`), accumulated across every command processed.
    pub fn feed(&mut self, bytes: &[u8]) -> SessionResult<Vec<u8>> {
        let mut decoder = self
            .decoder
            .take()
            .expect("feed called before the handshake selected a codec");

        decoder.feed(bytes);
        let mut outbound = Vec::new();

        loop {
            match decoder.get_frame() {
                Ok(Some(frame)) => {
                    if frame.channel == self.cmd_channel {
                        self.cmd_lines.feed(&frame.body);
                        while let Some((name, value)) = self.cmd_lines.next_command() {
                            outbound.extend(self.handle_command(&name, &value));
                        }
                    }
                },
                Ok(None) => break,
                Err(e) => {
                    self.decoder = Some(decoder);
                    return Err(SessionError::from(e));
                },
            }
        }

        self.decoder = Some(decoder);
        Ok(outbound)
    }

    fn handle_command(&mut self, name: &str, value: &str) -> Vec<u8> {
        match name {
            "salt" => {
                self.salt = Some(value.to_string());
                self.maybe_send_response()
            },
            "challenge" => {
                self.challenge = Some(value.to_string());
                self.maybe_send_response()
            },
            "authorized" => {
                self.state = SessionState::Broadcasting;
                self.events.authorized.notify(&());
                info!(user = %self.user, "authorized, broadcasting");
                Vec::new()
            },
            "error" => {
                let (code, msg) = parse_error_value(value);
                self.state = SessionState::Closed;
                warn!(code, msg = %msg, "server reported error, closing");
                self.events.error.notify(&(code, msg));
                Vec::new()
            },
            "listener-count" => {
                if self.state == SessionState::Broadcasting {
                    if let Ok(n) = value.parse::<u64>() {
                        self.listener_count = n;
                        self.events.listener_count_changed.notify(&n);
                    }
                }
                Vec::new()
            },
            _ => Vec::new(),
        }
    }

    fn maybe_send_response(&mut self) -> Vec<u8> {
        match (self.salt.clone(), self.challenge.clone()) {
            (Some(salt), Some(challenge)) => {
                let response = compute_response(&self.password, &salt, &challenge);
                self.encode_on_cmd_channel(&command::encode_command("Response", &response))
            },
            _ => Vec::new(),
        }
    }

    /// Splits and frames `audio_bytes` for the audio channel, advancing
    /// `offset`. Only valid once `state() == Broadcasting`.
    pub fn write(&mut self, audio_bytes: &[u8]) -> Vec<u8> {
        self.offset += audio_bytes.len() as u64;
        self.events.data_written.notify(&audio_bytes.len());
        self.encode_on_audio_channel(audio_bytes)
    }

    /// Encodes a music-info command for the currently negotiated version,
    /// injecting the session's current `offset`.
    pub fn update_music_info(&self, tags: &HashMap<String, String>) -> Vec<u8> {
        let encoded = command::encode_music_info(self.major, tags, self.offset);
        self.encode_on_cmd_channel(&command::encode_command("Music-Info", &encoded))
    }

    fn encode_on_cmd_channel(&self, body: &[u8]) -> Vec<u8> {
        encode_on_channel(&self.cmd_channel, body)
    }

    fn encode_on_audio_channel(&self, body: &[u8]) -> Vec<u8> {
        encode_on_channel(&self.audio_channel, body)
    }
}

fn encode_on_channel(channel: &Channel, body: &[u8]) -> Vec<u8> {
    match channel {
        Channel::Name(name) => codec::v1::encode(name, body).into_iter().flatten().collect(),
        Channel::Id(id) => codec::v2::encode(*id, 0, body).into_iter().flatten().collect(),
    }
}

fn parse_error_value(value: &str) -> (u16, String) {
    let mut parts = value.splitn(2, ' ');
    let code = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let msg = parts.next().unwrap_or("").to_string();
    (code, msg)
}

/// `H(x)` per the handshake design: SHA-1 hex digest of the UTF-8 bytes of `x`.
fn sha1_hex(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().iter().map(|b| format!("{:02x}", b)).collect()
}

/// `response = H(H(password ++ salt) ++ challenge)`, all concatenations of
/// hex-ASCII strings with no separators.
pub fn compute_response(password: &str, salt: &str, challenge: &str) -> String {
    let step1 = sha1_hex(format!("{}{}", password, salt).as_bytes());
    sha1_hex(format!("{}{}", step1, challenge).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_response_hash_matches_the_reference_vector() {
        let response = compute_response("pw", "abc", "xyz");
        let step1 = sha1_hex(b"pwabc");
        let expected = sha1_hex(format!("{}xyz", step1).as_bytes());
        assert_eq!(response, expected);
    }

    #[test]
    fn handshake_line_uses_the_advertised_version() {
        let session = SourceSession::new("bob", "pw", 2, 0);
        assert_eq!(session.handshake_line(), b"MR.DJ 2/0\r\n".to_vec());
    }

    #[test]
    fn ok_reply_selects_v2_and_sends_user_command() {
        let mut session = SourceSession::new("bob", "pw", 2, 0);
        let outbound = session.receive_handshake_reply("OK\r\n").unwrap();
        assert_eq!(session.state(), SessionState::Authentication);

        let mut decoder = FrameDecoder::v2();
        decoder.feed(&outbound);
        let frame = decoder.get_frame().unwrap().unwrap();
        assert_eq!(frame.channel, Channel::Id(V2_CMD_CHANNEL));
        assert_eq!(frame.body, b"User: bob\r\n".to_vec());
    }

    #[test]
    fn ok_reply_selects_v1_for_major_one() {
        let mut session = SourceSession::new("bob", "pw", 1, 0);
        session.receive_handshake_reply("OK\r\n").unwrap();

        let outbound = session.write(b"abc");
        let mut decoder = FrameDecoder::v1();
        decoder.feed(&outbound);
        let frame = decoder.get_frame().unwrap().unwrap();
        assert_eq!(frame.channel, Channel::Name("audio".to_string()));
        assert_eq!(frame.body, b"abc".to_vec());
    }

    #[test]
    fn old_and_bad_protocol_replies_close_with_the_right_code() {
        let mut session = SourceSession::new("bob", "pw", 2, 0);
        let err = session.receive_handshake_reply("OLD_PROTOCOL\r\n").unwrap_err();
        assert!(matches!(err, SessionError::Protocol(ProtocolErrorCode::OldProtocol)));
        assert_eq!(session.state(), SessionState::Closed);

        let mut session = SourceSession::new("bob", "pw", 2, 0);
        let err = session.receive_handshake_reply("BAD_PROTOCOL\r\n").unwrap_err();
        assert!(matches!(err, SessionError::Protocol(ProtocolErrorCode::BadProtocol)));

        let mut session = SourceSession::new("bob", "pw", 2, 0);
        let err = session.receive_handshake_reply("SOMETHING_ELSE\r\n").unwrap_err();
        assert!(matches!(err, SessionError::Protocol(ProtocolErrorCode::Unknown)));
    }

    #[test]
    fn salt_then_challenge_triggers_a_response_command() {
        let mut session = SourceSession::new("bob", "pw", 2, 0);
        session.receive_handshake_reply("OK\r\n").unwrap();

        let salt_frame: Vec<u8> = codec::v2::encode(V2_CMD_CHANNEL, 0, b"Salt: abc\r\n")
            .into_iter()
            .flatten()
            .collect();
        let outbound = session.feed(&salt_frame).unwrap();
        assert!(outbound.is_empty());

        let challenge_frame: Vec<u8> = codec::v2::encode(V2_CMD_CHANNEL, 0, b"Challenge: xyz\r\n")
            .into_iter()
            .flatten()
            .collect();
        let outbound = session.feed(&challenge_frame).unwrap();

        let mut decoder = FrameDecoder::v2();
        decoder.feed(&outbound);
        let frame = decoder.get_frame().unwrap().unwrap();
        let expected = format!("Response: {}\r\n", compute_response("pw", "abc", "xyz"));
        assert_eq!(frame.body, expected.into_bytes());
    }

    #[test]
    fn authorized_transitions_to_broadcasting_and_fires_event() {
        use std::sync::{atomic::{AtomicBool, Ordering}, Arc};

        let mut session = SourceSession::new("bob", "pw", 2, 0);
        session.receive_handshake_reply("OK\r\n").unwrap();

        let fired = Arc::new(AtomicBool::new(false));
        let fired_inner = fired.clone();
        session.events.authorized.subscribe(move |_| fired_inner.store(true, Ordering::SeqCst));

        let frame: Vec<u8> = codec::v2::encode(V2_CMD_CHANNEL, 0, b"Authorized: bob\r\n")
            .into_iter()
            .flatten()
            .collect();
        session.feed(&frame).unwrap();

        assert_eq!(session.state(), SessionState::Broadcasting);
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn listener_count_changed_fires_exactly_once() {
        use std::sync::{atomic::{AtomicUsize, Ordering}, Arc};

        let mut session = SourceSession::new("bob", "pw", 2, 0);
        session.receive_handshake_reply("OK\r\n").unwrap();

        let authorized: Vec<u8> = codec::v2::encode(V2_CMD_CHANNEL, 0, b"Authorized: bob\r\n")
            .into_iter()
            .flatten()
            .collect();
        session.feed(&authorized).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_inner = calls.clone();
        session
            .events
            .listener_count_changed
            .subscribe(move |_| { calls_inner.fetch_add(1, Ordering::SeqCst); });

        let listener_count: Vec<u8> = codec::v2::encode(V2_CMD_CHANNEL, 0, b"Listener-Count: 42\r\n")
            .into_iter()
            .flatten()
            .collect();
        session.feed(&listener_count).unwrap();

        assert_eq!(session.listener_count(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
