//! Server-side counterpart of the source ingestion handshake: generates
//! the per-session salt/challenge, verifies the broadcaster's response,
//! and forwards authorized audio bytes into the shared resource table.

use crate::{
    codec::{Channel, FrameDecoder},
    constants::{PROTOCOL_V1_MAJOR, V1_AUDIO_CHANNEL, V1_CMD_CHANNEL, V2_AUDIO_CHANNEL, V2_CMD_CHANNEL},
    error::{ProtocolErrorCode, SessionError, SessionResult},
    observer::Subject,
    relay::ResourceTable,
    source::{command, compute_response, SessionState},
};
use rand::Rng;
use std::sync::Arc;
use tracing::{info, warn};

/// Looks up the plaintext password for a user attempting to broadcast.
///
/// User accounts are an external collaborator (see the crate's
/// non-goals); this is the boundary contract the ingest side takes a
/// handle to, rather than owning any persistence itself.
pub trait Authenticator: Send + Sync {
    /// Returns the stored password for `user`, if any.
    fn password_for(&self, user: &str) -> Option<String>;

    /// Resource name a successfully authorized `user` broadcasts under.
    /// Defaults to the user name itself.
    fn resource_name_for(&self, user: &str) -> String {
        user.to_string()
    }
}

/// The multicast notification points an [`IngestSession`] exposes.
#[derive(Default)]
pub struct IngestEvents {
    /// Fired once the broadcaster's response is accepted, carrying the
    /// authorized user name.
    pub authorized: Subject<String>,
    /// Fired once the transport is lost.
    pub connection_lost: Subject<String>,
    /// Fired on any protocol-level or authorization failure.
    pub error: Subject<(u16, String)>,
}

/// Server-side state machine mirroring [`crate::source::SourceSession`].
pub struct IngestSession {
    state: SessionState,
    major: u16,
    minor: u16,
    user: Option<String>,
    salt: String,
    challenge: String,
    resource_name: Option<String>,
    decoder: Option<FrameDecoder>,
    cmd_lines: command::LineBuffer,
    audio_channel: Channel,
    cmd_channel: Channel,
    authenticator: Arc<dyn Authenticator>,
    resources: Arc<ResourceTable>,
    /// Subscribe before driving the session.
    pub events: IngestEvents,
}

impl IngestSession {
    /// Creates a session with a freshly generated salt and challenge,
    /// backed by `authenticator` for credential lookup and `resources`
    /// for the ring the authorized broadcast will write into.
    pub fn new(authenticator: Arc<dyn Authenticator>, resources: Arc<ResourceTable>) -> Self {
        IngestSession {
            state: SessionState::Version,
            major: 0,
            minor: 0,
            user: None,
            salt: random_token(),
            challenge: random_token(),
            resource_name: None,
            decoder: None,
            cmd_lines: command::LineBuffer::new(),
            audio_channel: Channel::Id(V2_AUDIO_CHANNEL),
            cmd_channel: Channel::Id(V2_CMD_CHANNEL),
            authenticator,
            resources,
            events: IngestEvents::default(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Resource name this session is authorized to write to, once
    /// broadcasting.
    pub fn resource_name(&self) -> Option<&str> {
        self.resource_name.as_deref()
    }

    /// Processes the client's handshake line, returning the reply bytes to
    /// send: `OK\r\n` followed by the framed `Salt`/`Challenge` commands on
    /// success, or an error carrying the numeric protocol code.
    pub fn receive_handshake_line(&mut self, line: &str) -> SessionResult<Vec<u8>> {
        let line = line.trim_end_matches(['\r', '\n']);

        let major = match parse_handshake_line(line) {
            Some((major, _minor)) if major == 0 => {
                return Err(self.fail_handshake(ProtocolErrorCode::OldProtocol));
            },
            Some((major, minor)) => {
                self.minor = minor;
                major
            },
            None => {
                return Err(self.fail_handshake(ProtocolErrorCode::BadProtocol));
            },
        };

        self.major = major;
        let (audio, cmd) = if major == PROTOCOL_V1_MAJOR {
            (
                Channel::Name(V1_AUDIO_CHANNEL.to_string()),
                Channel::Name(V1_CMD_CHANNEL.to_string()),
            )
        } else {
            (Channel::Id(V2_AUDIO_CHANNEL), Channel::Id(V2_CMD_CHANNEL))
        };
        self.audio_channel = audio;
        self.cmd_channel = cmd;
        self.decoder = Some(if major == PROTOCOL_V1_MAJOR {
            FrameDecoder::v1()
        } else {
            FrameDecoder::v2()
        });
        self.state = SessionState::Authentication;

        let mut outbound = b"OK\r\n".to_vec();
        outbound.extend(self.encode_on_cmd_channel(&command::encode_command("Salt", &self.salt.clone())));
        outbound.extend(self.encode_on_cmd_channel(&command::encode_command("Challenge", &self.challenge.clone())));
        Ok(outbound)
    }

    fn fail_handshake(&mut self, code: ProtocolErrorCode) -> SessionError {
        self.state = SessionState::Closed;
        self.events.error.notify(&(code.code(), code.to_string()));
        SessionError::Protocol(code)
    }

    /// Feeds freshly received bytes through the frame decoder and the
    /// command-line buffer, dispatching commands and forwarding audio
    /// bytes into the resource table once broadcasting.
    ///
    /// Returns bytes the caller should write back (e.g. `Authorized`).
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
                    } else if frame.channel == self.audio_channel && self.state == SessionState::Broadcasting {
                        if let Some(resource_name) = self.resource_name.clone() {
                            self.resources.write(&resource_name, &frame.body);
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
            "user" => {
                self.user = Some(value.to_string());
                Vec::new()
            },
            "response" => self.verify_response(value),
            _ => Vec::new(),
        }
    }

    fn verify_response(&mut self, response: &str) -> Vec<u8> {
        let user = match self.user.clone() {
            Some(user) => user,
            None => return self.deny(1, "no user given"),
        };

        let password = match self.authenticator.password_for(&user) {
            Some(password) => password,
            None => return self.deny(2, "unknown user"),
        };

        let expected = compute_response(&password, &self.salt, &self.challenge);
        if expected != response {
            return self.deny(3, "bad response");
        }

        let resource_name = self.authenticator.resource_name_for(&user);
        self.resources.add_or_get(&resource_name);
        self.resource_name = Some(resource_name.clone());
        self.state = SessionState::Broadcasting;
        self.events.authorized.notify(&user);
        info!(user = %user, resource = %resource_name, "broadcaster authorized");

        self.encode_on_cmd_channel(&command::encode_command("Authorized", &user))
    }

    fn deny(&mut self, code: u16, msg: &str) -> Vec<u8> {
        self.state = SessionState::Closed;
        self.events.error.notify(&(code, msg.to_string()));
        warn!(code, msg, "denying broadcaster authorization");
        self.encode_on_cmd_channel(&command::encode_command("Error", &format!("{} {}", code, msg)))
    }

    /// Reports a new listener count to the broadcaster, as supplied by the
    /// relay-tier controller (out of scope for this core).
    pub fn update_listener_count(&self, count: u64) -> Vec<u8> {
        self.encode_on_cmd_channel(&command::encode_command("Listener-Count", &count.to_string()))
    }

    /// Call once the transport is lost; detaches the resource so no stale
    /// broadcaster keeps its ring registered after disconnect, matching
    /// the ring's "destroyed when the broadcaster disconnects" lifecycle.
    pub fn on_disconnected(&mut self, reason: impl Into<String>) {
        self.state = SessionState::Closed;
        if let Some(name) = &self.resource_name {
            self.resources.remove(name);
            info!(resource = %name, "broadcaster disconnected, resource removed");
        }
        self.events.connection_lost.notify(&reason.into());
    }

    fn encode_on_cmd_channel(&self, body: &[u8]) -> Vec<u8> {
        encode_on_channel(&self.cmd_channel, body)
    }
}

fn encode_on_channel(channel: &Channel, body: &[u8]) -> Vec<u8> {
    match channel {
        Channel::Name(name) => crate::codec::v1::encode(name, body).into_iter().flatten().collect(),
        Channel::Id(id) => crate::codec::v2::encode(*id, 0, body).into_iter().flatten().collect(),
    }
}

fn parse_handshake_line(line: &str) -> Option<(u16, u16)> {
    let rest = line.strip_prefix("MR.DJ ")?;
    let mut parts = rest.splitn(2, '/');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    Some((major, minor))
}

fn random_token() -> String {
    let mut rng = rand::thread_rng();
    (0..16).map(|_| format!("{:x}", rng.gen_range(0, 16))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    struct FixedAuth;
    impl Authenticator for FixedAuth {
        fn password_for(&self, user: &str) -> Option<String> {
            if user == "bob" {
                Some("pw".to_string())
            } else {
                None
            }
        }
    }

    fn new_session() -> (IngestSession, Arc<ResourceTable>) {
        let resources = Arc::new(ResourceTable::new(Config::default()));
        let session = IngestSession::new(Arc::new(FixedAuth), resources.clone());
        (session, resources)
    }

    #[test]
    fn ok_reply_carries_salt_and_challenge() {
        let (mut session, _resources) = new_session();
        let outbound = session.receive_handshake_line("MR.DJ 2/0\r\n").unwrap();
        assert!(outbound.starts_with(b"OK\r\n"));
        assert_eq!(session.state(), SessionState::Authentication);

        let mut decoder = FrameDecoder::v2();
        decoder.feed(&outbound[4..]);
        let salt_frame = decoder.get_frame().unwrap().unwrap();
        assert!(String::from_utf8_lossy(&salt_frame.body).starts_with("Salt: "));
    }

    #[test]
    fn major_zero_is_old_protocol() {
        let (mut session, _resources) = new_session();
        let err = session.receive_handshake_line("MR.DJ 0/0\r\n").unwrap_err();
        assert!(matches!(err, SessionError::Protocol(ProtocolErrorCode::OldProtocol)));
    }

    #[test]
    fn garbage_handshake_line_is_bad_protocol() {
        let (mut session, _resources) = new_session();
        let err = session.receive_handshake_line("nonsense\r\n").unwrap_err();
        assert!(matches!(err, SessionError::Protocol(ProtocolErrorCode::BadProtocol)));
    }

    #[test]
    fn correct_response_authorizes_and_creates_the_resource() {
        let (mut session, resources) = new_session();
        session.receive_handshake_line("MR.DJ 2/0\r\n").unwrap();

        let salt = session.salt.clone();
        let challenge = session.challenge.clone();
        let response = compute_response("pw", &salt, &challenge);

        let user_frame: Vec<u8> = crate::codec::v2::encode(V2_CMD_CHANNEL, 0, b"User: bob\r\n")
            .into_iter()
            .flatten()
            .collect();
        session.feed(&user_frame).unwrap();

        let response_line = format!("Response: {}\r\n", response);
        let response_frame: Vec<u8> = crate::codec::v2::encode(V2_CMD_CHANNEL, 0, response_line.as_bytes())
            .into_iter()
            .flatten()
            .collect();
        let outbound = session.feed(&response_frame).unwrap();

        assert_eq!(session.state(), SessionState::Broadcasting);
        assert_eq!(session.resource_name(), Some("bob"));
        assert!(resources.get("bob").is_some());

        let mut decoder = FrameDecoder::v2();
        decoder.feed(&outbound);
        let frame = decoder.get_frame().unwrap().unwrap();
        assert_eq!(frame.body, b"Authorized: bob\r\n".to_vec());
    }

    #[test]
    fn wrong_response_is_denied_and_closes() {
        let (mut session, _resources) = new_session();
        session.receive_handshake_line("MR.DJ 2/0\r\n").unwrap();

        let user_frame: Vec<u8> = crate::codec::v2::encode(V2_CMD_CHANNEL, 0, b"User: bob\r\n")
            .into_iter()
            .flatten()
            .collect();
        session.feed(&user_frame).unwrap();

        let bad_response: Vec<u8> = crate::codec::v2::encode(V2_CMD_CHANNEL, 0, b"Response: wrong\r\n")
            .into_iter()
            .flatten()
            .collect();
        session.feed(&bad_response).unwrap();

        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn disconnect_removes_the_resource() {
        let (mut session, resources) = new_session();
        session.receive_handshake_line("MR.DJ 2/0\r\n").unwrap();

        let salt = session.salt.clone();
        let challenge = session.challenge.clone();
        let response = compute_response("pw", &salt, &challenge);

        let user_frame: Vec<u8> = crate::codec::v2::encode(V2_CMD_CHANNEL, 0, b"User: bob\r\n")
            .into_iter()
            .flatten()
            .collect();
        session.feed(&user_frame).unwrap();
        let response_line = format!("Response: {}\r\n", response);
        let response_frame: Vec<u8> = crate::codec::v2::encode(V2_CMD_CHANNEL, 0, response_line.as_bytes())
            .into_iter()
            .flatten()
            .collect();
        session.feed(&response_frame).unwrap();

        assert!(resources.get("bob").is_some());
        session.on_disconnected("transport reset");
        assert!(resources.get("bob").is_none());
    }
}
