//! State-level lifecycle tests: join rollback, visibility refcounts,
//! nick re-keying, and teardown invariants, exercised through the
//! `ServerState` API directly.

use std::io;

use minircd_core::engine::Transport;
use minircd_core::{Config, Error, ServerState};
use uuid::Uuid;

/// Write-only sink for draining send queues in tests.
struct Sink {
    out: Vec<u8>,
}

impl Sink {
    fn new() -> Self {
        Self { out: Vec::new() }
    }

    fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.out)
            .split("\r\n")
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl Transport for Sink {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::WouldBlock, "write-only"))
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.out.extend_from_slice(buf);
        Ok(buf.len())
    }
}

fn connect_with_nick(state: &mut ServerState, nick: &str) -> Uuid {
    let id = state.register_connection("127.0.0.1".to_string()).unwrap();
    state.change_nick(id, nick).unwrap();
    id
}

#[test]
fn test_join_links_all_members() {
    let mut state = ServerState::new(Config::default());
    let a = connect_with_nick(&mut state, "alice");
    let b = connect_with_nick(&mut state, "bob");
    let c = connect_with_nick(&mut state, "carol");

    state.join_channel(a, "#x").unwrap();
    state.join_channel(b, "#x").unwrap();
    state.join_channel(c, "#x").unwrap();

    // 3 memberships + 3 pairwise visibility links.
    assert_eq!(state.link_count(), 6);
    assert_eq!(state.peer_ids(c).len(), 2);
    assert_eq!(state.member_ids("#x").len(), 3);
}

#[test]
fn test_shared_channels_share_one_visibility_link() {
    let mut state = ServerState::new(Config::default());
    let a = connect_with_nick(&mut state, "alice");
    let b = connect_with_nick(&mut state, "bob");

    state.join_channel(a, "#x").unwrap();
    state.join_channel(b, "#x").unwrap();
    state.join_channel(a, "#y").unwrap();
    state.join_channel(b, "#y").unwrap();

    // 4 memberships, 1 visibility link at refcount 2.
    assert_eq!(state.link_count(), 5);
    assert_eq!(state.peer_ids(a), vec![b]);

    state.leave_channel(a, "#x");
    // Still visible through #y.
    assert_eq!(state.peer_ids(a), vec![b]);
    state.leave_channel(a, "#y");
    assert!(state.peer_ids(a).is_empty());
    assert!(state.peer_ids(b).is_empty());
}

#[test]
fn test_join_rolls_back_on_link_exhaustion() {
    let mut config = Config::default();
    config.limits.max_links = 4;
    let mut state = ServerState::new(config);
    let a = connect_with_nick(&mut state, "alice");
    let b = connect_with_nick(&mut state, "bob");
    let c = connect_with_nick(&mut state, "carol");

    state.join_channel(a, "#x").unwrap();
    state.join_channel(b, "#x").unwrap();
    assert_eq!(state.link_count(), 3);

    // carol needs 2 visibility links + 1 membership; only 1 slot left.
    let err = state.join_channel(c, "#x").unwrap_err();
    assert!(matches!(err, Error::CapacityExceeded(_)));

    // Nothing of the failed join remains.
    assert_eq!(state.link_count(), 3);
    assert!(state.user(c).channels.is_empty());
    assert!(state.user(c).peers.is_empty());
    assert_eq!(state.peer_ids(a), vec![b]);
    assert_eq!(state.member_ids("#x").len(), 2);
}

#[test]
fn test_failed_first_join_destroys_created_channel() {
    let mut config = Config::default();
    config.limits.max_links = 0;
    config.limits.max_channels_per_user = 16;
    let mut state = ServerState::new(config);
    let a = connect_with_nick(&mut state, "alice");

    assert!(state.join_channel(a, "#new").is_err());
    assert!(state.find_channel("#new").is_none());
    assert_eq!(state.channel_count(), 0);
}

#[test]
fn test_channel_limit_enforced() {
    let mut config = Config::default();
    config.limits.max_channels = 1;
    let mut state = ServerState::new(config);
    let a = connect_with_nick(&mut state, "alice");

    state.join_channel(a, "#one").unwrap();
    assert!(matches!(
        state.join_channel(a, "#two"),
        Err(Error::CapacityExceeded(_))
    ));
    assert_eq!(state.channel_count(), 1);
}

#[test]
fn test_disconnect_unlinks_everything() {
    let mut state = ServerState::new(Config::default());
    let a = connect_with_nick(&mut state, "alice");
    let b = connect_with_nick(&mut state, "bob");
    state.join_channel(a, "#x").unwrap();
    state.join_channel(b, "#x").unwrap();
    state.join_channel(a, "#y").unwrap();

    state.disconnect_user(a, "Ping timeout");

    assert!(state.is_quit(a));
    assert!(state.find_user("alice").is_none());
    assert!(state.peer_ids(b).is_empty());
    // #y had only alice and is gone; #x survives with bob.
    assert!(state.find_channel("#y").is_none());
    assert_eq!(state.member_ids("#x"), vec![b]);

    let mut sink = Sink::new();
    state.flush(b, &mut sink).unwrap();
    assert!(sink
        .lines()
        .iter()
        .any(|l| l == ":alice!unknown@127.0.0.1 QUIT :Ping timeout"));

    let before = state.user_count();
    state.release_connection(a);
    assert_eq!(state.user_count(), before - 1);
}

#[test]
fn test_disconnect_is_idempotent() {
    let mut state = ServerState::new(Config::default());
    let a = connect_with_nick(&mut state, "alice");
    state.join_channel(a, "#x").unwrap();

    state.disconnect_user(a, "first");
    state.disconnect_user(a, "second");
    assert!(state.is_quit(a));
    state.release_connection(a);
    state.release_connection(a);
    assert_eq!(state.user_count(), 0);
}

#[test]
fn test_nick_change_rekeys_indexes() {
    let mut state = ServerState::new(Config::default());
    let a = connect_with_nick(&mut state, "anna");
    let b = connect_with_nick(&mut state, "bob");
    state.join_channel(a, "#x").unwrap();
    state.join_channel(b, "#x").unwrap();

    state.change_nick(a, "alice").unwrap();

    assert!(state.find_user("anna").is_none());
    assert_eq!(state.find_user("alice").unwrap().id, a);
    assert!(state.user(b).peers.contains("alice"));
    assert!(!state.user(b).peers.contains("anna"));
    let chan = state.find_channel("#x").unwrap();
    assert!(chan.members.contains("alice"));
    assert!(!chan.members.contains("anna"));
    // Visibility is intact.
    assert_eq!(state.peer_ids(b), vec![a]);
}

#[test]
fn test_nick_case_change_allowed() {
    let mut state = ServerState::new(Config::default());
    let a = connect_with_nick(&mut state, "alice");

    state.change_nick(a, "Alice").unwrap();
    assert_eq!(state.user(a).nick.as_deref(), Some("Alice"));
    assert_eq!(state.find_user("alice").unwrap().id, a);
}

#[test]
fn test_nick_conflict_detected() {
    let mut state = ServerState::new(Config::default());
    let _a = connect_with_nick(&mut state, "alice");
    let b = state.register_connection("127.0.0.1".to_string()).unwrap();

    assert!(matches!(
        state.change_nick(b, "ALICE"),
        Err(Error::NicknameInUse(_))
    ));
    assert_eq!(state.user(b).nick, None);
}

#[test]
fn test_client_limit_enforced() {
    let mut config = Config::default();
    config.limits.max_clients = 2;
    let mut state = ServerState::new(config);
    state.register_connection("h1".to_string()).unwrap();
    state.register_connection("h2".to_string()).unwrap();
    assert!(matches!(
        state.register_connection("h3".to_string()),
        Err(Error::CapacityExceeded(_))
    ));
}

#[test]
fn test_queue_overflow_dooms_target_not_sender() {
    let mut config = Config::default();
    config.buffers.sendq = 64;
    let mut state = ServerState::new(config);
    let a = connect_with_nick(&mut state, "alice");

    state.queue(a, &"x".repeat(100));
    assert_eq!(state.doom_reason(a).as_deref(), Some("SendQ exceeded"));
    // Further output to a doomed user is dropped silently.
    state.queue(a, "y");
    assert!(!state.is_quit(a));
}
