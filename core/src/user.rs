//! User (connection) entity and the registration state machine.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::buffer::{RecvQueue, SendQueue};
use crate::graph::LinkId;
use crate::hash::HashTable;

/// Progress through the NICK/USER handshake. NICK and USER may arrive
/// in either order; the connection is usable once both have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Unregistered,
    NickSet,
    IdentSet,
    Registered,
}

/// A connected client.
#[derive(Debug)]
pub struct User {
    pub id: Uuid,
    pub nick: Option<String>,
    pub ident: Option<String>,
    pub realname: Option<String>,
    pub host: String,
    pub state: RegistrationState,
    /// Channel name -> membership link, for the channels this user is on.
    pub channels: HashTable<LinkId>,
    /// Peer nick -> visibility link, for users sharing a channel.
    pub peers: HashTable<LinkId>,
    pub recvq: RecvQueue,
    /// Held only while unsent bytes exist; otherwise back in the pool.
    pub sendq: Option<SendQueue>,
    pub want_write: bool,
    /// Set once the user is unlinked from every registry and may be freed.
    pub quit: bool,
    /// Set when another user's activity dooms this connection; its own
    /// driver performs the actual disconnect.
    pub pending_drop: Option<String>,
    pub last_activity: DateTime<Utc>,
    wakeup: Arc<Notify>,
}

impl User {
    pub fn new(host: String, recvq_capacity: usize, channel_cap: usize, peer_cap: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            nick: None,
            ident: None,
            realname: None,
            host,
            state: RegistrationState::Unregistered,
            channels: HashTable::new(channel_cap),
            peers: HashTable::new(peer_cap),
            recvq: RecvQueue::new(recvq_capacity),
            sendq: None,
            want_write: false,
            quit: false,
            pending_drop: None,
            last_activity: Utc::now(),
            wakeup: Arc::new(Notify::new()),
        }
    }

    pub fn is_registered(&self) -> bool {
        self.state == RegistrationState::Registered
    }

    /// Nick for reply targets; `*` until one is set.
    pub fn nick_or_star(&self) -> &str {
        self.nick.as_deref().unwrap_or("*")
    }

    /// `nick!ident@host` message prefix.
    pub fn prefix(&self) -> String {
        format!(
            "{}!{}@{}",
            self.nick_or_star(),
            self.ident.as_deref().unwrap_or("unknown"),
            self.host
        )
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Records the nick half of the handshake. Returns true when this
    /// completes registration.
    pub fn note_nick_set(&mut self) -> bool {
        self.state = match self.state {
            RegistrationState::Unregistered | RegistrationState::NickSet => {
                RegistrationState::NickSet
            }
            RegistrationState::IdentSet | RegistrationState::Registered => {
                RegistrationState::Registered
            }
        };
        self.state == RegistrationState::Registered
    }

    /// Records the USER half of the handshake. Returns true when this
    /// completes registration.
    pub fn note_ident_set(&mut self) -> bool {
        self.state = match self.state {
            RegistrationState::Unregistered | RegistrationState::IdentSet => {
                RegistrationState::IdentSet
            }
            RegistrationState::NickSet | RegistrationState::Registered => {
                RegistrationState::Registered
            }
        };
        self.state == RegistrationState::Registered
    }

    /// Handle the connection driver waits on to learn about new
    /// outbound data queued by other users.
    pub fn wakeup_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.wakeup)
    }

    pub fn notify_wakeup(&self) {
        self.wakeup.notify_one();
    }
}

/// Nickname grammar: a letter or one of `[]\`_^{|}~` first, then
/// letters, digits, `-`, and the same specials.
pub fn is_valid_nickname(nick: &str) -> bool {
    if nick.is_empty() || nick.len() > 30 {
        return false;
    }
    let special = |c: char| "[]\\`_^{|}~".contains(c);
    let mut chars = nick.chars();
    let first = chars.next().unwrap();
    if !first.is_ascii_alphabetic() && !special(first) {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || special(c))
}

/// Username grammar: nonempty, printable ASCII, no `@` or spaces.
pub fn is_valid_ident(ident: &str) -> bool {
    !ident.is_empty()
        && ident.len() <= 30
        && ident
            .chars()
            .all(|c| c.is_ascii_graphic() && c != '@' && c != '!')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nickname_grammar() {
        assert!(is_valid_nickname("alice"));
        assert!(is_valid_nickname("Alice-99"));
        assert!(is_valid_nickname("[away]"));
        assert!(is_valid_nickname("^_^"));
        assert!(!is_valid_nickname(""));
        assert!(!is_valid_nickname("9lives"));
        assert!(!is_valid_nickname("-dash"));
        assert!(!is_valid_nickname("has space"));
        assert!(!is_valid_nickname("comma,"));
    }

    #[test]
    fn test_ident_grammar() {
        assert!(is_valid_ident("guest"));
        assert!(is_valid_ident("g.uest"));
        assert!(!is_valid_ident(""));
        assert!(!is_valid_ident("a@b"));
        assert!(!is_valid_ident("a b"));
    }

    #[test]
    fn test_registration_order_independent() {
        let mut u = User::new("localhost".into(), 512, 4, 16);
        assert!(!u.note_nick_set());
        assert_eq!(u.state, RegistrationState::NickSet);
        assert!(u.note_ident_set());
        assert!(u.is_registered());

        let mut u = User::new("localhost".into(), 512, 4, 16);
        assert!(!u.note_ident_set());
        assert_eq!(u.state, RegistrationState::IdentSet);
        assert!(u.note_nick_set());
        assert!(u.is_registered());
    }

    #[test]
    fn test_prefix_placeholders() {
        let u = User::new("example.net".into(), 512, 4, 16);
        assert_eq!(u.nick_or_star(), "*");
        assert_eq!(u.prefix(), "*!unknown@example.net");
    }
}
