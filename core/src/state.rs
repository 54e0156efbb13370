//! Central server state: every registry, the link graph, the buffer
//! pool, and the operations that keep them consistent.
//!
//! All access is serialized behind one lock (see `server.rs`), so the
//! methods here can assume exclusive ownership and uphold cross-index
//! invariants with plain assertions.

use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::buffer::BufferPool;
use crate::channel::Channel;
use crate::config::Config;
use crate::engine::Transport;
use crate::graph::{LinkGraph, LinkId};
use crate::handlers::{command_table, CommandTable};
use crate::hash::HashTable;
use crate::motd::Motd;
use crate::user::{is_valid_nickname, User};
use crate::{Error, Result};

pub struct ServerState {
    pub config: Config,
    users: FxHashMap<Uuid, User>,
    channels: FxHashMap<Uuid, Channel>,
    /// Nick -> user id.
    nicks: HashTable<Uuid>,
    /// Channel name -> channel id.
    channel_names: HashTable<Uuid>,
    links: LinkGraph,
    pool: BufferPool,
    commands: CommandTable,
    motd: Motd,
}

impl ServerState {
    pub fn new(config: Config) -> Self {
        let motd = Motd::load(config.server.motd_file.as_deref());
        Self {
            users: FxHashMap::default(),
            channels: FxHashMap::default(),
            nicks: HashTable::new(config.limits.max_clients),
            channel_names: HashTable::new(config.limits.max_channels),
            links: LinkGraph::new(config.limits.max_links),
            pool: BufferPool::new(
                config.buffers.sendq,
                config.buffers.pool_prewarm,
                config.buffers.pool_ceiling,
            ),
            commands: command_table(),
            motd,
            config,
        }
    }

    /// Creates the user entity for a new connection.
    pub fn register_connection(&mut self, host: String) -> Result<Uuid> {
        if self.users.len() >= self.config.limits.max_clients {
            return Err(Error::CapacityExceeded("client limit reached"));
        }
        let user = User::new(
            host,
            self.config.buffers.recvq,
            self.config.limits.max_channels_per_user,
            self.config.limits.max_clients,
        );
        let id = user.id;
        self.users.insert(id, user);
        Ok(id)
    }

    /// Frees a fully unlinked user. The connection driver calls this
    /// after its last callback has returned.
    pub fn release_connection(&mut self, id: Uuid) {
        let user = match self.users.remove(&id) {
            Some(user) => user,
            None => return,
        };
        assert!(user.quit, "releasing a user that was never disconnected");
        if let Some(sendq) = user.sendq {
            self.pool.release(sendq);
        }
    }

    pub fn user(&self, id: Uuid) -> &User {
        self.users.get(&id).unwrap_or_else(|| panic!("no user {}", id))
    }

    pub fn user_mut(&mut self, id: Uuid) -> &mut User {
        self.users
            .get_mut(&id)
            .unwrap_or_else(|| panic!("no user {}", id))
    }

    pub fn try_user(&self, id: Uuid) -> Option<&User> {
        self.users.get(&id)
    }

    pub fn find_user(&self, nick: &str) -> Option<&User> {
        let id = self.nicks.lookup(nick)?;
        self.users.get(id)
    }

    pub fn find_channel(&self, name: &str) -> Option<&Channel> {
        let id = self.channel_names.lookup(name)?;
        self.channels.get(id)
    }

    pub fn channel(&self, id: Uuid) -> &Channel {
        self.channels
            .get(&id)
            .unwrap_or_else(|| panic!("no channel {}", id))
    }

    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    pub fn motd(&self) -> &Motd {
        &self.motd
    }

    pub fn server_name(&self) -> &str {
        &self.config.server.name
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Snapshot of the ids of every user visible to `id`.
    pub fn peer_ids(&self, id: Uuid) -> Vec<Uuid> {
        self.user(id)
            .peers
            .values()
            .into_iter()
            .map(|lid| self.links.peer_of(lid, id))
            .collect()
    }

    /// Snapshot of the member ids of a channel, by name.
    pub fn member_ids(&self, name: &str) -> Vec<Uuid> {
        match self.channel_names.lookup(name) {
            Some(cid) => self.member_ids_by_cid(*cid),
            None => Vec::new(),
        }
    }

    pub fn member_ids_by_cid(&self, cid: Uuid) -> Vec<Uuid> {
        self.channel(cid)
            .members
            .values()
            .into_iter()
            .map(|lid| self.links.membership(lid).user)
            .collect()
    }

    /// Queues one protocol line (terminator appended here) for `id`.
    ///
    /// Doomed and quitting users silently drop output. An overflow does
    /// not propagate: the target is marked for drop and its own driver
    /// tears it down.
    pub fn queue(&mut self, id: Uuid, line: &str) {
        let user = match self.users.get_mut(&id) {
            Some(user) => user,
            None => return,
        };
        if user.quit || user.pending_drop.is_some() {
            return;
        }
        if user.sendq.is_none() {
            user.sendq = Some(self.pool.acquire());
        }
        let sendq = user.sendq.as_mut().unwrap();
        let result = sendq
            .append(line.as_bytes())
            .and_then(|_| sendq.append(b"\r\n"));
        match result {
            Ok(()) => {
                user.want_write = true;
                user.notify_wakeup();
            }
            Err(_) => {
                warn!("SendQ exceeded for {}", user.nick_or_star());
                user.pending_drop = Some("SendQ exceeded".to_string());
                user.notify_wakeup();
            }
        }
    }

    /// Drains the user's send queue into the transport. An emptied
    /// queue goes back to the pool.
    pub fn flush(&mut self, id: Uuid, transport: &mut dyn Transport) -> std::io::Result<()> {
        let user = match self.users.get_mut(&id) {
            Some(user) => user,
            None => return Ok(()),
        };
        let sendq = match user.sendq.as_mut() {
            Some(sendq) => sendq,
            None => {
                user.want_write = false;
                return Ok(());
            }
        };
        sendq.drain(|buf| transport.write(buf))?;
        if sendq.is_empty() {
            let sendq = user.sendq.take().unwrap();
            user.want_write = false;
            self.pool.release(sendq);
        } else {
            user.want_write = true;
        }
        Ok(())
    }

    pub fn want_write(&self, id: Uuid) -> bool {
        self.try_user(id).map(|u| u.want_write).unwrap_or(false)
    }

    pub fn doom_reason(&self, id: Uuid) -> Option<String> {
        self.try_user(id).and_then(|u| u.pending_drop.clone())
    }

    /// Missing users count as quit, so drivers racing a teardown exit.
    pub fn is_quit(&self, id: Uuid) -> bool {
        self.try_user(id).map(|u| u.quit).unwrap_or(true)
    }

    /// Places `id` on the channel `name`, creating the channel if this
    /// is the first member, and links `id` to every existing member.
    ///
    /// All-or-nothing: if any index or link insertion fails, everything
    /// done so far is rolled back and the user ends up exactly as
    /// before the call.
    pub fn join_channel(&mut self, id: Uuid, name: &str) -> Result<()> {
        let (cid, created) = match self.channel_names.lookup(name) {
            Some(cid) => (*cid, false),
            None => {
                if self.channels.len() >= self.config.limits.max_channels {
                    return Err(Error::CapacityExceeded("channel limit reached"));
                }
                let channel = Channel::new(
                    name.to_string(),
                    self.config.limits.max_clients,
                );
                let cid = channel.id;
                self.channel_names.insert(name, cid)?;
                self.channels.insert(cid, channel);
                (cid, true)
            }
        };

        let members = self.member_ids_by_cid(cid);
        let nick = self
            .user(id)
            .nick
            .clone()
            .expect("joining user must have a nick");

        // Visibility first, then the membership itself. Track what we
        // linked so a late failure can unwind.
        let mut linked: Vec<Uuid> = Vec::new();
        let mut failure: Option<Error> = None;
        for &peer in &members {
            match self.link_peers(id, peer) {
                Ok(()) => linked.push(peer),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        if failure.is_none() {
            failure = self.attach_membership(id, cid, created, &nick).err();
        }

        if let Some(e) = failure {
            for &peer in &linked {
                self.unlink_peers(id, peer);
            }
            if created {
                let channel = self.channels.remove(&cid).expect("created channel present");
                channel.members.assert_empty("members");
                assert_eq!(self.channel_names.remove(name), Some(cid));
            }
            return Err(e);
        }
        Ok(())
    }

    /// Second half of a join: the membership link and both of its
    /// index entries, unwound stepwise on failure.
    fn attach_membership(&mut self, id: Uuid, cid: Uuid, chanop: bool, nick: &str) -> Result<()> {
        let lid = self.links.add_membership(id, cid, chanop)?;
        let channel = self.channels.get_mut(&cid).expect("channel present");
        let name = channel.name.clone();
        if let Err(e) = channel.members.insert(nick, lid) {
            self.links.remove_membership(lid);
            return Err(e);
        }
        if let Err(e) = self.user_mut(id).channels.insert(&name, lid) {
            let channel = self.channels.get_mut(&cid).expect("channel present");
            assert_eq!(channel.members.remove(nick), Some(lid));
            self.links.remove_membership(lid);
            return Err(e);
        }
        self.channels.get_mut(&cid).expect("channel present").refcount += 1;
        Ok(())
    }

    /// Ensures a visibility link exists between `a` and `b`, bumping
    /// the refcount if one already does.
    fn link_peers(&mut self, a: Uuid, b: Uuid) -> Result<()> {
        let nick_a = self.user(a).nick.clone().expect("linked user has a nick");
        let nick_b = self.user(b).nick.clone().expect("linked user has a nick");

        if let Some(&lid) = self.user(a).peers.lookup(&nick_b) {
            self.links.bump_visibility(lid);
            return Ok(());
        }

        let lid = self.links.add_visibility(a, b)?;
        if let Err(e) = self.user_mut(a).peers.insert(&nick_b, lid) {
            self.links.remove_visibility(lid);
            return Err(e);
        }
        if let Err(e) = self.user_mut(b).peers.insert(&nick_a, lid) {
            assert_eq!(self.user_mut(a).peers.remove(&nick_b), Some(lid));
            self.links.remove_visibility(lid);
            return Err(e);
        }
        Ok(())
    }

    /// Drops one shared-channel reference between `a` and `b`,
    /// destroying the link and both index entries at zero.
    fn unlink_peers(&mut self, a: Uuid, b: Uuid) {
        let nick_a = self.user(a).nick.clone().expect("linked user has a nick");
        let nick_b = self.user(b).nick.clone().expect("linked user has a nick");
        let lid = *self
            .user(a)
            .peers
            .lookup(&nick_b)
            .expect("unlinking peers that are not linked");
        if self.links.drop_visibility(lid) {
            let la = self.user_mut(a).peers.remove(&nick_b);
            let lb = self.user_mut(b).peers.remove(&nick_a);
            assert_eq!(la, Some(lid), "visibility indexes disagree");
            assert_eq!(lb, Some(lid), "visibility indexes disagree");
        }
    }

    /// Removes `id` from channel `name`, unlinking visibility to every
    /// remaining member and destroying the channel if it empties.
    pub fn leave_channel(&mut self, id: Uuid, name: &str) {
        let nick = self.user(id).nick.clone().expect("member has a nick");
        let lid = self
            .user_mut(id)
            .channels
            .remove(name)
            .unwrap_or_else(|| panic!("{} is not on {}", nick, name));
        let membership = self.links.remove_membership(lid);
        let cid = membership.channel;

        let channel = self.channels.get_mut(&cid).expect("channel present");
        assert_eq!(
            channel.members.remove(&nick),
            Some(lid),
            "membership indexes disagree"
        );
        channel.refcount -= 1;
        assert_eq!(
            channel.refcount,
            channel.members.len(),
            "channel refcount out of sync"
        );

        let remaining = self.member_ids_by_cid(cid);
        for peer in remaining {
            self.unlink_peers(id, peer);
        }

        let channel = self.channels.get(&cid).expect("channel present");
        if channel.refcount == 0 {
            let channel = self.channels.remove(&cid).expect("channel present");
            channel.members.assert_empty("members");
            assert_eq!(self.channel_names.remove(&channel.name), Some(cid));
            debug!("Destroyed empty channel {}", channel.name);
        }
    }

    /// Unlinks a user from every registry and marks it quit. Idempotent.
    /// The entity itself stays until `release_connection`.
    pub fn disconnect_user(&mut self, id: Uuid, reason: &str) {
        let user = match self.users.get_mut(&id) {
            Some(user) => user,
            None => return,
        };
        if user.quit {
            return;
        }
        let nick = user.nick.clone();
        let prefix = user.prefix();
        let host = user.host.clone();

        let quit_line = format!(":{} QUIT :{}", prefix, reason);
        for peer in self.peer_ids(id) {
            self.queue(peer, &quit_line);
        }

        for name in self.user(id).channels.keys() {
            self.leave_channel(id, &name);
        }

        let user = self.user(id);
        user.channels.assert_empty("channels");
        user.peers.assert_empty("peers");

        if let Some(nick) = nick {
            assert_eq!(self.nicks.remove(&nick), Some(id), "nick index disagrees");
        }

        let user = self.user_mut(id);
        user.quit = true;
        user.pending_drop = None;
        user.notify_wakeup();
        info!("Client {}[{}] disconnected: {}", user.nick_or_star(), host, reason);
    }

    /// Validates and applies a nickname change, re-keying every index
    /// that maps the old nick.
    pub fn change_nick(&mut self, id: Uuid, new: &str) -> Result<()> {
        if !is_valid_nickname(new) {
            return Err(Error::BadNickname(new.to_string()));
        }
        if let Some(&holder) = self.nicks.lookup(new) {
            // Changing only the case of your own nick is allowed.
            if holder != id {
                return Err(Error::NicknameInUse(new.to_string()));
            }
        }

        let old = self.user(id).nick.clone();
        if let Some(old) = &old {
            assert_eq!(self.nicks.remove(old), Some(id), "nick index disagrees");
        }
        if let Err(e) = self.nicks.insert(new, id) {
            // Index rejected the new key; the user can no longer be
            // addressed, so the connection cannot continue.
            self.disconnect_user(id, "Nickname table full");
            return Err(e);
        }
        self.user_mut(id).nick = Some(new.to_string());

        // Re-key the peer and member indexes that hash by nick.
        if let Some(old) = &old {
            for peer in self.peer_ids(id) {
                let lid = self
                    .user_mut(peer)
                    .peers
                    .remove(old)
                    .expect("peer index disagrees");
                if let Err(e) = self.user_mut(peer).peers.insert(new, lid) {
                    self.disconnect_user(id, "Nick re-key failed");
                    return Err(e);
                }
            }
            for name in self.user(id).channels.keys() {
                let cid = *self.channel_names.lookup(&name).expect("channel indexed");
                let channel = self.channels.get_mut(&cid).expect("channel present");
                let lid = channel.members.remove(old).expect("member index disagrees");
                if let Err(e) = channel.members.insert(new, lid) {
                    self.disconnect_user(id, "Nick re-key failed");
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("users", &self.users.len())
            .field("channels", &self.channels.len())
            .field("links", &self.links.len())
            .finish()
    }
}
