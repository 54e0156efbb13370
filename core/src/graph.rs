//! Link arena for user-channel memberships and user-user visibility.
//!
//! Each link is owned here and referenced by handle from both of its
//! endpoints' indexes, so there is a single place that knows a link's
//! state. Visibility links are refcounted: one count per channel the
//! pair shares.

use rustc_hash::FxHashMap;
use uuid::Uuid;

use crate::{Error, Result};

/// Handle into the link arena.
pub type LinkId = u64;

/// A user's presence on a channel.
#[derive(Debug, Clone, Copy)]
pub struct Membership {
    pub user: Uuid,
    pub channel: Uuid,
    pub chanop: bool,
}

/// Mutual visibility between two users who share at least one channel.
#[derive(Debug, Clone, Copy)]
pub struct Visibility {
    pub a: Uuid,
    pub b: Uuid,
    pub refcount: u32,
}

#[derive(Debug)]
pub struct LinkGraph {
    memberships: FxHashMap<LinkId, Membership>,
    visibility: FxHashMap<LinkId, Visibility>,
    next: LinkId,
    capacity: usize,
}

impl LinkGraph {
    pub fn new(capacity: usize) -> Self {
        Self {
            memberships: FxHashMap::default(),
            visibility: FxHashMap::default(),
            next: 1,
            capacity,
        }
    }

    fn total(&self) -> usize {
        self.memberships.len() + self.visibility.len()
    }

    fn next_id(&mut self) -> LinkId {
        let id = self.next;
        self.next += 1;
        id
    }

    pub fn add_membership(&mut self, user: Uuid, channel: Uuid, chanop: bool) -> Result<LinkId> {
        if self.total() >= self.capacity {
            return Err(Error::CapacityExceeded("link graph full"));
        }
        let id = self.next_id();
        self.memberships.insert(
            id,
            Membership {
                user,
                channel,
                chanop,
            },
        );
        Ok(id)
    }

    /// Panics if the handle is stale; membership handles are only valid
    /// while both indexes reference them.
    pub fn membership(&self, id: LinkId) -> &Membership {
        self.memberships
            .get(&id)
            .unwrap_or_else(|| panic!("stale membership link {}", id))
    }

    pub fn remove_membership(&mut self, id: LinkId) -> Membership {
        self.memberships
            .remove(&id)
            .unwrap_or_else(|| panic!("stale membership link {}", id))
    }

    pub fn add_visibility(&mut self, a: Uuid, b: Uuid) -> Result<LinkId> {
        if self.total() >= self.capacity {
            return Err(Error::CapacityExceeded("link graph full"));
        }
        let id = self.next_id();
        self.visibility.insert(id, Visibility { a, b, refcount: 1 });
        Ok(id)
    }

    pub fn bump_visibility(&mut self, id: LinkId) {
        self.visibility
            .get_mut(&id)
            .unwrap_or_else(|| panic!("stale visibility link {}", id))
            .refcount += 1;
    }

    /// Drops one reference; returns true when the link is destroyed.
    pub fn drop_visibility(&mut self, id: LinkId) -> bool {
        let vis = self
            .visibility
            .get_mut(&id)
            .unwrap_or_else(|| panic!("stale visibility link {}", id));
        vis.refcount -= 1;
        if vis.refcount == 0 {
            self.visibility.remove(&id);
            true
        } else {
            false
        }
    }

    /// Removes a visibility link regardless of refcount. Rollback only.
    pub fn remove_visibility(&mut self, id: LinkId) {
        self.visibility.remove(&id);
    }

    /// The other endpoint of a visibility link, from `me`'s side.
    pub fn peer_of(&self, id: LinkId, me: Uuid) -> Uuid {
        let vis = self
            .visibility
            .get(&id)
            .unwrap_or_else(|| panic!("stale visibility link {}", id));
        if vis.a == me {
            vis.b
        } else {
            assert_eq!(vis.b, me, "visibility link does not involve this user");
            vis.a
        }
    }

    pub fn len(&self) -> usize {
        self.total()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}
