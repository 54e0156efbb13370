//! Channel entity.

use uuid::Uuid;

use crate::graph::LinkId;
use crate::hash::HashTable;

/// A chat channel. Lifetime is refcounted by memberships: the channel
/// is created by its first join and destroyed when the last member
/// leaves.
#[derive(Debug)]
pub struct Channel {
    pub id: Uuid,
    pub name: String,
    pub topic: Option<String>,
    pub modes: String,
    pub bans: Vec<String>,
    /// Member nick -> membership link.
    pub members: HashTable<LinkId>,
    pub refcount: usize,
}

impl Channel {
    pub fn new(name: String, member_cap: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            topic: None,
            modes: String::new(),
            bans: Vec::new(),
            members: HashTable::new(member_cap),
            refcount: 0,
        }
    }
}

/// Channel name grammar: a `#`, `&`, `+`, or `!` sigil followed by
/// anything except spaces, commas, colons, and control characters.
pub fn is_valid_channel_name(name: &str) -> bool {
    if name.len() < 2 || name.len() > 50 {
        return false;
    }
    let mut chars = name.chars();
    if !matches!(chars.next(), Some('#' | '&' | '+' | '!')) {
        return false;
    }
    chars.all(|c| !c.is_control() && c != ' ' && c != ',' && c != ':')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_name_grammar() {
        assert!(is_valid_channel_name("#rust"));
        assert!(is_valid_channel_name("&local"));
        assert!(is_valid_channel_name("+nomode"));
        assert!(!is_valid_channel_name("#"));
        assert!(!is_valid_channel_name("rust"));
        assert!(!is_valid_channel_name("#has space"));
        assert!(!is_valid_channel_name("#a,b"));
        assert!(!is_valid_channel_name("#a:b"));
    }
}
