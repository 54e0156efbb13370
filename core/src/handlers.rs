//! Command handlers and the dispatch table.

use tracing::info;
use uuid::Uuid;

use crate::channel::is_valid_channel_name;
use crate::hash::HashTable;
use crate::numeric::NumericReply;
use crate::state::ServerState;
use crate::user::is_valid_ident;
use crate::{Error, Result};

pub type CommandHandler = fn(&mut ServerState, Uuid, &[String]) -> Result<()>;

/// Command name -> handler, in the same case-insensitive table the
/// registries use.
pub type CommandTable = HashTable<CommandHandler>;

const COMMANDS: [(&str, CommandHandler); 8] = [
    ("PING", cmd_ping),
    ("PONG", cmd_pong),
    ("NICK", cmd_nick),
    ("USER", cmd_user),
    ("MOTD", cmd_motd),
    ("JOIN", cmd_join),
    ("PART", cmd_part),
    ("QUIT", cmd_quit),
];

pub fn command_table() -> CommandTable {
    let mut table = CommandTable::new(COMMANDS.len());
    for (name, handler) in COMMANDS {
        if table.insert(name, handler).is_err() {
            unreachable!("command table sized to its contents");
        }
    }
    table
}

fn cmd_ping(state: &mut ServerState, id: Uuid, args: &[String]) -> Result<()> {
    let origin = args
        .first()
        .filter(|a| !a.is_empty())
        .ok_or(Error::NoOrigin)?;
    let server = state.server_name().to_string();
    let reply = format!(":{} PONG {} :{}", server, server, origin);
    state.queue(id, &reply);
    Ok(())
}

fn cmd_pong(_state: &mut ServerState, _id: Uuid, args: &[String]) -> Result<()> {
    if args.first().filter(|a| !a.is_empty()).is_none() {
        return Err(Error::NoOrigin);
    }
    Ok(())
}

fn cmd_nick(state: &mut ServerState, id: Uuid, args: &[String]) -> Result<()> {
    let new = args
        .first()
        .filter(|a| !a.is_empty())
        .ok_or_else(|| Error::NeedMoreParams("NICK".to_string()))?
        .clone();

    let (was_registered, old_prefix) = {
        let user = state.user(id);
        (user.is_registered(), user.prefix())
    };

    state.change_nick(id, &new)?;

    if was_registered {
        let line = format!(":{} NICK :{}", old_prefix, new);
        state.queue(id, &line);
        for peer in state.peer_ids(id) {
            state.queue(peer, &line);
        }
    } else if state.user_mut(id).note_nick_set() {
        send_welcome(state, id);
    }
    Ok(())
}

fn cmd_user(state: &mut ServerState, id: Uuid, args: &[String]) -> Result<()> {
    if args.len() < 4 {
        return Err(Error::NeedMoreParams("USER".to_string()));
    }
    if state.user(id).ident.is_some() {
        return Err(Error::AlreadyRegistered);
    }
    let ident = &args[0];
    if !is_valid_ident(ident) {
        let (nick, host) = {
            let user = state.user(id);
            (user.nick_or_star().to_string(), user.host.clone())
        };
        let line = format!("ERROR :Closing Link: {}[{}] (Invalid username)", nick, host);
        state.queue(id, &line);
        state.disconnect_user(id, "Invalid username");
        return Ok(());
    }
    let user = state.user_mut(id);
    user.ident = Some(ident.clone());
    user.realname = Some(args[3].clone());
    if user.note_ident_set() {
        send_welcome(state, id);
    }
    Ok(())
}

/// Exactly once per connection, when registration completes: the 001
/// welcome followed by the MOTD.
fn send_welcome(state: &mut ServerState, id: Uuid) {
    let server = state.server_name().to_string();
    let nick = state.user(id).nick.clone().expect("registered user has a nick");
    state.queue(id, &NumericReply::welcome(&server, &nick));
    for line in state.motd().replies(&server, &nick) {
        state.queue(id, &line);
    }
    info!("Client {} registered", state.user(id).prefix());
}

fn cmd_motd(state: &mut ServerState, id: Uuid, _args: &[String]) -> Result<()> {
    let server = state.server_name().to_string();
    let nick = state.user(id).nick_or_star().to_string();
    for line in state.motd().replies(&server, &nick) {
        state.queue(id, &line);
    }
    Ok(())
}

fn cmd_join(state: &mut ServerState, id: Uuid, args: &[String]) -> Result<()> {
    let targets = args
        .first()
        .filter(|a| !a.is_empty())
        .ok_or_else(|| Error::NeedMoreParams("JOIN".to_string()))?
        .clone();

    for target in targets.split(',') {
        if target == "0" {
            // JOIN 0: leave every channel.
            for name in state.user(id).channels.keys() {
                part_one(state, id, &name, None);
            }
            continue;
        }
        if !is_valid_channel_name(target) {
            let server = state.server_name().to_string();
            let nick = state.user(id).nick_or_star().to_string();
            state.queue(id, &NumericReply::no_such_channel(&server, &nick, target));
            continue;
        }
        if state.user(id).channels.contains(target) {
            continue;
        }
        state.join_channel(id, target)?;
        let prefix = state.user(id).prefix();
        let line = format!(":{} JOIN :{}", prefix, target);
        for member in state.member_ids(target) {
            state.queue(member, &line);
        }
    }
    Ok(())
}

fn cmd_part(state: &mut ServerState, id: Uuid, args: &[String]) -> Result<()> {
    let targets = args
        .first()
        .filter(|a| !a.is_empty())
        .ok_or_else(|| Error::NeedMoreParams("PART".to_string()))?
        .clone();
    let reason = args.get(1).cloned();

    for target in targets.split(',') {
        let server = state.server_name().to_string();
        let nick = state.user(id).nick_or_star().to_string();
        if state.find_channel(target).is_none() {
            state.queue(id, &NumericReply::no_such_channel(&server, &nick, target));
            continue;
        }
        if !state.user(id).channels.contains(target) {
            state.queue(id, &NumericReply::not_on_channel(&server, &nick, target));
            continue;
        }
        part_one(state, id, target, reason.as_deref());
    }
    Ok(())
}

/// Announces the departure to every member (the leaver included), then
/// removes the membership.
fn part_one(state: &mut ServerState, id: Uuid, name: &str, reason: Option<&str>) {
    let prefix = state.user(id).prefix();
    let line = match reason {
        Some(reason) => format!(":{} PART {} :{}", prefix, name, reason),
        None => format!(":{} PART {}", prefix, name),
    };
    for member in state.member_ids(name) {
        state.queue(member, &line);
    }
    state.leave_channel(id, name);
}

fn cmd_quit(state: &mut ServerState, id: Uuid, args: &[String]) -> Result<()> {
    let reason = args
        .first()
        .filter(|a| !a.is_empty())
        .map(|s| s.as_str())
        .unwrap_or("Client quit");
    let host = state.user(id).host.clone();
    let line = format!("ERROR :Closing Link: {} ({})", host, reason);
    state.queue(id, &line);
    state.disconnect_user(id, reason);
    Ok(())
}
