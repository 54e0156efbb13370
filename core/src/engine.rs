//! Connection-facing protocol engine: the readable/writable callbacks
//! that frame lines, dispatch commands, and decide connection fate.

use std::io;

use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::message::Message;
use crate::numeric::NumericReply;
use crate::state::ServerState;
use crate::Error;

/// Nonblocking byte transport for one connection. `read`/`write`
/// return `WouldBlock` when the socket has nothing to give or take,
/// and `Ok(0)` from `read` means the peer closed.
pub trait Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
}

/// Commands accepted before registration completes.
const PREREG_COMMANDS: [&str; 4] = ["NICK", "USER", "PING", "QUIT"];

/// Readable callback: pulls bytes, frames lines, dispatches each one.
///
/// Pipelined input is handled by looping: when the inbound buffer
/// fills without draining the socket, extracted lines free space and
/// the read phase runs again. Once the user quits or is doomed, the
/// rest of its input is abandoned.
pub fn on_readable(state: &mut ServerState, id: Uuid, transport: &mut dyn Transport) {
    loop {
        let mut eof = false;
        let mut blocked = false;

        // Read until the socket blocks or the buffer fills.
        loop {
            if state.is_quit(id) {
                return;
            }
            let recvq = &mut state.user_mut(id).recvq;
            if recvq.is_full() {
                break;
            }
            match transport.read(recvq.space()) {
                Ok(0) => {
                    eof = true;
                    break;
                }
                Ok(n) => recvq.advance(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    blocked = true;
                    break;
                }
                Err(e) => {
                    debug!("Read error: {}", e);
                    state.disconnect_user(id, "Read error");
                    return;
                }
            }
        }

        // Process every complete line buffered so far.
        loop {
            {
                let user = state.user(id);
                if user.quit || user.pending_drop.is_some() {
                    break;
                }
            }
            let line = match state.user_mut(id).recvq.next_line() {
                Some(line) => line,
                None => break,
            };
            state.user_mut(id).touch();
            dispatch(state, id, &line);
            if let Err(e) = state.flush(id, transport) {
                if e.kind() != io::ErrorKind::WouldBlock {
                    debug!("Write error: {}", e);
                    state.disconnect_user(id, "Write error");
                    return;
                }
            }
        }

        if state.is_quit(id) {
            break;
        }
        if let Some(reason) = state.doom_reason(id) {
            state.disconnect_user(id, &reason);
            break;
        }
        if state.user(id).recvq.is_full() {
            // A full buffer with no line terminator cannot make progress.
            warn!("Input line too long from {}", state.user(id).nick_or_star());
            state.disconnect_user(id, "Input line too long");
            break;
        }
        if eof {
            state.disconnect_user(id, "Client closed connection");
            break;
        }
        if blocked {
            break;
        }
        // Buffer was full and lines were consumed; the socket may still
        // hold bytes, so read again.
    }

    let _ = state.flush(id, transport);
}

/// Writable callback: drains pending output.
pub fn on_writable(state: &mut ServerState, id: Uuid, transport: &mut dyn Transport) {
    if let Err(e) = state.flush(id, transport) {
        if e.kind() != io::ErrorKind::WouldBlock {
            debug!("Write error: {}", e);
            state.disconnect_user(id, "Write error");
        }
    }
}

fn dispatch(state: &mut ServerState, id: Uuid, line: &str) {
    if line.is_empty() {
        return;
    }
    trace!("<- {}", line);
    let msg = match Message::parse(line) {
        Ok(msg) => msg,
        Err(e) => {
            deliver_error(state, id, "", e);
            return;
        }
    };

    let handler = state.commands().lookup(&msg.command).copied();
    let result = match handler {
        Some(handler) => {
            if !state.user(id).is_registered()
                && !PREREG_COMMANDS.contains(&msg.command.as_str())
            {
                Err(Error::NotRegistered)
            } else {
                handler(state, id, &msg.args)
            }
        }
        None => Err(Error::UnknownCommand(msg.command.clone())),
    };

    if let Err(e) = result {
        deliver_error(state, id, &msg.command, e);
    }
}

/// Maps a handler error to its numeric reply, or tears the connection
/// down for errors no reply can express.
fn deliver_error(state: &mut ServerState, id: Uuid, command: &str, error: Error) {
    let server = state.server_name().to_string();
    let nick = state.user(id).nick_or_star().to_string();
    let reply = match &error {
        Error::BadNickname(bad) => NumericReply::erroneous_nickname(&server, &nick, bad),
        Error::NicknameInUse(wanted) => NumericReply::nickname_in_use(&server, &nick, wanted),
        Error::NotRegistered => NumericReply::not_registered(&server, &nick),
        Error::AlreadyRegistered => NumericReply::already_registered(&server, &nick),
        Error::NeedMoreParams(cmd) => NumericReply::need_more_params(&server, &nick, cmd),
        Error::NoOrigin => NumericReply::no_origin(&server, &nick),
        Error::UnknownCommand(cmd) => NumericReply::unknown_command(&server, &nick, cmd),
        Error::ProtocolViolation(what) => {
            debug!("Protocol violation from {}: {}", nick, what);
            return;
        }
        _ => {
            warn!("Dropping {} after {} failed: {}", nick, command, error);
            state.disconnect_user(id, "Resource limit exceeded");
            return;
        }
    };
    state.queue(id, &reply);
}
