//! Numeric replies used by the daemon.

/// The numeric reply subset this server sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericReply {
    RplWelcome = 1,
    RplMotd = 372,
    RplMotdStart = 375,
    RplEndOfMotd = 376,
    ErrNoSuchChannel = 403,
    ErrNoOrigin = 409,
    ErrUnknownCommand = 421,
    ErrErroneousNickname = 432,
    ErrNicknameInUse = 433,
    ErrNotOnChannel = 442,
    ErrNotRegistered = 451,
    ErrNeedMoreParams = 461,
    ErrAlreadyRegistered = 462,
}

impl NumericReply {
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Formats a reply line (without terminator): the server as prefix,
    /// the zero-padded code, the target nick, optional middle args, and
    /// a trailing text.
    pub fn format(&self, server: &str, target: &str, args: &[&str], text: &str) -> String {
        let mut line = format!(":{} {:03} {}", server, self.code(), target);
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        line.push_str(" :");
        line.push_str(text);
        line
    }

    pub fn welcome(server: &str, nick: &str) -> String {
        NumericReply::RplWelcome.format(
            server,
            nick,
            &[],
            &format!("Welcome to the Internet Relay Network {}", nick),
        )
    }

    pub fn motd_start(server: &str, nick: &str) -> String {
        NumericReply::RplMotdStart.format(
            server,
            nick,
            &[],
            &format!("- {} Message of the day -", server),
        )
    }

    pub fn motd_line(server: &str, nick: &str, line: &str) -> String {
        NumericReply::RplMotd.format(server, nick, &[], &format!("- {}", line))
    }

    pub fn motd_end(server: &str, nick: &str) -> String {
        NumericReply::RplEndOfMotd.format(server, nick, &[], "End of /MOTD command")
    }

    pub fn no_such_channel(server: &str, nick: &str, channel: &str) -> String {
        NumericReply::ErrNoSuchChannel.format(server, nick, &[channel], "No such channel")
    }

    pub fn no_origin(server: &str, nick: &str) -> String {
        NumericReply::ErrNoOrigin.format(server, nick, &[], "No origin specified")
    }

    pub fn unknown_command(server: &str, nick: &str, command: &str) -> String {
        NumericReply::ErrUnknownCommand.format(server, nick, &[command], "Unknown command")
    }

    pub fn erroneous_nickname(server: &str, nick: &str, bad: &str) -> String {
        NumericReply::ErrErroneousNickname.format(server, nick, &[bad], "Erroneous nickname")
    }

    pub fn nickname_in_use(server: &str, nick: &str, wanted: &str) -> String {
        NumericReply::ErrNicknameInUse.format(
            server,
            nick,
            &[wanted],
            "Nickname is already in use",
        )
    }

    pub fn not_on_channel(server: &str, nick: &str, channel: &str) -> String {
        NumericReply::ErrNotOnChannel.format(
            server,
            nick,
            &[channel],
            "You're not on that channel",
        )
    }

    pub fn not_registered(server: &str, nick: &str) -> String {
        NumericReply::ErrNotRegistered.format(server, nick, &[], "You have not registered")
    }

    pub fn need_more_params(server: &str, nick: &str, command: &str) -> String {
        NumericReply::ErrNeedMoreParams.format(server, nick, &[command], "Not enough parameters")
    }

    pub fn already_registered(server: &str, nick: &str) -> String {
        NumericReply::ErrAlreadyRegistered.format(server, nick, &[], "You may not reregister")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_pads_code() {
        let line = NumericReply::RplWelcome.format("irc.test", "alice", &[], "hi");
        assert_eq!(line, ":irc.test 001 alice :hi");
    }

    #[test]
    fn test_format_with_args() {
        let line = NumericReply::ErrUnknownCommand.format("irc.test", "alice", &["WHOIS"], "Unknown command");
        assert_eq!(line, ":irc.test 421 alice WHOIS :Unknown command");
    }

    #[test]
    fn test_codes() {
        assert_eq!(NumericReply::RplWelcome.code(), 1);
        assert_eq!(NumericReply::ErrNicknameInUse.code(), 433);
        assert_eq!(NumericReply::ErrNotRegistered.code(), 451);
    }
}
