//! Protocol line tokenization.
//!
//! Tokens are separated by single spaces; consecutive spaces produce
//! empty tokens. A token starting with `:` consumes the remainder of
//! the line verbatim.

use crate::{Error, Result};

/// A parsed protocol line: an uppercased command and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub command: String,
    pub args: Vec<String>,
}

impl Message {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into().to_uppercase(),
            args,
        }
    }

    /// Parses one line (terminator already stripped).
    pub fn parse(line: &str) -> Result<Self> {
        let (command, mut rest) = match line.split_once(' ') {
            Some((cmd, rest)) => (cmd, rest),
            None => (line, ""),
        };
        if command.is_empty() {
            return Err(Error::ProtocolViolation("empty command".to_string()));
        }

        let mut args = Vec::new();
        while !rest.is_empty() {
            if let Some(trailing) = rest.strip_prefix(':') {
                args.push(trailing.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((tok, tail)) => {
                    args.push(tok.to_string());
                    rest = tail;
                }
                None => {
                    args.push(rest.to_string());
                    break;
                }
            }
        }

        Ok(Self {
            command: command.to_uppercase(),
            args,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let msg = Message::parse("NICK alice").unwrap();
        assert_eq!(msg.command, "NICK");
        assert_eq!(msg.args, vec!["alice"]);
    }

    #[test]
    fn test_parse_command_case_folded() {
        let msg = Message::parse("nick alice").unwrap();
        assert_eq!(msg.command, "NICK");
    }

    #[test]
    fn test_parse_trailing_verbatim() {
        let msg = Message::parse("USER guest 0 * :hello world  extra").unwrap();
        assert_eq!(msg.command, "USER");
        assert_eq!(msg.args, vec!["guest", "0", "*", "hello world  extra"]);
    }

    #[test]
    fn test_parse_trailing_with_colons() {
        let msg = Message::parse("QUIT :gone: for now").unwrap();
        assert_eq!(msg.args, vec!["gone: for now"]);
    }

    #[test]
    fn test_parse_consecutive_spaces_yield_empty_tokens() {
        let msg = Message::parse("JOIN  #chan").unwrap();
        assert_eq!(msg.args, vec!["", "#chan"]);
    }

    #[test]
    fn test_parse_no_args() {
        let msg = Message::parse("MOTD").unwrap();
        assert_eq!(msg.command, "MOTD");
        assert!(msg.args.is_empty());
    }

    #[test]
    fn test_parse_empty_trailing() {
        let msg = Message::parse("QUIT :").unwrap();
        assert_eq!(msg.args, vec![""]);
    }

    #[test]
    fn test_parse_empty_line_rejected() {
        assert!(Message::parse("").is_err());
        assert!(Message::parse(" leading").is_err());
    }
}
