//! Message of the day.

use std::path::Path;

use tracing::warn;

use crate::numeric::NumericReply;

const DEFAULT_MOTD: &str = "Welcome to minircd. Enjoy your stay!";

/// MOTD contents, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Motd {
    lines: Vec<String>,
}

impl Motd {
    /// Loads the MOTD from `path`. A missing path, unreadable file, or
    /// empty file all fall back to the built-in default.
    pub fn load(path: Option<&Path>) -> Self {
        let lines = match path {
            Some(path) => match std::fs::read_to_string(path) {
                Ok(text) => text.lines().map(str::to_string).collect(),
                Err(e) => {
                    warn!("Failed to read MOTD file {}: {}", path.display(), e);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        if lines.is_empty() {
            Self {
                lines: vec![DEFAULT_MOTD.to_string()],
            }
        } else {
            Self { lines }
        }
    }

    /// The full 375/372/376 reply sequence for `nick`.
    pub fn replies(&self, server: &str, nick: &str) -> Vec<String> {
        let mut out = Vec::with_capacity(self.lines.len() + 2);
        out.push(NumericReply::motd_start(server, nick));
        for line in &self.lines {
            out.push(NumericReply::motd_line(server, nick, line));
        }
        out.push(NumericReply::motd_end(server, nick));
        out
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_motd() {
        let motd = Motd::load(None);
        assert_eq!(motd.line_count(), 1);
        let replies = motd.replies("irc.test", "alice");
        assert_eq!(replies.len(), 3);
        assert!(replies[0].contains(" 375 "));
        assert!(replies[1].contains(" 372 "));
        assert!(replies[2].contains(" 376 "));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "line one").unwrap();
        writeln!(file, "line two").unwrap();
        let motd = Motd::load(Some(file.path()));
        assert_eq!(motd.line_count(), 2);
        let replies = motd.replies("irc.test", "bob");
        assert_eq!(replies.len(), 4);
        assert!(replies[1].ends_with(":- line one"));
    }

    #[test]
    fn test_missing_file_falls_back() {
        let motd = Motd::load(Some(Path::new("/nonexistent/motd.txt")));
        assert_eq!(motd.line_count(), 1);
    }
}
