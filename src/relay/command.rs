/// Client command parsing.
///
/// Grammar, one command per line:
///   `exit` | `/banned` | `/send <names> <message>` | `/exclude <names> <message>`
///   | anything else (a broadcast)
///
/// `<names>` is a comma-separated list; the message is the rest of the line
/// and may contain spaces.
use super::notice;

/// A classified client line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Blank or whitespace-only line.
    Empty,
    Exit,
    Banned,
    Send { recipients: Vec<String>, text: String },
    Exclude { excluded: Vec<String>, text: String },
    Broadcast(String),
}

/// A `/send` or `/exclude` line missing its names or message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MalformedCommand {
    #[error("{}", notice::SEND_USAGE)]
    Send,
    #[error("{}", notice::EXCLUDE_USAGE)]
    Exclude,
}

impl MalformedCommand {
    /// The usage line to show the sender.
    pub fn usage(self) -> &'static str {
        match self {
            Self::Send => notice::SEND_USAGE,
            Self::Exclude => notice::EXCLUDE_USAGE,
        }
    }
}

impl Command {
    /// Classify a single line (without its terminator).
    pub fn parse(line: &str) -> Result<Self, MalformedCommand> {
        if line.trim().is_empty() {
            return Ok(Self::Empty);
        }
        if line.eq_ignore_ascii_case("exit") {
            return Ok(Self::Exit);
        }
        if line.eq_ignore_ascii_case("/banned") {
            return Ok(Self::Banned);
        }

        let (keyword, rest) = match line.split_once(char::is_whitespace) {
            Some((keyword, rest)) => (keyword, rest),
            None => (line, ""),
        };

        match keyword {
            "/send" => {
                let (recipients, text) = split_targets(rest).ok_or(MalformedCommand::Send)?;
                Ok(Self::Send { recipients, text })
            }
            "/exclude" => {
                let (excluded, text) = split_targets(rest).ok_or(MalformedCommand::Exclude)?;
                Ok(Self::Exclude { excluded, text })
            }
            _ => Ok(Self::Broadcast(line.to_owned())),
        }
    }
}

/// Split `"<a,b,c> <message>"` into trimmed names and the message.
fn split_targets(rest: &str) -> Option<(Vec<String>, String)> {
    let (names, text) = rest.trim_start().split_once(char::is_whitespace)?;
    let text = text.trim_start();
    if text.is_empty() {
        return None;
    }

    let names: Vec<String> = names
        .split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_owned)
        .collect();
    if names.is_empty() {
        return None;
    }

    Some((names, text.to_owned()))
}
