use serde::{Deserialize, Serialize};

/// Control-channel commands. Anything else on the wire is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    Begin,
    Pause,
    Resume,
    End,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Begin => "Begin",
            Self::Pause => "Pause",
            Self::Resume => "Resume",
            Self::End => "End",
        }
    }

    /// Parses a command token, ignoring surrounding whitespace and ASCII case.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        [Self::Begin, Self::Pause, Self::Resume, Self::End]
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_commands() {
        assert_eq!(Command::parse("Begin"), Some(Command::Begin));
        assert_eq!(Command::parse(" pause\n"), Some(Command::Pause));
        assert_eq!(Command::parse("RESUME"), Some(Command::Resume));
        assert_eq!(Command::parse("End"), Some(Command::End));
    }

    #[test]
    fn unknown_commands_are_none() {
        assert_eq!(Command::parse("Start"), None);
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("Begin now"), None);
    }
}
