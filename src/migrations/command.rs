//! Parsing of migration commands such as `latest`, `3`, `latest,exit` or
//! `2,rerun` into a [`Directive`].

use std::fmt;

use crate::error::{MigrationError, Result};

const SEPARATOR: char = ',';

/// Raw command as handed to the migrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Exact version; never carries a subcommand.
    Version(i64),
    Text(String),
}

impl From<i64> for Command {
    fn from(version: i64) -> Self {
        Command::Version(version)
    }
}

impl From<i32> for Command {
    fn from(version: i32) -> Self {
        Command::Version(i64::from(version))
    }
}

impl From<&str> for Command {
    fn from(text: &str) -> Self {
        Command::Text(text.to_string())
    }
}

impl From<String> for Command {
    fn from(text: String) -> Self {
        Command::Text(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Latest,
    Version(i64),
    /// Target text that is neither `latest` nor a number. Kept so the
    /// failure surfaces when the target is resolved.
    Invalid(String),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Latest => write!(f, "latest"),
            Target::Version(version) => write!(f, "{}", version),
            Target::Invalid(raw) => write!(f, "{}", raw),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subcommand {
    /// Run only the `up` step of the target version again.
    Rerun,
    /// Caller should terminate the process once the run has reported.
    Exit,
    /// Unrecognised subcommands are carried along and otherwise ignored.
    Other(String),
}

impl Subcommand {
    fn parse(text: &str) -> Option<Self> {
        match text {
            "" => None,
            "rerun" => Some(Subcommand::Rerun),
            "exit" => Some(Subcommand::Exit),
            other => Some(Subcommand::Other(other.to_string())),
        }
    }
}

impl fmt::Display for Subcommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subcommand::Rerun => write!(f, "rerun"),
            Subcommand::Exit => write!(f, "exit"),
            Subcommand::Other(other) => write!(f, "{}", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub target: Target,
    pub subcommand: Option<Subcommand>,
}

impl Directive {
    pub fn parse(command: impl Into<Command>) -> Result<Self> {
        match command.into() {
            Command::Version(version) => Ok(Self {
                target: Target::Version(version),
                subcommand: None,
            }),
            Command::Text(text) => Self::parse_text(&text),
        }
    }

    fn parse_text(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Err(MigrationError::InvalidCommand(text.to_string()));
        }

        let mut parts = text.split(SEPARATOR);
        let target = match parts.next().unwrap_or_default() {
            "latest" => Target::Latest,
            raw => match parse_base10(raw) {
                Some(version) => Target::Version(version),
                None => Target::Invalid(raw.to_string()),
            },
        };
        let subcommand = parts.next().and_then(Subcommand::parse);

        Ok(Self { target, subcommand })
    }

    pub fn latest() -> Self {
        Self {
            target: Target::Latest,
            subcommand: None,
        }
    }

    pub fn is_rerun(&self) -> bool {
        self.subcommand == Some(Subcommand::Rerun)
    }

    pub fn exits(&self) -> bool {
        self.subcommand == Some(Subcommand::Exit)
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subcommand {
            Some(subcommand) => write!(f, "{}{}{}", self.target, SEPARATOR, subcommand),
            None => write!(f, "{}", self.target),
        }
    }
}

/// Leading-integer parse: optional whitespace and sign, then the longest run
/// of decimal digits. Trailing text is ignored, `"3rd"` reads as 3.
fn parse_base10(text: &str) -> Option<i64> {
    let trimmed = text.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let digits_len = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits_len == 0 {
        return None;
    }
    let magnitude: i64 = rest[..digits_len].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_targets() {
        assert_eq!(Directive::parse("latest").unwrap(), Directive::latest());
        assert_eq!(Directive::parse("3").unwrap().target, Target::Version(3));
        assert_eq!(Directive::parse(0).unwrap().target, Target::Version(0));
        assert_eq!(Directive::parse(12_i64).unwrap().subcommand, None);
    }

    #[test]
    fn test_parse_subcommands() {
        let exit = Directive::parse("latest,exit").unwrap();
        assert_eq!(exit.target, Target::Latest);
        assert!(exit.exits());
        assert!(!exit.is_rerun());

        let rerun = Directive::parse("2,rerun").unwrap();
        assert_eq!(rerun.target, Target::Version(2));
        assert!(rerun.is_rerun());

        let other = Directive::parse("2,dance,rerun").unwrap();
        assert_eq!(other.subcommand, Some(Subcommand::Other("dance".into())));

        assert_eq!(Directive::parse("4,").unwrap().subcommand, None);
    }

    #[test]
    fn test_target_is_case_sensitive() {
        let directive = Directive::parse("Latest").unwrap();
        assert_eq!(directive.target, Target::Invalid("Latest".into()));
    }

    #[test]
    fn test_non_numeric_target_is_deferred() {
        let directive = Directive::parse("abc,rerun").unwrap();
        assert_eq!(directive.target, Target::Invalid("abc".into()));
        assert!(directive.is_rerun());
    }

    #[test]
    fn test_empty_command_is_rejected() {
        for command in ["", "   "] {
            let err = Directive::parse(command).unwrap_err();
            assert!(matches!(err, MigrationError::InvalidCommand(_)));
        }
    }

    #[test]
    fn test_parse_base10() {
        assert_eq!(parse_base10("42"), Some(42));
        assert_eq!(parse_base10(" 7"), Some(7));
        assert_eq!(parse_base10("3rd"), Some(3));
        assert_eq!(parse_base10("-1"), Some(-1));
        assert_eq!(parse_base10("x1"), None);
        assert_eq!(parse_base10("-"), None);
    }

    #[test]
    fn test_display_round_trips_text() {
        assert_eq!(Directive::parse("2,rerun").unwrap().to_string(), "2,rerun");
        assert_eq!(Directive::parse("latest").unwrap().to_string(), "latest");
    }
}
