//! Command language: one instruction per line, identified by its first four
//! characters.
//!
//! ```text
//! SETV <channel>,<voltage>     SETC <channel>,<current>
//! GETV<channel>                GETC<channel>
//! TSTV  TSTC  TSCO  TSTR       PRBV  PRBC
//! ```
//!
//! `SETV`/`SETC` use a strict comma grammar while `GETV`/`GETC` take the first
//! decimal digit found anywhere on the line, so `GETV3`, `GETV 3` and
//! `GETV3extra` all address channel 3.

use crate::devices::{Channel, DeviceError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const KEYWORD_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Keyword {
    Setv,
    Setc,
    Getv,
    Getc,
    Tstv,
    Tstc,
    Tsco,
    Tstr,
    Prbv,
    Prbc,
}

/// Argument shape that follows a keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arguments {
    ChannelValue,
    Channel,
    None,
}

impl Keyword {
    pub const ALL: [Keyword; 10] = [
        Keyword::Setv,
        Keyword::Setc,
        Keyword::Getv,
        Keyword::Getc,
        Keyword::Tstv,
        Keyword::Tstc,
        Keyword::Tsco,
        Keyword::Tstr,
        Keyword::Prbv,
        Keyword::Prbc,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Keyword::Setv => "SETV",
            Keyword::Setc => "SETC",
            Keyword::Getv => "GETV",
            Keyword::Getc => "GETC",
            Keyword::Tstv => "TSTV",
            Keyword::Tstc => "TSTC",
            Keyword::Tsco => "TSCO",
            Keyword::Tstr => "TSTR",
            Keyword::Prbv => "PRBV",
            Keyword::Prbc => "PRBC",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|keyword| keyword.code() == code)
    }

    /// Case-sensitive match on the first four characters of `line`.
    pub fn from_line(line: &str) -> Option<Self> {
        line.get(..KEYWORD_LEN).and_then(Self::from_code)
    }

    pub fn arguments(self) -> Arguments {
        match self {
            Keyword::Setv | Keyword::Setc => Arguments::ChannelValue,
            Keyword::Getv | Keyword::Getc => Arguments::Channel,
            _ => Arguments::None,
        }
    }

    /// Name of the value argument in usage messages.
    pub fn value_name(self) -> &'static str {
        match self {
            Keyword::Setc => "current",
            _ => "voltage",
        }
    }
}

impl core::fmt::Display for Keyword {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedCommand {
    pub keyword: Keyword,
    pub channel: Option<Channel>,
    pub value: Option<f64>,
}

impl ParsedCommand {
    pub fn bare(keyword: Keyword) -> Self {
        Self {
            keyword,
            channel: None,
            value: None,
        }
    }

    pub fn require_channel(&self) -> Result<Channel, CommandError> {
        self.channel.ok_or(CommandError::InvalidChannel { keyword: self.keyword })
    }

    pub fn require_value(&self) -> Result<f64, CommandError> {
        self.value.ok_or(CommandError::InvalidValues { keyword: self.keyword })
    }
}

/// Coarse classification of a [`CommandError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Parse,
    Validation,
    Device,
    Arithmetic,
    UnknownCommand,
}

/// Failure of a single command line. The `Display` form is the diagnostic
/// reported in place of the command's result.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Error processing {keyword} command: Invalid command format. Expected '{keyword} <channel>, <{}>'.", .keyword.value_name())]
    InvalidFormat { keyword: Keyword },
    #[error("Error processing {keyword} command: Invalid input values. Channel and {} must be valid numbers.", .keyword.value_name())]
    InvalidValues { keyword: Keyword },
    #[error("Error processing {keyword} command: Invalid channel.")]
    InvalidChannel { keyword: Keyword },
    #[error("Error processing {keyword} command: channel must be 1, 2, or 3")]
    ChannelOutOfRange { keyword: Keyword, channel: i64 },
    #[error("Error processing {keyword} command: {source}")]
    Device {
        keyword: Keyword,
        #[source]
        source: DeviceError,
    },
    #[error("Error processing {keyword} command: {source}")]
    Arithmetic {
        keyword: Keyword,
        #[source]
        source: DeviceError,
    },
    #[error("Error processing command '{line}': command not found")]
    UnknownCommand { line: String },
}

impl CommandError {
    pub fn device(keyword: Keyword, source: DeviceError) -> Self {
        match source {
            DeviceError::ZeroCurrent => CommandError::Arithmetic { keyword, source },
            source => CommandError::Device { keyword, source },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CommandError::InvalidFormat { .. }
            | CommandError::InvalidValues { .. }
            | CommandError::InvalidChannel { .. } => ErrorKind::Parse,
            CommandError::ChannelOutOfRange { .. } => ErrorKind::Validation,
            CommandError::Device { .. } => ErrorKind::Device,
            CommandError::Arithmetic { .. } => ErrorKind::Arithmetic,
            CommandError::UnknownCommand { .. } => ErrorKind::UnknownCommand,
        }
    }
}

fn validate_channel(keyword: Keyword, channel: i64) -> Result<Channel, CommandError> {
    Channel::new(channel).ok_or(CommandError::ChannelOutOfRange { keyword, channel })
}

/// `"<KW> <channel>,<value>"`: exactly one comma, channel as the second
/// whitespace token before it, a finite float after it.
fn parse_channel_value(keyword: Keyword, line: &str) -> Result<ParsedCommand, CommandError> {
    let segments: Vec<&str> = line.trim().split(',').collect();
    let [head, tail] = segments.as_slice() else {
        return Err(CommandError::InvalidFormat { keyword });
    };

    let channel = head
        .split_whitespace()
        .nth(1)
        .and_then(|token| token.parse::<i64>().ok());
    let value = tail
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite());

    let (Some(channel), Some(value)) = (channel, value) else {
        return Err(CommandError::InvalidValues { keyword });
    };

    Ok(ParsedCommand {
        keyword,
        channel: Some(validate_channel(keyword, channel)?),
        value: Some(value),
    })
}

/// First decimal digit anywhere on the line is the channel.
fn parse_digit_channel(keyword: Keyword, line: &str) -> Result<ParsedCommand, CommandError> {
    let channel = line
        .chars()
        .find_map(|c| c.to_digit(10))
        .ok_or(CommandError::InvalidChannel { keyword })?;

    Ok(ParsedCommand {
        keyword,
        channel: Some(validate_channel(keyword, i64::from(channel))?),
        value: None,
    })
}

pub fn parse_line(line: &str) -> Result<ParsedCommand, CommandError> {
    let keyword = Keyword::from_line(line).ok_or_else(|| CommandError::UnknownCommand {
        line: line.to_string(),
    })?;

    match keyword.arguments() {
        Arguments::ChannelValue => parse_channel_value(keyword, line),
        Arguments::Channel => parse_digit_channel(keyword, line),
        Arguments::None => Ok(ParsedCommand::bare(keyword)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel_of(line: &str) -> u8 {
        parse_line(line).unwrap().channel.unwrap().number()
    }

    #[test]
    fn test_keyword_codes_round_trip() {
        for keyword in Keyword::ALL {
            assert_eq!(Keyword::from_code(keyword.code()), Some(keyword));
        }
        assert_eq!(Keyword::from_code("setv"), None);
    }

    #[test]
    fn test_keyword_needs_four_characters() {
        assert_eq!(Keyword::from_line("SET"), None);
        assert_eq!(Keyword::from_line(""), None);
        assert_eq!(Keyword::from_line("TSTVanything"), Some(Keyword::Tstv));
        // Multi-byte character inside the first four bytes
        assert_eq!(Keyword::from_line("SEΤV 1,2"), None);
    }

    #[test]
    fn test_setv_well_formed() {
        let command = parse_line("SETV 3,5.0").unwrap();
        assert_eq!(command.keyword, Keyword::Setv);
        assert_eq!(command.channel.map(Channel::number), Some(3));
        assert_eq!(command.value, Some(5.0));

        let command = parse_line("  SETC 1 , 0.25  ").err();
        // Leading space shifts the keyword window
        assert!(matches!(command, Some(CommandError::UnknownCommand { .. })));

        let command = parse_line("SETC 1 , 0.25  ").unwrap();
        assert_eq!(command.keyword, Keyword::Setc);
        assert_eq!(command.value, Some(0.25));
    }

    #[test]
    fn test_setv_without_comma_is_format_error() {
        let error = parse_line("SETV3 5.0").unwrap_err();
        assert!(matches!(error, CommandError::InvalidFormat { keyword: Keyword::Setv }));
        assert_eq!(
            error.to_string(),
            "Error processing SETV command: Invalid command format. Expected 'SETV <channel>, <voltage>'."
        );

        let error = parse_line("SETC 1,2,3").unwrap_err();
        assert_eq!(
            error.to_string(),
            "Error processing SETC command: Invalid command format. Expected 'SETC <channel>, <current>'."
        );
    }

    #[test]
    fn test_setv_invalid_values() {
        for line in ["SETV x,5.0", "SETV 1,abc", "SETV,5.0", "SETV 1,", "SETV 1.5,2", "SETV 1,inf", "SETV 1,NaN"] {
            let error = parse_line(line).unwrap_err();
            assert!(
                matches!(error, CommandError::InvalidValues { keyword: Keyword::Setv }),
                "{line}: {error}"
            );
            assert_eq!(error.kind(), ErrorKind::Parse);
        }

        assert_eq!(
            parse_line("SETC 1,amps").unwrap_err().to_string(),
            "Error processing SETC command: Invalid input values. Channel and current must be valid numbers."
        );
    }

    #[test]
    fn test_channel_out_of_range() {
        for line in ["SETV 0,1.0", "SETV 4,1.0", "SETC -1,1.0", "GETV4", "GETC 0"] {
            let error = parse_line(line).unwrap_err();
            assert_eq!(error.kind(), ErrorKind::Validation, "{line}");
        }

        assert_eq!(
            parse_line("GETV9").unwrap_err().to_string(),
            "Error processing GETV command: channel must be 1, 2, or 3"
        );
        assert!(matches!(
            parse_line("SETV 7,1.0").unwrap_err(),
            CommandError::ChannelOutOfRange { keyword: Keyword::Setv, channel: 7 }
        ));
    }

    #[test]
    fn test_get_takes_first_digit() {
        assert_eq!(channel_of("GETV3"), 3);
        assert_eq!(channel_of("GETV 3"), 3);
        assert_eq!(channel_of("GETV3extra"), 3);
        assert_eq!(channel_of("GETC ch 2, please"), 2);
        // Only the first digit counts
        assert_eq!(channel_of("GETV12"), 1);
        assert!(parse_line("GETV31").is_ok());
    }

    #[test]
    fn test_get_without_digit() {
        let error = parse_line("GETV").unwrap_err();
        assert!(matches!(error, CommandError::InvalidChannel { keyword: Keyword::Getv }));
        assert_eq!(error.to_string(), "Error processing GETV command: Invalid channel.");
    }

    #[test]
    fn test_bare_keywords_ignore_trailing_text() {
        for (line, keyword) in [
            ("TSTV", Keyword::Tstv),
            ("TSTC now", Keyword::Tstc),
            ("TSCO", Keyword::Tsco),
            ("TSTR 5,5", Keyword::Tstr),
            ("PRBV", Keyword::Prbv),
            ("PRBC", Keyword::Prbc),
        ] {
            assert_eq!(parse_line(line).unwrap(), ParsedCommand::bare(keyword));
        }
    }

    #[test]
    fn test_unknown_command_echoes_line() {
        let error = parse_line("FOOB").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::UnknownCommand);
        assert_eq!(error.to_string(), "Error processing command 'FOOB': command not found");

        assert_eq!(
            parse_line("setv 1,2").unwrap_err().to_string(),
            "Error processing command 'setv 1,2': command not found"
        );
    }

    #[test]
    fn test_zero_current_is_arithmetic() {
        let error = CommandError::device(Keyword::Tstr, DeviceError::ZeroCurrent);
        assert_eq!(error.kind(), ErrorKind::Arithmetic);
        assert_eq!(
            error.to_string(),
            "Error processing TSTR command: measured current is zero, cannot compute resistance"
        );
    }
}
