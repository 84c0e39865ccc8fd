//! Server-side checksum commands.
//!
//! None of these commands are standardised, and every server that implements
//! them words its reply differently:
//!
//! ```text
//! 251-Computing MD5 digest
//! 251 myfile.txt 7F1EE68D2344001A050752B669242182     (proftpd, MD5)
//! 250 234e85323403262a4c696c8257c565b2                (jscape, XMD5)
//! 234e85323403262a4c696c8257c565b2                    (digest only)
//! ```
//!
//! Only the last reply line is looked at. A digest is any run of hex digits
//! of exactly the length the command produces, bounded by non-hex text, so a
//! SHA-256 digest is never read as an MD5 one.

use crate::client::{last_line, Transport};
use crate::FtpError;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The checksum commands a server may offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChecksumKind {
    Md5,
    Xmd5,
    Xcrc,
    /// Older servers' name for XSHA1.
    Xsha,
    Xsha1,
    Xsha256,
    Xsha512,
}

impl ChecksumKind {
    pub const ALL: [ChecksumKind; 7] = [
        ChecksumKind::Md5,
        ChecksumKind::Xmd5,
        ChecksumKind::Xcrc,
        ChecksumKind::Xsha,
        ChecksumKind::Xsha1,
        ChecksumKind::Xsha256,
        ChecksumKind::Xsha512,
    ];

    /// Command word sent on the wire.
    pub fn token(self) -> &'static str {
        match self {
            ChecksumKind::Md5 => "MD5",
            ChecksumKind::Xmd5 => "XMD5",
            ChecksumKind::Xcrc => "XCRC",
            ChecksumKind::Xsha => "XSHA",
            ChecksumKind::Xsha1 => "XSHA1",
            ChecksumKind::Xsha256 => "XSHA256",
            ChecksumKind::Xsha512 => "XSHA512",
        }
    }

    /// Number of hex digits in a digest produced by this command.
    pub fn hex_len(self) -> usize {
        match self {
            ChecksumKind::Md5 | ChecksumKind::Xmd5 => 32,
            ChecksumKind::Xcrc => 8,
            ChecksumKind::Xsha | ChecksumKind::Xsha1 => 40,
            ChecksumKind::Xsha256 => 64,
            ChecksumKind::Xsha512 => 128,
        }
    }
}

impl fmt::Display for ChecksumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for ChecksumKind {
    type Err = ChecksumError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        ChecksumKind::ALL
            .into_iter()
            .find(|kind| kind.token().eq_ignore_ascii_case(token))
            .ok_or_else(|| ChecksumError::UnsupportedCommand {
                token: token.to_string(),
            })
    }
}

/// Where to find the digest in the last line of a reply.
#[derive(Debug)]
pub struct ExtractionRule {
    /// Tried in order; the first that matches wins.
    patterns: Vec<Regex>,
    /// Capture group holding the digest.
    group: usize,
}

impl ExtractionRule {
    fn for_hex_len(len: usize) -> Result<Self, regex::Error> {
        // status line, e.g. "250 myfile.txt <hex>"
        let status = format!(
            r"^2[0-9]{{2}} (?:.*[^0-9A-Fa-f])?([0-9A-Fa-f]{{{len}}})(?:[^0-9A-Fa-f].*)?$"
        );
        // digest only, no status
        let bare = format!(r"^\s*([0-9A-Fa-f]{{{len}}})\s*$");
        Ok(ExtractionRule {
            patterns: vec![Regex::new(&status)?, Regex::new(&bare)?],
            group: 1,
        })
    }

    /// Pull the digest out of a raw reply, uppercased.
    ///
    /// Returns `None` when the last line holds nothing of the right shape.
    pub fn extract(&self, reply_text: &str) -> Option<String> {
        let line = last_line(reply_text);

        self.patterns
            .iter()
            .find_map(|pattern| pattern.captures(line))
            .and_then(|caps| caps.get(self.group))
            .map(|token| token.as_str().to_ascii_uppercase())
    }
}

lazy_static! {
    static ref RULES: HashMap<ChecksumKind, ExtractionRule> = ChecksumKind::ALL
        .into_iter()
        .map(|kind| {
            let rule = ExtractionRule::for_hex_len(kind.hex_len())
                .expect("checksum patterns are valid regexes");
            (kind, rule)
        })
        .collect();
}

/// Look up the extraction rule for `kind`.
pub fn resolve(kind: ChecksumKind) -> Result<&'static ExtractionRule, ChecksumError> {
    RULES
        .get(&kind)
        .ok_or_else(|| ChecksumError::UnsupportedCommand {
            token: kind.token().to_string(),
        })
}

/// A digest as reported by the server, in uppercase hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    kind: ChecksumKind,
    value: String,
}

impl Checksum {
    pub fn kind(&self) -> ChecksumKind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_string(self) -> String {
        self.value
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl PartialEq<&str> for Checksum {
    fn eq(&self, other: &&str) -> bool {
        self.value == *other
    }
}

/// Broad category of a [`ChecksumError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumErrorKind {
    UnsupportedCommand,
    TransportFailure,
    ParseFailure,
}

#[derive(Debug, Clone, Error)]
pub enum ChecksumError {
    /// No extraction rule exists for the requested command.
    #[error("{token} not supported")]
    UnsupportedCommand { token: String },

    /// The command never got a usable reply, or the server refused it.
    #[error(transparent)]
    TransportFailure(#[from] FtpError),

    /// The server answered but the reply holds no recognisable digest.
    #[error("Unable to parse {command} response")]
    ParseFailure {
        command: ChecksumKind,
        code: u16,
        raw_reply: String,
    },
}

impl ChecksumError {
    pub fn kind(&self) -> ChecksumErrorKind {
        match self {
            ChecksumError::UnsupportedCommand { .. } => ChecksumErrorKind::UnsupportedCommand,
            ChecksumError::TransportFailure(_) => ChecksumErrorKind::TransportFailure,
            ChecksumError::ParseFailure { .. } => ChecksumErrorKind::ParseFailure,
        }
    }

    /// The reply text behind the error, when the server sent one.
    pub fn raw_reply(&self) -> Option<&str> {
        match self {
            ChecksumError::ParseFailure { raw_reply, .. } => Some(raw_reply),
            ChecksumError::TransportFailure(FtpError::Rejected { text, .. }) => Some(text),
            _ => None,
        }
    }

    /// Reply status behind the error, when the server sent one.
    pub fn code(&self) -> Option<u16> {
        match self {
            ChecksumError::ParseFailure { code, .. } => Some(*code),
            ChecksumError::TransportFailure(source) => source.code(),
            ChecksumError::UnsupportedCommand { .. } => None,
        }
    }
}

/// Issues checksum commands over a [`Transport`].
///
/// Each call sends exactly one command and waits for its reply; nothing is
/// cached or retried. Whether the server supports a command is only found
/// out by trying it (see [`crate::client::FtpClient::has_feature`]).
pub struct ChecksumClient<T> {
    transport: T,
}

impl<T: Transport> ChecksumClient<T> {
    pub fn new(transport: T) -> Self {
        ChecksumClient { transport }
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Run the checksum command named by `token` (case-insensitive).
    ///
    /// # Errors
    /// UnsupportedCommand for an unknown token, otherwise as [`Self::checksum`].
    pub async fn checksum_command(
        &mut self,
        pathname: &str,
        token: &str,
    ) -> Result<Checksum, ChecksumError> {
        let kind = token.parse::<ChecksumKind>()?;
        self.checksum(pathname, kind).await
    }

    /// Ask the server for the `kind` digest of `pathname`.
    ///
    /// # Errors
    /// TransportFailure when the command could not be sent, no reply came
    /// back, or the server answered 4xx/5xx. ParseFailure when the reply
    /// holds no digest of the expected length.
    pub async fn checksum(
        &mut self,
        pathname: &str,
        kind: ChecksumKind,
    ) -> Result<Checksum, ChecksumError> {
        let rule = resolve(kind)?;
        log::debug!("requesting {} of {}", kind, pathname);

        let reply = self.transport.raw(&format!("{} {}", kind, pathname)).await?;
        if reply.is_error {
            log::warn!("server rejected {}: {}", kind, reply.text);
            return Err(FtpError::Rejected {
                code: reply.code,
                text: reply.text,
            }
            .into());
        }

        match rule.extract(&reply.text) {
            Some(value) => {
                log::debug!("{} of {} is {}", kind, pathname, value);
                Ok(Checksum { kind, value })
            }
            None => {
                log::warn!("could not find {} digest in reply: {}", kind, reply.text);
                Err(ChecksumError::ParseFailure {
                    command: kind,
                    code: reply.code,
                    raw_reply: reply.text,
                })
            }
        }
    }

    pub async fn md5(&mut self, pathname: &str) -> Result<Checksum, ChecksumError> {
        self.checksum(pathname, ChecksumKind::Md5).await
    }

    pub async fn xmd5(&mut self, pathname: &str) -> Result<Checksum, ChecksumError> {
        self.checksum(pathname, ChecksumKind::Xmd5).await
    }

    pub async fn xcrc(&mut self, pathname: &str) -> Result<Checksum, ChecksumError> {
        self.checksum(pathname, ChecksumKind::Xcrc).await
    }

    pub async fn xsha(&mut self, pathname: &str) -> Result<Checksum, ChecksumError> {
        self.checksum(pathname, ChecksumKind::Xsha).await
    }

    pub async fn xsha1(&mut self, pathname: &str) -> Result<Checksum, ChecksumError> {
        self.checksum(pathname, ChecksumKind::Xsha1).await
    }

    pub async fn xsha256(&mut self, pathname: &str) -> Result<Checksum, ChecksumError> {
        self.checksum(pathname, ChecksumKind::Xsha256).await
    }

    pub async fn xsha512(&mut self, pathname: &str) -> Result<Checksum, ChecksumError> {
        self.checksum(pathname, ChecksumKind::Xsha512).await
    }
}
