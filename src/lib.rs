//! [crate] Server-side file checksums over FTP.
//! Sends the non-standard `MD5`, `XMD5`, `XCRC` and `XSHA*` commands and
//! pulls the digest out of whatever reply the server comes back with.
//! Servers disagree wildly on reply format, so parsing is deliberately
//! tolerant; only the shape of the digest is checked, never its value.
//! # Example:
//! ```no_run
//! use ftpsum::checksum::ChecksumClient;
//! use ftpsum::client::FtpClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // connect to server
//!     let mut client = FtpClient::connect("test.rebex.net:21").await?;
//!     client.login("demo", "password").await?;
//!
//!     // ask the server for a digest
//!     let mut sums = ChecksumClient::new(client);
//!     let md5 = sums.md5("/readme.txt").await?;
//!     println!("{}", md5);
//!
//!     // disconnect from server
//!     sums.into_inner().quit().await?;
//!     Ok(())
//! }
//!```

use std::io::ErrorKind;
use thiserror::Error;

pub mod checksum;
pub mod client;

/// Errors raised by the FTP control connection.
#[derive(Debug, Clone, Error)]
pub enum FtpError {
    #[error("Login Error: {0}")]
    LoginError(String),
    #[error("Connection Error: {0}")]
    ConnectionError(String),
    #[error("Command Error: {0}")]
    CommandError(String),
    #[error("Response Error: {0}")]
    ResponseError(String),
    /// The server answered with a 4xx/5xx status.
    #[error("Server rejected command ({code}): {text}")]
    Rejected { code: u16, text: String },
}

impl FtpError {
    /// Reply status attached to the error, if the server sent one.
    pub fn code(&self) -> Option<u16> {
        match self {
            FtpError::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FtpError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => {
                Self::ConnectionError(format!("IO resource connection failed: {}", error))
            }
            ErrorKind::TimedOut => Self::ConnectionError("connection timed out".into()),
            _ => Self::ResponseError(format!("Error reading control connection: {}", error)),
        }
    }
}

/// Generic Result type defaults to Result<T, FtpError>
pub type Result<T> = std::result::Result<T, FtpError>;

pub(crate) mod status {

    /* Response codes definitions */

    pub const SERVICE_READY: u16 = 220;
    pub const SERVICE_CLOSING: u16 = 221;
    pub const LOGGED_IN: u16 = 230;
    pub const NEED_PASSWORD: u16 = 331;

    /// First status that signals a transient or permanent failure.
    pub const FIRST_ERROR: u16 = 400;
    /// First permanent-failure status (5xx).
    pub const FIRST_PERMANENT_ERROR: u16 = 500;
}
