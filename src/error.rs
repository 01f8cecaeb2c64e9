//! Error types shared by the server and the request driver.
//!
//! Failures inside the request path never terminate the server: protocol
//! errors drop the connection, driver errors are counted and reported.
//! Banking outcomes such as "account not found" are not errors at all; they
//! are ordinary response bodies produced by the executor.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Framing errors on either side of the HTTP subset.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("timed out reading request after {0:?}")]
    ReadTimeout(Duration),
    #[error("request head exceeds {0} bytes")]
    HeadTooLarge(usize),
    #[error("unsupported request line: {0:?}")]
    UnsupportedMethod(String),
    #[error("malformed request line: {0:?}")]
    MalformedRequestLine(String),
    #[error("missing status line")]
    MissingStatusLine,
    #[error("malformed status line: {0:?}")]
    MalformedStatusLine(String),
    #[error("invalid Content-Length: {0:?}")]
    BadContentLength(String),
}

/// Per-request failures seen by the batched driver.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("error connecting to server at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("unexpected status line from server: {0}")]
    UnexpectedStatus(String),
    #[error("invalid msg from server. Expected: '{expected}' but got '{actual}'")]
    Mismatch { expected: String, actual: String },
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("request task did not complete")]
    TaskFailed,
}

/// Errors while reading a test script.
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Unable to open input file '{}': {}", .0.display(), .1)]
    Read(PathBuf, #[source] io::Error),
    #[error("unterminated quote starting at byte {0}")]
    UnterminatedQuote(usize),
    #[error("request {0:?} has no expected response")]
    MissingExpected(String),
    #[error("invalid run directive: {0}")]
    InvalidRunDirective(String),
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, #[source] io::Error),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),
}
