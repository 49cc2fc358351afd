//! MikroTik RouterOS API client.
//!
//! ## Layout
//!
//! ```text
//! codec.rs    — length-prefixed word/sentence encoding (pure data)
//! client.rs   — RouterClient session state machine over TCP or TLS
//! queries.rs  — the read-only commands the tools use, normalized
//! tls.rs      — rustls connector for the api-ssl port
//! ```
//!
//! Replies are parsed into [`Reply`] values; attribute words (`=key=value`)
//! become a [`Record`], preserving the router's attribute order. Words that
//! are not valid UTF-8 are decoded as Windows-1252, the codepage RouterOS
//! uses for identities, comments and DHCP host names by default.

pub mod client;
pub mod codec;
mod queries;
mod tls;

pub use client::{RouterClient, SessionState};

use std::borrow::Cow;

use bytes::Bytes;
use encoding_rs::WINDOWS_1252;
use indexmap::IndexMap;

use crate::error::{ErrorDescriptor, ErrorKind};

/// Attributes of one reply sentence, in wire order.
pub type Record = IndexMap<String, String>;

/// Errors returned by [`RouterClient`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum RouterError {
    /// TCP/TLS failure, timeout, `!fatal`, or the router hung up.
    #[error("cannot reach router at {addr}: {reason}")]
    Unreachable { addr: String, reason: String },
    /// The router rejected the login sentence.
    #[error("login failed: {0}")]
    AuthFailed(String),
    /// `!trap` in reply to a command.
    #[error("{command}: {message}")]
    Command { command: String, message: String },
    /// The reply could not be read.
    #[error("malformed router reply: {0}")]
    Malformed(String),
}

impl RouterError {
    pub fn to_descriptor(&self) -> ErrorDescriptor {
        match self {
            RouterError::Unreachable { .. } => {
                ErrorDescriptor::new(ErrorKind::RouterUnreachable, self.to_string())
            }
            RouterError::AuthFailed(message) => {
                ErrorDescriptor::new(ErrorKind::RouterAuthFailed, message.clone())
            }
            // The router's own message, verbatim.
            RouterError::Command { message, .. } => {
                ErrorDescriptor::new(ErrorKind::RouterCommandError, message.clone())
            }
            RouterError::Malformed(message) => {
                ErrorDescriptor::new(ErrorKind::MalformedResponse, message.clone())
            }
        }
    }
}

/// One parsed reply sentence.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// `!re`: one data record.
    Re(Record),
    /// `!done`: end of the reply; may carry attributes (e.g. `=ret=`).
    Done(Record),
    /// `!trap`: command failed; `=message=` explains why.
    Trap(Record),
    /// `!fatal`: the router is closing the connection.
    Fatal(String),
    /// `!empty`: no records (RouterOS 7.18+).
    Empty,
}

/// Text of one reply word: UTF-8 when it is valid, Windows-1252 otherwise.
pub fn word_text(word: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(word) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => WINDOWS_1252.decode_without_bom_handling(word).0,
    }
}

/// Classify a reply sentence and collect its attributes.
pub fn parse_reply(sentence: &[Bytes]) -> Result<Reply, RouterError> {
    let (kind, rest) = sentence
        .split_first()
        .ok_or_else(|| RouterError::Malformed("empty sentence".into()))?;
    let kind = word_text(kind);

    if kind == "!fatal" {
        let reason: Vec<Cow<'_, str>> = rest.iter().map(|w| word_text(w)).collect();
        return Ok(Reply::Fatal(reason.join(" ")));
    }

    let attrs = attributes(rest);
    match kind.as_ref() {
        "!re" => Ok(Reply::Re(attrs)),
        "!done" => Ok(Reply::Done(attrs)),
        "!trap" => Ok(Reply::Trap(attrs)),
        "!empty" => Ok(Reply::Empty),
        other => Err(RouterError::Malformed(format!(
            "unexpected reply word '{other}'"
        ))),
    }
}

/// `=key=value` words into a record. API words (`.tag=`) and anything else
/// are skipped.
fn attributes(words: &[Bytes]) -> Record {
    words
        .iter()
        .filter_map(|w| {
            let text = word_text(w);
            let (k, v) = text.strip_prefix('=')?.split_once('=')?;
            Some((k.to_string(), v.to_string()))
        })
        .collect()
}
