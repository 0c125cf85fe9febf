//! Errors for the `scpi-server` crate.
//!
//! Per the wire contract, none of these ever closes a connection or the
//! listener: a [`Error`] raised while handling a statement is logged and
//! turned into `NaN` (for a query) or a silently dropped write. The only
//! errors the embedder sees directly are [`Error::Config`] (raised at
//! registration time) and [`Error::Bind`] (surfaced from `open()`, but
//! non-fatal: the listener simply stays non-listening).

use thiserror::Error;

/// A `Result` type for `scpi-server` operations.
pub type Result<T> = ::std::result::Result<T, Error>;

/// An error raised by the command tree, dispatcher, or listener.
#[derive(Debug, Error)]
pub enum Error {
    /// Raised at registration time: a bad name, a duplicate default, a
    /// conflicting re-registration, or a special-command arity mismatch.
    #[error("configuration error: {0}")]
    Config(String),

    /// An unknown keyword or special command was referenced during dispatch.
    #[error("lookup error: {0}")]
    Lookup(String),

    /// A write's value was not a member of the attribute's `allowed_argins`.
    #[error("argument error: {0}")]
    Argument(String),

    /// A user-supplied read or write callback returned an error.
    #[error("callback error: {0}")]
    Callback(String),

    /// The listener could not bind after exhausting its retries.
    #[error("bind error: {0}")]
    Bind(String),

    /// A protocol-grammar error from `scpi-proto`.
    #[error(transparent)]
    Protocol(#[from] scpi_proto::ProtocolError),

    /// An underlying I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
