//! SCPI protocol errors.

use thiserror::Error;

/// A `Result` type for SCPI `ProtocolError`s.
pub type Result<T> = ::std::result::Result<T, ProtocolError>;

/// An error in the SCPI line grammar.
///
/// These never reach the wire: a query statement that fails to parse
/// resolves to `NaN`, a write statement is dropped. See the dispatcher in
/// the root crate for how these are turned into reply slots.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// An internal I/O error, surfaced by a codec built on top of this grammar.
    #[error("an io error occurred")]
    Io(#[from] std::io::Error),

    /// A statement starting with `:` was the first statement on the line, so
    /// there is no previous statement to inherit a prefix from.
    #[error("leading ':' on the first statement of a line has no prefix to inherit")]
    LeadingColonOnFirstStatement,

    /// A special command (`*NAME`) contained a `:`, which is only valid in
    /// the colon-separated command tree, not in the flat special-command table.
    #[error("special command {0:?} contains ':', which is not allowed")]
    ColonInSpecialCommand(String),
}
