//! The SCPI line grammar, distilled.
//!
//! This crate has no knowledge of a command tree, a socket, or a lock —
//! it only turns wire text into the small set of tokens
//! (statement boundaries, leading-`:` prefix reuse, special-command
//! heads, per-keyword channel suffixes) that a dispatcher needs to walk
//! a tree and produce a reply. See `scpi-server` for the dispatcher.

pub mod error;
pub mod grammar;

#[cfg(feature = "tokio-util")]
pub mod line;

pub use error::{ProtocolError, Result};
pub use grammar::{
    expand_prefixes, parse_keyword_segment, parse_special_head, split_keywords,
    split_statements, KeywordSegment, SpecialHead, Trailing, CHNUMSIZE,
};

#[cfg(feature = "tokio-util")]
pub use line::LineCodec;
