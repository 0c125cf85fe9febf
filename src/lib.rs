//! An SCPI (Standard Commands for Programmable Instruments) server core.
//!
//! A [`Scpi`] instance owns a hierarchical command tree, the exclusive-
//! access locks gating it, and the TCP listener that serves it to many
//! clients at once. Embedders register components, channel arrays, and
//! attributes via closures; the instance then parses and dispatches
//! incoming lines and writes back the formatted reply.
//!
//! Binary block-data transfer, SCPI-99 beyond `:SYSTem:LOCK`/
//! `:SYSTem:WLOCK`, TLS, and cross-restart persistence are out of scope.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod facade;
pub mod hooks;
pub mod lock;
pub mod net;
pub mod tree;

pub use config::ScpiConfig;
pub use error::{Error, Result};
pub use facade::Scpi;
pub use hooks::{ConnectionHook, HookId};
pub use lock::ClientId;
pub use tree::{ReadCallback, ReadCb, WriteCallback, WriteCb};
