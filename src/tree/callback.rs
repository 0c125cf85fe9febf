//! The capability interface that replaces the original's duck-typed
//! callables: embedders register plain closures, which are adapted to
//! these two traits via blanket impls.

use std::sync::Arc;

use crate::error::Error;

/// Reads an attribute or special command, given the channel indices (if
/// any) threaded through from the keyword walk and an optional argument
/// payload (queries may carry parameters after the `?`, per the grammar).
pub trait ReadCallback: Send + Sync {
    fn read(&self, channels: &[u32], params: Option<&str>) -> Result<String, Error>;
}

/// Writes an attribute or special command with the given value.
pub trait WriteCallback: Send + Sync {
    fn write(&self, channels: &[u32], value: &str) -> Result<(), Error>;
}

impl<F> ReadCallback for F
where
    F: Fn(&[u32], Option<&str>) -> Result<String, Error> + Send + Sync,
{
    fn read(&self, channels: &[u32], params: Option<&str>) -> Result<String, Error> {
        self(channels, params)
    }
}

impl<F> WriteCallback for F
where
    F: Fn(&[u32], &str) -> Result<(), Error> + Send + Sync,
{
    fn write(&self, channels: &[u32], value: &str) -> Result<(), Error> {
        self(channels, value)
    }
}

pub type ReadCb = Arc<dyn ReadCallback>;
pub type WriteCb = Arc<dyn WriteCallback>;
