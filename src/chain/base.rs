// Holder of the most recently reconstructed document.

use log::debug;

use crate::error::{Error, Result};

#[derive(Debug, Default)]
pub struct BaseStore {
    current: Option<Vec<u8>>,
}

impl BaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held document. An absent payload leaves the store as it was.
    pub fn set(&mut self, bytes: Option<Vec<u8>>) -> Result<()> {
        let bytes =
            bytes.ok_or_else(|| Error::InvalidArgument("base payload cannot be absent".into()))?;
        self.replace(bytes);
        Ok(())
    }

    pub(crate) fn replace(&mut self, bytes: Vec<u8>) {
        debug!("base replaced: {} bytes", bytes.len());
        self.current = Some(bytes);
    }

    pub(crate) fn get(&self) -> Result<&[u8]> {
        self.current.as_deref().ok_or(Error::Uninitialized)
    }

    pub fn is_initialized(&self) -> bool {
        self.current.is_some()
    }
}
