//! Backing memory for one in-flight frame.

use crate::error::Trigger5Error;

/// A transfer buffer sized exactly to one encoded frame.
///
/// Reused while the frame length stays the same. A length change
/// releases the old allocation before the new one is made, so two
/// generations never coexist. A zero-length frame still counts as
/// an allocation, so it is reused like any other.
#[derive(Debug, Default)]
pub struct TransferBuffer {
    data: Option<Vec<u8>>,
}

impl TransferBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Size the buffer to `len` bytes.
    ///
    /// Returns `true` when a reallocation happened. On failure the
    /// buffer is left empty.
    pub fn ensure_len(&mut self, len: usize) -> Result<bool, Trigger5Error> {
        if self.data.as_ref().is_some_and(|d| d.len() == len) {
            return Ok(false);
        }

        self.release();
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| Trigger5Error::AllocationFailure { len })?;
        data.resize(len, 0);
        self.data = Some(data);
        Ok(true)
    }

    /// Free the allocation.
    pub fn release(&mut self) {
        self.data = None;
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        self.data.as_deref().unwrap_or_default()
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.data.as_deref_mut().unwrap_or_default()
    }
}
