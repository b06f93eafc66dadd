//! Amount injection: writing a live balance into a fixed 32-byte slot of a
//! call payload.
//!
//! Quotes are built before anyone knows exactly what each swap will return,
//! so a step that spends the output of an earlier step carries a placeholder
//! word. The patcher replaces that word with the real balance right before
//! the call.

use crate::core::step::PatchIndex;
use alloy_primitives::U256;
use thiserror::Error;

/// Width of a patchable slot.
pub const WORD_SIZE: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("patch at offset {offset} does not fit a {payload_len}-byte payload")]
    OutOfBounds { offset: usize, payload_len: usize },
}

/// A validated instruction to overwrite the word at `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmountInjection {
    offset: usize,
}

impl AmountInjection {
    /// Check that a word at `offset` fits in a payload of `payload_len` bytes.
    pub fn new(offset: usize, payload_len: usize) -> Result<Self, PatchError> {
        match offset.checked_add(WORD_SIZE) {
            Some(end) if end <= payload_len => Ok(Self { offset }),
            _ => Err(PatchError::OutOfBounds {
                offset,
                payload_len,
            }),
        }
    }

    /// The injection a patch index asks for, if any.
    pub fn from_index(index: PatchIndex, payload_len: usize) -> Result<Option<Self>, PatchError> {
        index
            .offset()
            .map(|offset| Self::new(offset, payload_len))
            .transpose()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Write `value` big-endian into the slot. The payload never changes
    /// length.
    pub fn apply(&self, payload: &mut [u8], value: U256) -> Result<(), PatchError> {
        let payload_len = payload.len();
        let end = self.offset + WORD_SIZE;
        let slot = payload
            .get_mut(self.offset..end)
            .ok_or(PatchError::OutOfBounds {
                offset: self.offset,
                payload_len,
            })?;
        slot.copy_from_slice(&value.to_be_bytes::<WORD_SIZE>());
        Ok(())
    }
}

/// Overwrite the 32 bytes at `offset` of `payload` with `value`.
///
/// Fails without touching the payload when `offset + 32` exceeds its
/// length.
///
/// # Examples
///
/// ```
/// use settlement_engine::engine::patcher::patch;
/// use alloy_primitives::U256;
///
/// let mut payload = vec![0xb6, 0xb5, 0x5f, 0x25];
/// payload.extend_from_slice(&[0u8; 32]);
/// patch(&mut payload, 4, U256::from(2_686_750u64)).unwrap();
/// assert_eq!(&payload[33..36], &[0x28, 0xff, 0x1e]);
///
/// assert!(patch(&mut payload, 5, U256::from(1u64)).is_err());
/// ```
pub fn patch(payload: &mut [u8], offset: usize, value: U256) -> Result<(), PatchError> {
    AmountInjection::new(offset, payload.len())?.apply(payload, value)
}
