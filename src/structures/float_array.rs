//! A growable buffer of 32-bit floats — the column payload for one
//! block-slot of one key.

use crate::encoding::Encode;
use crate::error::GaugedError;

/// A growable array of `f32` with explicit disposal.
///
/// Backed by a plain `Vec<f32>` wrapped in an `Option` so that "freeing" the
/// array (or letting it drop) can be observed: every operation after release
/// returns [`GaugedError::UseAfterRelease`] instead of silently operating on
/// an empty buffer.
#[derive(Debug, Default)]
pub struct FloatArray {
    buffer: Option<Vec<f32>>,
}

impl FloatArray {
    /// Creates an empty array.
    pub fn new() -> Self {
        Self {
            buffer: Some(Vec::new()),
        }
    }

    /// Creates an array pre-populated from an owned list of floats.
    pub fn from_floats(xs: Vec<f32>) -> Self {
        Self { buffer: Some(xs) }
    }

    /// Reconstructs an array from a contiguous little-endian `f32` byte buffer.
    ///
    /// `buf.len()` must be a multiple of 4; each 4-byte word is one value.
    pub fn import(buf: &[u8]) -> Result<Self, GaugedError> {
        if buf.len() % 4 != 0 {
            return Err(GaugedError::MalformedSparseMap(format!(
                "float array byte length {} is not a multiple of 4",
                buf.len()
            )));
        }
        let mut values = Vec::with_capacity(buf.len() / 4);
        for chunk in buf.chunks_exact(4) {
            let (value, _) = crate::encoding::decode_from_slice::<f32>(chunk)?;
            values.push(value);
        }
        Ok(Self::from_floats(values))
    }

    fn buf(&self) -> Result<&Vec<f32>, GaugedError> {
        self.buffer.as_ref().ok_or(GaugedError::UseAfterRelease)
    }

    fn buf_mut(&mut self) -> Result<&mut Vec<f32>, GaugedError> {
        self.buffer.as_mut().ok_or(GaugedError::UseAfterRelease)
    }

    /// Appends a value. Amortized O(1); grows by doubling via `Vec::push`.
    pub fn append(&mut self, value: f32) -> Result<(), GaugedError> {
        self.buf_mut()?.push(value);
        Ok(())
    }

    pub fn len(&self) -> Result<usize, GaugedError> {
        Ok(self.buf()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, GaugedError> {
        Ok(self.buf()?.is_empty())
    }

    pub fn byte_length(&self) -> Result<usize, GaugedError> {
        Ok(self.buf()?.len() * 4)
    }

    pub fn get(&self, index: usize) -> Result<f32, GaugedError> {
        self.buf()?
            .get(index)
            .copied()
            .ok_or(GaugedError::MalformedSparseMap(format!(
                "float array index {index} out of bounds"
            )))
    }

    /// Returns an immutable view over the current values. Callers must not
    /// retain it across a subsequent mutation — enforced here by the
    /// borrow checker, since the returned slice borrows `self`.
    pub fn values(&self) -> Result<&[f32], GaugedError> {
        Ok(self.buf()?.as_slice())
    }

    /// Encodes the current values as a contiguous little-endian byte buffer,
    /// starting at `byte_offset` bytes into the logical array.
    pub fn buffer(&self, byte_offset: usize) -> Result<Vec<u8>, GaugedError> {
        let values = self.buf()?;
        let skip = byte_offset / 4;
        let mut out = Vec::with_capacity((values.len().saturating_sub(skip)) * 4);
        for value in values.iter().skip(skip) {
            value.encode_to(&mut out)?;
        }
        Ok(out)
    }

    /// Truncates the array to zero length, retaining its allocation.
    pub fn clear(&mut self) -> Result<(), GaugedError> {
        self.buf_mut()?.clear();
        Ok(())
    }

    /// Releases the backing buffer. Idempotent; any further operation fails
    /// with [`GaugedError::UseAfterRelease`].
    pub fn release(&mut self) {
        self.buffer = None;
    }
}

impl Drop for FloatArray {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_len() {
        let mut arr = FloatArray::new();
        arr.append(1.0).unwrap();
        arr.append(2.0).unwrap();
        assert_eq!(arr.len().unwrap(), 2);
        assert_eq!(arr.byte_length().unwrap(), 8);
    }

    #[test]
    fn import_roundtrips_with_buffer() {
        let arr = FloatArray::from_floats(vec![1.0, -2.5, 3.25]);
        let bytes = arr.buffer(0).unwrap();
        let reimported = FloatArray::import(&bytes).unwrap();
        assert_eq!(reimported.values().unwrap(), &[1.0, -2.5, 3.25]);
    }

    #[test]
    fn import_rejects_misaligned_buffer() {
        assert!(FloatArray::import(&[0, 1, 2]).is_err());
    }

    #[test]
    fn buffer_respects_byte_offset() {
        let arr = FloatArray::from_floats(vec![1.0, 2.0, 3.0]);
        let bytes = arr.buffer(4).unwrap();
        let reimported = FloatArray::import(&bytes).unwrap();
        assert_eq!(reimported.values().unwrap(), &[2.0, 3.0]);
    }

    #[test]
    fn clear_retains_capacity_but_drops_values() {
        let mut arr = FloatArray::from_floats(vec![1.0, 2.0]);
        arr.clear().unwrap();
        assert_eq!(arr.len().unwrap(), 0);
    }

    #[test]
    fn use_after_release_fails_fast() {
        let mut arr = FloatArray::from_floats(vec![1.0]);
        arr.release();
        assert!(matches!(
            arr.append(2.0),
            Err(GaugedError::UseAfterRelease)
        ));
        assert!(matches!(arr.len(), Err(GaugedError::UseAfterRelease)));
        assert!(matches!(
            arr.byte_length(),
            Err(GaugedError::UseAfterRelease)
        ));
    }

    #[test]
    fn release_is_idempotent() {
        let mut arr = FloatArray::new();
        arr.release();
        arr.release();
        assert!(matches!(
            arr.values(),
            Err(GaugedError::UseAfterRelease)
        ));
    }
}
