//! Core sample types shared by the engine and the audio host

/// Single mono audio sample
pub type Sample = f32;

/// Pre-allocated mono sample buffer for the real-time path
///
/// The backing storage is allocated once at full capacity. The audio thread
/// only changes the working length with [`MonoBuffer::set_len_from_capacity`],
/// which never reallocates.
#[derive(Debug, Clone)]
pub struct MonoBuffer {
    data: Vec<Sample>,
    len: usize,
}

impl MonoBuffer {
    /// Create a silent buffer with the given capacity (and working length)
    pub fn silence(capacity: usize) -> Self {
        Self {
            data: vec![0.0; capacity],
            len: capacity,
        }
    }

    /// Current working length
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Set the working length without reallocating (RT-safe)
    ///
    /// Values larger than the capacity are clamped.
    #[inline]
    pub fn set_len_from_capacity(&mut self, len: usize) {
        self.len = len.min(self.data.len());
    }

    #[inline]
    pub fn as_slice(&self) -> &[Sample] {
        &self.data[..self.len]
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [Sample] {
        &mut self.data[..self.len]
    }
}
