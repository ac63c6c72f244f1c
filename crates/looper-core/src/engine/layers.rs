//! Overdub layer arena
//!
//! All overdub layers live in one sample pool allocated when the engine is
//! built. When the loop length is frozen the pool is carved into equal slots
//! of `loop_length` samples, one per layer, in recording order.
//!
//! ```text
//! arena: [ slot 0 | slot 1 | slot 2 | ... | slot n-1 | unused tail ]
//!          layer 0  layer 1  (free)
//! ```
//!
//! Slots are never zeroed up front. Each layer remembers the circular range
//! it has written, starting at the playhead where its pass began; anything
//! outside that range reads as silence. Pushing and popping a layer is
//! therefore O(1) on the audio thread, whatever the loop length.
//!
//! When every slot is taken, a push does not open a new layer: the pass keeps
//! accumulating into the newest one, and a later undo removes all of it.

use crate::types::Sample;

/// Bookkeeping for one slot in use
#[derive(Debug, Clone, Copy)]
struct Layer {
    /// Loop position of the first sample this layer received
    start: usize,
    /// Number of consecutive positions (from `start`, wrapping) written so far
    covered: usize,
}

/// Stack of overdub layers backed by a fixed arena
pub struct LayerStack {
    arena: Vec<Sample>,
    layers: Vec<Layer>,
    max_layers: usize,
    slot_len: usize,
    slot_count: usize,
}

impl LayerStack {
    /// Allocate the arena (control thread only)
    ///
    /// `max_layers` is raised to 1 if zero.
    pub fn new(arena_samples: usize, max_layers: usize) -> Self {
        let max_layers = max_layers.max(1);
        Self {
            arena: vec![0.0; arena_samples],
            layers: Vec::with_capacity(max_layers),
            max_layers,
            slot_len: 0,
            slot_count: 0,
        }
    }

    /// Carve the arena into slots for a freshly frozen loop
    ///
    /// Drops any existing layers.
    pub fn configure(&mut self, loop_length: usize) {
        self.layers.clear();
        self.slot_len = loop_length;
        self.slot_count = if loop_length == 0 {
            0
        } else {
            (self.arena.len() / loop_length).min(self.max_layers)
        };
    }

    /// Drop every layer and forget the slot layout
    pub fn clear(&mut self) {
        self.layers.clear();
        self.slot_len = 0;
        self.slot_count = 0;
    }

    /// Number of layers currently on the stack
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// How many layers fit for the current loop length
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Whether the next push will fold into the newest layer
    pub fn is_full(&self) -> bool {
        self.layers.len() >= self.slot_count
    }

    /// Open a new layer whose pass begins at `start`
    ///
    /// Returns `false` if no slot is free, in which case writes keep going to
    /// the newest layer.
    pub fn push(&mut self, start: usize) -> bool {
        if self.slot_len == 0 || self.is_full() {
            return false;
        }
        self.layers.push(Layer {
            start: start % self.slot_len,
            covered: 0,
        });
        true
    }

    /// Remove the newest layer, returning whether one existed
    pub fn pop(&mut self) -> bool {
        self.layers.pop().is_some()
    }

    /// Sum of all layers at loop position `pos`
    #[inline]
    pub fn sum_at(&self, pos: usize) -> Sample {
        let mut sum = 0.0;
        for (index, layer) in self.layers.iter().enumerate() {
            if self.offset_in(layer, pos) < layer.covered {
                sum += self.arena[index * self.slot_len + pos];
            }
        }
        sum
    }

    /// Add `value` to the newest layer at loop position `pos`
    ///
    /// Writes are expected to move forward one position at a time. A pass
    /// that starts ahead of the written range (only possible once the stack
    /// is full) clears the skipped positions first.
    #[inline]
    pub fn accumulate(&mut self, pos: usize, value: Sample) {
        let slot_len = self.slot_len;
        let Some(index) = self.layers.len().checked_sub(1) else {
            return;
        };
        let layer = self.layers[index];
        let offset = self.offset_in(&layer, pos);
        let base = index * slot_len;

        if offset < layer.covered {
            self.arena[base + pos] += value;
            return;
        }

        for skipped in layer.covered..offset {
            let p = wrap(layer.start + skipped, slot_len);
            self.arena[base + p] = 0.0;
        }
        self.arena[base + pos] = value;
        self.layers[index].covered = offset + 1;
    }

    /// Distance from the layer's first position to `pos`, going forward
    #[inline]
    fn offset_in(&self, layer: &Layer, pos: usize) -> usize {
        if pos >= layer.start {
            pos - layer.start
        } else {
            pos + self.slot_len - layer.start
        }
    }
}

#[inline]
fn wrap(pos: usize, len: usize) -> usize {
    if pos >= len {
        pos - len
    } else {
        pos
    }
}
