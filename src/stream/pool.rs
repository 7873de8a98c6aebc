//! Fixed-size pool of playback buffers

use crate::voice::{BufferId, PlaybackVoice, VoiceError};

/// One pool buffer plus the position reached once it finishes playing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSlot {
    /// Voice buffer handle
    pub buffer: BufferId,
    /// Sample offset to adopt when this buffer drains (loop wrap or end of
    /// stream)
    pub pending_seek: Option<u64>,
}

/// Ring of voice buffers owned by the production thread
///
/// Slots are addressed by index. Each carries at most one pending seek
/// marker; taking the marker clears it.
#[derive(Debug, Default)]
pub struct BufferPool {
    slots: Vec<BufferSlot>,
}

impl BufferPool {
    /// Empty pool
    pub fn new() -> Self {
        BufferPool::default()
    }

    /// Allocate `count` buffers from `voice`, with all markers cleared
    ///
    /// Buffers still held from a previous acquire are released first.
    pub fn acquire(&mut self, voice: &dyn PlaybackVoice, count: usize) -> Result<(), VoiceError> {
        self.release(voice)?;
        self.slots = voice
            .create_buffers(count)?
            .into_iter()
            .map(|buffer| BufferSlot {
                buffer,
                pending_seek: None,
            })
            .collect();
        Ok(())
    }

    /// Hand every buffer back to `voice`
    pub fn release(&mut self, voice: &dyn PlaybackVoice) -> Result<(), VoiceError> {
        if self.slots.is_empty() {
            return Ok(());
        }
        let buffers: Vec<BufferId> = self.slots.iter().map(|slot| slot.buffer).collect();
        voice.delete_buffers(&buffers)?;
        self.slots.clear();
        Ok(())
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when no buffers are held
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Buffer handle of `slot`
    pub fn buffer(&self, slot: usize) -> Option<BufferId> {
        self.slots.get(slot).map(|s| s.buffer)
    }

    /// Slot holding `buffer`
    pub fn slot_of(&self, buffer: BufferId) -> Option<usize> {
        self.slots.iter().position(|s| s.buffer == buffer)
    }

    /// Replace the pending seek marker of `slot`
    pub fn set_marker(&mut self, slot: usize, marker: Option<u64>) {
        if let Some(s) = self.slots.get_mut(slot) {
            s.pending_seek = marker;
        }
    }

    /// Remove and return the pending seek marker of `slot`
    pub fn take_marker(&mut self, slot: usize) -> Option<u64> {
        self.slots.get_mut(slot).and_then(|s| s.pending_seek.take())
    }

    /// Pending seek marker of `slot`
    pub fn marker(&self, slot: usize) -> Option<u64> {
        self.slots.get(slot).and_then(|s| s.pending_seek)
    }
}
