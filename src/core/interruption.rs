//! Barge-in handling.
//!
//! The bridge cannot observe the gateway's playback clock directly. Instead,
//! every chunk of AI audio sent to the telephony side is followed by a `mark`
//! frame, and the gateway echoes that mark once the audio queued before it
//! has been played. Playback position is therefore derived from cumulative
//! byte counts (converted with [`codec::duration_ms`](crate::core::codec::duration_ms))
//! and advances in whole chunks as marks are acknowledged.
//!
//! On barge-in the oldest unacknowledged mark tells us where the caller
//! stopped hearing the assistant: its start offset within its item is the
//! truncation point.

use std::collections::VecDeque;

use serde::Serialize;

use crate::core::codec::{self, AudioFormat};

/// Marks kept in flight when no capacity is given
pub const DEFAULT_MAX_MARKS: usize = 256;

/// One chunk of AI audio awaiting playback acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterruptionMark {
    /// Mark name sent to the gateway
    pub name: String,
    pub item_id: String,
    /// Offset of the chunk start within its item
    pub start_ms: u64,
    /// Offset of the chunk end within its item
    pub end_ms: u64,
}

/// Result of a barge-in: where to truncate the assistant item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interruption {
    pub item_id: String,
    pub audio_end_ms: u64,
}

/// Tracks AI audio in flight to the caller.
#[derive(Debug)]
pub struct InterruptionController {
    marks: VecDeque<InterruptionMark>,
    max_marks: usize,
    current_item: Option<String>,
    /// Cumulative sent bytes within `current_item`
    item_offset_bytes: usize,
    /// Last acknowledged offset, for observation
    played_ms: u64,
    response_done: bool,
}

impl Default for InterruptionController {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_MARKS)
    }
}

impl InterruptionController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `max_marks` marks in flight.
    ///
    /// Past the limit the two oldest marks of the same item are merged under
    /// the newer name. The echo of the older name is then ignored, and a
    /// barge-in still truncates at the start of the merged chunk.
    pub fn with_capacity(max_marks: usize) -> Self {
        Self {
            marks: VecDeque::new(),
            max_marks: max_marks.max(1),
            current_item: None,
            item_offset_bytes: 0,
            played_ms: 0,
            response_done: false,
        }
    }

    /// Whether AI audio is queued on the telephony side.
    pub fn is_speaking(&self) -> bool {
        !self.marks.is_empty()
    }

    pub fn pending_marks(&self) -> usize {
        self.marks.len()
    }

    /// Acknowledged playback position within the current item.
    pub fn played_ms(&self) -> u64 {
        self.played_ms
    }

    /// Record `len` bytes of outbound AI audio in `format` followed by `mark`.
    pub fn record_audio(
        &mut self,
        mark: &str,
        item_id: &str,
        len: usize,
        format: AudioFormat,
    ) -> &InterruptionMark {
        if self.current_item.as_deref() != Some(item_id) {
            self.current_item = Some(item_id.to_string());
            self.item_offset_bytes = 0;
            self.played_ms = 0;
        }
        self.response_done = false;

        let start_ms = codec::duration_ms(self.item_offset_bytes, format);
        self.item_offset_bytes += len;
        self.marks.push_back(InterruptionMark {
            name: mark.to_string(),
            item_id: item_id.to_string(),
            start_ms,
            end_ms: codec::duration_ms(self.item_offset_bytes, format),
        });
        if self.marks.len() > self.max_marks {
            self.coalesce_oldest();
        }
        // Just pushed
        &self.marks[self.marks.len() - 1]
    }

    fn coalesce_oldest(&mut self) {
        let same_item = self.marks.len() >= 2 && self.marks[0].item_id == self.marks[1].item_id;
        let Some(oldest) = self.marks.pop_front() else {
            return;
        };
        if same_item {
            self.marks[0].start_ms = oldest.start_ms;
        } else if Some(oldest.item_id.as_str()) == self.current_item.as_deref() {
            self.played_ms = oldest.end_ms;
        }
    }

    /// Handle a mark echoed by the gateway.
    ///
    /// Acknowledges the named mark and every mark queued before it. Unknown
    /// names (e.g. echoes arriving after a clear) are ignored and return
    /// `false`.
    pub fn acknowledge(&mut self, name: &str) -> bool {
        let Some(position) = self.marks.iter().position(|m| m.name == name) else {
            return false;
        };
        for mark in self.marks.drain(..=position) {
            if Some(mark.item_id.as_str()) == self.current_item.as_deref() {
                self.played_ms = mark.end_ms;
            }
        }
        if self.response_done && self.marks.is_empty() {
            self.reset();
        }
        true
    }

    /// The realtime API finished the current response.
    ///
    /// Marks still in flight stay until acknowledged; once none remain the
    /// controller returns to idle.
    pub fn response_done(&mut self) {
        self.response_done = true;
        if self.marks.is_empty() {
            self.reset();
        }
    }

    /// Caller started speaking.
    ///
    /// Returns the truncation point if AI audio is queued for playback, then
    /// forgets all marks. Repeated calls without new audio return `None`.
    pub fn barge_in(&mut self) -> Option<Interruption> {
        let oldest = self.marks.front()?;
        let interruption = Interruption {
            item_id: oldest.item_id.clone(),
            audio_end_ms: oldest.start_ms,
        };
        self.reset();
        Some(interruption)
    }

    fn reset(&mut self) {
        self.marks.clear();
        self.current_item = None;
        self.item_offset_bytes = 0;
        self.played_ms = 0;
        self.response_done = false;
    }
}
