// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Decoded sector ring buffer
//!
//! Ten 2048-byte slots shared between the read pipeline (producer) and the
//! completion handlers (consumer). Each slot carries an occupancy flag; the
//! producer must never overwrite an occupied slot. An attempt to do so is a
//! backpressure violation surfaced as [`StreamError::BackpressureStall`],
//! and the pipeline stalls rather than losing data.

use super::error::{Result, StreamError};

/// Bytes of payload per transferred sector
pub const SECTOR_SIZE: usize = 2048;

/// Number of slots in the ring
pub const SLOT_COUNT: usize = 10;

/// One slot of the sector ring
pub struct SectorSlot {
    /// Set by the producer, cleared by the consumer
    pub(crate) occupied: bool,
    /// Disc sector the payload came from
    pub(crate) sector_index: u32,
    payload: [u8; SECTOR_SIZE],
}

impl SectorSlot {
    fn empty() -> Self {
        Self {
            occupied: false,
            sector_index: 0,
            payload: [0; SECTOR_SIZE],
        }
    }

    /// Whether the slot still awaits consumption
    pub fn occupied(&self) -> bool {
        self.occupied
    }

    /// Disc sector the payload came from
    pub fn sector_index(&self) -> u32 {
        self.sector_index
    }

    /// Sector payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// Fixed ring of decoded sector payloads
pub struct SectorBuffer {
    slots: Box<[SectorSlot; SLOT_COUNT]>,
    cursor: usize,
}

impl SectorBuffer {
    /// Create an empty buffer with all slots free
    pub fn new() -> Self {
        Self {
            slots: Box::new(std::array::from_fn(|_| SectorSlot::empty())),
            cursor: 0,
        }
    }

    /// Whether the next write target slot is free
    pub fn next_free(&self) -> bool {
        !self.slots[self.cursor].occupied
    }

    /// Write a sector payload into the next slot
    ///
    /// Returns the slot index written. The cursor advances (with
    /// wraparound) only on success.
    ///
    /// # Errors
    ///
    /// [`StreamError::BackpressureStall`] when the target slot is still
    /// occupied; the slot's payload is left unchanged.
    pub fn write_next(&mut self, sector_index: u32, payload: &[u8; SECTOR_SIZE]) -> Result<usize> {
        let index = self.cursor;
        let slot = &mut self.slots[index];
        if slot.occupied {
            log::warn!(
                "sector buffer: slot {} still occupied (sector {})",
                index,
                slot.sector_index
            );
            return Err(StreamError::BackpressureStall { slot: index });
        }

        slot.payload.copy_from_slice(payload);
        slot.sector_index = sector_index;
        slot.occupied = true;
        self.cursor = (index + 1) % SLOT_COUNT;
        log::trace!("sector buffer: wrote sector {} to slot {}", sector_index, index);
        Ok(index)
    }

    /// Consume a slot, clearing its occupancy and returning the payload
    ///
    /// Called only by the completion handler after the payload has been
    /// handed off.
    pub fn consume(&mut self, index: usize) -> &[u8] {
        let slot = &mut self.slots[index];
        slot.occupied = false;
        &slot.payload
    }

    /// Read-only view of a slot
    pub fn slot(&self, index: usize) -> &SectorSlot {
        &self.slots[index]
    }

    /// Number of occupied slots
    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|s| s.occupied).count()
    }

    /// Drop all occupancy and rewind the cursor
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.occupied = false;
        }
        self.cursor = 0;
    }
}

impl Default for SectorBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_consume() {
        let mut buffer = SectorBuffer::new();
        let payload = [0x5A; SECTOR_SIZE];

        let slot = buffer.write_next(42, &payload).unwrap();
        assert_eq!(slot, 0);
        assert!(buffer.slot(0).occupied());
        assert_eq!(buffer.slot(0).sector_index(), 42);

        let data = buffer.consume(slot);
        assert_eq!(data[0], 0x5A);
        assert!(!buffer.slot(0).occupied());
    }

    #[test]
    fn test_cursor_wraps_around() {
        let mut buffer = SectorBuffer::new();
        let payload = [0; SECTOR_SIZE];

        for i in 0..SLOT_COUNT {
            let slot = buffer.write_next(i as u32, &payload).unwrap();
            assert_eq!(slot, i);
            buffer.consume(slot);
        }
        // Eleventh write lands back on slot 0.
        assert_eq!(buffer.write_next(10, &payload).unwrap(), 0);
    }

    #[test]
    fn test_occupied_slot_stalls_without_overwrite() {
        let mut buffer = SectorBuffer::new();
        for i in 0..SLOT_COUNT {
            buffer.write_next(i as u32, &[i as u8; SECTOR_SIZE]).unwrap();
        }
        assert!(!buffer.next_free());

        let err = buffer.write_next(99, &[0xFF; SECTOR_SIZE]).unwrap_err();
        assert!(matches!(err, StreamError::BackpressureStall { slot: 0 }));

        // Slot 0 payload unchanged, cursor did not advance.
        assert_eq!(buffer.slot(0).payload()[0], 0);
        assert_eq!(buffer.slot(0).sector_index(), 0);
        let err = buffer.write_next(99, &[0xFF; SECTOR_SIZE]).unwrap_err();
        assert!(matches!(err, StreamError::BackpressureStall { slot: 0 }));
    }

    #[test]
    fn test_consume_frees_stalled_slot() {
        let mut buffer = SectorBuffer::new();
        for i in 0..SLOT_COUNT {
            buffer.write_next(i as u32, &[0; SECTOR_SIZE]).unwrap();
        }
        buffer.consume(0);
        assert!(buffer.next_free());
        assert_eq!(buffer.write_next(10, &[1; SECTOR_SIZE]).unwrap(), 0);
    }

    #[test]
    fn test_clear_resets_occupancy_and_cursor() {
        let mut buffer = SectorBuffer::new();
        buffer.write_next(1, &[0; SECTOR_SIZE]).unwrap();
        buffer.write_next(2, &[0; SECTOR_SIZE]).unwrap();
        buffer.clear();
        assert_eq!(buffer.occupied_count(), 0);
        assert_eq!(buffer.write_next(3, &[0; SECTOR_SIZE]).unwrap(), 0);
    }
}
