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

//! Pending drive command queue
//!
//! A fixed 16-slot array of commands awaiting issue to the drive. Two
//! properties distinguish it from a plain FIFO:
//!
//! - **Coalescing**: for [`CommandKind::Seek`] and [`CommandKind::SetMode`],
//!   appending removes any still-pending command of the same kind before
//!   inserting the new one at the tail, so a superseded seek target is
//!   never issued to the hardware.
//! - **Compaction**: popping the head shifts the remaining entries up one
//!   slot, so the write cursor only ever advances and returns to the base
//!   of the array on full drain. O(n) per pop, fine at this depth.
//!
//! The queue never overwrites: appending at capacity is a hard
//! [`StreamError::QueueFull`].

use super::error::{Result, StreamError};

/// Kinds of drive commands held in the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Reposition the read head to a target sector
    Seek,
    /// Transfer one or more sectors from the current head position
    Read,
    /// Change the drive mode (speed, sector format)
    SetMode,
    /// Raw controller operation passed through unchanged
    Custom,
}

impl CommandKind {
    /// Whether a newer command of this kind supersedes a pending one
    pub(crate) fn coalesces(self) -> bool {
        matches!(self, CommandKind::Seek | CommandKind::SetMode)
    }
}

/// One queued drive command: a kind plus three argument words
///
/// Occupies one logical 16-byte queue slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub args: [u32; 3],
}

impl Command {
    /// Seek to a target sector
    pub fn seek(target_sector: u32) -> Self {
        Self {
            kind: CommandKind::Seek,
            args: [target_sector, 0, 0],
        }
    }

    /// Read `count` sectors from the current head position
    pub fn read(count: u32) -> Self {
        Self {
            kind: CommandKind::Read,
            args: [count, 0, 0],
        }
    }

    /// Change the drive mode word
    pub fn set_mode(mode: u32) -> Self {
        Self {
            kind: CommandKind::SetMode,
            args: [mode, 0, 0],
        }
    }

    /// Stop read activity and settle the head
    pub fn settle() -> Self {
        Self {
            kind: CommandKind::Custom,
            args: [Self::OP_SETTLE, 0, 0],
        }
    }

    /// Raw controller operation
    pub fn custom(op: u32, arg1: u32, arg2: u32) -> Self {
        Self {
            kind: CommandKind::Custom,
            args: [op, arg1, arg2],
        }
    }

    /// Controller operation code carried by [`Command::settle`]
    pub const OP_SETTLE: u32 = 0x09;
}

/// Fixed-capacity queue of pending drive commands
///
/// # Example
///
/// ```
/// use cdstream::core::queue::{Command, CommandQueue};
///
/// let mut queue = CommandQueue::new();
/// queue.append(Command::seek(100)).unwrap();
/// queue.append(Command::seek(200)).unwrap();
///
/// // The second seek superseded the first.
/// assert_eq!(queue.len(), 1);
/// assert_eq!(queue.pop_front().unwrap().args[0], 200);
/// ```
pub struct CommandQueue {
    slots: [Command; Self::CAPACITY],
    len: usize,
}

impl CommandQueue {
    /// Maximum number of live commands
    pub const CAPACITY: usize = 16;

    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            slots: [Command::custom(0, 0, 0); Self::CAPACITY],
            len: 0,
        }
    }

    /// Append a command, coalescing superseded entries of the same kind
    ///
    /// For coalescible kinds, any pending command of the same kind is
    /// removed first (later entries shift down one slot, preserving their
    /// relative order) and the new command goes to the tail. Non-coalescible
    /// kinds always append.
    ///
    /// # Errors
    ///
    /// [`StreamError::QueueFull`] when the queue is at capacity. The queue
    /// is left unchanged; nothing is overwritten.
    pub fn append(&mut self, cmd: Command) -> Result<()> {
        if cmd.kind.coalesces() {
            if let Some(pos) = self.slots[..self.len].iter().position(|c| c.kind == cmd.kind) {
                log::trace!("queue: coalescing {:?} at slot {}", cmd.kind, pos);
                self.slots.copy_within(pos + 1..self.len, pos);
                self.len -= 1;
            }
        }

        if self.len == Self::CAPACITY {
            log::warn!("queue: full, rejecting {:?}", cmd.kind);
            return Err(StreamError::QueueFull {
                capacity: Self::CAPACITY,
            });
        }

        self.slots[self.len] = cmd;
        self.len += 1;
        log::trace!("queue: appended {:?}, depth {}", cmd.kind, self.len);
        Ok(())
    }

    /// Remove and return the head command, compacting the remainder
    pub fn pop_front(&mut self) -> Option<Command> {
        if self.len == 0 {
            return None;
        }
        let head = self.slots[0];
        self.slots.copy_within(1..self.len, 0);
        self.len -= 1;
        Some(head)
    }

    /// The head command without removing it
    pub fn peek_front(&self) -> Option<&Command> {
        if self.len == 0 {
            None
        } else {
            Some(&self.slots[0])
        }
    }

    /// Whether the queue holds no commands
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of pending commands
    pub fn len(&self) -> usize {
        self.len
    }

    /// Free slots remaining
    pub fn remaining_capacity(&self) -> usize {
        Self::CAPACITY - self.len
    }

    /// Drop all pending commands
    pub fn clear(&mut self) {
        self.len = 0;
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_append_pop_roundtrip() {
        let mut queue = CommandQueue::new();
        queue.append(Command::read(1)).unwrap();
        assert_eq!(queue.len(), 1);
        let cmd = queue.pop_front().unwrap();
        assert_eq!(cmd.kind, CommandKind::Read);
        assert!(queue.is_empty());
        assert!(queue.pop_front().is_none());
    }

    #[test]
    fn test_seek_coalesces_to_single_entry() {
        let mut queue = CommandQueue::new();
        queue.append(Command::seek(0xA)).unwrap();
        queue.append(Command::seek(0xB)).unwrap();

        assert_eq!(queue.len(), 1);
        let cmd = queue.pop_front().unwrap();
        assert_eq!(cmd.kind, CommandKind::Seek);
        assert_eq!(cmd.args[0], 0xB);
    }

    #[test]
    fn test_coalescing_preserves_other_kinds_order() {
        let mut queue = CommandQueue::new();
        queue.append(Command::seek(0xA)).unwrap();
        queue.append(Command::read(1)).unwrap();
        queue.append(Command::seek(0xB)).unwrap();

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop_front().unwrap().kind, CommandKind::Read);
        let seek = queue.pop_front().unwrap();
        assert_eq!(seek.kind, CommandKind::Seek);
        assert_eq!(seek.args[0], 0xB);
    }

    #[test]
    fn test_fifo_order_for_non_coalesced_kinds() {
        let mut queue = CommandQueue::new();
        queue.append(Command::read(1)).unwrap();
        queue.append(Command::set_mode(2)).unwrap();
        queue.append(Command::read(3)).unwrap();

        let first = queue.pop_front().unwrap();
        assert_eq!((first.kind, first.args[0]), (CommandKind::Read, 1));
        let second = queue.pop_front().unwrap();
        assert_eq!((second.kind, second.args[0]), (CommandKind::SetMode, 2));
        let third = queue.pop_front().unwrap();
        assert_eq!((third.kind, third.args[0]), (CommandKind::Read, 3));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_full_queue_rejects_without_overwrite() {
        let mut queue = CommandQueue::new();
        for i in 0..CommandQueue::CAPACITY {
            queue.append(Command::read(i as u32)).unwrap();
        }
        let err = queue.append(Command::read(99)).unwrap_err();
        assert!(matches!(err, StreamError::QueueFull { capacity: 16 }));

        // Existing contents untouched.
        assert_eq!(queue.len(), CommandQueue::CAPACITY);
        assert_eq!(queue.pop_front().unwrap().args[0], 0);
    }

    #[test]
    fn test_coalescing_frees_a_slot_at_capacity() {
        let mut queue = CommandQueue::new();
        queue.append(Command::seek(1)).unwrap();
        for i in 0..CommandQueue::CAPACITY - 1 {
            queue.append(Command::read(i as u32)).unwrap();
        }
        // Queue is full, but the pending seek is superseded in place.
        queue.append(Command::seek(2)).unwrap();
        assert_eq!(queue.len(), CommandQueue::CAPACITY);
    }

    #[test]
    fn test_clear_empties_queue() {
        let mut queue = CommandQueue::new();
        queue.append(Command::read(1)).unwrap();
        queue.clear();
        assert!(queue.is_empty());
    }

    proptest! {
        /// Reads drain in exactly the order they were appended, no matter
        /// how many seeks are interleaved.
        #[test]
        fn prop_reads_keep_fifo_order(ops in prop::collection::vec(0u32..3, 0..14)) {
            let mut queue = CommandQueue::new();
            let mut expected = Vec::new();
            for (i, op) in ops.iter().enumerate() {
                match op {
                    0 => {
                        queue.append(Command::read(i as u32)).unwrap();
                        expected.push(i as u32);
                    }
                    1 => queue.append(Command::seek(i as u32)).unwrap(),
                    _ => queue.append(Command::set_mode(i as u32)).unwrap(),
                }
            }

            let mut drained = Vec::new();
            while let Some(cmd) = queue.pop_front() {
                if cmd.kind == CommandKind::Read {
                    drained.push(cmd.args[0]);
                }
            }
            prop_assert_eq!(drained, expected);
        }

        /// At most one pending command per coalescible kind.
        #[test]
        fn prop_at_most_one_pending_seek(targets in prop::collection::vec(any::<u32>(), 1..32)) {
            let mut queue = CommandQueue::new();
            for t in &targets {
                queue.append(Command::seek(*t)).unwrap();
            }
            prop_assert_eq!(queue.len(), 1);
            prop_assert_eq!(queue.pop_front().unwrap().args[0], *targets.last().unwrap());
        }
    }
}
