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

//! Error types for the disc streaming subsystem
//!
//! All fallible operations in this crate return [`Result<T>`], an alias for
//! `Result<T, StreamError>`.
//!
//! Recoverable conditions ([`StreamError::DriveNotReady`],
//! [`StreamError::QueueFull`], [`StreamError::BackpressureStall`]) are
//! handled internally by retrying on a later tick and never escape
//! `Streamer::tick()`. Programmer errors
//! ([`StreamError::InvalidResourceId`],
//! [`StreamError::UnknownResourceKind`]) fail the originating call
//! immediately.

use thiserror::Error;

/// Errors produced by the disc streaming subsystem
#[derive(Debug, Error)]
pub enum StreamError {
    /// The drive has not reported ready for a new operation
    #[error("drive not ready")]
    DriveNotReady,

    /// The drive returned a sector other than the one expected
    #[error("seek position mismatch: expected sector {expected}, drive reported {reported}")]
    SeekPositionMismatch { expected: u32, reported: u32 },

    /// The command queue is at capacity
    #[error("command queue full ({capacity} slots)")]
    QueueFull { capacity: usize },

    /// The target sector slot has not been consumed yet
    #[error("sector buffer backpressure: slot {slot} still occupied")]
    BackpressureStall { slot: usize },

    /// A resource id addressed a region or entry outside the segment tables
    #[error("invalid resource id 0x{id:08X}")]
    InvalidResourceId { id: u32 },

    /// A resource kind tag did not name one of the known kinds
    #[error("unknown resource kind tag {tag}")]
    UnknownResourceKind { tag: u32 },

    /// The drive kept rejecting a command past the retry budget
    #[error("hardware rejected command after {attempts} attempts (result 0x{code:02X})")]
    HardwareRejected { attempts: u32, code: u8 },

    /// A segment layout failed to parse or validate
    #[error("layout error: {0}")]
    LayoutError(String),

    /// A configuration file failed to parse
    #[error("config error: {0}")]
    ConfigError(String),

    /// Underlying I/O failure from a disc image backend
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for streaming operations
pub type Result<T> = std::result::Result<T, StreamError>;
