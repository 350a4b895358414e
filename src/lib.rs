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

//! cdstream: optical disc streaming for PSX-style games
//!
//! This crate implements the disc streaming subsystem of a tick-driven
//! game: resolving logical resource ids to physical disc addresses,
//! queueing and coalescing drive commands, buffering incoming sectors,
//! and fading the audio channel so seeks stay inaudible. The outer game
//! loop calls one entry point per frame and reads status snapshots.
//!
//! # Architecture
//!
//! - [`core::layout`]: resource id resolution through the segment tables
//! - [`core::queue`]: pending drive commands with coalescing
//! - [`core::drive`]: drive controller and hardware abstraction
//! - [`core::buffer`]: decoded sector ring
//! - [`core::fader`]: seek-masking mixer fades
//! - [`core::pipeline`]: the tick-driven transfer state machine
//! - [`core::system`]: the [`core::system::Streamer`] dispatcher
//!
//! # Getting Started
//!
//! 1. Load a [`core::layout::SegmentLayout`] and open a drive port
//! 2. Create a [`core::system::Streamer`]
//! 3. Call `tick()` once per frame and collect finished resources
//!
//! # Error Handling
//!
//! All fallible operations return [`core::error::Result<T>`], an alias
//! for `Result<T, StreamError>`.

pub mod core;

// Re-export commonly used types
pub use core::error::{Result, StreamError};
