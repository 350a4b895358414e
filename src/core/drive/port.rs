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

//! Drive hardware abstraction
//!
//! [`DrivePort`] is the boundary to the physical (or emulated) optical
//! drive unit. Everything above it (queueing, retry policy, position
//! verification) lives in the controller and pipeline; everything below
//! it is hardware.
//!
//! Callbacks registered here may fire from interrupt context, outside the
//! tick boundary. Their contract is strict: a callback receives one result
//! byte and must do nothing but record it (see
//! [`CompletionCell`](super::CompletionCell)). No queue, buffer, or
//! pipeline state may be touched from callback context.

use std::sync::Arc;

use crate::core::queue::Command;

/// Completion callback invoked with the drive's raw result code
pub type SyncCallback = Arc<dyn Fn(u8) + Send + Sync>;

/// Data-ready callback invoked with the drive's raw event code
pub type ReadyCallback = Arc<dyn Fn(u8) + Send + Sync>;

/// Low-level interface to the drive unit
pub trait DrivePort {
    /// Bring the unit up. Returns true once the unit responds.
    fn init(&mut self) -> bool;

    /// Hardware reset primitive. Returns true on success.
    fn reset(&mut self) -> bool;

    /// Poll whether the previously issued command has settled.
    fn sync(&mut self) -> bool;

    /// Issue a command without waiting for mechanical completion.
    /// Returns true when the controller accepted it.
    fn control_sync(&mut self, cmd: &Command) -> bool;

    /// Issue a command and wait for mechanical completion.
    /// Returns true when the controller accepted it.
    fn control_blocking(&mut self, cmd: &Command) -> bool;

    /// Drain raw bytes of the current sector into `dst`, header first.
    /// Successive calls continue where the previous one stopped. Returns
    /// false when no sector data is available.
    fn read_sector(&mut self, dst: &mut [u8]) -> bool;

    /// Register (or clear) the command completion callback.
    fn register_sync_callback(&mut self, callback: Option<SyncCallback>);

    /// Register (or clear) the data-ready callback.
    fn register_ready_callback(&mut self, callback: Option<ReadyCallback>);
}
