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

//! Drive controller
//!
//! Issues commands to the [`DrivePort`] hardware abstraction and owns the
//! subsystem's view of the drive: the [`DriveStatus`] snapshot and the
//! [`CompletionCell`] the hardware completion callback writes into.
//!
//! Two issue paths exist. The blocking path retries the sync primitive and
//! then the command itself under a bounded budget: transient busy states
//! on physical media are expected and absorbed here, but a wedged drive
//! surfaces [`StreamError::HardwareRejected`] instead of hanging the tick
//! loop. The async path goes through the [`CommandQueue`]; completion
//! arrives later via the sync callback and is interpreted on the next
//! tick by [`DriveController::poll_completion`], never in callback
//! context.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use bitflags::bitflags;

use super::config::StreamConfig;
use super::error::{Result, StreamError};
use super::fader::AudioFader;
use super::queue::{Command, CommandQueue};

mod image;
mod msf;
mod port;

#[cfg(test)]
pub(crate) mod testing;

pub use image::FileDisc;
pub use msf::{bcd_to_dec, dec_to_bcd, Msf, HEADER_LEN};
pub use port::{DrivePort, ReadyCallback, SyncCallback};

/// Raw result code reported by the drive for a settled command
pub const RESULT_COMPLETE: u8 = 0x02;

/// Raw result code recorded when the drive rejected a command
pub const RESULT_REJECTED: u8 = 0x80;

bitflags! {
    /// Status and error bits accumulated across a transfer
    ///
    /// One register on the original hardware mixed progress signals with
    /// error latches; the roles below are presumed from observed use and
    /// kept as constants rather than hard invariants.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StatusFlags: u32 {
        /// A sector arrived while its target slot was still occupied
        const SLOT_OCCUPIED = 0x01;
        /// The data-read poll window elapsed
        const TIMER_ELAPSED = 0x02;
        /// The controller refused a queued command
        const COMMAND_REJECTED = 0x04;
        /// A command completion came back unsuccessful
        const SYNC_FAILED = 0x08;
        /// The bulk-read poll window elapsed
        const BULK_TIMER_ELAPSED = 0x10;
        /// A resource's kind tag disagreed with the declared kind
        const KIND_MISMATCH = 0x20;
        /// The drive returned a sector other than the expected one
        const POSITION_MISMATCH = 0x40;
    }
}

/// Snapshot of the drive's state, single writer per tick
#[derive(Debug, Clone, Copy, Default)]
pub struct DriveStatus {
    /// The drive has settled and will accept transfer commands
    pub ready: bool,
    /// Accumulated status and error bits
    pub flags: StatusFlags,
    /// Sector index the next arriving sector must carry
    pub expected_sector: u32,
    /// A completion for the last async command has been observed
    pub last_command_accepted: bool,
    /// Raw result code of the most recent completion
    pub result_code: u8,
}

/// Async-safe handoff from the hardware completion callback to the tick
///
/// The callback's entire contract: store one result byte, set one flag.
/// The tick drains the cell exactly once per frame with
/// [`DriveController::poll_completion`]. Single writer, single reader,
/// never locked.
pub struct CompletionCell {
    code: AtomicU8,
    posted: AtomicBool,
}

impl CompletionCell {
    pub fn new() -> Self {
        Self {
            code: AtomicU8::new(0),
            posted: AtomicBool::new(false),
        }
    }

    /// Record a completion; callable from interrupt context
    pub fn post(&self, code: u8) {
        self.code.store(code, Ordering::Release);
        self.posted.store(true, Ordering::Release);
    }

    /// Take the pending completion, if any
    pub fn take(&self) -> Option<u8> {
        if self.posted.swap(false, Ordering::Acquire) {
            Some(self.code.load(Ordering::Acquire))
        } else {
            None
        }
    }
}

impl Default for CompletionCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Issues commands to the drive and tracks its status
pub struct DriveController {
    port: Box<dyn DrivePort>,
    completion: Arc<CompletionCell>,
    pub(crate) status: DriveStatus,
    retry_limit: u32,
    retry_backoff_us: u64,
}

impl DriveController {
    /// Create a controller over a drive port
    ///
    /// Brings the unit up under the retry budget and arms the completion
    /// callback. A unit that refuses to come up is left not-ready; the
    /// pipeline's init sequence keeps retrying from the tick loop.
    pub fn new(port: Box<dyn DrivePort>, config: &StreamConfig) -> Self {
        let mut controller = Self {
            port,
            completion: Arc::new(CompletionCell::new()),
            status: DriveStatus::default(),
            retry_limit: config.retry_limit.max(1),
            retry_backoff_us: config.retry_backoff_us,
        };
        for attempt in 0..controller.retry_limit {
            if controller.port.init() {
                break;
            }
            log::warn!("drive: init refused (attempt {})", attempt + 1);
            controller.backoff();
        }
        controller.arm_sync_callback();
        controller
    }

    /// Read-only status snapshot
    pub fn status(&self) -> DriveStatus {
        self.status
    }

    /// OR bits into the status flags
    pub(crate) fn raise(&mut self, flags: StatusFlags) {
        self.status.flags |= flags;
    }

    /// Arm the expected-position check for a fresh transfer
    pub(crate) fn set_expected(&mut self, sector: u32) {
        self.status.expected_sector = sector;
    }

    /// Advance the expected position after a verified sector
    pub(crate) fn advance_expected(&mut self) {
        self.status.expected_sector += 1;
    }

    /// Clear the completion-observed flag before a new async command
    pub(crate) fn clear_accept(&mut self) {
        self.status.last_command_accepted = false;
    }

    /// Drain the completion cell and interpret the result code
    ///
    /// Called once per tick, before the pipeline advances. A
    /// [`RESULT_COMPLETE`] code marks the drive ready; anything else
    /// latches [`StatusFlags::SYNC_FAILED`] and drops readiness.
    pub fn poll_completion(&mut self) {
        if let Some(code) = self.completion.take() {
            self.status.result_code = code;
            self.status.last_command_accepted = true;
            if code == RESULT_COMPLETE {
                self.status.ready = true;
            } else {
                self.status.ready = false;
                self.status.flags |= StatusFlags::SYNC_FAILED;
                log::warn!("drive: completion reported 0x{:02X}", code);
            }
        }
    }

    /// Issue a command and wait for the drive to accept it
    ///
    /// Retries the sync primitive until the previous command settles, then
    /// retries the command itself, both under the configured budget.
    ///
    /// # Errors
    ///
    /// [`StreamError::HardwareRejected`] once the budget is exhausted.
    pub fn issue_blocking(&mut self, cmd: Command) -> Result<()> {
        self.wait_sync()?;
        for attempt in 0..self.retry_limit {
            if self.port.control_blocking(&cmd) {
                log::trace!("drive: blocking {:?} accepted", cmd.kind);
                return Ok(());
            }
            log::trace!("drive: blocking {:?} busy (attempt {})", cmd.kind, attempt + 1);
            self.backoff();
        }
        self.status.result_code = RESULT_REJECTED;
        Err(StreamError::HardwareRejected {
            attempts: self.retry_limit,
            code: RESULT_REJECTED,
        })
    }

    /// Enqueue a command for asynchronous issue
    ///
    /// Returns immediately; the command reaches the hardware on a later
    /// [`DriveController::dispatch_pending`] and its completion arrives
    /// through the sync callback.
    pub fn issue_async(&mut self, cmd: Command, queue: &mut CommandQueue) -> Result<()> {
        queue.append(cmd)
    }

    /// Issue at most one queued command to the drive
    ///
    /// Skipped while the previous command is still in flight. A refused
    /// command stays at the head and is retried next tick with
    /// [`StatusFlags::COMMAND_REJECTED`] raised.
    pub fn dispatch_pending(&mut self, queue: &mut CommandQueue) {
        let Some(&cmd) = queue.peek_front() else {
            return;
        };
        if !self.port.sync() {
            return;
        }
        if self.port.control_sync(&cmd) {
            queue.pop_front();
            log::trace!("drive: dispatched {:?}, {} pending", cmd.kind, queue.len());
        } else {
            self.status.flags |= StatusFlags::COMMAND_REJECTED;
            log::debug!("drive: {:?} refused, retrying next tick", cmd.kind);
        }
    }

    /// Drain raw sector bytes from the port
    pub fn read_sector(&mut self, dst: &mut [u8]) -> bool {
        self.port.read_sector(dst)
    }

    /// Reset the drive unit under the retry budget
    ///
    /// On success clears the error mask and readiness; the queue, buffer
    /// and pipeline are cleared by the caller.
    pub fn reset_drive(&mut self) -> Result<()> {
        for attempt in 0..self.retry_limit {
            if self.port.reset() {
                self.status.flags = StatusFlags::empty();
                self.status.ready = false;
                self.status.last_command_accepted = false;
                self.status.result_code = 0;
                log::info!("drive: reset complete");
                return Ok(());
            }
            log::debug!("drive: reset refused (attempt {})", attempt + 1);
            self.backoff();
        }
        Err(StreamError::HardwareRejected {
            attempts: self.retry_limit,
            code: self.status.result_code,
        })
    }

    /// Run the ready-path setup sequence
    ///
    /// Fades the disc channel out, clears the data-ready callback, re-arms
    /// the completion callback, and issues a settle command. Readiness is
    /// established when the settle completion arrives on a later tick.
    pub fn init_sequence(&mut self, fader: &mut AudioFader) -> Result<()> {
        fader.fade_out();
        self.port.register_ready_callback(None);
        self.arm_sync_callback();
        self.send_now(Command::settle())
    }

    /// Issue a command through the non-blocking control path, retrying
    /// under the budget
    fn send_now(&mut self, cmd: Command) -> Result<()> {
        self.wait_sync()?;
        for _ in 0..self.retry_limit {
            if self.port.control_sync(&cmd) {
                return Ok(());
            }
            self.backoff();
        }
        self.status.result_code = RESULT_REJECTED;
        Err(StreamError::HardwareRejected {
            attempts: self.retry_limit,
            code: RESULT_REJECTED,
        })
    }

    /// Wait for the previous command to settle, bounded
    fn wait_sync(&mut self) -> Result<()> {
        for _ in 0..self.retry_limit {
            if self.port.sync() {
                return Ok(());
            }
            self.backoff();
        }
        Err(StreamError::HardwareRejected {
            attempts: self.retry_limit,
            code: self.status.result_code,
        })
    }

    fn backoff(&self) {
        if self.retry_backoff_us > 0 {
            std::thread::sleep(std::time::Duration::from_micros(self.retry_backoff_us));
        } else {
            std::thread::yield_now();
        }
    }

    fn arm_sync_callback(&mut self) {
        let cell = Arc::clone(&self.completion);
        self.port
            .register_sync_callback(Some(Arc::new(move |code| cell.post(code))));
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedPort;
    use super::*;

    fn controller(port: ScriptedPort) -> DriveController {
        let mut config = StreamConfig::default();
        config.retry_backoff_us = 0;
        config.retry_limit = 4;
        DriveController::new(Box::new(port), &config)
    }

    #[test]
    fn test_completion_cell_single_take() {
        let cell = CompletionCell::new();
        assert!(cell.take().is_none());
        cell.post(RESULT_COMPLETE);
        assert_eq!(cell.take(), Some(RESULT_COMPLETE));
        assert!(cell.take().is_none());
    }

    #[test]
    fn test_poll_completion_marks_ready() {
        let mut drive = controller(ScriptedPort::new(4));
        drive.issue_blocking(Command::settle()).unwrap();
        // ScriptedPort fires the callback synchronously on accept.
        drive.poll_completion();
        let status = drive.status();
        assert!(status.ready);
        assert!(status.last_command_accepted);
        assert_eq!(status.result_code, RESULT_COMPLETE);
        assert!(status.flags.is_empty());
    }

    #[test]
    fn test_poll_completion_failure_sets_sync_failed() {
        let mut port = ScriptedPort::new(4);
        port.result_code = 0x05;
        let mut drive = controller(port);
        drive.issue_blocking(Command::settle()).unwrap();
        drive.poll_completion();
        let status = drive.status();
        assert!(!status.ready);
        assert!(status.flags.contains(StatusFlags::SYNC_FAILED));
        assert_eq!(status.result_code, 0x05);
    }

    #[test]
    fn test_issue_blocking_bounded_rejection() {
        let mut port = ScriptedPort::new(4);
        port.accept_control = false;
        let mut drive = controller(port);
        let err = drive.issue_blocking(Command::seek(10)).unwrap_err();
        assert!(matches!(
            err,
            StreamError::HardwareRejected { attempts: 4, .. }
        ));
    }

    #[test]
    fn test_wait_sync_bounded() {
        let mut port = ScriptedPort::new(4);
        port.sync_ready = false;
        let mut drive = controller(port);
        let err = drive.issue_blocking(Command::seek(10)).unwrap_err();
        assert!(matches!(err, StreamError::HardwareRejected { .. }));
    }

    #[test]
    fn test_dispatch_pending_pops_on_accept() {
        let mut drive = controller(ScriptedPort::new(4));
        let mut queue = CommandQueue::new();
        queue.append(Command::seek(7)).unwrap();
        drive.dispatch_pending(&mut queue);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_dispatch_pending_keeps_refused_command() {
        let mut port = ScriptedPort::new(4);
        port.accept_control = false;
        let mut drive = controller(port);
        let mut queue = CommandQueue::new();
        queue.append(Command::seek(7)).unwrap();

        drive.dispatch_pending(&mut queue);
        assert_eq!(queue.len(), 1);
        assert!(drive.status().flags.contains(StatusFlags::COMMAND_REJECTED));
    }

    #[test]
    fn test_reset_drive_clears_flags() {
        let mut drive = controller(ScriptedPort::new(4));
        drive.raise(StatusFlags::POSITION_MISMATCH | StatusFlags::SYNC_FAILED);
        drive.reset_drive().unwrap();
        assert!(drive.status().flags.is_empty());
        assert!(!drive.status().ready);
    }
}
