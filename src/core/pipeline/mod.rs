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

//! Tick-driven read pipeline
//!
//! One state machine sequences every transfer from the medium:
//!
//! ```text
//! Idle -> AwaitReady -> IssueTransfer -> PollTimer -> VerifyPosition
//!                            ^               ^  |          |
//!                            |               |  +----------+ (stall)
//!                            +---------------+--- more sectors
//!                                            |
//!                          VerifyPosition ---+--> Idle (done) / Fault
//! ```
//!
//! The machine is parametrized by a [`TransferProfile`] (drive mode word,
//! poll-window length, and the status bits to raise on window expiry or
//! position mismatch), so the data, bulk and direct transfer paths are
//! three configurations of the same type rather than three copies of the
//! logic.
//!
//! State is owned exclusively by [`ReadPipeline`] and mutated only inside
//! [`ReadPipeline::advance`], one step per tick. `Fault` is terminal until
//! an external reset; the bounded retries inside the drive controller
//! operate beneath this machine and never change its state themselves.

use super::buffer::{SectorBuffer, SECTOR_SIZE};
use super::drive::{DriveController, Msf, StatusFlags, HEADER_LEN};
use super::error::{Result, StreamError};
use super::fader::AudioFader;
use super::layout::ResourceLocator;
use super::queue::{Command, CommandQueue};

/// Everything the pipeline touches during one tick
///
/// Borrowed fresh from the owning dispatcher each call; the pipeline
/// itself holds no references between ticks.
pub struct TickContext<'a> {
    pub queue: &'a mut CommandQueue,
    pub drive: &'a mut DriveController,
    pub buffer: &'a mut SectorBuffer,
    pub fader: &'a mut AudioFader,
    pub locator: &'a ResourceLocator,
}

/// Pipeline states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No transfer in progress
    Idle,
    /// Waiting for the drive to come up before issuing
    AwaitReady,
    /// Building and queueing the seek/read commands
    IssueTransfer,
    /// Counting ticks until the transfer window elapses
    PollTimer,
    /// Checking the arrived sector against the expected position
    VerifyPosition,
    /// Terminal until an external reset
    Fault,
}

/// Constant bundle configuring one transfer path
#[derive(Debug, Clone, Copy)]
pub struct TransferProfile {
    /// Drive mode word applied before the transfer
    pub target_mode: u32,
    /// Poll-window length in ticks
    pub timer_threshold: u32,
    /// Status bits raised when the window elapses
    pub success_mask: StatusFlags,
    /// Status bits raised on position mismatch
    pub failure_mask: StatusFlags,
}

impl TransferProfile {
    /// Default poll-window length in ticks
    pub const DEFAULT_TIMER_THRESHOLD: u32 = 150;

    /// Streaming data reads
    pub fn data() -> Self {
        Self {
            target_mode: 0xA0,
            timer_threshold: Self::DEFAULT_TIMER_THRESHOLD,
            success_mask: StatusFlags::TIMER_ELAPSED,
            failure_mask: StatusFlags::POSITION_MISMATCH,
        }
    }

    /// Bulk reads with audio masking
    pub fn bulk() -> Self {
        Self {
            target_mode: 0xC8,
            timer_threshold: Self::DEFAULT_TIMER_THRESHOLD,
            success_mask: StatusFlags::BULK_TIMER_ELAPSED,
            failure_mask: StatusFlags::POSITION_MISMATCH,
        }
    }

    /// Direct single-resource reads
    pub fn direct() -> Self {
        Self {
            target_mode: 0x16,
            timer_threshold: Self::DEFAULT_TIMER_THRESHOLD,
            success_mask: StatusFlags::TIMER_ELAPSED,
            failure_mask: StatusFlags::POSITION_MISMATCH,
        }
    }

    /// Override the poll-window length
    pub fn with_threshold(mut self, ticks: u32) -> Self {
        self.timer_threshold = ticks.max(1);
        self
    }
}

/// What a tick produced, beyond internal state movement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineEvent {
    /// A verified sector landed in the buffer
    SectorReady {
        /// Slot index holding the payload
        slot: usize,
        /// Disc sector the payload came from
        sector_index: u32,
        /// Whether this was the final sector of the transfer
        last: bool,
    },
    /// The pipeline entered the terminal fault state
    Faulted,
}

/// Sector span of the in-flight transfer
struct Span {
    start_sector: u32,
    sectors_total: u32,
    sectors_done: u32,
}

/// The tick-driven transfer state machine
pub struct ReadPipeline {
    state: PipelineState,
    profile: TransferProfile,
    request_id: Option<u32>,
    span: Option<Span>,
    ticks: u32,
    fault: Option<StreamError>,
}

impl ReadPipeline {
    /// Create an idle pipeline with the data profile armed
    pub fn new() -> Self {
        Self {
            state: PipelineState::Idle,
            profile: TransferProfile::data(),
            request_id: None,
            span: None,
            ticks: 0,
            fault: None,
        }
    }

    /// Current state
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Cause of the current fault, if the pipeline is faulted
    pub fn fault(&self) -> Option<&StreamError> {
        self.fault.as_ref()
    }

    /// Arm the pipeline for a new resource transfer
    ///
    /// Captures the profile and moves `Idle -> AwaitReady`.
    ///
    /// # Errors
    ///
    /// [`StreamError::DriveNotReady`] if a transfer is already in flight
    /// or the pipeline is faulted.
    pub fn begin(&mut self, resource_id: u32, profile: TransferProfile) -> Result<()> {
        if self.state != PipelineState::Idle {
            return Err(StreamError::DriveNotReady);
        }
        self.profile = profile;
        self.request_id = Some(resource_id);
        self.span = None;
        self.ticks = 0;
        self.state = PipelineState::AwaitReady;
        log::debug!(
            "pipeline: request 0x{:08X}, mode 0x{:02X}",
            resource_id,
            profile.target_mode
        );
        Ok(())
    }

    /// Return to `Idle`, dropping any in-flight transfer
    ///
    /// The only way out of `Fault`.
    pub fn reset(&mut self) {
        self.state = PipelineState::Idle;
        self.request_id = None;
        self.span = None;
        self.ticks = 0;
        self.fault = None;
    }

    /// Advance the machine by one tick
    ///
    /// Recoverable conditions (drive not ready, queue full, buffer
    /// backpressure, data not yet staged) keep or rewind the state and
    /// try again next tick; they never escape this call.
    pub fn advance(&mut self, ctx: &mut TickContext) -> Result<Option<PipelineEvent>> {
        match self.state {
            PipelineState::Idle | PipelineState::Fault => Ok(None),
            PipelineState::AwaitReady => self.await_ready(ctx),
            PipelineState::IssueTransfer => self.issue_transfer(ctx),
            PipelineState::PollTimer => Ok(self.poll_timer(ctx)),
            PipelineState::VerifyPosition => self.verify_position(ctx),
        }
    }

    fn await_ready(&mut self, ctx: &mut TickContext) -> Result<Option<PipelineEvent>> {
        if !ctx.drive.status().ready {
            if let Err(e) = ctx.drive.init_sequence(ctx.fader) {
                return Ok(Some(self.escalate(ctx, e)));
            }
            return Ok(None);
        }
        if let Err(e) = ctx
            .drive
            .issue_blocking(Command::set_mode(self.profile.target_mode))
        {
            return Ok(Some(self.escalate(ctx, e)));
        }
        self.state = PipelineState::IssueTransfer;
        Ok(None)
    }

    fn issue_transfer(&mut self, ctx: &mut TickContext) -> Result<Option<PipelineEvent>> {
        if self.span.is_none() {
            let id = self.request_id.ok_or(StreamError::DriveNotReady)?;
            let desc = ctx.locator.resolve(id)?;
            let entry = ctx.locator.entry(desc.physical_address)?;
            let sectors_total = entry.byte_len.div_ceil(SECTOR_SIZE as u32).max(1);
            ctx.drive.set_expected(entry.start_sector);
            self.span = Some(Span {
                start_sector: entry.start_sector,
                sectors_total,
                sectors_done: 0,
            });
            log::debug!(
                "pipeline: transfer of {} sectors from {}",
                sectors_total,
                entry.start_sector
            );
        }

        let span = self.span.as_ref().expect("span just ensured");
        let fresh = span.sectors_done == 0;
        let needed = if fresh { 2 } else { 1 };
        if ctx.queue.remaining_capacity() < needed {
            log::debug!("pipeline: queue full, deferring issue");
            return Ok(None);
        }

        if fresh {
            ctx.fader.fade_out();
            ctx.queue.append(Command::seek(span.start_sector))?;
        }
        ctx.queue.append(Command::read(1))?;
        self.ticks = 0;
        ctx.drive.clear_accept();
        self.state = PipelineState::PollTimer;
        Ok(None)
    }

    fn poll_timer(&mut self, ctx: &mut TickContext) -> Option<PipelineEvent> {
        if ctx.drive.status().last_command_accepted {
            ctx.drive.clear_accept();
            self.state = PipelineState::VerifyPosition;
            return None;
        }
        self.ticks += 1;
        if self.ticks == self.profile.timer_threshold {
            ctx.drive.raise(self.profile.success_mask);
            log::debug!("pipeline: poll window elapsed at tick {}", self.ticks);
        }
        if self.ticks >= self.profile.timer_threshold {
            self.state = PipelineState::VerifyPosition;
        }
        None
    }

    fn verify_position(&mut self, ctx: &mut TickContext) -> Result<Option<PipelineEvent>> {
        // Check buffer room before draining anything from the port, so a
        // stall leaves the sector intact on the drive side.
        if !ctx.buffer.next_free() {
            ctx.drive.raise(StatusFlags::SLOT_OCCUPIED);
            log::warn!("pipeline: sector ring full, stalling");
            self.state = PipelineState::PollTimer;
            return Ok(None);
        }

        let mut header = [0u8; HEADER_LEN];
        if !ctx.drive.read_sector(&mut header) {
            // Sector not staged yet; keep polling.
            self.state = PipelineState::PollTimer;
            return Ok(None);
        }

        let reported = Msf::from_sector_header(&header).to_lba();
        let expected = ctx.drive.status().expected_sector;
        if reported < 0 || reported as u32 != expected {
            ctx.drive.raise(self.profile.failure_mask);
            let err = StreamError::SeekPositionMismatch {
                expected,
                reported: reported.max(0) as u32,
            };
            log::error!("pipeline: {}", err);
            self.fault = Some(err);
            self.state = PipelineState::Fault;
            return Ok(Some(PipelineEvent::Faulted));
        }

        let mut payload = [0u8; SECTOR_SIZE];
        if !ctx.drive.read_sector(&mut payload) {
            self.state = PipelineState::PollTimer;
            return Ok(None);
        }

        let slot = match ctx.buffer.write_next(expected, &payload) {
            Ok(slot) => slot,
            Err(StreamError::BackpressureStall { .. }) => {
                ctx.drive.raise(StatusFlags::SLOT_OCCUPIED);
                self.state = PipelineState::PollTimer;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        ctx.drive.advance_expected();
        let span = self.span.as_mut().expect("span present while verifying");
        span.sectors_done += 1;
        let last = span.sectors_done >= span.sectors_total;
        if last {
            ctx.fader.fade_in();
            self.request_id = None;
            self.span = None;
            self.ticks = 0;
            self.state = PipelineState::Idle;
            log::debug!("pipeline: transfer complete");
        } else {
            self.state = PipelineState::IssueTransfer;
        }
        Ok(Some(PipelineEvent::SectorReady {
            slot,
            sector_index: expected,
            last,
        }))
    }

    /// Escalate an exhausted retry budget to the terminal fault state
    fn escalate(&mut self, ctx: &mut TickContext, err: StreamError) -> PipelineEvent {
        ctx.drive.raise(StatusFlags::SYNC_FAILED);
        log::error!("pipeline: {}", err);
        self.fault = Some(err);
        self.state = PipelineState::Fault;
        PipelineEvent::Faulted
    }
}

impl Default for ReadPipeline {
    fn default() -> Self {
        Self::new()
    }
}
