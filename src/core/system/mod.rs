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

//! Streaming dispatcher
//!
//! [`Streamer`] ties the subsystem together: it owns the locator, the
//! command queue, the drive controller, the sector buffer, the fader and
//! the read pipeline, and exposes the surface the outer game loop sees:
//!
//! - [`Streamer::tick`]: call once per frame
//! - [`Streamer::request_resource`]: start streaming a resource
//! - [`Streamer::query_status`]: read-only drive status snapshot
//! - [`Streamer::take_finished`]: collect completed resources
//! - [`Streamer::reset`]: recover from a fault
//!
//! Each tick drains the hardware completion cell, advances the pipeline
//! one state step, issues at most one queued command to the drive, and
//! routes verified sectors to the completion handler for the resource's
//! kind. The handler set is closed: [`ResourceKind`] has exactly three
//! variants, and unknown kind tags are rejected when the request is made
//! rather than dispatched blind.

use std::collections::VecDeque;

use super::buffer::{SectorBuffer, SECTOR_SIZE};
use super::config::StreamConfig;
use super::drive::{DriveController, DrivePort, DriveStatus, StatusFlags};
use super::error::{Result, StreamError};
use super::fader::{AudioFader, Mixer};
use super::layout::ResourceLocator;
use super::pipeline::{PipelineEvent, PipelineState, ReadPipeline, TickContext, TransferProfile};
use super::queue::CommandQueue;

/// The closed set of resource kinds with completion handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Texture pages, sprite sheets, tile data
    Graphics,
    /// Streamed music and sound banks
    Audio,
    /// Level layouts, scripts, entity tables
    GameData,
}

impl ResourceKind {
    /// Map a raw kind tag from the displacement table
    ///
    /// # Errors
    ///
    /// [`StreamError::UnknownResourceKind`] for tags outside the known
    /// set; never dispatched through blind.
    pub fn from_tag(tag: u32) -> Result<Self> {
        match tag {
            0 => Ok(ResourceKind::Graphics),
            1 => Ok(ResourceKind::Audio),
            2 => Ok(ResourceKind::GameData),
            _ => Err(StreamError::UnknownResourceKind { tag }),
        }
    }

    /// The raw tag for this kind
    pub fn tag(self) -> u32 {
        match self {
            ResourceKind::Graphics => 0,
            ResourceKind::Audio => 1,
            ResourceKind::GameData => 2,
        }
    }
}

/// A fully streamed and reassembled resource
#[derive(Debug)]
pub struct LoadedResource {
    pub id: u32,
    pub kind: ResourceKind,
    pub data: Vec<u8>,
}

/// The resource currently being assembled
struct ActiveRequest {
    id: u32,
    kind: ResourceKind,
    byte_len: u32,
    assembled: Vec<u8>,
}

/// Per-frame entry point of the disc streaming subsystem
///
/// # Example
///
/// ```no_run
/// use cdstream::core::config::StreamConfig;
/// use cdstream::core::drive::FileDisc;
/// use cdstream::core::fader::NoopMixer;
/// use cdstream::core::layout::ResourceLocator;
/// use cdstream::core::system::{ResourceKind, Streamer};
///
/// let locator = ResourceLocator::load("layout.toml")?;
/// let disc = FileDisc::open("game.img")?;
/// let mut streamer = Streamer::new(
///     locator,
///     Box::new(disc),
///     Box::new(NoopMixer),
///     StreamConfig::default(),
/// );
///
/// streamer.request_resource(0x0000_0000, ResourceKind::GameData)?;
/// loop {
///     streamer.tick()?;
///     if let Some(resource) = streamer.take_finished() {
///         println!("loaded {} bytes", resource.data.len());
///         break;
///     }
/// }
/// # Ok::<(), cdstream::StreamError>(())
/// ```
pub struct Streamer {
    config: StreamConfig,
    locator: ResourceLocator,
    queue: CommandQueue,
    drive: DriveController,
    buffer: SectorBuffer,
    fader: AudioFader,
    pipeline: ReadPipeline,
    active: Option<ActiveRequest>,
    finished: VecDeque<LoadedResource>,
    graphics_dirty: bool,
}

impl Streamer {
    /// Assemble the subsystem over a drive port and a mixer
    pub fn new(
        locator: ResourceLocator,
        port: Box<dyn DrivePort>,
        mixer: Box<dyn Mixer>,
        config: StreamConfig,
    ) -> Self {
        let drive = DriveController::new(port, &config);
        let fader = AudioFader::new(mixer, &config);
        Self {
            locator,
            queue: CommandQueue::new(),
            drive,
            buffer: SectorBuffer::new(),
            fader,
            pipeline: ReadPipeline::new(),
            active: None,
            finished: VecDeque::new(),
            graphics_dirty: false,
            config,
        }
    }

    /// Advance the subsystem by one frame
    ///
    /// Drains the completion cell, advances the pipeline one state step,
    /// issues at most one queued command, and invokes the completion
    /// handler for any verified sector. Recoverable conditions are
    /// absorbed internally; a pipeline fault is visible through
    /// [`Streamer::query_status`] and [`Streamer::pipeline_fault`].
    pub fn tick(&mut self) -> Result<()> {
        self.drive.poll_completion();

        let event = self.pipeline.advance(&mut TickContext {
            queue: &mut self.queue,
            drive: &mut self.drive,
            buffer: &mut self.buffer,
            fader: &mut self.fader,
            locator: &self.locator,
        })?;

        self.drive.dispatch_pending(&mut self.queue);

        match event {
            Some(PipelineEvent::SectorReady { slot, last, .. }) => self.complete_sector(slot, last),
            Some(PipelineEvent::Faulted) => {
                log::error!(
                    "streamer: pipeline faulted: {}",
                    self.pipeline
                        .fault()
                        .map(|e| e.to_string())
                        .unwrap_or_default()
                );
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Start streaming a resource
    ///
    /// Resolves the id, validates the kind tag from the displacement
    /// table, and arms the pipeline. A declared kind that disagrees with
    /// the table raises [`StatusFlags::KIND_MISMATCH`] but the transfer
    /// proceeds under the declared kind.
    ///
    /// # Errors
    ///
    /// - [`StreamError::InvalidResourceId`] for ids outside the layout
    /// - [`StreamError::UnknownResourceKind`] for tags outside the set
    /// - [`StreamError::DriveNotReady`] when a transfer is already in
    ///   flight or the pipeline is faulted
    pub fn request_resource(&mut self, id: u32, kind: ResourceKind) -> Result<()> {
        let desc = self.locator.resolve(id)?;
        let entry = self.locator.entry(desc.physical_address)?;
        let table_kind = ResourceKind::from_tag(entry.kind_tag)?;
        if table_kind != kind {
            log::warn!(
                "resource 0x{:08X}: declared {:?}, table says {:?}",
                id,
                kind,
                table_kind
            );
            self.drive.raise(StatusFlags::KIND_MISMATCH);
        }

        self.pipeline.begin(id, self.profile_for(kind))?;
        self.active = Some(ActiveRequest {
            id,
            kind,
            byte_len: entry.byte_len,
            assembled: Vec::with_capacity(entry.byte_len as usize),
        });
        log::info!(
            "streamer: request 0x{:08X} ({:?}, {} bytes)",
            id,
            kind,
            entry.byte_len
        );
        Ok(())
    }

    /// Read-only drive status snapshot for the outer loop
    pub fn query_status(&self) -> DriveStatus {
        self.drive.status()
    }

    /// Current pipeline state
    pub fn pipeline_state(&self) -> PipelineState {
        self.pipeline.state()
    }

    /// Cause of the current pipeline fault, if any
    pub fn pipeline_fault(&self) -> Option<&StreamError> {
        self.pipeline.fault()
    }

    /// Pop the next completed resource, oldest first
    pub fn take_finished(&mut self) -> Option<LoadedResource> {
        self.finished.pop_front()
    }

    /// Whether a graphics resource completed since the last clear
    pub fn graphics_dirty(&self) -> bool {
        self.graphics_dirty
    }

    /// Acknowledge the graphics-upload flag
    pub fn clear_graphics_dirty(&mut self) {
        self.graphics_dirty = false;
    }

    /// Reset the drive and clear all transfer state
    ///
    /// The only way out of a pipeline fault. Clears the command queue,
    /// the sector buffer occupancy and the status flags; any half
    /// assembled resource is dropped.
    pub fn reset(&mut self) -> Result<()> {
        self.drive.reset_drive()?;
        self.queue.clear();
        self.buffer.clear();
        self.pipeline.reset();
        self.active = None;
        log::info!("streamer: reset");
        Ok(())
    }

    /// Tick until the command queue is empty
    ///
    /// Used at synchronization boundaries before tearing down backing
    /// storage. Bounded by the configured drain budget.
    pub fn drain_blocking(&mut self) -> Result<()> {
        for _ in 0..self.config.drain_budget {
            if self.queue.is_empty() {
                return Ok(());
            }
            self.tick()?;
        }
        Err(StreamError::HardwareRejected {
            attempts: self.config.drain_budget,
            code: self.drive.status().result_code,
        })
    }

    /// Transfer profile for a resource kind, threshold from config
    fn profile_for(&self, kind: ResourceKind) -> TransferProfile {
        let profile = match kind {
            ResourceKind::GameData => TransferProfile::data(),
            ResourceKind::Audio => TransferProfile::bulk(),
            ResourceKind::Graphics => TransferProfile::direct(),
        };
        profile.with_threshold(self.config.timer_threshold)
    }

    /// Fold a verified sector into the active resource
    fn complete_sector(&mut self, slot: usize, last: bool) -> Result<()> {
        let Self { buffer, active, .. } = self;
        let payload = buffer.consume(slot);
        let Some(request) = active.as_mut() else {
            log::warn!("streamer: sector completion with no active request");
            return Ok(());
        };

        let want = (request.byte_len as usize)
            .saturating_sub(request.assembled.len())
            .min(SECTOR_SIZE);
        request.assembled.extend_from_slice(&payload[..want]);

        if last {
            let done = self.active.take().expect("active request present");
            self.finish(done);
        }
        Ok(())
    }

    /// Route a completed resource to its kind's handler
    fn finish(&mut self, request: ActiveRequest) {
        let resource = LoadedResource {
            id: request.id,
            kind: request.kind,
            data: request.assembled,
        };
        match resource.kind {
            ResourceKind::Graphics => self.on_graphics_loaded(resource),
            ResourceKind::Audio => self.on_audio_loaded(resource),
            ResourceKind::GameData => self.on_game_data_loaded(resource),
        }
    }

    fn on_graphics_loaded(&mut self, resource: LoadedResource) {
        log::debug!(
            "streamer: graphics 0x{:08X} ready ({} bytes)",
            resource.id,
            resource.data.len()
        );
        self.graphics_dirty = true;
        self.finished.push_back(resource);
    }

    fn on_audio_loaded(&mut self, resource: LoadedResource) {
        log::debug!(
            "streamer: audio 0x{:08X} ready ({} bytes)",
            resource.id,
            resource.data.len()
        );
        // Make sure the seek fade has released the channel.
        self.fader.fade_in();
        self.finished.push_back(resource);
    }

    fn on_game_data_loaded(&mut self, resource: LoadedResource) {
        log::debug!(
            "streamer: game data 0x{:08X} ready ({} bytes)",
            resource.id,
            resource.data.len()
        );
        self.finished.push_back(resource);
    }
}
