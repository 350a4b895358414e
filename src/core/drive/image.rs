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

//! File-backed drive port
//!
//! [`FileDisc`] serves sectors out of a flat disc image on the host
//! filesystem, presenting the same [`DrivePort`] surface as real
//! hardware: seeks move the head, reads stage one raw sector (header
//! plus payload), and accepted commands fire the registered completion
//! callback. Used by the CLI and by integration tests.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::core::buffer::SECTOR_SIZE;
use crate::core::error::Result;
use crate::core::queue::{Command, CommandKind};

use super::msf::{Msf, HEADER_LEN};
use super::port::{DrivePort, ReadyCallback, SyncCallback};
use super::{RESULT_COMPLETE, RESULT_REJECTED};

/// Drive port reading sectors from a flat image file
pub struct FileDisc {
    file: File,
    head: u32,
    total_sectors: u32,
    mode: u8,
    raw: Vec<u8>,
    offset: usize,
    sync_cb: Option<SyncCallback>,
    ready_cb: Option<ReadyCallback>,
}

impl FileDisc {
    /// Open a disc image
    ///
    /// The file is treated as a flat run of 2048-byte sectors; a partial
    /// trailing sector is padded with zeroes when read.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        let len = file.metadata()?.len();
        let total_sectors = len.div_ceil(SECTOR_SIZE as u64) as u32;
        log::info!(
            "disc image: {} ({} sectors)",
            path.as_ref().display(),
            total_sectors
        );
        Ok(Self {
            file,
            head: 0,
            total_sectors,
            mode: 0,
            raw: Vec::new(),
            offset: 0,
            sync_cb: None,
            ready_cb: None,
        })
    }

    /// Number of sectors in the image
    pub fn total_sectors(&self) -> u32 {
        self.total_sectors
    }

    fn load_sector(&mut self) -> std::io::Result<()> {
        self.file
            .seek(SeekFrom::Start(self.head as u64 * SECTOR_SIZE as u64))?;
        self.raw = vec![0u8; HEADER_LEN + SECTOR_SIZE];

        let mut header = [0u8; HEADER_LEN];
        Msf::from_lba(self.head as i32).write_sector_header(&mut header, self.mode);
        self.raw[..HEADER_LEN].copy_from_slice(&header);

        // Partial tail sectors stay zero-padded.
        let mut filled = 0;
        while filled < SECTOR_SIZE {
            let n = self.file.read(&mut self.raw[HEADER_LEN + filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        self.offset = 0;
        Ok(())
    }

    fn apply(&mut self, cmd: &Command) -> bool {
        match cmd.kind {
            CommandKind::Seek => {
                if cmd.args[0] >= self.total_sectors {
                    log::warn!("disc image: seek past end ({})", cmd.args[0]);
                    return false;
                }
                self.head = cmd.args[0];
                self.raw.clear();
                self.offset = 0;
                true
            }
            CommandKind::Read => {
                if self.head >= self.total_sectors {
                    log::warn!("disc image: read past end ({})", self.head);
                    return false;
                }
                if let Err(e) = self.load_sector() {
                    log::error!("disc image: sector {} read failed: {}", self.head, e);
                    return false;
                }
                self.head += 1;
                if let Some(cb) = &self.ready_cb {
                    cb(1);
                }
                true
            }
            CommandKind::SetMode => {
                self.mode = (cmd.args[0] & 0xFF) as u8;
                true
            }
            CommandKind::Custom => {
                // Settle: stop staging data.
                self.raw.clear();
                self.offset = 0;
                true
            }
        }
    }
}

impl DrivePort for FileDisc {
    fn init(&mut self) -> bool {
        true
    }

    fn reset(&mut self) -> bool {
        self.head = 0;
        self.raw.clear();
        self.offset = 0;
        true
    }

    fn sync(&mut self) -> bool {
        // File-backed reads settle immediately.
        true
    }

    fn control_sync(&mut self, cmd: &Command) -> bool {
        let accepted = self.apply(cmd);
        if let Some(cb) = &self.sync_cb {
            cb(if accepted {
                RESULT_COMPLETE
            } else {
                RESULT_REJECTED
            });
        }
        accepted
    }

    fn control_blocking(&mut self, cmd: &Command) -> bool {
        self.apply(cmd)
    }

    fn read_sector(&mut self, dst: &mut [u8]) -> bool {
        if self.offset + dst.len() > self.raw.len() {
            return false;
        }
        dst.copy_from_slice(&self.raw[self.offset..self.offset + dst.len()]);
        self.offset += dst.len();
        true
    }

    fn register_sync_callback(&mut self, callback: Option<SyncCallback>) {
        self.sync_cb = callback;
    }

    fn register_ready_callback(&mut self, callback: Option<ReadyCallback>) {
        self.ready_cb = callback;
    }
}
