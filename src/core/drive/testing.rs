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

//! Scriptable drive port for unit tests
//!
//! Behaves like a well-mannered drive by default: sync always settled,
//! every command accepted, completion callback fired synchronously on
//! accept. Individual behaviors can be scripted per test (refuse
//! commands, report a wrong sector position, run out of sectors).

use crate::core::buffer::SECTOR_SIZE;
use crate::core::queue::{Command, CommandKind};

use super::msf::{Msf, HEADER_LEN};
use super::port::{DrivePort, ReadyCallback, SyncCallback};
use super::RESULT_COMPLETE;

pub(crate) struct ScriptedPort {
    /// Result of `sync()`
    pub sync_ready: bool,
    /// Whether control commands are accepted
    pub accept_control: bool,
    /// Fire the sync callback when a control command is accepted
    pub fire_on_control: bool,
    /// Code passed to the sync callback
    pub result_code: u8,
    /// Override the position written into sector headers
    pub report_lba: Option<u32>,
    /// Current head position
    pub head: u32,
    total_sectors: u32,
    raw: Vec<u8>,
    offset: usize,
    sync_cb: Option<SyncCallback>,
    ready_cb: Option<ReadyCallback>,
}

impl ScriptedPort {
    pub fn new(total_sectors: u32) -> Self {
        Self {
            sync_ready: true,
            accept_control: true,
            fire_on_control: true,
            result_code: RESULT_COMPLETE,
            report_lba: None,
            head: 0,
            total_sectors,
            raw: Vec::new(),
            offset: 0,
            sync_cb: None,
            ready_cb: None,
        }
    }

    /// Payload byte pattern for a given sector
    pub fn pattern(lba: u32) -> u8 {
        (lba & 0xFF) as u8
    }

    fn load_sector(&mut self) -> bool {
        if self.head >= self.total_sectors {
            return false;
        }
        let lba = self.report_lba.unwrap_or(self.head);
        self.raw = vec![0u8; HEADER_LEN + SECTOR_SIZE];
        let mut header = [0u8; HEADER_LEN];
        Msf::from_lba(lba as i32).write_sector_header(&mut header, 2);
        self.raw[..HEADER_LEN].copy_from_slice(&header);
        self.raw[HEADER_LEN..].fill(Self::pattern(self.head));
        self.offset = 0;
        true
    }

    fn apply(&mut self, cmd: &Command) -> bool {
        if !self.accept_control {
            return false;
        }
        match cmd.kind {
            CommandKind::Seek => {
                self.head = cmd.args[0];
                self.raw.clear();
                self.offset = 0;
            }
            CommandKind::Read => {
                if !self.load_sector() {
                    return false;
                }
                self.head += 1;
                if let Some(cb) = &self.ready_cb {
                    cb(1);
                }
            }
            CommandKind::SetMode | CommandKind::Custom => {}
        }
        if self.fire_on_control {
            if let Some(cb) = &self.sync_cb {
                cb(self.result_code);
            }
        }
        true
    }
}

impl DrivePort for ScriptedPort {
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
        self.sync_ready
    }

    fn control_sync(&mut self, cmd: &Command) -> bool {
        self.apply(cmd)
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
