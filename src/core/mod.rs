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

//! Core streaming components
//!
//! Leaves first: [`layout`] resolves resource ids, [`queue`] holds pending
//! drive commands, [`drive`] talks to the hardware, [`buffer`] rings
//! decoded sectors, [`fader`] masks seeks, [`pipeline`] sequences
//! transfers, and [`system`] ties them into the per-frame entry point.

pub mod buffer;
pub mod config;
pub mod drive;
pub mod error;
pub mod fader;
pub mod layout;
pub mod pipeline;
pub mod queue;
pub mod system;
