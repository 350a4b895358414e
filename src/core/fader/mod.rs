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

//! Mixer channel fading for seek masking
//!
//! Seeks on optical media are audible as a skip in streamed audio. The
//! fader sweeps the disc channel's mixer level down before a seek is
//! issued and back up once data flows again, one register write per step.
//! A full sweep is 127 steps, short enough to finish inside the read
//! pipeline's poll window.

use super::config::StreamConfig;

/// Default number of single-step mixer writes per sweep
pub const DEFAULT_FADE_STEPS: u16 = 127;

/// Mixer channel driven by the fader
pub const DISC_CHANNEL: u32 = 0;

/// Audio mixer hardware abstraction
pub trait Mixer {
    /// Write one channel's volume register
    fn set_channel_level(&mut self, channel: u32, value: u16);
}

/// Stand-in mixer for hosts with no audio hardware attached
#[derive(Debug, Default)]
pub struct NoopMixer;

impl Mixer for NoopMixer {
    fn set_channel_level(&mut self, _channel: u32, _value: u16) {}
}

/// Direction of the next fade sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeDirection {
    /// Restore the channel toward the saved level
    FadeIn,
    /// Sweep the channel down to silence
    FadeOut,
}

/// Fade bookkeeping: which way the next sweep goes and the level to restore
#[derive(Debug, Clone, Copy)]
pub struct AudioFadeState {
    pub direction: FadeDirection,
    pub saved_level: u16,
}

/// Sweeps a mixer channel to mask seek latency
pub struct AudioFader {
    mixer: Box<dyn Mixer>,
    state: AudioFadeState,
    level: u16,
    muted: bool,
    steps: u16,
}

impl AudioFader {
    /// Create a fader over a mixer, starting at full level
    pub fn new(mixer: Box<dyn Mixer>, config: &StreamConfig) -> Self {
        Self {
            mixer,
            state: AudioFadeState {
                direction: FadeDirection::FadeOut,
                saved_level: DEFAULT_FADE_STEPS,
            },
            level: DEFAULT_FADE_STEPS,
            muted: false,
            steps: config.fade_steps,
        }
    }

    /// Run one fade sweep, toggling direction for the next call
    ///
    /// Fade-out saves the current level, walks the channel down to zero
    /// and latches the mute flag; fade-in walks back up to the saved level
    /// and clears it.
    pub fn fade(&mut self) {
        match self.state.direction {
            FadeDirection::FadeOut => self.fade_out(),
            FadeDirection::FadeIn => self.fade_in(),
        }
    }

    /// Sweep down to silence, saving the level for the matching fade-in
    ///
    /// No-op while already muted, so the saved level survives repeated
    /// init sequences.
    pub fn fade_out(&mut self) {
        if self.muted {
            return;
        }
        self.state.saved_level = self.level;
        let steps = self.steps.min(self.level).max(1);
        for step in (0..steps).rev() {
            let value = scale(self.level, step, steps);
            self.mixer.set_channel_level(DISC_CHANNEL, value);
        }
        self.level = 0;
        self.muted = true;
        self.state.direction = FadeDirection::FadeIn;
        log::debug!("fader: out, saved level {}", self.state.saved_level);
    }

    /// Sweep back up to the saved level; no-op when not muted
    pub fn fade_in(&mut self) {
        if !self.muted {
            return;
        }
        let target = self.state.saved_level;
        let steps = self.steps.min(target).max(1);
        for step in 1..=steps {
            let value = scale(target, step, steps);
            self.mixer.set_channel_level(DISC_CHANNEL, value);
        }
        self.level = target;
        self.muted = false;
        self.state.direction = FadeDirection::FadeOut;
        log::debug!("fader: in, restored level {}", target);
    }

    /// Swap the live level with the saved one
    ///
    /// Hardware toggle used when playback pauses without a sweep: the
    /// first call stashes the level and silences the channel, the second
    /// restores it.
    pub fn swap_saved(&mut self) {
        if self.muted {
            self.level = self.state.saved_level;
            self.muted = false;
        } else {
            self.state.saved_level = self.level;
            self.level = 0;
            self.muted = true;
        }
        self.mixer.set_channel_level(DISC_CHANNEL, self.level);
    }

    /// Current channel level
    pub fn level(&self) -> u16 {
        self.level
    }

    /// Whether the channel is latched silent
    pub fn muted(&self) -> bool {
        self.muted
    }

    /// Direction of the next sweep
    pub fn direction(&self) -> FadeDirection {
        self.state.direction
    }
}

/// Level at `step` of `steps` on the way to `target`
fn scale(target: u16, step: u16, steps: u16) -> u16 {
    (target as u32 * step as u32 / steps as u32) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct RecordingMixer {
        writes: Rc<RefCell<Vec<u16>>>,
    }

    impl Mixer for RecordingMixer {
        fn set_channel_level(&mut self, _channel: u32, value: u16) {
            self.writes.borrow_mut().push(value);
        }
    }

    fn recording_fader() -> (AudioFader, Rc<RefCell<Vec<u16>>>) {
        let writes = Rc::new(RefCell::new(Vec::new()));
        let mixer = RecordingMixer {
            writes: Rc::clone(&writes),
        };
        let fader = AudioFader::new(Box::new(mixer), &StreamConfig::default());
        (fader, writes)
    }

    #[test]
    fn test_fade_out_sweeps_down_in_steps() {
        let (mut fader, writes) = recording_fader();
        fader.fade();

        let writes = writes.borrow();
        assert_eq!(writes.len(), 127);
        assert_eq!(*writes.first().unwrap(), 126);
        assert_eq!(*writes.last().unwrap(), 0);
        assert!(writes.windows(2).all(|w| w[1] < w[0]));
        assert!(fader.muted());
        assert_eq!(fader.level(), 0);
    }

    #[test]
    fn test_fade_toggles_and_restores_level() {
        let (mut fader, writes) = recording_fader();
        fader.fade();
        assert_eq!(fader.direction(), FadeDirection::FadeIn);

        fader.fade();
        assert_eq!(fader.direction(), FadeDirection::FadeOut);
        assert_eq!(fader.level(), 127);
        assert!(!fader.muted());
        assert_eq!(*writes.borrow().last().unwrap(), 127);
    }

    #[test]
    fn test_fade_completes_within_poll_window() {
        let config = StreamConfig::default();
        let (mut fader, writes) = recording_fader();
        fader.fade();
        assert!((writes.borrow().len() as u32) < config.timer_threshold);
    }

    #[test]
    fn test_repeated_fade_out_keeps_saved_level() {
        let (mut fader, writes) = recording_fader();
        fader.fade_out();
        let count = writes.borrow().len();
        fader.fade_out();
        assert_eq!(writes.borrow().len(), count);

        fader.fade_in();
        assert_eq!(fader.level(), 127);
    }

    #[test]
    fn test_swap_saved_round_trip() {
        let (mut fader, writes) = recording_fader();
        fader.swap_saved();
        assert!(fader.muted());
        assert_eq!(fader.level(), 0);

        fader.swap_saved();
        assert!(!fader.muted());
        assert_eq!(fader.level(), 127);
        assert_eq!(*writes.borrow(), vec![0, 127]);
    }
}
