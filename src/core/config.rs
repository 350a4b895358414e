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

//! Streaming subsystem configuration
//!
//! Tunables for retry budgets and the timing constants of the read
//! pipeline. Defaults match the values the streaming code was tuned
//! against on real hardware; they can be overridden from a TOML file.

use serde::Deserialize;

use super::error::{Result, StreamError};

/// Configuration for the streaming subsystem
///
/// # Example
///
/// ```
/// use cdstream::core::config::StreamConfig;
///
/// let config = StreamConfig::default();
/// assert_eq!(config.timer_threshold, 150);
/// assert_eq!(config.fade_steps, 127);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Maximum attempts for blocking drive commands before giving up
    pub retry_limit: u32,

    /// Microseconds to back off between blocking retries
    pub retry_backoff_us: u64,

    /// Ticks to wait in the poll state before declaring the transfer window
    /// elapsed
    pub timer_threshold: u32,

    /// Number of single-step mixer writes in one fade sweep
    pub fade_steps: u16,

    /// Maximum ticks `drain_blocking` spends waiting for the queue to empty
    pub drain_budget: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            retry_limit: 8,
            retry_backoff_us: 100,
            timer_threshold: 150,
            fade_steps: 127,
            drain_budget: 4096,
        }
    }
}

impl StreamConfig {
    /// Parse a configuration from TOML text
    ///
    /// Missing keys fall back to their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| StreamError::ConfigError(e.to_string()))
    }

    /// Load a configuration from a TOML file
    pub fn load(path: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = StreamConfig::default();
        assert_eq!(config.retry_limit, 8);
        assert_eq!(config.timer_threshold, 150);
        assert_eq!(config.fade_steps, 127);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = StreamConfig::from_toml_str("retry_limit = 3").unwrap();
        assert_eq!(config.retry_limit, 3);
        assert_eq!(config.timer_threshold, 150);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = StreamConfig::from_toml_str("retry_limit = \"lots\"").unwrap_err();
        assert!(matches!(err, StreamError::ConfigError(_)));
    }
}
