// Copyright 2025 eraflo
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

//! Configuration of an event loop's worker thread.

use serde::{Deserialize, Serialize};

use crate::error::{LoopError, LoopResult};

/// Configuration for an event loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Name given to the worker thread. Shows up in panics and debuggers.
    pub thread_name: String,
    /// Stack size of the worker thread in bytes.
    /// If unset, the platform default is used.
    pub stack_size: Option<usize>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            thread_name: "cadence-event-loop".to_string(),
            stack_size: None,
        }
    }
}

impl LoopConfig {
    /// Creates the default configuration with a different thread name.
    pub fn named(thread_name: impl Into<String>) -> Self {
        Self {
            thread_name: thread_name.into(),
            ..Default::default()
        }
    }

    /// Parses and validates a configuration written in RON.
    ///
    /// Missing fields take their default values.
    pub fn from_ron(source: &str) -> LoopResult<Self> {
        let config: Self = ron::from_str(source).map_err(|e| LoopError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration to pretty-printed RON.
    pub fn to_ron(&self) -> LoopResult<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| LoopError::Config(e.to_string()))
    }

    /// Checks the configuration for values the worker thread cannot use.
    pub fn validate(&self) -> LoopResult<()> {
        if self.thread_name.trim().is_empty() {
            return Err(LoopError::Config("thread_name must not be empty".into()));
        }
        if self.thread_name.contains('\0') {
            return Err(LoopError::Config("thread_name must not contain NUL bytes".into()));
        }
        if self.stack_size == Some(0) {
            return Err(LoopError::Config("stack_size must be greater than zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = LoopConfig::default();
        assert_eq!(config.thread_name, "cadence-event-loop");
        assert_eq!(config.stack_size, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_full_ron() {
        let config = LoopConfig::from_ron(r#"(thread_name: "io-loop", stack_size: Some(262144))"#)
            .expect("valid RON should parse");
        assert_eq!(config.thread_name, "io-loop");
        assert_eq!(config.stack_size, Some(262_144));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = LoopConfig::from_ron(r#"(stack_size: Some(65536))"#).unwrap();
        assert_eq!(config.thread_name, "cadence-event-loop");
        assert_eq!(config.stack_size, Some(65_536));

        let config = LoopConfig::from_ron("()").unwrap();
        assert_eq!(config, LoopConfig::default());
    }

    #[test]
    fn rejects_malformed_ron() {
        let err = LoopConfig::from_ron("(thread_name: 12").unwrap_err();
        assert!(matches!(err, LoopError::Config(_)));
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            LoopConfig::named("   ").validate(),
            Err(LoopError::Config(_))
        ));
        assert!(matches!(
            LoopConfig::from_ron(r#"(stack_size: Some(0))"#),
            Err(LoopError::Config(_))
        ));
    }

    #[test]
    fn ron_output_parses_back() {
        let config = LoopConfig {
            thread_name: "timers".into(),
            stack_size: Some(1 << 20),
        };
        let text = config.to_ron().unwrap();
        assert_eq!(LoopConfig::from_ron(&text).unwrap(), config);
    }
}
