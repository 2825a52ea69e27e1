//! Registry configuration.

use std::env;

use tracing::warn;

use crate::error::Severity;

/// Environment variable read by [`RegistryConfig::from_env`].
pub const MODE_ENV_VAR: &str = "GUID_REGISTRY_MODE";

/// Whether the host is running live or editing content.
///
/// Only affects how collisions are reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ExecutionMode {
    /// Live execution. Collisions are assertion-level.
    #[default]
    Running,
    /// Authoring/editing. Collisions come from copies and are warnings.
    Authoring,
}

impl ExecutionMode {
    /// Parses a mode name (`running` or `authoring`, case-insensitive).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "running" => Some(Self::Running),
            "authoring" => Some(Self::Authoring),
            _ => None,
        }
    }

    /// The severity a collision is reported with in this mode.
    #[must_use]
    pub const fn collision_severity(self) -> Severity {
        match self {
            Self::Running => Severity::Assertion,
            Self::Authoring => Severity::Warning,
        }
    }
}

/// Configuration for a [`GuidRegistry`](crate::GuidRegistry).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Execution mode used to pick collision severity.
    pub mode: ExecutionMode,
}

impl RegistryConfig {
    /// Create a config in [`ExecutionMode::Running`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the execution mode.
    #[must_use]
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Build a config from the `GUID_REGISTRY_MODE` environment variable,
    /// falling back to [`ExecutionMode::Running`] when unset or unknown.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_mode_value(env::var(MODE_ENV_VAR).ok().as_deref())
    }

    fn from_mode_value(value: Option<&str>) -> Self {
        let mode = match value {
            None => ExecutionMode::default(),
            Some(raw) => ExecutionMode::from_name(raw).unwrap_or_else(|| {
                warn!(value = raw, "unknown {}, using running mode", MODE_ENV_VAR);
                ExecutionMode::default()
            }),
        };
        Self::new().with_mode(mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mode_is_running() {
        assert_eq!(RegistryConfig::new().mode, ExecutionMode::Running);
    }

    #[test]
    fn test_modes_map_to_distinct_severities() {
        assert_eq!(
            ExecutionMode::Running.collision_severity(),
            Severity::Assertion
        );
        assert_eq!(
            ExecutionMode::Authoring.collision_severity(),
            Severity::Warning
        );
    }

    #[test]
    fn test_mode_value_parsing() {
        assert_eq!(
            RegistryConfig::from_mode_value(Some("Authoring")).mode,
            ExecutionMode::Authoring
        );
        assert_eq!(
            RegistryConfig::from_mode_value(Some(" running ")).mode,
            ExecutionMode::Running
        );
        assert_eq!(
            RegistryConfig::from_mode_value(Some("paused")).mode,
            ExecutionMode::Running
        );
        assert_eq!(
            RegistryConfig::from_mode_value(None).mode,
            ExecutionMode::Running
        );
    }
}
