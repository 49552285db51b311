//! Session configuration surface and fail-fast validation.

use std::time::Duration;

use crate::errors::CouncilError;
use crate::heartbeat::HeartbeatConfig;
use crate::repo_context::RepoContextConfig;

/// All knobs recognized by the engine. Defaults match the CLI defaults.
#[derive(Debug, Clone)]
pub struct CouncilConfig {
    /// Round cap; exceeding it is a terminal "max rounds reached".
    pub max_rounds: u32,
    /// Local "still running" log cadence while a provider runs (0 disables).
    pub heartbeat_seconds: u64,
    /// Low-rate heartbeat comment cadence to beads (0 disables).
    pub beads_heartbeat_seconds: u64,
    /// Cap on heartbeat comments per provider run.
    pub beads_heartbeat_max: u32,
    /// Per-provider hard timeout.
    pub timeout_seconds: u64,
    /// Interjection window after a phase raises questions (0 disables).
    pub user_wait_seconds: u64,
    /// Session-wide budget of interjection pauses.
    pub max_user_waits: u32,
    /// Poll cadence while awaiting a user reply.
    pub user_poll_seconds: u64,
    /// Whether scoped repo context is attached to prompts.
    pub repo_context_enabled: bool,
    pub repo_context: RepoContextConfig,
}

impl Default for CouncilConfig {
    fn default() -> Self {
        Self {
            max_rounds: 5,
            heartbeat_seconds: 15,
            beads_heartbeat_seconds: 60,
            beads_heartbeat_max: 5,
            timeout_seconds: 600,
            user_wait_seconds: 60,
            max_user_waits: 2,
            user_poll_seconds: 2,
            repo_context_enabled: true,
            repo_context: RepoContextConfig::default(),
        }
    }
}

impl CouncilConfig {
    /// Fail fast on invalid parameters, before any session state exists.
    pub fn validate(&self) -> Result<(), CouncilError> {
        if self.max_rounds == 0 {
            return Err(CouncilError::Configuration(
                "max_rounds must be a positive integer".into(),
            ));
        }
        if self.beads_heartbeat_max == 0 {
            return Err(CouncilError::Configuration(
                "beads_heartbeat_max must be a positive integer".into(),
            ));
        }
        if self.timeout_seconds == 0 {
            return Err(CouncilError::Configuration(
                "timeout_seconds must be a positive integer".into(),
            ));
        }
        if self.user_poll_seconds == 0 {
            return Err(CouncilError::Configuration(
                "user_poll_seconds must be a positive integer".into(),
            ));
        }
        Ok(())
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn heartbeat(&self) -> HeartbeatConfig {
        HeartbeatConfig::from_seconds(
            self.heartbeat_seconds,
            self.beads_heartbeat_seconds,
            self.beads_heartbeat_max,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(CouncilConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_rounds_fails_fast() {
        let config = CouncilConfig {
            max_rounds: 0,
            ..CouncilConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, CouncilError::Configuration(_)));
        assert!(err.to_string().contains("max_rounds"));
    }

    #[test]
    fn zero_poll_fails_fast() {
        let config = CouncilConfig {
            user_poll_seconds: 0,
            ..CouncilConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_wait_is_allowed_it_just_disables_pauses() {
        let config = CouncilConfig {
            user_wait_seconds: 0,
            max_user_waits: 0,
            heartbeat_seconds: 0,
            beads_heartbeat_seconds: 0,
            ..CouncilConfig::default()
        };
        assert!(config.validate().is_ok());
        assert!(config.heartbeat().log_interval.is_none());
        assert!(config.heartbeat().transcript_interval.is_none());
    }
}
