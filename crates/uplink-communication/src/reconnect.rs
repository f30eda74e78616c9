//! Fixed-interval reconnect policy shared by the connectivity managers.
//!
//! The policy is a small state record advanced by a periodic step. It never
//! talks to a driver itself: `step` tells the caller when to start a
//! connection attempt, and the driver callbacks feed results back in.

use serde::{Deserialize, Serialize};

/// Default cadence of the periodic step
pub const DEFAULT_STEP_INTERVAL_MS: u32 = 5000;

/// Default minimum delay between a failure and the next attempt
pub const DEFAULT_RECONNECT_INTERVAL_MS: i32 = 5000;

/// Link phase tracked by a manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkPhase {
    /// Not trying to connect.
    Idle,
    /// Link down; eligible for retry.
    Disconnected,
    /// Attempt in progress.
    Connecting,
    /// Link up.
    Connected,
    /// Last attempt failed; eligible for retry.
    Error,
}

impl LinkPhase {
    /// Phases in which the step may start a new attempt
    pub fn wants_retry(self) -> bool {
        matches!(self, LinkPhase::Disconnected | LinkPhase::Error)
    }
}

impl std::fmt::Display for LinkPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LinkPhase::Idle => "IDLE",
            LinkPhase::Disconnected => "DISCONNECTED",
            LinkPhase::Connecting => "CONNECTING",
            LinkPhase::Connected => "CONNECTED",
            LinkPhase::Error => "ERROR",
        };
        write!(f, "{}", name)
    }
}

/// What the caller should do after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    /// Nothing to do this round.
    Wait,
    /// Start one connection attempt now.
    Connect,
}

/// Reconnect policy configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Minimum delay after a failure before retrying; negative disables retry.
    pub reconnect_interval_ms: i32,
    /// How often the step runs.
    pub step_interval_ms: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL_MS,
            step_interval_ms: DEFAULT_STEP_INTERVAL_MS,
        }
    }
}

/// Backoff state for one link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    phase: LinkPhase,
    last_error_tick: Option<u32>,
    config: ReconnectConfig,
}

impl ReconnectPolicy {
    /// Policy starting in `Idle` with no recorded failure
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            phase: LinkPhase::Idle,
            last_error_tick: None,
            config,
        }
    }

    pub fn phase(&self) -> LinkPhase {
        self.phase
    }

    pub fn last_error_tick(&self) -> Option<u32> {
        self.last_error_tick
    }

    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    /// False when the reconnect interval is negative
    pub fn auto_retry_enabled(&self) -> bool {
        self.config.reconnect_interval_ms >= 0
    }

    /// Force a phase without touching the failure tick
    pub fn set_phase(&mut self, phase: LinkPhase) {
        self.phase = phase;
    }

    /// Run one periodic step at tick `now`
    ///
    /// In `Disconnected` or `Error`, once at least `reconnect_interval_ms` has
    /// elapsed since the last failure (or immediately if none is recorded),
    /// moves to `Connecting` and returns `Connect`.
    ///
    /// A negative interval disables automatic retry: the step always waits
    /// and only [`ReconnectPolicy::begin_attempt`] starts a connection.
    pub fn step(&mut self, now: u32) -> StepAction {
        if !self.phase.wants_retry() || !self.auto_retry_enabled() {
            return StepAction::Wait;
        }

        if let Some(tick) = self.last_error_tick {
            let need = self.config.reconnect_interval_ms as u32;
            if now.wrapping_sub(tick) < need {
                return StepAction::Wait;
            }
        }

        self.begin_attempt(now);
        StepAction::Connect
    }

    /// Record an attempt started at `now`, whatever the interval says
    ///
    /// Moves to `Connecting`. A missing failure tick is stamped with `now` so
    /// the next retry waits a full interval.
    pub fn begin_attempt(&mut self, now: u32) {
        self.phase = LinkPhase::Connecting;
        if self.last_error_tick.is_none() {
            self.last_error_tick = Some(now);
        }
    }

    /// Link came up
    pub fn on_connected(&mut self) {
        self.phase = LinkPhase::Connected;
        self.last_error_tick = None;
    }

    /// Link went down at `now`
    pub fn on_disconnected(&mut self, now: u32) {
        self.phase = LinkPhase::Disconnected;
        self.last_error_tick = Some(now);
    }

    /// Attempt failed at `now`
    pub fn on_error(&mut self, now: u32) {
        self.phase = LinkPhase::Error;
        self.last_error_tick = Some(now);
    }

    /// Forget the last failure so the next step may retry immediately
    pub fn reset_backoff(&mut self) {
        self.last_error_tick = None;
    }

    /// Stop retrying until something calls `start` again
    pub fn mark_idle(&mut self) {
        self.phase = LinkPhase::Idle;
    }

    /// Re-arm: phase `Disconnected`, no recorded failure
    pub fn restart(&mut self) {
        self.phase = LinkPhase::Disconnected;
        self.last_error_tick = None;
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(ReconnectConfig::default())
    }
}
