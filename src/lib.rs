//! # Uplink
//!
//! Device connectivity orchestration: brings a device from power-on to a
//! working WiFi link and MQTT session, falls back to BLE provisioning when
//! it has no usable network, and keeps every link alive afterwards.
//!
//! ## Architecture
//!
//! Uplink is organized as a workspace with multiple crates:
//!
//! 1. **uplink-core** - Event bus, event ids, FSM engine, clock, errors
//! 2. **uplink-communication** - WiFi/MQTT/provisioning managers, reconnect policy, credentials
//! 3. **uplink-settings** - Configuration files and the JSON credential store
//! 4. **uplink** - Bring-up state machine, status display, button input and the binary
//!
//! Components never call each other directly; they meet on the [`EventBus`].
//! The bring-up machine listens to everything and reacts through
//! [`BringUpHooks`].

pub mod app;
pub mod bringup;
pub mod button;
pub mod display;

pub use app::{App, AppParts};
pub use bringup::{AppState, BringUp, BringUpHooks};
pub use button::{ButtonAction, ButtonMonitor, DEFAULT_LONG_PRESS_MS};
pub use display::{StatusBoard, StatusRenderer, StatusView, SystemView, TracingRenderer, WifiView};

pub use uplink_core::{
    Clock, ClockRef, Error, Event, EventBus, EventBusConfig, EventId, EventSource, ManualClock,
    Result, SystemClock,
};

pub use uplink_communication::{
    MqttManager, MqttManagerConfig, ProvisioningManager, WifiCredential, WifiManager,
    WifiManagerConfig,
};

pub use uplink_settings::Config;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Environment variable selecting the log format (`pretty` or `json`)
pub const LOG_FORMAT_ENV_VAR: &str = "UPLINK_LOG_FORMAT";

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output with pretty formatting, or JSON lines when
///   `UPLINK_LOG_FORMAT=json`
/// - RUST_LOG environment variable support
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let json = std::env::var(LOG_FORMAT_ENV_VAR)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let result = if json {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stdout)
            .with_target(true)
            .with_thread_names(true)
            .json();
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stdout)
            .with_target(true)
            .with_level(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_line_number(true)
            .pretty();
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
    };

    result.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}
