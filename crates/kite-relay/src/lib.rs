//! # Kite Relay
//!
//! Service layer of the Kite chat relay. It embeds the `kite-core` router for
//! transport adapters:
//!
//! - [`config`]: TOML configuration with `KITE_*` environment overrides
//! - [`telemetry`]: tracing subscriber setup
//! - [`metrics`]: Prometheus metrics
//! - [`Relay`]: dispatch a command, publish its events, deliver its payloads
//! - [`listener`]: background event log and message history
//! - [`history`]: bounded per-conversation message history
//!
//! ## Example
//!
//! ```ignore
//! use kite_relay::{config::Config, Relay};
//! use kite_core::InMemoryChannels;
//!
//! let config = Config::load()?;
//! kite_relay::init(&config)?;
//! let relay = Relay::new(InMemoryChannels::new(), &config);
//! relay.register(telegram_connector);
//! let _listeners = relay.spawn_listeners();
//! let reports = relay.submit(command).await;
//! ```

pub mod config;
pub mod history;
pub mod listener;
pub mod metrics;
pub mod relay;
pub mod telemetry;

pub use config::Config;
pub use history::History;
pub use relay::Relay;

/// Install tracing and metrics as configured.
///
/// Call once per process, before building the [`Relay`].
///
/// # Errors
///
/// Returns an error if the tracing subscriber cannot be installed.
pub fn init(config: &Config) -> anyhow::Result<()> {
    telemetry::init(&config.log)?;
    metrics::init(&config.metrics);
    Ok(())
}

pub use kite_core;
pub use kite_protocol;
