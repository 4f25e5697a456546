//! Overtake Controller
//!
//! Drives the decision layer once per tick:
//! - Pulls vehicle snapshots from a `SnapshotSource`
//! - Runs trigger, direction, return and verification logic
//! - Emits numbered actuation commands through a `CommandSink`
//! - Publishes a `StatusReport` for display

mod controller;
mod error;
mod settings;
mod sink;
mod source;
mod status;

pub use controller::OvertakeController;
pub use error::{ControllerError, SettingsError, SinkError};
pub use settings::{ConfigStore, ENV_PREFIX};
pub use sink::{ChannelCommandSink, CommandSink, UdpCommandSink};
pub use source::{ChannelSnapshotSource, JsonLinesSource, SnapshotSource, SourceEvent};
pub use status::{LaneWarnings, StatusReport};

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Initialize logging
pub fn init_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}
