//! Tracy hooks.
//!
//! Built with the `tracy` feature (`cargo build -p serfsim --features tracy`)
//! the `tracing` spans of the tick loop and the serf handlers go to a Tracy
//! client and every game tick ends a `tick` frame. Without the feature both
//! entry points compile to nothing.

use std::str::FromStr;

/// Most detailed span level sent to Tracy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TraceLevel {
    /// `Game::update` only.
    #[default]
    Info,
    /// Adds one span per serf update.
    Debug,
    /// Adds flag searches and free-walk steps.
    Trace,
}

impl TraceLevel {
    pub fn level(self) -> tracing::Level {
        match self {
            TraceLevel::Info => tracing::Level::INFO,
            TraceLevel::Debug => tracing::Level::DEBUG,
            TraceLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl FromStr for TraceLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [TraceLevel::Info, TraceLevel::Debug, TraceLevel::Trace]
            .into_iter()
            .find(|l| l.level().as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown trace level `{s}` (info, debug or trace)"))
    }
}

/// Install the Tracy layer as the global `tracing` subscriber.
///
/// # Panics
///
/// Panics if a global subscriber is already installed.
#[cfg(feature = "tracy")]
pub fn init_tracy(level: TraceLevel) {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::prelude::*;

    tracing_subscriber::registry()
        .with(tracing_tracy::TracyLayer::default())
        .with(LevelFilter::from_level(level.level()))
        .init();
}

#[cfg(not(feature = "tracy"))]
pub fn init_tracy(_level: TraceLevel) {}

/// End the current `tick` frame.
#[cfg(feature = "tracy")]
#[inline]
pub fn frame_mark_tick() {
    tracy_client::secondary_frame_mark!("tick");
}

#[cfg(not(feature = "tracy"))]
#[inline]
pub fn frame_mark_tick() {}
