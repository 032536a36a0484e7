//! Tracing configuration and initialization.

use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{
    EnvFilter,
    fmt::format::FmtSpan,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

enum TrcMode {
    /// Compact, colorful output for people watching a terminal.
    Pretty,
    /// Plain, verbose rust logging with span events.
    Ugly,
}

pub struct Trc {
    mode: TrcMode,
    env_filter: EnvFilter,
}

impl Default for Trc {
    fn default() -> Self {
        let maybe_env_filter =
            EnvFilter::try_from_env("EXPOSEFS_LOG").or_else(|_| EnvFilter::try_from_default_env());

        match maybe_env_filter {
            // Someone who sets a filter is debugging and wants every line, unadorned.
            Ok(env_filter) => Self {
                mode: TrcMode::Ugly,
                env_filter,
            },
            Err(_) => Self {
                mode: TrcMode::Pretty,
                env_filter: EnvFilter::new("info"),
            },
        }
    }
}

impl Trc {
    pub fn init(self) -> Result<(), TryInitError> {
        match self.mode {
            TrcMode::Ugly => self.init_ugly_mode(),
            TrcMode::Pretty => self.init_pretty_mode(),
        }
    }

    fn init_ugly_mode(self) -> Result<(), TryInitError> {
        tracing_subscriber::registry()
            .with(self.env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_span_events(FmtSpan::ENTER | FmtSpan::CLOSE),
            )
            .try_init()?;

        Ok(())
    }

    fn init_pretty_mode(self) -> Result<(), TryInitError> {
        let indicatif_layer = IndicatifLayer::new();
        tracing_subscriber::registry()
            .with(self.env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(indicatif_layer.get_stderr_writer())
                    .with_target(false)
                    .without_time()
                    .compact(),
            )
            .with(indicatif_layer)
            .try_init()?;

        Ok(())
    }
}
