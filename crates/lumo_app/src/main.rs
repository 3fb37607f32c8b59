// SPDX-License-Identifier: MIT OR Apache-2.0
//! Lumo headless driver.
//!
//! Loads a configuration, builds or loads a render graph, sizes it to the
//! viewport and runs it for a number of frames on the headless backend.

mod config;
mod runner;

use config::LumoConfig;
use runner::Runner;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn main() {
    let config = LumoConfig::from_args(std::env::args().skip(1));

    let log_filter = config
        .as_ref()
        .map_or("lumo=info", |c| c.log_filter.as_str());
    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let mut bad_directive = None;
    for directive in log_filter.split(',').filter(|d| !d.trim().is_empty()) {
        match directive.trim().parse() {
            Ok(directive) => env_filter = env_filter.add_directive(directive),
            Err(e) => bad_directive = Some(format!("{directive}: {e}")),
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Lumo v{}", env!("CARGO_PKG_VERSION"));
    if let Some(bad) = bad_directive {
        tracing::warn!("Ignoring log directive {bad}");
    }

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    };

    let mut runner = match Runner::new(config) {
        Ok(runner) => runner,
        Err(e) => {
            tracing::error!("Failed to build graph: {e}");
            std::process::exit(1);
        }
    };

    match runner.run() {
        Ok(summary) => {
            if summary.degraded_frames > 0 {
                tracing::warn!(
                    "{} of {} frame(s) degraded",
                    summary.degraded_frames,
                    summary.frames
                );
            }
            tracing::info!(
                "Shutting down graph v{} holding {} resource(s)",
                runner.graph().version(),
                summary.live_resources
            );
        }
        Err(e) => {
            tracing::error!("Run failed: {e}");
            std::process::exit(1);
        }
    }
}
