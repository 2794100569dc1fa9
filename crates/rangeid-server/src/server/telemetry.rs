//! Console logging for the server.
//!
//! Events are filtered through `RUST_LOG` (default `info`) and printed by
//! `tracing_subscriber::fmt`. With the `tracing` feature, the server and the
//! `rangeid` library also emit spans for each request and debug events for
//! lost update races:
//!
//! ```bash
//! RUST_LOG=rangeid=debug,info cargo run -p rangeid-server
//! ```

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_telemetry() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true)
                .pretty(),
        )
        .try_init()?;

    Ok(())
}
