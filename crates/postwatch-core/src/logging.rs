use std::{fs::OpenOptions, path::Path, sync::Mutex};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::{errors::Error, Result};

/// Initialize tracing for the monitor.
///
/// Logs go to stdout; when `log_file` is given they are also appended there
/// (without ANSI colors). Override the level with `RUST_LOG`.
pub fn init(service_name: &str, log_file: Option<&Path>) -> Result<()> {
    // Default: info for our crates, warn for everything else.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,postwatch=info,postwatch_core=info,postwatch_x=info,postwatch_twilio=info,{}=info",
            service_name.replace('-', "_")
        ))
    });

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::External(format!("logging init failed: {e}")))
}
