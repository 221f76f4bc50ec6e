//! `postwatch`: watch one account's posts and text each new one by SMS.
//!
//! ```bash
//! postwatch            # poll until Ctrl-C / SIGTERM
//! postwatch once       # single cycle, for cron-style deployments
//! postwatch report --days 7
//! ```

use std::{process::ExitCode, sync::Arc};

use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use postwatch_core::{
    config::Config,
    monitor::Monitor,
    notify::Notifier,
    state::{JsonFileStore, StateStore},
    usage::{status_text, UsageReport},
};
use postwatch_twilio::TwilioSms;
use postwatch_x::XClient;

#[derive(Parser, Debug)]
#[command(name = "postwatch", author, version, about = "SMS alerts for new posts from one account")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll until interrupted (default)
    Run,
    /// Run a single poll cycle and exit
    Once,
    /// Print the persisted monitor state
    Status,
    /// Print a usage report
    Report {
        /// Days to cover (1-30)
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
    /// Send a test SMS to check provider credentials
    TestSms,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let cfg = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("postwatch: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = postwatch_core::logging::init("postwatch", cfg.log_file.as_deref()) {
        eprintln!("postwatch: {e}");
        return ExitCode::FAILURE;
    }

    match dispatch(cli.command.unwrap_or(Command::Run), cfg).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "postwatch exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(command: Command, cfg: Config) -> postwatch_core::Result<()> {
    let store: Arc<dyn StateStore> = Arc::new(JsonFileStore::new(cfg.state_file.clone()));

    match command {
        Command::Run => {
            let shutdown = CancellationToken::new();
            tokio::spawn(forward_signals(shutdown.clone()));
            let mut monitor = build_monitor(&cfg, store, shutdown).await?;
            monitor.run().await
        }
        Command::Once => {
            let mut monitor = build_monitor(&cfg, store, CancellationToken::new()).await?;
            let report = monitor.run_cycle().await?;
            tracing::info!(cycle = report.cycle, outcome = ?report.outcome, persisted = report.persisted, "single cycle finished");
            Ok(())
        }
        Command::Status => {
            let state = store.load().await;
            println!("{}", status_text(&state, &cfg.monitor.handle, Utc::now().date_naive()));
            Ok(())
        }
        Command::Report { days } => {
            let state = store.load().await;
            let report = UsageReport::from_state(&state, days, Utc::now().date_naive());
            println!("{}", report.render());
            Ok(())
        }
        Command::TestSms => {
            let sms = Arc::new(TwilioSms::new(&cfg)?);
            let notifier = Notifier::new(&cfg, sms);
            let sent = notifier.send(&notifier.test_request()).await?;
            println!("test message sent: {}", sent.sid);
            Ok(())
        }
    }
}

async fn build_monitor(
    cfg: &Config,
    store: Arc<dyn StateStore>,
    shutdown: CancellationToken,
) -> postwatch_core::Result<Monitor> {
    let feed = Arc::new(XClient::new(cfg)?);
    let sms = Arc::new(TwilioSms::new(cfg)?);
    let notifier = Notifier::new(cfg, sms);
    Ok(Monitor::open(&cfg.monitor, feed, notifier, store, shutdown).await)
}

/// Cancel `shutdown` on Ctrl-C or (unix) SIGTERM.
async fn forward_signals(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM; Ctrl-C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("shutdown requested");
    shutdown.cancel();
}
