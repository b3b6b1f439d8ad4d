use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tuckbar::actor::bar_manager::{BarManager, BarManagerHandle, Error};
use tuckbar::common::config::{Config, config_file, layout_file};
use tuckbar::common::log;
use tuckbar::model::layout::JsonFileStore;
use tuckbar::sys::screen;

/// Cadence of background rescans when running as a daemon.
const REFRESH_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser)]
struct Cli {
    /// Horizontal position of the hidden-section separator, in points.
    #[arg(long, value_name = "X")]
    separator_x: f64,

    /// Horizontal position of the always-hidden separator, in points.
    /// Omit to disable the always-hidden section.
    #[arg(long, value_name = "X")]
    always_hidden_x: Option<f64>,

    /// Run a single capture-and-reconcile pass, then exit.
    #[arg(long)]
    once: bool,

    /// Path to configuration file to use (overrides default).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let opt = Cli::parse();
    log::init_logging();

    if !screen::screen_capture_permitted() {
        eprintln!(
            "tuckbar needs the Screen Recording permission to capture menu bar icons. \
Grant it in System Settings > Privacy & Security > Screen Recording and restart."
        );
        process::exit(1);
    }

    let config_path = opt.config.clone().unwrap_or_else(config_file);
    let config = if config_path.exists() {
        Config::read(&config_path)?
    } else {
        Config::default()
    };

    let store = JsonFileStore::new(layout_file());
    let (manager, handle) = BarManager::new(config.settings, store);

    let quit = CancellationToken::new();
    let ctrlc_quit = quit.clone();
    let ctrlc_handle = handle.clone();
    ctrlc::set_handler(move || {
        ctrlc_handle.shutdown();
        ctrlc_quit.cancel();
    })?;

    // The engines hold CoreGraphics objects, so the actor stays on this
    // thread.
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async move {
            let actor = tokio::task::spawn_local(manager.run());
            refresh_loop(&handle, &opt, &quit).await;
            // The signal handler keeps a sender alive, so the actor will not
            // drain on its own.
            actor.abort();
        })
        .await;
    Ok(())
}

async fn refresh_loop(handle: &BarManagerHandle, opt: &Cli, quit: &CancellationToken) {
    loop {
        match handle.refresh(opt.separator_x, opt.always_hidden_x).await {
            Ok(summary) => info!(
                items = summary.items.len(),
                overrides = summary.matched_overrides,
                new = summary.newly_positioned,
                "layout refreshed"
            ),
            Err(Error::Busy) => warn!("refresh skipped, another operation in flight"),
            Err(Error::Cancelled | Error::Shutdown) => break,
            Err(err) => warn!(?err, "refresh failed"),
        }

        if opt.once {
            break;
        }
        tokio::select! {
            _ = quit.cancelled() => break,
            _ = tokio::time::sleep(REFRESH_INTERVAL) => {}
        }
    }
}
