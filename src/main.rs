use color_eyre::{eyre::eyre, Result};
use joyrelay::config::RelayConfig;
use joyrelay::controller::{EvdevSource, ReaderHandle, SnapshotCell};
use joyrelay::telemetry::console::run_console;
use joyrelay::telemetry::{CommandLatch, TelemetryPublisher};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

// Blocking device and stdin reads may still be parked when the relay stops.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

fn main() -> Result<()> {
    setup()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run());
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}

async fn run() -> Result<()> {
    // optional config path as the only argument
    let explicit_path = std::env::args_os().nth(1).map(PathBuf::from);
    let (config, config_path) = RelayConfig::load(explicit_path)
        .await
        .map_err(|e| eyre!("Failed to load configuration: {}", e))?;

    setup_logging(config.log_level()?);
    info!("Loaded configuration from {}", config_path.display());

    let cancel = CancellationToken::new();
    let snapshot = SnapshotCell::new();
    let commands = CommandLatch::new();

    let publisher =
        TelemetryPublisher::bind(config.publisher_settings(), snapshot.clone(), commands.clone())
            .await
            .map_err(|e| eyre!("Failed to start telemetry publisher: {}", e))?;

    let reader_handle = ReaderHandle::spawn(
        Box::new(EvdevSource),
        config.reader_settings(),
        snapshot,
        cancel.child_token(),
    );
    let publisher_handle = tokio::spawn(publisher.run(cancel.child_token()));

    if config.console.enabled {
        let stdin = BufReader::new(tokio::io::stdin());
        tokio::spawn(run_console(stdin, commands, cancel.child_token()));
    }

    wait_for_shutdown(tokio::signal::ctrl_c()).await;
    cancel.cancel();

    match reader_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Input reader ended with error: {}", e),
        Err(e) => error!("Input reader task failed: {}", e),
    }
    match publisher_handle.await {
        Ok(stats) => info!(
            "Relay stopped: {} messages sent, {} send failures, {} control messages",
            stats.sent, stats.send_failures, stats.control_received
        ),
        Err(e) => error!("Telemetry publisher task failed: {}", e),
    }

    Ok(())
}

// Without a working signal handler the relay keeps running until killed.
async fn wait_for_shutdown<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => info!("Shutdown requested"),
        Err(e) => {
            error!("Failed to listen for Ctrl-C, running until killed: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    Ok(())
}

fn setup_logging(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}
