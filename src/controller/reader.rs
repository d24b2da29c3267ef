//! Input reader: device discovery, reconnect loop and snapshot updates
//!
//! # State Machine
//!
//! ```text
//! Searching ──(name match)──► Connected ──(I/O error / stream end)──┐
//!     ▲                                                             │
//!     └─────────────────────────(retry interval)────────────────────┘
//! ```
//!
//! The reader never terminates on its own; it stops when its cancellation
//! token fires. Blocking device calls run on the blocking pool, so a pending
//! read never delays shutdown.

use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use chrono::{DateTime, Local};
use statum::{machine, state};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::channels::RawInputEvent;
use super::device::{DeviceError, DeviceSource, EventStream};
use super::snapshot::{SnapshotCell, DEFAULT_DEADZONE};

/// Default controller display name
pub const DEFAULT_DEVICE_NAME: &str = "Logitech Gamepad F710";

#[derive(Clone, Debug)]
pub struct ReaderSettings {
    /// Exact display name of the controller to attach to
    pub device_name: String,
    /// Pause between discovery passes and after a disconnect
    pub retry_interval: Duration,
    /// Radial stick deadzone
    pub deadzone: f32,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            retry_interval: Duration::from_secs(1),
            deadzone: DEFAULT_DEADZONE,
        }
    }
}

/// Details of the currently attached controller
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub device_name: String,
    pub connected_at: DateTime<Local>,
}

#[state]
#[derive(Debug, Clone)]
pub enum ReaderState {
    Searching,
    Connected(ConnectionInfo),
}

#[machine]
pub struct InputReader<S: ReaderState> {
    // Taken out while a blocking scan is running
    source: Option<Box<dyn DeviceSource>>,

    // Only populated in Connected; taken out while a blocking read is running
    stream: Option<Box<dyn EventStream>>,

    settings: ReaderSettings,

    snapshot: SnapshotCell,
}

/// Result of one discovery pass
pub enum SearchOutcome {
    Found(InputReader<Connected>),
    NotFound(InputReader<Searching>),
}

/// Why a connected read loop ended
#[derive(Debug)]
pub enum ReadEnd {
    Lost(DeviceError),
    Cancelled,
}

impl<S: ReaderState> InputReader<S> {
    pub fn settings(&self) -> &ReaderSettings {
        &self.settings
    }
}

impl InputReader<Searching> {
    pub fn create(
        source: Box<dyn DeviceSource>,
        settings: ReaderSettings,
        snapshot: SnapshotCell,
    ) -> Self {
        debug!("Creating input reader with settings: {:?}", settings);
        Self::new(Some(source), None, settings, snapshot)
    }

    /// Runs one discovery pass
    ///
    /// Scan failures, including a panicking scan, are logged and reported as
    /// `NotFound`. Only losing the device source itself is an error, which
    /// happens when the blocking pool drops the worker during runtime shutdown.
    pub async fn search(mut self) -> Result<SearchOutcome, DeviceError> {
        let source = self
            .source
            .take()
            .ok_or_else(|| DeviceError::Worker("device source unavailable".to_string()))?;
        let target = self.settings.device_name.clone();

        let (source, found) = off_thread(source, move |source| source.find(&target)).await?;
        self.source = Some(source);

        match found {
            Ok(Some(stream)) => {
                let info = ConnectionInfo {
                    device_name: stream.name().to_string(),
                    connected_at: Local::now(),
                };
                info!(
                    "Joystick {} connected at {}",
                    info.device_name,
                    info.connected_at.format("%H:%M:%S%.3f")
                );
                self.snapshot.connect();
                self.stream = Some(stream);
                Ok(SearchOutcome::Found(self.transition_with(info)))
            }
            Ok(None) => {
                debug!("No device named {} found", self.settings.device_name);
                Ok(SearchOutcome::NotFound(self))
            }
            Err(e) => {
                warn!("Device scan failed: {}", e);
                Ok(SearchOutcome::NotFound(self))
            }
        }
    }

    /// Discovery and read loop; returns once `cancel` fires
    pub async fn run(self, cancel: CancellationToken) -> Result<(), DeviceError> {
        info!(
            "Input reader looking for \"{}\" (retry every {:?}, deadzone {})",
            self.settings.device_name, self.settings.retry_interval, self.settings.deadzone
        );
        let retry_interval = self.settings.retry_interval;
        let snapshot = self.snapshot.clone();
        let mut reader = self;

        let result = loop {
            if cancel.is_cancelled() {
                break Ok(());
            }

            reader = match reader.search().await {
                Ok(SearchOutcome::Found(connected)) => {
                    let (searching, end) = connected.read_until_lost(&cancel).await;
                    match end {
                        ReadEnd::Lost(e) => error!("Joystick disconnected: {}", e),
                        ReadEnd::Cancelled => debug!("Read loop cancelled"),
                    }
                    searching
                }
                Ok(SearchOutcome::NotFound(searching)) => searching,
                // the device source is gone, nothing left to scan with
                Err(e) => break Err(e),
            };

            if !wait_or_cancel(&cancel, retry_interval).await {
                break Ok(());
            }
        };

        snapshot.disconnect();
        info!("Input reader stopped");
        result
    }
}

impl InputReader<Connected> {
    pub fn connection(&self) -> Option<&ConnectionInfo> {
        self.get_state_data()
    }

    /// Reads events until the device fails or `cancel` fires
    ///
    /// Always hands back a searching reader with the snapshot discarded.
    pub async fn read_until_lost(
        mut self,
        cancel: &CancellationToken,
    ) -> (InputReader<Searching>, ReadEnd) {
        let device_name = self
            .connection()
            .map(|info| info.device_name.clone())
            .unwrap_or_default();
        let mut event_count: u64 = 0;

        let end = loop {
            let Some(stream) = self.stream.take() else {
                break ReadEnd::Lost(DeviceError::StreamClosed);
            };

            // A cancelled fetch leaves the stream with the blocking worker,
            // which drops it when the read returns.
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                fetched = off_thread(stream, |stream| stream.fetch()) => Some(fetched),
            };

            match fetched {
                None => break ReadEnd::Cancelled,
                Some(Ok((stream, Ok(events)))) => {
                    event_count += self.apply_events(&events);
                    self.stream = Some(stream);
                }
                Some(Ok((_, Err(e)))) | Some(Err(e)) => break ReadEnd::Lost(e),
            }
        };

        self.snapshot.disconnect();
        self.stream = None;
        if let Some(info) = self.connection() {
            let held = Local::now() - info.connected_at;
            info!(
                "Joystick {} released after {}s, {} mapped events",
                device_name,
                held.num_seconds(),
                event_count
            );
        }
        (self.transition(), end)
    }

    // Returns how many events hit a mapped channel
    fn apply_events(&self, events: &[RawInputEvent]) -> u64 {
        let mut applied = 0;
        for event in events {
            match event.resolve() {
                Some((channel, value)) => {
                    if self.snapshot.update(channel, value, self.settings.deadzone) {
                        applied += 1;
                    }
                }
                None => debug!("Ignoring unmapped event {:?}", event),
            }
        }
        applied
    }
}

/// Spawns the reader loop for a device source
pub struct ReaderHandle;

impl ReaderHandle {
    pub fn spawn(
        source: Box<dyn DeviceSource>,
        settings: ReaderSettings,
        snapshot: SnapshotCell,
        cancel: CancellationToken,
    ) -> JoinHandle<Result<(), DeviceError>> {
        info!("Spawning input reader task");
        let reader = InputReader::create(source, settings, snapshot);
        tokio::spawn(reader.run(cancel))
    }
}

// Runs a blocking device call against an owned value on the blocking pool and
// hands the value back alongside the result. A panicking call becomes a
// `Worker` error and the value survives it; only a cancelled worker loses it.
async fn off_thread<T, R, F>(value: T, call: F) -> Result<(T, Result<R, DeviceError>), DeviceError>
where
    T: Send + 'static,
    R: Send + 'static,
    F: FnOnce(&mut T) -> Result<R, DeviceError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut value = value;
        let result = panic::catch_unwind(AssertUnwindSafe(|| call(&mut value)))
            .unwrap_or_else(|_| Err(DeviceError::Worker("device call panicked".to_string())));
        (value, result)
    })
    .await
    .map_err(|e| DeviceError::Worker(e.to_string()))
}

async fn wait_or_cancel(cancel: &CancellationToken, period: Duration) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(period) => true,
    }
}
