//! Fixed-rate telemetry publisher
//!
//! Every tick reads the shared snapshot, sends one [`TelemetryMessage`]
//! datagram, then waits briefly for one inbound control message. Sends are
//! fire-and-forget; a failed send is retried by the next tick, not within it.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use tokio::net::UdpSocket;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::commands::CommandLatch;
use super::message::{ControlMessage, TelemetryMessage, MESSAGE_RATE};
use super::TelemetryError;
use crate::controller::SnapshotCell;

/// Default destination for telemetry datagrams
pub const PUBLISH_PORT: u16 = 8830;

/// Default port for inbound control messages
pub const CONTROL_PORT: u16 = 8840;

// Largest UDP payload
const RECV_BUFFER_SIZE: usize = 65_536;

#[derive(Clone, Debug)]
pub struct PublisherSettings {
    /// Where telemetry datagrams are sent
    pub publish_addr: SocketAddr,
    /// Local address the control socket binds to
    pub control_addr: SocketAddr,
    /// Messages per second, also carried in every message
    pub message_rate: u32,
    /// How long each tick waits for a control message; keep below one period
    pub receive_timeout: Duration,
    /// Send an all-neutral message while no controller is attached
    pub publish_when_disconnected: bool,
    /// How often throughput is logged
    pub stats_interval: Duration,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            publish_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, PUBLISH_PORT)),
            control_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, CONTROL_PORT)),
            message_rate: MESSAGE_RATE,
            receive_timeout: Duration::from_millis(10),
            publish_when_disconnected: true,
            stats_interval: Duration::from_secs(10),
        }
    }
}

impl PublisherSettings {
    /// Time between ticks
    pub fn period(&self) -> Duration {
        Duration::from_secs(1) / self.message_rate.max(1)
    }
}

/// Counters reported periodically and returned when the publisher stops
#[derive(Clone, Debug, Default)]
pub struct PublisherStats {
    pub ticks: u64,
    pub sent: u64,
    pub send_failures: u64,
    pub skipped: u64,
    pub control_received: u64,
    pub last_control_at: Option<DateTime<Local>>,
}

pub struct TelemetryPublisher {
    outbound: UdpSocket,
    inbound: UdpSocket,
    settings: PublisherSettings,
    snapshot: SnapshotCell,
    commands: CommandLatch,
    stats: PublisherStats,
    recv_buffer: Vec<u8>,
}

impl TelemetryPublisher {
    /// Binds the outbound and control sockets
    pub async fn bind(
        settings: PublisherSettings,
        snapshot: SnapshotCell,
        commands: CommandLatch,
    ) -> Result<Self, TelemetryError> {
        let local: SocketAddr = if settings.publish_addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let outbound = UdpSocket::bind(local)
            .await
            .map_err(|source| TelemetryError::Bind { addr: local, source })?;
        let inbound = UdpSocket::bind(settings.control_addr)
            .await
            .map_err(|source| TelemetryError::Bind {
                addr: settings.control_addr,
                source,
            })?;

        info!(
            "Publishing on UDP {} at {} Hz, control messages on {}",
            settings.publish_addr,
            settings.message_rate,
            inbound.local_addr().unwrap_or(settings.control_addr)
        );

        Ok(Self {
            outbound,
            inbound,
            settings,
            snapshot,
            commands,
            stats: PublisherStats::default(),
            recv_buffer: vec![0; RECV_BUFFER_SIZE],
        })
    }

    /// Address the control socket actually bound to
    pub fn control_addr(&self) -> std::io::Result<SocketAddr> {
        self.inbound.local_addr()
    }

    pub fn stats(&self) -> &PublisherStats {
        &self.stats
    }

    /// Message for the current tick, `None` when the tick should be skipped
    pub fn build_message(&self) -> Option<TelemetryMessage> {
        let rate = self.settings.message_rate;
        match self.snapshot.current() {
            Some(snapshot) => Some(TelemetryMessage::from_snapshot(&snapshot, rate)),
            None if self.settings.publish_when_disconnected => {
                Some(TelemetryMessage::neutral(rate))
            }
            None => None,
        }
    }

    /// One publish/receive cycle
    pub async fn tick(&mut self) {
        self.stats.ticks += 1;

        match self.build_message() {
            Some(mut message) => {
                // pulses wait for a tick that actually sends
                self.commands.take().apply(&mut message);
                self.send(&message).await;
            }
            None => {
                self.stats.skipped += 1;
                // a pulse must not fire on a reconnect long after it was requested
                let dropped = self.commands.take();
                if !dropped.is_empty() {
                    info!("No controller connected, dropping pulses {:?}", dropped);
                }
                debug!("No controller connected, skipping publish");
            }
        }

        self.poll_control().await;
    }

    async fn send(&mut self, message: &TelemetryMessage) {
        let payload = match message.encode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode telemetry: {}", e);
                self.stats.send_failures += 1;
                return;
            }
        };

        match self.outbound.send_to(&payload, self.settings.publish_addr).await {
            Ok(_) => {
                self.stats.sent += 1;
                debug!("Published {:?}", message);
            }
            Err(e) => {
                self.stats.send_failures += 1;
                warn!("Failed to send telemetry to {}: {}", self.settings.publish_addr, e);
            }
        }
    }

    // Timeout is the normal case and stays silent.
    async fn poll_control(&mut self) {
        let received = tokio::time::timeout(
            self.settings.receive_timeout,
            self.inbound.recv_from(&mut self.recv_buffer),
        )
        .await;

        match received {
            Ok(Ok((len, from))) => {
                self.stats.control_received += 1;
                self.stats.last_control_at = Some(Local::now());
                match ControlMessage::decode(&self.recv_buffer[..len]) {
                    Ok(control) => info!("Control message from {}: {}", from, control.0),
                    Err(e) => warn!(
                        "Undecodable control message from {} ({} bytes): {}",
                        from, len, e
                    ),
                }
            }
            Ok(Err(e)) => warn!("Control socket receive failed: {}", e),
            Err(_) => {}
        }
    }

    /// Ticks at the configured rate until `cancel` fires
    pub async fn run(mut self, cancel: CancellationToken) -> PublisherStats {
        let mut ticker = tokio::time::interval(self.settings.period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut window_start = Instant::now();
        let mut window_sent = self.stats.sent;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.tick().await,
            }

            let elapsed = window_start.elapsed();
            if elapsed >= self.settings.stats_interval {
                let sent = self.stats.sent - window_sent;
                info!(
                    "Telemetry stats: sent {} messages in last {} seconds (avg {:.2}/sec), \
                     {} failed, {} skipped, {} control received",
                    sent,
                    elapsed.as_secs(),
                    sent as f64 / elapsed.as_secs_f64(),
                    self.stats.send_failures,
                    self.stats.skipped,
                    self.stats.control_received
                );
                window_start = Instant::now();
                window_sent = self.stats.sent;
            }
        }

        info!(
            "Telemetry publisher stopped after {} ticks ({} sent)",
            self.stats.ticks, self.stats.sent
        );
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::snapshot::DEFAULT_DEADZONE;
    use crate::controller::Channel;
    use crate::telemetry::commands::Command;

    fn loopback() -> SocketAddr {
        (Ipv4Addr::LOCALHOST, 0).into()
    }

    async fn sink() -> UdpSocket {
        UdpSocket::bind(loopback()).await.unwrap()
    }

    fn settings_for(sink: &UdpSocket) -> PublisherSettings {
        PublisherSettings {
            publish_addr: sink.local_addr().unwrap(),
            control_addr: loopback(),
            ..PublisherSettings::default()
        }
    }

    async fn next_message(sink: &UdpSocket) -> TelemetryMessage {
        let mut buf = vec![0; RECV_BUFFER_SIZE];
        let len = tokio::time::timeout(Duration::from_secs(1), sink.recv(&mut buf))
            .await
            .expect("no datagram received")
            .unwrap();
        TelemetryMessage::decode(&buf[..len]).unwrap()
    }

    #[tokio::test]
    async fn publishes_neutral_while_disconnected() {
        let sink = sink().await;
        let mut publisher =
            TelemetryPublisher::bind(settings_for(&sink), SnapshotCell::new(), CommandLatch::new())
                .await
                .unwrap();

        publisher.tick().await;
        assert_eq!(next_message(&sink).await, TelemetryMessage::neutral(MESSAGE_RATE));
        assert_eq!(publisher.stats().sent, 1);
    }

    #[tokio::test]
    async fn skips_ticks_when_configured() {
        let sink = sink().await;
        let settings = PublisherSettings {
            publish_when_disconnected: false,
            ..settings_for(&sink)
        };
        let mut publisher =
            TelemetryPublisher::bind(settings, SnapshotCell::new(), CommandLatch::new())
                .await
                .unwrap();

        publisher.tick().await;
        publisher.tick().await;
        assert_eq!(publisher.stats().skipped, 2);
        assert_eq!(publisher.stats().sent, 0);

        let mut buf = [0u8; 64];
        let nothing = tokio::time::timeout(Duration::from_millis(100), sink.recv(&mut buf)).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn publishes_current_snapshot() {
        let sink = sink().await;
        let cell = SnapshotCell::new();
        cell.connect();
        cell.update(Channel::LeftStickX, Channel::LeftStickX.normalize(16384), DEFAULT_DEADZONE);
        cell.update(Channel::LeftStickY, Channel::LeftStickY.normalize(-16384), DEFAULT_DEADZONE);
        cell.update(Channel::Triangle, Channel::Triangle.normalize(1), DEFAULT_DEADZONE);

        let mut publisher = TelemetryPublisher::bind(settings_for(&sink), cell, CommandLatch::new())
            .await
            .unwrap();
        publisher.tick().await;

        let message = next_message(&sink).await;
        assert_eq!((message.lx, message.ly), (0.5, 0.5));
        assert_eq!(message.triangle, 1);
        assert_eq!(message.message_rate, 20);
    }

    #[tokio::test]
    async fn pulses_appear_in_exactly_one_message() {
        let sink = sink().await;
        let latch = CommandLatch::new();
        let mut publisher =
            TelemetryPublisher::bind(settings_for(&sink), SnapshotCell::new(), latch.clone())
                .await
                .unwrap();

        latch.request(Command::Trot);
        publisher.tick().await;
        publisher.tick().await;

        let first = next_message(&sink).await;
        let second = next_message(&sink).await;
        assert_eq!((first.l1, first.r1), (0, 1));
        assert_eq!((second.l1, second.r1), (0, 0));
    }

    #[tokio::test]
    async fn skipped_ticks_drop_pending_pulses() {
        let sink = sink().await;
        let settings = PublisherSettings {
            publish_when_disconnected: false,
            ..settings_for(&sink)
        };
        let cell = SnapshotCell::new();
        let latch = CommandLatch::new();
        let mut publisher = TelemetryPublisher::bind(settings, cell.clone(), latch.clone())
            .await
            .unwrap();

        latch.request(Command::Active);
        publisher.tick().await;
        assert_eq!(publisher.stats().skipped, 1);

        cell.connect();
        publisher.tick().await;
        let message = next_message(&sink).await;
        assert_eq!((message.l1, message.r1), (0, 0));
    }

    #[tokio::test]
    async fn send_failures_do_not_stop_ticking() {
        // no SO_BROADCAST on the outbound socket, so every send_to fails
        let settings = PublisherSettings {
            publish_addr: (Ipv4Addr::BROADCAST, PUBLISH_PORT).into(),
            control_addr: loopback(),
            ..PublisherSettings::default()
        };
        let mut publisher =
            TelemetryPublisher::bind(settings, SnapshotCell::new(), CommandLatch::new())
                .await
                .unwrap();
        let control = publisher.control_addr().unwrap();

        publisher.tick().await;
        publisher.tick().await;
        assert_eq!(publisher.stats().ticks, 2);
        assert_eq!(publisher.stats().sent, 0);
        assert_eq!(publisher.stats().send_failures, 2);

        // the control side of a failed tick still runs
        let sender = UdpSocket::bind(loopback()).await.unwrap();
        sender
            .send_to(br#"{"mode": "rest"}"#, (Ipv4Addr::LOCALHOST, control.port()))
            .await
            .unwrap();
        publisher.tick().await;
        assert_eq!(publisher.stats().send_failures, 3);
        assert_eq!(publisher.stats().control_received, 1);

        // and the run loop keeps retrying every period
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(publisher.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
        let stats = handle.await.unwrap();
        assert!(stats.ticks > 3, "only {} ticks", stats.ticks);
        assert_eq!(stats.sent, 0);
        assert_eq!(stats.send_failures, stats.ticks);
    }

    #[tokio::test]
    async fn observes_control_messages() {
        let sink = sink().await;
        let mut publisher =
            TelemetryPublisher::bind(settings_for(&sink), SnapshotCell::new(), CommandLatch::new())
                .await
                .unwrap();
        let control = publisher.control_addr().unwrap();

        let sender = UdpSocket::bind(loopback()).await.unwrap();
        sender
            .send_to(br#"{"command": "stand"}"#, (Ipv4Addr::LOCALHOST, control.port()))
            .await
            .unwrap();
        sender
            .send_to(b"not json", (Ipv4Addr::LOCALHOST, control.port()))
            .await
            .unwrap();

        // one inbound message per tick
        publisher.tick().await;
        assert_eq!(publisher.stats().control_received, 1);
        publisher.tick().await;
        assert_eq!(publisher.stats().control_received, 2);
        assert!(publisher.stats().last_control_at.is_some());
        publisher.tick().await;
        assert_eq!(publisher.stats().control_received, 2);
    }

    #[tokio::test]
    async fn sends_twenty_messages_per_second() {
        let sink = sink().await;
        let publisher =
            TelemetryPublisher::bind(settings_for(&sink), SnapshotCell::new(), CommandLatch::new())
                .await
                .unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(publisher.run(cancel.clone()));

        let mut buf = vec![0; RECV_BUFFER_SIZE];
        let mut arrivals = Vec::new();
        let window = Instant::now() + Duration::from_secs(1);
        while Instant::now() < window {
            let remaining = window.saturating_duration_since(Instant::now());
            if let Ok(Ok(_)) = tokio::time::timeout(remaining, sink.recv(&mut buf)).await {
                arrivals.push(Instant::now());
            }
        }
        cancel.cancel();
        let stats = handle.await.unwrap();

        assert!(
            (18..=22).contains(&arrivals.len()),
            "got {} datagrams in one second",
            arrivals.len()
        );
        assert!(stats.sent >= arrivals.len() as u64);
        assert_eq!(stats.control_received, 0);

        // idle control receives never stretch a tick past one period
        let period = Duration::from_millis(50);
        for pair in arrivals.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap < period * 2, "tick gap {:?}", gap);
        }
    }

    #[test]
    fn period_follows_rate() {
        let settings = PublisherSettings::default();
        assert_eq!(settings.period(), Duration::from_millis(50));
        let settings = PublisherSettings {
            message_rate: 0,
            ..PublisherSettings::default()
        };
        assert_eq!(settings.period(), Duration::from_secs(1));
    }
}
