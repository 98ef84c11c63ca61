//! Periodic liveness datagrams sent to the worker while it runs.
//!
//! The worker terminates itself when heartbeats stop arriving, which lets it
//! release the camera on its own before any signal is sent. Each tick sends a
//! single [`HEARTBEAT_MARKER`] byte to the loopback heartbeat port.
//!
//! Sends are gated by a flag behind a mutex. [`HeartbeatHandle::deactivate`]
//! and [`HeartbeatHandle::deactivate_blocking`] close the gate while holding
//! the lock, so once either returns no further datagram can leave.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use once_cell::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pose_sidecar_config::HEARTBEAT_MARKER;

const HEARTBEAT_TARGET: &str = "pose_sidecar::heartbeat";

/// Destination for heartbeat datagrams.
pub trait HeartbeatSink: Send + Sync {
    /// Sends `payload` to `destination` without waiting for a reply.
    fn send(&self, destination: SocketAddr, payload: &[u8]) -> io::Result<()>;
}

impl<T> HeartbeatSink for Arc<T>
where
    T: HeartbeatSink + ?Sized,
{
    fn send(&self, destination: SocketAddr, payload: &[u8]) -> io::Result<()> {
        (**self).send(destination, payload)
    }
}

/// Sends heartbeats over UDP from an ephemeral loopback port.
#[derive(Debug, Default)]
pub struct UdpHeartbeatSink {
    v4: OnceCell<UdpSocket>,
    v6: OnceCell<UdpSocket>,
}

impl UdpHeartbeatSink {
    /// Builds a sink; sockets are bound on first use per address family.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn socket_for(&self, destination: SocketAddr) -> io::Result<&UdpSocket> {
        match destination {
            SocketAddr::V4(_) => self
                .v4
                .get_or_try_init(|| UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))),
            SocketAddr::V6(_) => self
                .v6
                .get_or_try_init(|| UdpSocket::bind((Ipv6Addr::LOCALHOST, 0))),
        }
    }
}

impl HeartbeatSink for UdpHeartbeatSink {
    fn send(&self, destination: SocketAddr, payload: &[u8]) -> io::Result<()> {
        self.socket_for(destination)?
            .send_to(payload, destination)
            .map(|_| ())
    }
}

/// Schedules heartbeats on the async runtime.
#[derive(Clone)]
pub struct HeartbeatEmitter {
    sink: Arc<dyn HeartbeatSink>,
}

impl HeartbeatEmitter {
    /// Builds an emitter writing to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn HeartbeatSink>) -> Self {
        Self { sink }
    }

    /// Starts emitting to `destination` every `interval`, beginning now.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn activate(&self, destination: SocketAddr, interval: Duration) -> HeartbeatHandle {
        let gate = Arc::new(Mutex::new(true));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(
            Arc::clone(&self.sink),
            Arc::clone(&gate),
            cancel.clone(),
            destination,
            interval,
        ));
        info!(
            target: HEARTBEAT_TARGET,
            destination = %destination,
            interval_ms = interval.as_millis(),
            "heartbeat activated"
        );
        HeartbeatHandle {
            gate,
            cancel,
            task: Some(task),
            destination,
        }
    }
}

impl std::fmt::Debug for HeartbeatEmitter {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("HeartbeatEmitter").finish_non_exhaustive()
    }
}

/// Owns a running heartbeat schedule; dropping it stops the schedule.
#[derive(Debug)]
pub struct HeartbeatHandle {
    gate: Arc<Mutex<bool>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    destination: SocketAddr,
}

impl HeartbeatHandle {
    /// Address heartbeats are sent to.
    #[must_use]
    pub const fn destination(&self) -> SocketAddr {
        self.destination
    }

    /// Whether heartbeats may still be sent.
    #[must_use]
    pub fn is_active(&self) -> bool {
        *lock(&self.gate)
    }

    /// Stops the schedule and waits for its task to finish.
    pub async fn deactivate(mut self) {
        self.close();
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                debug!(
                    target: HEARTBEAT_TARGET,
                    error = %error,
                    "heartbeat task ended abnormally"
                );
            }
        }
    }

    /// Stops the schedule without awaiting the task.
    pub fn deactivate_blocking(mut self) {
        self.close();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn close(&self) {
        let mut open = lock(&self.gate);
        if *open {
            *open = false;
            info!(
                target: HEARTBEAT_TARGET,
                destination = %self.destination,
                "heartbeat silenced"
            );
        }
        drop(open);
        self.cancel.cancel();
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.close();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run(
    sink: Arc<dyn HeartbeatSink>,
    gate: Arc<Mutex<bool>>,
    cancel: CancellationToken,
    destination: SocketAddr,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => emit(sink.as_ref(), &gate, destination),
        }
    }
}

fn emit(sink: &dyn HeartbeatSink, gate: &Mutex<bool>, destination: SocketAddr) {
    let open = lock(gate);
    if !*open {
        return;
    }
    if let Err(error) = sink.send(destination, &[HEARTBEAT_MARKER]) {
        warn!(
            target: HEARTBEAT_TARGET,
            destination = %destination,
            error = %error,
            "failed to send heartbeat"
        );
    }
    drop(open);
}

fn lock(gate: &Mutex<bool>) -> MutexGuard<'_, bool> {
    gate.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSink {
        sent: AtomicUsize,
        payloads: Mutex<Vec<Vec<u8>>>,
    }

    impl HeartbeatSink for CountingSink {
        fn send(&self, _destination: SocketAddr, payload: &[u8]) -> io::Result<()> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            self.payloads
                .lock()
                .expect("payload mutex poisoned")
                .push(payload.to_vec());
            Ok(())
        }
    }

    fn destination() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 4244))
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_on_the_configured_interval() {
        let sink = Arc::new(CountingSink::default());
        let emitter = HeartbeatEmitter::new(sink.clone());
        let handle = emitter.activate(destination(), Duration::from_millis(500));

        tokio::time::sleep(Duration::from_millis(1_250)).await;
        handle.deactivate().await;

        // Ticks at 0, 500 and 1000 ms.
        assert_eq!(sink.sent.load(Ordering::SeqCst), 3);
        let payloads = sink.payloads.lock().expect("payload mutex poisoned");
        assert!(payloads.iter().all(|payload| payload.as_slice() == b"H"));
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_is_sent_after_deactivation() {
        let sink = Arc::new(CountingSink::default());
        let emitter = HeartbeatEmitter::new(sink.clone());
        let handle = emitter.activate(destination(), Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(350)).await;
        handle.deactivate_blocking();
        let sent = sink.sent.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(sink.sent.load(Ordering::SeqCst), sent);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_the_schedule() {
        let sink = Arc::new(CountingSink::default());
        let emitter = HeartbeatEmitter::new(sink.clone());
        let handle = emitter.activate(destination(), Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(handle.is_active());
        drop(handle);
        let sent = sink.sent.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(sink.sent.load(Ordering::SeqCst), sent);
    }

    #[test]
    fn udp_sink_delivers_the_marker_byte() {
        let receiver = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind receiver");
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .expect("set timeout");
        let address = receiver.local_addr().expect("receiver address");

        UdpHeartbeatSink::new()
            .send(address, &[HEARTBEAT_MARKER])
            .expect("send heartbeat");

        let mut buffer = [0_u8; 8];
        let (length, _) = receiver.recv_from(&mut buffer).expect("receive heartbeat");
        assert_eq!(&buffer[..length], b"H");
    }
}
