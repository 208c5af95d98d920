//! The radio connection/reconnect engine (spec C3, §4.3, §8 scenario 5).
//!
//! Connect once at startup; on any read/write failure, keep retrying with
//! exponential backoff (10s initial, doubling, capped at 300s) until
//! either it reconnects or shutdown is requested. `reconnecting` and
//! `shutting_down` are exposed so callers (the pacer, the inbound-radio
//! loop) can tell a transient outage from an intentional stop.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::cancel::CancellationToken;
use crate::transport::{MeshGateway, RadioPacket, TransportError};

#[derive(Debug, Clone, Copy)]
pub struct ReconnectConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// How long to wait for a packet before running the liveness probe
    /// (spec §4.3 step 4: "periodic liveness probe, e.g. every 60s").
    pub health_check_interval: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(300),
            health_check_interval: Duration::from_secs(60),
        }
    }
}

impl ReconnectConfig {
    /// The exact backoff sequence for a run of consecutive failures,
    /// starting from `initial_delay` and doubling until `max_delay` caps
    /// it (spec §8 scenario 5: 10, 20, 40, 80, 160, 300, 300, ...).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let doublings = attempt.min(32);
        let scaled = self.initial_delay.saturating_mul(1u32.checked_shl(doublings).unwrap_or(u32::MAX));
        scaled.min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    Connected,
    Disconnected { error: String },
    Reconnecting { attempt: u32, delay: Duration },
    ShutDown,
}

/// Drives a [`MeshGateway`] through connect / fail / backoff / reconnect,
/// forwarding decoded packets and lifecycle events to the core.
pub struct ConnectionEngine<G: MeshGateway> {
    gateway: G,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
    reconnecting: bool,
    /// Set by [`Self::new_preconnected`] so the first outer-loop iteration
    /// skips redialing a gateway the caller already connected (used when
    /// startup needs `my_node_id` before the engine task exists).
    already_connected: bool,
}

impl<G: MeshGateway> ConnectionEngine<G> {
    pub fn new(gateway: G, reconnect: ReconnectConfig, cancel: CancellationToken) -> Self {
        Self { gateway, reconnect, cancel, reconnecting: false, already_connected: false }
    }

    /// Like [`Self::new`], but `gateway` has already been connected by the
    /// caller (e.g. to learn `my_node_id` during startup) and `run` should
    /// not immediately redial it.
    pub fn new_preconnected(gateway: G, reconnect: ReconnectConfig, cancel: CancellationToken) -> Self {
        Self { gateway, reconnect, cancel, reconnecting: false, already_connected: true }
    }

    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run the connect/reconnect loop, sending every decoded packet to
    /// `packets` and every lifecycle transition to `events`, until
    /// shutdown is requested. Returns once the cancellation token fires
    /// and the gateway has been disconnected.
    pub async fn run(
        &mut self,
        packets: mpsc::UnboundedSender<RadioPacket>,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) {
        let mut attempt: u32 = 0;
        let mut skip_dial = self.already_connected;
        loop {
            if self.cancel.is_cancelled() {
                self.gateway.disconnect().await;
                let _ = events.send(ConnectionEvent::ShutDown);
                return;
            }

            if skip_dial {
                skip_dial = false;
                attempt = 0;
                self.reconnecting = false;
                let _ = events.send(ConnectionEvent::Connected);
            } else {
                match self.gateway.connect().await {
                    Ok(()) => {
                        attempt = 0;
                        self.reconnecting = false;
                        let _ = events.send(ConnectionEvent::Connected);
                    }
                    Err(err) => {
                        let delay = self.begin_reconnect(&events, err.to_string(), &mut attempt);
                        sleep(delay).await;
                        continue;
                    }
                }
            }

            loop {
                if self.cancel.is_cancelled() {
                    self.gateway.disconnect().await;
                    let _ = events.send(ConnectionEvent::ShutDown);
                    return;
                }
                // Step 4: the link is probed whenever it's been quiet for
                // `health_check_interval` rather than on every packet, so a
                // chatty channel never pays for the probe at all. Timing
                // out `recv` (rather than racing it against a separate
                // probe future) drops the borrow on `self.gateway` before
                // `probe` needs its own `&mut self.gateway`.
                match tokio::time::timeout(self.reconnect.health_check_interval, self.gateway.recv()).await {
                    Ok(Some(packet)) => {
                        if packets.send(packet).is_err() {
                            return;
                        }
                    }
                    Ok(None) => {
                        let delay = self.begin_reconnect(&events, TransportError::Closed.to_string(), &mut attempt);
                        sleep(delay).await;
                        break;
                    }
                    Err(_elapsed) => {
                        if self.gateway.probe().await {
                            continue;
                        }
                        let delay =
                            self.begin_reconnect(&events, "health check probe failed".to_string(), &mut attempt);
                        sleep(delay).await;
                        break;
                    }
                }
            }
        }
    }

    /// Mark the link down, emit the `Disconnected`/`Reconnecting` event
    /// pair for attempt `attempt`, advance it, and return the backoff
    /// delay to sleep before redialing. Shared by the connect failure,
    /// "recv returned none", and "probe failed" triggers for reconnect.
    fn begin_reconnect(&mut self, events: &mpsc::UnboundedSender<ConnectionEvent>, error: String, attempt: &mut u32) -> Duration {
        let delay = self.reconnect.delay_for_attempt(*attempt);
        self.reconnecting = true;
        let _ = events.send(ConnectionEvent::Disconnected { error });
        let _ = events.send(ConnectionEvent::Reconnecting { attempt: *attempt, delay });
        *attempt = attempt.saturating_add(1);
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RadioPacket;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let config = ReconnectConfig::default();
        let expected = [10, 20, 40, 80, 160, 300, 300];
        for (attempt, expected_secs) in expected.iter().enumerate() {
            assert_eq!(
                config.delay_for_attempt(attempt as u32),
                Duration::from_secs(*expected_secs)
            );
        }
    }

    /// A gateway that never closes (`recv` hangs forever) but whose
    /// `probe` reports dead after `fail_probe_after` calls, modeling a
    /// wedged-but-still-open link.
    struct WedgingGateway {
        connect_calls: Arc<AtomicU32>,
        probe_calls: Arc<AtomicU32>,
        fail_probe_after: u32,
    }

    #[async_trait::async_trait]
    impl MeshGateway for WedgingGateway {
        async fn connect(&mut self) -> Result<(), TransportError> {
            self.connect_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn disconnect(&mut self) {}
        async fn recv(&mut self) -> Option<RadioPacket> {
            std::future::pending().await
        }
        async fn probe(&mut self) -> bool {
            self.probe_calls.fetch_add(1, Ordering::SeqCst) < self.fail_probe_after
        }
        async fn send_text(
            &mut self,
            _text: &str,
            _destination: u32,
            _channel: u8,
            _want_ack: bool,
        ) -> Result<(), TransportError> {
            Ok(())
        }
        fn is_connected(&self) -> bool {
            true
        }
    }

    #[tokio::test(start_paused = true)]
    async fn health_check_probe_failure_triggers_reconnect() {
        let connect_calls = Arc::new(AtomicU32::new(0));
        let probe_calls = Arc::new(AtomicU32::new(0));
        let gateway = WedgingGateway {
            connect_calls: connect_calls.clone(),
            probe_calls: probe_calls.clone(),
            fail_probe_after: 1,
        };
        let reconnect = ReconnectConfig {
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(300),
            health_check_interval: Duration::from_secs(60),
        };
        let cancel = CancellationToken::new();
        let mut engine = ConnectionEngine::new(gateway, reconnect, cancel.clone());
        let (packets_tx, _packets_rx) = mpsc::unbounded_channel();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let cancel_for_task = cancel.clone();
        let run_task = tokio::spawn(async move {
            engine.run(packets_tx, events_tx).await;
        });

        // First probe (at the first health-check tick) reports alive;
        // the second reports dead and should trigger a reconnect.
        assert!(matches!(events_rx.recv().await, Some(ConnectionEvent::Connected)));
        tokio::time::advance(Duration::from_secs(60)).await;
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(matches!(events_rx.recv().await, Some(ConnectionEvent::Disconnected { .. })));
        assert!(matches!(events_rx.recv().await, Some(ConnectionEvent::Reconnecting { attempt: 0, .. })));
        assert!(probe_calls.load(Ordering::SeqCst) >= 2);
        assert_eq!(connect_calls.load(Ordering::SeqCst), 1);

        cancel_for_task.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(600), run_task).await;
    }
}
