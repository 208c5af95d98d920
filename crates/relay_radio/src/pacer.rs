//! The outbound send pacer (spec C4, §4.4, §4.8).
//!
//! A single consumer drains a FIFO queue and sleeps at least
//! `message_delay` (floor 2.1s) between sends, so the mesh never sees a
//! burst of back-to-back packets. While the connection is reconnecting
//! the pacer blocks rather than dropping or failing a send — it waits
//! for the link to come back and then delivers in order.

use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;

use crate::transport::{MeshGateway, TransportError};

pub const MESSAGE_DELAY_FLOOR: Duration = Duration::from_millis(2100);

#[derive(Debug)]
pub struct SendRequest {
    pub text: String,
    pub destination: u32,
    pub channel: u8,
    pub want_ack: bool,
    pub reply: Option<oneshot::Sender<Result<(), TransportError>>>,
}

/// Clamp a configured `message_delay`/`response_delay` to the floor,
/// logging a warning the first time a given value is clamped (spec §4.4:
/// "one-shot-per-distinct-value clamp warning").
pub fn clamp_delay(configured_secs: f64, already_warned: &mut std::collections::HashSet<u64>) -> Duration {
    let configured = Duration::from_secs_f64(configured_secs.max(0.0));
    if configured >= MESSAGE_DELAY_FLOOR {
        return configured;
    }
    let key = configured_secs.to_bits();
    if already_warned.insert(key) {
        tracing::warn!(
            configured_secs,
            floor_secs = MESSAGE_DELAY_FLOOR.as_secs_f64(),
            "meshtastic.message_delay below floor, clamping"
        );
    }
    MESSAGE_DELAY_FLOOR
}

pub struct SendPacer {
    delay: Duration,
    queue: mpsc::UnboundedReceiver<SendRequest>,
}

#[derive(Clone)]
pub struct SendPacerHandle {
    queue: mpsc::UnboundedSender<SendRequest>,
}

impl SendPacerHandle {
    /// Enqueue a send, fire-and-forget.
    pub fn enqueue(&self, request: SendRequest) {
        // The pacer task owns the receiver for the process lifetime; a
        // send error here means it has already shut down.
        let _ = self.queue.send(request);
    }
}

impl SendPacer {
    pub fn new(delay: Duration) -> (Self, SendPacerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { delay, queue: rx }, SendPacerHandle { queue: tx })
    }

    /// Drain the queue through `gateway` until the channel closes (every
    /// handle dropped, i.e. shutdown), pacing every two sends at least
    /// `self.delay` apart and blocking (not dropping) while the gateway
    /// reports itself disconnected.
    pub async fn run(&mut self, gateway: &mut dyn MeshGateway) {
        let mut last_sent: Option<Instant> = None;
        while let Some(request) = self.queue.recv().await {
            while !gateway.is_connected() {
                sleep(Duration::from_millis(200)).await;
            }
            if let Some(last) = last_sent {
                let elapsed = last.elapsed();
                if elapsed < self.delay {
                    sleep(self.delay - elapsed).await;
                }
            }
            let result = gateway
                .send_text(&request.text, request.destination, request.channel, request.want_ack)
                .await;
            last_sent = Some(Instant::now());
            if let Some(reply) = request.reply {
                let _ = reply.send(result);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn clamp_leaves_values_at_or_above_floor_untouched() {
        let mut warned = HashSet::new();
        assert_eq!(clamp_delay(3.0, &mut warned), Duration::from_secs_f64(3.0));
        assert!(warned.is_empty());
    }

    #[test]
    fn clamp_raises_values_below_floor_and_warns_once() {
        let mut warned = HashSet::new();
        assert_eq!(clamp_delay(0.5, &mut warned), MESSAGE_DELAY_FLOOR);
        assert_eq!(warned.len(), 1);
        // Same distinct value again: still clamped, no new warning entry.
        assert_eq!(clamp_delay(0.5, &mut warned), MESSAGE_DELAY_FLOOR);
        assert_eq!(warned.len(), 1);
    }

    struct MockGateway {
        connected: bool,
        sent: Vec<String>,
    }

    #[async_trait::async_trait]
    impl MeshGateway for MockGateway {
        async fn connect(&mut self) -> Result<(), TransportError> {
            self.connected = true;
            Ok(())
        }
        async fn disconnect(&mut self) {
            self.connected = false;
        }
        async fn recv(&mut self) -> Option<crate::transport::RadioPacket> {
            None
        }
        async fn send_text(
            &mut self,
            text: &str,
            _destination: u32,
            _channel: u8,
            _want_ack: bool,
        ) -> Result<(), TransportError> {
            self.sent.push(text.to_string());
            Ok(())
        }
        fn is_connected(&self) -> bool {
            self.connected
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pacer_spaces_sends_by_at_least_the_configured_delay() {
        let (mut pacer, handle) = SendPacer::new(Duration::from_millis(2100));
        let mut gateway = MockGateway { connected: true, sent: Vec::new() };

        handle.enqueue(SendRequest {
            text: "one".into(),
            destination: 0xFFFF_FFFF,
            channel: 0,
            want_ack: false,
            reply: None,
        });
        handle.enqueue(SendRequest {
            text: "two".into(),
            destination: 0xFFFF_FFFF,
            channel: 0,
            want_ack: false,
            reply: None,
        });
        drop(handle);

        let start = tokio::time::Instant::now();
        pacer.run(&mut gateway).await;
        assert_eq!(gateway.sent, vec!["one".to_string(), "two".to_string()]);
        assert!(start.elapsed() >= Duration::from_millis(2100));
    }
}
