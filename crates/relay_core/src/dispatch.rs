//! Plugin dispatch (spec C8, §4.8).
//!
//! Plugins run in priority order (lower priority value first), with
//! plugin name as a stable tie-break so registration order never matters.
//! The first plugin to return [`PluginVerdict::Consumed`] stops the
//! pipeline; everything else falls through to the next plugin and,
//! ultimately, to the core's own default handling. A plugin that errors
//! is treated as passthrough rather than aborting dispatch for the rest
//! of the pipeline (spec §4.8 edge case: one broken plugin must not take
//! down message relaying).

use async_trait::async_trait;
use relay_protocol::{PluginDescriptor, PluginVerdict};

/// What a plugin was given to act on.
#[derive(Debug, Clone)]
pub enum DispatchInput {
    MeshText { channel: u8, from_node: u32, text: String },
    MatrixText { room_id: String, sender: String, text: String },
}

/// A plugin's reply, if it produced one alongside its verdict.
#[derive(Debug, Clone, Default)]
pub struct DispatchOutcome {
    pub verdict_consumed: bool,
    pub reply_text: Option<String>,
}

#[async_trait]
pub trait PluginHandler: Send + Sync {
    fn descriptor(&self) -> &PluginDescriptor;
    async fn handle(&self, input: &DispatchInput) -> anyhow::Result<DispatchOutcome>;
}

pub struct PluginRegistry {
    plugins: Vec<Box<dyn PluginHandler>>,
}

impl PluginRegistry {
    pub fn new(mut plugins: Vec<Box<dyn PluginHandler>>) -> Self {
        plugins.sort_by(|a, b| {
            a.descriptor()
                .priority
                .cmp(&b.descriptor().priority)
                .then_with(|| a.descriptor().name.cmp(&b.descriptor().name))
        });
        Self { plugins }
    }

    /// Run every active plugin in priority order against `input`, on the
    /// given mesh `channel` (None for Matrix-originated input, which
    /// isn't channel-scoped). Stops at the first `Consumed` verdict.
    pub async fn dispatch(&self, input: DispatchInput, channel: Option<u8>) -> PluginVerdict {
        for plugin in &self.plugins {
            if let Some(channel) = channel {
                if !plugin.descriptor().is_active_on_channel(channel) {
                    continue;
                }
            }
            match plugin.handle(&input).await {
                Ok(outcome) if outcome.verdict_consumed => return PluginVerdict::Consumed,
                Ok(_) => continue,
                Err(error) => {
                    tracing::warn!(
                        plugin = %plugin.descriptor().name,
                        %error,
                        "plugin handler errored, treating as passthrough"
                    );
                    continue;
                }
            }
        }
        PluginVerdict::Passthrough
    }
}

/// Clamp a plugin-declared `response_delay` to the same floor the send
/// pacer enforces, so a plugin can't starve the mesh by replying faster
/// than the pacer would otherwise allow.
pub fn clamp_response_delay(configured_secs: f64) -> std::time::Duration {
    let floor = relay_radio::pacer::MESSAGE_DELAY_FLOOR;
    std::time::Duration::from_secs_f64(configured_secs.max(0.0)).max(floor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct RecordingPlugin {
        descriptor: PluginDescriptor,
        consume: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PluginHandler for RecordingPlugin {
        fn descriptor(&self) -> &PluginDescriptor {
            &self.descriptor
        }

        async fn handle(&self, _input: &DispatchInput) -> anyhow::Result<DispatchOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(DispatchOutcome { verdict_consumed: self.consume, reply_text: None })
        }
    }

    struct ErroringPlugin {
        descriptor: PluginDescriptor,
    }

    #[async_trait]
    impl PluginHandler for ErroringPlugin {
        fn descriptor(&self) -> &PluginDescriptor {
            &self.descriptor
        }

        async fn handle(&self, _input: &DispatchInput) -> anyhow::Result<DispatchOutcome> {
            anyhow::bail!("boom")
        }
    }

    fn descriptor(name: &str, priority: i32) -> PluginDescriptor {
        PluginDescriptor {
            name: name.to_string(),
            priority,
            matrix_commands: HashSet::new(),
            mesh_commands: HashSet::new(),
            channels: HashSet::new(),
        }
    }

    fn sample_input() -> DispatchInput {
        DispatchInput::MeshText { channel: 0, from_node: 1, text: "hi".into() }
    }

    #[tokio::test]
    async fn lower_priority_value_runs_first() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        struct OrderRecorder {
            descriptor: PluginDescriptor,
            order: Arc<std::sync::Mutex<Vec<String>>>,
        }
        #[async_trait]
        impl PluginHandler for OrderRecorder {
            fn descriptor(&self) -> &PluginDescriptor {
                &self.descriptor
            }
            async fn handle(&self, _input: &DispatchInput) -> anyhow::Result<DispatchOutcome> {
                self.order.lock().unwrap().push(self.descriptor.name.clone());
                Ok(DispatchOutcome::default())
            }
        }
        let registry = PluginRegistry::new(vec![
            Box::new(OrderRecorder { descriptor: descriptor("second", 20), order: order.clone() }),
            Box::new(OrderRecorder { descriptor: descriptor("first", 10), order: order.clone() }),
        ]);
        registry.dispatch(sample_input(), Some(0)).await;
        assert_eq!(*order.lock().unwrap(), vec!["first".to_string(), "second".to_string()]);
    }

    #[tokio::test]
    async fn consumed_verdict_stops_the_pipeline() {
        let calls_a = Arc::new(AtomicUsize::new(0));
        let calls_b = Arc::new(AtomicUsize::new(0));
        let registry = PluginRegistry::new(vec![
            Box::new(RecordingPlugin { descriptor: descriptor("a", 1), consume: true, calls: calls_a.clone() }),
            Box::new(RecordingPlugin { descriptor: descriptor("b", 2), consume: true, calls: calls_b.clone() }),
        ]);
        let verdict = registry.dispatch(sample_input(), Some(0)).await;
        assert_eq!(verdict, PluginVerdict::Consumed);
        assert_eq!(calls_a.load(Ordering::SeqCst), 1);
        assert_eq!(calls_b.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn errored_plugin_is_treated_as_passthrough() {
        let calls_b = Arc::new(AtomicUsize::new(0));
        let registry = PluginRegistry::new(vec![
            Box::new(ErroringPlugin { descriptor: descriptor("a", 1) }),
            Box::new(RecordingPlugin { descriptor: descriptor("b", 2), consume: true, calls: calls_b.clone() }),
        ]);
        let verdict = registry.dispatch(sample_input(), Some(0)).await;
        assert_eq!(verdict, PluginVerdict::Consumed);
        assert_eq!(calls_b.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn plugin_inactive_on_channel_is_skipped() {
        let mut d = descriptor("channel-bound", 1);
        d.channels.insert(5);
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = PluginRegistry::new(vec![Box::new(RecordingPlugin {
            descriptor: d,
            consume: true,
            calls: calls.clone(),
        })]);
        let verdict = registry.dispatch(sample_input(), Some(0)).await;
        assert_eq!(verdict, PluginVerdict::Passthrough);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn response_delay_is_clamped_to_the_pacer_floor() {
        assert_eq!(clamp_response_delay(0.1), relay_radio::pacer::MESSAGE_DELAY_FLOOR);
        assert_eq!(
            clamp_response_delay(5.0),
            std::time::Duration::from_secs_f64(5.0)
        );
    }
}
