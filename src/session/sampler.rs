//! Periodic resource sampling
//!
//! Runs alongside a log session on the same transport. Sampling is
//! best-effort: a failed probe or unparseable output skips the tick and the
//! loop keeps going. Transport death surfaces on the log stream, never here.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::probe::{parse_resource_sample, ProbeSet};
use crate::gateway::protocol::{ClientSink, ServerEvent};
use crate::ssh::Transport;

pub(crate) async fn run_sampler(
    transport: Arc<dyn Transport>,
    probes: Arc<ProbeSet>,
    interval: Duration,
    sink: ClientSink,
    mut cancel_rx: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // interval's first tick completes immediately; the first sample should
    // land one full period after the session opened
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = cancel_rx.recv() => break,
            _ = ticker.tick() => {}
        }

        let output = tokio::select! {
            biased;
            _ = cancel_rx.recv() => break,
            result = transport.exec_capture(&probes.resource) => match result {
                Ok(output) => output,
                Err(err) => {
                    debug!("Resource probe failed: {}", err);
                    continue;
                }
            }
        };

        match parse_resource_sample(&output) {
            Some(sample) => {
                // The capture can complete in the same poll that delivers
                // the cancel; a sample must never surface after teardown
                if !matches!(cancel_rx.try_recv(), Err(TryRecvError::Empty)) {
                    break;
                }
                sink.emit(ServerEvent::ResourcesData { sample });
            }
            None => debug!("Dropping unparseable resource sample"),
        }
    }
}
