//! The reconciliation loop task.
//!
//! [`run_reconciliation`] owns the [`ReconciliationEngine`] for its whole
//! life and multiplexes four sources on one task:
//!
//! - **Stop**: the [`EngineControl`] stop flag ends the loop
//! - **Tick**: fixed-period drain, apply, and staleness sweep
//! - **Frame**: interpolation stepping at rendering rate
//! - **Inbound**: batches handed over by the transport, buffered only
//!
//! Nothing else touches the store, so no locks are needed around it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};
use trainwatch_types::{PositionUpdate, RenderEvent};

use crate::clock::Clock;
use crate::config::ReconciliationConfig;
use crate::control::{ControlRequest, EngineControl};
use crate::tick::{ReconciliationEngine, TickSummary};

/// Callback invoked from the loop after each tick and each frame.
///
/// Implementations use this to publish snapshots and broadcast render
/// events. Calls happen on the loop task and must not block.
pub trait TickCallback: Send {
    /// Called after a tick completes.
    fn on_tick(&mut self, summary: &TickSummary, engine: &ReconciliationEngine);

    /// Called when interpolation frames (or a viewport reset) moved markers.
    fn on_frame(&mut self, _events: &[RenderEvent]) {}
}

/// A callback that ignores everything.
pub struct NoOpCallback;

impl TickCallback for NoOpCallback {
    fn on_tick(&mut self, _summary: &TickSummary, _engine: &ReconciliationEngine) {}
}

/// Loop periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopTiming {
    /// Reconciliation tick period.
    pub tick: Duration,
    /// Interpolation frame period.
    pub frame: Duration,
}

impl LoopTiming {
    /// Periods from configuration. Zero periods are raised to 1 ms.
    pub fn from_config(config: &ReconciliationConfig) -> Self {
        Self {
            tick: Duration::from_millis(config.tick_interval_ms.max(1)),
            frame: Duration::from_millis(config.frame_interval_ms.max(1)),
        }
    }
}

/// How the loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopResult {
    /// Ticks executed by this run.
    pub total_ticks: u64,
    /// Entities still live when the loop stopped.
    pub live_entities: usize,
}

/// Run the reconciliation loop until a stop is requested.
///
/// Closing the inbound channel does not end the loop: ticks keep running
/// so stale entities are still evicted.
pub async fn run_reconciliation(
    engine: &mut ReconciliationEngine,
    inbound: &mut mpsc::UnboundedReceiver<Vec<PositionUpdate>>,
    control: &Arc<EngineControl>,
    clock: &dyn Clock,
    timing: LoopTiming,
    callback: &mut dyn TickCallback,
) -> LoopResult {
    let mut tick_timer = interval(timing.tick);
    tick_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut frame_timer = interval(timing.frame);
    frame_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut inbound_open = true;
    let mut total_ticks: u64 = 0;

    info!(
        tick_ms = u64::try_from(timing.tick.as_millis()).unwrap_or(u64::MAX),
        frame_ms = u64::try_from(timing.frame.as_millis()).unwrap_or(u64::MAX),
        "Reconciliation loop starting"
    );

    loop {
        if control.is_stop_requested() {
            break;
        }

        tokio::select! {
            biased;

            () = control.stopped() => break,

            _ = tick_timer.tick() => {
                for request in control.drain().await {
                    apply_request(engine, request, callback);
                }
                let summary = engine.tick(clock.now_ms());
                total_ticks = total_ticks.saturating_add(1);
                callback.on_tick(&summary, engine);
            }

            _ = frame_timer.tick() => {
                let events = engine.step_frames(clock.now_ms());
                if !events.is_empty() {
                    callback.on_frame(&events);
                }
            }

            batch = inbound.recv(), if inbound_open => match batch {
                Some(batch) => engine.buffer(batch),
                None => {
                    inbound_open = false;
                    debug!("Inbound channel closed; ticking on without feed");
                }
            },
        }
    }

    let result = LoopResult {
        total_ticks,
        live_entities: engine.store().len(),
    };
    info!(
        total_ticks = result.total_ticks,
        live_entities = result.live_entities,
        "Reconciliation loop stopped"
    );
    result
}

fn apply_request(engine: &mut ReconciliationEngine, request: ControlRequest, callback: &mut dyn TickCallback) {
    match request {
        ControlRequest::Select(id) => {
            if engine.select(&id).is_none() {
                debug!(entity = %id, "Ignoring selection of unknown entity");
            }
        }
        ControlRequest::ClearSelection => engine.clear_selection(),
        ControlRequest::ResetViewport { snap_to_target } => {
            let events = engine.cancel_all_interpolations(snap_to_target);
            if !events.is_empty() {
                callback.on_frame(&events);
            }
        }
    }
}
