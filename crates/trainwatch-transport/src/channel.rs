//! The reconnecting feed connection.
//!
//! [`TransportChannel::connect`] spawns one task that runs the state
//! machine `Disconnected -> Connecting -> Connected -> Disconnected` until
//! [`TransportHandle::close`] is called. While connected it pings on a
//! fixed interval and force-closes when nothing has been heard for the
//! liveness window. Decoded batches go to the registered
//! [`UpdateHandler`]; the channel never touches the entity store.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep, sleep_until, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};
use trainwatch_core::config::FeedConfig;
use trainwatch_types::{ConnectionStatus, PositionUpdate};

use crate::backoff::reconnect_delay;
use crate::codec::{Inbound, PING_FRAME, decode_frame};
use crate::error::TransportError;

type FeedStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Receiver of decoded update batches.
///
/// Called on the transport task; implementations should hand the batch
/// off (for example into a channel) rather than process it inline.
pub trait UpdateHandler: Send + 'static {
    /// A frame produced at least one valid record.
    fn on_batch(&mut self, batch: Vec<PositionUpdate>);
}

impl<F> UpdateHandler for F
where
    F: FnMut(Vec<PositionUpdate>) + Send + 'static,
{
    fn on_batch(&mut self, batch: Vec<PositionUpdate>) {
        self(batch);
    }
}

impl UpdateHandler for mpsc::UnboundedSender<Vec<PositionUpdate>> {
    fn on_batch(&mut self, batch: Vec<PositionUpdate>) {
        if self.send(batch).is_err() {
            trace!("Batch receiver dropped; discarding batch");
        }
    }
}

/// Connection state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection; a reconnect may be scheduled.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// The socket is open and heartbeating.
    Connected,
}

impl ConnectionState {
    /// The coarse status exposed to the UI.
    pub const fn status(self) -> ConnectionStatus {
        match self {
            Self::Connected => ConnectionStatus::Connected,
            Self::Connecting | Self::Disconnected => ConnectionStatus::Disconnected,
        }
    }
}

/// Stop flag shared between the handle and the task.
#[derive(Debug, Default)]
struct Shared {
    stopped: AtomicBool,
    stop_notify: Notify,
}

impl Shared {
    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    async fn wait_stopped(&self) {
        while !self.is_stopped() {
            self.stop_notify.notified().await;
        }
    }
}

/// Entry point for opening a feed connection.
pub struct TransportChannel;

impl TransportChannel {
    /// Spawn the connection task for `config.url`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect<H: UpdateHandler>(config: FeedConfig, handler: H) -> TransportHandle {
        let shared = Arc::new(Shared::default());
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let task = tokio::spawn(run(config, handler, Arc::clone(&shared), state_tx));
        TransportHandle {
            shared,
            state_rx,
            task,
        }
    }
}

/// Owner-side handle to a running feed connection.
#[derive(Debug)]
pub struct TransportHandle {
    shared: Arc<Shared>,
    state_rx: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl TransportHandle {
    /// Stop the channel: close the socket and never reconnect.
    ///
    /// Idempotent. Pending reconnect timers are abandoned immediately.
    pub fn close(&self) {
        if !self.shared.stopped.swap(true, Ordering::AcqRel) {
            info!("Transport close requested");
            self.shared.stop_notify.notify_one();
        }
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.is_stopped()
    }

    /// Current state machine state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Current connected/disconnected status.
    pub fn status(&self) -> ConnectionStatus {
        self.state().status()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Wait for the connection task to finish (after [`close`](Self::close)).
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "Transport task ended abnormally");
        }
    }
}

/// How a connected session ended without error.
enum SessionEnd {
    /// `close()` was called.
    Stopped,
}

async fn run<H: UpdateHandler>(
    config: FeedConfig,
    mut handler: H,
    shared: Arc<Shared>,
    state_tx: watch::Sender<ConnectionState>,
) {
    let connect_timeout = Duration::from_millis(config.connect_timeout_ms);
    let mut attempt: u32 = 0;

    info!(url = %config.url, "Transport starting");

    loop {
        if shared.is_stopped() {
            break;
        }

        attempt = attempt.saturating_add(1);
        set_state(&state_tx, ConnectionState::Connecting);
        debug!(url = %config.url, attempt, "Connecting to feed");

        let connected = tokio::select! {
            () = shared.wait_stopped() => break,
            result = timeout(connect_timeout, connect_async(config.url.as_str())) => match result {
                Ok(Ok((stream, _response))) => Ok(stream),
                Ok(Err(source)) => Err(TransportError::from(source)),
                Err(_) => Err(TransportError::ConnectTimeout {
                    timeout_ms: config.connect_timeout_ms,
                }),
            },
        };

        match connected {
            Ok(stream) => {
                attempt = 0;
                set_state(&state_tx, ConnectionState::Connected);
                info!(url = %config.url, "Feed connected");

                let ended = session(stream, &config, &mut handler, &shared).await;
                set_state(&state_tx, ConnectionState::Disconnected);
                match ended {
                    Ok(SessionEnd::Stopped) => break,
                    Err(e) => warn!(error = %e, "Feed connection lost"),
                }
            }
            Err(e) => {
                set_state(&state_tx, ConnectionState::Disconnected);
                warn!(error = %e, attempt, "Feed connect failed");
            }
        }

        let delay = reconnect_delay(&config.backoff, attempt);
        debug!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt,
            "Scheduling reconnect"
        );
        tokio::select! {
            () = shared.wait_stopped() => break,
            () = sleep(delay) => {}
        }
    }

    set_state(&state_tx, ConnectionState::Disconnected);
    info!("Transport stopped");
}

fn set_state(state_tx: &watch::Sender<ConnectionState>, next: ConnectionState) {
    let prev = state_tx.send_replace(next);
    if prev != next {
        trace!(from = ?prev, to = ?next, "Connection state change");
    }
}

/// Drive one open connection until it ends.
async fn session<H: UpdateHandler>(
    stream: FeedStream,
    config: &FeedConfig,
    handler: &mut H,
    shared: &Shared,
) -> Result<SessionEnd, TransportError> {
    let (mut write, mut read) = stream.split();

    let heartbeat = Duration::from_millis(config.heartbeat_period_ms());
    let liveness = Duration::from_millis(config.liveness_timeout_ms());
    let first_ping = Instant::now().checked_add(heartbeat).unwrap_or_else(Instant::now);
    let mut ping_timer = interval_at(first_ping, heartbeat);
    ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_heard = Instant::now();

    loop {
        tokio::select! {
            () = shared.wait_stopped() => {
                if let Err(e) = write.send(Message::Close(None)).await {
                    debug!(error = %e, "Close frame not delivered");
                }
                return Ok(SessionEnd::Stopped);
            }

            () = sleep_until(last_heard.checked_add(liveness).unwrap_or(last_heard)) => {
                if let Err(e) = write.close().await {
                    debug!(error = %e, "Silent connection not closed cleanly");
                }
                let silent_ms = u64::try_from(last_heard.elapsed().as_millis()).unwrap_or(u64::MAX);
                return Err(TransportError::HeartbeatTimeout { silent_ms });
            }

            _ = ping_timer.tick() => {
                trace!("Sending heartbeat ping");
                write.send(Message::text(PING_FRAME)).await?;
            }

            frame = read.next() => {
                let Some(frame) = frame else {
                    return Err(TransportError::ClosedByPeer);
                };
                last_heard = Instant::now();
                match frame? {
                    Message::Text(text) => dispatch(text.as_str(), handler),
                    Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                        Ok(text) => dispatch(text, handler),
                        Err(_) => debug!(len = bytes.len(), "Dropping non-UTF-8 binary frame"),
                    },
                    Message::Close(frame) => {
                        debug!(frame = ?frame, "Server sent close");
                        return Err(TransportError::ClosedByPeer);
                    }
                    Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
                }
            }
        }
    }
}

fn dispatch<H: UpdateHandler>(text: &str, handler: &mut H) {
    match decode_frame(text) {
        Inbound::Control => trace!("Control frame consumed"),
        Inbound::Malformed => debug!(len = text.len(), "Dropping malformed frame"),
        Inbound::Updates { updates, dropped } => {
            if dropped > 0 {
                debug!(dropped, kept = updates.len(), "Discarded invalid records");
            }
            if !updates.is_empty() {
                handler.on_batch(updates);
            }
        }
    }
}
