use crate::config::{next_backoff, ConnectionConfig};
use crate::dispatch::Dispatcher;
use aic_core::ws_protocol::{encode_outgoing, OutgoingMessage};
use futures_util::{Sink, SinkExt, StreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The chat session the backend should stream for. Read at announce time, so
/// a reconnect always carries the latest value.
#[derive(Clone)]
pub struct SessionRef {
    tx: Arc<watch::Sender<String>>,
}

impl SessionRef {
    pub fn new(initial: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(initial.into());
        Self { tx: Arc::new(tx) }
    }

    /// Returns true when the value actually changed.
    pub fn set(&self, chat_id: impl Into<String>) -> bool {
        let chat_id = chat_id.into();
        self.tx.send_if_modified(|current| {
            if *current == chat_id {
                false
            } else {
                *current = chat_id;
                true
            }
        })
    }

    pub fn current(&self) -> String {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.tx.subscribe()
    }
}

struct DriverHandle {
    outbound: mpsc::Sender<OutgoingMessage>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Owns the single live channel to the backend.
///
/// Reconnection is handled inside the driver task with capped exponential
/// backoff; every successful (re)connect announces the active chat exactly
/// once before any other outbound traffic.
pub struct ConnectionManager {
    config: ConnectionConfig,
    session: SessionRef,
    dispatcher: Dispatcher,
    state: Arc<watch::Sender<ConnectionState>>,
    driver: Option<DriverHandle>,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig, session: SessionRef, dispatcher: Dispatcher) -> Self {
        let (state, _rx) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            session,
            dispatcher,
            state: Arc::new(state),
            driver: None,
        }
    }

    pub fn session(&self) -> &SessionRef {
        &self.session
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Starts the driver unless one is already running. Must be called from
    /// within a tokio runtime.
    pub fn init_websocket(&mut self) {
        if let Some(driver) = &self.driver {
            if !driver.task.is_finished() {
                debug!("ws_init_skipped: driver already running");
                return;
            }
        }

        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.outbound_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ctx = DriverContext {
            config: self.config.clone(),
            session: self.session.clone(),
            dispatcher: self.dispatcher.clone(),
            state: self.state.clone(),
        };
        let task = tokio::spawn(run_driver(ctx, outbound_rx, shutdown_rx));
        self.driver = Some(DriverHandle {
            outbound: outbound_tx,
            shutdown: shutdown_tx,
            task,
        });
    }

    /// Hands `message` to the live connection. Dropped, not queued, when the
    /// channel is not connected.
    pub fn send_message(&self, message: OutgoingMessage) -> bool {
        let Some(driver) = self.driver.as_ref() else {
            debug!("ws_send_dropped: no connection");
            return false;
        };
        if !self.is_connected() {
            debug!("ws_send_dropped: state={}", self.state());
            return false;
        }
        match driver.outbound.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("ws_send_dropped: outbound queue full");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("ws_send_dropped: driver stopped");
                false
            }
        }
    }

    /// Closes the channel and stops reconnecting until the next
    /// [`init_websocket`](Self::init_websocket).
    pub async fn disconnect(&mut self) {
        if let Some(driver) = self.driver.take() {
            let _ = driver.shutdown.send(true);
            drop(driver.outbound);
            if let Err(err) = driver.task.await {
                if !err.is_cancelled() {
                    warn!("ws_driver_join_error: {err}");
                }
            }
        }
        self.state.send_replace(ConnectionState::Disconnected);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            let _ = driver.shutdown.send(true);
            driver.task.abort();
        }
    }
}

struct DriverContext {
    config: ConnectionConfig,
    session: SessionRef,
    dispatcher: Dispatcher,
    state: Arc<watch::Sender<ConnectionState>>,
}

async fn run_driver(
    ctx: DriverContext,
    mut outbound_rx: mpsc::Receiver<OutgoingMessage>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let DriverContext {
        config,
        session,
        dispatcher,
        state,
    } = ctx;
    let mut session_rx = session.subscribe();
    let mut backoff = config.initial_backoff;
    let mut next_state = ConnectionState::Connecting;

    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        state.send_replace(next_state);
        next_state = ConnectionState::Reconnecting;

        let connect = tokio::select! {
            result = connect_async(config.url.clone()) => result,
            _ = shutdown_rx.changed() => break,
        };
        let (ws, _) = match connect {
            Ok(value) => value,
            Err(err) => {
                warn!("ws_connect_error: {err}");
                if wait_or_shutdown(backoff, &mut shutdown_rx).await {
                    break;
                }
                backoff = next_backoff(backoff, config.max_backoff);
                continue;
            }
        };
        backoff = config.initial_backoff;
        let (mut sink, mut stream) = ws.split();

        let chat_id = session_rx.borrow_and_update().clone();
        if !send_outgoing(&mut sink, &OutgoingMessage::set_active_session(chat_id)).await {
            warn!("ws_announce_error");
            let _ = sink.close().await;
            if wait_or_shutdown(backoff, &mut shutdown_rx).await {
                break;
            }
            backoff = next_backoff(backoff, config.max_backoff);
            continue;
        }
        info!("ws_connected: {}", config.url);
        state.send_replace(ConnectionState::Connected);

        let mut shutting_down = false;
        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        dispatcher.dispatch_frame(&text);
                    }
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => {
                            dispatcher.dispatch_frame(&text);
                        }
                        Err(_) => warn!("ws_decode_error: binary frame is not utf-8"),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        info!("ws_closed_by_peer");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!("ws_read_error: {err}");
                        break;
                    }
                },
                Some(message) = outbound_rx.recv() => {
                    if !send_outgoing(&mut sink, &message).await {
                        break;
                    }
                }
                Ok(()) = session_rx.changed() => {
                    let chat_id = session_rx.borrow_and_update().clone();
                    debug!("ws_session_changed: {chat_id}");
                    let announce = OutgoingMessage::set_active_session(chat_id);
                    if !send_outgoing(&mut sink, &announce).await {
                        break;
                    }
                }
                _ = shutdown_rx.changed() => {
                    shutting_down = true;
                    break;
                }
            }
        }

        let _ = sink.close().await;
        let mut dropped = 0usize;
        while outbound_rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("ws_send_dropped: {dropped} pending on disconnect");
        }

        if shutting_down || *shutdown_rx.borrow() {
            break;
        }
        state.send_replace(ConnectionState::Reconnecting);
        if wait_or_shutdown(backoff, &mut shutdown_rx).await {
            break;
        }
        backoff = next_backoff(backoff, config.max_backoff);
    }

    state.send_replace(ConnectionState::Disconnected);
    info!("ws_driver_stopped");
}

async fn send_outgoing<S>(sink: &mut S, message: &OutgoingMessage) -> bool
where
    S: Sink<Message> + Unpin,
    S::Error: fmt::Display,
{
    let text = match encode_outgoing(message) {
        Ok(text) => text,
        Err(err) => {
            warn!("ws_encode_error: {err}");
            return true;
        }
    };
    match sink.send(Message::Text(text)).await {
        Ok(()) => true,
        Err(err) => {
            warn!("ws_write_error: {err}");
            false
        }
    }
}

/// Sleeps for `delay`; true if shutdown was requested meanwhile.
async fn wait_or_shutdown(delay: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    if *shutdown_rx.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = shutdown_rx.changed() => true,
    }
}
