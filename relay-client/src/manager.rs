// relay-client/src/manager.rs
use common::greeted_client_id;
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::borrow::Cow;
use std::future::pending;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Sleep};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::ClientError;
use crate::machine::{Action, ConnectionState, Event, ReconnectMachine, ReconnectPolicy};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type ConnectFuture = BoxFuture<'static, Result<WsStream, WsError>>;

const MESSAGE_CHANNEL_CAPACITY: usize = 256;

enum Command {
    Connect,
    Disconnect,
    Send(String),
}

#[derive(Default)]
struct Shared {
    messages: Mutex<Vec<Value>>,
    client_id: Mutex<Option<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to one relay connection with automatic reconnection.
///
/// The socket, the reconnect timer and the state machine are owned by a
/// background task; this handle sends it commands and reads what it
/// publishes. Dropping the handle stops the task.
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    shared: Arc<Shared>,
    incoming: broadcast::Sender<Value>,
    task: JoinHandle<()>,
}

impl ConnectionManager {
    /// Start the manager task in `Idle`; call [`connect`](Self::connect) to open.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(url: &str, policy: ReconnectPolicy) -> Result<Self, ClientError> {
        let url = Url::parse(url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ClientError::UnsupportedScheme(url.scheme().to_string()));
        }

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let (incoming, _) = broadcast::channel(MESSAGE_CHANNEL_CAPACITY);
        let shared = Arc::new(Shared::default());

        let driver = Driver {
            url: url.to_string(),
            machine: ReconnectMachine::new(policy),
            commands: commands_rx,
            state_tx,
            shared: shared.clone(),
            incoming: incoming.clone(),
            socket: None,
        };

        Ok(Self {
            commands: commands_tx,
            state: state_rx,
            shared,
            incoming,
            task: tokio::spawn(driver.run()),
        })
    }

    /// Open the connection; resets the retry count. No-op while connecting or open.
    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    /// Close with the normal close code and cancel any pending reconnect
    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    /// Send a JSON-encoded message over the open connection
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> Result<(), ClientError> {
        let text = serde_json::to_string(message)?;
        self.send_text(text)
    }

    /// Send text as-is over the open connection
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), ClientError> {
        if !self.is_connected() {
            tracing::warn!("WebSocket is not connected. Cannot send message.");
            return Err(ClientError::NotConnected);
        }

        self.commands
            .send(Command::Send(text.into()))
            .map_err(|_| ClientError::Stopped)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Receiver notified on every state change
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Id the relay assigned to this connection, once greeted
    pub fn client_id(&self) -> Option<String> {
        lock(&self.shared.client_id).clone()
    }

    /// Every JSON frame received so far, oldest first
    pub fn messages(&self) -> Vec<Value> {
        lock(&self.shared.messages).clone()
    }

    pub fn clear_messages(&self) {
        lock(&self.shared.messages).clear();
    }

    /// Stream of messages received from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.incoming.subscribe()
    }

    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::warn!("Connection manager task has stopped");
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Driver {
    url: String,
    machine: ReconnectMachine,
    commands: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    shared: Arc<Shared>,
    incoming: broadcast::Sender<Value>,
    socket: Option<WsStream>,
}

impl Driver {
    async fn run(mut self) {
        let mut connecting: Option<ConnectFuture> = None;
        // The only reconnect timer; replacing it cancels the previous one
        let mut retry: Option<Pin<Box<Sleep>>> = None;

        loop {
            let event = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Connect) => Event::ConnectRequested,
                    Some(Command::Disconnect) => Event::DisconnectRequested,
                    Some(Command::Send(text)) => {
                        self.send_text(text).await;
                        continue;
                    },
                    None => break,
                },
                result = finish_connect(&mut connecting) => {
                    connecting = None;
                    match result {
                        Ok(ws) => {
                            tracing::info!("WebSocket connected to {}", self.url);
                            self.socket = Some(ws);
                            Event::Opened
                        },
                        Err(e) => {
                            tracing::warn!("Error creating WebSocket connection: {}", e);
                            Event::ClosedAbnormal
                        },
                    }
                },
                frame = next_frame(&mut self.socket) => match frame {
                    Some(Ok(Message::Text(text))) => {
                        self.receive(&text);
                        continue;
                    },
                    Some(Ok(Message::Close(frame))) => self.closed_by_peer(frame).await,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::warn!("WebSocket error: {}", e);
                        self.socket = None;
                        Event::ClosedAbnormal
                    },
                    None => {
                        tracing::warn!("WebSocket stream ended without close frame");
                        self.socket = None;
                        Event::ClosedAbnormal
                    },
                },
                _ = wait_retry(&mut retry) => {
                    retry = None;
                    Event::RetryElapsed
                },
            };

            let action = self.machine.handle(event);
            let state = self.machine.state();
            self.state_tx.send_replace(state);
            tracing::debug!("{:?} -> {:?} ({:?})", event, state, action);

            match action {
                Action::Noop => {
                    if state == ConnectionState::GaveUp {
                        tracing::warn!(
                            "Giving up on {} after {} failed attempts",
                            self.url,
                            self.machine.attempts()
                        );
                    }
                },
                Action::OpenSocket => {
                    retry = None;
                    connecting = Some(connect_async(self.url.clone()).map(|r| r.map(|(ws, _)| ws)).boxed());
                },
                Action::ScheduleRetry(delay) => {
                    tracing::info!(
                        "Attempting to reconnect in {:?}... ({}/{})",
                        delay,
                        self.machine.attempts(),
                        self.machine.policy().max_attempts
                    );
                    retry = Some(Box::pin(sleep(delay)));
                },
                Action::CloseSocket => {
                    retry = None;
                    connecting = None;
                    self.close_socket().await;
                },
            }
        }

        self.close_socket().await;
    }

    async fn closed_by_peer(&mut self, frame: Option<CloseFrame<'static>>) -> Event {
        let code = frame.as_ref().map(|f| f.code);
        tracing::info!(
            "WebSocket disconnected: {:?} {}",
            code,
            frame.as_ref().map(|f| f.reason.as_ref()).unwrap_or("")
        );

        // Flush the close reply before dropping the stream
        if let Some(mut ws) = self.socket.take() {
            let _ = ws.close(None).await;
        }

        if code == Some(CloseCode::Normal) {
            Event::ClosedClean
        } else {
            Event::ClosedAbnormal
        }
    }

    async fn close_socket(&mut self) {
        if let Some(mut ws) = self.socket.take() {
            let frame = CloseFrame {
                code: CloseCode::Normal,
                reason: Cow::Borrowed("Manual disconnect"),
            };
            if let Err(e) = ws.close(Some(frame)).await {
                tracing::debug!("Error closing WebSocket: {}", e);
            }
        }
    }

    fn receive(&self, text: &str) {
        let message: Value = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Error parsing WebSocket message: {}", e);
                return;
            },
        };

        tracing::debug!("WebSocket message received: {}", message);

        if let Some(client_id) = greeted_client_id(&message) {
            tracing::info!("Assigned client id {}", client_id);
            *lock(&self.shared.client_id) = Some(client_id.to_string());
        }

        lock(&self.shared.messages).push(message.clone());
        // Nobody listening is fine
        let _ = self.incoming.send(message);
    }

    async fn send_text(&mut self, text: String) {
        match (&mut self.socket, self.machine.state()) {
            (Some(ws), ConnectionState::Open) => {
                if let Err(e) = ws.send(Message::Text(text)).await {
                    tracing::warn!("Failed to send WebSocket message: {}", e);
                }
            },
            _ => tracing::warn!("WebSocket is not connected. Cannot send message."),
        }
    }
}

async fn finish_connect(slot: &mut Option<ConnectFuture>) -> Result<WsStream, WsError> {
    match slot {
        Some(fut) => fut.await,
        None => pending().await,
    }
}

async fn next_frame(socket: &mut Option<WsStream>) -> Option<Result<Message, WsError>> {
    match socket {
        Some(ws) => ws.next().await,
        None => pending().await,
    }
}

async fn wait_retry(slot: &mut Option<Pin<Box<Sleep>>>) {
    match slot {
        Some(timer) => timer.as_mut().await,
        None => pending().await,
    }
}
