// relay-server/src/actors/client_session_actor.rs
use actix::{Actor, ActorContext, Addr, AsyncContext, Handler, Message, StreamHandler};
use actix::prelude::SendError;
use actix_web_actors::ws;
use common::{HeartbeatConfig, RelayMessage};
use std::time::Instant;

use crate::registry::{ClientSocket, ConnectionRegistry, SocketError};

/// Text frame to push to the browser
#[derive(Message)]
#[rtype(result = "()")]
pub struct RelayFrame {
    pub content: String,
}

/// Actor owning one browser WebSocket connection
pub struct ClientSessionActor {
    client_id: String,
    registry: ConnectionRegistry,
    heartbeat: HeartbeatConfig,
    last_heartbeat: Instant,
}

impl ClientSessionActor {
    pub fn new(client_id: String, registry: ConnectionRegistry, heartbeat: HeartbeatConfig) -> Self {
        Self {
            client_id,
            registry,
            heartbeat,
            last_heartbeat: Instant::now(),
        }
    }

    // Ping periodically and drop peers that stopped answering
    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(self.heartbeat.interval(), |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > act.heartbeat.timeout() {
                tracing::warn!("Client heartbeat timeout: {}", act.client_id);
                ctx.stop();
                return;
            }

            ctx.ping(b"");
        });
    }

    fn send_greeting(&self, ctx: &mut ws::WebsocketContext<Self>) {
        match serde_json::to_string(&RelayMessage::connection(&self.client_id)) {
            Ok(json) => ctx.text(json),
            Err(e) => {
                tracing::error!("Failed to serialize connection message for {}: {}", self.client_id, e);
                ctx.stop();
            }
        }
    }
}

impl Actor for ClientSessionActor {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(
            "WebSocket client connected: {} ({} total clients)",
            self.client_id,
            self.registry.len()
        );

        self.last_heartbeat = Instant::now();
        self.start_heartbeat(ctx);
        self.send_greeting(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.registry.unregister(&self.client_id);

        tracing::info!(
            "WebSocket client disconnected: {} ({} total clients)",
            self.client_id,
            self.registry.len()
        );
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ClientSessionActor {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&msg);
            },
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            },
            Ok(ws::Message::Text(text)) => {
                // One-way relay: inbound text only counts as liveness
                self.last_heartbeat = Instant::now();
                tracing::debug!("Ignoring message from client {}: {}", self.client_id, text);
            },
            Ok(ws::Message::Binary(_)) => {
                self.last_heartbeat = Instant::now();
            },
            Ok(ws::Message::Close(reason)) => {
                tracing::info!("Client {} closing connection: {:?}", self.client_id, reason);
                ctx.close(reason);
                ctx.stop();
            },
            Ok(_) => (),
            Err(e) => {
                tracing::error!("WebSocket client error ({}): {}", self.client_id, e);
                ctx.stop();
            },
        }
    }
}

impl Handler<RelayFrame> for ClientSessionActor {
    type Result = ();

    fn handle(&mut self, msg: RelayFrame, ctx: &mut Self::Context) -> Self::Result {
        ctx.text(msg.content);
    }
}

impl ClientSocket for Addr<ClientSessionActor> {
    fn is_open(&self) -> bool {
        self.connected()
    }

    fn send_text(&self, text: String) -> Result<(), SocketError> {
        match self.try_send(RelayFrame { content: text }) {
            Ok(()) => Ok(()),
            // A busy mailbox is not a dead peer, queue past the soft limit
            Err(SendError::Full(frame)) => {
                self.do_send(frame);
                Ok(())
            },
            Err(SendError::Closed(_)) => Err(SocketError::Closed),
        }
    }
}
