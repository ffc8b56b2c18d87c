//! WebSocket upgrade handler and per-connection event loop.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time;

use crate::AppState;

use super::events::{AuthFrame, ClientEvent, RawFrame, ServerEvent};
use super::session::GatewaySession;

/// Close codes (4000-range for application-level).
const CLOSE_UNKNOWN_ERROR: u16 = 4000;
const CLOSE_NOT_AUTHENTICATED: u16 = 4003;
const CLOSE_AUTH_FAILED: u16 = 4004;
const CLOSE_HANDSHAKE_TIMEOUT: u16 = 4009;

/// Timeout for receiving the auth frame after connection (seconds).
const AUTH_TIMEOUT_SECS: u64 = 10;

pub fn router() -> Router<AppState> {
    Router::new().route("/gateway", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Step 1: Read the auth frame within the handshake timeout.
    let handshake = time::timeout(
        Duration::from_secs(AUTH_TIMEOUT_SECS),
        read_auth_frame(&mut ws_tx, &mut ws_rx),
    )
    .await;

    let token = match handshake {
        Ok(Ok(token)) => token,
        // A close frame was already sent.
        Ok(Err(())) => return,
        Err(_elapsed) => {
            let _ = send_close(&mut ws_tx, CLOSE_HANDSHAKE_TIMEOUT, "Handshake timeout").await;
            return;
        }
    };

    // Step 2: Verify the credential. No session exists until this succeeds.
    let identity = match state.verifier.verify(&token).await {
        Ok(identity) => identity,
        Err(err) => {
            tracing::debug!(%err, "gateway handshake rejected");
            let _ = send_close(&mut ws_tx, CLOSE_AUTH_FAILED, err.reason()).await;
            return;
        }
    };

    // Step 3: Construct the session, register its outbound queue, ack.
    let (tx, outbound_rx) = mpsc::unbounded_channel();
    let session = Arc::new(GatewaySession::new(identity, tx.clone()));
    state.rooms.register(&session.session_id, tx);

    let ready = ServerEvent::Ready {
        session_id: session.session_id.clone(),
        user: session.identity.clone(),
    };
    if ws_tx.send(Message::Text(ready.to_json().into())).await.is_err() {
        state.rooms.remove_session(&session.session_id);
        return;
    }

    tracing::info!(
        session_id = %session.session_id,
        user_id = %session.identity.id,
        "gateway session established"
    );

    run_session(&state, session.clone(), ws_tx, ws_rx, outbound_rx).await;

    // Step 4: Disconnect cleanup. The session leaves every room it joined.
    state.rooms.remove_session(&session.session_id);

    tracing::info!(
        session_id = %session.session_id,
        user_id = %session.identity.id,
        "gateway session ended"
    );
}

/// Read frames until the `auth` frame arrives. Any other outcome closes the
/// socket (close frame already sent) and returns `Err`.
async fn read_auth_frame(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    ws_rx: &mut SplitStream<WebSocket>,
) -> Result<String, ()> {
    while let Some(msg) = ws_rx.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(?e, "ws read error during handshake");
                return Err(());
            }
        };

        let text = match msg {
            Message::Text(t) => t,
            Message::Close(_) => return Err(()),
            Message::Ping(_) | Message::Pong(_) => continue,
            _ => continue,
        };

        let frame: RawFrame = match serde_json::from_str(&text) {
            Ok(f) => f,
            Err(_) => {
                let _ = send_close(ws_tx, CLOSE_UNKNOWN_ERROR, "Invalid JSON").await;
                return Err(());
            }
        };

        if frame.event != "auth" {
            let _ = send_close(ws_tx, CLOSE_NOT_AUTHENTICATED, "Expected auth").await;
            return Err(());
        }

        match serde_json::from_value::<AuthFrame>(frame.data) {
            Ok(auth) => return Ok(auth.token),
            Err(_) => {
                let _ = send_close(ws_tx, CLOSE_AUTH_FAILED, "Invalid auth payload").await;
                return Err(());
            }
        }
    }
    Err(())
}

/// Main session loop: dispatch inbound frames, drain the outbound queue.
///
/// Inbound frames are handled strictly in arrival order; a dispatch error
/// is reported back on this connection only and the loop keeps running.
async fn run_session(
    state: &AppState,
    session: Arc<GatewaySession>,
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut ws_rx: SplitStream<WebSocket>,
    mut outbound_rx: mpsc::UnboundedReceiver<ServerEvent>,
) {
    loop {
        tokio::select! {
            // Client sends us a frame.
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let result = match ClientEvent::parse(&text) {
                            Ok(event) => state.dispatcher.dispatch(&session, event).await,
                            Err(err) => Err(err),
                        };
                        if let Err(err) = result {
                            tracing::debug!(
                                session_id = %session.session_id,
                                code = err.code(),
                                "dispatch rejected"
                            );
                            // A closed queue just means the writer half is
                            // already shutting the loop down.
                            session.queue(ServerEvent::error(&err));
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, session_id = %session.session_id, "ws read error");
                        break;
                    }
                    _ => continue,
                }
            }

            // Event queued for this session (room broadcast or local error).
            event = outbound_rx.recv() => {
                match event {
                    Some(event) => {
                        if ws_tx.send(Message::Text(event.to_json().into())).await.is_err() {
                            // Dead transport does not self-heal; same cleanup
                            // path as an explicit close.
                            break;
                        }
                    }
                    None => break, // registry dropped our sender
                }
            }
        }
    }
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    code: u16,
    reason: &str,
) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(axum::extract::ws::CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
