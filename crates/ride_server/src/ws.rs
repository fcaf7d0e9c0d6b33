//! Live connection endpoint.
//!
//! GET /ws
//!
//! Protocol:
//! - Client → Server: `ClientEvent` JSON frames; the first must be a register event
//! - Server → Client: `ServerEvent` JSON frames, `{ "event": ..., "data": ... }`

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use ride_core::error::RideError;
use ride_core::gateway::{ClientEvent, ServerEvent, Session};
use tracing::{debug, info, warn};

use crate::AppState;

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_session(socket, state))
}

async fn ws_session(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (handle, mut outbound) = state.service.gateway().open();
    let mut session = Session::new(handle);
    let connection = session.handle.id();
    debug!(%connection, "ws connected");

    // Drains the gateway queue in order; one writer per socket.
    let writer = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    warn!(event = event.name(), error = %err, "failed to encode event");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                Ok(event) => state.service.handle_event(&mut session, event).await,
                Err(err) => {
                    let err = RideError::validation(format!("malformed event: {err}"));
                    session.handle.send(ServerEvent::error(&err));
                }
            },
            Ok(Message::Binary(_)) => {
                let err = RideError::validation("binary frames are not supported");
                session.handle.send(ServerEvent::error(&err));
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    state.service.close_session(&session).await;
    writer.abort();
    match &session.party {
        Some(party) => info!(%party, %connection, "ws disconnected"),
        None => debug!(%connection, "ws closed before registering"),
    }
}
