use crate::game::room::Room;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;

/// Pumps one WebSocket against a room. Control payloads (init) are sent in
/// order; state frames go through a newest-wins slot so a slow socket skips
/// stale snapshots instead of queueing them.
pub async fn handle_socket(socket: WebSocket, room: Arc<Room>) {
    let (mut sender, mut receiver) = socket.split();
    let session = room.add_session().await;
    let session_id = session.session_id;
    let inbound = session.inbound;
    let outbound_state = session.outbound_state;
    let mut outbound_ctl_rx = session.outbound_ctl_rx;

    let send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                ctl = outbound_ctl_rx.recv() => {
                    let Some(payload) = ctl else { return };
                    if sender.send(Message::Binary(payload)).await.is_err() {
                        return;
                    }
                }
                _ = outbound_state.wait_for_update() => {
                    if let Some(payload) = outbound_state.take_latest() {
                        if sender.send(Message::Binary(payload)).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    });

    while let Some(result) = receiver.next().await {
        let Ok(message) = result else { break };
        match message {
            Message::Binary(data) => {
                room.handle_binary_message(&session_id, &inbound, &data).await;
            }
            Message::Text(text) => {
                room.handle_text_message(&session_id, &inbound, &text).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    room.remove_session(&session_id).await;
    send_task.abort();
}
