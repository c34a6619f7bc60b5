use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;
use whispr_core::{NotificationBus, Subscription};

use super::heartbeat::{HeartbeatSupervisor, Liveness};
use super::registry::SocketHandle;
use super::GatewayState;
use crate::websocket::protocol::{parse_inbound, GatewayCloseCode, GatewayMessage, OpCode};

/// Drive one gateway connection from upgrade to teardown.
///
/// Generic over the socket halves so the same state machine runs over an
/// axum `WebSocket` or in-process channels.
pub async fn handle_gateway<Tx, Rx, E>(
    ws_tx: Tx,
    mut ws_rx: Rx,
    token: Option<String>,
    state: GatewayState,
) where
    Tx: Sink<Message> + Unpin + Send + 'static,
    Rx: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let _task = state.shutdown.register_task();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_frames(ws_tx, out_rx));
    let handle = SocketHandle::new(out_tx);

    // Connecting
    let Some(token) = token.filter(|t| !t.trim().is_empty()) else {
        debug!("Gateway connection without token");
        handle.close(GatewayCloseCode::InvalidPayload, "Invalid payload");
        return finish(handle, writer).await;
    };

    // Authenticating
    let verified = match state.codec.verify(&token).await {
        Ok(verified) => verified,
        Err(e) => {
            warn!(error = %e, "Gateway authentication failed");
            handle.close(GatewayCloseCode::AuthenticationFailed, "Invalid token");
            return finish(handle, writer).await;
        }
    };

    let conn_id = Uuid::new_v4();
    let user_id = verified.payload.sub;
    if let Err(e) = state.registry.register(conn_id, user_id.clone(), handle.clone()) {
        warn!(error = %e, "Gateway session registration failed");
        handle.close(GatewayCloseCode::UnknownError, "Unknown error");
        return finish(handle, writer).await;
    }

    let subscription = subscribe_session(&state.bus, conn_id, &user_id, handle.clone());
    let mut supervisor = HeartbeatSupervisor::new(
        state.settings.heartbeat_interval,
        state.settings.heartbeat_timeout,
    );
    let shutdown = state.shutdown.token();

    handle.send(&GatewayMessage::hello(
        state.settings.heartbeat_interval.as_millis() as u64,
        conn_id,
    ));
    info!(conn_id = %conn_id, user_id = %user_id, "Gateway connection opened");

    // Open
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                handle.close(GatewayCloseCode::UnknownError, "Server shutting down");
                break;
            }
            _ = handle.closed() => break,
            _ = supervisor.tick() => {
                let Some(last_heartbeat) = state.registry.last_heartbeat(conn_id) else {
                    handle.close(GatewayCloseCode::UnknownConnection, "Unknown connection");
                    break;
                };
                if supervisor.check(last_heartbeat, Instant::now()) == Liveness::TimedOut {
                    warn!(conn_id = %conn_id, user_id = %user_id, "Gateway session timed out");
                    handle.close(GatewayCloseCode::SessionTimeOut, "Session timed out");
                    break;
                }
            }
            frame = ws_rx.next() => {
                let bytes = match frame {
                    Some(Ok(Message::Text(text))) => text.into_bytes(),
                    Some(Ok(Message::Binary(data))) => data,
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => {
                        handle.mark_closing();
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(conn_id = %conn_id, error = %e, "Gateway socket error");
                        handle.mark_closing();
                        break;
                    }
                };

                let op = match parse_inbound(&bytes) {
                    Ok(op) => op,
                    Err(rejection) => {
                        let (code, reason) = rejection.close();
                        debug!(conn_id = %conn_id, code = code.code(), "Rejected inbound frame");
                        handle.close(code, reason);
                        break;
                    }
                };

                if !state.registry.touch(conn_id) {
                    handle.close(GatewayCloseCode::UnknownConnection, "Unknown connection");
                    break;
                }
                if supervisor.record_frame() {
                    state.registry.mark_identified(conn_id);
                }
                if op == OpCode::Heartbeat {
                    handle.send(&GatewayMessage::heartbeat_ack());
                }
            }
        }
    }

    // Closing
    if supervisor.close() {
        state.registry.remove(conn_id);
        subscription.unsubscribe();
    }
    drop(subscription);
    info!(conn_id = %conn_id, user_id = %user_id, "Gateway connection closed");
    finish(handle, writer).await;
}

/// Forward bus deliveries addressed to `user_id` onto the socket.
pub fn subscribe_session(
    bus: &NotificationBus,
    conn_id: Uuid,
    user_id: &str,
    handle: SocketHandle,
) -> Subscription {
    let user_id = user_id.to_string();
    bus.subscribe(move |event, notification| {
        if !notification.targets(&user_id) {
            return;
        }
        if handle.send(&GatewayMessage::notification(event, notification.data.clone())) {
            debug!(conn_id = %conn_id, event = %event, "Notification delivered");
        }
    })
}

async fn finish(handle: SocketHandle, writer: JoinHandle<()>) {
    drop(handle);
    if let Err(e) = writer.await {
        warn!(error = %e, "Gateway writer task failed");
    }
}

/// Drain queued frames into the socket, stopping after a close frame.
async fn write_frames<Tx>(mut ws_tx: Tx, mut rx: mpsc::UnboundedReceiver<Message>)
where
    Tx: Sink<Message> + Unpin,
{
    while let Some(message) = rx.recv().await {
        let is_close = matches!(message, Message::Close(_));
        if ws_tx.send(message).await.is_err() || is_close {
            break;
        }
    }
    let _ = ws_tx.close().await;
}
