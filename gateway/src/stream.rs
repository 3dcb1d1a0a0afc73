//! WebSocket event stream
//!
//! Pushes a status snapshot on connect, then axis feedback, tracking mode
//! changes and LogEvents as they happen.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use mount_control::{AxisEvent, AxisKind, LogEvent, PointingContext, TrackingMode};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use crate::routes::AppState;

#[derive(Debug, Serialize)]
#[serde(tag = "channel", content = "data", rename_all = "snake_case")]
pub enum StreamMessage {
    Status(PointingContext),
    Axis(AxisEvent),
    Mode { mode: TrackingMode },
    Log(LogEvent),
}

/// GET /stream
pub async fn stream(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| pump(socket, state))
}

async fn send(socket: &mut WebSocket, message: &StreamMessage) -> bool {
    match serde_json::to_string(message) {
        Ok(text) => socket.send(Message::Text(text)).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to encode stream message: {}", e);
            true
        }
    }
}

async fn pump(mut socket: WebSocket, state: AppState) {
    let mut alt = state.mount.subscribe_axis(AxisKind::Altitude);
    let mut az = state.mount.subscribe_axis(AxisKind::Azimuth);
    let mut mode = state.mount.subscribe_mode();
    let mut log = state.live.subscribe();

    tracing::debug!("Stream client connected");
    if !send(&mut socket, &StreamMessage::Status(state.mount.snapshot())).await {
        return;
    }

    loop {
        let message = tokio::select! {
            received = alt.recv() => match received {
                Ok(event) => StreamMessage::Axis(event),
                Err(RecvError::Lagged(_)) => StreamMessage::Status(state.mount.snapshot()),
                Err(RecvError::Closed) => break,
            },
            received = az.recv() => match received {
                Ok(event) => StreamMessage::Axis(event),
                Err(RecvError::Lagged(_)) => StreamMessage::Status(state.mount.snapshot()),
                Err(RecvError::Closed) => break,
            },
            changed = mode.changed() => match changed {
                Ok(()) => {
                    let current = *mode.borrow_and_update();
                    StreamMessage::Mode { mode: current }
                }
                Err(_) => break,
            },
            received = log.recv() => match received {
                Ok(event) => StreamMessage::Log(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Stream client lagged behind the event log");
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            },
        };

        if !send(&mut socket, &message).await {
            break;
        }
    }
    tracing::debug!("Stream client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mount_control::{EventKind, TargetKind};

    #[test]
    fn test_messages_are_channel_tagged() {
        let mode = serde_json::to_value(StreamMessage::Mode {
            mode: TrackingMode::Slewing,
        })
        .unwrap();
        assert_eq!(mode["channel"], "mode");
        assert_eq!(mode["data"]["mode"], "slewing");

        let axis = serde_json::to_value(StreamMessage::Axis(AxisEvent::Arrived {
            axis: AxisKind::Azimuth,
            position: 12.5,
        }))
        .unwrap();
        assert_eq!(axis["channel"], "axis");
        assert_eq!(axis["data"]["axis"], "azimuth");

        let log = serde_json::to_value(StreamMessage::Log(LogEvent {
            timestamp: Utc::now(),
            altitude: 0.0,
            azimuth: 0.0,
            target: TargetKind::None,
            kind: EventKind::EmergencyStop,
            notes: "emergency stop".into(),
        }))
        .unwrap();
        assert_eq!(log["data"]["kind"], "emergency_stop");
    }
}
