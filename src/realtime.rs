//! Websocket notification channel.
//!
//! Frames are JSON text of the form `{"event": <name>, "data": <payload>}`.

use actix_web::{web, HttpRequest, HttpResponse};
use actix_ws::Message;
use futures_util::StreamExt as _;
use serde::{Deserialize, Serialize};

use crate::models::{NewNotification, Notification};
use crate::notification::{ListParams, NotificationService};
use crate::routes::AppState;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Bind this connection to a user id.
    Register(String),
    CreateNotification(NewNotification),
    GetNotifications,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NotificationsData {
    One(Notification),
    Many(Vec<Notification>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    NotificationCreated(Notification),
    Notifications(NotificationsData),
    Error { message: String },
}

impl ServerEvent {
    fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error { message: message.into() }
    }
}

/// Handle one client event on `conn`; the result, if any, goes back to the sender.
pub async fn handle_event(state: &AppState, conn: &str, event: ClientEvent) -> Option<ServerEvent> {
    match event {
        ClientEvent::Register(raw) => match uuid::Uuid::parse_str(raw.trim()) {
            Ok(user) => {
                state.hub.register(user, conn);
                None
            }
            Err(_) => Some(ServerEvent::error("Invalid user id")),
        },
        ClientEvent::CreateNotification(payload) => {
            let service = NotificationService::new(state.repo.as_ref(), &state.hub);
            Some(match service.create(payload).await {
                Ok(n) => ServerEvent::NotificationCreated(n),
                Err(e) => ServerEvent::error(e.to_string()),
            })
        }
        ClientEvent::GetNotifications => {
            let Some(user) = state.hub.user_for(conn) else {
                return Some(ServerEvent::error("Register before requesting notifications"));
            };
            let service = NotificationService::new(state.repo.as_ref(), &state.hub);
            Some(match service.list(user, &ListParams::default()).await {
                Ok(list) => ServerEvent::Notifications(NotificationsData::Many(list.notifications)),
                Err(e) => ServerEvent::error(e.to_string()),
            })
        }
    }
}

/// Upgrade to a websocket and serve the event protocol until the peer leaves.
pub async fn connect(
    req: HttpRequest,
    body: web::Payload,
    data: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    let (response, mut session, mut stream) = actix_ws::handle(&req, body)?;
    let (conn, mut rx) = data.hub.attach();
    tracing::info!(conn = %conn, open = data.hub.connection_count(), "realtime connection opened");

    let mut outbound = session.clone();
    let sender = actix_web::rt::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if outbound.text(frame).await.is_err() {
                break;
            }
        }
    });

    actix_web::rt::spawn(async move {
        let mut close_reason = None;
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    let reply = match serde_json::from_str::<ClientEvent>(&text) {
                        Ok(event) => handle_event(&data, &conn, event).await,
                        Err(e) => Some(ServerEvent::error(format!("Malformed event: {e}"))),
                    };
                    if let Some(reply) = reply {
                        data.hub.send(&conn, &reply);
                    }
                }
                Ok(Message::Ping(bytes)) => {
                    if session.pong(&bytes).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Close(reason)) => {
                    close_reason = reason;
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(conn = %conn, error = %e, "realtime receive error");
                    break;
                }
            }
        }
        data.hub.unregister(&conn);
        sender.abort();
        let _ = session.close(close_reason).await;
        tracing::info!(conn = %conn, "realtime connection closed");
    });

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_frames_decode() {
        let ev: ClientEvent = serde_json::from_str(r#"{"event":"register","data":"abc"}"#).unwrap();
        assert!(matches!(ev, ClientEvent::Register(ref s) if s == "abc"));
        let ev: ClientEvent = serde_json::from_str(r#"{"event":"getNotifications"}"#).unwrap();
        assert!(matches!(ev, ClientEvent::GetNotifications));
        let ev: ClientEvent = serde_json::from_str(
            r#"{"event":"createNotification","data":{"title":"Hi","userId":"6f1b1a52-7a0e-4d8e-9d5e-0f3c2b1a0e11"}}"#,
        )
        .unwrap();
        assert!(matches!(ev, ClientEvent::CreateNotification(ref n) if n.title == "Hi" && n.content.is_none()));
    }

    #[test]
    fn server_error_frame_shape() {
        let v = serde_json::to_value(ServerEvent::error("nope")).unwrap();
        assert_eq!(v, serde_json::json!({"event": "error", "data": {"message": "nope"}}));
    }
}
