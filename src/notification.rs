//! Notification persistence and delivery to live realtime connections.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::error::{ApiError, ErrorCode};
use crate::models::{Id, NewNotification, Notification};
use crate::realtime::{NotificationsData, ServerEvent};
use crate::repo::{Repo, RepoError};

pub type ConnectionId = String;

struct Connection {
    user: Option<Id>,
    sender: mpsc::UnboundedSender<String>,
}

/// Maps each user to at most one live connection; the latest `register` wins.
///
/// Every connection also remembers its user, so a disconnect only clears the
/// user mapping when it still points at that connection.
#[derive(Default)]
pub struct NotificationHub {
    users: DashMap<Id, ConnectionId>,
    connections: DashMap<ConnectionId, Connection>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a connection slot. Frames pushed to it arrive on the receiver.
    pub fn attach(&self) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
        let id = uuid::Uuid::new_v4().to_string();
        let (sender, rx) = mpsc::unbounded_channel();
        self.connections.insert(id.clone(), Connection { user: None, sender });
        (id, rx)
    }

    /// Bind `user` to `conn`, replacing any earlier connection for that user.
    /// Returns false when the connection is unknown.
    pub fn register(&self, user: Id, conn: &str) -> bool {
        let previous = match self.connections.get_mut(conn) {
            Some(mut c) => c.user.replace(user),
            None => return false,
        };
        if let Some(prev) = previous.filter(|p| *p != user) {
            self.users.remove_if(&prev, |_, c| c == conn);
        }
        if let Some(old) = self.users.insert(user, conn.to_string()) {
            if old != conn {
                if let Some(mut c) = self.connections.get_mut(&old) {
                    if c.user == Some(user) {
                        c.user = None;
                    }
                }
            }
        }
        tracing::debug!(%user, conn, "realtime connection registered");
        true
    }

    /// Drop a connection. Returns the user it was serving, if any.
    pub fn unregister(&self, conn: &str) -> Option<Id> {
        let (_, c) = self.connections.remove(conn)?;
        let user = c.user?;
        self.users.remove_if(&user, |_, mapped| mapped == conn);
        tracing::debug!(%user, conn, "realtime connection unregistered");
        Some(user)
    }

    pub fn connection_for(&self, user: Id) -> Option<ConnectionId> {
        self.users.get(&user).map(|c| c.value().clone())
    }

    pub fn user_for(&self, conn: &str) -> Option<Id> {
        self.connections.get(conn).and_then(|c| c.user)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Queue an event on one connection. False if it is gone or closed.
    pub fn send(&self, conn: &str, event: &ServerEvent) -> bool {
        let frame = match serde_json::to_string(event) {
            Ok(f) => f,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode realtime event");
                return false;
            }
        };
        let Some(sender) = self.connections.get(conn).map(|c| c.sender.clone()) else {
            return false;
        };
        if sender.send(frame).is_err() {
            tracing::debug!(conn, "realtime push failed, channel closed");
            return false;
        }
        true
    }

    /// Push to the user's live connection, if there is one. Never retried.
    pub fn push(&self, user: Id, event: &ServerEvent) -> bool {
        match self.connection_for(user) {
            Some(conn) => self.send(&conn, event),
            None => false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// Number of notifications to skip; ignored when negative.
    pub skip: Option<i64>,
    /// Page size; ignored unless positive.
    pub take: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotificationList {
    pub notifications: Vec<Notification>,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MarkedRead {
    pub notification: Notification,
    /// True only for the call that flipped the read flag.
    pub transitioned: bool,
}

fn store_failure(op: &'static str) -> impl Fn(RepoError) -> ApiError {
    move |e| match e {
        RepoError::NotFound => ApiError::not_found("Notification not found", ErrorCode::NotificationNotFound),
        RepoError::Internal(msg) => {
            tracing::error!(op, error = %msg, "notification store failure");
            ApiError::database(format!("Failed to {op}"))
        }
        other => other.into(),
    }
}

pub struct NotificationService<'a> {
    repo: &'a dyn Repo,
    hub: &'a NotificationHub,
}

impl<'a> NotificationService<'a> {
    pub fn new(repo: &'a dyn Repo, hub: &'a NotificationHub) -> Self {
        Self { repo, hub }
    }

    /// Persist, then push to the recipient when connected. A failed push does
    /// not fail the call.
    pub async fn create(&self, payload: NewNotification) -> Result<Notification, ApiError> {
        payload
            .validate()
            .map_err(|e| ApiError::validation("Invalid notification data", ErrorCode::ValidationError, &e))?;
        let n = self.repo.create_notification(payload).await.map_err(store_failure("create notification"))?;
        let delivered = self.hub.push(n.user_id, &ServerEvent::Notifications(NotificationsData::One(n.clone())));
        tracing::info!(notification_id = %n.id, user = %n.user_id, delivered, "notification created");
        Ok(n)
    }

    pub async fn list(&self, user: Id, params: &ListParams) -> Result<NotificationList, ApiError> {
        let skip = params.skip.filter(|s| *s >= 0);
        let take = params.take.filter(|t| *t > 0);
        let (notifications, total) = self
            .repo
            .list_notifications(user, skip, take)
            .await
            .map_err(store_failure("list notifications"))?;
        Ok(NotificationList { notifications, total })
    }

    pub async fn mark_read(&self, user: Id, raw_id: &str) -> Result<MarkedRead, ApiError> {
        let id = Id::parse_str(raw_id.trim())
            .map_err(|_| ApiError::bad_request("Invalid notification id", ErrorCode::InvalidId))?;
        let mut notification = self.repo.get_notification(id).await.map_err(store_failure("load notification"))?;
        if notification.user_id != user {
            return Err(ApiError::forbidden("You are not the recipient of this notification"));
        }
        let transitioned = self
            .repo
            .mark_notification_read(id)
            .await
            .map_err(store_failure("mark notification read"))?;
        notification.is_read = true;
        Ok(MarkedRead { notification, transitioned })
    }
}
