use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    NewPost,
    NewComment,
    Reaction,
    Reply,
    Mention,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: impl Into<String>,
        kind: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
        data: Map<String, Value>,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            kind,
            title: title.into(),
            message: message.into(),
            data,
            read: false,
            created_at,
            expires_at: created_at + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotificationStats {
    pub total: usize,
    pub unread: usize,
    pub read: usize,
    pub by_type: BTreeMap<NotificationType, usize>,
}

impl NotificationStats {
    pub fn from_notifications<'a>(items: impl IntoIterator<Item = &'a Notification>) -> Self {
        let mut stats = Self::default();
        for item in items {
            stats.total += 1;
            if item.read {
                stats.read += 1;
            } else {
                stats.unread += 1;
            }
            *stats.by_type.entry(item.kind).or_insert(0) += 1;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_after_ttl() {
        let created = Utc::now();
        let n = Notification::new(
            "u1",
            NotificationType::System,
            "t",
            "m",
            Map::new(),
            created,
            Duration::days(30),
        );
        assert_eq!(n.expires_at - n.created_at, Duration::days(30));
        assert!(!n.is_expired(created + Duration::days(29)));
        assert!(n.is_expired(created + Duration::days(30)));
    }

    #[test]
    fn serializes_kind_as_type() {
        let n = Notification::new(
            "u1",
            NotificationType::NewComment,
            "t",
            "m",
            Map::new(),
            Utc::now(),
            Duration::days(1),
        );
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "new_comment");
        assert_eq!(json["read"], false);
    }
}
