use crate::application::ports::local_storage::{LocalStorage, notifications_key};
use crate::domain::entities::{Notification, NotificationStats, NotificationType};
use crate::shared::bounded::BoundedList;
use crate::shared::clock::Clock;
use crate::shared::config::MAX_NOTIFICATION_TTL_DAYS;
use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

struct FeedState {
    user_key: Option<String>,
    items: BoundedList<Notification>,
    unread: usize,
}

impl FeedState {
    fn recount(&mut self) {
        self.unread = self.items.iter().filter(|n| !n.read).count();
    }
}

/// ログイン中ユーザーの通知フィード
///
/// 新しい順に最大 `max_entries` 件、期限切れは読み込み時に除去する。
pub struct NotificationService {
    storage: Arc<dyn LocalStorage>,
    clock: Arc<dyn Clock>,
    max_entries: usize,
    ttl: Duration,
    state: Mutex<FeedState>,
}

impl NotificationService {
    pub fn new(
        storage: Arc<dyn LocalStorage>,
        clock: Arc<dyn Clock>,
        max_entries: usize,
        ttl_days: i64,
    ) -> Self {
        Self {
            storage,
            clock,
            max_entries,
            ttl: Duration::days(ttl_days.clamp(1, MAX_NOTIFICATION_TTL_DAYS)),
            state: Mutex::new(FeedState {
                user_key: None,
                items: BoundedList::new(max_entries),
                unread: 0,
            }),
        }
    }

    /// 同じユーザーに対しては一度だけ読み込む
    pub async fn initialize(&self, user_key: &str) {
        let mut state = self.state.lock().await;
        if state.user_key.as_deref() == Some(user_key) {
            return;
        }
        let now = self.clock.now();
        let (items, pruned) = self.load_notifications(user_key, now).await;
        state.items = items;
        state.user_key = Some(user_key.to_string());
        state.recount();
        if pruned > 0 {
            debug!(user = %user_key, pruned, "pruned expired notifications");
            self.persist(user_key, &state.items).await;
        }
    }

    /// ログアウト時にフィードを切り離す（ストレージは残す）
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.user_key = None;
        state.items.clear();
        state.unread = 0;
    }

    pub async fn active_user(&self) -> Option<String> {
        self.state.lock().await.user_key.clone()
    }

    pub async fn create_notification(
        &self,
        target_user_id: &str,
        kind: NotificationType,
        title: &str,
        message: &str,
        data: Map<String, Value>,
    ) -> Notification {
        let now = self.clock.now();
        let notification =
            Notification::new(target_user_id, kind, title, message, data, now, self.ttl);

        let mut state = self.state.lock().await;
        if state.user_key.as_deref() == Some(target_user_id) {
            state.items.push(notification.clone());
            state.recount();
            self.persist(target_user_id, &state.items).await;
            return notification;
        }

        // 他ユーザー宛ては相手のキーに直接書き込む（読み書きの間もロックを保持）
        let (mut items, _) = self.load_notifications(target_user_id, now).await;
        items.push(notification.clone());
        self.persist(target_user_id, &items).await;
        drop(state);
        notification
    }

    pub async fn mark_as_read(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(item) = state.items.find_mut(|n| n.id == id) else {
            return false;
        };
        if item.read {
            return true;
        }
        item.read = true;
        state.unread = state.unread.saturating_sub(1);
        self.persist_active(&state).await;
        true
    }

    pub async fn mark_all_as_read(&self) -> usize {
        let mut state = self.state.lock().await;
        let mut changed = 0;
        for item in state.items.iter_mut() {
            if !item.read {
                item.read = true;
                changed += 1;
            }
        }
        state.unread = 0;
        if changed > 0 {
            self.persist_active(&state).await;
        }
        changed
    }

    pub async fn delete_notification(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        match state.items.remove_first(|n| n.id == id) {
            Some(removed) => {
                if !removed.read {
                    state.unread = state.unread.saturating_sub(1);
                }
                self.persist_active(&state).await;
                true
            }
            None => false,
        }
    }

    pub async fn delete_all_notifications(&self) {
        let mut state = self.state.lock().await;
        state.items.clear();
        state.unread = 0;
        if let Some(user_key) = state.user_key.as_deref() {
            if let Err(err) = self.storage.remove_item(&notifications_key(user_key)).await {
                warn!(user = %user_key, error = %err, "failed to remove notifications");
            }
        }
    }

    pub async fn clean_expired_notifications(&self) -> usize {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let removed = state.items.retain(|n| !n.is_expired(now));
        if removed > 0 {
            state.recount();
            self.persist_active(&state).await;
        }
        removed
    }

    pub async fn get_stats(&self) -> NotificationStats {
        let state = self.state.lock().await;
        NotificationStats::from_notifications(state.items.iter())
    }

    /// 新しい順
    pub async fn notifications(&self) -> Vec<Notification> {
        self.state.lock().await.items.to_vec()
    }

    pub async fn unread_count(&self) -> usize {
        self.state.lock().await.unread
    }

    /// 保存済みの通知を読み込み、期限切れを除いた件数とともに返す
    async fn load_notifications(
        &self,
        user_key: &str,
        now: DateTime<Utc>,
    ) -> (BoundedList<Notification>, usize) {
        let key = notifications_key(user_key);
        let raw = match self.storage.get_item(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return (BoundedList::new(self.max_entries), 0),
            Err(err) => {
                warn!(user = %user_key, error = %err, "failed to read notifications");
                return (BoundedList::new(self.max_entries), 0);
            }
        };
        let stored = match serde_json::from_str::<Vec<Notification>>(&raw) {
            Ok(stored) => stored,
            Err(err) => {
                warn!(user = %user_key, error = %err, "corrupt notifications in storage; starting empty");
                return (BoundedList::new(self.max_entries), 0);
            }
        };
        let total = stored.len();
        let live: Vec<Notification> = stored.into_iter().filter(|n| !n.is_expired(now)).collect();
        let pruned = total - live.len();
        (BoundedList::from_newest_first(live, self.max_entries), pruned)
    }

    async fn persist_active(&self, state: &FeedState) {
        if let Some(user_key) = state.user_key.as_deref() {
            self.persist(user_key, &state.items).await;
        }
    }

    async fn persist(&self, user_key: &str, items: &BoundedList<Notification>) {
        let serialized = match serde_json::to_string(&items.to_vec()) {
            Ok(serialized) => serialized,
            Err(err) => {
                warn!(error = %err, "failed to serialize notifications");
                return;
            }
        };
        if let Err(err) = self
            .storage
            .set_item(&notifications_key(user_key), &serialized)
            .await
        {
            warn!(user = %user_key, error = %err, "failed to persist notifications");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::MemoryLocalStorage;
    use crate::shared::clock::ManualClock;

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    fn service(storage: Arc<MemoryLocalStorage>) -> (NotificationService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_767_225_600_000));
        (NotificationService::new(storage, clock.clone(), 50, 30), clock)
    }

    async fn notify(service: &NotificationService, user: &str, title: &str) -> Notification {
        service
            .create_notification(user, NotificationType::System, title, "body", Map::new())
            .await
    }

    async fn assert_unread_invariant(service: &NotificationService) {
        let expected = service.notifications().await.iter().filter(|n| !n.read).count();
        assert_eq!(service.unread_count().await, expected);
    }

    #[tokio::test]
    async fn caps_feed_at_newest_fifty() {
        let storage = Arc::new(MemoryLocalStorage::new());
        let (service, _) = service(storage);
        service.initialize("u1").await;
        for n in 0..51 {
            notify(&service, "u1", &format!("n{n}")).await;
        }
        let items = service.notifications().await;
        assert_eq!(items.len(), 50);
        assert_eq!(items[0].title, "n50");
        assert_eq!(items[49].title, "n1");
        assert_eq!(service.unread_count().await, 50);
    }

    #[tokio::test]
    async fn expired_entries_are_pruned_on_load() {
        let storage = Arc::new(MemoryLocalStorage::new());
        let (first, clock) = service(storage.clone());
        first.initialize("u1").await;
        notify(&first, "u1", "old").await;
        clock.advance(20 * DAY_MS);
        notify(&first, "u1", "recent").await;

        clock.advance(11 * DAY_MS);
        let second = NotificationService::new(storage.clone(), clock.clone(), 50, 30);
        second.initialize("u1").await;
        let items = second.notifications().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "recent");

        let raw = storage.get_item("notifications_u1").await.unwrap().unwrap();
        let persisted: Vec<Notification> = serde_json::from_str(&raw).unwrap();
        assert_eq!(persisted.len(), 1);
    }

    #[tokio::test]
    async fn clean_expired_keeps_unread_consistent() {
        let (service, clock) = service(Arc::new(MemoryLocalStorage::new()));
        service.initialize("u1").await;
        notify(&service, "u1", "a").await;
        clock.advance(DAY_MS);
        notify(&service, "u1", "b").await;

        clock.advance(30 * DAY_MS - 1);
        assert_eq!(service.clean_expired_notifications().await, 1);
        assert_eq!(service.unread_count().await, 1);
        assert_unread_invariant(&service).await;
    }

    #[tokio::test]
    async fn read_and_delete_maintain_unread_count() {
        let (service, _) = service(Arc::new(MemoryLocalStorage::new()));
        service.initialize("u1").await;
        let a = notify(&service, "u1", "a").await;
        let b = notify(&service, "u1", "b").await;
        let c = notify(&service, "u1", "c").await;

        assert!(service.mark_as_read(&a.id).await);
        assert!(service.mark_as_read(&a.id).await);
        assert_eq!(service.unread_count().await, 2);
        assert_unread_invariant(&service).await;

        assert!(service.delete_notification(&b.id).await);
        assert_eq!(service.unread_count().await, 1);
        assert!(!service.delete_notification("missing").await);
        assert!(!service.mark_as_read("missing").await);
        assert_unread_invariant(&service).await;

        assert_eq!(service.mark_all_as_read().await, 1);
        assert_eq!(service.unread_count().await, 0);
        assert!(service.delete_notification(&c.id).await);
        assert_unread_invariant(&service).await;
    }

    #[tokio::test]
    async fn delete_all_removes_storage_key() {
        let storage = Arc::new(MemoryLocalStorage::new());
        let (service, _) = service(storage.clone());
        service.initialize("u1").await;
        notify(&service, "u1", "a").await;
        service.delete_all_notifications().await;

        assert!(service.notifications().await.is_empty());
        assert_eq!(service.unread_count().await, 0);
        assert!(storage.get_item("notifications_u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn notifications_for_other_users_go_to_their_key() {
        let storage = Arc::new(MemoryLocalStorage::new());
        let (service, _) = service(storage.clone());
        service.initialize("u1").await;
        notify(&service, "u2", "for u2").await;

        assert!(service.notifications().await.is_empty());
        let raw = storage.get_item("notifications_u2").await.unwrap().unwrap();
        let stored: Vec<Notification> = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored[0].user_id, "u2");

        service.initialize("u2").await;
        assert_eq!(service.unread_count().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_notifications_for_other_user_are_all_kept() {
        let storage = Arc::new(MemoryLocalStorage::new());
        let (service, _) = service(storage.clone());
        let service = Arc::new(service);
        service.initialize("u1").await;

        let mut handles = Vec::new();
        for n in 0..20 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service
                    .create_notification(
                        "u2",
                        NotificationType::Reaction,
                        &format!("r{n}"),
                        "m",
                        Map::new(),
                    )
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let raw = storage.get_item("notifications_u2").await.unwrap().unwrap();
        let stored: Vec<Notification> = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored.len(), 20);

        service.initialize("u2").await;
        assert_eq!(service.unread_count().await, 20);
    }

    #[tokio::test]
    async fn oversized_ttl_is_clamped() {
        let clock = Arc::new(ManualClock::new(1_767_225_600_000));
        let service = NotificationService::new(
            Arc::new(MemoryLocalStorage::new()),
            clock,
            50,
            1_000_000_000_000,
        );
        service.initialize("u1").await;
        let n = notify(&service, "u1", "a").await;
        assert_eq!(
            n.expires_at - n.created_at,
            Duration::days(MAX_NOTIFICATION_TTL_DAYS)
        );
    }

    #[tokio::test]
    async fn stats_group_by_type() {
        let (service, _) = service(Arc::new(MemoryLocalStorage::new()));
        service.initialize("u1").await;
        let first = service
            .create_notification("u1", NotificationType::Reaction, "r", "m", Map::new())
            .await;
        service
            .create_notification("u1", NotificationType::NewComment, "c", "m", Map::new())
            .await;
        service.mark_as_read(&first.id).await;

        let stats = service.get_stats().await;
        assert_eq!(stats.total, 2);
        assert_eq!(stats.read, 1);
        assert_eq!(stats.unread, 1);
        assert_eq!(stats.by_type[&NotificationType::Reaction], 1);
    }
}
