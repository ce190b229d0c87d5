use crate::shared::clock::Clock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
struct CacheEntry<T> {
    data: T,
    expiry: i64,
}

/// TTL 付きのメモリキャッシュ
///
/// 期限切れエントリは `get` 時に遅延削除する（バックグラウンドの掃除はしない）。
pub struct DataCache<T: Clone> {
    cache: Arc<RwLock<HashMap<String, CacheEntry<T>>>>,
    default_ttl_ms: i64,
    clock: Arc<dyn Clock>,
}

impl<T> DataCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(default_ttl_ms: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            default_ttl_ms,
            clock,
        }
    }

    /// 既定TTLで保存
    pub async fn set(&self, key: impl Into<String>, value: T) {
        self.set_with_ttl(key, value, self.default_ttl_ms).await;
    }

    /// 指定したTTLで保存（既存エントリは上書き）
    pub async fn set_with_ttl(&self, key: impl Into<String>, value: T, ttl_ms: i64) {
        let now = self.clock.now_ms();
        let entry = CacheEntry {
            data: value,
            expiry: now.saturating_add(ttl_ms),
        };

        let mut cache = self.cache.write().await;
        cache.insert(key.into(), entry);
    }

    pub async fn get(&self, key: &str) -> Option<T> {
        let now = self.clock.now_ms();
        {
            let cache = self.cache.read().await;
            match cache.get(key) {
                None => return None,
                Some(entry) if entry.expiry > now => return Some(entry.data.clone()),
                Some(_) => {}
            }
        }

        // 期限切れ: 書き込みロックを取り直して削除
        let mut cache = self.cache.write().await;
        if cache.get(key).is_some_and(|entry| entry.expiry <= now) {
            cache.remove(key);
        }
        None
    }

    pub async fn delete(&self, key: &str) {
        let mut cache = self.cache.write().await;
        cache.remove(key);
    }

    /// `pattern` を部分文字列として含むキーをすべて削除
    pub async fn invalidate(&self, pattern: &str) -> usize {
        let mut cache = self.cache.write().await;
        let before = cache.len();
        cache.retain(|key, _| !key.contains(pattern));
        before - cache.len()
    }

    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        cache.clear();
    }

    /// 期限切れのエントリを削除
    pub async fn cleanup_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut cache = self.cache.write().await;
        let before = cache.len();
        cache.retain(|_, entry| entry.expiry > now);
        before - cache.len()
    }

    pub async fn len(&self) -> usize {
        let cache = self.cache.read().await;
        cache.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
