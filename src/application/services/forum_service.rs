use crate::application::ports::remote_backend::{
    RPC_CREATE_POST_WITH_MEDIA, RPC_SMART_INCREMENT_REACTION, RemoteBackend, TABLE_COMMENTS,
    TABLE_POSTS,
};
use crate::application::services::audit_logger::AuditLogger;
use crate::application::services::notification_service::NotificationService;
use crate::application::services::rate_limit_service::RateLimitService;
use crate::domain::entities::{
    AuditUser, LogAction, NewComment, NewPost, NotificationType, Reaction, group_posts_cache_key,
};
use crate::infrastructure::cache::DataCache;
use crate::shared::config::{
    ACTION_AUTH, ACTION_COMMENTS, ACTION_POSTS, ACTION_REACTIONS, ACTION_UPLOADS,
};
use crate::shared::error::AppError;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{debug, error};

/// UI 操作の入口
///
/// レート制限 → バックエンド → キャッシュ無効化 → 監査ログ → 通知 の順に処理する。
pub struct ForumService {
    backend: Arc<dyn RemoteBackend>,
    cache: Arc<DataCache<Vec<Value>>>,
    limits: Arc<RateLimitService>,
    audit: Arc<AuditLogger>,
    notifications: Arc<NotificationService>,
}

impl ForumService {
    pub fn new(
        backend: Arc<dyn RemoteBackend>,
        cache: Arc<DataCache<Vec<Value>>>,
        limits: Arc<RateLimitService>,
        audit: Arc<AuditLogger>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            backend,
            cache,
            limits,
            audit,
            notifications,
        }
    }

    pub async fn login(&self, user: AuditUser) -> Result<(), AppError> {
        self.gate(ACTION_AUTH).await?;
        let user_id = user.user_id.clone();
        self.audit.set_user(Some(user)).await;
        self.notifications.initialize(&user_id).await;
        self.audit.info(LogAction::Login, Map::new()).await;
        Ok(())
    }

    pub async fn logout(&self) {
        self.audit.info(LogAction::Logout, Map::new()).await;
        self.audit.set_user(None).await;
        self.notifications.reset().await;
    }

    pub async fn list_posts(&self, group_id: &str) -> Result<Vec<Value>, AppError> {
        let key = group_posts_cache_key(group_id);
        if let Some(posts) = self.cache.get(&key).await {
            debug!(group_id, "posts served from cache");
            return Ok(posts);
        }
        let posts = self
            .backend
            .select_eq(TABLE_POSTS, "group_id", group_id)
            .await?;
        self.cache.set(key, posts.clone()).await;
        Ok(posts)
    }

    pub async fn create_post(&self, post: NewPost) -> Result<Value, AppError> {
        self.gate(ACTION_POSTS).await?;
        let created = match self
            .backend
            .call_rpc(RPC_CREATE_POST_WITH_MEDIA, post.rpc_params())
            .await
        {
            Ok(created) => created,
            Err(err) => return Err(self.backend_failure("create_post", err).await),
        };
        self.cache
            .invalidate(&group_posts_cache_key(&post.group_id))
            .await;

        let mut details = Map::new();
        details.insert("post_id".to_string(), created.get("id").cloned().unwrap_or(Value::Null));
        details.insert("group_id".to_string(), Value::String(post.group_id));
        details.insert("media".to_string(), Value::from(post.media.len()));
        self.audit.info(LogAction::PostCreated, details).await;
        Ok(created)
    }

    pub async fn add_comment(&self, comment: NewComment) -> Result<(), AppError> {
        self.gate(ACTION_COMMENTS).await?;
        if let Err(err) = self.backend.insert_row(TABLE_COMMENTS, comment.row()).await {
            return Err(self.backend_failure("add_comment", err).await);
        }
        self.cache
            .invalidate(&group_posts_cache_key(&comment.group_id))
            .await;

        let mut details = Map::new();
        details.insert("post_id".to_string(), Value::String(comment.post_id.clone()));
        details.insert("group_id".to_string(), Value::String(comment.group_id.clone()));
        self.audit.info(LogAction::CommentCreated, details).await;

        if comment.post_author_id != comment.author_id {
            let mut data = Map::new();
            data.insert("post_id".to_string(), Value::String(comment.post_id));
            data.insert("group_id".to_string(), Value::String(comment.group_id));
            data.insert("author_id".to_string(), Value::String(comment.author_id));
            self.notifications
                .create_notification(
                    &comment.post_author_id,
                    NotificationType::NewComment,
                    "Nuevo comentario",
                    "Alguien comentó tu publicación",
                    data,
                )
                .await;
        }
        Ok(())
    }

    pub async fn react(&self, reaction: Reaction) -> Result<Value, AppError> {
        self.gate(ACTION_REACTIONS).await?;
        let result = match self
            .backend
            .call_rpc(RPC_SMART_INCREMENT_REACTION, reaction.rpc_params())
            .await
        {
            Ok(result) => result,
            Err(err) => return Err(self.backend_failure("react", err).await),
        };
        self.cache
            .invalidate(&group_posts_cache_key(&reaction.group_id))
            .await;

        let mut details = Map::new();
        details.insert("post_id".to_string(), Value::String(reaction.post_id.clone()));
        details.insert(
            "reaction_type".to_string(),
            Value::String(reaction.reaction_type.clone()),
        );
        self.audit.info(LogAction::ReactionAdded, details).await;

        if reaction.post_author_id != reaction.user_id {
            let mut data = Map::new();
            data.insert("post_id".to_string(), Value::String(reaction.post_id));
            data.insert("reaction_type".to_string(), Value::String(reaction.reaction_type));
            data.insert("user_id".to_string(), Value::String(reaction.user_id));
            self.notifications
                .create_notification(
                    &reaction.post_author_id,
                    NotificationType::Reaction,
                    "Nueva reacción",
                    "Alguien reaccionó a tu publicación",
                    data,
                )
                .await;
        }
        Ok(result)
    }

    pub async fn register_upload(&self, file_name: &str, size_bytes: u64) -> Result<(), AppError> {
        self.gate(ACTION_UPLOADS).await?;
        let mut details = Map::new();
        details.insert("file_name".to_string(), Value::String(file_name.to_string()));
        details.insert("size".to_string(), Value::from(size_bytes));
        self.audit.info(LogAction::FileUploaded, details).await;
        Ok(())
    }

    async fn gate(&self, action: &str) -> Result<(), AppError> {
        let decision = self.limits.check_limit(action).await;
        if decision.allowed {
            return Ok(());
        }
        let retry_after = decision.retry_after.unwrap_or(1);
        let mut details = Map::new();
        details.insert("action".to_string(), Value::String(action.to_string()));
        details.insert("retry_after".to_string(), json!(retry_after));
        self.audit.warning(LogAction::RateLimitExceeded, details).await;
        Err(AppError::rate_limited(
            format!("Too many {action} requests, retry in {retry_after}s"),
            retry_after,
        ))
    }

    async fn backend_failure(&self, operation: &str, err: AppError) -> AppError {
        error!(operation, error = %err, "backend call failed");
        let mut details = Map::new();
        details.insert("operation".to_string(), Value::String(operation.to_string()));
        details.insert("error".to_string(), Value::String(err.to_string()));
        self.audit.error(LogAction::SystemError, details).await;
        err
    }
}
