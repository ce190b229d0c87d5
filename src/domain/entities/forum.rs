use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// グループ単位の投稿一覧キャッシュのキー
pub fn group_posts_cache_key(group_id: &str) -> String {
    format!("posts_{group_id}")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub url: String,
    pub media_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPost {
    pub group_id: String,
    pub author_id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub media: Vec<MediaAttachment>,
}

impl NewPost {
    pub fn rpc_params(&self) -> Value {
        json!({
            "p_group_id": self.group_id,
            "p_author_id": self.author_id,
            "p_title": self.title,
            "p_content": self.content,
            "p_media": self.media,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewComment {
    pub post_id: String,
    pub group_id: String,
    pub author_id: String,
    /// 通知先（投稿者）
    pub post_author_id: String,
    pub content: String,
}

impl NewComment {
    pub fn row(&self) -> Value {
        json!({
            "post_id": self.post_id,
            "author_id": self.author_id,
            "content": self.content,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub post_id: String,
    pub group_id: String,
    pub user_id: String,
    pub post_author_id: String,
    pub reaction_type: String,
}

impl Reaction {
    pub fn rpc_params(&self) -> Value {
        json!({
            "p_post_id": self.post_id,
            "p_user_id": self.user_id,
            "p_reaction_type": self.reaction_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_uses_group_prefix() {
        assert_eq!(group_posts_cache_key("3"), "posts_3");
    }

    #[test]
    fn post_rpc_params_include_media() {
        let post = NewPost {
            group_id: "g1".into(),
            author_id: "u1".into(),
            title: "Hola".into(),
            content: "Primer post".into(),
            media: vec![MediaAttachment {
                url: "https://cdn.example/a.png".into(),
                media_type: "image".into(),
                file_name: None,
            }],
        };
        let params = post.rpc_params();
        assert_eq!(params["p_group_id"], "g1");
        assert_eq!(params["p_media"][0]["media_type"], "image");
    }
}
