use std::collections::HashMap;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::Actor,
    comments::{AuthoredComment, Comment, CommentResponse, CommentText, Reply, ReplyResponse},
    error::{AppError, AppResult},
    paths,
    profiles::service::{bump_counter, resolve_profile},
    retry::retry_on_conflict,
    store::{self, Batch, Guard, TreeStore},
};

fn checked_text(raw: &str) -> AppResult<String> {
    let body = CommentText {
        text: raw.trim().to_string(),
    };
    body.validate()
        .map_err(|e| AppError::UnprocessableEntity(e.to_string()))?;
    Ok(body.text)
}

async fn load_comment(store: &dyn TreeStore, video_id: &str, comment_id: &str) -> AppResult<Comment> {
    store::get_as(store, &paths::comment(video_id, comment_id))
        .await?
        .ok_or(AppError::NotFound("Comment not found".to_string()))
}

/// Removes the authorship index entries of a comment and its replies from
/// `batch` and tallies how many entries each author loses.
pub(crate) fn unindex_comment(
    batch: &mut Batch,
    comment_id: &str,
    comment: &Comment,
    lost: &mut HashMap<String, i64>,
) {
    batch.push(
        paths::user_comment(&comment.user_id, comment_id),
        store::Write::Remove,
    );
    *lost.entry(comment.user_id.clone()).or_default() += 1;

    for (reply_id, reply) in &comment.replies {
        batch.push(paths::user_comment(&reply.user_id, reply_id), store::Write::Remove);
        *lost.entry(reply.user_id.clone()).or_default() += 1;
    }
}

async fn insert_comment(
    store: &dyn TreeStore,
    actor: &Actor,
    video_id: &str,
    comment_id: &str,
    comment: &Comment,
) -> AppResult<()> {
    let video_path = paths::video(video_id);
    if !store.exists(&video_path).await? {
        return Err(AppError::NotFound("Video not found".to_string()));
    }

    let comment_path = paths::comment(video_id, comment_id);
    let entry = AuthoredComment {
        video_id: video_id.to_string(),
        created_at: comment.created_at,
        parent_id: None,
    };

    let mut batch = Batch::new()
        .guard(&video_path, Guard::Exists)
        .guard(&comment_path, Guard::Missing)
        .set(&comment_path, store::to_value(comment)?)
        .set(
            paths::user_comment(&actor.uid, comment_id),
            store::to_value(&entry)?,
        )
        .increment(format!("{video_path}/comments"), 1);
    bump_counter(store, &mut batch, &actor.uid, "comments", 1).await?;

    store.commit(batch).await?;
    Ok(())
}

/// Comment on a video. The record, the author's index entry and both
/// counters land in one commit.
pub async fn create_comment(
    store: &dyn TreeStore,
    actor: &Actor,
    video_id: &str,
    text: &str,
) -> AppResult<CommentResponse> {
    let text = checked_text(text)?;
    let author = resolve_profile(store, &actor.uid, Some(actor)).await?;

    let comment_id = Uuid::new_v4().to_string();
    let comment = Comment {
        user_id: actor.uid.clone(),
        text,
        created_at: Utc::now(),
        ..Default::default()
    };

    retry_on_conflict("create comment", || {
        insert_comment(store, actor, video_id, &comment_id, &comment)
    })
    .await?;

    info!("Comment {} added to video {}", comment_id, video_id);

    Ok(CommentResponse::new(
        &comment_id,
        video_id,
        comment,
        Some(&author),
        Vec::new(),
        Some(&actor.uid),
    ))
}

pub async fn update_comment(
    store: &dyn TreeStore,
    actor: &Actor,
    video_id: &str,
    comment_id: &str,
    text: &str,
) -> AppResult<Comment> {
    let text = checked_text(text)?;
    let comment = load_comment(store, video_id, comment_id).await?;
    if comment.user_id != actor.uid {
        return Err(AppError::Forbidden(
            "You can only edit your own comments".to_string(),
        ));
    }

    let path = paths::comment(video_id, comment_id);
    let batch = Batch::new()
        .guard(&path, Guard::Exists)
        .set(format!("{path}/text"), json!(text))
        .set(format!("{path}/updatedAt"), json!(Utc::now()));
    store.commit(batch).await.map_err(|e| match e {
        store::StoreError::Conflict(_) => AppError::NotFound("Comment not found".to_string()),
        e => e.into(),
    })?;

    load_comment(store, video_id, comment_id).await
}

async fn remove_comment(
    store: &dyn TreeStore,
    actor: &Actor,
    video_id: &str,
    comment_id: &str,
) -> AppResult<()> {
    let path = paths::comment(video_id, comment_id);
    let node = store
        .get(&path)
        .await?
        .ok_or(AppError::NotFound("Comment not found".to_string()))?;
    let comment: Comment =
        serde_json::from_value(node.clone()).map_err(store::StoreError::from)?;
    if comment.user_id != actor.uid {
        return Err(AppError::Forbidden(
            "You can only delete your own comments".to_string(),
        ));
    }

    // Replies posted after the read would keep index entries and counts that
    // this batch does not undo.
    let replies = node.get("replies").cloned().unwrap_or(Value::Null);
    let reply_count = node.get("replyCount").cloned().unwrap_or(Value::Null);
    let mut batch = Batch::new()
        .guard(&path, Guard::Exists)
        .guard(format!("{path}/replies"), Guard::Equals(replies))
        .guard(format!("{path}/replyCount"), Guard::Equals(reply_count))
        .remove(&path);

    let mut lost = HashMap::new();
    unindex_comment(&mut batch, comment_id, &comment, &mut lost);

    let video_path = paths::video(video_id);
    if store.exists(&video_path).await? {
        batch.push_guard(&video_path, Guard::Exists);
        batch.push(format!("{video_path}/comments"), store::Write::Increment(-1));
    } else {
        batch.push_guard(&video_path, Guard::Missing);
    }

    for (uid, count) in &lost {
        bump_counter(store, &mut batch, uid, "comments", -count).await?;
    }

    store.commit(batch).await?;
    Ok(())
}

/// Deletes a comment with its replies. The video counter drops by exactly 1.
pub async fn delete_comment(
    store: &dyn TreeStore,
    actor: &Actor,
    video_id: &str,
    comment_id: &str,
) -> AppResult<()> {
    retry_on_conflict("delete comment", || {
        remove_comment(store, actor, video_id, comment_id)
    })
    .await?;

    info!("Comment {} removed from video {}", comment_id, video_id);
    Ok(())
}

async fn insert_reply(
    store: &dyn TreeStore,
    actor: &Actor,
    video_id: &str,
    comment_id: &str,
    reply_id: &str,
    reply: &Reply,
) -> AppResult<()> {
    let comment_path = paths::comment(video_id, comment_id);
    if !store.exists(&comment_path).await? {
        return Err(AppError::NotFound("Comment not found".to_string()));
    }

    let reply_path = paths::reply(video_id, comment_id, reply_id);
    let entry = AuthoredComment {
        video_id: video_id.to_string(),
        created_at: reply.created_at,
        parent_id: Some(comment_id.to_string()),
    };

    let mut batch = Batch::new()
        .guard(&comment_path, Guard::Exists)
        .guard(&reply_path, Guard::Missing)
        .set(&reply_path, store::to_value(reply)?)
        .set(
            paths::user_comment(&actor.uid, reply_id),
            store::to_value(&entry)?,
        )
        .increment(format!("{comment_path}/replyCount"), 1);
    bump_counter(store, &mut batch, &actor.uid, "comments", 1).await?;

    store.commit(batch).await?;
    Ok(())
}

pub async fn create_reply(
    store: &dyn TreeStore,
    actor: &Actor,
    video_id: &str,
    comment_id: &str,
    text: &str,
) -> AppResult<ReplyResponse> {
    let text = checked_text(text)?;
    let author = resolve_profile(store, &actor.uid, Some(actor)).await?;

    let reply_id = Uuid::new_v4().to_string();
    let reply = Reply {
        user_id: actor.uid.clone(),
        text,
        created_at: Utc::now(),
        parent_id: comment_id.to_string(),
        ..Default::default()
    };

    retry_on_conflict("create reply", || {
        insert_reply(store, actor, video_id, comment_id, &reply_id, &reply)
    })
    .await?;

    Ok(ReplyResponse::new(
        &reply_id,
        reply,
        Some(&author),
        Some(&actor.uid),
    ))
}

async fn remove_reply(
    store: &dyn TreeStore,
    actor: &Actor,
    video_id: &str,
    comment_id: &str,
    reply_id: &str,
) -> AppResult<()> {
    let reply_path = paths::reply(video_id, comment_id, reply_id);
    let reply: Reply = store::get_as(store, &reply_path)
        .await?
        .ok_or(AppError::NotFound("Reply not found".to_string()))?;
    if reply.user_id != actor.uid {
        return Err(AppError::Forbidden(
            "You can only delete your own replies".to_string(),
        ));
    }

    let comment_path = paths::comment(video_id, comment_id);
    let mut batch = Batch::new()
        .guard(&reply_path, Guard::Exists)
        .remove(&reply_path)
        .remove(paths::user_comment(&reply.user_id, reply_id))
        .increment(format!("{comment_path}/replyCount"), -1);
    bump_counter(store, &mut batch, &reply.user_id, "comments", -1).await?;

    store.commit(batch).await?;
    Ok(())
}

/// Deletes a reply. The parent's `replyCount` drops by exactly 1.
pub async fn delete_reply(
    store: &dyn TreeStore,
    actor: &Actor,
    video_id: &str,
    comment_id: &str,
    reply_id: &str,
) -> AppResult<()> {
    retry_on_conflict("delete reply", || {
        remove_reply(store, actor, video_id, comment_id, reply_id)
    })
    .await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::repair::reconcile;
    use crate::store::{MemoryStore, StoreError, Write};

    /// Posts one reply between the reads of a comment delete and its commit.
    struct LateReplyStore {
        inner: MemoryStore,
        comment_id: String,
        replied: AtomicBool,
    }

    #[async_trait]
    impl TreeStore for LateReplyStore {
        async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
            self.inner.get(path).await
        }

        async fn commit(&self, batch: Batch) -> Result<(), StoreError> {
            let comment_path = paths::comment("v1", &self.comment_id);
            let deletes = batch
                .writes
                .iter()
                .any(|(p, w)| *p == comment_path && *w == Write::Remove);
            if deletes && !self.replied.swap(true, Ordering::SeqCst) {
                create_reply(&self.inner, &actor("late"), "v1", &self.comment_id, "me too")
                    .await
                    .unwrap();
            }
            self.inner.commit(batch).await
        }
    }

    fn actor(uid: &str) -> Actor {
        Actor {
            uid: uid.to_string(),
            email: format!("{uid}@example.com"),
        }
    }

    async fn store_with_video() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .set("videos/v1", json!({"id": "v1", "title": "clip", "userId": "owner"}))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_comment_text_is_trimmed_and_bounded() {
        let store = store_with_video().await;
        let me = actor("u1");

        let err = create_comment(&store, &me, "v1", "   ").await.unwrap_err();
        assert!(matches!(err, AppError::UnprocessableEntity(_)));
        let err = create_comment(&store, &me, "v1", &"x".repeat(2001))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnprocessableEntity(_)));

        let created = create_comment(&store, &me, "v1", "  nice  ").await.unwrap();
        assert_eq!(created.text, "nice");
    }

    #[tokio::test]
    async fn test_comment_on_missing_video_writes_nothing() {
        let store = MemoryStore::new();
        let me = actor("u1");

        let err = create_comment(&store, &me, "nope", "hello").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(store.get("videoComments").await.unwrap().is_none());
        assert!(store.get("userComments").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_only_author_may_edit_or_delete() {
        let store = store_with_video().await;
        let me = actor("u1");
        let other = actor("u2");

        let created = create_comment(&store, &me, "v1", "first").await.unwrap();

        let err = update_comment(&store, &other, "v1", &created.id, "hijack")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        let err = delete_comment(&store, &other, "v1", &created.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let edited = update_comment(&store, &me, "v1", &created.id, "first!")
            .await
            .unwrap();
        assert_eq!(edited.text, "first!");
        assert!(edited.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_deleting_comment_unindexes_reply_authors() {
        let store = store_with_video().await;
        let me = actor("u1");
        let other = actor("u2");

        let comment = create_comment(&store, &me, "v1", "top").await.unwrap();
        let reply = create_reply(&store, &other, "v1", &comment.id, "answer")
            .await
            .unwrap();
        assert_eq!(reply.parent_id, comment.id);

        let path = format!("userComments/u2/{}", reply.id);
        assert!(store.exists(&path).await.unwrap());

        delete_comment(&store, &me, "v1", &comment.id).await.unwrap();

        assert!(!store.exists(&path).await.unwrap());
        let profile = crate::profiles::service::find_profile(&store, "u2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.comments, 0);
        assert_eq!(
            store.get("videos/v1/comments").await.unwrap(),
            Some(json!(0))
        );
    }

    #[tokio::test]
    async fn test_delete_comment_accounts_for_late_reply() {
        let inner = store_with_video().await;
        let me = actor("u1");
        let created = create_comment(&inner, &me, "v1", "first").await.unwrap();
        let store = LateReplyStore {
            inner,
            comment_id: created.id.clone(),
            replied: AtomicBool::new(false),
        };

        delete_comment(&store, &me, "v1", &created.id).await.unwrap();

        assert!(store.replied.load(Ordering::SeqCst));
        let late = store.inner.get("users/late/profile").await.unwrap().unwrap();
        assert_eq!(late.get("comments").and_then(Value::as_i64).unwrap_or(0), 0);
        assert!(store.inner.get("userComments").await.unwrap().is_none());
        assert!(store.inner.get("videoComments").await.unwrap().is_none());
        assert!(reconcile(&store.inner, true).await.unwrap().is_clean());
    }
}
