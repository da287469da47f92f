use chrono::Utc;
use serde_json::{json, Value};
use tracing::debug;

use crate::{
    error::{AppError, AppResult},
    interactions::{LikeState, LikeTarget, LikedVideo},
    paths,
    profiles::service::bump_counter,
    retry::retry_on_conflict,
    store::{self, Batch, Guard, StoreError, TreeStore, Write},
};

fn likes_of(node: &Value) -> i64 {
    node.get("likes").and_then(Value::as_i64).unwrap_or(0)
}

/// One read-decide-commit round. `desired` of `None` flips the current flag.
async fn apply_like(
    store: &dyn TreeStore,
    target: &LikeTarget,
    uid: &str,
    desired: Option<bool>,
) -> AppResult<LikeState> {
    let path = target.path();
    let node = store.get(&path).await?.ok_or_else(|| target.not_found())?;

    let liked = node
        .get("likedBy")
        .and_then(|set| set.get(uid))
        .is_some();
    let like = desired.unwrap_or(!liked);
    if like == liked {
        return Ok(LikeState {
            liked,
            likes: likes_of(&node),
        });
    }

    let flag = format!("{path}/likedBy/{uid}");
    let delta = if like { 1 } else { -1 };
    let mut batch = Batch::new()
        .guard(&path, Guard::Exists)
        .guard(&flag, if like { Guard::Missing } else { Guard::Exists })
        .increment(format!("{path}/likes"), delta);
    batch.push(&flag, if like { Write::Set(json!(true)) } else { Write::Remove });

    if let LikeTarget::Video { video_id } = target {
        let index = paths::user_like(uid, video_id);
        if like {
            let entry = LikedVideo {
                created_at: Utc::now(),
            };
            batch.push(index, Write::Set(store::to_value(&entry)?));
        } else {
            batch.push(index, Write::Remove);
        }

        let owner = node.get("userId").and_then(Value::as_str).unwrap_or("");
        bump_counter(store, &mut batch, owner, "likes", delta).await?;
    }

    store.commit(batch).await?;

    let likes = store
        .get(&format!("{path}/likes"))
        .await?
        .and_then(|v| v.as_i64())
        .unwrap_or(0);
    debug!("{} like on {} by {}: {}", if like { "Set" } else { "Cleared" }, path, uid, likes);

    Ok(LikeState { liked: like, likes })
}

/// Makes `uid`'s like on `target` match `like`. Repeating a request is a no-op.
pub async fn set_like(
    store: &dyn TreeStore,
    target: &LikeTarget,
    uid: &str,
    like: bool,
) -> AppResult<LikeState> {
    retry_on_conflict("set like", || apply_like(store, target, uid, Some(like))).await
}

/// Flips `uid`'s like on `target` and returns the new state.
pub async fn toggle_like(
    store: &dyn TreeStore,
    target: &LikeTarget,
    uid: &str,
) -> AppResult<LikeState> {
    retry_on_conflict("toggle like", || apply_like(store, target, uid, None)).await
}

async fn bump_video_counter(store: &dyn TreeStore, video_id: &str, field: &str) -> AppResult<i64> {
    let path = paths::video(video_id);
    let batch = Batch::new()
        .guard(&path, Guard::Exists)
        .increment(format!("{path}/{field}"), 1);

    match store.commit(batch).await {
        Ok(()) => {}
        Err(StoreError::Conflict(_)) => {
            return Err(AppError::NotFound("Video not found".to_string()))
        }
        Err(e) => return Err(e.into()),
    }

    Ok(store
        .get(&format!("{path}/{field}"))
        .await?
        .and_then(|v| v.as_i64())
        .unwrap_or(0))
}

pub async fn record_view(store: &dyn TreeStore, video_id: &str) -> AppResult<i64> {
    bump_video_counter(store, video_id, "views").await
}

pub async fn record_share(store: &dyn TreeStore, video_id: &str) -> AppResult<i64> {
    bump_video_counter(store, video_id, "shares").await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn video(id: &str) -> LikeTarget {
        LikeTarget::Video {
            video_id: id.to_string(),
        }
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .set(
                "",
                json!({
                    "users": {"owner": {"profile": {"name": "owner", "likes": 0}}},
                    "videos": {"v1": {"id": "v1", "userId": "owner", "likes": 0}},
                    "videoComments": {"v1": {"c1": {"userId": "owner", "text": "hi"}}}
                }),
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_like_is_idempotent() {
        let store = seeded().await;

        let first = set_like(&store, &video("v1"), "u1", true).await.unwrap();
        let again = set_like(&store, &video("v1"), "u1", true).await.unwrap();
        assert_eq!(first, LikeState { liked: true, likes: 1 });
        assert_eq!(again, first);

        assert!(store.exists("userLikes/u1/v1").await.unwrap());
        assert_eq!(
            store.get("users/owner/profile/likes").await.unwrap(),
            Some(json!(1))
        );
    }

    #[tokio::test]
    async fn test_unlike_without_like_never_goes_negative() {
        let store = seeded().await;

        let state = set_like(&store, &video("v1"), "u1", false).await.unwrap();
        assert_eq!(state, LikeState { liked: false, likes: 0 });
        assert_eq!(store.get("videos/v1/likes").await.unwrap(), Some(json!(0)));
    }

    #[tokio::test]
    async fn test_toggle_flips_and_unindexes() {
        let store = seeded().await;

        assert!(toggle_like(&store, &video("v1"), "u1").await.unwrap().liked);
        let state = toggle_like(&store, &video("v1"), "u1").await.unwrap();
        assert_eq!(state, LikeState { liked: false, likes: 0 });
        assert!(!store.exists("userLikes/u1/v1").await.unwrap());
        assert!(!store.exists("videos/v1/likedBy").await.unwrap());
    }

    #[tokio::test]
    async fn test_comment_likes_keep_no_actor_index() {
        let store = seeded().await;
        let target = LikeTarget::Comment {
            video_id: "v1".to_string(),
            comment_id: "c1".to_string(),
        };

        let state = set_like(&store, &target, "u1", true).await.unwrap();
        assert_eq!(state.likes, 1);
        assert!(store.get("userLikes").await.unwrap().is_none());
        assert_eq!(
            store.get("users/owner/profile/likes").await.unwrap(),
            Some(json!(0))
        );
    }

    #[tokio::test]
    async fn test_missing_target_is_not_found() {
        let store = seeded().await;

        let err = set_like(&store, &video("gone"), "u1", true).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        let err = record_view(&store, "gone").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(store.get("videos/gone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_views_and_shares_count_up() {
        let store = seeded().await;

        record_view(&store, "v1").await.unwrap();
        assert_eq!(record_view(&store, "v1").await.unwrap(), 2);
        assert_eq!(record_share(&store, "v1").await.unwrap(), 1);
    }
}
