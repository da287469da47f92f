//! Read side: materializes collections, joins live profile data and sorts in
//! memory. Any failed read fails the whole assembly.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::{
    comments::{Comment, CommentResponse, CommentSort, ReplyResponse},
    error::AppResult,
    feed::{FeedSort, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, TRENDING_SIZE},
    paths,
    profiles::{service::find_profile, Profile},
    store::{self, TreeStore},
    videos::{Video, VideoResponse},
};

/// Profiles fetched once per owner for the duration of one assembly.
struct ProfileCache<'a> {
    store: &'a dyn TreeStore,
    seen: HashMap<String, Option<Profile>>,
}

impl<'a> ProfileCache<'a> {
    fn new(store: &'a dyn TreeStore) -> Self {
        Self {
            store,
            seen: HashMap::new(),
        }
    }

    async fn get(&mut self, uid: &str) -> AppResult<Option<&Profile>> {
        if !self.seen.contains_key(uid) {
            let profile = find_profile(self.store, uid).await?;
            self.seen.insert(uid.to_string(), profile);
        }
        Ok(self.seen.get(uid).and_then(Option::as_ref))
    }
}

async fn join_profiles(
    store: &dyn TreeStore,
    videos: Vec<(String, Video)>,
    viewer: Option<&str>,
) -> AppResult<Vec<VideoResponse>> {
    let mut profiles = ProfileCache::new(store);
    let mut out = Vec::with_capacity(videos.len());
    for (id, video) in videos {
        let owner = profiles.get(&video.user_id).await?;
        out.push(VideoResponse::new(&id, video, owner, viewer));
    }
    Ok(out)
}

/// Every video with its owner's current display fields, in collection order.
pub async fn assemble_videos(
    store: &dyn TreeStore,
    viewer: Option<&str>,
) -> AppResult<Vec<VideoResponse>> {
    let videos: Vec<(String, Video)> = store::children_as(store, paths::VIDEOS).await?;
    join_profiles(store, videos, viewer).await
}

fn newest_first(a: &VideoResponse, b: &VideoResponse) -> Ordering {
    b.created_at.cmp(&a.created_at)
}

pub fn sort_videos(videos: &mut [VideoResponse], sort: FeedSort) {
    match sort {
        FeedSort::Recent => videos.sort_by(newest_first),
        FeedSort::Likes => {
            videos.sort_by(|a, b| b.likes.cmp(&a.likes).then_with(|| newest_first(a, b)))
        }
        FeedSort::Comments => videos
            .sort_by(|a, b| b.comments.cmp(&a.comments).then_with(|| newest_first(a, b))),
    }
}

/// The main feed page.
pub async fn feed(
    store: &dyn TreeStore,
    viewer: Option<&str>,
    sort: FeedSort,
    limit: Option<usize>,
    offset: Option<usize>,
) -> AppResult<Vec<VideoResponse>> {
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = offset.unwrap_or(0);

    let mut videos = assemble_videos(store, viewer).await?;
    sort_videos(&mut videos, sort);
    Ok(videos.into_iter().skip(offset).take(limit).collect())
}

/// The most liked videos.
pub async fn trending(store: &dyn TreeStore, viewer: Option<&str>) -> AppResult<Vec<VideoResponse>> {
    let mut videos = assemble_videos(store, viewer).await?;
    sort_videos(&mut videos, FeedSort::Likes);
    videos.truncate(TRENDING_SIZE);
    Ok(videos)
}

/// Case-insensitive substring match on titles. Without a sort the result
/// keeps collection order.
pub async fn search(
    store: &dyn TreeStore,
    viewer: Option<&str>,
    query: &str,
    sort: Option<FeedSort>,
) -> AppResult<Vec<VideoResponse>> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Ok(Vec::new());
    }

    let mut videos: Vec<VideoResponse> = assemble_videos(store, viewer)
        .await?
        .into_iter()
        .filter(|v| v.title.to_lowercase().contains(&needle))
        .collect();
    if let Some(sort) = sort {
        sort_videos(&mut videos, sort);
    }
    Ok(videos)
}

/// Videos owned by `uid`, newest first, read through the ownership index.
pub async fn user_videos(
    store: &dyn TreeStore,
    viewer: Option<&str>,
    uid: &str,
) -> AppResult<Vec<VideoResponse>> {
    let mut videos = Vec::new();
    for id in store::child_keys(store, &paths::user_videos(uid)).await? {
        if let Some(video) = store::get_as::<Video>(store, &paths::video(&id)).await? {
            videos.push((id, video));
        }
    }

    let mut out = join_profiles(store, videos, viewer).await?;
    sort_videos(&mut out, FeedSort::Recent);
    Ok(out)
}

/// Videos from accounts `uid` follows, newest first.
pub async fn following_feed(store: &dyn TreeStore, uid: &str) -> AppResult<Vec<VideoResponse>> {
    let following = store::child_keys(store, &paths::following_of(uid)).await?;
    if following.is_empty() {
        return Ok(Vec::new());
    }

    let mut videos: Vec<VideoResponse> = assemble_videos(store, Some(uid))
        .await?
        .into_iter()
        .filter(|v| following.contains(&v.author.id))
        .collect();
    sort_videos(&mut videos, FeedSort::Recent);
    Ok(videos)
}

/// Comments on a video with author display fields, replies oldest first.
pub async fn video_comments(
    store: &dyn TreeStore,
    viewer: Option<&str>,
    video_id: &str,
    sort: CommentSort,
) -> AppResult<Vec<CommentResponse>> {
    let comments: Vec<(String, Comment)> =
        store::children_as(store, &paths::video_comments(video_id)).await?;

    let mut profiles = ProfileCache::new(store);
    let mut out = Vec::with_capacity(comments.len());
    for (id, mut comment) in comments {
        let mut replies: Vec<_> = std::mem::take(&mut comment.replies).into_iter().collect();
        replies.sort_by(|a, b| a.1.created_at.cmp(&b.1.created_at));

        let mut reply_responses = Vec::with_capacity(replies.len());
        for (reply_id, reply) in replies {
            let author = profiles.get(&reply.user_id).await?.cloned();
            reply_responses.push(ReplyResponse::new(&reply_id, reply, author.as_ref(), viewer));
        }

        let author = profiles.get(&comment.user_id).await?.cloned();
        out.push(CommentResponse::new(
            &id,
            video_id,
            comment,
            author.as_ref(),
            reply_responses,
            viewer,
        ));
    }

    match sort {
        CommentSort::Recent => out.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        CommentSort::Oldest => out.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        CommentSort::Likes => out.sort_by(|a, b| {
            b.likes
                .cmp(&a.likes)
                .then_with(|| b.created_at.cmp(&a.created_at))
        }),
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .set(
                "",
                json!({
                    "users": {
                        "u1": {
                            "profile": {"name": "Ana", "avatarUrl": "/media/a.png"},
                            "videos": {"v1": {"createdAt": "2024-01-01T00:00:00Z"}}
                        }
                    },
                    "videos": {
                        "v1": {"id": "v1", "title": "Morning Run", "userId": "u1",
                               "username": "old", "likes": 5, "comments": 1,
                               "createdAt": "2024-01-01T00:00:00Z"},
                        "v2": {"id": "v2", "title": "evening run", "userId": "gone",
                               "username": "Ghost", "likes": 9,
                               "createdAt": "2024-01-02T00:00:00Z"},
                        "v3": {"id": "v3", "title": "Cooking", "userId": "u1",
                               "likes": 1, "comments": 4,
                               "createdAt": "2024-01-03T00:00:00Z"}
                    }
                }),
            )
            .await
            .unwrap();
        store
    }

    fn ids(videos: &[VideoResponse]) -> Vec<&str> {
        videos.iter().map(|v| v.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_sort_modes() {
        let store = seeded().await;

        let recent = feed(&store, None, FeedSort::Recent, None, None).await.unwrap();
        assert_eq!(ids(&recent), ["v3", "v2", "v1"]);
        let liked = feed(&store, None, FeedSort::Likes, None, None).await.unwrap();
        assert_eq!(ids(&liked), ["v2", "v1", "v3"]);
        let discussed = feed(&store, None, FeedSort::Comments, None, None)
            .await
            .unwrap();
        assert_eq!(ids(&discussed), ["v3", "v1", "v2"]);

        let page = feed(&store, None, FeedSort::Recent, Some(1), Some(1))
            .await
            .unwrap();
        assert_eq!(ids(&page), ["v2"]);
    }

    #[tokio::test]
    async fn test_author_joined_from_live_profile() {
        let store = seeded().await;
        let videos = assemble_videos(&store, None).await.unwrap();

        let v1 = videos.iter().find(|v| v.id == "v1").unwrap();
        assert_eq!(v1.author.name, "Ana");
        assert_eq!(v1.author.avatar_url, "/media/a.png");

        let v2 = videos.iter().find(|v| v.id == "v2").unwrap();
        assert_eq!(v2.author.name, "Ghost");
    }

    #[tokio::test]
    async fn test_search_and_trending() {
        let store = seeded().await;

        let found = search(&store, None, "RUN", Some(FeedSort::Recent))
            .await
            .unwrap();
        assert_eq!(ids(&found), ["v2", "v1"]);
        assert!(search(&store, None, "  ", None).await.unwrap().is_empty());

        let top = trending(&store, None).await.unwrap();
        assert_eq!(ids(&top), ["v2", "v1", "v3"]);
    }

    #[tokio::test]
    async fn test_user_videos_use_ownership_index() {
        let store = seeded().await;
        let mine = user_videos(&store, None, "u1").await.unwrap();
        assert_eq!(ids(&mine), ["v1"]);
        assert!(user_videos(&store, None, "nobody").await.unwrap().is_empty());
    }
}
