use std::collections::HashMap;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::Actor,
    blob::{self, generate_storage_key, BlobStore, StoredBlob},
    comments::{service::unindex_comment, Comment},
    error::{AppError, AppResult},
    multipart::Upload,
    paths,
    profiles::service::{bump_counter, resolve_profile},
    retry::retry_on_conflict,
    store::{self, Batch, Guard, StoreError, TreeStore, Write},
    videos::{OwnedVideo, UpdateVideo, Video, VideoDraft},
};

/// Media parts of a video upload, text fields already split out.
#[derive(Debug)]
pub struct VideoUpload {
    pub title: String,
    pub description: String,
    pub video: Upload,
    pub thumbnail: Option<Upload>,
}

fn validated<T: Validate>(payload: &T) -> AppResult<()> {
    payload
        .validate()
        .map_err(|e| AppError::UnprocessableEntity(e.to_string()))
}

/// Writes the video record and its ownership index entry. Counters start at
/// zero; the uploader's display fields are copied from their profile.
pub async fn publish_video(
    store: &dyn TreeStore,
    actor: &Actor,
    draft: VideoDraft,
) -> AppResult<(String, Video)> {
    validated(&draft)?;
    let profile = resolve_profile(store, &actor.uid, Some(actor)).await?;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    let video = Video {
        id: id.clone(),
        title: draft.title.trim().to_string(),
        description: draft.description.trim().to_string(),
        video_url: draft.video_url,
        thumbnail_url: draft.thumbnail_url,
        user_id: actor.uid.clone(),
        username: profile.name,
        user_image: profile.avatar_url,
        created_at: now,
        updated_at: now,
        ..Default::default()
    };

    let path = paths::video(&id);
    let batch = Batch::new()
        .guard(&path, Guard::Missing)
        .set(&path, store::to_value(&video)?)
        .set(
            paths::user_video(&actor.uid, &id),
            store::to_value(&OwnedVideo { created_at: now })?,
        );
    store.commit(batch).await?;

    info!("Video {} published by {}", id, actor.uid);
    Ok((id, video))
}

/// Stores the media, then publishes. Media already written is removed again
/// when publishing fails.
pub async fn upload_video(
    store: &dyn TreeStore,
    blobs: &dyn BlobStore,
    actor: &Actor,
    upload: VideoUpload,
) -> AppResult<(String, Video)> {
    if !upload.video.content_type.starts_with("video/") {
        return Err(AppError::UnprocessableEntity(
            "Video file must be a video".to_string(),
        ));
    }
    if let Some(thumb) = &upload.thumbnail {
        if !thumb.content_type.starts_with("image/") {
            return Err(AppError::UnprocessableEntity(
                "Thumbnail must be an image".to_string(),
            ));
        }
    }

    let mut draft = VideoDraft {
        title: upload.title,
        description: upload.description,
        ..Default::default()
    };
    validated(&draft)?;

    let mut stored: Vec<StoredBlob> = Vec::new();
    let result: AppResult<(String, Video)> = async {
        let key = generate_storage_key("videos", &actor.uid, &upload.video.file_name);
        let video = blobs
            .upload(&key, &upload.video.bytes, &upload.video.content_type)
            .await?;
        draft.video_url = video.url.clone();
        stored.push(video);

        if let Some(thumb) = &upload.thumbnail {
            let key = generate_storage_key("thumbnails", &actor.uid, &thumb.file_name);
            let thumbnail = blobs.upload(&key, &thumb.bytes, &thumb.content_type).await?;
            draft.thumbnail_url = thumbnail.url.clone();
            stored.push(thumbnail);
        }

        publish_video(store, actor, draft).await
    }
    .await;

    if result.is_err() {
        for blob in &stored {
            if let Err(e) = blobs.delete(&blob.key).await {
                warn!("Failed to clean up {} after a failed upload: {:?}", blob.key, e);
            }
        }
    }
    result
}

pub async fn get_video(store: &dyn TreeStore, video_id: &str) -> AppResult<Video> {
    store::get_as(store, &paths::video(video_id))
        .await?
        .ok_or(AppError::NotFound("Video not found".to_string()))
}

/// Owner-only edit of title and description.
pub async fn update_video(
    store: &dyn TreeStore,
    actor: &Actor,
    video_id: &str,
    patch: &UpdateVideo,
) -> AppResult<Video> {
    validated(patch)?;

    let video = get_video(store, video_id).await?;
    if video.user_id != actor.uid {
        return Err(AppError::Forbidden(
            "You can only edit your own videos".to_string(),
        ));
    }

    let path = paths::video(video_id);
    let mut batch = Batch::new().guard(&path, Guard::Exists);
    if let Some(title) = &patch.title {
        batch.push(format!("{path}/title"), Write::Set(json!(title.trim())));
    }
    if let Some(description) = &patch.description {
        batch.push(
            format!("{path}/description"),
            Write::Set(json!(description.trim())),
        );
    }
    batch.push(format!("{path}/updatedAt"), Write::Set(json!(Utc::now())));

    store.commit(batch).await.map_err(|e| match e {
        StoreError::Conflict(_) => AppError::NotFound("Video not found".to_string()),
        e => e.into(),
    })?;

    get_video(store, video_id).await
}

fn field(node: &Value, key: &str) -> Value {
    node.get(key).cloned().unwrap_or(Value::Null)
}

async fn remove_video(store: &dyn TreeStore, actor: &Actor, video_id: &str) -> AppResult<Video> {
    let path = paths::video(video_id);
    let node = store
        .get(&path)
        .await?
        .ok_or(AppError::NotFound("Video not found".to_string()))?;
    let video: Video = serde_json::from_value(node.clone()).map_err(StoreError::from)?;
    if video.user_id != actor.uid {
        return Err(AppError::Forbidden(
            "You can only delete your own videos".to_string(),
        ));
    }

    let comments_path = paths::video_comments(video_id);
    let comments_node = store.get(&comments_path).await?;
    let comments: Vec<(String, Comment)> =
        store::children_of(&comments_path, comments_node.clone());

    // The counters and indexes below are derived from these reads, so a like
    // or comment landing in between must fail the commit.
    let mut batch = Batch::new()
        .guard(&path, Guard::Exists)
        .guard(format!("{path}/likedBy"), Guard::Equals(field(&node, "likedBy")))
        .guard(format!("{path}/likes"), Guard::Equals(field(&node, "likes")))
        .guard(
            &comments_path,
            Guard::Equals(comments_node.unwrap_or(Value::Null)),
        )
        .remove(&path)
        .remove(paths::user_video(&video.user_id, video_id))
        .remove(&comments_path);

    for liker in video.liked_by.keys() {
        batch.push(paths::user_like(liker, video_id), Write::Remove);
    }

    let mut lost: HashMap<String, i64> = HashMap::new();
    for (comment_id, comment) in &comments {
        unindex_comment(&mut batch, comment_id, comment, &mut lost);
    }

    bump_counter(store, &mut batch, &video.user_id, "likes", -video.likes).await?;
    for (uid, count) in &lost {
        bump_counter(store, &mut batch, uid, "comments", -count).await?;
    }

    store.commit(batch).await?;
    Ok(video)
}

/// Removes a video with everything hanging off it: comments, like and
/// authorship index entries, and the counters they fed. Media goes last.
pub async fn delete_video(
    store: &dyn TreeStore,
    blobs: &dyn BlobStore,
    actor: &Actor,
    video_id: &str,
) -> AppResult<()> {
    let video = retry_on_conflict("delete video", || remove_video(store, actor, video_id)).await?;

    info!("Video {} deleted by {}", video_id, actor.uid);

    for url in [&video.video_url, &video.thumbnail_url] {
        if !url.is_empty() {
            blob::delete_url_best_effort(blobs, url).await;
        }
    }
    Ok(())
}
