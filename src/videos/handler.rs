use axum::{
    extract::{Multipart, State},
    response::IntoResponse,
    Json,
};

use crate::{
    auth::jwt,
    blob::SharedBlobStore,
    error::AppError,
    extract::ValidPath,
    multipart::Form,
    profiles,
    response::ApiResponse,
    store::SharedStore,
    videos::{
        service::{self, VideoUpload},
        UpdateVideo, Video, VideoResponse,
    },
};

async fn video_response(
    store: &SharedStore,
    id: &str,
    video: Video,
    viewer: Option<&str>,
) -> Result<VideoResponse, AppError> {
    let owner = profiles::service::find_profile(store.as_ref(), &video.user_id).await?;
    Ok(VideoResponse::new(id, video, owner.as_ref(), viewer))
}

/// Upload a video (multipart: title, description, video, thumbnail)
/// POST /api/videos
pub async fn create_video(
    State(store): State<SharedStore>,
    State(blobs): State<SharedBlobStore>,
    claims: jwt::Claims,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let actor = claims.actor();
    let mut form = Form::read(multipart).await?;

    let upload = VideoUpload {
        title: form.text("title").unwrap_or_default().to_string(),
        description: form.text("description").unwrap_or_default().to_string(),
        video: form
            .take_file("video")
            .ok_or(AppError::BadRequest("No video file provided".to_string()))?,
        thumbnail: form.take_file("thumbnail"),
    };

    let (id, video) =
        service::upload_video(store.as_ref(), blobs.as_ref(), &actor, upload).await?;
    let response = video_response(&store, &id, video, Some(&actor.uid)).await?;

    Ok(ApiResponse::success(response).created())
}

/// GET /api/videos/:id
pub async fn get_video(
    State(store): State<SharedStore>,
    claims: Option<jwt::Claims>,
    ValidPath(id): ValidPath<String>,
) -> Result<impl IntoResponse, AppError> {
    let video = service::get_video(store.as_ref(), &id).await?;
    let viewer = claims.map(|c| c.sub);
    let response = video_response(&store, &id, video, viewer.as_deref()).await?;

    Ok(ApiResponse::success(response))
}

/// PUT /api/videos/:id
pub async fn update_video(
    State(store): State<SharedStore>,
    claims: jwt::Claims,
    ValidPath(id): ValidPath<String>,
    Json(payload): Json<UpdateVideo>,
) -> Result<impl IntoResponse, AppError> {
    let actor = claims.actor();
    let video = service::update_video(store.as_ref(), &actor, &id, &payload).await?;
    let response = video_response(&store, &id, video, Some(&actor.uid)).await?;

    Ok(ApiResponse::success(response))
}

/// DELETE /api/videos/:id
pub async fn delete_video(
    State(store): State<SharedStore>,
    State(blobs): State<SharedBlobStore>,
    claims: jwt::Claims,
    ValidPath(id): ValidPath<String>,
) -> Result<impl IntoResponse, AppError> {
    service::delete_video(store.as_ref(), blobs.as_ref(), &claims.actor(), &id).await?;

    Ok(ApiResponse::ok("Video deleted successfully"))
}
