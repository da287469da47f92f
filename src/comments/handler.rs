use axum::{
    extract::State,
    response::IntoResponse,
    Json,
};

use crate::{
    auth::jwt,
    comments::{service, CommentText},
    error::AppError,
    extract::ValidPath,
    response::ApiResponse,
    store::SharedStore,
};

/// Comment on a video
/// POST /api/videos/:id/comments
pub async fn create_comment(
    State(store): State<SharedStore>,
    claims: jwt::Claims,
    ValidPath(video_id): ValidPath<String>,
    Json(payload): Json<CommentText>,
) -> Result<impl IntoResponse, AppError> {
    let comment =
        service::create_comment(store.as_ref(), &claims.actor(), &video_id, &payload.text).await?;

    Ok(ApiResponse::success(comment).created())
}

/// Edit your own comment
/// PUT /api/videos/:id/comments/:cid
pub async fn update_comment(
    State(store): State<SharedStore>,
    claims: jwt::Claims,
    ValidPath((video_id, comment_id)): ValidPath<(String, String)>,
    Json(payload): Json<CommentText>,
) -> Result<impl IntoResponse, AppError> {
    let comment = service::update_comment(
        store.as_ref(),
        &claims.actor(),
        &video_id,
        &comment_id,
        &payload.text,
    )
    .await?;

    Ok(ApiResponse::success(serde_json::json!({
        "id": comment_id,
        "text": comment.text,
        "updatedAt": comment.updated_at,
    })))
}

/// Delete your own comment together with its replies
/// DELETE /api/videos/:id/comments/:cid
pub async fn delete_comment(
    State(store): State<SharedStore>,
    claims: jwt::Claims,
    ValidPath((video_id, comment_id)): ValidPath<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    service::delete_comment(store.as_ref(), &claims.actor(), &video_id, &comment_id).await?;

    Ok(ApiResponse::ok("Comment deleted successfully"))
}

/// Reply to a comment
/// POST /api/videos/:id/comments/:cid/replies
pub async fn create_reply(
    State(store): State<SharedStore>,
    claims: jwt::Claims,
    ValidPath((video_id, comment_id)): ValidPath<(String, String)>,
    Json(payload): Json<CommentText>,
) -> Result<impl IntoResponse, AppError> {
    let reply = service::create_reply(
        store.as_ref(),
        &claims.actor(),
        &video_id,
        &comment_id,
        &payload.text,
    )
    .await?;

    Ok(ApiResponse::success(reply).created())
}

/// Delete your own reply
/// DELETE /api/videos/:id/comments/:cid/replies/:rid
pub async fn delete_reply(
    State(store): State<SharedStore>,
    claims: jwt::Claims,
    ValidPath((video_id, comment_id, reply_id)): ValidPath<(String, String, String)>,
) -> Result<impl IntoResponse, AppError> {
    service::delete_reply(
        store.as_ref(),
        &claims.actor(),
        &video_id,
        &comment_id,
        &reply_id,
    )
    .await?;

    Ok(ApiResponse::ok("Reply deleted successfully"))
}
