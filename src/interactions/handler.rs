use axum::{
    extract::State,
    response::IntoResponse,
};

use crate::{
    auth::jwt,
    error::AppError,
    extract::ValidPath,
    interactions::{service, CounterResponse, LikeTarget},
    response::ApiResponse,
    store::SharedStore,
};

fn video_target(video_id: String) -> LikeTarget {
    LikeTarget::Video { video_id }
}

fn comment_target((video_id, comment_id): (String, String)) -> LikeTarget {
    LikeTarget::Comment {
        video_id,
        comment_id,
    }
}

fn reply_target((video_id, comment_id, reply_id): (String, String, String)) -> LikeTarget {
    LikeTarget::Reply {
        video_id,
        comment_id,
        reply_id,
    }
}

async fn respond(
    store: SharedStore,
    claims: jwt::Claims,
    target: LikeTarget,
    like: Option<bool>,
) -> Result<impl IntoResponse, AppError> {
    let state = match like {
        Some(like) => service::set_like(store.as_ref(), &target, &claims.sub, like).await?,
        None => service::toggle_like(store.as_ref(), &target, &claims.sub).await?,
    };
    Ok(ApiResponse::success(state))
}

/// Toggle the caller's like on a video
/// POST /api/videos/:id/like
pub async fn toggle_video_like(
    State(store): State<SharedStore>,
    claims: jwt::Claims,
    ValidPath(id): ValidPath<String>,
) -> Result<impl IntoResponse, AppError> {
    respond(store, claims, video_target(id), None).await
}

/// PUT /api/videos/:id/like
pub async fn like_video(
    State(store): State<SharedStore>,
    claims: jwt::Claims,
    ValidPath(id): ValidPath<String>,
) -> Result<impl IntoResponse, AppError> {
    respond(store, claims, video_target(id), Some(true)).await
}

/// DELETE /api/videos/:id/like
pub async fn unlike_video(
    State(store): State<SharedStore>,
    claims: jwt::Claims,
    ValidPath(id): ValidPath<String>,
) -> Result<impl IntoResponse, AppError> {
    respond(store, claims, video_target(id), Some(false)).await
}

/// POST /api/videos/:id/comments/:cid/like
pub async fn toggle_comment_like(
    State(store): State<SharedStore>,
    claims: jwt::Claims,
    ValidPath(ids): ValidPath<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    respond(store, claims, comment_target(ids), None).await
}

/// PUT /api/videos/:id/comments/:cid/like
pub async fn like_comment(
    State(store): State<SharedStore>,
    claims: jwt::Claims,
    ValidPath(ids): ValidPath<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    respond(store, claims, comment_target(ids), Some(true)).await
}

/// DELETE /api/videos/:id/comments/:cid/like
pub async fn unlike_comment(
    State(store): State<SharedStore>,
    claims: jwt::Claims,
    ValidPath(ids): ValidPath<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    respond(store, claims, comment_target(ids), Some(false)).await
}

/// POST /api/videos/:id/comments/:cid/replies/:rid/like
pub async fn toggle_reply_like(
    State(store): State<SharedStore>,
    claims: jwt::Claims,
    ValidPath(ids): ValidPath<(String, String, String)>,
) -> Result<impl IntoResponse, AppError> {
    respond(store, claims, reply_target(ids), None).await
}

/// PUT /api/videos/:id/comments/:cid/replies/:rid/like
pub async fn like_reply(
    State(store): State<SharedStore>,
    claims: jwt::Claims,
    ValidPath(ids): ValidPath<(String, String, String)>,
) -> Result<impl IntoResponse, AppError> {
    respond(store, claims, reply_target(ids), Some(true)).await
}

/// DELETE /api/videos/:id/comments/:cid/replies/:rid/like
pub async fn unlike_reply(
    State(store): State<SharedStore>,
    claims: jwt::Claims,
    ValidPath(ids): ValidPath<(String, String, String)>,
) -> Result<impl IntoResponse, AppError> {
    respond(store, claims, reply_target(ids), Some(false)).await
}

/// Count a view; anonymous viewers count too
/// POST /api/videos/:id/view
pub async fn record_view(
    State(store): State<SharedStore>,
    ValidPath(id): ValidPath<String>,
) -> Result<impl IntoResponse, AppError> {
    let count = service::record_view(store.as_ref(), &id).await?;
    Ok(ApiResponse::success(CounterResponse { count }))
}

/// POST /api/videos/:id/share
pub async fn record_share(
    State(store): State<SharedStore>,
    ValidPath(id): ValidPath<String>,
) -> Result<impl IntoResponse, AppError> {
    let count = service::record_share(store.as_ref(), &id).await?;
    Ok(ApiResponse::success(CounterResponse { count }))
}
