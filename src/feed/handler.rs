use axum::{
    extract::{Query, State},
    response::IntoResponse,
};
use serde::Serialize;
use tracing::error;

use crate::{
    auth::jwt,
    comments::CommentFilter,
    error::{AppError, AppResult},
    extract::ValidPath,
    feed::{service, FeedFilter, SearchFilter},
    response::ApiResponse,
    store::SharedStore,
};

/// Read failures never surface to feed readers: they are logged and the
/// reader gets an empty list.
fn or_empty<T: Serialize>(label: &str, result: AppResult<Vec<T>>) -> ApiResponse<Vec<T>> {
    match result {
        Ok(items) => ApiResponse::success(items),
        Err(e) => {
            error!("Failed to assemble {}: {:?}", label, e);
            ApiResponse::success(Vec::new())
        }
    }
}

/// GET /api/feed?sort=recent|likes|comments&limit=&offset=
pub async fn get_feed(
    State(store): State<SharedStore>,
    claims: Option<jwt::Claims>,
    Query(filter): Query<FeedFilter>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = claims.map(|c| c.sub);
    let result = service::feed(
        store.as_ref(),
        viewer.as_deref(),
        filter.sort.unwrap_or_default(),
        filter.limit,
        filter.offset,
    )
    .await;

    Ok(or_empty("feed", result))
}

/// GET /api/feed/trending
pub async fn get_trending(
    State(store): State<SharedStore>,
    claims: Option<jwt::Claims>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = claims.map(|c| c.sub);
    let result = service::trending(store.as_ref(), viewer.as_deref()).await;

    Ok(or_empty("trending videos", result))
}

/// GET /api/feed/search?q=&sort=
pub async fn search_videos(
    State(store): State<SharedStore>,
    claims: Option<jwt::Claims>,
    Query(filter): Query<SearchFilter>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = claims.map(|c| c.sub);
    let result = service::search(store.as_ref(), viewer.as_deref(), &filter.q, filter.sort).await;

    Ok(or_empty("search results", result))
}

/// Get personalized feed (videos from followed users)
/// GET /api/feed/following
pub async fn get_following_feed(
    State(store): State<SharedStore>,
    claims: jwt::Claims,
) -> Result<impl IntoResponse, AppError> {
    let result = service::following_feed(store.as_ref(), &claims.sub).await;

    Ok(or_empty("following feed", result))
}

/// GET /api/users/:id/videos
pub async fn get_user_videos(
    State(store): State<SharedStore>,
    claims: Option<jwt::Claims>,
    ValidPath(user_id): ValidPath<String>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = claims.map(|c| c.sub);
    let result = service::user_videos(store.as_ref(), viewer.as_deref(), &user_id).await;

    Ok(or_empty("user videos", result))
}

/// GET /api/videos/:id/comments?sort=recent|oldest|likes
pub async fn get_video_comments(
    State(store): State<SharedStore>,
    claims: Option<jwt::Claims>,
    ValidPath(video_id): ValidPath<String>,
    Query(filter): Query<CommentFilter>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = claims.map(|c| c.sub);
    let result = service::video_comments(
        store.as_ref(),
        viewer.as_deref(),
        &video_id,
        filter.sort.unwrap_or_default(),
    )
    .await;

    Ok(or_empty("comments", result))
}
