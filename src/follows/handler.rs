use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};

use crate::{
    auth::jwt,
    error::AppError,
    extract::ValidPath,
    follows::{service, BulkFollowCheckRequest, FollowListFilter},
    response::ApiResponse,
    store::SharedStore,
};

/// Follow a user
/// POST /api/users/:id/follow
pub async fn follow_user(
    State(store): State<SharedStore>,
    claims: jwt::Claims,
    ValidPath(user_id): ValidPath<String>,
) -> Result<impl IntoResponse, AppError> {
    let state = service::set_following(store.as_ref(), &claims.actor(), &user_id, true).await?;
    Ok(ApiResponse::success(state))
}

/// Unfollow a user
/// DELETE /api/users/:id/follow
pub async fn unfollow_user(
    State(store): State<SharedStore>,
    claims: jwt::Claims,
    ValidPath(user_id): ValidPath<String>,
) -> Result<impl IntoResponse, AppError> {
    let state = service::set_following(store.as_ref(), &claims.actor(), &user_id, false).await?;
    Ok(ApiResponse::success(state))
}

/// Get a user's followers
/// GET /api/users/:id/followers
pub async fn get_followers(
    State(store): State<SharedStore>,
    ValidPath(user_id): ValidPath<String>,
    Query(filter): Query<FollowListFilter>,
) -> Result<impl IntoResponse, AppError> {
    let list =
        service::list_followers(store.as_ref(), &user_id, filter.limit, filter.offset).await?;
    Ok(ApiResponse::success(list))
}

/// Get users that a user is following
/// GET /api/users/:id/following
pub async fn get_following(
    State(store): State<SharedStore>,
    ValidPath(user_id): ValidPath<String>,
    Query(filter): Query<FollowListFilter>,
) -> Result<impl IntoResponse, AppError> {
    let list =
        service::list_following(store.as_ref(), &user_id, filter.limit, filter.offset).await?;
    Ok(ApiResponse::success(list))
}

/// Check if current user follows a target user
/// GET /api/users/:id/is-following
pub async fn check_following(
    State(store): State<SharedStore>,
    claims: jwt::Claims,
    ValidPath(user_id): ValidPath<String>,
) -> Result<impl IntoResponse, AppError> {
    let is_following = service::is_following(store.as_ref(), &claims.sub, &user_id).await?;

    Ok(ApiResponse::success(
        serde_json::json!({ "following": is_following }),
    ))
}

/// Check follow status for multiple users in a single request
/// POST /api/me/following-status
pub async fn check_following_bulk(
    State(store): State<SharedStore>,
    claims: jwt::Claims,
    Json(payload): Json<BulkFollowCheckRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result =
        service::following_status_bulk(store.as_ref(), &claims.sub, payload.user_ids).await?;
    Ok(ApiResponse::success(result))
}

/// Get suggested users to follow based on mutual connections
/// GET /api/me/suggestions
pub async fn get_follow_suggestions(
    State(store): State<SharedStore>,
    claims: jwt::Claims,
    Query(filter): Query<FollowListFilter>,
) -> Result<impl IntoResponse, AppError> {
    let suggestions = service::suggestions(store.as_ref(), &claims.sub, filter.limit).await?;
    Ok(ApiResponse::success(suggestions))
}
