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
    follows,
    multipart::Form,
    profiles::{service, ProfileResponse, UpdateProfile, UserProfileResponse},
    response::ApiResponse,
    store::SharedStore,
};

/// Get a user's profile with follow state for the caller
/// GET /api/users/:id
pub async fn get_user_profile(
    State(store): State<SharedStore>,
    claims: Option<jwt::Claims>,
    ValidPath(user_id): ValidPath<String>,
) -> Result<impl IntoResponse, AppError> {
    let actor = claims.map(|c| c.actor());
    let profile = service::resolve_profile(store.as_ref(), &user_id, actor.as_ref()).await?;

    let is_following = match &actor {
        Some(actor) if actor.uid != user_id => {
            follows::service::is_following(store.as_ref(), &actor.uid, &user_id).await?
        }
        _ => false,
    };

    Ok(ApiResponse::success(UserProfileResponse {
        id: user_id,
        profile,
        is_following,
    }))
}

/// Edit the caller's profile
/// PUT /api/me/profile
pub async fn update_my_profile(
    State(store): State<SharedStore>,
    claims: jwt::Claims,
    Json(payload): Json<UpdateProfile>,
) -> Result<impl IntoResponse, AppError> {
    let actor = claims.actor();
    let profile = service::update_profile(store.as_ref(), &actor, &payload).await?;

    Ok(ApiResponse::success(ProfileResponse {
        id: actor.uid,
        profile,
    }))
}

/// Replace the caller's avatar
/// POST /api/me/avatar (multipart field `avatar`)
pub async fn upload_avatar(
    State(store): State<SharedStore>,
    State(blobs): State<SharedBlobStore>,
    claims: jwt::Claims,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let actor = claims.actor();
    let mut form = Form::read(multipart).await?;
    let upload = form
        .take_file("avatar")
        .ok_or(AppError::BadRequest("No avatar provided".to_string()))?;

    let profile = service::set_avatar(store.as_ref(), blobs.as_ref(), &actor, upload).await?;

    Ok(ApiResponse::success(ProfileResponse {
        id: actor.uid,
        profile,
    }))
}
