use axum::{extract::State, response::IntoResponse, Json};

use crate::{
    auth::{jwt, service, AccountResponse, Actor, AuthResponse, LoginUser, RegisterUser},
    config::settings::Settings,
    error::AppError,
    profiles::{self, Profile, ProfileResponse},
    response::ApiResponse,
    store::SharedStore,
};

fn auth_response(settings: &Settings, actor: Actor, profile: Profile) -> Result<AuthResponse, AppError> {
    let token = jwt::create_token(&actor, &settings.jwt_secret, settings.jwt_ttl_hours)
        .map_err(|e| {
            tracing::error!("Failed to sign token: {:?}", e);
            AppError::InternalServerError
        })?;

    Ok(AuthResponse {
        token,
        account: AccountResponse::from(&actor),
        profile: ProfileResponse {
            id: actor.uid,
            profile,
        },
    })
}

pub async fn signup(
    State(store): State<SharedStore>,
    State(settings): State<Settings>,
    Json(payload): Json<RegisterUser>,
) -> Result<impl IntoResponse, AppError> {
    let (actor, profile) = service::register(store.as_ref(), &payload).await?;

    Ok(ApiResponse::success(auth_response(&settings, actor, profile)?).created())
}

pub async fn login(
    State(store): State<SharedStore>,
    State(settings): State<Settings>,
    Json(payload): Json<LoginUser>,
) -> Result<impl IntoResponse, AppError> {
    let (actor, profile) = service::authenticate(store.as_ref(), &payload).await?;

    Ok(ApiResponse::success(auth_response(&settings, actor, profile)?))
}

pub async fn get_me(
    State(store): State<SharedStore>,
    claims: jwt::Claims,
) -> Result<impl IntoResponse, AppError> {
    let actor = claims.actor();
    let profile =
        profiles::service::resolve_profile(store.as_ref(), &actor.uid, Some(&actor)).await?;

    Ok(ApiResponse::success(ProfileResponse {
        id: actor.uid,
        profile,
    }))
}
