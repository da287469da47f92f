use chrono::Utc;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{utils, Account, Actor, LoginUser, RegisterUser},
    error::{AppError, AppResult},
    paths,
    profiles::{self, Profile, UpdateProfile},
    store::{self, Batch, Guard, StoreError, TreeStore},
};

/// Creates the credentials record and the account's profile.
pub async fn register(store: &dyn TreeStore, payload: &RegisterUser) -> AppResult<(Actor, Profile)> {
    payload
        .validate()
        .map_err(|e| AppError::UnprocessableEntity(e.to_string()))?;

    let password_hash =
        utils::hash_password(&payload.password).map_err(|_| AppError::InternalServerError)?;

    let actor = Actor {
        uid: Uuid::new_v4().to_string(),
        email: payload.email.trim().to_lowercase(),
    };
    let account = Account {
        email: actor.email.clone(),
        password_hash,
        created_at: Utc::now(),
    };

    let email_index = paths::account_email(&actor.email);
    let batch = Batch::new()
        .guard(&email_index, Guard::Missing)
        .set(paths::account(&actor.uid), store::to_value(&account)?)
        .set(&email_index, json!(actor.uid));

    match store.commit(batch).await {
        Ok(()) => {}
        Err(StoreError::Conflict(_)) => {
            return Err(AppError::Conflict("Email already registered".to_string()))
        }
        Err(e) => return Err(e.into()),
    }

    tracing::info!("Registered account {}", actor.uid);

    let mut profile = profiles::service::resolve_profile(store, &actor.uid, Some(&actor)).await?;
    if let Some(name) = &payload.name {
        let patch = UpdateProfile {
            name: Some(name.clone()),
            ..Default::default()
        };
        profile = profiles::service::update_profile(store, &actor, &patch).await?;
    }

    Ok((actor, profile))
}

/// Checks credentials; every mismatch is `Unauthorized`.
pub async fn authenticate(store: &dyn TreeStore, payload: &LoginUser) -> AppResult<(Actor, Profile)> {
    payload
        .validate()
        .map_err(|e| AppError::UnprocessableEntity(e.to_string()))?;

    let uid: String = store::get_as(store, &paths::account_email(&payload.email))
        .await?
        .ok_or(AppError::Unauthorized)?;

    let account: Account = store::get_as(store, &paths::account(&uid))
        .await?
        .ok_or(AppError::Unauthorized)?;

    utils::verify_password(&account.password_hash, &payload.password)
        .map_err(|_| AppError::Unauthorized)?;

    let actor = Actor {
        uid,
        email: account.email,
    };
    let profile = profiles::service::resolve_profile(store, &actor.uid, Some(&actor)).await?;

    Ok((actor, profile))
}
