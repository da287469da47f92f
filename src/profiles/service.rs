use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::info;
use validator::Validate;

use crate::{
    auth::{utils::email_local_part, Actor},
    blob::{self, generate_storage_key, BlobStore},
    error::{AppError, AppResult},
    multipart::Upload,
    paths,
    profiles::{Profile, UpdateProfile},
    retry::retry_on_conflict,
    store::{self, Batch, Guard, StoreError, TreeStore, Write},
};

pub async fn find_profile(store: &dyn TreeStore, uid: &str) -> AppResult<Option<Profile>> {
    Ok(store::get_as(store, &paths::profile(uid)).await?)
}

/// The profile synthesized for an account on first use.
pub fn default_profile(actor: &Actor, now: DateTime<Utc>) -> Profile {
    Profile {
        name: email_local_part(&actor.email).to_string(),
        created_at: now,
        updated_at: now,
        ..Default::default()
    }
}

/// Returns the profile of `uid`. An owner without a profile gets a default one
/// persisted on the spot; anyone else gets `NotFound`.
pub async fn resolve_profile(
    store: &dyn TreeStore,
    uid: &str,
    actor: Option<&Actor>,
) -> AppResult<Profile> {
    if let Some(profile) = find_profile(store, uid).await? {
        return Ok(profile);
    }

    let Some(actor) = actor.filter(|a| a.uid == uid) else {
        return Err(AppError::NotFound("User not found".to_string()));
    };

    let profile = default_profile(actor, Utc::now());
    let path = paths::profile(uid);
    let batch = Batch::new()
        .guard(&path, Guard::Missing)
        .set(&path, store::to_value(&profile)?);

    match store.commit(batch).await {
        Ok(()) => {
            info!("Created default profile for {}", uid);
            Ok(profile)
        }
        // Another session created it first; theirs wins.
        Err(StoreError::Conflict(_)) => find_profile(store, uid)
            .await?
            .ok_or(AppError::InternalServerError),
        Err(e) => Err(e.into()),
    }
}

/// Adds `delta` to a profile counter as part of `batch`. Accounts without a
/// profile are skipped, guarded so that a profile appearing before the commit
/// sends the caller round again.
pub async fn bump_counter(
    store: &dyn TreeStore,
    batch: &mut Batch,
    uid: &str,
    field: &str,
    delta: i64,
) -> AppResult<()> {
    if uid.is_empty() || delta == 0 {
        return Ok(());
    }
    let path = paths::profile(uid);
    if store.exists(&path).await? {
        batch.push_guard(&path, Guard::Exists);
        batch.push(format!("{path}/{field}"), Write::Increment(delta));
    } else {
        batch.push_guard(&path, Guard::Missing);
    }
    Ok(())
}

async fn apply_profile_patch(
    store: &dyn TreeStore,
    actor: &Actor,
    patch: &UpdateProfile,
) -> AppResult<()> {
    resolve_profile(store, &actor.uid, Some(actor)).await?;

    // Field-level writes so counters bumped concurrently are left alone.
    let path = paths::profile(&actor.uid);
    let mut batch = Batch::new().guard(&path, Guard::Exists);
    let fields = [
        ("name", &patch.name),
        ("city", &patch.city),
        ("state", &patch.state),
        ("avatarUrl", &patch.avatar_url),
    ];
    for (field, value) in fields {
        if let Some(value) = value {
            batch.push(format!("{path}/{field}"), Write::Set(json!(value.trim())));
        }
    }
    match patch.bio.as_deref().map(str::trim) {
        Some("") => batch.push(format!("{path}/bio"), Write::Remove),
        Some(bio) => batch.push(format!("{path}/bio"), Write::Set(json!(bio))),
        None => {}
    }
    batch.push(format!("{path}/updatedAt"), Write::Set(json!(Utc::now())));

    store.commit(batch).await?;
    Ok(())
}

pub async fn update_profile(
    store: &dyn TreeStore,
    actor: &Actor,
    patch: &UpdateProfile,
) -> AppResult<Profile> {
    patch
        .validate()
        .map_err(|e| AppError::UnprocessableEntity(e.to_string()))?;

    retry_on_conflict("update profile", || apply_profile_patch(store, actor, patch)).await?;

    find_profile(store, &actor.uid)
        .await?
        .ok_or(AppError::InternalServerError)
}

/// Stores an uploaded image and points the profile at it.
pub async fn set_avatar(
    store: &dyn TreeStore,
    blobs: &dyn BlobStore,
    actor: &Actor,
    upload: Upload,
) -> AppResult<Profile> {
    if !upload.content_type.starts_with("image/") {
        return Err(AppError::UnprocessableEntity(
            "Avatar must be an image".to_string(),
        ));
    }

    let previous = resolve_profile(store, &actor.uid, Some(actor)).await?;

    let key = generate_storage_key("avatars", &actor.uid, &upload.file_name);
    let stored = blobs
        .upload(&key, &upload.bytes, &upload.content_type)
        .await?;

    let path = paths::profile(&actor.uid);
    let batch = Batch::new()
        .guard(&path, Guard::Exists)
        .set(format!("{path}/avatarUrl"), json!(stored.url))
        .set(format!("{path}/updatedAt"), json!(Utc::now()));

    if let Err(e) = store.commit(batch).await {
        blob::delete_url_best_effort(blobs, &stored.url).await;
        return Err(e.into());
    }

    if !previous.avatar_url.is_empty() {
        blob::delete_url_best_effort(blobs, &previous.avatar_url).await;
    }

    find_profile(store, &actor.uid)
        .await?
        .ok_or(AppError::InternalServerError)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn actor(uid: &str) -> Actor {
        Actor {
            uid: uid.to_string(),
            email: format!("{uid}.person@example.com"),
        }
    }

    #[tokio::test]
    async fn test_owner_gets_default_profile_persisted() {
        let store = MemoryStore::new();
        let me = actor("u1");

        let profile = resolve_profile(&store, "u1", Some(&me)).await.unwrap();
        assert_eq!(profile.name, "u1.person");
        assert_eq!(profile.followers, 0);

        let stored = find_profile(&store, "u1").await.unwrap().unwrap();
        assert_eq!(stored, profile);
    }

    #[tokio::test]
    async fn test_stranger_gets_not_found() {
        let store = MemoryStore::new();
        let other = actor("u2");

        let err = resolve_profile(&store, "u1", Some(&other)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        let err = resolve_profile(&store, "u1", None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(find_profile(&store, "u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_default_creation_yields_one_profile() {
        let store = MemoryStore::new();
        let me = actor("u1");

        let (a, b) = tokio::join!(
            resolve_profile(&store, "u1", Some(&me)),
            resolve_profile(&store, "u1", Some(&me))
        );
        assert_eq!(a.unwrap().created_at, b.unwrap().created_at);
    }

    #[tokio::test]
    async fn test_partial_record_reads_with_defaults() {
        let store = MemoryStore::new();
        store
            .set("users/u9/profile", json!({"name": "legacy"}))
            .await
            .unwrap();

        let profile = resolve_profile(&store, "u9", None).await.unwrap();
        assert_eq!(profile.name, "legacy");
        assert_eq!(profile.following, 0);
        assert!(profile.bio.is_none());
    }

    #[tokio::test]
    async fn test_update_profile_keeps_counters() {
        let store = MemoryStore::new();
        let me = actor("u1");
        resolve_profile(&store, "u1", Some(&me)).await.unwrap();
        store
            .increment("users/u1/profile/followers", 3)
            .await
            .unwrap();

        let patch = UpdateProfile {
            name: Some("  Mia  ".to_string()),
            bio: Some("dance clips".to_string()),
            ..Default::default()
        };
        let profile = update_profile(&store, &me, &patch).await.unwrap();
        assert_eq!(profile.name, "Mia");
        assert_eq!(profile.bio.as_deref(), Some("dance clips"));
        assert_eq!(profile.followers, 3);

        let clear = UpdateProfile {
            bio: Some(String::new()),
            ..Default::default()
        };
        let profile = update_profile(&store, &me, &clear).await.unwrap();
        assert!(profile.bio.is_none());
    }
}
