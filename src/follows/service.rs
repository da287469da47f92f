use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde_json::json;
use tracing::info;

use crate::{
    auth::Actor,
    error::{AppError, AppResult},
    follows::{
        FollowEdge, FollowListResponse, FollowState, FollowSuggestionResponse, FollowUserResponse,
    },
    paths,
    profiles::service::{find_profile, resolve_profile},
    retry::retry_on_conflict,
    store::{self, Batch, Guard, TreeStore, Write},
};

pub const MAX_BULK_IDS: usize = 100;

async fn followers_count(store: &dyn TreeStore, uid: &str) -> AppResult<i64> {
    Ok(store
        .get(&format!("{}/followers", paths::profile(uid)))
        .await?
        .and_then(|v| v.as_i64())
        .unwrap_or(0))
}

async fn apply_follow(
    store: &dyn TreeStore,
    follower: &str,
    followee: &str,
    follow: bool,
) -> AppResult<FollowState> {
    let edge = paths::following(follower, followee);
    if store.exists(&edge).await? == follow {
        return Ok(FollowState {
            following: follow,
            followers_count: followers_count(store, followee).await?,
        });
    }

    let follower_profile = paths::profile(follower);
    let followee_profile = paths::profile(followee);
    let delta = if follow { 1 } else { -1 };

    let mut batch = Batch::new()
        .guard(&edge, if follow { Guard::Missing } else { Guard::Exists })
        .guard(&follower_profile, Guard::Exists)
        .guard(&followee_profile, Guard::Exists)
        .increment(format!("{followee_profile}/followers"), delta)
        .increment(format!("{follower_profile}/following"), delta);

    let reverse = paths::follower(followee, follower);
    let flag = paths::follows(follower, followee);
    if follow {
        let entry = store::to_value(&FollowEdge {
            created_at: Utc::now(),
        })?;
        batch.push(&edge, Write::Set(entry.clone()));
        batch.push(reverse, Write::Set(entry));
        batch.push(flag, Write::Set(json!(true)));
    } else {
        batch.push(&edge, Write::Remove);
        batch.push(reverse, Write::Remove);
        batch.push(flag, Write::Remove);
    }

    store.commit(batch).await?;

    Ok(FollowState {
        following: follow,
        followers_count: followers_count(store, followee).await?,
    })
}

/// Creates or removes the follow edge `actor -> followee`. The three index
/// entries and both counters change in one commit; asking for the state the
/// edge is already in writes nothing.
pub async fn set_following(
    store: &dyn TreeStore,
    actor: &Actor,
    followee: &str,
    follow: bool,
) -> AppResult<FollowState> {
    if actor.uid == followee {
        return Err(AppError::UnprocessableEntity(
            "You cannot follow yourself".to_string(),
        ));
    }

    resolve_profile(store, followee, None).await?;
    resolve_profile(store, &actor.uid, Some(actor)).await?;

    let state = retry_on_conflict("set following", || {
        apply_follow(store, &actor.uid, followee, follow)
    })
    .await?;

    info!(
        "{} {} {}",
        actor.uid,
        if follow { "follows" } else { "unfollowed" },
        followee
    );
    Ok(state)
}

pub async fn is_following(store: &dyn TreeStore, follower: &str, followee: &str) -> AppResult<bool> {
    Ok(store.exists(&paths::following(follower, followee)).await?)
}

async fn list_edges(
    store: &dyn TreeStore,
    uid: &str,
    index: String,
    limit: Option<usize>,
    offset: Option<usize>,
) -> AppResult<FollowListResponse> {
    if find_profile(store, uid).await?.is_none() {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    let limit = limit.unwrap_or(20).clamp(1, 100);
    let offset = offset.unwrap_or(0);

    let mut edges: Vec<(String, FollowEdge)> = store::children_as(store, &index).await?;
    edges.sort_by(|a, b| b.1.created_at.cmp(&a.1.created_at));
    let total = edges.len();

    let mut users = Vec::new();
    for (id, edge) in edges.into_iter().skip(offset).take(limit) {
        let profile = find_profile(store, &id).await?.unwrap_or_default();
        users.push(FollowUserResponse {
            id,
            name: profile.name,
            avatar_url: profile.avatar_url,
            bio: profile.bio,
            followed_at: edge.created_at,
        });
    }

    Ok(FollowListResponse {
        users,
        total,
        has_more: offset.saturating_add(limit) < total,
    })
}

/// Accounts following `uid`, newest first.
pub async fn list_followers(
    store: &dyn TreeStore,
    uid: &str,
    limit: Option<usize>,
    offset: Option<usize>,
) -> AppResult<FollowListResponse> {
    list_edges(store, uid, paths::followers_of(uid), limit, offset).await
}

/// Accounts `uid` follows, newest first.
pub async fn list_following(
    store: &dyn TreeStore,
    uid: &str,
    limit: Option<usize>,
    offset: Option<usize>,
) -> AppResult<FollowListResponse> {
    list_edges(store, uid, paths::following_of(uid), limit, offset).await
}

/// Follow status for many accounts at once.
pub async fn following_status_bulk(
    store: &dyn TreeStore,
    follower: &str,
    user_ids: Vec<String>,
) -> AppResult<HashMap<String, bool>> {
    if user_ids.len() > MAX_BULK_IDS {
        return Err(AppError::UnprocessableEntity(format!(
            "Maximum {} user IDs allowed per request",
            MAX_BULK_IDS
        )));
    }
    if user_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let following: HashSet<String> = store::child_keys(store, &paths::following_of(follower))
        .await?
        .into_iter()
        .collect();

    Ok(user_ids
        .into_iter()
        .map(|id| {
            let status = following.contains(&id);
            (id, status)
        })
        .collect())
}

/// Accounts followed by the accounts `uid` follows that `uid` does not follow
/// yet, most mutual connections first.
pub async fn suggestions(
    store: &dyn TreeStore,
    uid: &str,
    limit: Option<usize>,
) -> AppResult<Vec<FollowSuggestionResponse>> {
    let limit = limit.unwrap_or(10).clamp(1, 50);

    let mine: HashSet<String> = store::child_keys(store, &paths::following_of(uid))
        .await?
        .into_iter()
        .collect();

    let mut mutual: HashMap<String, i64> = HashMap::new();
    for followed in &mine {
        for candidate in store::child_keys(store, &paths::following_of(followed)).await? {
            if candidate != uid && !mine.contains(&candidate) {
                *mutual.entry(candidate).or_default() += 1;
            }
        }
    }

    let mut out = Vec::with_capacity(mutual.len());
    for (id, mutual_count) in mutual {
        let Some(profile) = find_profile(store, &id).await? else {
            continue;
        };
        out.push(FollowSuggestionResponse {
            id,
            name: profile.name,
            avatar_url: profile.avatar_url,
            followers_count: profile.followers,
            mutual_followers_count: mutual_count,
        });
    }

    out.sort_by(|a, b| {
        b.mutual_followers_count
            .cmp(&a.mutual_followers_count)
            .then(b.followers_count.cmp(&a.followers_count))
            .then_with(|| a.id.cmp(&b.id))
    });
    out.truncate(limit);
    Ok(out)
}
