use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod handler;
pub mod service;

/// Entry in `userFollowers/{uid}` and `userFollowing/{uid}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowEdge {
    pub created_at: DateTime<Utc>,
}

/// Response for a user in followers/following lists
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUserResponse {
    pub id: String,
    pub name: String,
    pub avatar_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    pub followed_at: DateTime<Utc>,
}

/// Query parameters for paginated follow lists
#[derive(Debug, Default, Deserialize)]
pub struct FollowListFilter {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Response for paginated followers/following lists
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowListResponse {
    pub users: Vec<FollowUserResponse>,
    pub total: usize,
    pub has_more: bool,
}

/// Response for follow/unfollow actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowState {
    pub following: bool,
    pub followers_count: i64,
}

/// Request payload for bulk follow status check
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkFollowCheckRequest {
    pub user_ids: Vec<String>,
}

/// Response for follow suggestions
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowSuggestionResponse {
    pub id: String,
    pub name: String,
    pub avatar_url: String,
    pub followers_count: i64,
    pub mutual_followers_count: i64,
}
