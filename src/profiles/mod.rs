use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

pub mod handler;
pub mod service;

/// Stored at `users/{uid}/profile`. Missing fields read as their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    pub name: String,
    pub city: String,
    pub state: String,
    pub followers: i64,
    pub following: i64,
    /// Likes received across the account's videos.
    pub likes: i64,
    /// Comments and replies written.
    pub comments: i64,
    pub avatar_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfile {
    #[validate(length(
        min = 1,
        max = 50,
        message = "Name must be between 1 and 50 characters"
    ))]
    pub name: Option<String>,
    #[validate(length(max = 80, message = "City must be at most 80 characters"))]
    pub city: Option<String>,
    #[validate(length(max = 80, message = "State must be at most 80 characters"))]
    pub state: Option<String>,
    /// An empty string clears the bio.
    #[validate(length(max = 500, message = "Bio must be at most 500 characters"))]
    pub bio: Option<String>,
    #[validate(url(message = "Avatar must be a URL"))]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub id: String,
    #[serde(flatten)]
    pub profile: Profile,
}

/// User profile as seen by another (or the same) account
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfileResponse {
    pub id: String,
    #[serde(flatten)]
    pub profile: Profile,
    pub is_following: bool,
}

/// Display fields attached to videos, comments and follow lists
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorResponse {
    pub id: String,
    pub name: String,
    pub avatar_url: String,
}

impl AuthorResponse {
    pub fn from_profile(id: &str, profile: &Profile) -> Self {
        AuthorResponse {
            id: id.to_string(),
            name: profile.name.clone(),
            avatar_url: profile.avatar_url.clone(),
        }
    }
}
