use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::profiles::{AuthorResponse, Profile};

pub mod handler;
pub mod service;

/// Stored at `videos/{id}`. The uploader's name and avatar are copied in at
/// publish time and only used when the live profile is gone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Video {
    pub id: String,
    pub title: String,
    pub description: String,
    pub video_url: String,
    pub thumbnail_url: String,
    pub user_id: String,
    pub username: String,
    pub user_image: String,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    pub views: i64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub liked_by: BTreeMap<String, bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Ownership index entry at `users/{uid}/videos/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedVideo {
    pub created_at: DateTime<Utc>,
}

/// A video whose media is already hosted somewhere.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VideoDraft {
    #[validate(length(
        min = 1,
        max = 150,
        message = "Title must be between 1 and 150 characters"
    ))]
    pub title: String,
    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: String,
    #[serde(default)]
    pub video_url: String,
    #[serde(default)]
    pub thumbnail_url: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateVideo {
    #[validate(length(
        min = 1,
        max = 150,
        message = "Title must be between 1 and 150 characters"
    ))]
    pub title: Option<String>,
    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoResponse {
    pub id: String,
    pub title: String,
    pub description: String,
    pub video_url: String,
    pub thumbnail_url: String,
    pub author: AuthorResponse,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    pub views: i64,
    pub liked_by_me: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VideoResponse {
    /// Joins a video with its owner's current profile, if there is one.
    pub fn new(id: &str, video: Video, owner: Option<&Profile>, viewer: Option<&str>) -> Self {
        let author = match owner {
            Some(profile) => AuthorResponse::from_profile(&video.user_id, profile),
            None => AuthorResponse {
                id: video.user_id.clone(),
                name: video.username.clone(),
                avatar_url: video.user_image.clone(),
            },
        };
        let liked_by_me = viewer.is_some_and(|uid| video.liked_by.contains_key(uid));

        VideoResponse {
            id: id.to_string(),
            title: video.title,
            description: video.description,
            video_url: video.video_url,
            thumbnail_url: video.thumbnail_url,
            author,
            likes: video.likes,
            comments: video.comments,
            shares: video.shares,
            views: video.views,
            liked_by_me,
            created_at: video.created_at,
            updated_at: video.updated_at,
        }
    }
}
