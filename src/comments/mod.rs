use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::profiles::{AuthorResponse, Profile};

pub mod handler;
pub mod service;

fn is_zero(n: &i64) -> bool {
    *n == 0
}

/// Stored at `videoComments/{videoId}/{commentId}`, replies nested inside.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Comment {
    pub user_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "is_zero")]
    pub likes: i64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub liked_by: BTreeMap<String, bool>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub replies: BTreeMap<String, Reply>,
    #[serde(skip_serializing_if = "is_zero")]
    pub reply_count: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Reply {
    pub user_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub parent_id: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub likes: i64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub liked_by: BTreeMap<String, bool>,
}

/// Authorship index entry at `userComments/{uid}/{commentId}`. Replies carry
/// the comment they answer in `parent_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthoredComment {
    pub video_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

/// Request payload for a comment or a reply
#[derive(Debug, Deserialize, Validate)]
pub struct CommentText {
    #[validate(length(
        min = 1,
        max = 2000,
        message = "Comment must be between 1 and 2000 characters"
    ))]
    pub text: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentSort {
    #[default]
    Recent,
    Oldest,
    Likes,
}

/// Query parameters for fetching comments
#[derive(Debug, Default, Deserialize)]
pub struct CommentFilter {
    pub sort: Option<CommentSort>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyResponse {
    pub id: String,
    pub parent_id: String,
    pub text: String,
    pub author: AuthorResponse,
    pub likes: i64,
    pub liked_by_me: bool,
    pub created_at: DateTime<Utc>,
}

/// A comment with author info and its replies, oldest reply first
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentResponse {
    pub id: String,
    pub video_id: String,
    pub text: String,
    pub author: AuthorResponse,
    pub likes: i64,
    pub liked_by_me: bool,
    pub reply_count: i64,
    pub replies: Vec<ReplyResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

fn author_of(uid: &str, profile: Option<&Profile>) -> AuthorResponse {
    match profile {
        Some(profile) => AuthorResponse::from_profile(uid, profile),
        None => AuthorResponse {
            id: uid.to_string(),
            name: String::new(),
            avatar_url: String::new(),
        },
    }
}

impl ReplyResponse {
    pub fn new(id: &str, reply: Reply, author: Option<&Profile>, viewer: Option<&str>) -> Self {
        ReplyResponse {
            id: id.to_string(),
            author: author_of(&reply.user_id, author),
            liked_by_me: viewer.is_some_and(|uid| reply.liked_by.contains_key(uid)),
            parent_id: reply.parent_id,
            text: reply.text,
            likes: reply.likes,
            created_at: reply.created_at,
        }
    }
}

impl CommentResponse {
    /// Builds the response; `replies` must already be joined and ordered.
    pub fn new(
        id: &str,
        video_id: &str,
        comment: Comment,
        author: Option<&Profile>,
        replies: Vec<ReplyResponse>,
        viewer: Option<&str>,
    ) -> Self {
        CommentResponse {
            id: id.to_string(),
            video_id: video_id.to_string(),
            author: author_of(&comment.user_id, author),
            liked_by_me: viewer.is_some_and(|uid| comment.liked_by.contains_key(uid)),
            text: comment.text,
            likes: comment.likes,
            reply_count: comment.reply_count,
            replies,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
        }
    }
}
