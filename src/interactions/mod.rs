use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{error::AppError, paths};

pub mod handler;
pub mod service;

/// Anything that carries a `likes` counter and a `likedBy` set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LikeTarget {
    Video {
        video_id: String,
    },
    Comment {
        video_id: String,
        comment_id: String,
    },
    Reply {
        video_id: String,
        comment_id: String,
        reply_id: String,
    },
}

impl LikeTarget {
    pub fn path(&self) -> String {
        match self {
            LikeTarget::Video { video_id } => paths::video(video_id),
            LikeTarget::Comment {
                video_id,
                comment_id,
            } => paths::comment(video_id, comment_id),
            LikeTarget::Reply {
                video_id,
                comment_id,
                reply_id,
            } => paths::reply(video_id, comment_id, reply_id),
        }
    }

    pub(crate) fn not_found(&self) -> AppError {
        let what = match self {
            LikeTarget::Video { .. } => "Video",
            LikeTarget::Comment { .. } => "Comment",
            LikeTarget::Reply { .. } => "Reply",
        };
        AppError::NotFound(format!("{what} not found"))
    }
}

/// Index entry at `userLikes/{uid}/{videoId}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikedVideo {
    pub created_at: DateTime<Utc>,
}

/// Response for like/unlike actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LikeState {
    pub liked: bool,
    pub likes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterResponse {
    pub count: i64,
}
