//! Where every record lives in the tree.

use crate::store::encode_key;

pub const USERS: &str = "users";
pub const VIDEOS: &str = "videos";
pub const VIDEO_COMMENTS: &str = "videoComments";
pub const USER_FOLLOWERS: &str = "userFollowers";
pub const USER_FOLLOWING: &str = "userFollowing";
pub const USER_COMMENTS: &str = "userComments";
pub const USER_LIKES: &str = "userLikes";

pub fn account(uid: &str) -> String {
    format!("accounts/{uid}")
}

pub fn account_email(email: &str) -> String {
    format!("accountEmails/{}", encode_key(&email.trim().to_lowercase()))
}

pub fn profile(uid: &str) -> String {
    format!("users/{uid}/profile")
}

pub fn user_videos(uid: &str) -> String {
    format!("users/{uid}/videos")
}

pub fn user_video(uid: &str, video_id: &str) -> String {
    format!("users/{uid}/videos/{video_id}")
}

pub fn video(video_id: &str) -> String {
    format!("videos/{video_id}")
}

pub fn video_comments(video_id: &str) -> String {
    format!("videoComments/{video_id}")
}

pub fn comment(video_id: &str, comment_id: &str) -> String {
    format!("videoComments/{video_id}/{comment_id}")
}

pub fn reply(video_id: &str, comment_id: &str, reply_id: &str) -> String {
    format!("videoComments/{video_id}/{comment_id}/replies/{reply_id}")
}

pub fn user_like(uid: &str, video_id: &str) -> String {
    format!("userLikes/{uid}/{video_id}")
}

pub fn user_comment(uid: &str, comment_id: &str) -> String {
    format!("userComments/{uid}/{comment_id}")
}

pub fn follows(follower: &str, followee: &str) -> String {
    format!("follows/{follower}/{followee}")
}

pub fn followers_of(uid: &str) -> String {
    format!("userFollowers/{uid}")
}

pub fn follower(uid: &str, follower: &str) -> String {
    format!("userFollowers/{uid}/{follower}")
}

pub fn following_of(uid: &str) -> String {
    format!("userFollowing/{uid}")
}

pub fn following(uid: &str, followee: &str) -> String {
    format!("userFollowing/{uid}/{followee}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ownership_entries_live_under_the_index() {
        assert_eq!(user_videos("u1"), "users/u1/videos");
        assert_eq!(user_video("u1", "v1"), format!("{}/v1", user_videos("u1")));
    }
}
