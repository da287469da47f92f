//! Counter and index consistency across the write paths, driven through the
//! service layer against the in-memory store.

use std::sync::Arc;

use serde_json::json;

use reelverse::{
    auth::Actor,
    comments,
    feed::{self, FeedSort},
    follows,
    interactions::{self, LikeState, LikeTarget},
    profiles::service::{find_profile, resolve_profile},
    repair,
    store::{MemoryStore, TreeStore},
    videos::{self, VideoDraft},
};

fn actor(uid: &str) -> Actor {
    Actor {
        uid: uid.to_string(),
        email: format!("{uid}@example.com"),
    }
}

async fn with_users(uids: &[&str]) -> MemoryStore {
    let store = MemoryStore::new();
    for uid in uids {
        resolve_profile(&store, uid, Some(&actor(uid))).await.unwrap();
    }
    store
}

async fn publish(store: &MemoryStore, owner: &str, title: &str) -> String {
    let draft = VideoDraft {
        title: title.to_string(),
        ..Default::default()
    };
    let (id, _) = videos::service::publish_video(store, &actor(owner), draft)
        .await
        .unwrap();
    id
}

async fn child_count(store: &MemoryStore, path: &str) -> usize {
    match store.get(path).await.unwrap() {
        Some(serde_json::Value::Object(map)) => map.len(),
        _ => 0,
    }
}

async fn counter(store: &MemoryStore, path: &str) -> i64 {
    store
        .get(path)
        .await
        .unwrap()
        .and_then(|v| v.as_i64())
        .unwrap_or(0)
}

fn video(id: &str) -> LikeTarget {
    LikeTarget::Video {
        video_id: id.to_string(),
    }
}

#[tokio::test]
async fn follow_counters_match_index_sizes() {
    let store = with_users(&["a", "b", "c"]).await;
    let steps = [
        ("a", "b", true),
        ("c", "b", true),
        ("b", "a", true),
        ("a", "b", false),
        ("a", "c", true),
        ("c", "b", false),
        ("c", "b", true),
    ];
    for (from, to, follow) in steps {
        follows::service::set_following(&store, &actor(from), to, follow)
            .await
            .unwrap();
    }

    for uid in ["a", "b", "c"] {
        let profile = find_profile(&store, uid).await.unwrap().unwrap();
        assert_eq!(
            profile.followers as usize,
            child_count(&store, &format!("userFollowers/{uid}")).await
        );
        assert_eq!(
            profile.following as usize,
            child_count(&store, &format!("userFollowing/{uid}")).await
        );
    }
}

#[tokio::test]
async fn follow_then_unfollow_updates_both_sides() {
    let store = with_users(&["u1", "u2"]).await;

    follows::service::set_following(&store, &actor("u1"), "u2", true)
        .await
        .unwrap();
    let u1 = find_profile(&store, "u1").await.unwrap().unwrap();
    let u2 = find_profile(&store, "u2").await.unwrap().unwrap();
    assert_eq!(u1.following, 1);
    assert_eq!(u2.followers, 1);
    let followers = follows::service::list_followers(&store, "u2", None, None)
        .await
        .unwrap();
    assert_eq!(followers.users[0].id, "u1");

    follows::service::set_following(&store, &actor("u1"), "u2", false)
        .await
        .unwrap();
    let u1 = find_profile(&store, "u1").await.unwrap().unwrap();
    let u2 = find_profile(&store, "u2").await.unwrap().unwrap();
    assert_eq!(u1.following, 0);
    assert_eq!(u2.followers, 0);
    assert!(!store.exists("userFollowing/u1/u2").await.unwrap());
    assert!(!store.exists("userFollowers/u2/u1").await.unwrap());
    assert!(!store.exists("follows/u1/u2").await.unwrap());
}

#[tokio::test]
async fn video_likes_match_liked_by() {
    let store = with_users(&["owner", "a", "b", "c"]).await;
    let id = publish(&store, "owner", "clip").await;

    let steps = [
        ("a", Some(true)),
        ("b", None),
        ("a", Some(true)),
        ("c", Some(false)),
        ("b", None),
        ("c", None),
        ("a", Some(false)),
    ];
    for (uid, like) in steps {
        match like {
            Some(like) => interactions::service::set_like(&store, &video(&id), uid, like).await,
            None => interactions::service::toggle_like(&store, &video(&id), uid).await,
        }
        .unwrap();
    }

    let likes = counter(&store, &format!("videos/{id}/likes")).await;
    assert_eq!(likes as usize, child_count(&store, &format!("videos/{id}/likedBy")).await);
    assert_eq!(likes, 1);
    assert!(store.exists(&format!("userLikes/c/{id}")).await.unwrap());

    let owner = find_profile(&store, "owner").await.unwrap().unwrap();
    assert_eq!(owner.likes, 1);
}

#[tokio::test]
async fn unlike_at_zero_stays_zero() {
    let store = with_users(&["owner"]).await;
    let id = publish(&store, "owner", "clip").await;

    let state = interactions::service::set_like(&store, &video(&id), "stranger", false)
        .await
        .unwrap();
    assert_eq!(state, LikeState { liked: false, likes: 0 });
    assert_eq!(counter(&store, &format!("videos/{id}/likes")).await, 0);
    assert_eq!(find_profile(&store, "owner").await.unwrap().unwrap().likes, 0);
}

#[tokio::test]
async fn concurrent_likes_both_count() {
    let store = Arc::new(with_users(&["owner"]).await);
    let id = publish(&store, "owner", "fresh").await;

    let (first, second) = {
        let (store_a, store_b) = (store.clone(), store.clone());
        let (id_a, id_b) = (id.clone(), id.clone());
        tokio::join!(
            tokio::spawn(async move {
                interactions::service::set_like(store_a.as_ref(), &video(&id_a), "x", true).await
            }),
            tokio::spawn(async move {
                interactions::service::set_like(store_b.as_ref(), &video(&id_b), "y", true).await
            })
        )
    };
    first.unwrap().unwrap();
    second.unwrap().unwrap();

    assert_eq!(counter(&store, &format!("videos/{id}/likes")).await, 2);
    let liked_by = store
        .get(&format!("videos/{id}/likedBy"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(liked_by, json!({"x": true, "y": true}));
}

#[tokio::test]
async fn created_comment_is_listed() {
    let store = with_users(&["owner", "fan"]).await;
    let id = publish(&store, "owner", "clip").await;

    let created = comments::service::create_comment(&store, &actor("fan"), &id, "first!")
        .await
        .unwrap();

    let listed = feed::service::video_comments(&store, None, &id, Default::default())
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, created.id);
    assert_eq!(listed[0].text, "first!");
    assert_eq!(listed[0].author.id, "fan");
    assert_eq!(listed[0].author.name, "fan");

    assert_eq!(counter(&store, &format!("videos/{id}/comments")).await, 1);
    assert_eq!(find_profile(&store, "fan").await.unwrap().unwrap().comments, 1);
}

#[tokio::test]
async fn deletes_decrement_by_exactly_one() {
    let store = with_users(&["owner", "a", "b"]).await;
    let id = publish(&store, "owner", "clip").await;

    let keep = comments::service::create_comment(&store, &actor("a"), &id, "keep")
        .await
        .unwrap();
    let gone = comments::service::create_comment(&store, &actor("b"), &id, "gone")
        .await
        .unwrap();
    for text in ["r1", "r2"] {
        comments::service::create_reply(&store, &actor("a"), &id, &gone.id, text)
            .await
            .unwrap();
    }
    let reply = comments::service::create_reply(&store, &actor("b"), &id, &keep.id, "r3")
        .await
        .unwrap();
    comments::service::create_reply(&store, &actor("a"), &id, &keep.id, "r4")
        .await
        .unwrap();

    let comments_path = format!("videos/{id}/comments");
    assert_eq!(counter(&store, &comments_path).await, 2);

    comments::service::delete_comment(&store, &actor("b"), &id, &gone.id)
        .await
        .unwrap();
    assert_eq!(counter(&store, &comments_path).await, 1);
    // The replies went with it, and so did their authorship entries.
    assert_eq!(find_profile(&store, "a").await.unwrap().unwrap().comments, 2);
    assert_eq!(child_count(&store, "userComments/a").await, 2);

    let reply_count = format!("videoComments/{id}/{}/replyCount", keep.id);
    assert_eq!(counter(&store, &reply_count).await, 2);
    comments::service::delete_reply(&store, &actor("b"), &id, &keep.id, &reply.id)
        .await
        .unwrap();
    assert_eq!(counter(&store, &reply_count).await, 1);
    assert_eq!(find_profile(&store, "b").await.unwrap().unwrap().comments, 0);
}

#[tokio::test]
async fn deleting_a_video_leaves_no_dangling_entries() {
    let store = with_users(&["owner", "a", "b"]).await;
    let id = publish(&store, "owner", "clip").await;
    interactions::service::set_like(&store, &video(&id), "a", true)
        .await
        .unwrap();
    let comment = comments::service::create_comment(&store, &actor("b"), &id, "hi")
        .await
        .unwrap();
    comments::service::create_reply(&store, &actor("a"), &id, &comment.id, "yo")
        .await
        .unwrap();

    let blobs = reelverse::blob::LocalBlobStore::new(
        std::env::temp_dir().join("reelverse-unused"),
        "/media".to_string(),
    );
    videos::service::delete_video(&store, &blobs, &actor("owner"), &id)
        .await
        .unwrap();

    assert!(store.get("userLikes").await.unwrap().is_none());
    assert!(store.get("userComments").await.unwrap().is_none());
    assert!(store.get("videoComments").await.unwrap().is_none());
    for uid in ["owner", "a", "b"] {
        let profile = find_profile(&store, uid).await.unwrap().unwrap();
        assert_eq!((profile.likes, profile.comments), (0, 0), "{uid}");
    }
    assert!(repair::reconcile(&store, true).await.unwrap().is_clean());
}

#[tokio::test]
async fn search_is_case_insensitive_on_titles() {
    let store = with_users(&["owner"]).await;
    let beach = publish(&store, "owner", "Beach Day").await;
    let sunset = publish(&store, "owner", "sunset at the BEACH").await;
    publish(&store, "owner", "Mountains").await;

    let found = feed::service::search(&store, None, "beach", Some(FeedSort::Recent))
        .await
        .unwrap();
    let mut ids: Vec<_> = found.iter().map(|v| v.id.clone()).collect();
    ids.sort();
    let mut expected = vec![beach, sunset];
    expected.sort();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn service_writes_need_no_repair() {
    let store = with_users(&["a", "b", "c"]).await;
    let v1 = publish(&store, "a", "one").await;
    let v2 = publish(&store, "b", "two").await;

    follows::service::set_following(&store, &actor("a"), "b", true)
        .await
        .unwrap();
    follows::service::set_following(&store, &actor("c"), "b", true)
        .await
        .unwrap();
    for (uid, vid) in [("b", &v1), ("c", &v1), ("a", &v2)] {
        interactions::service::set_like(&store, &video(vid), uid, true)
            .await
            .unwrap();
    }
    let c = comments::service::create_comment(&store, &actor("c"), &v2, "nice")
        .await
        .unwrap();
    let target = LikeTarget::Comment {
        video_id: v2.clone(),
        comment_id: c.id.clone(),
    };
    interactions::service::set_like(&store, &target, "a", true)
        .await
        .unwrap();

    let report = repair::reconcile(&store, true).await.unwrap();
    assert!(report.is_clean(), "{report:?}");
}
