//! Recomputes every denormalized counter from the set it summarizes and drops
//! index entries whose record is gone.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::{
    error::AppResult,
    paths,
    store::{Batch, TreeStore, Write},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Correction {
    pub path: String,
    pub old: i64,
    pub new: i64,
}

#[derive(Debug, Default, Serialize)]
pub struct RepairReport {
    pub corrections: Vec<Correction>,
    /// Index entries pointing at records that no longer exist.
    pub removed: Vec<String>,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        self.corrections.is_empty() && self.removed.is_empty()
    }
}

fn object<'a>(node: Option<&'a Value>) -> Option<&'a Map<String, Value>> {
    node.and_then(Value::as_object)
}

fn child<'a>(node: &'a Value, key: &str) -> Option<&'a Value> {
    node.as_object().and_then(|m| m.get(key))
}

fn cardinality(node: Option<&Value>) -> i64 {
    object(node).map_or(0, |m| m.len() as i64)
}

fn counter(node: &Value, field: &str) -> i64 {
    child(node, field).and_then(Value::as_i64).unwrap_or(0)
}

fn check(report: &mut RepairReport, path: String, node: &Value, field: &str, actual: i64) {
    let stored = counter(node, field);
    if stored != actual {
        report.corrections.push(Correction {
            path: format!("{path}/{field}"),
            old: stored,
            new: actual,
        });
    }
}

fn comment_exists(root: &Value, video_id: &str, comment_id: &str, parent: Option<&str>) -> bool {
    let Some(comments) = child(root, paths::VIDEO_COMMENTS).and_then(|n| child(n, video_id)) else {
        return false;
    };
    match parent {
        None => child(comments, comment_id).is_some(),
        Some(parent) => child(comments, parent)
            .and_then(|c| child(c, "replies"))
            .and_then(|r| child(r, comment_id))
            .is_some(),
    }
}

fn scan(root: &Value) -> RepairReport {
    let mut report = RepairReport::default();

    // Comments and replies.
    for (video_id, comments) in object(child(root, paths::VIDEO_COMMENTS)).into_iter().flatten() {
        for (comment_id, comment) in object(Some(comments)).into_iter().flatten() {
            let path = paths::comment(video_id, comment_id);
            check(&mut report, path.clone(), comment, "likes", cardinality(child(comment, "likedBy")));
            check(&mut report, path, comment, "replyCount", cardinality(child(comment, "replies")));

            for (reply_id, reply) in object(child(comment, "replies")).into_iter().flatten() {
                let path = paths::reply(video_id, comment_id, reply_id);
                check(&mut report, path, reply, "likes", cardinality(child(reply, "likedBy")));
            }
        }
    }

    // Videos, and the likes each owner has received.
    let mut received: HashMap<&str, i64> = HashMap::new();
    for (video_id, video) in object(child(root, paths::VIDEOS)).into_iter().flatten() {
        let likes = cardinality(child(video, "likedBy"));
        let comments = cardinality(
            child(root, paths::VIDEO_COMMENTS).and_then(|n| child(n, video_id)),
        );
        let path = paths::video(video_id);
        check(&mut report, path.clone(), video, "likes", likes);
        check(&mut report, path, video, "comments", comments);

        if let Some(owner) = child(video, "userId").and_then(Value::as_str) {
            *received.entry(owner).or_default() += likes;
        }
    }

    // Dangling authorship and like index entries.
    let mut authored: HashMap<&str, i64> = HashMap::new();
    for (uid, entries) in object(child(root, paths::USER_COMMENTS)).into_iter().flatten() {
        for (comment_id, entry) in object(Some(entries)).into_iter().flatten() {
            let video_id = child(entry, "videoId").and_then(Value::as_str).unwrap_or("");
            let parent = child(entry, "parentId").and_then(Value::as_str);
            if comment_exists(root, video_id, comment_id, parent) {
                *authored.entry(uid.as_str()).or_default() += 1;
            } else {
                report.removed.push(paths::user_comment(uid, comment_id));
            }
        }
    }
    for (uid, entries) in object(child(root, paths::USER_LIKES)).into_iter().flatten() {
        for video_id in object(Some(entries)).into_iter().flatten().map(|(k, _)| k) {
            let liked = child(root, paths::VIDEOS)
                .and_then(|v| child(v, video_id))
                .and_then(|v| child(v, "likedBy"))
                .and_then(|l| child(l, uid))
                .is_some();
            if !liked {
                report.removed.push(paths::user_like(uid, video_id));
            }
        }
    }

    // Profiles.
    for (uid, user) in object(child(root, paths::USERS)).into_iter().flatten() {
        let Some(profile) = child(user, "profile") else {
            continue;
        };
        let path = paths::profile(uid);
        let followers = cardinality(child(root, paths::USER_FOLLOWERS).and_then(|n| child(n, uid)));
        let following = cardinality(child(root, paths::USER_FOLLOWING).and_then(|n| child(n, uid)));
        check(&mut report, path.clone(), profile, "followers", followers);
        check(&mut report, path.clone(), profile, "following", following);
        check(
            &mut report,
            path.clone(),
            profile,
            "likes",
            received.get(uid.as_str()).copied().unwrap_or(0),
        );
        check(
            &mut report,
            path,
            profile,
            "comments",
            authored.get(uid.as_str()).copied().unwrap_or(0),
        );
    }

    report
}

/// Scans the whole tree and, unless `dry_run`, writes every correction in
/// one commit. Increments racing the pass can be overwritten; run it while
/// writes are quiet.
pub async fn reconcile(store: &dyn TreeStore, dry_run: bool) -> AppResult<RepairReport> {
    let Some(root) = store.get("").await? else {
        return Ok(RepairReport::default());
    };

    let report = scan(&root);
    if report.is_clean() {
        info!("Reconcile: all counters consistent");
        return Ok(report);
    }

    info!(
        "Reconcile: {} counters drifted, {} dangling index entries{}",
        report.corrections.len(),
        report.removed.len(),
        if dry_run { " (dry run)" } else { "" }
    );

    if !dry_run {
        let mut batch = Batch::new();
        for c in &report.corrections {
            batch.push(&c.path, Write::Set(Value::from(c.new)));
        }
        for path in &report.removed {
            batch.push(path, Write::Remove);
        }
        store.commit(batch).await?;
    }

    Ok(report)
}
