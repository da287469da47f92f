//! Fills the configured store with demo accounts, videos, follows, likes and
//! comments, then reconciles every counter.

use std::env;

use dotenv::dotenv;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{info, warn};

use reelverse::{
    auth::{self, Actor, LoginUser, RegisterUser},
    comments,
    config::settings::{parsed_or, Settings},
    error::{AppError, AppResult},
    follows,
    interactions::{self, LikeTarget},
    repair,
    retry::{retry_with_backoff, RetryConfig},
    store::TreeStore,
    videos::{self, VideoDraft},
};

const CAPTIONS: &[&str] = &[
    "Morning run by the river",
    "Street food tour",
    "Skateboard tricks",
    "Rainy day piano",
    "Desert sunset timelapse",
    "Cat vs cucumber",
    "Five minute pasta",
    "City lights from the roof",
];

const REMARKS: &[&str] = &["Love this!", "So good", "Where is this?", "Again please", "Wow"];

struct SeedConfig {
    users: usize,
    videos_per_user: usize,
    follows: usize,
    password: String,
    like_chance: f64,
}

impl SeedConfig {
    fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            users: parsed_or("SEED_USERS", 8)?,
            videos_per_user: parsed_or("SEED_VIDEOS_PER_USER", 3)?,
            follows: parsed_or("SEED_FOLLOWS", 3)?,
            password: env::var("SEED_PASSWORD").unwrap_or_else(|_| "password123".to_string()),
            like_chance: like_chance(parsed_or("SEED_LIKE_CHANCE", 0.4_f64)?)?,
        })
    }
}

/// Probability handed to `gen_bool`, which panics outside `0..=1`.
fn like_chance(raw: f64) -> anyhow::Result<f64> {
    if !raw.is_finite() {
        anyhow::bail!("SEED_LIKE_CHANCE must be a finite number, got {raw}");
    }
    Ok(raw.clamp(0.0, 1.0))
}

/// Registers the demo account, or signs in when it already exists.
async fn ensure_account(
    store: &dyn TreeStore,
    retry: &RetryConfig,
    index: usize,
    password: &str,
) -> AppResult<Actor> {
    let email = format!("demo{index}@reelverse.dev");
    let registration = RegisterUser {
        email: email.clone(),
        password: password.to_string(),
        name: Some(format!("Demo {}", index + 1)),
    };

    let registered = retry_with_backoff(retry, "register", || {
        auth::service::register(store, &registration)
    })
    .await;

    match registered {
        Ok((actor, _)) => Ok(actor),
        Err(AppError::Conflict(_)) => {
            let login = LoginUser {
                email,
                password: password.to_string(),
            };
            let (actor, _) = retry_with_backoff(retry, "sign in", || {
                auth::service::authenticate(store, &login)
            })
            .await?;
            Ok(actor)
        }
        Err(e) => Err(e),
    }
}

async fn seed(store: &dyn TreeStore, config: &SeedConfig) -> AppResult<()> {
    let retry = RetryConfig::default();
    let mut rng = StdRng::from_entropy();

    let mut actors = Vec::with_capacity(config.users);
    for i in 0..config.users {
        actors.push(ensure_account(store, &retry, i, &config.password).await?);
    }
    info!("{} demo accounts ready", actors.len());

    let mut video_ids = Vec::new();
    for (i, actor) in actors.iter().enumerate() {
        for j in 0..config.videos_per_user {
            let n = i * config.videos_per_user + j;
            let draft = VideoDraft {
                title: CAPTIONS[n % CAPTIONS.len()].to_string(),
                description: format!("Demo clip #{}", n + 1),
                video_url: format!("https://cdn.reelverse.dev/demo/{n}.mp4"),
                thumbnail_url: format!("https://cdn.reelverse.dev/demo/{n}.jpg"),
            };
            let (id, _) = retry_with_backoff(&retry, "publish video", || {
                videos::service::publish_video(store, actor, draft.clone())
            })
            .await?;
            video_ids.push(id);
        }
    }
    info!("{} demo videos published", video_ids.len());

    let n = actors.len();
    let hops = config.follows.min(n.saturating_sub(1));
    for (i, actor) in actors.iter().enumerate() {
        for hop in 1..=hops {
            let followee = &actors[(i + hop) % n].uid;
            retry_with_backoff(&retry, "follow", || {
                follows::service::set_following(store, actor, followee, true)
            })
            .await?;
        }
    }

    for (v, video_id) in video_ids.iter().enumerate() {
        let target = LikeTarget::Video {
            video_id: video_id.clone(),
        };
        for actor in &actors {
            if rng.gen_bool(config.like_chance) {
                retry_with_backoff(&retry, "like", || {
                    interactions::service::set_like(store, &target, &actor.uid, true)
                })
                .await?;
            }
        }

        let commenter = &actors[(v + 1) % n];
        let remark = REMARKS[rng.gen_range(0..REMARKS.len())];
        retry_with_backoff(&retry, "comment", || {
            comments::service::create_comment(store, commenter, video_id, remark)
        })
        .await?;
    }
    info!("Follows, likes and comments added");

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seed=info,reelverse=info".into()),
        )
        .init();

    let settings = Settings::from_env()?;
    let config = SeedConfig::from_env()?;
    if settings.database_url.is_none() {
        warn!("Seeding the in-memory store; nothing will outlive this process");
    }
    if config.users == 0 {
        info!("SEED_USERS is 0, nothing to do");
        return Ok(());
    }

    let store = reelverse::connect_store(&settings).await?;
    seed(store.as_ref(), &config).await?;

    let report = repair::reconcile(store.as_ref(), false).await?;
    info!(
        "Reconcile corrected {} counters and removed {} dangling entries",
        report.corrections.len(),
        report.removed.len()
    );
    for c in &report.corrections {
        info!("  {}: {} -> {}", c.path, c.old, c.new);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_chance_is_a_probability() {
        assert_eq!(like_chance(0.4).unwrap(), 0.4);
        assert_eq!(like_chance(7.0).unwrap(), 1.0);
        assert_eq!(like_chance(-1.0).unwrap(), 0.0);
        assert!(like_chance(f64::NAN).is_err());
        assert!(like_chance(f64::INFINITY).is_err());
    }
}
