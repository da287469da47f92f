use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, FromRef},
    routing::{get, post, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};

pub mod auth;
pub mod blob;
pub mod comments;
pub mod config;
pub mod error;
pub mod extract;
pub mod feed;
pub mod follows;
pub mod interactions;
pub mod multipart;
pub mod paths;
pub mod profiles;
pub mod repair;
pub mod response;
pub mod retry;
pub mod store;
pub mod videos;

use blob::SharedBlobStore;
use config::settings::Settings;
use store::{MemoryStore, PgStore, SharedStore};

#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub blobs: SharedBlobStore,
    pub settings: Settings,
}

impl FromRef<AppState> for SharedStore {
    fn from_ref(app_state: &AppState) -> SharedStore {
        app_state.store.clone()
    }
}

impl FromRef<AppState> for SharedBlobStore {
    fn from_ref(app_state: &AppState) -> SharedBlobStore {
        app_state.blobs.clone()
    }
}

impl FromRef<AppState> for Settings {
    fn from_ref(app_state: &AppState) -> Settings {
        app_state.settings.clone()
    }
}

/// PostgreSQL when `DATABASE_URL` is set, otherwise an in-process tree that
/// lives as long as the process.
pub async fn connect_store(settings: &Settings) -> anyhow::Result<SharedStore> {
    let Some(url) = &settings.database_url else {
        warn!("DATABASE_URL not set; using the in-memory store, data is lost on exit");
        let store: SharedStore = Arc::new(MemoryStore::new());
        return Ok(store);
    };

    let pool = PgPoolOptions::new()
        .max_connections(settings.database_max_connections)
        .connect(url)
        .await?;
    let store = PgStore::new(pool);
    store.migrate().await?;

    info!("database connected");
    let store: SharedStore = Arc::new(store);
    Ok(store)
}

pub fn router(app_state: AppState) -> Router {
    let upload_limit = DefaultBodyLimit::max(app_state.settings.max_upload_bytes);

    let auth_router = Router::new()
        .route("/sign-in", post(auth::handler::login))
        .route("/sign-up", post(auth::handler::signup))
        .route("/me", get(auth::handler::get_me));

    let user_router = Router::new()
        .route("/:id", get(profiles::handler::get_user_profile))
        .route(
            "/:id/follow",
            post(follows::handler::follow_user).delete(follows::handler::unfollow_user),
        )
        .route("/:id/followers", get(follows::handler::get_followers))
        .route("/:id/following", get(follows::handler::get_following))
        .route("/:id/is-following", get(follows::handler::check_following))
        .route("/:id/videos", get(feed::handler::get_user_videos));

    let me_router = Router::new()
        .route("/profile", put(profiles::handler::update_my_profile))
        .route(
            "/avatar",
            post(profiles::handler::upload_avatar).layer(upload_limit.clone()),
        )
        .route(
            "/following-status",
            post(follows::handler::check_following_bulk),
        )
        .route("/suggestions", get(follows::handler::get_follow_suggestions));

    let video_router = Router::new()
        .route(
            "/",
            post(videos::handler::create_video).layer(upload_limit),
        )
        .route(
            "/:id",
            get(videos::handler::get_video)
                .put(videos::handler::update_video)
                .delete(videos::handler::delete_video),
        )
        .route("/:id/view", post(interactions::handler::record_view))
        .route("/:id/share", post(interactions::handler::record_share))
        .route(
            "/:id/like",
            post(interactions::handler::toggle_video_like)
                .put(interactions::handler::like_video)
                .delete(interactions::handler::unlike_video),
        )
        .route(
            "/:id/comments",
            get(feed::handler::get_video_comments).post(comments::handler::create_comment),
        )
        .route(
            "/:id/comments/:cid",
            put(comments::handler::update_comment).delete(comments::handler::delete_comment),
        )
        .route(
            "/:id/comments/:cid/like",
            post(interactions::handler::toggle_comment_like)
                .put(interactions::handler::like_comment)
                .delete(interactions::handler::unlike_comment),
        )
        .route(
            "/:id/comments/:cid/replies",
            post(comments::handler::create_reply),
        )
        .route(
            "/:id/comments/:cid/replies/:rid",
            axum::routing::delete(comments::handler::delete_reply),
        )
        .route(
            "/:id/comments/:cid/replies/:rid/like",
            post(interactions::handler::toggle_reply_like)
                .put(interactions::handler::like_reply)
                .delete(interactions::handler::unlike_reply),
        );

    let feed_router = Router::new()
        .route("/", get(feed::handler::get_feed))
        .route("/trending", get(feed::handler::get_trending))
        .route("/search", get(feed::handler::search_videos))
        .route("/following", get(feed::handler::get_following_feed));

    let media = ServeDir::new(&app_state.settings.media_dir);
    let media_path = app_state.settings.media_base_url.clone();

    Router::new()
        .route("/", get(|| async { "Reelverse API" }))
        .nest("/api/auth", auth_router)
        .nest("/api/users", user_router)
        .nest("/api/me", me_router)
        .nest("/api/videos", video_router)
        .nest("/api/feed", feed_router)
        .nest_service(&media_path, media)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
