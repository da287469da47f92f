use serde::Deserialize;

pub mod handler;
pub mod service;

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 50;
pub const TRENDING_SIZE: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedSort {
    /// Newest first
    #[default]
    Recent,
    /// Most liked first, newest first among equals
    Likes,
    /// Most commented first, newest first among equals
    Comments,
}

/// Query parameters for the main feed
#[derive(Debug, Default, Deserialize)]
pub struct FeedFilter {
    pub sort: Option<FeedSort>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Query parameters for title search
#[derive(Debug, Default, Deserialize)]
pub struct SearchFilter {
    #[serde(default)]
    pub q: String,
    pub sort: Option<FeedSort>,
}
