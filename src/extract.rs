use axum::{
    async_trait,
    extract::{FromRequestParts, Path, RawPathParams},
    http::request::Parts,
};
use serde::de::DeserializeOwned;

use crate::error::AppError;

const MAX_ID_LEN: usize = 128;

/// Ids taken from a URL become tree path segments, so they are limited to
/// `[A-Za-z0-9_-]`. Anything else (a decoded `%2F` in particular) is refused.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// `Path<T>` that answers 400 when any captured segment is not a valid id.
pub struct ValidPath<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ValidPath<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let raw = RawPathParams::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::BadRequest("Invalid path".to_string()))?;
        if let Some((name, _)) = raw.iter().find(|(_, value)| !is_valid_id(value)) {
            return Err(AppError::BadRequest(format!("Invalid {name}")));
        }

        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::BadRequest("Invalid path".to_string()))?;
        Ok(ValidPath(value))
    }
}
