use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::profiles::ProfileResponse;

pub mod handler;
pub mod jwt;
pub mod service;
pub mod utils;

/// The account performing an action. Every write takes one explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub uid: String,
    pub email: String,
}

/// Stored at `accounts/{uid}`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub email: String,
    pub password_hash: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterUser {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(
        min = 1,
        max = 50,
        message = "Name must be between 1 and 50 characters"
    ))]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginUser {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub account: AccountResponse,
    pub profile: ProfileResponse,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: String,
    pub email: String,
}

impl From<&Actor> for AccountResponse {
    fn from(actor: &Actor) -> Self {
        AccountResponse {
            id: actor.uid.clone(),
            email: actor.email.clone(),
        }
    }
}
