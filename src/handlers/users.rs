use super::AppState;
use crate::auth::password::{hash_password, verify_decoy, verify_password};
use crate::auth::Identity;
use crate::error::{Result, ServiceError};
use crate::repository::User;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub user_name: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: String,
    pub user_id: String,
    pub token: String,
}

fn credentials(payload: std::result::Result<Json<Credentials>, JsonRejection>) -> Result<Credentials> {
    let Json(credentials) = payload.map_err(|e| ServiceError::BadRequest(e.body_text()))?;
    if credentials.user_name.trim().is_empty() || credentials.password.is_empty() {
        return Err(ServiceError::BadRequest(
            "user_name and password are required".to_string(),
        ));
    }
    Ok(credentials)
}

/// `POST /api/v1/signup`
pub async fn signup(
    State(state): State<AppState>,
    payload: std::result::Result<Json<Credentials>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Credentials {
        user_name,
        password,
    } = credentials(payload)?;

    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ServiceError::Internal(format!("password hashing task failed: {}", e)))??;

    let user = state
        .users
        .create(User {
            user_id: Uuid::new_v4().to_string(),
            user_name,
            password_hash,
        })
        .await?;

    let token = state.issuer.issue(&Identity::new(user.user_id.clone()))?;
    info!(user_id = %user.user_id, "User signed up");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: user.user_name,
            user_id: user.user_id,
            token,
        }),
    ))
}

/// `POST /api/v1/login`
pub async fn login(
    State(state): State<AppState>,
    payload: std::result::Result<Json<Credentials>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Credentials {
        user_name,
        password,
    } = credentials(payload)?;

    let user = state.users.find_by_name(&user_name).await?;

    // Unknown names still pay for one Argon2 verification
    let stored_hash = user.as_ref().map(|u| u.password_hash.clone());
    let verified = tokio::task::spawn_blocking(move || match stored_hash {
        Some(hash) => verify_password(&password, &hash),
        None => verify_decoy(&password),
    })
    .await
    .map_err(|e| ServiceError::Internal(format!("password check task failed: {}", e)))?;

    let user = match user {
        Some(user) if verified => user,
        Some(user) => {
            warn!(user_id = %user.user_id, "Login with wrong password");
            return Err(ServiceError::InvalidCredentials);
        }
        None => {
            debug!("Login for unknown user");
            return Err(ServiceError::InvalidCredentials);
        }
    };

    let token = state.issuer.issue(&Identity::new(user.user_id.clone()))?;
    info!(user_id = %user.user_id, "User logged in");

    Ok((
        StatusCode::OK,
        Json(AuthResponse {
            user: user.user_name,
            user_id: user.user_id,
            token,
        }),
    ))
}
