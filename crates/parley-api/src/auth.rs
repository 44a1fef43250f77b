use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;
use uuid::Uuid;

use parley_db::Database;
use parley_gateway::Relay;
use parley_gateway::handshake::TOKEN_COOKIE;
use parley_types::api::{AuthResponse, LoginRequest, SignupRequest};

use crate::error::{ApiError, run_blocking};
use crate::middleware::Claims;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub relay: Relay,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
}

pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let full_name = req.full_name.trim().to_string();
    let email = req.email.trim().to_lowercase();

    if full_name.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest("All fields are required".into()));
    }
    if req.password.len() < 6 {
        return Err(ApiError::BadRequest("Password must be at least 6 characters".into()));
    }
    if !is_plausible_email(&email) {
        return Err(ApiError::BadRequest("Invalid email format".into()));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {}", e)))?
        .to_string();

    let user_id = Uuid::new_v4();
    let db = state.db.clone();
    let lookup_email = email.clone();
    let user = run_blocking(move || {
        // The UNIQUE index decides, so concurrent signups cannot both win
        if !db.create_user(&user_id.to_string(), &full_name, &lookup_email, &password_hash)? {
            return Ok(None);
        }
        db.get_user_by_id(&user_id.to_string())?
            .map(|row| row.into_user())
            .transpose()
    })
    .await?
    .ok_or_else(|| ApiError::Conflict("Email already exists".into()))?;

    let token = create_token(&state, user.id, &user.email)?;
    info!("New user signed up: {}", user.id);

    Ok((
        StatusCode::CREATED,
        jar.add(session_cookie(token.clone())),
        Json(AuthResponse { user, token }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();
    let db = state.db.clone();
    let row = run_blocking(move || db.get_user_by_email(&email))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&row.password)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("corrupt password hash: {}", e)))?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized)?;

    let user = row.into_user()?;
    let token = create_token(&state, user.id, &user.email)?;

    Ok((jar.add(session_cookie(token.clone())), Json(AuthResponse { user, token })))
}

pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    let jar = jar.remove(Cookie::build(TOKEN_COOKIE).path("/"));
    (jar, Json(serde_json::json!({ "message": "Logged out successfully" })))
}

pub async fn check(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let id = claims.sub.to_string();
    let user = run_blocking(move || db.get_user_by_id(&id)?.map(|row| row.into_user()).transpose())
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    Ok(Json(user))
}

fn create_token(state: &AppStateInner, user_id: Uuid, email: &str) -> Result<String, ApiError> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: chrono::Utc::now()
            .checked_add_signed(state.token_ttl)
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("token lifetime out of range")))?
            .timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.jwt_secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(e.into()))?;

    Ok(token)
}

fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((TOKEN_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .build()
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}
