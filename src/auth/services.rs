pub(crate) use crate::auth::dto::{Claims, JwtKeys, TokenKind};
use crate::auth::dto::{LoginRequest, RegisterRequest};
use crate::config::JwtConfig;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::users::repo::DuplicateEmail;
use crate::users::repo_types::{NewUser, Role, User};
use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::{async_trait, extract::{FromRef, FromRequestParts}, http::request::Parts};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use regex::Regex;
use std::time::Duration;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// Validates a registration request and stores the new account.
pub async fn register_user(state: &AppState, mut payload: RegisterRequest) -> AppResult<User> {
    payload.email = payload.email.trim().to_lowercase();
    let name = payload.name.trim().to_string();

    if name.is_empty() {
        return Err(AppError::validation("Name is required"));
    }
    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AppError::validation("Invalid email"));
    }
    if payload.password.len() < 8 {
        warn!("password too short");
        return Err(AppError::validation("Password too short"));
    }
    if payload.role == Role::Admin {
        warn!(email = %payload.email, "self-registration as admin refused");
        return Err(AppError::validation("Role must be patient or doctor"));
    }

    let profile = payload.profile.unwrap_or_default();
    if payload.role == Role::Doctor {
        if let Some(field) = profile.missing_doctor_field() {
            return Err(AppError::validation(format!("Doctors must provide {field}")));
        }
    }

    if state.users.find_by_email(&payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let password_hash = hash_password(&payload.password)?;
    let user = state
        .users
        .create(NewUser {
            name,
            email: payload.email,
            password_hash,
            role: payload.role,
            profile,
        })
        .await
        .map_err(|e| {
            if e.downcast_ref::<DuplicateEmail>().is_some() {
                AppError::Conflict("Email already registered".into())
            } else {
                AppError::Storage(e)
            }
        })?;

    info!(user_id = %user.id, email = %user.email, role = %user.role, "user registered");
    Ok(user)
}

/// Checks credentials; unknown email and wrong password are indistinguishable.
pub async fn authenticate(state: &AppState, mut payload: LoginRequest) -> AppResult<User> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AppError::validation("Invalid email"));
    }

    let Some(user) = state.users.find_by_email(&payload.email).await? else {
        warn!(email = %payload.email, "login unknown email");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(email = %payload.email, user_id = %user.id, "login invalid password");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    info!(user_id = %user.id, "user logged in");
    Ok(user)
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        let JwtConfig {
            secret,
            issuer,
            audience,
            ttl_minutes,
            refresh_ttl_minutes,
        } = state.config.jwt.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            audience,
            access_ttl: Duration::from_secs((ttl_minutes as u64) * 60),
            refresh_ttl: Duration::from_secs((refresh_ttl_minutes as u64) * 60),
        }
    }
}

impl JwtKeys {
    fn sign_with_kind(&self, user_id: Uuid, role: Role, kind: TokenKind) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            role,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, kind = ?kind, "jwt signed");
        Ok(token)
    }

    pub fn sign_access(&self, user_id: Uuid, role: Role) -> anyhow::Result<String> {
        self.sign_with_kind(user_id, role, TokenKind::Access)
    }
    pub fn sign_refresh(&self, user_id: Uuid, role: Role) -> anyhow::Result<String> {
        self.sign_with_kind(user_id, role, TokenKind::Refresh)
    }

    /// Signs an access/refresh pair for `user`.
    pub fn issue_pair(&self, user: &User) -> anyhow::Result<(String, String)> {
        Ok((
            self.sign_access(user.id, user.role)?,
            self.sign_refresh(user.id, user.role)?,
        ))
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(user_id = %data.claims.sub, kind = ?data.claims.kind, "jwt verified");
        Ok(data.claims)
    }

    pub fn verify_refresh(&self, token: &str) -> anyhow::Result<Claims> {
        let claims = self.verify(token)?;
        if claims.kind != TokenKind::Refresh {
            anyhow::bail!("not a refresh token");
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod password_tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(verify_password(password, &hash).expect("verify should succeed"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let password = "correct-horse-battery-staple";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(!verify_password("wrong-password", &hash).expect("verify should not error"));
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let err = verify_password("anything", "not-a-valid-hash").unwrap_err();
        let msg = err.to_string();
        assert!(!msg.is_empty());
    }

    #[test]
    fn email_shape_check() {
        assert!(is_valid_email("dr.who@clinic.org"));
        assert!(!is_valid_email("no-at-sign.org"));
        assert!(!is_valid_email("two words@clinic.org"));
    }
}

/// Authenticated caller, taken from the `Authorization: Bearer` access token.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

impl AuthUser {
    /// Whether the caller may act on `user_id`'s resources.
    pub fn can_act_for(&self, user_id: Uuid) -> bool {
        self.id == user_id || self.role == Role::Admin
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .or_else(|| auth_header.strip_prefix("bearer "))
            .ok_or_else(|| AppError::Unauthorized("Invalid Authorization header".into()))?;

        let claims = match keys.verify(token) {
            Ok(c) => c,
            Err(_) => {
                warn!("invalid or expired token");
                return Err(AppError::Unauthorized("Invalid or expired token".into()));
            }
        };

        if claims.kind != TokenKind::Access {
            return Err(AppError::Unauthorized("Access token required".into()));
        }

        Ok(AuthUser {
            id: claims.sub,
            role: claims.role,
        })
    }
}


#[cfg(test)]
mod register_tests {
    use super::*;
    use crate::users::repo_types::Profile;

    fn request(email: &str, role: Role, profile: Option<Profile>) -> RegisterRequest {
        RegisterRequest {
            name: "Jane Doe".into(),
            email: email.into(),
            password: "long-enough-pw".into(),
            role,
            profile,
        }
    }

    #[tokio::test]
    async fn register_normalizes_email_and_login_succeeds() {
        let state = AppState::in_memory();
        let user = register_user(&state, request("  Jane@Example.COM ", Role::Patient, None))
            .await
            .expect("register");
        assert_eq!(user.email, "jane@example.com");

        let logged_in = authenticate(
            &state,
            LoginRequest {
                email: "JANE@example.com".into(),
                password: "long-enough-pw".into(),
            },
        )
        .await
        .expect("login");
        assert_eq!(logged_in.id, user.id);
    }

    #[tokio::test]
    async fn register_rejects_duplicate_email() {
        let state = AppState::in_memory();
        register_user(&state, request("jane@example.com", Role::Patient, None))
            .await
            .unwrap();
        let err = register_user(&state, request("jane@example.com", Role::Patient, None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn doctor_requires_specialization_and_license() {
        let state = AppState::in_memory();
        let err = register_user(&state, request("doc@example.com", Role::Doctor, None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let profile = Profile {
            specialization: Some("Dermatology".into()),
            license: Some("LIC-1".into()),
            ..Profile::default()
        };
        let doc = register_user(&state, request("doc@example.com", Role::Doctor, Some(profile)))
            .await
            .expect("doctor with profile");
        assert_eq!(doc.role, Role::Doctor);
    }

    #[tokio::test]
    async fn admin_cannot_self_register() {
        let state = AppState::in_memory();
        let err = register_user(&state, request("root@example.com", Role::Admin, None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn login_rejects_wrong_password() {
        let state = AppState::in_memory();
        register_user(&state, request("jane@example.com", Role::Patient, None))
            .await
            .unwrap();
        let err = authenticate(
            &state,
            LoginRequest {
                email: "jane@example.com".into(),
                password: "not-the-password".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
}
