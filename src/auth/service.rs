//! Account operations
//! ------------------
//! Login, registration, password change and the mail-backed reset flow. Every
//! operation takes and returns explicit values; the authenticated caller is an
//! `AuthUser` handed in by the HTTP layer, never ambient state.

use crate::auth::password::{check_password_policy, hash_password, verify_password};
use crate::auth::token::{ResetTokenSigner, TokenError, DEFAULT_RESET_MAX_AGE_SECS};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::mail::Mailer;
use crate::store::models::UserRow;
use crate::store::Store;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex compiles"));

/// The authenticated identity passed into gated operations.
#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub external_id: String,
    pub roles: Vec<String>,
}

impl AuthUser {
    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        self.roles.iter().any(|held| roles.iter().any(|want| want == held))
    }
}

/// Fails closed: the caller must hold at least one of `roles`.
pub fn require_any_role(user: &AuthUser, roles: &[&str]) -> AppResult<()> {
    if user.has_any_role(roles) {
        Ok(())
    } else {
        warn!(user = %user.username, required = ?roles, "role check failed");
        Err(AppError::forbidden(
            "role_required",
            "you do not have permission to do that",
        ))
    }
}

/// Why a login was denied. The response message is the same generic text for
/// all of these; only the field hint differs, for form UIs. That hint leaks
/// which half was wrong, a known enumeration weakness carried over from the
/// login form's behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginDenied {
    UnknownIdentifier,
    BadPassword,
    Inactive,
}

impl LoginDenied {
    /// Which login-form field carries the error.
    pub fn field(&self) -> &'static str {
        match self {
            LoginDenied::UnknownIdentifier | LoginDenied::Inactive => "identifier",
            LoginDenied::BadPassword => "password",
        }
    }
}

pub enum LoginOutcome {
    Granted(AuthUser),
    Denied(LoginDenied),
}

pub struct AuthService {
    store: Store,
    signer: ResetTokenSigner,
    mailer: Arc<Mailer>,
    app_name: String,
    public_url: String,
}

impl AuthService {
    pub fn new(store: Store, config: &Config, mailer: Arc<Mailer>) -> Self {
        AuthService {
            store,
            signer: ResetTokenSigner::new(config.secret_key.clone()),
            mailer,
            app_name: config.app_name.clone(),
            public_url: config.public_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn signer(&self) -> &ResetTokenSigner {
        &self.signer
    }

    /// Loads the identity behind a session. Accounts disabled since login
    /// resolve to None.
    pub async fn load_user(&self, user_id: i64) -> AppResult<Option<AuthUser>> {
        match self.store.user_by_id(user_id).await? {
            Some(row) if row.active => Ok(Some(self.auth_user(row).await?)),
            _ => Ok(None),
        }
    }

    /// Login by email or username: the identifier is tried as an email first,
    /// then as a username.
    pub async fn login(&self, identifier: &str, password: &str) -> AppResult<LoginOutcome> {
        let identifier = identifier.trim();
        let user = match self.store.user_by_email(identifier).await? {
            Some(u) => Some(u),
            None => self.store.user_by_username(identifier).await?,
        };
        let Some(user) = user else {
            info!(identifier, "login denied: unknown identifier");
            return Ok(LoginOutcome::Denied(LoginDenied::UnknownIdentifier));
        };
        if !verify_password(&user.password_hash, password) {
            info!(user = %user.username, "login denied: bad password");
            return Ok(LoginOutcome::Denied(LoginDenied::BadPassword));
        }
        if !user.active {
            info!(user = %user.username, "login denied: account disabled");
            return Ok(LoginOutcome::Denied(LoginDenied::Inactive));
        }
        Ok(LoginOutcome::Granted(self.auth_user(user).await?))
    }

    /// Self-service registration. Accounts are active immediately; a welcome
    /// mail is sent best-effort.
    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> AppResult<AuthUser> {
        let email = email.trim();
        let username = username.trim();
        if !EMAIL_RE.is_match(email) {
            return Err(AppError::validation("invalid_email", "not a valid email address"));
        }
        if username.is_empty() {
            return Err(AppError::validation("invalid_username", "username must not be empty"));
        }
        check_password_policy(password)?;
        if self.store.user_by_email(email).await?.is_some() {
            return Err(AppError::validation(
                "email_taken",
                "Email address is already registered",
            ));
        }
        if self.store.user_by_username(username).await?.is_some() {
            return Err(AppError::validation("username_taken", "Username is already taken"));
        }

        let phc = hash_password(password)?;
        let external_id = Uuid::new_v4().to_string();
        let row = match self
            .store
            .create_user(email, username, &phc, &external_id, crate::now_epoch())
            .await
        {
            Ok(row) => row,
            // The pre-checks raced a concurrent registration; the constraint
            // is the source of truth.
            Err(AppError::Conflict { .. }) => {
                return Err(AppError::validation(
                    "account_exists",
                    "email or username is already in use",
                ));
            }
            Err(e) => return Err(e),
        };
        info!(user = %row.username, "account registered");

        let subject = format!("Welcome to {}", self.app_name);
        let body = format!(
            "Your {} account is ready. Sign in with your email or username.",
            self.app_name
        );
        if let Err(e) = self.mailer.send(&row.email, &subject, &body).await {
            warn!(error = %e, "welcome mail failed");
        }
        self.auth_user(row).await
    }

    pub async fn change_password(
        &self,
        user_id: i64,
        current: &str,
        new: &str,
        confirm: &str,
    ) -> AppResult<()> {
        let Some(user) = self.store.user_by_id(user_id).await? else {
            return Err(AppError::not_found("user_missing", "no such user"));
        };
        if !verify_password(&user.password_hash, current) {
            return Err(AppError::validation(
                "current_password",
                "Current password is incorrect",
            ));
        }
        if new != confirm {
            return Err(AppError::validation("password_mismatch", "New passwords don't match"));
        }
        check_password_policy(new)?;
        let phc = hash_password(new)?;
        self.store.update_password(user_id, &phc).await?;
        info!(user = %user.username, "password changed");
        Ok(())
    }

    /// Issues a reset token for a known email, mails the link best-effort and
    /// returns the masked address for display. Unknown addresses are reported
    /// to the caller, mirroring the form's distinct "not found" response.
    pub async fn request_password_reset(&self, email: &str) -> AppResult<String> {
        let Some(user) = self.store.user_by_email(email.trim()).await? else {
            return Err(AppError::not_found("email_unknown", "Email address not found"));
        };
        let token = self.signer.issue(&user.email);
        let reset_url = format!("{}/reset-password/{token}", self.public_url);
        let subject = format!("Password Reset Request for {}", self.app_name);
        let body = format!(
            "Click the link to reset your {} password: {reset_url}",
            self.app_name
        );
        if let Err(e) = self.mailer.send(&user.email, &subject, &body).await {
            warn!(error = %e, "reset mail failed");
        }
        info!(user = %user.username, "password reset requested");
        Ok(mask_email(&user.email))
    }

    /// Completes a reset: the token is the only capability required.
    pub async fn reset_password(&self, token: &str, new: &str, confirm: &str) -> AppResult<()> {
        let email = self
            .signer
            .verify(token, DEFAULT_RESET_MAX_AGE_SECS)
            .map_err(|e| {
                let code = match e {
                    TokenError::Invalid => "reset_token_invalid",
                    TokenError::Expired => "reset_token_expired",
                };
                AppError::auth(code, "The reset link is invalid or has expired")
            })?;
        let Some(user) = self.store.user_by_email(&email).await? else {
            return Err(AppError::not_found("email_unknown", "Email address not found"));
        };
        if new != confirm {
            return Err(AppError::validation("password_mismatch", "Passwords must match"));
        }
        check_password_policy(new)?;
        let phc = hash_password(new)?;
        self.store.update_password(user.id, &phc).await?;
        info!(user = %user.username, "password reset completed");
        Ok(())
    }

    async fn auth_user(&self, row: UserRow) -> AppResult<AuthUser> {
        let roles = self.store.roles_for_user(row.id).await?;
        Ok(AuthUser {
            id: row.id,
            email: row.email,
            username: row.username,
            external_id: row.external_id,
            roles,
        })
    }
}

/// First two characters of the local part stay visible, the rest become
/// asterisks: `alice@example.com` -> `al***@example.com`.
fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let visible: String = local.chars().take(2).collect();
            let hidden = local.chars().count().saturating_sub(2);
            format!("{visible}{}@{domain}", "*".repeat(hidden))
        }
        None => email.to_string(),
    }
}
