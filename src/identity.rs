use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum IdentityError {
    /// The provider refused the sign-up (weak password, address already known to it, ...).
    #[error("identity provider rejected the registration (status {0})")]
    Rejected(u16),

    #[error("identity provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

// 1. IdentityProvider Contract
/// IdentityProvider
///
/// The external collaborator that owns credentials. Registration hands it an email and a
/// password and receives the canonical user id; this service never stores the password.
/// Swappable like any other `AppState` dependency: the HTTP client in production, the
/// local provider in development and tests.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Uuid, IdentityError>;
}

// 2. The Real Implementation
/// HttpIdentityProvider
///
/// Talks to a Supabase-compatible auth endpoint (`POST {base}/auth/v1/signup`).
#[derive(Clone)]
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpIdentityProvider {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

/// Minimal view of the provider's sign-up response: only the new user's id matters.
#[derive(Deserialize)]
struct SignUpResponse {
    id: Uuid,
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Uuid, IdentityError> {
        let response = self
            .client
            .post(format!("{}/auth/v1/signup", self.base_url))
            .header("apikey", &self.api_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IdentityError::Rejected(response.status().as_u16()));
        }

        let created = response.json::<SignUpResponse>().await?;
        Ok(created.id)
    }
}

// 3. The Local Implementation
/// LocalIdentityProvider
///
/// Accepts every sign-up and mints a fresh id. Used when no provider is configured in
/// `Env::Local`; authentication then goes through the `x-user-id` bypass.
#[derive(Clone, Default)]
pub struct LocalIdentityProvider {
    /// When true, every sign-up is rejected.
    pub should_fail: bool,
}

impl LocalIdentityProvider {
    pub fn new() -> Self {
        Self { should_fail: false }
    }

    pub fn new_failing() -> Self {
        Self { should_fail: true }
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn sign_up(&self, _email: &str, _password: &str) -> Result<Uuid, IdentityError> {
        if self.should_fail {
            return Err(IdentityError::Rejected(400));
        }
        Ok(Uuid::new_v4())
    }
}

/// IdentityState
///
/// The concrete type used to share the identity provider across the application state.
pub type IdentityState = Arc<dyn IdentityProvider>;
