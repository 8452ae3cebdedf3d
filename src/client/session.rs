use std::sync::Arc;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, info, warn};

use super::token_store::{SessionTokens, TokenStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn,
    Refreshed,
    /// The session could not be renewed; the caller is signed out.
    Expired,
    SignedOut,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("session expired")]
    Expired,
    #[error("sign-in rejected with status {0}")]
    SignInRejected(StatusCode),
    #[error("token storage failed: {0:#}")]
    Store(anyhow::Error),
}

#[derive(Serialize)]
struct LoginBody<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshBody<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Authenticated HTTP client for the memo API.
///
/// Every request carries the current access token. A `401` triggers at most
/// one refresh and one retry; concurrent callers that are rejected with the
/// same token share a single refresh call.
pub struct SessionGuard {
    client: Client,
    base_url: String,
    store: Arc<dyn TokenStore>,
    tokens: watch::Sender<Option<SessionTokens>>,
    events: broadcast::Sender<SessionEvent>,
    refresh_gate: Mutex<()>,
}

impl SessionGuard {
    /// Builds a guard seeded from whatever `store` already holds.
    pub async fn restore(
        client: Client,
        base_url: impl Into<String>,
        store: Arc<dyn TokenStore>,
    ) -> Result<Self, SessionError> {
        let initial = store.load().await.map_err(SessionError::Store)?;
        let (tokens, _) = watch::channel(initial);
        let (events, _) = broadcast::channel(16);
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            store,
            tokens,
            events,
            refresh_gate: Mutex::new(()),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn tokens(&self) -> Option<SessionTokens> {
        self.tokens.borrow().clone()
    }

    pub fn watch_tokens(&self) -> watch::Receiver<Option<SessionTokens>> {
        self.tokens.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn sign_in(&self, username: &str, password: &str) -> Result<(), SessionError> {
        let response = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&LoginBody { username, password })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SessionError::SignInRejected(response.status()));
        }
        let issued: TokenResponse = response.json().await?;
        self.install(SessionTokens {
            access_token: issued.access_token,
            refresh_token: issued.refresh_token,
        })
        .await?;
        self.emit(SessionEvent::SignedIn);
        Ok(())
    }

    /// Revokes the refresh token server-side when possible, then forgets the
    /// local session regardless of the outcome.
    pub async fn sign_out(&self) -> Result<(), SessionError> {
        if let Some(tokens) = self.tokens() {
            let mut request = self
                .client
                .post(self.url("/api/auth/logout"))
                .bearer_auth(&tokens.access_token);
            if let Some(refresh_token) = tokens.refresh_token.as_deref() {
                request = request.json(&RefreshBody { refresh_token });
            }
            if let Err(err) = request.send().await {
                warn!(error = %err, "logout request failed; clearing local session anyway");
            }
        }
        self.forget().await?;
        self.emit(SessionEvent::SignedOut);
        Ok(())
    }

    /// Sends the request produced by `build`, refreshing and retrying once on
    /// `401`. `build` may run twice, so it must produce a fresh request each
    /// time.
    pub async fn execute<F>(&self, build: F) -> Result<Response, SessionError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let sent_with = self.tokens().map(|tokens| tokens.access_token);
        let response = self.send(&build, sent_with.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        match self.renew_after(sent_with.as_deref()).await? {
            Some(access_token) => {
                debug!("retrying request with renewed access token");
                Ok(self.send(&build, Some(&access_token)).await?)
            }
            None => Err(SessionError::Expired),
        }
    }

    async fn send<F>(&self, build: &F, access_token: Option<&str>) -> Result<Response, SessionError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut request = build(&self.client);
        if let Some(token) = access_token {
            request = request.bearer_auth(token);
        }
        Ok(request.send().await?)
    }

    /// Returns a usable access token after `rejected` got a `401`, or `None`
    /// once the session has been expired.
    async fn renew_after(&self, rejected: Option<&str>) -> Result<Option<String>, SessionError> {
        let _gate = self.refresh_gate.lock().await;

        let Some(current) = self.tokens() else {
            return Ok(None);
        };
        if rejected != Some(current.access_token.as_str()) {
            // Another caller renewed the session while this one waited.
            return Ok(Some(current.access_token));
        }
        let Some(refresh_token) = current.refresh_token.clone() else {
            self.expire("no refresh token").await;
            return Ok(None);
        };

        match self.request_refresh(&refresh_token).await {
            Ok(issued) => {
                let renewed = SessionTokens {
                    access_token: issued.access_token,
                    refresh_token: issued.refresh_token.or(Some(refresh_token)),
                };
                let access_token = renewed.access_token.clone();
                if let Err(err) = self.install(renewed.clone()).await {
                    // The old refresh token is spent, so keep the new pair in memory.
                    warn!(error = %err, "renewed tokens were not persisted");
                    self.tokens.send_replace(Some(renewed));
                }
                self.emit(SessionEvent::Refreshed);
                info!("session refreshed");
                Ok(Some(access_token))
            }
            Err(reason) => {
                self.expire(&reason).await;
                Ok(None)
            }
        }
    }

    async fn request_refresh(&self, refresh_token: &str) -> Result<TokenResponse, String> {
        let response = self
            .client
            .post(self.url("/api/auth/refresh"))
            .json(&RefreshBody { refresh_token })
            .send()
            .await
            .map_err(|err| format!("refresh request failed: {err}"))?;
        if !response.status().is_success() {
            return Err(format!("refresh rejected with status {}", response.status()));
        }
        response
            .json::<TokenResponse>()
            .await
            .map_err(|err| format!("refresh response unreadable: {err}"))
    }

    /// Persists `tokens`, then publishes them. Memory is untouched when the
    /// store rejects them.
    async fn install(&self, tokens: SessionTokens) -> Result<(), SessionError> {
        self.store.save(&tokens).await.map_err(SessionError::Store)?;
        self.tokens.send_replace(Some(tokens));
        Ok(())
    }

    async fn forget(&self) -> Result<(), SessionError> {
        self.tokens.send_replace(None);
        self.store.clear().await.map_err(SessionError::Store)
    }

    async fn expire(&self, reason: &str) {
        warn!(reason, "session expired; signing out");
        if let Err(err) = self.forget().await {
            warn!(error = %err, "failed to clear stored tokens");
        }
        self.emit(SessionEvent::Expired);
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
