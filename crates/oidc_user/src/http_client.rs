//! User info over HTTP for sessions whose tokens were obtained elsewhere.

use std::{marker::PhantomData, sync::RwLock};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header::ACCEPT, Client};
use serde::de::DeserializeOwned;
use shared::{domain::UserInfo, error::UserInfoError};
use tracing::{debug, warn};
use url::Url;

use crate::IdentityClient;

struct CachedUserInfo<T> {
    access_token: String,
    user: T,
}

#[derive(Default)]
struct SessionToken {
    access_token: Option<String>,
    /// Bumped on every token change.
    generation: u64,
}

/// Calls an OpenID Connect userinfo endpoint with the bearer token handed to
/// [`HttpIdentityClient::set_access_token`]. The last answer is cached per
/// token; answers to requests that raced a token change are not cached.
pub struct HttpIdentityClient<T = UserInfo> {
    http: Client,
    userinfo_endpoint: Url,
    session: RwLock<SessionToken>,
    cached: RwLock<Option<CachedUserInfo<T>>>,
    _user: PhantomData<fn() -> T>,
}

impl<T> HttpIdentityClient<T>
where
    T: DeserializeOwned + Clone,
{
    pub fn new(userinfo_endpoint: Url) -> Self {
        Self::with_http_client(Client::new(), userinfo_endpoint)
    }

    pub fn with_http_client(http: Client, userinfo_endpoint: Url) -> Self {
        Self {
            http,
            userinfo_endpoint,
            session: RwLock::new(SessionToken::default()),
            cached: RwLock::new(None),
            _user: PhantomData,
        }
    }

    pub fn userinfo_endpoint(&self) -> &Url {
        &self.userinfo_endpoint
    }

    /// `None` signs the session out and drops the cached user info.
    pub fn set_access_token(&self, access_token: Option<String>) {
        let signed_out = access_token.is_none();
        match self.session.write() {
            Ok(mut guard) => {
                guard.access_token = access_token;
                guard.generation = guard.generation.wrapping_add(1);
            }
            Err(_) => {
                warn!("access token lock poisoned; token not updated");
                return;
            }
        }
        if signed_out {
            if let Ok(mut cached) = self.cached.write() {
                *cached = None;
            }
        }
    }

    fn access_token(&self) -> Option<(String, u64)> {
        let guard = self.session.read().ok()?;
        let token = guard
            .access_token
            .clone()
            .map(|access_token| (access_token, guard.generation));
        token
    }

    fn generation(&self) -> Option<u64> {
        self.session.read().ok().map(|guard| guard.generation)
    }

    fn cached_for(&self, access_token: &str) -> Option<T> {
        let guard = self.cached.read().ok()?;
        let user = guard
            .as_ref()
            .filter(|cached| cached.access_token == access_token)
            .map(|cached| cached.user.clone());
        user
    }

    fn store(&self, access_token: String, generation: u64, user: T) {
        let Ok(mut guard) = self.cached.write() else {
            return;
        };
        // Checked under the cache lock so a concurrent sign-out cannot be undone.
        if self.generation() != Some(generation) {
            debug!(endpoint = %self.userinfo_endpoint, "token changed during fetch; not caching");
            return;
        }
        *guard = Some(CachedUserInfo { access_token, user });
    }

    async fn request_user_info(&self, access_token: &str) -> Result<T> {
        let response = self
            .http
            .get(self.userinfo_endpoint.clone())
            .bearer_auth(access_token)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| UserInfoError::Request(err.to_string()))
            .with_context(|| format!("GET {}", self.userinfo_endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let err = UserInfoError::Status {
                status: status.as_u16(),
            };
            if err.is_unauthorized() {
                warn!(
                    endpoint = %self.userinfo_endpoint,
                    status = status.as_u16(),
                    "access token rejected"
                );
            }
            return Err(err.into());
        }

        let user = response
            .json::<T>()
            .await
            .map_err(|err| UserInfoError::Decode(err.to_string()))?;
        Ok(user)
    }
}

#[async_trait]
impl<T> IdentityClient<T> for HttpIdentityClient<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn has_active_session(&self) -> bool {
        self.access_token().is_some()
    }

    async fn fetch_user_info(&self, force_live: bool) -> Result<T> {
        let (access_token, generation) =
            self.access_token().ok_or(UserInfoError::NoActiveSession)?;

        if !force_live {
            if let Some(user) = self.cached_for(&access_token) {
                debug!(endpoint = %self.userinfo_endpoint, "serving cached user info");
                return Ok(user);
            }
        }

        let user = self.request_user_info(&access_token).await?;
        self.store(access_token, generation, user.clone());
        Ok(user)
    }
}

#[cfg(test)]
#[path = "tests/http_client_tests.rs"]
mod tests;
