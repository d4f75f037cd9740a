use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

mod controller;
pub mod http_client;
pub mod machine;
mod registry;

pub use controller::{observe, RefreshHandle, UserLoadingController, UserSubscription, UserView};
pub use http_client::HttpIdentityClient;
pub use machine::{
    FetchRequest, SessionState, UserLoadingEvent, UserLoadingMachine, UserRecord, UserSnapshot,
};
pub use registry::InMemoryIdentityClientRegistry;
pub use shared::{
    domain::{ConfigurationName, LoadingStatus, UserInfo, DEFAULT_CONFIGURATION_NAME},
    error::{LoadFailure, UserInfoError},
};

/// Implementations own the tokens; the controller never mutates them.
#[async_trait]
pub trait IdentityClient<T>: Send + Sync {
    fn has_active_session(&self) -> bool;

    /// With `force_live` the answer must not come from a cache.
    async fn fetch_user_info(&self, force_live: bool) -> Result<T>;
}

pub trait IdentityClientRegistry<T>: Send + Sync {
    fn resolve(&self, configuration_name: &str) -> Option<Arc<dyn IdentityClient<T>>>;
}

pub struct MissingIdentityClientRegistry;

impl<T> IdentityClientRegistry<T> for MissingIdentityClientRegistry {
    fn resolve(&self, _configuration_name: &str) -> Option<Arc<dyn IdentityClient<T>>> {
        None
    }
}
