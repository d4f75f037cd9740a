use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::Parser;
use oidc_user::{
    observe, HttpIdentityClient, IdentityClientRegistry, InMemoryIdentityClientRegistry,
    UserSnapshot, UserSubscription,
};
use shared::domain::{LoadingStatus, UserInfo};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, Settings};

#[derive(Parser, Debug)]
#[command(about = "Loads the OIDC user info for one configuration and prints it")]
struct Args {
    #[arg(long, default_value = "oidc_user.toml")]
    config: PathBuf,
    #[arg(long)]
    configuration_name: Option<String>,
    #[arg(long)]
    userinfo_endpoint: Option<String>,
    #[arg(long)]
    access_token: Option<String>,
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Issue one forced refresh after the first load succeeded.
    #[arg(long)]
    refresh: bool,
}

impl Args {
    fn apply(&self, settings: &mut Settings) {
        if let Some(v) = &self.configuration_name {
            settings.configuration_name = v.clone();
        }
        if let Some(v) = &self.userinfo_endpoint {
            settings.userinfo_endpoint = Some(v.clone());
        }
        if let Some(v) = &self.access_token {
            settings.access_token = Some(v.clone());
        }
        if let Some(v) = self.timeout_secs {
            settings.timeout_secs = v;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mut settings = load_settings(&args.config)?;
    args.apply(&mut settings);

    let client = Arc::new(HttpIdentityClient::<UserInfo>::new(
        settings.userinfo_endpoint()?,
    ));
    client.set_access_token(settings.access_token());
    info!(
        configuration = %settings.configuration_name,
        endpoint = %client.userinfo_endpoint(),
        "registered userinfo client"
    );

    let registry = Arc::new(InMemoryIdentityClientRegistry::<UserInfo>::new());
    registry.register(settings.configuration_name.clone(), client);
    let registry: Arc<dyn IdentityClientRegistry<UserInfo>> = registry;

    let mut subscription = observe(registry, Some(&settings.configuration_name)).await;
    let timeout = Duration::from_secs(settings.timeout_secs);

    let mut snapshot = wait_until_settled(&mut subscription, timeout).await?;
    if args.refresh && snapshot.status == LoadingStatus::Loaded && subscription.refresh().await {
        snapshot = wait_until_settled(&mut subscription, timeout).await?;
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "configuration": settings.configuration_name,
            "snapshot": &snapshot,
        }))?
    );

    if snapshot.status != LoadingStatus::Loaded {
        bail!("user not loaded: {}", snapshot.status);
    }
    Ok(())
}

/// Follows transitions until the controller leaves `Loading`.
async fn wait_until_settled(
    subscription: &mut UserSubscription<UserInfo>,
    timeout: Duration,
) -> Result<UserSnapshot<UserInfo>> {
    let mut snapshot = subscription.snapshot().await;
    tokio::time::timeout(timeout, async {
        while snapshot.status == LoadingStatus::Loading {
            let Some(next) = subscription.changed().await else {
                break;
            };
            info!(
                configuration = %subscription.configuration_name(),
                from = %snapshot.status,
                to = %next.status,
                "user loading status changed"
            );
            snapshot = next;
        }
    })
    .await
    .context("timed out waiting for user info")?;

    if let Some(user) = snapshot.user.as_ref() {
        info!(sub = %user.sub, name = user.display_name(), "current user");
    }
    Ok(snapshot)
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
