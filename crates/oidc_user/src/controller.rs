use std::sync::{Arc, Weak};

use anyhow::Result;
use shared::{
    domain::{ConfigurationName, LoadingStatus},
    error::LoadFailure,
};
use tokio::sync::{
    broadcast::{self, error::RecvError},
    Mutex,
};
use tracing::{debug, info, warn};

use crate::{
    machine::{FetchRequest, SessionState, UserLoadingEvent, UserLoadingMachine, UserSnapshot},
    IdentityClient, IdentityClientRegistry,
};

const SNAPSHOT_CHANNEL_CAPACITY: usize = 64;

pub struct UserLoadingController<T> {
    configuration_name: ConfigurationName,
    registry: Arc<dyn IdentityClientRegistry<T>>,
    inner: Mutex<ControllerState<T>>,
}

struct ControllerState<T> {
    machine: UserLoadingMachine<T>,
    // None once closed.
    events: Option<broadcast::Sender<UserSnapshot<T>>>,
}

impl<T> ControllerState<T>
where
    T: Clone,
{
    fn publish(&self) {
        if let Some(events) = &self.events {
            let _ = events.send(self.machine.snapshot());
        }
    }
}

impl<T> UserLoadingController<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(
        registry: Arc<dyn IdentityClientRegistry<T>>,
        configuration_name: ConfigurationName,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        Arc::new(Self {
            configuration_name,
            registry,
            inner: Mutex::new(ControllerState {
                machine: UserLoadingMachine::new(),
                events: Some(events),
            }),
        })
    }

    pub fn configuration_name(&self) -> &ConfigurationName {
        &self.configuration_name
    }

    pub async fn snapshot(&self) -> UserSnapshot<T> {
        self.inner.lock().await.machine.snapshot()
    }

    pub async fn subscribe_events(&self) -> broadcast::Receiver<UserSnapshot<T>> {
        match &self.inner.lock().await.events {
            Some(events) => events.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    pub async fn session_changed(self: &Arc<Self>) {
        self.dispatch(UserLoadingEvent::SessionBecameActive).await;
    }

    pub async fn refresh(self: &Arc<Self>) -> bool {
        self.dispatch(UserLoadingEvent::RefreshRequested).await
    }

    pub async fn close(&self) {
        let mut guard = self.inner.lock().await;
        if guard.events.take().is_some() {
            debug!(configuration = %self.configuration_name, "user loading controller closed");
        }
    }

    fn resolve_session(&self) -> (SessionState, Option<Arc<dyn IdentityClient<T>>>) {
        match self.registry.resolve(self.configuration_name.as_str()) {
            None => (SessionState::NoClient, None),
            Some(client) if client.has_active_session() => (SessionState::Active, Some(client)),
            Some(client) => (SessionState::SignedOut, Some(client)),
        }
    }

    async fn dispatch(self: &Arc<Self>, event: UserLoadingEvent<T>) -> bool {
        let is_refresh = matches!(event, UserLoadingEvent::RefreshRequested);
        let (session, client) = self.resolve_session();

        let (accepted, fetch) = {
            let mut guard = self.inner.lock().await;
            if guard.events.is_none() {
                return false;
            }

            let was_refresh_requested = guard.machine.is_refresh_requested();
            let status_before = guard.machine.status();
            let fetch = guard.machine.handle(event, session);
            let accepted =
                is_refresh && !was_refresh_requested && guard.machine.is_refresh_requested();
            if guard.machine.status() != status_before {
                guard.publish();
            }
            (accepted, fetch)
        };

        if is_refresh && !accepted {
            debug!(
                configuration = %self.configuration_name,
                "refresh refused; user not loaded or refresh already pending"
            );
        }

        if let (Some(request), Some(client)) = (fetch, client) {
            self.spawn_fetch(client, request);
        }
        accepted
    }

    fn spawn_fetch(self: &Arc<Self>, client: Arc<dyn IdentityClient<T>>, request: FetchRequest) {
        info!(
            configuration = %self.configuration_name,
            force_live = request.force_live,
            "fetching user info"
        );
        // A fetch must not keep a torn-down controller alive.
        let controller = Arc::downgrade(self);
        tokio::spawn(async move {
            let outcome = client.fetch_user_info(request.force_live).await;
            match controller.upgrade() {
                Some(controller) => controller.finish_fetch(outcome).await,
                None => debug!("user info fetch finished after controller teardown"),
            }
        });
    }

    async fn finish_fetch(&self, outcome: Result<T>) {
        let outcome = outcome.map_err(|err| {
            let message = format!("{err:#}");
            warn!(
                configuration = %self.configuration_name,
                error = %message,
                "user info fetch failed"
            );
            LoadFailure::new(message)
        });

        let mut guard = self.inner.lock().await;
        if guard.events.is_none() {
            debug!(
                configuration = %self.configuration_name,
                "dropping user info fetch result for closed controller"
            );
            return;
        }
        guard.machine.complete(outcome);
        guard.publish();
    }
}

pub async fn observe<T>(
    registry: Arc<dyn IdentityClientRegistry<T>>,
    configuration_name: Option<&str>,
) -> UserSubscription<T>
where
    T: Clone + Send + Sync + 'static,
{
    let controller =
        UserLoadingController::new(registry, ConfigurationName::or_default(configuration_name));
    let events = controller.subscribe_events().await;
    controller.session_changed().await;
    UserSubscription { controller, events }
}

pub struct UserSubscription<T> {
    controller: Arc<UserLoadingController<T>>,
    events: broadcast::Receiver<UserSnapshot<T>>,
}

impl<T> UserSubscription<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub async fn current(&self) -> UserView<T> {
        let snapshot = self.controller.snapshot().await;
        UserView {
            user: snapshot.user,
            status: snapshot.status,
            refresh: self.refresh_handle(),
        }
    }

    pub async fn snapshot(&self) -> UserSnapshot<T> {
        self.controller.snapshot().await
    }

    pub async fn changed(&mut self) -> Option<UserSnapshot<T>> {
        match self.events.recv().await {
            Ok(snapshot) => Some(snapshot),
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, "user snapshot receiver lagged; returning current state");
                Some(self.controller.snapshot().await)
            }
            Err(RecvError::Closed) => None,
        }
    }

    pub async fn session_changed(&self) {
        self.controller.session_changed().await;
    }

    pub async fn refresh(&self) -> bool {
        self.controller.refresh().await
    }

    pub fn refresh_handle(&self) -> RefreshHandle<T> {
        RefreshHandle {
            controller: Arc::downgrade(&self.controller),
        }
    }

    pub fn configuration_name(&self) -> &ConfigurationName {
        self.controller.configuration_name()
    }

    pub async fn close(&self) {
        self.controller.close().await;
    }
}

pub struct UserView<T> {
    pub user: Option<T>,
    pub status: LoadingStatus,
    pub refresh: RefreshHandle<T>,
}

pub struct RefreshHandle<T> {
    controller: Weak<UserLoadingController<T>>,
}

impl<T> Clone for RefreshHandle<T> {
    fn clone(&self) -> Self {
        Self {
            controller: Weak::clone(&self.controller),
        }
    }
}

impl<T> RefreshHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn refresh(&self) {
        let controller = Weak::clone(&self.controller);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Some(controller) = controller.upgrade() {
                        controller.refresh().await;
                    }
                });
            }
            Err(_) => warn!("refresh requested outside of a tokio runtime; ignored"),
        }
    }

    pub async fn request(&self) -> bool {
        match self.controller.upgrade() {
            Some(controller) => controller.refresh().await,
            None => false,
        }
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
