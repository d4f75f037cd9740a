use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use tracing::{debug, warn};

use crate::{IdentityClient, IdentityClientRegistry};

pub struct InMemoryIdentityClientRegistry<T> {
    clients: RwLock<HashMap<String, Arc<dyn IdentityClient<T>>>>,
}

impl<T> Default for InMemoryIdentityClientRegistry<T> {
    fn default() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> InMemoryIdentityClientRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        configuration_name: impl Into<String>,
        client: Arc<dyn IdentityClient<T>>,
    ) -> Option<Arc<dyn IdentityClient<T>>> {
        let configuration_name = configuration_name.into();
        match self.clients.write() {
            Ok(mut guard) => {
                debug!(configuration = %configuration_name, "registered identity client");
                guard.insert(configuration_name, client)
            }
            Err(_) => {
                warn!(configuration = %configuration_name, "identity client registry lock poisoned");
                None
            }
        }
    }

    pub fn unregister(&self, configuration_name: &str) -> Option<Arc<dyn IdentityClient<T>>> {
        self.clients
            .write()
            .ok()
            .and_then(|mut guard| guard.remove(configuration_name))
    }

    pub fn configuration_names(&self) -> Vec<String> {
        let mut names = self
            .clients
            .read()
            .map(|guard| guard.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        names.sort();
        names
    }
}

impl<T> IdentityClientRegistry<T> for InMemoryIdentityClientRegistry<T> {
    fn resolve(&self, configuration_name: &str) -> Option<Arc<dyn IdentityClient<T>>> {
        self.clients
            .read()
            .ok()
            .and_then(|guard| guard.get(configuration_name).cloned())
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
