//! Synchronous user-loading state machine.
//!
//! The machine performs no I/O. It answers "should a fetch be issued now?"
//! with a [`FetchRequest`] and expects the caller to report the outcome back
//! through [`UserLoadingMachine::complete`].

use serde::Serialize;
use shared::{domain::LoadingStatus, error::LoadFailure};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NoClient,
    SignedOut,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRequest {
    pub force_live: bool,
}

#[derive(Debug, Clone)]
pub enum UserLoadingEvent<T> {
    SessionBecameActive,
    RefreshRequested,
    FetchSucceeded(T),
    FetchFailed(LoadFailure),
}

#[derive(Debug, Clone, PartialEq)]
pub enum UserRecord<T> {
    Unauthenticated,
    Loading {
        previous: Option<T>,
    },
    Loaded {
        user: T,
    },
    LoadingError {
        previous: Option<T>,
        failure: LoadFailure,
    },
}

impl<T> UserRecord<T> {
    pub fn status(&self) -> LoadingStatus {
        match self {
            Self::Unauthenticated => LoadingStatus::Unauthenticated,
            Self::Loading { .. } => LoadingStatus::Loading,
            Self::Loaded { .. } => LoadingStatus::Loaded,
            Self::LoadingError { .. } => LoadingStatus::LoadingError,
        }
    }

    pub fn user(&self) -> Option<&T> {
        match self {
            Self::Unauthenticated => None,
            Self::Loading { previous } | Self::LoadingError { previous, .. } => previous.as_ref(),
            Self::Loaded { user } => Some(user),
        }
    }

    pub fn failure(&self) -> Option<&LoadFailure> {
        match self {
            Self::LoadingError { failure, .. } => Some(failure),
            _ => None,
        }
    }

    fn into_user(self) -> Option<T> {
        match self {
            Self::Unauthenticated => None,
            Self::Loading { previous } | Self::LoadingError { previous, .. } => previous,
            Self::Loaded { user } => Some(user),
        }
    }
}

impl<T> Default for UserRecord<T> {
    fn default() -> Self {
        Self::Unauthenticated
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSnapshot<T> {
    pub user: Option<T>,
    pub status: LoadingStatus,
    pub failure: Option<LoadFailure>,
}

#[derive(Debug)]
pub struct UserLoadingMachine<T> {
    record: UserRecord<T>,
    refresh_requested: bool,
    fetch_in_flight: bool,
}

impl<T> Default for UserLoadingMachine<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> UserLoadingMachine<T> {
    pub fn new() -> Self {
        Self {
            record: UserRecord::Unauthenticated,
            refresh_requested: false,
            fetch_in_flight: false,
        }
    }

    pub fn record(&self) -> &UserRecord<T> {
        &self.record
    }

    pub fn status(&self) -> LoadingStatus {
        self.record.status()
    }

    pub fn user(&self) -> Option<&T> {
        self.record.user()
    }

    pub fn is_refresh_requested(&self) -> bool {
        self.refresh_requested
    }

    pub fn is_fetch_in_flight(&self) -> bool {
        self.fetch_in_flight
    }

    /// Never issues a second fetch while one is outstanding.
    pub fn evaluate(&mut self, session: SessionState) -> Option<FetchRequest> {
        if session != SessionState::Active || self.fetch_in_flight {
            return None;
        }

        let is_first_load = !self.refresh_requested && self.record.user().is_none();
        if !(is_first_load || self.refresh_requested) {
            return None;
        }

        let previous = std::mem::take(&mut self.record).into_user();
        self.record = UserRecord::Loading { previous };
        self.fetch_in_flight = true;
        Some(FetchRequest {
            force_live: self.refresh_requested,
        })
    }

    // Only accepted from Loaded with no refresh already pending.
    pub fn request_refresh(&mut self) -> bool {
        if self.refresh_requested || self.status() != LoadingStatus::Loaded {
            return false;
        }
        self.refresh_requested = true;
        true
    }

    pub fn complete(&mut self, outcome: Result<T, LoadFailure>) {
        self.record = match outcome {
            Ok(user) => UserRecord::Loaded { user },
            Err(failure) => UserRecord::LoadingError {
                previous: std::mem::take(&mut self.record).into_user(),
                failure,
            },
        };
        self.refresh_requested = false;
        self.fetch_in_flight = false;
    }

    pub fn handle(
        &mut self,
        event: UserLoadingEvent<T>,
        session: SessionState,
    ) -> Option<FetchRequest> {
        match event {
            UserLoadingEvent::SessionBecameActive => self.evaluate(session),
            UserLoadingEvent::RefreshRequested => {
                if self.request_refresh() {
                    self.evaluate(session)
                } else {
                    None
                }
            }
            UserLoadingEvent::FetchSucceeded(user) => {
                self.complete(Ok(user));
                None
            }
            UserLoadingEvent::FetchFailed(failure) => {
                self.complete(Err(failure));
                None
            }
        }
    }
}

impl<T: Clone> UserLoadingMachine<T> {
    pub fn snapshot(&self) -> UserSnapshot<T> {
        UserSnapshot {
            user: self.record.user().cloned(),
            status: self.record.status(),
            failure: self.record.failure().cloned(),
        }
    }
}

#[cfg(test)]
#[path = "tests/machine_tests.rs"]
mod tests;
