//! Push registration retry loop.
//!
//! `reduce` is the whole state machine; `RegistrationOrchestrator` only feeds
//! it events and sleeps until the next attempt is due.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::services::{
    metrics::Metrics,
    session::{Identity, Session},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    NotAttempted,
    Attempting { retries: u32 },
    Registered,
    RetryPending { retries: u32, next_attempt_at: Instant },
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationEvent {
    /// A different user/token pair (or none) is now active.
    IdentityChanged,
    /// The registrar already holds a registration for this identity.
    AlreadyRegistered,
    AttemptStarted,
    Succeeded,
    Failed { now: Instant },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Minimum spacing between two attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(5),
        }
    }
}

pub fn reduce(
    state: RegistrationState,
    event: RegistrationEvent,
    policy: &RetryPolicy,
) -> RegistrationState {
    use RegistrationEvent as E;
    use RegistrationState as S;

    match (state, event) {
        (_, E::IdentityChanged) => S::NotAttempted,
        (_, E::AlreadyRegistered) => S::Registered,
        (S::NotAttempted, E::AttemptStarted) => S::Attempting { retries: 0 },
        (S::RetryPending { retries, .. }, E::AttemptStarted) => S::Attempting { retries },
        (S::Attempting { .. }, E::Succeeded) => S::Registered,
        (S::Attempting { retries }, E::Failed { now }) if retries < policy.max_retries => {
            S::RetryPending {
                retries: retries + 1,
                next_attempt_at: now + policy.delay,
            }
        }
        (S::Attempting { .. }, E::Failed { .. }) => S::Exhausted,
        (state, _) => state,
    }
}

/// The side that actually talks to the backend.
#[async_trait]
pub trait PushRegistrar: Send + Sync {
    async fn is_registered(&self, auth_token: &str) -> bool;
    /// One full registration attempt. True on success.
    async fn register(&self, auth_token: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Attempted { succeeded: bool },
    /// Nothing to do before this instant.
    WaitUntil(Instant),
    /// Nothing to do until the identity changes.
    Idle,
}

pub struct RegistrationOrchestrator {
    registrar: Arc<dyn PushRegistrar>,
    policy: RetryPolicy,
    state: RegistrationState,
    identity: Option<Identity>,
    last_attempt_at: Option<Instant>,
    metrics: Arc<Metrics>,
}

impl RegistrationOrchestrator {
    pub fn new(registrar: Arc<dyn PushRegistrar>, policy: RetryPolicy, metrics: Arc<Metrics>) -> Self {
        Self {
            registrar,
            policy,
            state: RegistrationState::NotAttempted,
            identity: None,
            last_attempt_at: None,
            metrics,
        }
    }

    pub fn state(&self) -> RegistrationState {
        self.state
    }

    fn apply(&mut self, event: RegistrationEvent) {
        let next = reduce(self.state, event, &self.policy);
        if next != self.state {
            debug!("Push registration: {:?} -> {:?}", self.state, next);
        }
        self.state = next;
    }

    /// Advance the state machine for the current identity, making at most
    /// one attempt.
    pub async fn step(&mut self, identity: Option<&Identity>) -> Step {
        if self.identity.as_ref() != identity {
            self.identity = identity.cloned();
            self.apply(RegistrationEvent::IdentityChanged);
        }
        let Some(identity) = identity else {
            return Step::Idle;
        };

        let now = Instant::now();
        match self.state {
            RegistrationState::Registered | RegistrationState::Exhausted => return Step::Idle,
            RegistrationState::RetryPending { next_attempt_at, .. } if now < next_attempt_at => {
                return Step::WaitUntil(next_attempt_at);
            }
            RegistrationState::NotAttempted | RegistrationState::RetryPending { .. } => {}
            // Attempts complete inside `step`, so this is never observed here.
            RegistrationState::Attempting { .. } => return Step::Idle,
        }

        // The spacing applies across identities as well.
        if let Some(last) = self.last_attempt_at {
            let due = last + self.policy.delay;
            if now < due {
                return Step::WaitUntil(due);
            }
        }

        if self.registrar.is_registered(&identity.token).await {
            self.apply(RegistrationEvent::AlreadyRegistered);
            return Step::Idle;
        }

        self.apply(RegistrationEvent::AttemptStarted);
        self.last_attempt_at = Some(Instant::now());
        let succeeded = self.registrar.register(&identity.token).await;

        if succeeded {
            info!("Push notifications registered for user {}", identity.user_id);
            self.metrics.push_registration("success");
            self.apply(RegistrationEvent::Succeeded);
        } else {
            self.metrics.push_registration("failure");
            self.apply(RegistrationEvent::Failed { now: Instant::now() });
            if self.state == RegistrationState::Exhausted {
                warn!(
                    "Push registration for user {} failed {} times, giving up",
                    identity.user_id,
                    self.policy.max_retries + 1
                );
            }
        }
        Step::Attempted { succeeded }
    }

    /// Drive `step` from session changes until the session sender is dropped.
    pub async fn run(mut self, mut session: watch::Receiver<Session>) {
        loop {
            let identity = session.borrow_and_update().identity();
            match self.step(identity.as_ref()).await {
                Step::Attempted { .. } => continue,
                Step::WaitUntil(at) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(at) => {}
                        changed = session.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
                Step::Idle => {
                    if session.changed().await.is_err() {
                        break;
                    }
                }
            }
        }
        debug!("Push registration loop stopped");
    }
}
