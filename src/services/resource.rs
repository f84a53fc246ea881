//! Plumbing shared by the gallery, calendar and schools resources.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::services::session::Session;

/// Orders fetches against mutations. A fetch response is applied only if no
/// mutation committed while it was in flight; `loading` is cleared only by the
/// most recently started fetch.
#[derive(Debug, Default)]
pub struct VersionGate {
    mutations: AtomicU64,
    fetches: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    seq: u64,
    mutations: u64,
}

impl VersionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_fetch(&self) -> FetchTicket {
        FetchTicket {
            seq: self.fetches.fetch_add(1, Ordering::SeqCst) + 1,
            mutations: self.mutations.load(Ordering::SeqCst),
        }
    }

    pub fn commit_mutation(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_latest_fetch(&self, ticket: FetchTicket) -> bool {
        self.fetches.load(Ordering::SeqCst) == ticket.seq
    }

    /// Latest fetch and no mutation since it started.
    pub fn is_current(&self, ticket: FetchTicket) -> bool {
        self.is_latest_fetch(ticket) && self.mutations.load(Ordering::SeqCst) == ticket.mutations
    }
}

/// Raises a boolean in-flight flag for the lifetime of the guard. The flag is
/// lowered on drop, so early returns and `?` can never leave it stuck.
pub struct InFlight<'a, S> {
    state: &'a watch::Sender<S>,
    flag: fn(&mut S) -> &mut bool,
}

impl<'a, S> InFlight<'a, S> {
    pub fn raise(state: &'a watch::Sender<S>, flag: fn(&mut S) -> &mut bool) -> Self {
        state.send_modify(|s| *flag(s) = true);
        Self { state, flag }
    }
}

impl<S> Drop for InFlight<'_, S> {
    fn drop(&mut self) {
        let flag = self.flag;
        self.state.send_modify(|s| *flag(s) = false);
    }
}

pub trait Keyed {
    fn key(&self) -> &str;
}

/// Replace the entry with the same id, or append. Keeps lists free of
/// duplicates when a refetch and an optimistic append race.
pub fn upsert_by_id<T: Keyed>(items: &mut Vec<T>, item: T) {
    match items.iter_mut().find(|existing| existing.key() == item.key()) {
        Some(existing) => *existing = item,
        None => items.push(item),
    }
}

/// Runs `fetch` once right away and again whenever the session token changes.
/// Ends when the session sender is dropped.
pub fn refetch_on_token_change<F, Fut>(mut session: watch::Receiver<Session>, fetch: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut seen = session.borrow_and_update().token().map(str::to_string);
        fetch().await;
        while session.changed().await.is_ok() {
            let token = session.borrow_and_update().token().map(str::to_string);
            if token != seen {
                seen = token;
                fetch().await;
            }
        }
    })
}
