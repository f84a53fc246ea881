use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::{
    error::ClientError,
    models::school::{Pagination, School, SchoolEvent, SchoolFilter, SchoolPage},
    routes::api,
    services::{
        api::{ApiClient, ApiRequest},
        resource::{refetch_on_token_change, upsert_by_id, Keyed, VersionGate},
        session::SessionStore,
    },
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchoolsState {
    pub schools: Vec<School>,
    pub pagination: Pagination,
    pub filter: SchoolFilter,
    pub loading: bool,
    pub error: Option<String>,
    /// Events of the school last opened with `fetch_school_events`.
    pub events: Vec<SchoolEvent>,
}

impl SchoolsState {
    pub fn has_more(&self) -> bool {
        self.pagination.has_more()
    }
}

/// Either a bare array or `{ events: [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EventsPayload {
    List(Vec<SchoolEvent>),
    Wrapped { events: Vec<SchoolEvent> },
}

impl Keyed for School {
    fn key(&self) -> &str {
        &self.id
    }
}

enum PageMode {
    Replace,
    Append,
}

pub struct SchoolsResource {
    api: ApiClient,
    session: Arc<SessionStore>,
    state: watch::Sender<SchoolsState>,
    gate: VersionGate,
}

impl SchoolsResource {
    pub fn new(api: ApiClient, session: Arc<SessionStore>) -> Self {
        let (state, _) = watch::channel(SchoolsState::default());
        Self {
            api,
            session,
            state,
            gate: VersionGate::new(),
        }
    }

    pub fn snapshot(&self) -> SchoolsState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SchoolsState> {
        self.state.subscribe()
    }

    pub fn has_more(&self) -> bool {
        self.state.borrow().has_more()
    }

    /// Re-run the current filter from page 1 whenever the token changes.
    pub fn watch_session(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        refetch_on_token_change(self.session.subscribe(), move || {
            let this = Arc::clone(&this);
            async move {
                let filter = this.state.borrow().filter.clone();
                this.fetch_schools(filter).await
            }
        })
    }

    /// Start over from page 1 with `filter`.
    pub async fn fetch_schools(&self, filter: SchoolFilter) {
        self.state.send_modify(|s| {
            s.filter = filter.clone();
            s.loading = true;
            s.error = None;
        });
        self.fetch_page(1, filter, PageMode::Replace).await;
    }

    /// Request the next page and append it. Returns false without a request
    /// while a fetch is running or when the last page has been reached.
    pub async fn load_more(&self) -> bool {
        let mut next = None;
        self.state.send_if_modified(|s| {
            if s.loading || !s.pagination.has_more() {
                return false;
            }
            s.loading = true;
            s.error = None;
            next = Some((s.pagination.page + 1, s.filter.clone()));
            true
        });

        match next {
            Some((page, filter)) => {
                self.fetch_page(page, filter, PageMode::Append).await;
                true
            }
            None => {
                debug!("Schools: nothing more to load");
                false
            }
        }
    }

    pub async fn fetch_school_events(&self, school_id: &str) -> Result<Vec<SchoolEvent>, ClientError> {
        let token = self.session.token().ok_or(ClientError::NotAuthenticated)?;
        let payload: EventsPayload = self
            .api
            .authenticated_call(ApiRequest::get(api::school_events(school_id)), &token)
            .await
            .into_data()?;
        let events = match payload {
            EventsPayload::List(events) | EventsPayload::Wrapped { events } => events,
        };
        self.state.send_modify(|s| s.events = events.clone());
        Ok(events)
    }

    async fn fetch_page(&self, page: u32, filter: SchoolFilter, mode: PageMode) {
        let ticket = self.gate.begin_fetch();
        let Some(token) = self.session.token() else {
            self.state.send_modify(|s| {
                if self.gate.is_latest_fetch(ticket) {
                    s.schools.clear();
                    s.pagination = Pagination::default();
                    s.loading = false;
                    s.error = Some(ClientError::NotAuthenticated.to_string());
                }
            });
            return;
        };

        let outcome = self
            .api
            .authenticated_call(ApiRequest::get(api::SCHOOLS).query(filter.query(page)), &token)
            .await
            .into_data::<SchoolPage>();

        self.state.send_modify(|s| {
            // A newer search or page request supersedes this one.
            if !self.gate.is_latest_fetch(ticket) {
                return;
            }
            s.loading = false;
            match (outcome, mode) {
                (Ok(result), PageMode::Replace) => {
                    s.schools = result.schools;
                    s.pagination = result.pagination;
                }
                (Ok(result), PageMode::Append) => {
                    for school in result.schools {
                        upsert_by_id(&mut s.schools, school);
                    }
                    s.pagination = result.pagination;
                }
                (Err(e), PageMode::Replace) => {
                    s.schools.clear();
                    s.pagination = Pagination::default();
                    s.error = Some(e.user_message());
                }
                (Err(e), PageMode::Append) => s.error = Some(e.user_message()),
            }
        });
    }
}
