use std::sync::Arc;

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::{
    error::ClientError,
    models::calendar::{CalendarEvent, EventDraft},
    routes::api,
    services::{
        api::{ApiClient, ApiRequest},
        resource::{refetch_on_token_change, upsert_by_id, InFlight, Keyed, VersionGate},
        session::SessionStore,
    },
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalendarState {
    pub events: Vec<CalendarEvent>,
    pub loading: bool,
    pub error: Option<String>,
    pub creating: bool,
    pub updating: bool,
    pub deleting: bool,
}

/// `GET /calendar/events` payload. Rows are decoded one by one so a single
/// malformed event does not hide the rest.
#[derive(Debug, Deserialize)]
struct EventsPayload {
    #[serde(default)]
    events: Vec<Value>,
}

impl EventsPayload {
    fn into_events(self) -> Vec<CalendarEvent> {
        self.events
            .into_iter()
            .filter_map(|row| {
                let id = row.get("id").and_then(Value::as_str).unwrap_or("?").to_string();
                match serde_json::from_value::<CalendarEvent>(row) {
                    Ok(event) => Some(event),
                    Err(e) => {
                        warn!("Calendar: skipping event {}: {}", id, e);
                        None
                    }
                }
            })
            .collect()
    }
}

impl Keyed for CalendarEvent {
    fn key(&self) -> &str {
        &self.id
    }
}

pub struct CalendarResource {
    api: ApiClient,
    session: Arc<SessionStore>,
    state: watch::Sender<CalendarState>,
    gate: VersionGate,
}

impl CalendarResource {
    pub fn new(api: ApiClient, session: Arc<SessionStore>) -> Self {
        let (state, _) = watch::channel(CalendarState::default());
        Self {
            api,
            session,
            state,
            gate: VersionGate::new(),
        }
    }

    pub fn snapshot(&self) -> CalendarState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CalendarState> {
        self.state.subscribe()
    }

    pub fn watch_session(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        refetch_on_token_change(self.session.subscribe(), move || {
            let this = Arc::clone(&this);
            async move { this.refetch().await }
        })
    }

    pub async fn refetch(&self) {
        let ticket = self.gate.begin_fetch();
        let Some(token) = self.session.token() else {
            self.state.send_modify(|s| {
                if self.gate.is_latest_fetch(ticket) {
                    s.events.clear();
                    s.loading = false;
                    s.error = Some(ClientError::NotAuthenticated.to_string());
                }
            });
            return;
        };

        self.state.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });

        let outcome = self
            .api
            .authenticated_call(ApiRequest::get(api::CALENDAR_EVENTS), &token)
            .await
            .into_data::<EventsPayload>();

        self.state.send_modify(|s| {
            if self.gate.is_current(ticket) {
                match outcome {
                    Ok(payload) => s.events = payload.into_events(),
                    Err(e) => {
                        s.events.clear();
                        s.error = Some(e.user_message());
                    }
                }
            }
            if self.gate.is_latest_fetch(ticket) {
                s.loading = false;
            }
        });
    }

    pub async fn create_event(&self, draft: EventDraft) -> Result<CalendarEvent, ClientError> {
        let token = self.session.token().ok_or(ClientError::NotAuthenticated)?;
        let _busy = InFlight::raise(&self.state, |s| &mut s.creating);

        let request = ApiRequest::post(api::CALENDAR_EVENTS).json(&draft)?;
        let event: CalendarEvent = self
            .api
            .authenticated_call(request, &token)
            .await
            .into_data()?;

        self.gate.commit_mutation();
        self.state
            .send_modify(|s| upsert_by_id(&mut s.events, event.clone()));
        Ok(event)
    }

    pub async fn update_event(
        &self,
        event_id: &str,
        draft: EventDraft,
    ) -> Result<CalendarEvent, ClientError> {
        let token = self.session.token().ok_or(ClientError::NotAuthenticated)?;
        let _busy = InFlight::raise(&self.state, |s| &mut s.updating);

        let request = ApiRequest::put(api::calendar_event(event_id)).json(&draft)?;
        let event: CalendarEvent = self
            .api
            .authenticated_call(request, &token)
            .await
            .into_data()?;

        self.gate.commit_mutation();
        self.state
            .send_modify(|s| upsert_by_id(&mut s.events, event.clone()));
        Ok(event)
    }

    pub async fn delete_event(&self, event_id: &str) -> Result<(), ClientError> {
        let token = self.session.token().ok_or(ClientError::NotAuthenticated)?;
        let _busy = InFlight::raise(&self.state, |s| &mut s.deleting);

        self.api
            .authenticated_call(ApiRequest::delete(api::calendar_event(event_id)), &token)
            .await
            .ensure_success()?;

        self.gate.commit_mutation();
        self.state.send_modify(|s| s.events.retain(|e| e.id != event_id));
        Ok(())
    }

    /// Events occupying `date`, earliest first. Schedules count on every day
    /// of their range.
    pub fn events_on(&self, date: NaiveDate) -> Vec<CalendarEvent> {
        let mut events: Vec<CalendarEvent> = self
            .state
            .borrow()
            .events
            .iter()
            .filter(|e| e.covers(date))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.starts_at());
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::calendar::{EventKind, EventTiming};
    use crate::services::transport::Method;
    use crate::test_support::{Fixture, Reply};
    use serde_json::json;
    use std::time::Duration;

    fn events_body() -> serde_json::Value {
        json!({
            "success": true,
            "data": {
                "events": [
                    {
                        "id": "e2", "title": "Swim class", "eventType": "Activity",
                        "eventDate": "2024-06-03", "startTime": "17:00"
                    },
                    {
                        "id": "e1", "title": "Dentist", "eventType": "Medical",
                        "eventDate": "2024-06-03", "startTime": "09:15"
                    },
                    {
                        "id": "s1", "title": "Week with Mom", "eventType": "Schedule",
                        "startDate": "2024-06-01", "endDate": "2024-06-07",
                        "responsibleParent": "Mom", "activities": []
                    },
                    {
                        "id": "e3", "title": "Field trip", "eventType": "School_Event",
                        "eventDate": "2024-06-10"
                    }
                ]
            }
        })
    }

    fn dentist_draft() -> EventDraft {
        EventDraft {
            title: "Dentist".into(),
            description: None,
            color: Some("#ff0000".into()),
            kind: EventKind::Medical(EventTiming {
                event_date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
                start_time: Some("09:15".into()),
                end_time: None,
                location: None,
            }),
        }
    }

    #[tokio::test]
    async fn events_on_includes_schedules_and_sorts() {
        let fx = Fixture::signed_in().await;
        fx.transport.on(Method::Get, "/calendar/events", Reply::json(200, events_body()));
        fx.calendar.refetch().await;

        let day = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let ids: Vec<_> = fx.calendar.events_on(day).into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["s1", "e1", "e2"]);

        let later = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let ids: Vec<_> = fx.calendar.events_on(later).into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["e3"]);
    }

    #[tokio::test]
    async fn create_sends_tagged_body_and_appends() {
        let fx = Fixture::signed_in().await;
        fx.transport.on(
            Method::Post,
            "/calendar/events",
            Reply::json(201, json!({
                "success": true,
                "data": {
                    "id": "e9", "title": "Dentist", "eventType": "Medical",
                    "eventDate": "2024-06-03", "startTime": "09:15"
                }
            })),
        );

        let event = fx.calendar.create_event(dentist_draft()).await.unwrap();
        assert_eq!(event.id, "e9");
        assert_eq!(fx.calendar.snapshot().events.len(), 1);
        assert!(!fx.calendar.snapshot().creating);

        let sent = fx.transport.requests();
        let Some(crate::services::transport::Body::Json(body)) = &sent[0].body else {
            panic!("expected a JSON body");
        };
        assert_eq!(body["eventType"], "Medical");
        assert_eq!(body["eventDate"], "2024-06-03");
    }

    #[tokio::test]
    async fn update_replaces_in_place() {
        let fx = Fixture::signed_in().await;
        fx.transport.on(Method::Get, "/calendar/events", Reply::json(200, events_body()));
        fx.calendar.refetch().await;
        fx.transport.on(
            Method::Put,
            "/calendar/events/e1",
            Reply::json(200, json!({
                "success": true,
                "data": {
                    "id": "e1", "title": "Dentist (moved)", "eventType": "Medical",
                    "eventDate": "2024-06-03", "startTime": "11:00"
                }
            })),
        );

        fx.calendar.update_event("e1", dentist_draft()).await.unwrap();
        let events = fx.calendar.snapshot().events;
        assert_eq!(events.len(), 4);
        assert_eq!(
            events.iter().find(|e| e.id == "e1").map(|e| e.title.as_str()),
            Some("Dentist (moved)")
        );
    }

    #[tokio::test]
    async fn malformed_rows_are_skipped() {
        let fx = Fixture::signed_in().await;
        fx.transport.on(
            Method::Get,
            "/calendar/events",
            Reply::json(200, json!({
                "success": true,
                "data": {
                    "events": [
                        {
                            "id": "e1", "title": "Dentist", "eventType": "Medical",
                            "eventDate": "2024-06-03", "startTime": "09:15"
                        },
                        {
                            "id": "s1", "title": "Week with Dad", "eventType": "Schedule",
                            "startDate": "2024-06-08", "endDate": null
                        },
                        { "id": "x1", "title": "Party", "eventType": "Birthday", "eventDate": "2024-06-09" }
                    ]
                }
            })),
        );
        fx.calendar.refetch().await;

        let state = fx.calendar.snapshot();
        assert_eq!(state.error, None);
        let ids: Vec<_> = state.events.into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["e1"]);
    }

    #[tokio::test]
    async fn logout_voids_fetch_in_flight() {
        let fx = Fixture::signed_in().await;
        fx.transport.on(
            Method::Get,
            "/calendar/events",
            Reply::delayed(Duration::from_millis(50), Reply::json(200, events_body())),
        );

        let calendar = Arc::clone(&fx.calendar);
        let slow = tokio::spawn(async move { calendar.refetch().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        fx.auth.logout().await;
        fx.calendar.refetch().await;
        slow.await.unwrap();

        let state = fx.calendar.snapshot();
        assert!(state.events.is_empty());
        assert_eq!(state.error.as_deref(), Some("Not authenticated"));
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn delete_failure_keeps_event_and_resets_flag() {
        let fx = Fixture::signed_in().await;
        fx.transport.on(Method::Get, "/calendar/events", Reply::json(200, events_body()));
        fx.calendar.refetch().await;
        fx.transport.on(Method::Delete, "/calendar/events/e1", Reply::Fail);

        assert_eq!(fx.calendar.delete_event("e1").await, Err(ClientError::Network));
        let state = fx.calendar.snapshot();
        assert_eq!(state.events.len(), 4);
        assert!(!state.deleting);
    }
}
