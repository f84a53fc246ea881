use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Parse `YYYY-MM-DD` or an RFC 3339 timestamp into a calendar date.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

/// Parse `HH:MM` or `HH:MM:SS`.
pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}

mod flexible_date {
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&date.format("%Y-%m-%d").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_date(&raw).ok_or_else(|| de::Error::custom(format!("invalid date: {raw}")))
    }
}

/// Date and time fields of a single-day event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventTiming {
    #[serde(with = "flexible_date")]
    pub event_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Custody/caregiving schedule spanning a date range.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRange {
    #[serde(with = "flexible_date")]
    pub start_date: NaiveDate,
    #[serde(with = "flexible_date")]
    pub end_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsible_parent: Option<String>,
    #[serde(default)]
    pub activities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Span<'a> {
    Day(&'a EventTiming),
    Range(&'a ScheduleRange),
}

/// Tagged on `eventType`. Only `Schedule` carries a date range.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "eventType")]
pub enum EventKind {
    Personal(EventTiming),
    School(EventTiming),
    #[serde(rename = "School_Event")]
    SchoolEvent(EventTiming),
    #[serde(rename = "School_Holiday")]
    SchoolHoliday(EventTiming),
    Activity(EventTiming),
    Holiday(EventTiming),
    Medical(EventTiming),
    Schedule(ScheduleRange),
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Personal(_) => "Personal",
            EventKind::School(_) => "School",
            EventKind::SchoolEvent(_) => "School_Event",
            EventKind::SchoolHoliday(_) => "School_Holiday",
            EventKind::Activity(_) => "Activity",
            EventKind::Holiday(_) => "Holiday",
            EventKind::Medical(_) => "Medical",
            EventKind::Schedule(_) => "Schedule",
        }
    }

    /// Which of the two field groups this event carries.
    pub fn span(&self) -> Span<'_> {
        match self {
            EventKind::Personal(t)
            | EventKind::School(t)
            | EventKind::SchoolEvent(t)
            | EventKind::SchoolHoliday(t)
            | EventKind::Activity(t)
            | EventKind::Holiday(t)
            | EventKind::Medical(t) => Span::Day(t),
            EventKind::Schedule(range) => Span::Range(range),
        }
    }

    pub fn timing(&self) -> Option<&EventTiming> {
        match self.span() {
            Span::Day(timing) => Some(timing),
            Span::Range(_) => None,
        }
    }

    pub fn schedule(&self) -> Option<&ScheduleRange> {
        match self.span() {
            Span::Range(range) => Some(range),
            Span::Day(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl CalendarEvent {
    pub fn is_schedule(&self) -> bool {
        matches!(self.kind, EventKind::Schedule(_))
    }

    /// Whether the event occupies `date`. Schedules cover their whole range,
    /// inclusive on both ends.
    pub fn covers(&self, date: NaiveDate) -> bool {
        match self.kind.span() {
            Span::Day(timing) => timing.event_date == date,
            Span::Range(range) => range.start_date <= date && date <= range.end_date,
        }
    }

    /// Local wall-clock start. Events without a start time start at midnight.
    pub fn starts_at(&self) -> NaiveDateTime {
        match self.kind.span() {
            Span::Day(timing) => {
                let time = timing
                    .start_time
                    .as_deref()
                    .and_then(parse_time)
                    .unwrap_or(NaiveTime::MIN);
                timing.event_date.and_time(time)
            }
            Span::Range(range) => range.start_date.and_time(NaiveTime::MIN),
        }
    }
}

/// Body of create/update calls.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventDraft {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_day_event_decodes() {
        let event: CalendarEvent = serde_json::from_value(json!({
            "id": "e1",
            "title": "Dentist",
            "eventType": "Medical",
            "eventDate": "2024-05-14T00:00:00.000Z",
            "startTime": "14:30",
            "endTime": "15:00"
        }))
        .unwrap();
        assert!(!event.is_schedule());
        assert_eq!(event.kind.name(), "Medical");
        let day = NaiveDate::from_ymd_opt(2024, 5, 14).unwrap();
        assert!(event.covers(day));
        assert_eq!(event.starts_at(), day.and_hms_opt(14, 30, 0).unwrap());
    }

    #[test]
    fn schedule_event_decodes_range() {
        let event: CalendarEvent = serde_json::from_value(json!({
            "id": "s1",
            "title": "Week with Dad",
            "eventType": "Schedule",
            "startDate": "2024-06-01",
            "endDate": "2024-06-07",
            "responsibleParent": "Dad",
            "activities": ["swimming"]
        }))
        .unwrap();
        let range = event.kind.schedule().unwrap();
        assert_eq!(range.responsible_parent.as_deref(), Some("Dad"));
        assert!(event.covers(NaiveDate::from_ymd_opt(2024, 6, 7).unwrap()));
        assert!(!event.covers(NaiveDate::from_ymd_opt(2024, 6, 8).unwrap()));
    }

    #[test]
    fn underscore_variants_round_trip_names() {
        let event: CalendarEvent = serde_json::from_value(json!({
            "id": "h1",
            "title": "Spring break",
            "eventType": "School_Holiday",
            "eventDate": "2024-04-08"
        }))
        .unwrap();
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["eventType"], "School_Holiday");
        assert_eq!(value["eventDate"], "2024-04-08");
        assert!(value.get("startDate").is_none());
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let result = serde_json::from_value::<CalendarEvent>(json!({
            "id": "x",
            "title": "?",
            "eventType": "Birthday",
            "eventDate": "2024-04-08"
        }));
        assert!(result.is_err());
    }
}
