use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a dated schedule occurrence.
///
/// `Replaced` and `Cancelled` are terminal; every other status counts as the
/// one "live" occurrence of its course for an academic week. Superseded rows
/// are flipped to `Replaced`, never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Scheduled,
    Default,
    Update,
    Replaced,
    Cancelled,
}

impl EventStatus {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "scheduled" => Ok(EventStatus::Scheduled),
            "default" => Ok(EventStatus::Default),
            "update" => Ok(EventStatus::Update),
            "replaced" => Ok(EventStatus::Replaced),
            "cancelled" => Ok(EventStatus::Cancelled),
            other => Err(format!("unknown event status: {other}")),
        }
    }

    pub fn is_live(self) -> bool {
        !matches!(self, EventStatus::Replaced | EventStatus::Cancelled)
    }

    pub fn can_transition(self, next: EventStatus) -> bool {
        use EventStatus::*;
        match (self, next) {
            (Replaced | Cancelled, _) => false,
            (_, Cancelled) => true,
            (Scheduled | Default | Update, Replaced) => true,
            (Scheduled | Default, Update) => true,
            _ => false,
        }
    }
}

// Stored as TEXT; delegate the wire handling to &str.
impl sqlx::Type<sqlx::Postgres> for EventStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <&str as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <&str as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for EventStatus {
    fn decode(
        value: sqlx::postgres::PgValueRef<'r>,
    ) -> Result<Self, sqlx::error::BoxDynError> {
        let raw = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        EventStatus::parse(raw).map_err(Into::into)
    }
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Room {
    pub id: Uuid,
    pub name: String,
    pub capacity: Option<i32>,
    pub floor: Option<String>,
    pub building: Option<String>,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Course {
    pub id: Uuid,
    pub course_code: String,
    pub name: String,
    pub lecturer_id: Option<Uuid>,
    pub komting_id: Option<Uuid>,
    pub default_day: Option<i32>,
    pub default_start_time: Option<NaiveTime>,
    pub default_end_time: Option<NaiveTime>,
    pub default_room_id: Option<Uuid>,
    pub semester: Option<String>,
    pub academic_year: Option<String>,
    pub is_active: bool,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct ScheduleEvent {
    pub id: Uuid,
    pub course_id: Uuid,
    pub room_id: Option<Uuid>,
    pub event_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: EventStatus,
    pub academic_week: i32,
    pub meeting_number: i32,
    pub changed_by: Option<Uuid>,
    pub previous_event_id: Option<Uuid>,
    pub change_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UpdateScheduleRequest {
    pub course_id: Uuid,
    pub new_room_id: Option<Uuid>,
    pub new_date: String,
    pub new_start_time: String,
    pub new_end_time: String,
    pub week_number: Option<i32>,
    pub meeting_number: Option<i32>,
    pub change_reason: Option<String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct UpdateScheduleResponse {
    pub message: String,
    pub event: ScheduleEvent,
    pub week_number: i32,
    pub meeting_number: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SubscriptionRequest {
    pub course_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::EventStatus::*;

    #[test]
    fn terminal_statuses_never_transition() {
        for next in [Scheduled, Default, Update, Replaced, Cancelled] {
            assert!(!Replaced.can_transition(next));
            assert!(!Cancelled.can_transition(next));
        }
    }

    #[test]
    fn live_rows_can_be_replaced_or_cancelled() {
        for live in [Scheduled, Default, Update] {
            assert!(live.is_live());
            assert!(live.can_transition(Replaced));
            assert!(live.can_transition(Cancelled));
        }
        assert!(!Replaced.is_live());
        assert!(!Cancelled.is_live());
    }

    #[test]
    fn update_only_supersedes_seeded_rows() {
        assert!(Scheduled.can_transition(Update));
        assert!(Default.can_transition(Update));
        assert!(!Update.can_transition(Update));
    }
}
