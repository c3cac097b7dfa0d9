//! Schedule projection: a user's live weekly schedule, merged from recurring
//! templates and dated override events, plus the per-course audit trail.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::models::{Course, EventStatus};
use crate::routes::AppState;
use crate::slots;

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct TemplateRow {
    pub course_id: Uuid,
    pub course_code: String,
    pub course_name: String,
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub lecturer_name: Option<String>,
    pub room_id: Option<Uuid>,
    pub room_name: Option<String>,
    pub capacity: Option<i32>,
    pub building: Option<String>,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct EventRow {
    pub id: Uuid,
    pub course_id: Uuid,
    pub course_code: String,
    pub course_name: String,
    pub event_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: EventStatus,
    pub lecturer_name: Option<String>,
    pub room_id: Option<Uuid>,
    pub room_name: Option<String>,
    pub capacity: Option<i32>,
    pub building: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RoomRef {
    pub id: Option<Uuid>,
    pub name: Option<String>,
    pub capacity: Option<i32>,
    pub building: Option<String>,
}

/// One class occurrence on a concrete date, either a dated event or a
/// template projected onto that weekday.
#[derive(Serialize, Debug, Clone)]
pub struct Occurrence {
    pub event_id: Option<Uuid>,
    pub course_id: Uuid,
    pub course_code: String,
    pub course_name: String,
    pub lecturer_name: Option<String>,
    pub room: RoomRef,
    pub date: NaiveDate,
    pub day_name: &'static str,
    pub start_time: String,
    pub end_time: String,
    pub time: String,
    pub status: EventStatus,
}

fn template_occurrence(t: &TemplateRow, date: NaiveDate) -> Occurrence {
    Occurrence {
        event_id: None,
        course_id: t.course_id,
        course_code: t.course_code.clone(),
        course_name: t.course_name.clone(),
        lecturer_name: t.lecturer_name.clone(),
        room: RoomRef {
            id: t.room_id,
            name: t.room_name.clone(),
            capacity: t.capacity,
            building: t.building.clone(),
        },
        date,
        day_name: slots::day_name(slots::iso_weekday(date)),
        start_time: slots::fmt_time(t.start_time),
        end_time: slots::fmt_time(t.end_time),
        time: format!("{} - {}", slots::fmt_time(t.start_time), slots::fmt_time(t.end_time)),
        status: EventStatus::Scheduled,
    }
}

fn event_occurrence(e: &EventRow) -> Occurrence {
    Occurrence {
        event_id: Some(e.id),
        course_id: e.course_id,
        course_code: e.course_code.clone(),
        course_name: e.course_name.clone(),
        lecturer_name: e.lecturer_name.clone(),
        room: RoomRef {
            id: e.room_id,
            name: e.room_name.clone(),
            capacity: e.capacity,
            building: e.building.clone(),
        },
        date: e.event_date,
        day_name: slots::day_name(slots::iso_weekday(e.event_date)),
        start_time: slots::fmt_time(e.start_time),
        end_time: slots::fmt_time(e.end_time),
        time: format!("{} - {}", slots::fmt_time(e.start_time), slots::fmt_time(e.end_time)),
        status: e.status,
    }
}

/// Merge dated events over weekly templates for `[from, to]`.
///
/// An event (live or cancelled) claims its course's calendar week: live
/// events appear as-is, cancelled ones suppress the template for that week
/// without contributing an occurrence. Courses with neither contribute the
/// template on its weekday. Days are ordered, and within a day occurrences
/// sort by start time.
pub fn project_range(
    templates: &[TemplateRow],
    events: &[EventRow],
    from: NaiveDate,
    to: NaiveDate,
) -> BTreeMap<NaiveDate, Vec<Occurrence>> {
    let mut claimed: HashSet<(Uuid, NaiveDate)> = HashSet::new();
    for e in events {
        claimed.insert((e.course_id, slots::week_monday(e.event_date)));
    }

    let mut by_day: BTreeMap<NaiveDate, Vec<Occurrence>> = BTreeMap::new();

    for e in events.iter().filter(|e| e.status.is_live()) {
        if e.event_date >= from && e.event_date <= to {
            by_day.entry(e.event_date).or_default().push(event_occurrence(e));
        }
    }

    let mut date = from;
    while date <= to {
        let week = slots::week_monday(date);
        for t in templates {
            if t.day_of_week == slots::iso_weekday(date) && !claimed.contains(&(t.course_id, week)) {
                by_day.entry(date).or_default().push(template_occurrence(t, date));
            }
        }
        date += Duration::days(1);
    }

    for occurrences in by_day.values_mut() {
        occurrences.sort_by(|a, b| a.start_time.cmp(&b.start_time));
    }
    by_day
}

#[derive(Deserialize, Debug)]
pub struct RealScheduleQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

async fn fetch_templates(
    state: &AppState,
    viewer: Option<Uuid>,
) -> Result<Vec<TemplateRow>, ApiError> {
    let rows = sqlx::query_as::<_, TemplateRow>(
        r#"
        SELECT cs.course_id, c.course_code, c.name AS course_name,
               cs.day_of_week, cs.start_time, cs.end_time, cs.lecturer_name,
               r.id AS room_id, r.name AS room_name, r.capacity, r.building
        FROM class_schedules cs
        JOIN courses c ON cs.course_id = c.id AND c.is_active = true
        LEFT JOIN rooms r ON cs.room_id = r.id
        WHERE ($1::uuid IS NULL OR EXISTS (
            SELECT 1 FROM course_subscriptions sub
            WHERE sub.user_id = $1 AND sub.course_id = c.id
        ))
        ORDER BY cs.day_of_week, cs.start_time
        "#,
    )
    .bind(viewer)
    .fetch_all(&state.db)
    .await?;
    Ok(rows)
}

async fn fetch_events(
    state: &AppState,
    viewer: Option<Uuid>,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<EventRow>, ApiError> {
    // Replaced rows are history, not schedule; cancelled rows are kept so the
    // projector can suppress the template for that week.
    let rows = sqlx::query_as::<_, EventRow>(
        r#"
        SELECT se.id, se.course_id, c.course_code, c.name AS course_name,
               se.event_date, se.start_time, se.end_time, se.status,
               l.name AS lecturer_name,
               r.id AS room_id, r.name AS room_name, r.capacity, r.building
        FROM schedule_events se
        JOIN courses c ON se.course_id = c.id AND c.is_active = true
        LEFT JOIN users l ON c.lecturer_id = l.id
        LEFT JOIN rooms r ON se.room_id = r.id
        WHERE se.status <> 'replaced'
          AND se.event_date BETWEEN $2 AND $3
          AND ($1::uuid IS NULL OR EXISTS (
              SELECT 1 FROM course_subscriptions sub
              WHERE sub.user_id = $1 AND sub.course_id = c.id
          ))
        ORDER BY se.event_date, se.start_time
        "#,
    )
    .bind(viewer)
    .bind(from)
    .bind(to)
    .fetch_all(&state.db)
    .await?;
    Ok(rows)
}

/// GET /schedule/real: live schedule for a date range, events overriding
/// the weekly template. Defaults to the current Monday..Sunday week.
pub async fn real_schedule(
    State(state): State<AppState>,
    user: AuthUser,
    Query(q): Query<RealScheduleQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (from, to) = match (&q.start_date, &q.end_date) {
        (Some(s), Some(e)) => {
            let from = slots::parse_date("start_date", s)?;
            let to = slots::parse_date("end_date", e)?;
            if to < from {
                return Err(ApiError::validation("end_date", "must not be before start_date"));
            }
            (from, to)
        }
        _ => {
            let monday = slots::week_monday(Utc::now().date_naive());
            (monday, monday + Duration::days(6))
        }
    };

    let viewer = (!user.is_admin()).then_some(user.id);
    let templates = fetch_templates(&state, viewer).await?;
    let events = fetch_events(&state, viewer, from, to).await?;

    let by_day = project_range(&templates, &events, from, to);
    let total: usize = by_day.values().map(Vec::len).sum();

    tracing::debug!(user = %user.id, %from, %to, total, "projected schedule");

    Ok(Json(json!({
        "events": by_day,
        "date_range": { "start_date": from, "end_date": to },
        "total_events": total,
    })))
}

/// GET /schedule/default: the subscribed recurring weekly template.
pub async fn default_schedule(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let viewer = (!user.is_admin()).then_some(user.id);
    let templates = fetch_templates(&state, viewer).await?;

    let schedule: Vec<_> = templates
        .iter()
        .map(|t| {
            json!({
                "course_id": t.course_id,
                "course_code": t.course_code,
                "name": t.course_name,
                "day_of_week": t.day_of_week,
                "day_name": slots::day_name(t.day_of_week),
                "start_time": slots::fmt_time(t.start_time),
                "end_time": slots::fmt_time(t.end_time),
                "lecturer_name": t.lecturer_name,
                "room_name": t.room_name,
                "capacity": t.capacity,
                "building": t.building,
            })
        })
        .collect();

    Ok(Json(json!({ "schedule": schedule, "total": schedule.len() })))
}

/// GET /courses/schedules/my: flat template list for subscribed courses.
pub async fn my_course_schedules(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    #[derive(sqlx::FromRow)]
    struct Row {
        course_id: Uuid,
        course_name: String,
        day_of_week: i32,
        start_time: NaiveTime,
        end_time: NaiveTime,
        room_code: Option<String>,
        lecturer_name: Option<String>,
        semester: Option<String>,
        academic_year: Option<String>,
    }

    let rows = sqlx::query_as::<_, Row>(
        r#"
        SELECT c.id AS course_id, c.name AS course_name,
               cs.day_of_week, cs.start_time, cs.end_time,
               r.name AS room_code, cs.lecturer_name,
               cs.semester, cs.academic_year
        FROM course_subscriptions sub
        JOIN courses c ON sub.course_id = c.id AND c.is_active = true
        JOIN class_schedules cs ON cs.course_id = c.id
        LEFT JOIN rooms r ON cs.room_id = r.id
        WHERE sub.user_id = $1
        ORDER BY cs.day_of_week, cs.start_time
        "#,
    )
    .bind(user.id)
    .fetch_all(&state.db)
    .await?;

    let schedules: Vec<_> = rows
        .iter()
        .map(|r| {
            json!({
                "course_id": r.course_id,
                "course_name": r.course_name,
                "day_of_week": r.day_of_week,
                "day_name": slots::day_name(r.day_of_week),
                "start_time": slots::fmt_time(r.start_time),
                "end_time": slots::fmt_time(r.end_time),
                "room_code": r.room_code,
                "lecturer_name": r.lecturer_name,
                "semester": r.semester,
                "academic_year": r.academic_year,
            })
        })
        .collect();

    Ok(Json(json!({ "schedules": schedules, "total": schedules.len() })))
}

#[derive(sqlx::FromRow, Serialize, Debug)]
struct HistoryRow {
    id: Uuid,
    event_date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    status: EventStatus,
    academic_week: i32,
    meeting_number: i32,
    change_reason: Option<String>,
    created_at: DateTime<Utc>,
    room_name: Option<String>,
    changed_by_name: Option<String>,
    previous_event_date: Option<NaiveDate>,
    previous_start_time: Option<NaiveTime>,
    previous_end_time: Option<NaiveTime>,
    previous_room_name: Option<String>,
}

/// GET /schedule/history/:course_id: full audit trail including replaced
/// rows, newest first. Restricted to the course's komting or an admin.
pub async fn schedule_history(
    State(state): State<AppState>,
    user: AuthUser,
    Path(course_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let course = sqlx::query_as::<_, Course>(
        r#"
        SELECT id, course_code, name, lecturer_id, komting_id,
               default_day, default_start_time, default_end_time, default_room_id,
               semester, academic_year, is_active
        FROM courses
        WHERE id = $1 AND is_active = true
        "#,
    )
    .bind(course_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(ApiError::NotFound("Course"))?;

    if !user.is_admin() && course.komting_id != Some(user.id) {
        return Err(ApiError::Forbidden(
            "You are not the komting for this course".into(),
        ));
    }

    let history = sqlx::query_as::<_, HistoryRow>(
        r#"
        SELECT se.id, se.event_date, se.start_time, se.end_time, se.status,
               se.academic_week, se.meeting_number, se.change_reason, se.created_at,
               r.name AS room_name,
               u.name AS changed_by_name,
               pe.event_date AS previous_event_date,
               pe.start_time AS previous_start_time,
               pe.end_time AS previous_end_time,
               pr.name AS previous_room_name
        FROM schedule_events se
        LEFT JOIN rooms r ON se.room_id = r.id
        LEFT JOIN users u ON se.changed_by = u.id
        LEFT JOIN schedule_events pe ON se.previous_event_id = pe.id
        LEFT JOIN rooms pr ON pe.room_id = pr.id
        WHERE se.course_id = $1
        ORDER BY se.created_at DESC
        "#,
    )
    .bind(course_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(json!({
        "course": { "id": course.id, "name": course.name },
        "history": history,
        "total": history.len(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn template(course: Uuid, day: i32, start: NaiveTime, end: NaiveTime) -> TemplateRow {
        TemplateRow {
            course_id: course,
            course_code: "IF-101".into(),
            course_name: "Algorithms".into(),
            day_of_week: day,
            start_time: start,
            end_time: end,
            lecturer_name: Some("Dr. Sari".into()),
            room_id: None,
            room_name: Some("D-103".into()),
            capacity: Some(40),
            building: Some("D".into()),
        }
    }

    fn event(course: Uuid, date: NaiveDate, status: EventStatus) -> EventRow {
        EventRow {
            id: Uuid::new_v4(),
            course_id: course,
            course_code: "IF-101".into(),
            course_name: "Algorithms".into(),
            event_date: date,
            start_time: t(13, 0),
            end_time: t(15, 0),
            status,
            lecturer_name: None,
            room_id: None,
            room_name: Some("E-201".into()),
            capacity: None,
            building: None,
        }
    }

    #[test]
    fn template_projects_onto_matching_weekday() {
        let course = Uuid::new_v4();
        let templates = vec![template(course, 3, t(8, 0), t(10, 30))]; // Wednesday
        let by_day = project_range(&templates, &[], d("2025-11-10"), d("2025-11-16"));

        assert_eq!(by_day.len(), 1);
        let wednesday = &by_day[&d("2025-11-12")];
        assert_eq!(wednesday.len(), 1);
        assert_eq!(wednesday[0].day_name, "Wednesday");
        assert_eq!(wednesday[0].start_time, "08:00");
        assert!(wednesday[0].event_id.is_none());
    }

    #[test]
    fn live_event_overrides_template_for_its_week() {
        let course = Uuid::new_v4();
        let templates = vec![template(course, 3, t(8, 0), t(10, 30))];
        let moved = event(course, d("2025-11-14"), EventStatus::Update); // Friday
        let by_day = project_range(&templates, &[moved], d("2025-11-10"), d("2025-11-16"));

        // template Wednesday is gone, the Friday event stands in
        assert!(!by_day.contains_key(&d("2025-11-12")));
        assert_eq!(by_day[&d("2025-11-14")].len(), 1);
        assert!(by_day[&d("2025-11-14")][0].event_id.is_some());
    }

    #[test]
    fn cancelled_event_suppresses_the_week_entirely() {
        let course = Uuid::new_v4();
        let templates = vec![template(course, 3, t(8, 0), t(10, 30))];
        let cancelled = event(course, d("2025-11-12"), EventStatus::Cancelled);
        let by_day = project_range(&templates, &[cancelled], d("2025-11-10"), d("2025-11-16"));

        assert!(by_day.is_empty());
    }

    #[test]
    fn override_is_scoped_to_one_week() {
        let course = Uuid::new_v4();
        let templates = vec![template(course, 3, t(8, 0), t(10, 30))];
        let moved = event(course, d("2025-11-14"), EventStatus::Update);
        // two-week range: week 1 overridden, week 2 falls back to template
        let by_day = project_range(&templates, &[moved], d("2025-11-10"), d("2025-11-23"));

        assert!(by_day.contains_key(&d("2025-11-14")));
        assert!(by_day.contains_key(&d("2025-11-19")));
        assert!(!by_day.contains_key(&d("2025-11-12")));
    }

    #[test]
    fn day_is_ordered_by_start_time() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let templates = vec![
            template(b, 1, t(13, 0), t(15, 0)),
            template(a, 1, t(8, 0), t(10, 0)),
        ];
        let by_day = project_range(&templates, &[], d("2025-11-10"), d("2025-11-10"));
        let monday = &by_day[&d("2025-11-10")];
        assert_eq!(monday.len(), 2);
        assert!(monday[0].start_time < monday[1].start_time);
    }

    #[test]
    fn course_without_template_or_event_contributes_nothing() {
        let by_day = project_range(&[], &[], d("2025-11-10"), d("2025-11-16"));
        assert!(by_day.is_empty());
    }
}
