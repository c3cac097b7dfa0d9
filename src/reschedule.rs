//! The reschedule engine: moving one course meeting to a new room/time as a
//! single transaction: validate, resolve week and meeting number, conflict
//! check, flip the superseded row to `replaced`, insert the `update` row.

use axum::extract::State;
use axum::Json;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::models::{EventStatus, ScheduleEvent, UpdateScheduleRequest, UpdateScheduleResponse};
use crate::routes::AppState;
use crate::slots;

pub const MAX_MEETINGS_PER_COURSE: i32 = 16;

/// Postgres class 23P01, raised by the exclusion constraint when a
/// concurrent transaction already booked an overlapping slot.
const EXCLUSION_VIOLATION: &str = "23P01";

fn validate_meeting_number(n: i32) -> Result<i32, ApiError> {
    if (1..=MAX_MEETINGS_PER_COURSE).contains(&n) {
        Ok(n)
    } else {
        Err(ApiError::validation(
            "meetingNumber",
            format!("Meeting number must be between 1 and {MAX_MEETINGS_PER_COURSE}"),
        ))
    }
}

fn validate_semester_window(
    start: NaiveDate,
    end: NaiveDate,
    date: NaiveDate,
) -> Result<(), ApiError> {
    if date < start || date > end {
        return Err(ApiError::validation(
            "newDate",
            format!("Date must fall within the semester ({start} to {end})"),
        ));
    }
    Ok(())
}

/// POST /schedule/update, komting/admin only.
pub async fn update_schedule(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<UpdateScheduleRequest>,
) -> Result<Json<UpdateScheduleResponse>, ApiError> {
    user.require_komting()?;

    let new_date = slots::parse_date("newDate", &req.new_date)?;
    let new_start = slots::parse_time("newStartTime", &req.new_start_time)?;
    let new_end = slots::parse_time("newEndTime", &req.new_end_time)?;
    if new_start >= new_end {
        return Err(ApiError::validation(
            "newStartTime",
            "Start time must be before end time",
        ));
    }
    validate_semester_window(state.config.semester_start, state.config.semester_end, new_date)?;

    let academic_week = match req.week_number {
        Some(w) if w >= 1 => w,
        Some(_) => return Err(ApiError::validation("weekNumber", "Week number must be positive")),
        None => slots::academic_week(state.config.semester_start, new_date),
    };

    let mut tx = state.db.begin().await?;

    let course_name: String = sqlx::query_scalar(
        "SELECT name FROM courses WHERE id = $1 AND is_active = true",
    )
    .bind(req.course_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(ApiError::NotFound("Course"))?;

    if let Some(room_id) = req.new_room_id {
        let room_active: Option<bool> =
            sqlx::query_scalar("SELECT is_active FROM rooms WHERE id = $1")
                .bind(room_id)
                .fetch_optional(&mut *tx)
                .await?;
        if room_active != Some(true) {
            return Err(ApiError::NotFound("Room"));
        }
    }

    // Next sequential meeting when the caller didn't pin one.
    let meeting_number = match req.meeting_number {
        Some(n) => validate_meeting_number(n)?,
        None => {
            let next: i32 = sqlx::query_scalar(
                r#"
                SELECT COALESCE(MAX(meeting_number), 0) + 1
                FROM schedule_events
                WHERE course_id = $1 AND status NOT IN ('cancelled', 'replaced')
                "#,
            )
            .bind(req.course_id)
            .fetch_one(&mut *tx)
            .await?;
            validate_meeting_number(next)?
        }
    };

    // Conflict check runs inside the transaction so a concurrent reschedule
    // that commits first is observed here; the caller's own events are
    // excluded since they are about to be superseded.
    if let Some(room_id) = req.new_room_id {
        let conflict: Option<String> = sqlx::query_scalar(
            r#"
            SELECT c.name
            FROM schedule_events se
            JOIN courses c ON se.course_id = c.id
            WHERE se.room_id = $1
              AND se.event_date = $2
              AND se.status NOT IN ('cancelled', 'replaced')
              AND se.start_time < $4
              AND se.end_time > $3
              AND se.course_id <> $5
            LIMIT 1
            "#,
        )
        .bind(room_id)
        .bind(new_date)
        .bind(new_start)
        .bind(new_end)
        .bind(req.course_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(conflicting_course) = conflict {
            return Err(ApiError::RoomConflict { conflicting_course });
        }
    }

    // Supersede the week's live occurrence. History rows are flipped, never
    // deleted; only statuses that legally transition to `replaced` qualify.
    #[derive(sqlx::FromRow)]
    struct LiveRow {
        id: Uuid,
        status: EventStatus,
    }
    let live = sqlx::query_as::<_, LiveRow>(
        r#"
        SELECT id, status FROM schedule_events
        WHERE course_id = $1 AND academic_week = $2
          AND status NOT IN ('cancelled', 'replaced')
        ORDER BY created_at DESC
        "#,
    )
    .bind(req.course_id)
    .bind(academic_week)
    .fetch_all(&mut *tx)
    .await?;

    let replaceable: Vec<Uuid> = live
        .iter()
        .filter(|row| row.status.can_transition(EventStatus::Replaced))
        .map(|row| row.id)
        .collect();
    let previous_event_id = replaceable.first().copied();

    if !replaceable.is_empty() {
        sqlx::query("UPDATE schedule_events SET status = 'replaced' WHERE id = ANY($1)")
            .bind(&replaceable)
            .execute(&mut *tx)
            .await?;
    }

    let event = sqlx::query_as::<_, ScheduleEvent>(
        r#"
        INSERT INTO schedule_events
            (course_id, room_id, event_date, start_time, end_time, status,
             academic_week, meeting_number, changed_by, previous_event_id, change_reason)
        VALUES ($1, $2, $3, $4, $5, 'update', $6, $7, $8, $9, $10)
        RETURNING id, course_id, room_id, event_date, start_time, end_time, status,
                  academic_week, meeting_number, changed_by, previous_event_id,
                  change_reason, created_at
        "#,
    )
    .bind(req.course_id)
    .bind(req.new_room_id)
    .bind(new_date)
    .bind(new_start)
    .bind(new_end)
    .bind(academic_week)
    .bind(meeting_number)
    .bind(user.id)
    .bind(previous_event_id)
    .bind(req.change_reason.as_deref())
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| match e.as_database_error().and_then(|d| d.code()) {
        // the data-layer guard caught a slot race this transaction could not
        // see under read-committed isolation
        Some(code) if code == EXCLUSION_VIOLATION => ApiError::RoomConflict {
            conflicting_course: "another course".into(),
        },
        _ => ApiError::Database(e),
    })?;

    tx.commit().await?;

    tracing::info!(
        course = %course_name,
        week = academic_week,
        meeting = meeting_number,
        date = %new_date,
        changed_by = %user.id,
        "schedule updated"
    );

    Ok(Json(UpdateScheduleResponse {
        message: format!(
            "Schedule updated for week {academic_week}, meeting {meeting_number}"
        ),
        event,
        week_number: academic_week,
        meeting_number,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn meeting_number_bounds() {
        assert!(validate_meeting_number(1).is_ok());
        assert!(validate_meeting_number(16).is_ok());
        assert!(validate_meeting_number(0).is_err());
        assert!(validate_meeting_number(17).is_err());
    }

    #[test]
    fn semester_window_is_inclusive() {
        let start = d("2024-08-26");
        let end = d("2025-12-05");
        assert!(validate_semester_window(start, end, start).is_ok());
        assert!(validate_semester_window(start, end, end).is_ok());
        assert!(validate_semester_window(start, end, d("2024-08-25")).is_err());
        assert!(validate_semester_window(start, end, d("2025-12-06")).is_err());
    }
}
