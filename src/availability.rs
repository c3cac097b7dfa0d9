//! Room availability: the reschedule slot scanner, single-slot free-room
//! lookup, instantaneous room status, and a room's day sheet.
//!
//! Scan results are best-effort reads; the authoritative conflict check is
//! the one inside the reschedule transaction.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::models::Room;
use crate::routes::AppState;
use crate::slots;

#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq)]
pub struct RoomInfo {
    pub room_id: Uuid,
    pub room_name: String,
    pub building: Option<String>,
    pub floor: Option<String>,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Booking {
    pub event_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Serialize, Debug)]
pub struct AvailableSlot {
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub duration_minutes: i64,
    pub available_rooms: Vec<RoomInfo>,
}

/// Enumerate every weekday × aligned slot in the range and group the rooms
/// free for each. Bookings are prefetched per room; nothing here touches the
/// database.
pub fn scan_rooms(
    rooms: &[(RoomInfo, Vec<Booking>)],
    original_date: NaiveDate,
    original_start: NaiveTime,
    duration_minutes: i64,
    from: NaiveDate,
    to: NaiveDate,
) -> Vec<AvailableSlot> {
    let days = slots::weekdays_in(from, to);
    let candidates = slots::slot_candidates(duration_minutes);

    let mut grouped: BTreeMap<(NaiveDate, NaiveTime, NaiveTime), Vec<RoomInfo>> = BTreeMap::new();

    for (room, bookings) in rooms {
        for &day in &days {
            for &(start, end) in &candidates {
                // moving back onto the original slot is a no-op, not a move
                if day == original_date && start == original_start {
                    continue;
                }
                let clash = bookings.iter().any(|b| {
                    b.event_date == day && slots::overlaps(start, end, b.start_time, b.end_time)
                });
                if !clash {
                    grouped.entry((day, start, end)).or_default().push(room.clone());
                }
            }
        }
    }

    grouped
        .into_iter()
        .map(|((date, start, end), available_rooms)| AvailableSlot {
            date,
            start_time: slots::fmt_time(start),
            end_time: slots::fmt_time(end),
            duration_minutes,
            available_rooms,
        })
        .collect()
}

#[derive(Deserialize, Debug)]
pub struct RescheduleScanQuery {
    pub original_date: Option<String>,
    pub original_start_time: Option<String>,
    pub original_end_time: Option<String>,
    pub duration_minutes: Option<String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
}

/// GET /rooms/available-for-reschedule
pub async fn available_for_reschedule(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(q): Query<RescheduleScanQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let original_date = slots::parse_date(
        "original_date",
        q.original_date
            .as_deref()
            .ok_or_else(|| ApiError::validation("original_date", "is required"))?,
    )?;
    let original_start = slots::parse_time(
        "original_start_time",
        q.original_start_time
            .as_deref()
            .ok_or_else(|| ApiError::validation("original_start_time", "is required"))?,
    )?;
    // parsed for validation; the scan itself only needs date + start
    let _original_end = slots::parse_time(
        "original_end_time",
        q.original_end_time
            .as_deref()
            .ok_or_else(|| ApiError::validation("original_end_time", "is required"))?,
    )?;

    let duration_minutes: i64 = match q.duration_minutes.as_deref() {
        None => 150,
        Some(raw) => raw
            .parse()
            .ok()
            .filter(|d| *d > 0)
            .ok_or_else(|| {
                ApiError::validation("duration_minutes", "must be a positive number of minutes")
            })?,
    };

    let from = match q.from_date.as_deref() {
        Some(raw) => slots::parse_date("from_date", raw)?,
        None => Utc::now().date_naive(),
    };
    let to = match q.to_date.as_deref() {
        Some(raw) => slots::parse_date("to_date", raw)?,
        None => state.config.semester_end,
    };
    if to < from {
        return Err(ApiError::validation("to_date", "must not be before from_date"));
    }

    let rooms = sqlx::query_as::<_, RoomInfo>(
        r#"
        SELECT id AS room_id, name AS room_name, building, floor
        FROM rooms
        WHERE is_active = true
        ORDER BY building, name
        "#,
    )
    .fetch_all(&state.db)
    .await?;

    if rooms.is_empty() {
        return Err(ApiError::NotFound("Active rooms"));
    }

    // One bookings query per room for the whole range, never per slot. A
    // failing room is skipped; the scan stays best-effort.
    let mut prefetched: Vec<(RoomInfo, Vec<Booking>)> = Vec::with_capacity(rooms.len());
    for room in rooms {
        let bookings = sqlx::query_as::<_, Booking>(
            r#"
            SELECT event_date, start_time, end_time
            FROM schedule_events
            WHERE room_id = $1
              AND event_date BETWEEN $2 AND $3
              AND status NOT IN ('cancelled', 'replaced')
            ORDER BY event_date, start_time
            "#,
        )
        .bind(room.room_id)
        .bind(from)
        .bind(to)
        .fetch_all(&state.db)
        .await;

        match bookings {
            Ok(bookings) => prefetched.push((room, bookings)),
            Err(e) => {
                tracing::warn!(room = %room.room_id, error = %e, "skipping room in availability scan");
            }
        }
    }

    let data = scan_rooms(&prefetched, original_date, original_start, duration_minutes, from, to);

    Ok(Json(json!({ "success": true, "data": data })))
}

#[derive(Deserialize, Debug)]
pub struct FreeSlotsQuery {
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub min_capacity: Option<i32>,
}

/// GET /rooms/free-slots: rooms with no overlapping live booking for one
/// fixed slot.
pub async fn free_slots(
    State(state): State<AppState>,
    Query(q): Query<FreeSlotsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let date = slots::parse_date(
        "date",
        q.date.as_deref().ok_or_else(|| ApiError::validation("date", "is required"))?,
    )?;
    let start = slots::parse_time(
        "start_time",
        q.start_time
            .as_deref()
            .ok_or_else(|| ApiError::validation("start_time", "is required"))?,
    )?;
    let end = slots::parse_time(
        "end_time",
        q.end_time
            .as_deref()
            .ok_or_else(|| ApiError::validation("end_time", "is required"))?,
    )?;
    if start >= end {
        return Err(ApiError::validation("start_time", "Start time must be before end time"));
    }

    #[derive(sqlx::FromRow, Serialize)]
    struct FreeRoom {
        id: Uuid,
        name: String,
        capacity: Option<i32>,
        floor: Option<String>,
        building: Option<String>,
        description: Option<String>,
    }

    let rooms = sqlx::query_as::<_, FreeRoom>(
        r#"
        SELECT r.id, r.name, r.capacity, r.floor, r.building, r.description
        FROM rooms r
        WHERE r.is_active = true
          AND ($4::int IS NULL OR r.capacity >= $4)
          AND NOT EXISTS (
              SELECT 1 FROM schedule_events se
              WHERE se.room_id = r.id
                AND se.event_date = $1
                AND se.status NOT IN ('cancelled', 'replaced')
                AND se.start_time < $3
                AND se.end_time > $2
          )
        ORDER BY r.capacity DESC, r.name
        "#,
    )
    .bind(date)
    .bind(start)
    .bind(end)
    .bind(q.min_capacity)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(json!({
        "date": date,
        "time_range": { "start_time": slots::fmt_time(start), "end_time": slots::fmt_time(end) },
        "available_rooms": rooms,
        "total_available": rooms.len(),
    })))
}

#[derive(Deserialize, Debug)]
pub struct RoomStatusQuery {
    pub date: Option<String>,
    pub time: Option<String>,
}

/// GET /rooms/status: per-room occupancy at one instant.
pub async fn room_status(
    State(state): State<AppState>,
    Query(q): Query<RoomStatusQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let date = slots::parse_date(
        "date",
        q.date.as_deref().ok_or_else(|| ApiError::validation("date", "is required"))?,
    )?;
    let time = slots::parse_time(
        "time",
        q.time.as_deref().ok_or_else(|| ApiError::validation("time", "is required"))?,
    )?;

    #[derive(sqlx::FromRow)]
    struct StatusRow {
        id: Uuid,
        name: String,
        capacity: Option<i32>,
        floor: Option<String>,
        building: Option<String>,
        description: Option<String>,
        course_id: Option<Uuid>,
        course_code: Option<String>,
        course_name: Option<String>,
        lecturer_name: Option<String>,
        start_time: Option<NaiveTime>,
        end_time: Option<NaiveTime>,
    }

    let rows = sqlx::query_as::<_, StatusRow>(
        r#"
        SELECT r.id, r.name, r.capacity, r.floor, r.building, r.description,
               se.course_id, c.course_code, c.name AS course_name,
               u.name AS lecturer_name, se.start_time, se.end_time
        FROM rooms r
        LEFT JOIN schedule_events se ON se.room_id = r.id
            AND se.event_date = $1
            AND se.status NOT IN ('cancelled', 'replaced')
            AND se.start_time <= $2
            AND se.end_time > $2
        LEFT JOIN courses c ON se.course_id = c.id
        LEFT JOIN users u ON c.lecturer_id = u.id
        WHERE r.is_active = true
        ORDER BY r.name
        "#,
    )
    .bind(date)
    .bind(time)
    .fetch_all(&state.db)
    .await?;

    let rooms: Vec<_> = rows
        .iter()
        .map(|r| {
            let occupied = r.course_id.is_some();
            json!({
                "id": r.id,
                "name": r.name,
                "capacity": r.capacity,
                "floor": r.floor,
                "building": r.building,
                "description": r.description,
                "status": if occupied { "occupied" } else { "available" },
                "current_event": occupied.then(|| json!({
                    "course_id": r.course_id,
                    "course_code": r.course_code,
                    "course_name": r.course_name,
                    "lecturer_name": r.lecturer_name,
                    "start_time": r.start_time.map(slots::fmt_time),
                    "end_time": r.end_time.map(slots::fmt_time),
                })),
            })
        })
        .collect();

    let occupied = rooms
        .iter()
        .filter(|r| r["status"] == "occupied")
        .count();

    Ok(Json(json!({
        "date": date,
        "time": slots::fmt_time(time),
        "rooms": rooms,
        "summary": {
            "total_rooms": rooms.len(),
            "occupied_rooms": occupied,
            "available_rooms": rooms.len() - occupied,
        },
    })))
}

#[derive(Deserialize, Debug)]
pub struct RoomScheduleQuery {
    pub date: Option<String>,
}

/// GET /rooms/:id/schedule: one room's non-cancelled events for a day.
pub async fn room_schedule(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Query(q): Query<RoomScheduleQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let date = slots::parse_date(
        "date",
        q.date.as_deref().ok_or_else(|| ApiError::validation("date", "is required"))?,
    )?;

    let room = sqlx::query_as::<_, Room>(
        r#"
        SELECT id, name, capacity, floor, building, description, is_active,
               created_at, updated_at
        FROM rooms
        WHERE id = $1 AND is_active = true
        "#,
    )
    .bind(room_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(ApiError::NotFound("Room"))?;

    #[derive(sqlx::FromRow)]
    struct EventRow {
        id: Uuid,
        course_id: Uuid,
        course_code: String,
        course_name: String,
        lecturer_name: Option<String>,
        komting_name: Option<String>,
        changed_by_name: Option<String>,
        start_time: NaiveTime,
        end_time: NaiveTime,
        status: crate::models::EventStatus,
        change_reason: Option<String>,
        created_at: chrono::DateTime<Utc>,
    }

    let events = sqlx::query_as::<_, EventRow>(
        r#"
        SELECT se.id, c.id AS course_id, c.course_code, c.name AS course_name,
               l.name AS lecturer_name, k.name AS komting_name, u.name AS changed_by_name,
               se.start_time, se.end_time, se.status, se.change_reason, se.created_at
        FROM schedule_events se
        JOIN courses c ON se.course_id = c.id
        LEFT JOIN users l ON c.lecturer_id = l.id
        LEFT JOIN users k ON c.komting_id = k.id
        LEFT JOIN users u ON se.changed_by = u.id
        WHERE se.room_id = $1
          AND se.event_date = $2
          AND se.status <> 'cancelled'
        ORDER BY se.start_time
        "#,
    )
    .bind(room_id)
    .bind(date)
    .fetch_all(&state.db)
    .await?;

    let events: Vec<_> = events
        .iter()
        .map(|e| {
            json!({
                "id": e.id,
                "course": { "id": e.course_id, "code": e.course_code, "name": e.course_name },
                "lecturer_name": e.lecturer_name,
                "komting_name": e.komting_name,
                "time": format!("{} - {}", slots::fmt_time(e.start_time), slots::fmt_time(e.end_time)),
                "start_time": slots::fmt_time(e.start_time),
                "end_time": slots::fmt_time(e.end_time),
                "status": e.status,
                "change_reason": e.change_reason,
                "changed_by_name": e.changed_by_name,
                "created_at": e.created_at,
            })
        })
        .collect();

    Ok(Json(json!({
        "room": room,
        "date": date,
        "events": events,
        "total_events": events.len(),
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

    fn room(name: &str) -> RoomInfo {
        RoomInfo {
            room_id: Uuid::new_v4(),
            room_name: name.into(),
            building: Some("D".into()),
            floor: Some("1".into()),
        }
    }

    fn booking(date: &str, start: NaiveTime, end: NaiveTime) -> Booking {
        Booking {
            event_date: d(date),
            start_time: start,
            end_time: end,
        }
    }

    #[test]
    fn empty_calendar_offers_every_slot_in_every_room() {
        let rooms = vec![(room("D-103"), vec![]), (room("D-104"), vec![])];
        // Mon..Fri week, 150 minutes: 18 aligned starts per day, minus the
        // skipped original slot
        let slots = scan_rooms(&rooms, d("2025-11-12"), t(8, 0), 150, d("2025-11-10"), d("2025-11-16"));

        assert_eq!(slots.len(), 5 * 18 - 1);
        assert!(slots.iter().all(|s| s.available_rooms.len() == 2));
        assert!(!slots
            .iter()
            .any(|s| s.date == d("2025-11-12") && s.start_time == "08:00"));
    }

    #[test]
    fn booked_room_drops_out_of_overlapping_slots_only() {
        let busy = room("D-103");
        let free = room("D-104");
        let rooms = vec![
            (busy.clone(), vec![booking("2025-11-12", t(8, 0), t(10, 30))]),
            (free.clone(), vec![]),
        ];
        let slots = scan_rooms(&rooms, d("2025-01-05"), t(7, 0), 150, d("2025-11-12"), d("2025-11-12"));

        // 09:00-11:30 overlaps the 08:00-10:30 booking
        let nine = slots
            .iter()
            .find(|s| s.start_time == "09:00")
            .expect("slot exists");
        assert_eq!(nine.available_rooms, vec![free.clone()]);

        // 10:30-13:00 is back-to-back with the booking and stays open
        let half_ten = slots
            .iter()
            .find(|s| s.start_time == "10:30")
            .expect("slot exists");
        assert_eq!(half_ten.available_rooms.len(), 2);
    }

    #[test]
    fn weekend_days_are_never_offered() {
        let rooms = vec![(room("D-103"), vec![])];
        let slots = scan_rooms(&rooms, d("2025-01-05"), t(7, 0), 150, d("2025-11-15"), d("2025-11-16"));
        assert!(slots.is_empty());
    }

    #[test]
    fn scan_is_deterministic_for_unchanged_input() {
        let rooms = vec![(room("D-103"), vec![booking("2025-11-12", t(8, 0), t(10, 30))])];
        let a = scan_rooms(&rooms, d("2025-11-12"), t(8, 0), 90, d("2025-11-10"), d("2025-11-14"));
        let b = scan_rooms(&rooms, d("2025-11-12"), t(8, 0), 90, d("2025-11-10"), d("2025-11-14"));
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.date, y.date);
            assert_eq!(x.start_time, y.start_time);
            assert_eq!(x.available_rooms, y.available_rooms);
        }
    }
}
