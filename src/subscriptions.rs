//! Course subscription self-service. Subscriptions drive which courses the
//! projector includes for a student.

use axum::extract::State;
use axum::Json;
use http::StatusCode;
use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::models::SubscriptionRequest;
use crate::routes::AppState;

/// POST /courses/subscribe
pub async fn subscribe(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<SubscriptionRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let course_name: String = sqlx::query_scalar(
        "SELECT name FROM courses WHERE id = $1 AND is_active = true",
    )
    .bind(req.course_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(ApiError::NotFound("Course"))?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO course_subscriptions (user_id, course_id)
        VALUES ($1, $2)
        ON CONFLICT (user_id, course_id) DO NOTHING
        "#,
    )
    .bind(user.id)
    .bind(req.course_id)
    .execute(&state.db)
    .await?;

    if inserted.rows_affected() == 0 {
        return Err(ApiError::Duplicate {
            error: "Already subscribed",
            details: "You are already subscribed to this course".into(),
        });
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Successfully subscribed to course",
            "subscription": {
                "user_id": user.id,
                "course_id": req.course_id,
                "course_name": course_name,
            },
        })),
    ))
}

/// DELETE /courses/unsubscribe
pub async fn unsubscribe(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<SubscriptionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = sqlx::query(
        "DELETE FROM course_subscriptions WHERE user_id = $1 AND course_id = $2",
    )
    .bind(user.id)
    .bind(req.course_id)
    .execute(&state.db)
    .await?;

    if deleted.rows_affected() == 0 {
        return Err(ApiError::NotFound("Subscription"));
    }

    Ok(Json(json!({ "message": "Successfully unsubscribed from course" })))
}

/// GET /courses/my/subscriptions
pub async fn my_subscriptions(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    #[derive(sqlx::FromRow, serde::Serialize)]
    struct Row {
        course_id: Uuid,
        course_code: String,
        name: String,
        subscribed_at: DateTime<Utc>,
    }

    let rows = sqlx::query_as::<_, Row>(
        r#"
        SELECT c.id AS course_id, c.course_code, c.name, sub.subscribed_at
        FROM course_subscriptions sub
        JOIN courses c ON sub.course_id = c.id
        WHERE sub.user_id = $1
        ORDER BY c.course_code
        "#,
    )
    .bind(user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(json!({ "subscriptions": rows, "total": rows.len() })))
}
