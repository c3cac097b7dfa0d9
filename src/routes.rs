use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;

use crate::availability;
use crate::config::AppConfig;
use crate::db::Db;
use crate::reschedule;
use crate::schedule;
use crate::subscriptions;

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: Arc<AppConfig>,
}

pub fn router(db: Db, config: AppConfig) -> Router {
    let state = AppState {
        db,
        config: Arc::new(config),
    };

    Router::new()
        // schedule projection + mutation
        .route("/schedule/default", get(schedule::default_schedule))
        .route("/schedule/real", get(schedule::real_schedule))
        .route("/schedule/update", post(reschedule::update_schedule))
        .route("/schedule/history/:course_id", get(schedule::schedule_history))
        // subscriptions + subscribed templates
        .route("/courses/schedules/my", get(schedule::my_course_schedules))
        .route("/courses/subscribe", post(subscriptions::subscribe))
        .route("/courses/unsubscribe", delete(subscriptions::unsubscribe))
        .route("/courses/my/subscriptions", get(subscriptions::my_subscriptions))
        // room availability
        .route(
            "/rooms/available-for-reschedule",
            get(availability::available_for_reschedule),
        )
        .route("/rooms/free-slots", get(availability::free_slots))
        .route("/rooms/status", get(availability::room_status))
        .route("/rooms/:id/schedule", get(availability::room_schedule))
        .with_state(state)
}
