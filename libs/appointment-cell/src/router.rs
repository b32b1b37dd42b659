// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::handlers;
use crate::services::engine::SchedulingEngine;

pub fn appointment_routes(engine: Arc<SchedulingEngine>) -> Router {
    Router::new()
        // Slot lifecycle
        .route("/slots", post(handlers::create_slots))
        .route("/slots/available", get(handlers::available_slots))
        .route("/slots/professional/{professional_id}", get(handlers::professional_slots))
        .route(
            "/slots/professional/{professional_id}/date/{date}",
            delete(handlers::delete_slots_on_date),
        )
        .route("/slots/{slot_id}", delete(handlers::delete_slot))

        // Reservations
        .route("/reservations", post(handlers::book_reservation))
        .route("/reservations/follow-up", post(handlers::follow_up))
        .route("/reservations/{reservation_id}", delete(handlers::cancel_reservation))
        .route(
            "/reservations/{reservation_id}/assistance",
            post(handlers::record_assistance),
        )

        // Listings
        .route("/reservations/patient/{patient_id}", get(handlers::patient_reservations))
        .route(
            "/reservations/patient/{patient_id}/psychology-history",
            get(handlers::psychology_history),
        )
        .route(
            "/reservations/professional/{professional_id}",
            get(handlers::professional_reservations),
        )

        // Live availability feed
        .route("/events", get(handlers::scheduling_events))
        .with_state(engine)
}
