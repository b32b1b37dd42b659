// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use chrono::NaiveDate;
use futures::stream::{self, Stream};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;
use uuid::Uuid;

use shared_models::error::AppError;

use crate::models::{
    AppointmentType, BookReservationRequest, CreateSlotsRequest, FollowUpRequest, PageRequest,
    RecordAssistanceRequest, ReservationFilter, ReservationListStatus,
};
use crate::services::engine::SchedulingEngine;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct AvailableSlotsQuery {
    pub appointment_type: String,
    pub patient_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ProfessionalReservationsQuery {
    pub status: Option<ReservationListStatus>,
    pub date: Option<NaiveDate>,
    pub page: Option<usize>,
    pub size: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub size: Option<usize>,
}

// ==============================================================================
// SLOT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_slots(
    State(engine): State<Arc<SchedulingEngine>>,
    Json(request): Json<CreateSlotsRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let slots = engine
        .create_slots(request.professional_id, request.slots)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "slots": slots,
            "total": slots.len(),
        })),
    ))
}

#[axum::debug_handler]
pub async fn professional_slots(
    State(engine): State<Arc<SchedulingEngine>>,
    Path(professional_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let slots = engine.professional_slots(professional_id).await?;

    Ok(Json(json!({
        "slots": slots,
        "total": slots.len(),
    })))
}

#[axum::debug_handler]
pub async fn available_slots(
    State(engine): State<Arc<SchedulingEngine>>,
    Query(query): Query<AvailableSlotsQuery>,
) -> Result<Json<Value>, AppError> {
    let appointment_type = query.appointment_type.parse::<AppointmentType>()?;
    let slots = engine
        .available_slots(appointment_type, query.patient_id)
        .await?;

    Ok(Json(json!({
        "appointment_type": appointment_type,
        "slots": slots,
        "total": slots.len(),
    })))
}

#[axum::debug_handler]
pub async fn delete_slot(
    State(engine): State<Arc<SchedulingEngine>>,
    Path(slot_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    engine.delete_slot(slot_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn delete_slots_on_date(
    State(engine): State<Arc<SchedulingEngine>>,
    Path((professional_id, date)): Path<(Uuid, NaiveDate)>,
) -> Result<Json<Value>, AppError> {
    let deleted = engine.delete_slots_on_date(professional_id, date).await?;

    Ok(Json(json!({
        "professional_id": professional_id,
        "date": date,
        "deleted": deleted,
    })))
}

// ==============================================================================
// RESERVATION HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_reservation(
    State(engine): State<Arc<SchedulingEngine>>,
    Json(request): Json<BookReservationRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let reservation = engine.book_reservation(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "reservation": reservation,
            "message": "Reservation created",
        })),
    ))
}

#[axum::debug_handler]
pub async fn cancel_reservation(
    State(engine): State<Arc<SchedulingEngine>>,
    Path(reservation_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let reservation = engine.cancel_reservation(reservation_id).await?;

    Ok(Json(json!({
        "reservation": reservation,
        "message": "Reservation cancelled, slot released",
    })))
}

#[axum::debug_handler]
pub async fn record_assistance(
    State(engine): State<Arc<SchedulingEngine>>,
    Path(reservation_id): Path<Uuid>,
    Json(request): Json<RecordAssistanceRequest>,
) -> Result<Json<Value>, AppError> {
    let reservation = engine
        .record_assistance(reservation_id, request.attended)
        .await?;

    Ok(Json(json!({
        "reservation": reservation,
        "state": reservation.state(),
    })))
}

#[axum::debug_handler]
pub async fn follow_up(
    State(engine): State<Arc<SchedulingEngine>>,
    Json(request): Json<FollowUpRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let outcome = engine.follow_up(request).await?;

    Ok((StatusCode::CREATED, Json(json!(outcome))))
}

#[axum::debug_handler]
pub async fn patient_reservations(
    State(engine): State<Arc<SchedulingEngine>>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let reservations = engine.patient_reservations(patient_id).await?;

    Ok(Json(json!({
        "reservations": reservations,
        "total": reservations.len(),
    })))
}

#[axum::debug_handler]
pub async fn professional_reservations(
    State(engine): State<Arc<SchedulingEngine>>,
    Path(professional_id): Path<Uuid>,
    Query(query): Query<ProfessionalReservationsQuery>,
) -> Result<Json<Value>, AppError> {
    let filter = ReservationFilter {
        professional_id,
        status: query.status.unwrap_or_default(),
        date: query.date,
    };
    let page = engine
        .professional_reservations(filter, PageRequest::new(query.page, query.size))
        .await?;

    Ok(Json(json!(page)))
}

#[axum::debug_handler]
pub async fn psychology_history(
    State(engine): State<Arc<SchedulingEngine>>,
    Path(patient_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, AppError> {
    let page = engine
        .psychology_history(patient_id, PageRequest::new(query.page, query.size))
        .await?;

    Ok(Json(json!(page)))
}

// ==============================================================================
// LIVE EVENTS
// ==============================================================================

pub async fn scheduling_events(
    State(engine): State<Arc<SchedulingEngine>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let receiver = engine.events().subscribe();

    let events = stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let sse_event = Event::default().event("scheduling").json_data(&event);
                    return Some((sse_event, receiver));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event subscriber lagged, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
