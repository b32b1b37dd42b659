// libs/appointment-cell/src/services/engine.rs
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use deferred_task_cell::{Clock, DeferredTaskManager, TaskKey};
use shared_models::user::{ContactDetails, UserAccount};

use crate::error::SchedulingError;
use crate::models::{
    truncate_to_minute, AppointmentType, AvailabilityWriter, BookReservationRequest,
    FollowUpOutcome, FollowUpRequest, Page, PageRequest, Reservation, ReservationFilter,
    SchedulingEvent, SchedulingRules, Slot, SlotCandidate,
};
use crate::services::availability::AvailabilityValidator;
use crate::services::events::EventBroadcaster;
use crate::services::lifecycle::{ReservationAction, ReservationLifecycle};
use crate::services::locks::KeyedLocks;
use crate::services::notifier::{reminder_body, Notifier, REMINDER_SUBJECT};
use crate::services::quota::QuotaValidator;
use crate::services::roles::{RoleResolver, RoleTable};
use crate::services::store::{ReservationStore, SlotStore};
use crate::services::users::UserDirectory;

/// Orchestrates slots, reservations and their deferred side effects.
///
/// Every validate-then-write sequence runs under the lock of the identity it
/// guards: the professional for slot placement, the patient for the
/// one-pending-reservation rule. Patient locks are always taken before
/// professional locks.
pub struct SchedulingEngine {
    slots: Arc<dyn SlotStore>,
    reservations: Arc<dyn ReservationStore>,
    users: Arc<dyn UserDirectory>,
    notifier: Arc<dyn Notifier>,
    roles: Arc<dyn RoleResolver>,
    tasks: DeferredTaskManager,
    clock: Arc<dyn Clock>,
    events: EventBroadcaster,
    availability: Arc<AvailabilityValidator>,
    quota: Arc<QuotaValidator>,
    lifecycle: ReservationLifecycle,
    rules: Arc<SchedulingRules>,
    professional_locks: Arc<KeyedLocks>,
    patient_locks: Arc<KeyedLocks>,
}

impl SchedulingEngine {
    pub fn new(
        slots: Arc<dyn SlotStore>,
        reservations: Arc<dyn ReservationStore>,
        users: Arc<dyn UserDirectory>,
        notifier: Arc<dyn Notifier>,
        tasks: DeferredTaskManager,
    ) -> Self {
        let rules = SchedulingRules::default();
        let clock = tasks.clock();

        Self {
            availability: Arc::new(AvailabilityValidator::new(
                Arc::clone(&slots),
                rules.slot_buffer,
            )),
            quota: Arc::new(QuotaValidator::new(
                Arc::clone(&reservations),
                rules.psychology_quota,
            )),
            slots,
            reservations,
            users,
            notifier,
            roles: Arc::new(RoleTable),
            tasks,
            clock,
            events: EventBroadcaster::new(),
            lifecycle: ReservationLifecycle::new(),
            rules: Arc::new(rules),
            professional_locks: Arc::new(KeyedLocks::new()),
            patient_locks: Arc::new(KeyedLocks::new()),
        }
    }

    pub fn with_rules(mut self, rules: SchedulingRules) -> Self {
        self.availability = Arc::new(AvailabilityValidator::new(
            Arc::clone(&self.slots),
            rules.slot_buffer,
        ));
        self.quota = Arc::new(QuotaValidator::new(
            Arc::clone(&self.reservations),
            rules.psychology_quota,
        ));
        self.rules = Arc::new(rules);
        self
    }

    pub fn with_role_resolver(mut self, roles: Arc<dyn RoleResolver>) -> Self {
        self.roles = roles;
        self
    }

    pub fn with_events(mut self, events: EventBroadcaster) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    pub fn tasks(&self) -> &DeferredTaskManager {
        &self.tasks
    }

    pub fn rules(&self) -> &SchedulingRules {
        &self.rules
    }

    fn clone_for_task(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
            reservations: Arc::clone(&self.reservations),
            users: Arc::clone(&self.users),
            notifier: Arc::clone(&self.notifier),
            roles: Arc::clone(&self.roles),
            tasks: self.tasks.clone(),
            clock: Arc::clone(&self.clock),
            events: self.events.clone(),
            availability: Arc::clone(&self.availability),
            quota: Arc::clone(&self.quota),
            lifecycle: self.lifecycle,
            rules: Arc::clone(&self.rules),
            professional_locks: Arc::clone(&self.professional_locks),
            patient_locks: Arc::clone(&self.patient_locks),
        }
    }

    // ==========================================================================
    // SLOT LIFECYCLE
    // ==========================================================================

    #[instrument(skip(self, candidates), fields(count = candidates.len()))]
    pub async fn create_slots(
        &self,
        professional_id: Uuid,
        candidates: Vec<SlotCandidate>,
    ) -> Result<Vec<Slot>, SchedulingError> {
        let professional = self.load_user(professional_id).await?;
        if self.roles.offered_type(&professional).is_none() {
            return Err(SchedulingError::NotAProfessional(professional_id));
        }

        let parsed = candidates
            .iter()
            .map(|candidate| {
                let appointment_type = candidate.appointment_type.parse::<AppointmentType>()?;
                Ok((truncate_to_minute(candidate.date_time), appointment_type))
            })
            .collect::<Result<Vec<_>, SchedulingError>>()?;

        let _guard = self.professional_locks.lock(professional_id).await;

        let times: Vec<DateTime<Utc>> = parsed.iter().map(|(date_time, _)| *date_time).collect();
        self.availability
            .validate_batch(professional_id, &times)
            .await?;

        let now = self.clock.now();
        let created: Vec<Slot> = parsed
            .into_iter()
            .map(|(date_time, appointment_type)| {
                Slot::new(
                    professional_id,
                    appointment_type,
                    date_time,
                    true,
                    AvailabilityWriter::SlotCreation,
                    now,
                )
            })
            .collect();

        self.slots.insert_many(&created).await?;

        for slot in &created {
            self.arm_slot_expiry(slot.id, slot.date_time).await;
        }

        info!(
            "Created {} slots for professional {}",
            created.len(),
            professional_id
        );
        self.events.publish(SchedulingEvent::SlotsCreated {
            professional_id,
            slot_ids: created.iter().map(|slot| slot.id).collect(),
        });

        Ok(created)
    }

    /// Deletes a slot nobody has booked.
    #[instrument(skip(self))]
    pub async fn delete_slot(&self, slot_id: Uuid) -> Result<(), SchedulingError> {
        let slot = self
            .slots
            .get(slot_id)
            .await?
            .ok_or(SchedulingError::SlotNotFound(slot_id))?;

        let _guard = self.professional_locks.lock(slot.professional_id).await;

        if !self.remove_available_slot(slot_id, AvailabilityWriter::Deletion).await? {
            return Err(SchedulingError::SlotUnavailable(slot_id));
        }

        info!("Deleted slot {}", slot_id);
        Ok(())
    }

    /// Deletes the professional's still-available slots on `date`.
    #[instrument(skip(self))]
    pub async fn delete_slots_on_date(
        &self,
        professional_id: Uuid,
        date: NaiveDate,
    ) -> Result<usize, SchedulingError> {
        let _guard = self.professional_locks.lock(professional_id).await;

        let candidates: Vec<Slot> = self
            .slots
            .list_for_professional(professional_id)
            .await?
            .into_iter()
            .filter(|slot| slot.available && slot.date_time.date_naive() == date)
            .collect();

        let mut removed = 0;
        for slot in candidates {
            if self
                .remove_available_slot(slot.id, AvailabilityWriter::Deletion)
                .await?
            {
                removed += 1;
            }
        }

        info!(
            "Deleted {} available slots of professional {} on {}",
            removed, professional_id, date
        );
        Ok(removed)
    }

    pub async fn professional_slots(
        &self,
        professional_id: Uuid,
    ) -> Result<Vec<Slot>, SchedulingError> {
        Ok(self.slots.list_for_professional(professional_id).await?)
    }

    /// Upcoming available slots of a type.
    ///
    /// For psychology, a patient who has already been seen only gets slots of
    /// the professional that saw them last.
    pub async fn available_slots(
        &self,
        appointment_type: AppointmentType,
        patient_id: Option<Uuid>,
    ) -> Result<Vec<Slot>, SchedulingError> {
        let now = self.clock.now();
        let mut slots: Vec<Slot> = self
            .slots
            .list_available(appointment_type)
            .await?
            .into_iter()
            .filter(|slot| slot.date_time > now)
            .collect();

        if let (AppointmentType::Psychology, Some(patient_id)) = (appointment_type, patient_id) {
            if let Some(professional_id) = self.continuity_professional(patient_id).await? {
                debug!(
                    "Restricting psychology slots of patient {} to professional {}",
                    patient_id, professional_id
                );
                slots.retain(|slot| slot.professional_id == professional_id);
            }
        }

        Ok(slots)
    }

    async fn continuity_professional(
        &self,
        patient_id: Uuid,
    ) -> Result<Option<Uuid>, SchedulingError> {
        let history = self
            .reservations
            .list_recorded(patient_id, AppointmentType::Psychology)
            .await?;
        Ok(history
            .into_iter()
            .find(|reservation| reservation.assistant == Some(true))
            .map(|reservation| reservation.professional_id))
    }

    /// Claim-then-delete, so a slot booked concurrently is never removed.
    async fn remove_available_slot(
        &self,
        slot_id: Uuid,
        writer: AvailabilityWriter,
    ) -> Result<bool, SchedulingError> {
        if !self.slots.claim(slot_id, writer, self.clock.now()).await? {
            return Ok(false);
        }

        self.slots.delete(slot_id).await?;
        self.tasks.cancel(&TaskKey::slot_expiry(slot_id)).await;
        self.events.publish(SchedulingEvent::SlotDeleted { slot_id });
        Ok(true)
    }

    // ==========================================================================
    // RESERVATIONS
    // ==========================================================================

    #[instrument(skip(self, request), fields(patient_id = %request.patient_id, slot_id = %request.slot_id))]
    pub async fn book_reservation(
        &self,
        request: BookReservationRequest,
    ) -> Result<Reservation, SchedulingError> {
        let patient = self.load_user(request.patient_id).await?;
        let slot = self
            .slots
            .get(request.slot_id)
            .await?
            .ok_or(SchedulingError::SlotNotFound(request.slot_id))?;

        let _patient_guard = self.patient_locks.lock(patient.id).await;

        let now = self.clock.now();
        self.validate_booking(&patient, slot.appointment_type, slot.date_time, now, true)
            .await?;

        if !self
            .slots
            .claim(slot.id, AvailabilityWriter::Booking, now)
            .await?
        {
            info!("Slot {} was taken before patient {} could claim it", slot.id, patient.id);
            return Err(SchedulingError::SlotUnavailable(slot.id));
        }

        let reservation = Reservation::for_slot(patient.id, &slot, now);
        if let Err(e) = self.reservations.insert(&reservation).await {
            warn!("Reservation insert failed, releasing slot {}: {}", slot.id, e);
            if let Err(release_error) = self
                .slots
                .release(slot.id, AvailabilityWriter::Booking, self.clock.now())
                .await
            {
                warn!("Could not release slot {}: {}", slot.id, release_error);
            }
            return Err(e.into());
        }

        // The reservation stands even if the profile update fails.
        let details = request.contact_details();
        if !details.is_empty() {
            if let Err(e) = self.save_contact_details(patient.id, &details).await {
                warn!("Could not store contact details of patient {}: {}", patient.id, e);
            }
        }

        self.arm_reservation_tasks(&reservation).await;

        info!(
            "Patient {} booked {} slot {} at {}",
            patient.id, slot.appointment_type, slot.id, slot.date_time
        );
        self.events.publish(SchedulingEvent::SlotBooked {
            slot_id: slot.id,
            reservation_id: reservation.id,
        });

        Ok(reservation)
    }

    #[instrument(skip(self))]
    pub async fn cancel_reservation(
        &self,
        reservation_id: Uuid,
    ) -> Result<Reservation, SchedulingError> {
        let patient_id = self.load_reservation(reservation_id).await?.patient_id;
        let _patient_guard = self.patient_locks.lock(patient_id).await;

        let reservation = self.load_reservation(reservation_id).await?;
        self.lifecycle
            .validate_action(reservation.state(), ReservationAction::Cancel)?;

        // Removing the reservation first means a store failure leaves slot and
        // tasks as they were.
        if !self.reservations.delete(reservation_id).await? {
            return Err(SchedulingError::ReservationNotFound(reservation_id));
        }

        self.tasks
            .cancel(&TaskKey::reservation_reminder(reservation_id))
            .await;
        self.tasks
            .cancel(&TaskKey::reservation_transition(reservation_id))
            .await;

        let slot_id = reservation.slot_id;
        let now = self.clock.now();
        if self
            .slots
            .release(slot_id, AvailabilityWriter::Cancellation, now)
            .await?
        {
            // A slot whose time already passed stays released rather than expiring.
            if reservation.date_time > now {
                self.arm_slot_expiry(slot_id, reservation.date_time).await;
            }
            self.events.publish(SchedulingEvent::SlotReleased { slot_id });
        } else {
            warn!("Slot {} of reservation {} no longer exists", slot_id, reservation_id);
        }

        info!("Cancelled reservation {}", reservation_id);
        self.events.publish(SchedulingEvent::ReservationCancelled {
            reservation_id,
            slot_id,
        });

        Ok(reservation)
    }

    #[instrument(skip(self))]
    pub async fn record_assistance(
        &self,
        reservation_id: Uuid,
        attended: bool,
    ) -> Result<Reservation, SchedulingError> {
        let patient_id = self.load_reservation(reservation_id).await?.patient_id;
        let _patient_guard = self.patient_locks.lock(patient_id).await;

        let reservation = self.load_reservation(reservation_id).await?;
        self.lifecycle
            .validate_action(reservation.state(), ReservationAction::RecordAssistance)?;

        let updated = self
            .reservations
            .record_assistance(reservation_id, attended)
            .await?
            .ok_or(SchedulingError::ReservationNotFound(reservation_id))?;

        self.tasks
            .cancel(&TaskKey::reservation_transition(reservation_id))
            .await;

        info!(
            "Recorded assistance for reservation {}: attended = {}",
            reservation_id, attended
        );
        self.events.publish(SchedulingEvent::AssistanceRecorded {
            reservation_id,
            attended,
        });

        Ok(updated)
    }

    /// Books a new appointment directly from a professional's agenda.
    ///
    /// The slot is created already taken and never offered to other patients.
    #[instrument(skip(self, request), fields(patient_id = %request.patient_id, professional_id = %request.professional_id))]
    pub async fn follow_up(
        &self,
        request: FollowUpRequest,
    ) -> Result<FollowUpOutcome, SchedulingError> {
        let professional = self.load_user(request.professional_id).await?;
        let appointment_type = self
            .roles
            .offered_type(&professional)
            .ok_or(SchedulingError::NotAProfessional(professional.id))?;
        let patient = self.load_user(request.patient_id).await?;
        let date_time = truncate_to_minute(request.date_time);

        let _patient_guard = self.patient_locks.lock(patient.id).await;
        let _professional_guard = self.professional_locks.lock(professional.id).await;

        let now = self.clock.now();
        self.validate_booking(&patient, appointment_type, date_time, now, false)
            .await?;
        self.availability
            .validate_slot_creation(professional.id, date_time)
            .await?;

        let slot = Slot::new(
            professional.id,
            appointment_type,
            date_time,
            false,
            AvailabilityWriter::FollowUp,
            now,
        );
        self.slots.insert_many(std::slice::from_ref(&slot)).await?;

        let reservation = Reservation::for_slot(patient.id, &slot, now);
        if let Err(e) = self.reservations.insert(&reservation).await {
            warn!("Follow-up reservation insert failed, removing slot {}: {}", slot.id, e);
            if let Err(delete_error) = self.slots.delete(slot.id).await {
                warn!("Could not remove follow-up slot {}: {}", slot.id, delete_error);
            }
            return Err(e.into());
        }

        self.arm_reservation_tasks(&reservation).await;

        info!(
            "Professional {} scheduled a {} follow-up for patient {} at {}",
            professional.id, appointment_type, patient.id, date_time
        );
        self.events.publish(SchedulingEvent::SlotBooked {
            slot_id: slot.id,
            reservation_id: reservation.id,
        });

        Ok(FollowUpOutcome { slot, reservation })
    }

    pub async fn patient_reservations(
        &self,
        patient_id: Uuid,
    ) -> Result<Vec<Reservation>, SchedulingError> {
        Ok(self.reservations.list_for_patient(patient_id).await?)
    }

    pub async fn professional_reservations(
        &self,
        filter: ReservationFilter,
        page: PageRequest,
    ) -> Result<Page<Reservation>, SchedulingError> {
        let reservations = self.reservations.list_for_professional(&filter).await?;
        Ok(Page::from_vec(reservations, page))
    }

    pub async fn psychology_history(
        &self,
        patient_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<Reservation>, SchedulingError> {
        let history = self
            .reservations
            .list_recorded(patient_id, AppointmentType::Psychology)
            .await?;
        Ok(Page::from_vec(history, page))
    }

    // ==========================================================================
    // VALIDATION
    // ==========================================================================

    /// Rules shared by patient bookings and follow-ups, checked in a fixed order
    /// so callers always see the same error for the same situation.
    async fn validate_booking(
        &self,
        patient: &UserAccount,
        appointment_type: AppointmentType,
        date_time: DateTime<Utc>,
        now: DateTime<Utc>,
        reject_external: bool,
    ) -> Result<(), SchedulingError> {
        if self
            .reservations
            .has_pending(patient.id, appointment_type)
            .await?
        {
            return Err(SchedulingError::HasPendingAppointment {
                patient_id: patient.id,
                appointment_type,
            });
        }

        self.quota
            .check_quota(patient.id, appointment_type, now)
            .await?;

        if date_time <= now {
            return Err(SchedulingError::DateInPast(date_time));
        }

        if date_time < now + self.rules.min_booking_lead {
            return Err(SchedulingError::TooSoon {
                date_time,
                min_lead_minutes: self.rules.min_booking_lead.num_minutes(),
            });
        }

        if reject_external && self.roles.is_external(patient) {
            return Err(SchedulingError::ExternalNotAllowed(patient.id));
        }

        Ok(())
    }

    async fn load_user(&self, user_id: Uuid) -> Result<UserAccount, SchedulingError> {
        self.users
            .get_user(user_id)
            .await?
            .ok_or(SchedulingError::UserNotFound(user_id))
    }

    async fn load_reservation(&self, reservation_id: Uuid) -> Result<Reservation, SchedulingError> {
        self.reservations
            .get(reservation_id)
            .await?
            .ok_or(SchedulingError::ReservationNotFound(reservation_id))
    }

    async fn save_contact_details(
        &self,
        user_id: Uuid,
        details: &ContactDetails,
    ) -> Result<(), SchedulingError> {
        self.users.update_contact_details(user_id, details).await?;
        debug!("Stored contact details supplied by patient {}", user_id);
        Ok(())
    }

    // ==========================================================================
    // DEFERRED ACTIONS
    // ==========================================================================

    async fn arm<F>(&self, key: TaskKey, fire_at: DateTime<Utc>, task: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        if let Err(e) = self.tasks.schedule(key.clone(), fire_at, task).await {
            warn!("Could not schedule {}: {}", key, e);
        }
    }

    async fn arm_slot_expiry(&self, slot_id: Uuid, fire_at: DateTime<Utc>) {
        let engine = self.clone_for_task();
        self.arm(TaskKey::slot_expiry(slot_id), fire_at, async move {
            engine.expire_slot(slot_id).await
        })
        .await;
    }

    async fn arm_reservation_tasks(&self, reservation: &Reservation) {
        let reservation_id = reservation.id;

        let engine = self.clone_for_task();
        self.arm(
            TaskKey::reservation_reminder(reservation_id),
            reservation.date_time - self.rules.reminder_lead,
            async move { engine.send_reminder(reservation_id).await },
        )
        .await;

        let engine = self.clone_for_task();
        self.arm(
            TaskKey::reservation_transition(reservation_id),
            reservation.date_time,
            async move { engine.close_pending(reservation_id).await },
        )
        .await;
    }

    /// Removes a slot whose time has come without anyone booking it.
    async fn expire_slot(&self, slot_id: Uuid) -> anyhow::Result<()> {
        if self
            .slots
            .claim(slot_id, AvailabilityWriter::Expiry, self.clock.now())
            .await?
        {
            self.slots.delete(slot_id).await?;
            info!("Expired unbooked slot {}", slot_id);
            self.events.publish(SchedulingEvent::SlotExpired { slot_id });
        } else {
            debug!("Slot {} is booked or gone, nothing to expire", slot_id);
        }
        Ok(())
    }

    async fn close_pending(&self, reservation_id: Uuid) -> anyhow::Result<()> {
        if self.reservations.close_pending(reservation_id).await? {
            info!("Reservation {} is now awaiting assistance", reservation_id);
            self.events
                .publish(SchedulingEvent::ReservationClosed { reservation_id });
        } else {
            debug!("Reservation {} already closed or removed", reservation_id);
        }
        Ok(())
    }

    async fn send_reminder(&self, reservation_id: Uuid) -> anyhow::Result<()> {
        let Some(reservation) = self.reservations.get(reservation_id).await? else {
            debug!("Reservation {} removed before its reminder", reservation_id);
            return Ok(());
        };
        if !reservation.pending {
            debug!("Reservation {} no longer pending, skipping reminder", reservation_id);
            return Ok(());
        }

        let Some(patient) = self.users.get_user(reservation.patient_id).await? else {
            warn!("Patient {} of reservation {} not found", reservation.patient_id, reservation_id);
            return Ok(());
        };
        let Some(email) = patient.email.as_deref() else {
            warn!("Patient {} has no email, reminder not sent", patient.id);
            return Ok(());
        };

        let body = reminder_body(reservation.appointment_type, reservation.date_time);
        self.notifier.send(email, REMINDER_SUBJECT, &body).await?;

        info!("Sent reminder for reservation {}", reservation_id);
        self.events
            .publish(SchedulingEvent::ReminderSent { reservation_id });
        Ok(())
    }
}
