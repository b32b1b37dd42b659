use shared_models::user::{RoleName, UserAccount};

use crate::models::AppointmentType;

/// Appointment type offered by holders of a professional role.
pub fn appointment_type_for_role(role: RoleName) -> Option<AppointmentType> {
    match role {
        RoleName::Nurse => Some(AppointmentType::Nursing),
        RoleName::Dentist => Some(AppointmentType::Dental),
        RoleName::Psychologist => Some(AppointmentType::Psychology),
        RoleName::Admin
        | RoleName::Student
        | RoleName::Staff
        | RoleName::External
        | RoleName::Monitor => None,
    }
}

pub trait RoleResolver: Send + Sync {
    /// The appointment type this user offers, if they are a professional.
    fn offered_type(&self, user: &UserAccount) -> Option<AppointmentType>;

    /// Whether the user is barred from booking.
    fn is_external(&self, user: &UserAccount) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RoleTable;

impl RoleResolver for RoleTable {
    fn offered_type(&self, user: &UserAccount) -> Option<AppointmentType> {
        user.roles.iter().copied().find_map(appointment_type_for_role)
    }

    fn is_external(&self, user: &UserAccount) -> bool {
        user.has_role(RoleName::External)
    }
}
