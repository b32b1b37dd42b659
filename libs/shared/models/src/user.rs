use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Institutional roles a user account can hold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleName {
    Admin,
    Student,
    Staff,
    External,
    Nurse,
    Dentist,
    Psychologist,
    Monitor,
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleName::Admin => write!(f, "ADMIN"),
            RoleName::Student => write!(f, "STUDENT"),
            RoleName::Staff => write!(f, "STAFF"),
            RoleName::External => write!(f, "EXTERNAL"),
            RoleName::Nurse => write!(f, "NURSE"),
            RoleName::Dentist => write!(f, "DENTIST"),
            RoleName::Psychologist => write!(f, "PSYCHOLOGIST"),
            RoleName::Monitor => write!(f, "MONITOR"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserAccount {
    pub id: Uuid,
    pub username: String,
    pub name: String,
    pub last_name: String,
    pub email: Option<String>,
    #[serde(default)]
    pub roles: BTreeSet<RoleName>,
    pub phone: Option<String>,
    pub eps: Option<String>,
    pub semester: Option<String>,
}

impl UserAccount {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.name, self.last_name)
    }

    pub fn has_role(&self, role: RoleName) -> bool {
        self.roles.contains(&role)
    }
}

/// Optional contact details a patient may refresh while booking.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContactDetails {
    pub phone: Option<String>,
    pub eps: Option<String>,
    pub semester: Option<String>,
}

impl ContactDetails {
    pub fn is_empty(&self) -> bool {
        self.phone.is_none() && self.eps.is_none() && self.semester.is_none()
    }

    /// Overwrites only the fields that were supplied.
    pub fn apply_to(&self, user: &mut UserAccount) {
        if let Some(phone) = &self.phone {
            user.phone = Some(phone.clone());
        }
        if let Some(eps) = &self.eps {
            user.eps = Some(eps.clone());
        }
        if let Some(semester) = &self.semester {
            user.semester = Some(semester.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> UserAccount {
        UserAccount {
            id: Uuid::new_v4(),
            username: "2024001".to_string(),
            name: "Ana".to_string(),
            last_name: "Ruiz".to_string(),
            email: Some("ana@example.com".to_string()),
            roles: BTreeSet::from([RoleName::Student]),
            phone: Some("3001112233".to_string()),
            eps: None,
            semester: None,
        }
    }

    #[test]
    fn contact_details_only_overwrite_supplied_fields() {
        let mut user = account();
        let details = ContactDetails {
            phone: None,
            eps: Some("Sura".to_string()),
            semester: Some("5".to_string()),
        };

        details.apply_to(&mut user);

        assert_eq!(user.phone.as_deref(), Some("3001112233"));
        assert_eq!(user.eps.as_deref(), Some("Sura"));
        assert_eq!(user.semester.as_deref(), Some("5"));
    }

    #[test]
    fn roles_deserialize_from_upper_case_names() {
        let roles: BTreeSet<RoleName> =
            serde_json::from_str(r#"["PSYCHOLOGIST", "STUDENT"]"#).expect("roles should parse");
        assert!(roles.contains(&RoleName::Psychologist));
        assert!(roles.contains(&RoleName::Student));
        assert!(ContactDetails::default().is_empty());
    }
}
