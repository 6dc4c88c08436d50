//! Strongly-typed identifiers
//!
//! Entity IDs are UUID-based newtypes. User IDs come from the external auth
//! layer and are kept as opaque strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            /// Accepts both the bare UUID and the `prefix:uuid` form.
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s.strip_prefix(concat!($prefix, ":")).unwrap_or(s);
                Uuid::parse_str(raw).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a sponsored program
    ProgramId,
    "program"
);

uuid_id!(
    /// Unique identifier for a sponsoring organization
    SponsorId,
    "sponsor"
);

uuid_id!(
    /// Unique identifier for a school
    SchoolId,
    "school"
);

uuid_id!(
    /// Unique identifier for a persisted notification record
    NotificationId,
    "notification"
);

/// Identifier of a user account, as issued by the auth layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_id_generation() {
        let a = ProgramId::generate();
        let b = ProgramId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_program_id_parse_accepts_prefix() {
        let id = ProgramId::generate();
        let bare: ProgramId = id.to_string().parse().unwrap();
        let prefixed: ProgramId = format!("program:{}", id).parse().unwrap();
        assert_eq!(bare, id);
        assert_eq!(prefixed, id);
    }

    #[test]
    fn test_program_id_parse_rejects_garbage() {
        assert!("not-a-uuid".parse::<ProgramId>().is_err());
    }

    #[test]
    fn test_user_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&UserId::new("u-42")).unwrap();
        assert_eq!(json, "\"u-42\"");
    }
}
