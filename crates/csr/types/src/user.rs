//! User accounts and the acting identity supplied by the auth layer

use crate::ids::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Platform role of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Sponsor,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => f.write_str("admin"),
            Role::Sponsor => f.write_str("sponsor"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "sponsor" | "csr" => Ok(Role::Sponsor),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// A user account known to the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: Role,
}

/// The caller of an operation, as authenticated upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn admin(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::Admin,
        }
    }

    pub fn sponsor(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::Sponsor,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
