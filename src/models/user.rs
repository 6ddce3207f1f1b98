// src/models/user.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::RideError;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Rider,      // Requests rides and leaves feedback
    Driver,     // Accepts and drives rides
    Admin,      // Moderates rides, users and drivers
    SuperAdmin, // Same ride authority as Admin
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Rider => "RIDER",
            Role::Driver => "DRIVER",
            Role::Admin => "ADMIN",
            Role::SuperAdmin => "SUPER_ADMIN",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RIDER" => Ok(Role::Rider),
            "DRIVER" => Ok(Role::Driver),
            "ADMIN" => Ok(Role::Admin),
            "SUPER_ADMIN" => Ok(Role::SuperAdmin),
            other => Err(RideError::InvalidFieldValue {
                field: "role".to_string(),
                value: other.to_string(),
                reason: "expected RIDER, DRIVER, ADMIN or SUPER_ADMIN".to_string(),
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Active,
    Inactive,
    Blocked,
}

impl AccountStatus {
    /// Status an admin's block/unblock toggle moves to.
    pub fn toggled(&self) -> AccountStatus {
        match self {
            AccountStatus::Active => AccountStatus::Blocked,
            AccountStatus::Inactive | AccountStatus::Blocked => AccountStatus::Active,
        }
    }
}

/// Body of an admin block/unblock change.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccountStatusUpdate {
    pub is_active: AccountStatus,
}

/// A user account as the admin views it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub is_active: AccountStatus,
}

/// The signed-in user acting on a ride.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self { id: id.into(), role }
    }

    pub fn rider(id: impl Into<String>) -> Self {
        Self::new(id, Role::Rider)
    }

    pub fn driver(id: impl Into<String>) -> Self {
        Self::new(id, Role::Driver)
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self::new(id, Role::Admin)
    }
}
