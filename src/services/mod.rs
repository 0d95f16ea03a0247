//! Transactional workflows. Each mutating operation opens one transaction,
//! loads what it needs, applies the `rules` guards and commits.

pub mod leases;
pub mod listings;
pub mod payments;
pub mod persons;
pub mod rental_requests;

#[cfg(test)]
mod tests;

use validator::{ValidationError, ValidationErrors};

use crate::models::Role;

/// The authenticated caller, as far as the workflows care
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: i64,
    pub role: Role,
}

impl Actor {
    pub fn new(id: i64, role: Role) -> Self {
        Self { id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Admins may act on anything; everyone else only on their own rows
    pub fn owns(&self, person_id: i64) -> bool {
        self.is_admin() || self.id == person_id
    }
}

/// Caller is authenticated but not allowed to touch this resource
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct AccessDenied(pub &'static str);

pub(crate) fn ensure(allowed: bool, message: &'static str) -> anyhow::Result<()> {
    if allowed {
        Ok(())
    } else {
        Err(AccessDenied(message).into())
    }
}

/// Single-field validation failure, for checks that need the database
pub(crate) fn invalid_field(field: &'static str, message: &'static str) -> anyhow::Error {
    let mut err = ValidationError::new("invalid");
    err.message = Some(message.into());
    let mut errors = ValidationErrors::new();
    errors.add(field, err);
    errors.into()
}
