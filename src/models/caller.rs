use serde::{Deserialize, Serialize};

use super::Booking;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Staff,
}

/// The verified caller behind a request, resolved once at the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: i64,
    pub role: Role,
}

impl CallerIdentity {
    pub fn customer(user_id: i64) -> Self {
        Self {
            user_id,
            role: Role::Customer,
        }
    }

    pub fn staff(user_id: i64) -> Self {
        Self {
            user_id,
            role: Role::Staff,
        }
    }

    pub fn is_staff(&self) -> bool {
        self.role == Role::Staff
    }

    pub fn can_access(&self, booking: &Booking) -> bool {
        self.is_staff() || booking.customer_id == self.user_id
    }
}
