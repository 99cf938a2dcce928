//! Restaurants and the request that registers one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use forkline_core::{DomainError, RestaurantId, UserId};

/// A registered restaurant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Restaurant {
    pub id: RestaurantId,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub address: String,
    pub phone_number: Option<String>,
    pub owner_id: UserId,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /admin/restaurants`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRestaurant {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub address: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    /// The user who will manage the restaurant.
    pub owner_id: UserId,
}

impl NewRestaurant {
    /// Trim text fields and reject blank required ones.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` naming the blank field.
    pub fn normalized(mut self) -> Result<Self, DomainError> {
        self.name = self.name.trim().to_owned();
        self.address = self.address.trim().to_owned();
        if self.name.is_empty() {
            return Err(DomainError::invalid("name", "must not be empty"));
        }
        if self.address.is_empty() {
            return Err(DomainError::invalid("address", "must not be empty"));
        }
        Ok(self)
    }

    /// `name` lowercased with spaces as dashes, plus a random suffix.
    #[must_use]
    pub fn slug(&self) -> String {
        let base = self.name.to_lowercase().replace(' ', "-");
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{base}-{}", suffix.get(..8).unwrap_or(&suffix))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn request(name: &str, address: &str) -> NewRestaurant {
        NewRestaurant {
            name: name.to_owned(),
            description: None,
            address: address.to_owned(),
            phone_number: None,
            owner_id: UserId::new(1),
        }
    }

    #[test]
    fn test_normalized_trims_and_rejects_blanks() {
        let ok = request("  Noodle Bar ", " 1 Main St").normalized().unwrap();
        assert_eq!(ok.name, "Noodle Bar");
        assert_eq!(ok.address, "1 Main St");

        assert!(matches!(
            request(" ", "1 Main St").normalized(),
            Err(DomainError::InvalidArgument { field: "name", .. })
        ));
        assert!(matches!(
            request("Noodle Bar", "").normalized(),
            Err(DomainError::InvalidArgument { field: "address", .. })
        ));
    }

    #[test]
    fn test_slug_is_unique_per_call() {
        let r = request("Noodle Bar", "1 Main St");
        let a = r.slug();
        assert!(a.starts_with("noodle-bar-"));
        assert_eq!(a.len(), "noodle-bar-".len() + 8);
        assert_ne!(a, r.slug());
    }
}
