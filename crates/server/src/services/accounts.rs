//! Local accounts: registration, lookup, role grants and restaurant
//! ownership.

use tracing::{info, instrument};

use forkline_core::{Actor, DomainError, Role, UserId, access};

use super::ServiceError;
use super::auth::AuthError;
use crate::db::{Store, UserDirectory};
use crate::models::{Identity, NewRestaurant, Restaurant, User};

#[derive(Debug, Clone)]
pub struct AccountService<S> {
    store: S,
}

impl<S: Store> AccountService<S> {
    #[must_use]
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Create the local record for a verified identity with role {customer}.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a blank display name, `Conflict` if the
    /// identity is already registered.
    #[instrument(skip(self, identity), fields(subject = %identity.subject))]
    pub async fn register(
        &self,
        identity: &Identity,
        display_name: &str,
    ) -> Result<User, ServiceError> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(DomainError::invalid("display_name", "must not be empty").into());
        }

        let user = self.store.register_user(identity, display_name).await?;
        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// The local user for a verified identity.
    ///
    /// # Errors
    ///
    /// `AuthError::NotRegistered` if no local record exists.
    pub async fn resolve(&self, identity: &Identity) -> Result<User, ResolveError> {
        self.store
            .find_by_subject(&identity.subject)
            .await
            .map_err(|e| ResolveError::Service(e.into()))?
            .ok_or(ResolveError::Auth(AuthError::NotRegistered))
    }

    /// Add `role` to a user. Admin only; granting a held role is a no-op.
    ///
    /// # Errors
    ///
    /// `Forbidden` for non-admins, `NotFound` if the user does not exist.
    #[instrument(skip(self), fields(actor_id = %actor.id, user_id = %user_id, role = %role))]
    pub async fn grant_role(
        &self,
        actor: &Actor,
        user_id: UserId,
        role: Role,
    ) -> Result<User, ServiceError> {
        access::authorize_admin(actor).into_result(actor)?;
        let user = self
            .store
            .grant_role(user_id, role)
            .await
            .map_err(|e| ServiceError::from(e).not_found_as("user"))?;
        info!(roles = ?user.roles.names(), "role granted");
        Ok(user)
    }

    /// Register a restaurant owned by `request.owner_id` and make the owner
    /// a manager. Admin only. An owner who is already a manager keeps the
    /// same role set.
    ///
    /// # Errors
    ///
    /// `Forbidden` for non-admins, `InvalidArgument` for a blank name or
    /// address, `NotFound` if the owner does not exist.
    #[instrument(skip(self, request), fields(actor_id = %actor.id, owner_id = %request.owner_id))]
    pub async fn create_restaurant_for_user(
        &self,
        actor: &Actor,
        request: NewRestaurant,
    ) -> Result<Restaurant, ServiceError> {
        access::authorize_admin(actor).into_result(actor)?;
        let request = request.normalized()?;
        let (restaurant, owner) = self
            .store
            .create_restaurant(&request, &request.slug())
            .await
            .map_err(|e| ServiceError::from(e).not_found_as("user"))?;
        info!(
            restaurant_id = %restaurant.id,
            slug = %restaurant.slug,
            roles = ?owner.roles.names(),
            "restaurant created"
        );
        Ok(restaurant)
    }
}

/// Failure to turn an identity into a local user.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use forkline_core::{Email, RoleSet};

    use crate::models::NewRestaurant;

    use super::*;
    use crate::db::MemoryStore;

    fn identity(subject: &str) -> Identity {
        Identity {
            subject: subject.to_owned(),
            email: Email::parse("someone@example.com").unwrap(),
        }
    }

    #[tokio::test]
    async fn test_register_resolve_and_conflict() {
        let svc = AccountService::new(MemoryStore::new());

        assert!(matches!(
            svc.resolve(&identity("ana")).await,
            Err(ResolveError::Auth(AuthError::NotRegistered))
        ));

        let user = svc.register(&identity("ana"), "  Ana ").await.unwrap();
        assert_eq!(user.display_name, "Ana");
        assert_eq!(user.roles, RoleSet::from(Role::Customer));
        assert_eq!(svc.resolve(&identity("ana")).await.unwrap().id, user.id);

        assert!(matches!(
            svc.register(&identity("ana"), "Ana").await,
            Err(ServiceError::Domain(DomainError::Conflict(_)))
        ));
        assert!(matches!(
            svc.register(&identity("bo"), "   ").await,
            Err(ServiceError::Domain(DomainError::InvalidArgument { .. }))
        ));
    }

    #[tokio::test]
    async fn test_only_admins_grant_roles() {
        let store = MemoryStore::new();
        let svc = AccountService::new(store.clone());
        let admin = store
            .seed_user(identity("root"), "Root", Role::Admin.into())
            .await
            .actor();
        let ana = svc.register(&identity("ana"), "Ana").await.unwrap();

        assert!(matches!(
            svc.grant_role(&ana.actor(), ana.id, Role::Admin).await,
            Err(ServiceError::Domain(DomainError::Forbidden))
        ));

        let granted = svc.grant_role(&admin, ana.id, Role::Delivery).await.unwrap();
        assert!(granted.roles.contains(Role::Customer));
        assert!(granted.roles.contains(Role::Delivery));

        assert!(matches!(
            svc.grant_role(&admin, UserId::new(999), Role::Manager).await,
            Err(ServiceError::Domain(DomainError::NotFound("user")))
        ));
    }

    fn noodle_bar(owner: UserId) -> NewRestaurant {
        NewRestaurant {
            name: "Noodle Bar".into(),
            description: None,
            address: "1 Main St".into(),
            phone_number: None,
            owner_id: owner,
        }
    }

    #[tokio::test]
    async fn test_create_restaurant_grants_manager_once() {
        let store = MemoryStore::new();
        let svc = AccountService::new(store.clone());
        let admin = store
            .seed_user(identity("root"), "Root", Role::Admin.into())
            .await
            .actor();
        let ana = svc.register(&identity("ana"), "Ana").await.unwrap();

        assert!(matches!(
            svc.create_restaurant_for_user(&ana.actor(), noodle_bar(ana.id)).await,
            Err(ServiceError::Domain(DomainError::Forbidden))
        ));

        let first = svc
            .create_restaurant_for_user(&admin, noodle_bar(ana.id))
            .await
            .unwrap();
        assert_eq!(first.owner_id, ana.id);
        assert!(first.is_active);
        let manager = store.find_user(ana.id).await.unwrap().unwrap();
        assert_eq!(manager.roles, RoleSet::of(&[Role::Customer, Role::Manager]));

        let second = svc
            .create_restaurant_for_user(&admin, noodle_bar(ana.id))
            .await
            .unwrap();
        assert_ne!(second.id, first.id);
        assert_ne!(second.slug, first.slug);
        let still = store.find_user(ana.id).await.unwrap().unwrap();
        assert_eq!(still.roles, manager.roles);
        assert_eq!(still.updated_at, manager.updated_at);

        assert!(matches!(
            svc.create_restaurant_for_user(&admin, noodle_bar(UserId::new(999))).await,
            Err(ServiceError::Domain(DomainError::NotFound("user")))
        ));
    }
}
