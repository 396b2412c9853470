//! Tenant access decisions.
//!
//! Every tenant-scoped handler funnels through these checks. A
//! `super_admin` membership held in any tenant grants access everywhere;
//! `admin` and `member` are scoped to the tenant the membership names.

use crate::server::response::{ApiError, StoreResultExt};
use crate::store::Store;
use crate::types::{Role, User};

/// Resolves the user's direct role in a tenant, without the global
/// super-admin bypass.
pub fn resolve_role(
    store: &dyn Store,
    user_id: &str,
    tenant_id: &str,
) -> Result<Option<Role>, ApiError> {
    let membership = store.get_membership(user_id, tenant_id).api_err()?;
    Ok(membership.map(|m| m.role))
}

/// Requires that the user can act within the tenant at all, returning
/// the effective role. Super admins resolve to `SuperAdmin` in every
/// tenant, including ones they hold no membership in.
pub fn authorize_tenant_access(
    store: &dyn Store,
    user: &User,
    tenant_id: &str,
) -> Result<Role, ApiError> {
    if store.user_holds_super_admin(&user.id).api_err()? {
        return Ok(Role::SuperAdmin);
    }

    resolve_role(store, &user.id, tenant_id)?
        .ok_or_else(|| ApiError::forbidden("not a member of this tenant"))
}

/// Requires admin privileges (or better) within the tenant.
pub fn authorize_admin(store: &dyn Store, user: &User, tenant_id: &str) -> Result<Role, ApiError> {
    let role = authorize_tenant_access(store, user, tenant_id)?;
    if role >= Role::Admin {
        Ok(role)
    } else {
        Err(ApiError::forbidden("admin access required"))
    }
}

/// Requires a super-admin membership somewhere.
pub fn authorize_super_admin(store: &dyn Store, user: &User) -> Result<(), ApiError> {
    if store.user_holds_super_admin(&user.id).api_err()? {
        Ok(())
    } else {
        Err(ApiError::forbidden("super admin access required"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::types::{Membership, Tenant};
    use axum::http::StatusCode;
    use chrono::Utc;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn test_store() -> (TempDir, SqliteStore) {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        (temp, store)
    }

    fn seed_tenant(store: &SqliteStore, name: &str) -> Tenant {
        let tenant = Tenant {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            plan: "free".to_string(),
            created_at: Utc::now(),
        };
        store.create_tenant(&tenant).unwrap();
        tenant
    }

    fn seed_user(store: &SqliteStore, email: &str) -> User {
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            name: None,
            created_at: Utc::now(),
        };
        store.create_user(&user).unwrap();
        user
    }

    fn seed_member(store: &SqliteStore, user: &User, tenant: &Tenant, role: Role) {
        store
            .create_membership(&Membership {
                user_id: user.id.clone(),
                tenant_id: tenant.id.clone(),
                role,
            })
            .unwrap();
    }

    #[test]
    fn test_no_membership_is_forbidden() {
        let (_temp, store) = test_store();
        let tenant = seed_tenant(&store, "acme");
        let outsider = seed_user(&store, "out@example.com");

        let err = authorize_tenant_access(&store, &outsider, &tenant.id).unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_super_admin_bypasses_tenant_scope() {
        let (_temp, store) = test_store();
        let home = seed_tenant(&store, "home");
        let other = seed_tenant(&store, "other");
        let root = seed_user(&store, "root@example.com");
        seed_member(&store, &root, &home, Role::SuperAdmin);

        // No membership in `other`, access is still granted
        let role = authorize_tenant_access(&store, &root, &other.id).unwrap();
        assert_eq!(role, Role::SuperAdmin);

        // But the direct role resolution stays membership-only
        assert!(resolve_role(&store, &root.id, &other.id).unwrap().is_none());
    }

    #[test]
    fn test_member_cannot_pass_admin_check() {
        let (_temp, store) = test_store();
        let tenant = seed_tenant(&store, "acme");
        let member = seed_user(&store, "m@example.com");
        seed_member(&store, &member, &tenant, Role::Member);

        assert_eq!(
            authorize_tenant_access(&store, &member, &tenant.id).unwrap(),
            Role::Member
        );
        let err = authorize_admin(&store, &member, &tenant.id).unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_admin_passes_admin_check_but_not_super() {
        let (_temp, store) = test_store();
        let tenant = seed_tenant(&store, "acme");
        let admin = seed_user(&store, "a@example.com");
        seed_member(&store, &admin, &tenant, Role::Admin);

        assert_eq!(
            authorize_admin(&store, &admin, &tenant.id).unwrap(),
            Role::Admin
        );
        let err = authorize_super_admin(&store, &admin).unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_admin_role_is_tenant_scoped() {
        let (_temp, store) = test_store();
        let home = seed_tenant(&store, "home");
        let other = seed_tenant(&store, "other");
        let admin = seed_user(&store, "a@example.com");
        seed_member(&store, &admin, &home, Role::Admin);

        let err = authorize_tenant_access(&store, &admin, &other.id).unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }
}
