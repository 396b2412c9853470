use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Role a user holds within a tenant, ordered by privilege.
///
/// A `SuperAdmin` role held in any tenant grants access to all tenants
/// (global bypass); the other roles are scoped to the tenant where the
/// membership exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Admin,
    SuperAdmin,
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "member" => Ok(Role::Member),
            "admin" => Ok(Role::Admin),
            "super_admin" => Ok(Role::SuperAdmin),
            other => Err(Error::BadRequest(format!("invalid role '{other}'"))),
        }
    }
}

/// Lifecycle of a discovery run. A run is created `Running` and receives
/// exactly one terminating transition to `Success` or `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Error,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(RunStatus::Running),
            "success" => Ok(RunStatus::Success),
            "error" => Ok(RunStatus::Error),
            other => Err(Error::BadRequest(format!("invalid run status '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ordering_by_privilege() {
        assert!(Role::SuperAdmin > Role::Admin);
        assert!(Role::Admin > Role::Member);
    }

    #[test]
    fn test_role_round_trip() {
        for role in [Role::Member, Role::Admin, Role::SuperAdmin] {
            assert_eq!(Role::parse(role.as_str()).unwrap(), role);
        }
        assert!(Role::parse("owner").is_err());
    }

    #[test]
    fn test_run_status_round_trip() {
        for status in [RunStatus::Running, RunStatus::Success, RunStatus::Error] {
            assert_eq!(RunStatus::parse(status.as_str()).unwrap(), status);
        }
    }
}
