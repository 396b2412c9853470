//! Run orchestration: the full lifecycle of a triggered discovery run.

use std::time::Instant;

use chrono::Utc;
use uuid::Uuid;

use crate::server::access::authorize_admin;
use crate::server::response::{ApiError, StoreResultExt};
use crate::store::Store;
use crate::types::{Item, Run, RunStatus, Site, User};
use crate::worker::DiscoveryGateway;

/// Outcome of a successful run trigger.
#[derive(Debug)]
pub struct TriggeredRun {
    pub run_id: String,
    pub status: RunStatus,
    pub new_items: i64,
}

/// Triggers a discovery run for a site and drives it to a terminal state.
///
/// The run row is created `running` before the worker is called, so a
/// crash mid-run leaves an honest record. Worker failures finalize the
/// run as `error` with the failure captured in diagnostics, then surface
/// as 502 to the caller. Discovered links are merged idempotently, so
/// re-running against unchanged content yields zero new items.
pub async fn trigger_run(
    store: &dyn Store,
    gateway: &dyn DiscoveryGateway,
    actor: &User,
    site: &Site,
) -> Result<TriggeredRun, ApiError> {
    // Authorization happens before any run row exists
    authorize_admin(store, actor, &site.tenant_id)?;

    let method = if site.profile_key.is_some() {
        "profile"
    } else {
        "discover"
    };

    let run = Run {
        id: Uuid::new_v4().to_string(),
        site_id: site.id.clone(),
        status: RunStatus::Running,
        method: method.to_string(),
        pages_scanned: 0,
        duration_ms: None,
        diagnostics: None,
        started_at: Utc::now(),
        finished_at: None,
    };
    store.create_run(&run).api_err()?;

    let started = Instant::now();
    let result = match &site.profile_key {
        Some(key) => gateway.run_profile(key).await,
        None => gateway.discover(&site.url).await,
    };
    let duration_ms = started.elapsed().as_millis() as i64;

    match result {
        Ok(response) => {
            let mut new_items = 0i64;
            let discovered_at = Utc::now();
            for link in response.links.iter().flatten() {
                let item = Item {
                    id: Uuid::new_v4().to_string(),
                    site_id: site.id.clone(),
                    url: link.clone(),
                    canonical_url: link.clone(),
                    title: None,
                    published_at: None,
                    discovered_at,
                    source: response.source.clone(),
                    meta: None,
                };
                if store.insert_item_if_new(&item).api_err()? {
                    new_items += 1;
                }
            }

            store
                .finalize_run(
                    &run.id,
                    RunStatus::Success,
                    response.count,
                    duration_ms,
                    response.diagnostics.as_ref(),
                    &Utc::now(),
                )
                .api_err()?;
            store.update_site_last_run(&site.id, &Utc::now()).api_err()?;

            tracing::info!(
                site_id = %site.id,
                run_id = %run.id,
                method,
                new_items,
                duration_ms,
                "Run finished"
            );

            Ok(TriggeredRun {
                run_id: run.id,
                status: RunStatus::Success,
                new_items,
            })
        }
        Err(worker_err) => {
            store
                .finalize_run(
                    &run.id,
                    RunStatus::Error,
                    0,
                    duration_ms,
                    Some(&worker_err.diagnostics()),
                    &Utc::now(),
                )
                .api_err()?;

            tracing::warn!(
                site_id = %site.id,
                run_id = %run.id,
                method,
                error = %worker_err,
                "Run failed"
            );

            let message = match (worker_err.status_code(), worker_err.raw_response()) {
                (Some(code), Some(body)) => {
                    format!("discovery worker failed with status {code}: {body}")
                }
                _ => format!("discovery worker failed: {worker_err}"),
            };
            Err(ApiError::bad_gateway(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::types::{Membership, Role, Tenant};
    use crate::worker::{DiscoveryResponse, WorkerError};
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use std::sync::Mutex;
    use tempfile::TempDir;

    enum StubBehavior {
        Links(Vec<String>),
        Fail(WorkerError),
    }

    struct StubGateway {
        behavior: Mutex<StubBehavior>,
    }

    impl StubGateway {
        fn links(links: &[&str]) -> Self {
            Self {
                behavior: Mutex::new(StubBehavior::Links(
                    links.iter().map(|s| s.to_string()).collect(),
                )),
            }
        }

        fn failing(err: WorkerError) -> Self {
            Self {
                behavior: Mutex::new(StubBehavior::Fail(err)),
            }
        }

        fn respond(&self) -> Result<DiscoveryResponse, WorkerError> {
            match &*self.behavior.lock().unwrap() {
                StubBehavior::Links(links) => Ok(DiscoveryResponse {
                    source: "html".to_string(),
                    links: Some(links.clone()),
                    feeds: None,
                    count: links.len() as i64,
                    diagnostics: None,
                }),
                StubBehavior::Fail(WorkerError::Timeout) => Err(WorkerError::Timeout),
                StubBehavior::Fail(WorkerError::Status { status_code, body }) => {
                    Err(WorkerError::Status {
                        status_code: *status_code,
                        body: body.clone(),
                    })
                }
                StubBehavior::Fail(e) => Err(WorkerError::Transport(e.to_string())),
            }
        }
    }

    #[async_trait]
    impl DiscoveryGateway for StubGateway {
        async fn discover(&self, _url: &str) -> Result<DiscoveryResponse, WorkerError> {
            self.respond()
        }

        async fn run_profile(&self, _key: &str) -> Result<DiscoveryResponse, WorkerError> {
            self.respond()
        }
    }

    struct Fixture {
        _temp: TempDir,
        store: SqliteStore,
        admin: User,
        member: User,
        site: Site,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();

        let tenant = Tenant {
            id: "t1".to_string(),
            name: "acme".to_string(),
            plan: "free".to_string(),
            created_at: Utc::now(),
        };
        store.create_tenant(&tenant).unwrap();

        let admin = User {
            id: "u-admin".to_string(),
            email: "admin@example.com".to_string(),
            name: None,
            created_at: Utc::now(),
        };
        let member = User {
            id: "u-member".to_string(),
            email: "member@example.com".to_string(),
            name: None,
            created_at: Utc::now(),
        };
        store.create_user(&admin).unwrap();
        store.create_user(&member).unwrap();
        for (user, role) in [(&admin, Role::Admin), (&member, Role::Member)] {
            store
                .create_membership(&Membership {
                    user_id: user.id.clone(),
                    tenant_id: tenant.id.clone(),
                    role,
                })
                .unwrap();
        }

        let site = Site {
            id: "s1".to_string(),
            tenant_id: tenant.id.clone(),
            url: "https://example.com".to_string(),
            profile_key: None,
            keywords: Vec::new(),
            enabled: true,
            interval_minutes: 60,
            last_run_at: None,
            created_at: Utc::now(),
        };
        store.create_site(&site).unwrap();

        Fixture {
            _temp: temp,
            store,
            admin,
            member,
            site,
        }
    }

    #[tokio::test]
    async fn test_successful_run_records_items() {
        let f = fixture();
        let gateway = StubGateway::links(&["https://example.com/a", "https://example.com/b"]);

        let triggered = trigger_run(&f.store, &gateway, &f.admin, &f.site)
            .await
            .unwrap();
        assert_eq!(triggered.status, RunStatus::Success);
        assert_eq!(triggered.new_items, 2);

        let run = f.store.get_run(&triggered.run_id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Success);
        assert_eq!(run.pages_scanned, 2);
        assert_eq!(run.method, "discover");
        assert!(run.finished_at.is_some());

        let site = f.store.get_site(&f.site.id).unwrap().unwrap();
        assert!(site.last_run_at.is_some());
    }

    #[tokio::test]
    async fn test_repeat_run_is_idempotent() {
        let f = fixture();
        let gateway = StubGateway::links(&["https://example.com/a", "https://example.com/b"]);

        let first = trigger_run(&f.store, &gateway, &f.admin, &f.site)
            .await
            .unwrap();
        assert_eq!(first.new_items, 2);

        let second = trigger_run(&f.store, &gateway, &f.admin, &f.site)
            .await
            .unwrap();
        assert_eq!(second.new_items, 0);

        let items = f.store.list_site_items(&f.site.id, None, 10).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn test_member_cannot_trigger_and_no_run_is_created() {
        let f = fixture();
        let gateway = StubGateway::links(&["https://example.com/a"]);

        let err = trigger_run(&f.store, &gateway, &f.member, &f.site)
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert_eq!(f.store.count_site_runs(&f.site.id).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_worker_failure_finalizes_run_as_error() {
        let f = fixture();
        let gateway = StubGateway::failing(WorkerError::Status {
            status_code: 503,
            body: "overloaded".to_string(),
        });

        let err = trigger_run(&f.store, &gateway, &f.admin, &f.site)
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert!(err.message.contains("503"));
        assert!(err.message.contains("overloaded"));

        let runs = f.store.list_site_runs(&f.site.id, 0, 10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Error);
        let diag = runs[0].diagnostics.as_ref().unwrap();
        assert_eq!(diag["status_code"], 503);

        // A failed run never touches the watermark
        let site = f.store.get_site(&f.site.id).unwrap().unwrap();
        assert!(site.last_run_at.is_none());
    }

    #[tokio::test]
    async fn test_timeout_is_recorded_in_diagnostics() {
        let f = fixture();
        let gateway = StubGateway::failing(WorkerError::Timeout);

        let err = trigger_run(&f.store, &gateway, &f.admin, &f.site)
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);

        let runs = f.store.list_site_runs(&f.site.id, 0, 10).unwrap();
        let diag = runs[0].diagnostics.as_ref().unwrap();
        assert_eq!(diag["timeout"], true);
    }

    #[tokio::test]
    async fn test_profile_key_selects_profile_method() {
        let f = fixture();
        let gateway = StubGateway::links(&[]);

        let site = Site {
            id: "s2".to_string(),
            profile_key: Some("acme-blog".to_string()),
            ..f.site.clone()
        };
        f.store.create_site(&site).unwrap();

        let triggered = trigger_run(&f.store, &gateway, &f.admin, &site)
            .await
            .unwrap();
        let run = f.store.get_run(&triggered.run_id).unwrap().unwrap();
        assert_eq!(run.method, "profile");
    }
}
