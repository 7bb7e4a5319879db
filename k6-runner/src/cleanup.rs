// Copyright (c) The kubectl-k6 Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deleting the objects that make up a run.
//!
//! The config map and the `TestRun` are deleted concurrently. An object that is already absent
//! counts as deleted, so cleanup can run for an attempt that never created anything and can run
//! twice in a row. After a delete is accepted, the object is polled until it is gone: the operator
//! holds on to the name until then, and a new run with the same names would otherwise race
//! against the old objects.

use crate::{
    errors::{CleanupError, DeleteError},
    naming::RunNames,
    store::{ObjectKind, ResourceStore},
    time::{PollSchedule, deadline_after},
};
use std::time::Duration;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info};

/// Deletes the objects of a run.
#[derive(Clone, Copy)]
pub struct CleanupCoordinator<'a> {
    store: &'a dyn ResourceStore,
    timeout: Duration,
    confirm_timeout: Duration,
    confirm_interval: Duration,
}

impl<'a> CleanupCoordinator<'a> {
    /// Creates a new coordinator.
    ///
    /// Cleanup as a whole is bounded by `timeout`. Each object's absence is confirmed by polling
    /// every `confirm_interval` for up to `confirm_timeout`.
    pub fn new(
        store: &'a dyn ResourceStore,
        timeout: Duration,
        confirm_timeout: Duration,
        confirm_interval: Duration,
    ) -> Self {
        Self {
            store,
            timeout,
            confirm_timeout,
            confirm_interval,
        }
    }

    /// Deletes the config map and the `TestRun` of a run, and waits until both are gone.
    pub async fn delete_run_resources(&self, names: &RunNames) -> Result<(), CleanupError> {
        let deadline = deadline_after(self.timeout);
        let (config_map, test_run) = tokio::join!(
            self.delete_and_confirm(ObjectKind::ConfigMap, names.config_map_name(), deadline),
            self.delete_and_confirm(ObjectKind::TestRun, names.resource_name(), deadline),
        );

        let errors = [config_map, test_run]
            .into_iter()
            .filter_map(Result::err)
            .collect();
        match CleanupError::new("while cleaning up run resources", errors) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn delete_and_confirm(
        &self,
        kind: ObjectKind,
        name: &str,
        deadline: Instant,
    ) -> Result<(), DeleteError> {
        let deadline_elapsed = || DeleteError::DeadlineElapsed {
            kind,
            name: name.to_owned(),
        };

        match timeout_at(deadline, self.store.delete_object(kind, name)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) if err.is_not_found() => {
                debug!("{kind} `{name}` is already absent");
                return Ok(());
            }
            Ok(Err(err)) => {
                return Err(DeleteError::Request {
                    kind,
                    name: name.to_owned(),
                    err,
                });
            }
            Err(_) => return Err(deadline_elapsed()),
        }

        let confirm_deadline = deadline_after(self.confirm_timeout);
        let schedule =
            PollSchedule::with_deadline(self.confirm_interval, confirm_deadline.min(deadline));
        let mut last_error = None;
        loop {
            match schedule.read(self.store.get_object(kind, name)).await {
                Some(Err(err)) if err.is_not_found() => {
                    info!("deleted {kind} `{name}`");
                    return Ok(());
                }
                Some(Ok(())) => {
                    debug!("{kind} `{name}` is still present");
                    last_error = None;
                }
                Some(Err(err)) => {
                    debug!("checking whether {kind} `{name}` is gone failed, retrying: {err}");
                    last_error = Some(err);
                }
                None => break,
            }
            if !schedule.wait_next().await {
                break;
            }
        }

        if schedule.deadline() < confirm_deadline {
            Err(deadline_elapsed())
        } else {
            Err(DeleteError::ConfirmTimeout {
                kind,
                name: name.to_owned(),
                timeout: self.confirm_timeout,
                last_error,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::StoreError, manifest::ScriptSource, naming::RunId, test_helpers::MemoryStore,
    };
    use pretty_assertions::assert_eq;

    const TIMEOUT: Duration = Duration::from_secs(30);
    const CONFIRM_TIMEOUT: Duration = Duration::from_secs(5);
    const CONFIRM_INTERVAL: Duration = Duration::from_secs(1);

    fn coordinator(store: &MemoryStore) -> CleanupCoordinator<'_> {
        CleanupCoordinator::new(store, TIMEOUT, CONFIRM_TIMEOUT, CONFIRM_INTERVAL)
    }

    fn names() -> RunNames {
        RunNames::new(RunId::from_string("x"))
    }

    #[tokio::test(start_paused = true)]
    async fn absent_objects_are_deleted() {
        let store = MemoryStore::new();
        coordinator(&store)
            .delete_run_resources(&names())
            .await
            .unwrap();
        assert_eq!(
            store.deletes(),
            [
                (ObjectKind::ConfigMap, "x".to_owned()),
                (ObjectKind::TestRun, "run-x".to_owned()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_is_idempotent() {
        let store = MemoryStore::new();
        let names = names();
        store.insert_run_objects(&names, &ScriptSource::inline("export default () => {}").unwrap());

        coordinator(&store).delete_run_resources(&names).await.unwrap();
        assert!(store.objects().is_empty());
        coordinator(&store).delete_run_resources(&names).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn deletion_is_confirmed() {
        let store = MemoryStore::new();
        let names = names();
        store.insert_run_objects(&names, &ScriptSource::inline("").unwrap());
        store.set_delete_linger(ObjectKind::TestRun, Duration::from_millis(2500));
        let start = Instant::now();

        coordinator(&store).delete_run_resources(&names).await.unwrap();
        // Absence is confirmed by the poll at 3s.
        assert_eq!(start.elapsed(), Duration::from_secs(3));
        assert_eq!(store.get_calls(ObjectKind::TestRun), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn lingering_object_is_an_error() {
        let store = MemoryStore::new();
        let names = names();
        store.insert_run_objects(&names, &ScriptSource::inline("").unwrap());
        store.set_delete_linger(ObjectKind::TestRun, Duration::from_secs(60));

        let err = coordinator(&store)
            .delete_run_resources(&names)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "while cleaning up run resources: test run `run-x` was still present 5s after being \
             deleted"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn both_failures_are_reported() {
        let store = MemoryStore::new();
        let names = names();
        store.fail_deletes(ObjectKind::ConfigMap);
        store.fail_deletes(ObjectKind::TestRun);

        let err = coordinator(&store)
            .delete_run_resources(&names)
            .await
            .unwrap_err();
        let failed: Vec<_> = err.errors().iter().map(DeleteError::name).collect();
        assert_eq!(failed, ["x", "run-x"]);
        assert!(matches!(
            err.errors()[0],
            DeleteError::Request {
                err: StoreError::Request { .. },
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn overall_deadline_bounds_confirmation() {
        let store = MemoryStore::new();
        let names = names();
        store.insert_run_objects(&names, &ScriptSource::inline("").unwrap());
        store.set_delete_linger(ObjectKind::TestRun, Duration::from_secs(60));
        let start = Instant::now();

        let err = CleanupCoordinator::new(
            &store,
            Duration::from_secs(3),
            CONFIRM_TIMEOUT,
            CONFIRM_INTERVAL,
        )
        .delete_run_resources(&names)
        .await
        .unwrap_err();
        assert_eq!(start.elapsed(), Duration::from_secs(3));
        assert!(matches!(
            err.errors(),
            [DeleteError::DeadlineElapsed {
                kind: ObjectKind::TestRun,
                ..
            }]
        ));
    }
}
