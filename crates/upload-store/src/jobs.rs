//! Durable, lease-based finalize job queue with CAS claim semantics and a
//! best-effort, rebuildable index used only to accelerate due-listing.

use std::time::Duration;

use chrono::{DateTime, Utc};
use upload_core::ports::{CasOutcome, KeyValueStore, KeyValueStoreCas, Lookup, VersionedLookup};
use upload_core::{FinalizeJob, JobId, JobIndex, JobStatus};

use crate::error::Result as StoreResult;
use crate::keys::KeySpace;

/// Job queue: `get`, `enqueue`, `list_due`, `try_claim`, `mark_completed`,
/// `mark_failed`, `reschedule`.
pub struct JobStore<J, I> {
    jobs: J,
    index: I,
    keys: KeySpace,
}

impl<J, I> JobStore<J, I>
where
    J: KeyValueStoreCas<FinalizeJob>,
    I: KeyValueStore<JobIndex>,
{
    /// Construct a new job store over `jobs` and `index`, namespaced under `keys`.
    #[must_use]
    pub const fn new(jobs: J, index: I, keys: KeySpace) -> Self {
        Self { jobs, index, keys }
    }

    /// Fetch a job by id, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn get(&self, id: &JobId) -> StoreResult<Option<FinalizeJob>> {
        let key = self.keys.job(id);
        Ok(self.jobs.get(&key).await?.into_option())
    }

    /// Persist `job`, then append its id to the index. The two writes are
    /// not atomic; an intermediate crash leaves a recoverable orphan.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn enqueue(&self, job: FinalizeJob) -> StoreResult<()> {
        let job_key = self.keys.job(&job.id);
        let job_id = job.id.clone();
        self.jobs.set(&job_key, job, None).await?;
        self.append_to_index(job_id).await
    }

    async fn append_to_index(&self, id: JobId) -> StoreResult<()> {
        let index_key = self.keys.job_index();
        let mut index = match self.index.get(&index_key).await? {
            Lookup::Found(index) => index,
            Lookup::NotFound => JobIndex::default(),
        };
        index.insert(id);
        self.index.set(&index_key, index, None).await?;
        Ok(())
    }

    async fn remove_from_index(&self, id: &JobId) -> StoreResult<()> {
        let index_key = self.keys.job_index();
        let Lookup::Found(mut index) = self.index.get(&index_key).await? else {
            return Ok(());
        };
        index.remove(id);
        self.index.set(&index_key, index, None).await?;
        Ok(())
    }

    /// Jobs eligible to run: `status ∈ {pending, running}` and
    /// `run_at ≤ now`, up to `limit` records. Orphans (index entries with no
    /// backing record) are silently skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn list_due(&self, now: DateTime<Utc>, limit: usize) -> StoreResult<Vec<FinalizeJob>> {
        let index_key = self.keys.job_index();
        let index = match self.index.get(&index_key).await? {
            Lookup::Found(index) => index,
            Lookup::NotFound => return Ok(Vec::new()),
        };

        let mut due = Vec::new();
        for id in &index.job_ids {
            if due.len() >= limit {
                break;
            }
            let job_key = self.keys.job(id);
            if let Lookup::Found(job) = self.jobs.get(&job_key).await? {
                let eligible =
                    matches!(job.status, JobStatus::Pending | JobStatus::Running) && job.run_at <= now;
                if eligible {
                    due.push(job);
                }
            }
        }
        Ok(due)
    }

    /// Atomically claim `id` if it is `pending`, or `running` with an
    /// expired lease. On success, rewrites it `running` with a fresh lease
    /// and returns the claimed job; returns `None` on CAS loss, absence, or
    /// ineligible state.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn try_claim(
        &self,
        id: &JobId,
        at: DateTime<Utc>,
        lease_duration: Duration,
    ) -> StoreResult<Option<FinalizeJob>> {
        let key = self.keys.job(id);
        let Some((current, version)) = self.get_versioned(&key).await? else {
            return Ok(None);
        };

        let eligible = match current.status {
            JobStatus::Pending => true,
            JobStatus::Running => current.run_at <= at,
            JobStatus::Completed | JobStatus::Failed => false,
        };
        if !eligible {
            return Ok(None);
        }

        let lease = chrono::Duration::from_std(lease_duration).unwrap_or(chrono::Duration::zero());
        let next = FinalizeJob {
            status: JobStatus::Running,
            updated_at: at,
            run_at: at + lease,
            ..current
        };

        match self.jobs.set_if_version(&key, next.clone(), version, None).await? {
            CasOutcome::Written { .. } => Ok(Some(next)),
            CasOutcome::Conflict | CasOutcome::NotFound => Ok(None),
        }
    }

    /// Mark `id` completed and drop it from the index. Non-existent ids are
    /// a silent no-op, keeping the operation idempotent under at-least-once
    /// delivery.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn mark_completed(&self, id: &JobId, at: DateTime<Utc>) -> StoreResult<()> {
        let key = self.keys.job(id);
        let Some((current, version)) = self.get_versioned(&key).await? else {
            return Ok(());
        };
        let next = FinalizeJob {
            status: JobStatus::Completed,
            updated_at: at,
            ..current
        };
        let _ = self.jobs.set_if_version(&key, next, version, None).await?;
        self.remove_from_index(id).await
    }

    /// Mark `id` failed with `reason` and drop it from the index.
    /// Non-existent ids are a silent no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn mark_failed(
        &self,
        id: &JobId,
        at: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> StoreResult<()> {
        let key = self.keys.job(id);
        let Some((current, version)) = self.get_versioned(&key).await? else {
            return Ok(());
        };
        let next = FinalizeJob {
            status: JobStatus::Failed,
            updated_at: at,
            last_error: Some(reason.into()),
            ..current
        };
        let _ = self.jobs.set_if_version(&key, next, version, None).await?;
        self.remove_from_index(id).await
    }

    /// Reschedule `id` to run again at `next_run_at`, bumping `attempt` and
    /// recording `last_error`. Does not remove the id from the index. A
    /// missing job is a silent no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn reschedule(
        &self,
        id: &JobId,
        next_run_at: DateTime<Utc>,
        at: DateTime<Utc>,
        last_error: Option<String>,
    ) -> StoreResult<()> {
        let key = self.keys.job(id);
        let Some((current, version)) = self.get_versioned(&key).await? else {
            return Ok(());
        };
        let next = FinalizeJob {
            status: JobStatus::Pending,
            attempt: current.attempt + 1,
            run_at: next_run_at,
            updated_at: at,
            last_error,
            ..current
        };
        let _ = self.jobs.set_if_version(&key, next, version, None).await?;
        Ok(())
    }

    async fn get_versioned(
        &self,
        key: &str,
    ) -> StoreResult<Option<(FinalizeJob, upload_core::ports::Version)>> {
        match self.jobs.get_versioned(key).await? {
            VersionedLookup::Found { value, version } => Ok(Some((value, version))),
            VersionedLookup::NotFound => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use upload_core::error::PortResult;
    use upload_core::ports::Version;
    use upload_core::UploadId;

    #[derive(Default)]
    struct InMemoryCas<T> {
        rows: Mutex<HashMap<String, (T, u64)>>,
    }

    #[async_trait]
    impl<T: Clone + Send + Sync> KeyValueStore<T> for InMemoryCas<T> {
        async fn get(&self, key: &str) -> PortResult<Lookup<T>> {
            Ok(match self.rows.lock().unwrap().get(key) {
                Some((value, _)) => Lookup::Found(value.clone()),
                None => Lookup::NotFound,
            })
        }

        async fn set(&self, key: &str, value: T, _ttl: Option<Duration>) -> PortResult<()> {
            let mut rows = self.rows.lock().unwrap();
            let version = rows.get(key).map_or(1, |(_, v)| v + 1);
            rows.insert(key.to_string(), (value, version));
            Ok(())
        }

        async fn delete(&self, key: &str) -> PortResult<()> {
            self.rows.lock().unwrap().remove(key);
            Ok(())
        }

        async fn has(&self, key: &str) -> PortResult<bool> {
            Ok(self.rows.lock().unwrap().contains_key(key))
        }

        async fn get_many(&self, keys: &[String]) -> PortResult<Vec<(String, T)>> {
            let rows = self.rows.lock().unwrap();
            Ok(keys
                .iter()
                .filter_map(|k| rows.get(k).map(|(v, _)| (k.clone(), v.clone())))
                .collect())
        }

        async fn set_many(&self, items: Vec<(String, T)>, _ttl: Option<Duration>) -> PortResult<()> {
            for (key, value) in items {
                self.set(&key, value, None).await?;
            }
            Ok(())
        }

        async fn delete_many(&self, keys: &[String]) -> PortResult<()> {
            for key in keys {
                self.delete(key).await?;
            }
            Ok(())
        }
    }

    #[async_trait]
    impl<T: Clone + Send + Sync> KeyValueStoreCas<T> for InMemoryCas<T> {
        async fn get_versioned(&self, key: &str) -> PortResult<VersionedLookup<T>> {
            Ok(match self.rows.lock().unwrap().get(key) {
                Some((value, version)) => VersionedLookup::Found {
                    value: value.clone(),
                    version: Version(*version),
                },
                None => VersionedLookup::NotFound,
            })
        }

        async fn set_if_version(
            &self,
            key: &str,
            value: T,
            expected: Version,
            _ttl: Option<Duration>,
        ) -> PortResult<CasOutcome> {
            let mut rows = self.rows.lock().unwrap();
            match rows.get(key) {
                None => Ok(CasOutcome::NotFound),
                Some((_, current_version)) if *current_version != expected.0 => {
                    Ok(CasOutcome::Conflict)
                }
                Some(_) => {
                    let next_version = expected.0 + 1;
                    rows.insert(key.to_string(), (value, next_version));
                    Ok(CasOutcome::Written {
                        version: Version(next_version),
                    })
                }
            }
        }
    }

    fn job_store() -> JobStore<InMemoryCas<FinalizeJob>, InMemoryCas<JobIndex>> {
        JobStore::new(
            InMemoryCas::default(),
            InMemoryCas::default(),
            KeySpace::new("acme"),
        )
    }

    fn pending_job(now: DateTime<Utc>) -> FinalizeJob {
        FinalizeJob {
            id: JobId::generate(),
            upload_id: UploadId::generate(),
            status: JobStatus::Pending,
            attempt: 0,
            run_at: now,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn enqueue_makes_the_job_due_immediately() {
        let store = job_store();
        let now = Utc::now();
        let job = pending_job(now);
        let id = job.id.clone();
        store.enqueue(job).await.unwrap();

        let due = store.list_due(now, 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, id);
    }

    #[tokio::test]
    async fn try_claim_is_exclusive_and_sets_a_lease() {
        let store = job_store();
        let now = Utc::now();
        let job = pending_job(now);
        let id = job.id.clone();
        store.enqueue(job).await.unwrap();

        let claimed = store
            .try_claim(&id, now, Duration::from_secs(30))
            .await
            .unwrap()
            .expect("claim should succeed");
        assert_eq!(claimed.status, JobStatus::Running);
        assert!(claimed.run_at > now);

        // A second claim attempt before lease expiry must fail: the record
        // is `running` with `run_at` in the future.
        assert!(store
            .try_claim(&id, now, Duration::from_secs(30))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn expired_lease_is_reclaimable() {
        let store = job_store();
        let now = Utc::now();
        let job = pending_job(now);
        let id = job.id.clone();
        store.enqueue(job).await.unwrap();

        store
            .try_claim(&id, now, Duration::from_secs(30))
            .await
            .unwrap();

        let after_lease = now + chrono::Duration::seconds(31);
        let reclaimed = store
            .try_claim(&id, after_lease, Duration::from_secs(30))
            .await
            .unwrap();
        assert!(reclaimed.is_some());
    }

    #[tokio::test]
    async fn mark_completed_removes_the_job_from_the_index() {
        let store = job_store();
        let now = Utc::now();
        let job = pending_job(now);
        let id = job.id.clone();
        store.enqueue(job).await.unwrap();

        store.mark_completed(&id, now).await.unwrap();
        assert!(store.list_due(now, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reschedule_bumps_attempt_and_keeps_the_index_entry() {
        let store = job_store();
        let now = Utc::now();
        let job = pending_job(now);
        let id = job.id.clone();
        store.enqueue(job).await.unwrap();
        store
            .try_claim(&id, now, Duration::from_secs(30))
            .await
            .unwrap();

        let next_run_at = now + chrono::Duration::seconds(5);
        store
            .reschedule(&id, next_run_at, now, Some("staging_object_missing".into()))
            .await
            .unwrap();

        let rescheduled = store.get(&id).await.unwrap().unwrap();
        assert_eq!(rescheduled.attempt, 1);
        assert_eq!(rescheduled.status, JobStatus::Pending);
        assert_eq!(
            rescheduled.last_error.as_deref(),
            Some("staging_object_missing")
        );

        let due = store.list_due(next_run_at, 10).await.unwrap();
        assert_eq!(due.len(), 1);
    }

    #[tokio::test]
    async fn bookkeeping_ops_on_missing_job_are_silent_no_ops() {
        let store = job_store();
        let id = JobId::generate();
        let now = Utc::now();
        store.mark_completed(&id, now).await.unwrap();
        store.mark_failed(&id, now, "whatever").await.unwrap();
        store.reschedule(&id, now, now, None).await.unwrap();
    }
}
