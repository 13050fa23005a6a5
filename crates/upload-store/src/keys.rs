//! Key-space conventions for the upload metadata, job, and job-index
//! namespaces. Bit-exact across processes is required for cross-worker
//! compatibility.

use upload_core::{JobId, UploadId};

/// Builds the namespaced keys the store uses under a configured prefix.
#[derive(Debug, Clone)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    /// Construct a key space rooted at `prefix` (no trailing slash expected).
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Key for an upload's metadata record.
    #[must_use]
    pub fn upload_metadata(&self, id: &UploadId) -> String {
        format!("{}/uploads/metadata/{id}", self.prefix)
    }

    /// Key for a finalize job record.
    #[must_use]
    pub fn job(&self, id: &JobId) -> String {
        format!("{}/uploads/jobs/{id}", self.prefix)
    }

    /// Key for the shared job index.
    #[must_use]
    pub fn job_index(&self) -> String {
        format!("{}/uploads/job-index/index", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_under_the_configured_prefix() {
        let keys = KeySpace::new("acme");
        let upload_id = UploadId::generate();
        let job_id = JobId::generate();

        assert_eq!(
            keys.upload_metadata(&upload_id),
            format!("acme/uploads/metadata/{upload_id}")
        );
        assert_eq!(keys.job(&job_id), format!("acme/uploads/jobs/{job_id}"));
        assert_eq!(keys.job_index(), "acme/uploads/job-index/index");
    }
}
