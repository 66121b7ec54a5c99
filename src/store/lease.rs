//! Writer lease: an exclusive sentinel file beside the store.
//!
//! The lease is the only cross-process coordination primitive. Contention
//! returns `busy` immediately, with no spin and no wait. The sentinel records
//! metadata so a `busy` error can say who holds the store.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use fs_err::{self as fs, OpenOptions};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LeaseOwnerHint, Result, WaxError};

/// Suffix appended to the store path to form the sentinel path.
pub const LEASE_SUFFIX: &str = ".writer.lock";

#[derive(Debug, Serialize, Deserialize)]
struct LeaseRecord {
    pid: u32,
    command: String,
    started_at_ms: u64,
}

impl LeaseRecord {
    fn current() -> Self {
        Self {
            pid: std::process::id(),
            command: std::env::args().collect::<Vec<_>>().join(" "),
            started_at_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
                .unwrap_or(0),
        }
    }

    fn to_owner_hint(&self) -> LeaseOwnerHint {
        LeaseOwnerHint {
            pid: Some(self.pid),
            command: Some(self.command.clone()),
            started_at: Some(self.started_at_ms.to_string()),
        }
    }
}

/// Held writer lease; dropping it removes the sentinel.
#[derive(Debug)]
pub struct WriterLease {
    lease_path: PathBuf,
}

impl WriterLease {
    /// Acquires the lease by creating the sentinel exclusively. An existing
    /// sentinel means another writer is live: fail with `busy` right away.
    pub fn acquire(store_path: &Path) -> Result<Self> {
        let lease_path = lease_path(store_path);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lease_path)
        {
            Ok(mut file) => {
                let record = LeaseRecord::current();
                if let Ok(json) = serde_json::to_vec(&record) {
                    let _ = file.write_all(&json);
                    let _ = file.flush();
                }
                debug!(path = %lease_path.display(), "writer lease acquired");
                Ok(Self { lease_path })
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                let owner = fs::read(&lease_path)
                    .ok()
                    .and_then(|bytes| serde_json::from_slice::<LeaseRecord>(&bytes).ok())
                    .map(|record| record.to_owner_hint());
                Err(WaxError::Busy {
                    path: store_path.to_path_buf(),
                    owner,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.lease_path
    }
}

impl Drop for WriterLease {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lease_path);
    }
}

/// Sentinel path for a store path: `<path>.writer.lock`.
#[must_use]
pub fn lease_path(store_path: &Path) -> PathBuf {
    let mut name = store_path.as_os_str().to_os_string();
    name.push(LEASE_SUFFIX);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn second_acquire_is_busy_until_release() {
        let dir = tempfile::tempdir().expect("tmp");
        let store = dir.path().join("mem.mv2s");

        let lease = WriterLease::acquire(&store).expect("first acquire");
        let err = WriterLease::acquire(&store).expect_err("second must fail");
        assert_eq!(err.kind(), ErrorKind::Busy);
        match err {
            WaxError::Busy { owner, .. } => {
                let owner = owner.expect("owner hint recorded");
                assert_eq!(owner.pid, Some(std::process::id()));
            }
            other => panic!("unexpected error: {other}"),
        }

        drop(lease);
        WriterLease::acquire(&store).expect("acquire after release");
    }

    #[test]
    fn lease_path_appends_suffix() {
        let path = lease_path(Path::new("/tmp/a.mv2s"));
        assert_eq!(path, PathBuf::from("/tmp/a.mv2s.writer.lock"));
    }
}
