//! Single-writer guard for the state directory
//!
//! The lease is a file holding the owner's PID. It is staged in a temp file
//! and linked into place without clobbering, so it never appears empty. Only
//! one live process can hold it; a lease left behind by a process that no
//! longer runs is reclaimed on the next acquire.

use crate::error::{ConfigError, Result};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

pub const LEASE_FILE: &str = "authority.lock";

/// How long an unreadable lease file is assumed to be mid-write by someone else
pub const UNREADABLE_LEASE_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct AuthorityLease {
    state_dir: PathBuf,
    path: PathBuf,
    pid: u32,
}

/// What an existing lease file says about its holder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeaseFile {
    Missing,
    Holder(u32),
    Unreadable { age: Duration },
}

impl AuthorityLease {
    /// Take the lease for `state_dir`, reclaiming it from a dead holder
    pub fn acquire(state_dir: &Path) -> Result<Self> {
        fs::create_dir_all(state_dir)?;
        let path = state_dir.join(LEASE_FILE);
        let pid = std::process::id();

        let mut staged = NamedTempFile::new_in(state_dir)?;
        writeln!(staged, "{}", pid)?;
        staged.as_file().sync_all()?;

        // Second pass only happens after removing a stale lease
        for _ in 0..2 {
            match staged.persist_noclobber(&path) {
                Ok(_) => {
                    debug!(path = %path.display(), pid, "Authority lease acquired");
                    return Ok(AuthorityLease {
                        state_dir: state_dir.to_path_buf(),
                        path,
                        pid,
                    });
                }
                Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                    staged = e.file;
                    match inspect(&path)? {
                        LeaseFile::Holder(holder) if process_alive(holder) => {
                            return Err(ConfigError::LeaseHeld { pid: holder });
                        }
                        LeaseFile::Unreadable { age } if age < UNREADABLE_LEASE_GRACE => {
                            return Err(ConfigError::LeaseContended { path });
                        }
                        LeaseFile::Missing => {}
                        stale => {
                            warn!(
                                path = %path.display(),
                                stale = ?stale,
                                "Reclaiming stale authority lease"
                            );
                            remove_if_exists(&path)?;
                        }
                    }
                }
                Err(e) => return Err(e.error.into()),
            }
        }

        match inspect(&path)? {
            LeaseFile::Holder(holder) => Err(ConfigError::LeaseHeld { pid: holder }),
            _ => Err(ConfigError::LeaseContended { path }),
        }
    }

    /// PID of the live process holding the lease for `state_dir`, if any
    pub fn holder(state_dir: &Path) -> Result<Option<u32>> {
        Ok(read_holder(&state_dir.join(LEASE_FILE))?.filter(|pid| process_alive(*pid)))
    }

    /// Fails with `LeaseLost` unless the lease file still names this process
    pub fn verify(&self) -> Result<()> {
        match read_holder(&self.path)? {
            Some(holder) if holder == self.pid => Ok(()),
            holder => Err(ConfigError::LeaseLost {
                path: self.path.clone(),
                holder,
            }),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Release explicitly; dropping the lease does the same
    pub fn release(self) {}
}

impl Drop for AuthorityLease {
    fn drop(&mut self) {
        // Only remove the file if it still names us
        if let Ok(Some(holder)) = read_holder(&self.path) {
            if holder == self.pid {
                if let Err(e) = fs::remove_file(&self.path) {
                    warn!(path = %self.path.display(), error = %e, "Failed to release authority lease");
                }
            }
        }
    }
}

fn inspect(path: &Path) -> Result<LeaseFile> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(LeaseFile::Missing),
        Err(e) => return Err(e.into()),
    };
    if let Ok(pid) = contents.trim().parse() {
        return Ok(LeaseFile::Holder(pid));
    }
    let age = match fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(LeaseFile::Missing),
        Err(e) => return Err(e.into()),
    };
    Ok(LeaseFile::Unreadable { age })
}

fn read_holder(path: &Path) -> Result<Option<u32>> {
    Ok(match inspect(path)? {
        LeaseFile::Holder(pid) => Some(pid),
        LeaseFile::Missing | LeaseFile::Unreadable { .. } => None,
    })
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn process_alive(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    fn backdate(path: &Path, by: Duration) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - by).unwrap();
    }

    #[test]
    fn test_acquire_and_release() {
        let dir = tempdir().unwrap();
        let lease = AuthorityLease::acquire(dir.path()).unwrap();
        assert_eq!(lease.pid(), std::process::id());
        assert!(dir.path().join(LEASE_FILE).exists());
        assert_eq!(
            AuthorityLease::holder(dir.path()).unwrap(),
            Some(std::process::id())
        );
        lease.verify().unwrap();

        lease.release();
        assert!(!dir.path().join(LEASE_FILE).exists());
        assert_eq!(AuthorityLease::holder(dir.path()).unwrap(), None);
    }

    #[test]
    fn test_lease_file_never_appears_empty() {
        let dir = tempdir().unwrap();
        let _lease = AuthorityLease::acquire(dir.path()).unwrap();

        let contents = fs::read_to_string(dir.path().join(LEASE_FILE)).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());
        // No staging files left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_second_acquire_is_refused_while_held() {
        let dir = tempdir().unwrap();
        let _lease = AuthorityLease::acquire(dir.path()).unwrap();

        let err = AuthorityLease::acquire(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::LeaseHeld { pid } if pid == std::process::id()));
    }

    #[test]
    fn test_fresh_unreadable_lease_is_not_taken() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LEASE_FILE);
        fs::write(&path, "").unwrap();

        let err = AuthorityLease::acquire(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::LeaseContended { .. }));
        assert!(path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_stale_lease_is_reclaimed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LEASE_FILE);
        // Garbage contents name no live process
        fs::write(&path, "not-a-pid\n").unwrap();
        backdate(&path, UNREADABLE_LEASE_GRACE * 2);

        let lease = AuthorityLease::acquire(dir.path()).unwrap();
        assert_eq!(lease.pid(), std::process::id());
    }

    #[test]
    fn test_displaced_lease_fails_verification() {
        let dir = tempdir().unwrap();
        let lease = AuthorityLease::acquire(dir.path()).unwrap();

        fs::write(dir.path().join(LEASE_FILE), "4194304\n").unwrap();
        let err = lease.verify().unwrap_err();
        assert!(matches!(err, ConfigError::LeaseLost { holder: Some(4194304), .. }));

        // Someone else's lease is left alone on drop
        drop(lease);
        assert!(dir.path().join(LEASE_FILE).exists());
    }
}
