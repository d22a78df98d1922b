use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use tracing::warn;

/// A crashed run never unlinks its lock file; anything older than this is
/// treated as abandoned and broken.
const STALE_AFTER: Duration = Duration::from_secs(6 * 60 * 60);

/// Filesystem lock preventing two scheduled runs of the same job from
/// overlapping. Released on drop.
pub struct JobLock {
    path: PathBuf,
}

impl JobLock {
    pub fn acquire(path: &Path) -> anyhow::Result<Self> {
        Self::acquire_with_stale_timeout(path, STALE_AFTER)
    }

    fn acquire_with_stale_timeout(path: &Path, stale_after: Duration) -> anyhow::Result<Self> {
        for attempt in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    writeln!(file, "{}", std::process::id())
                        .with_context(|| format!("writing lock file {}", path.display()))?;
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && attempt == 0 => {
                    let age = fs::metadata(path)
                        .and_then(|m| m.modified())
                        .ok()
                        .and_then(|t| t.elapsed().ok())
                        .unwrap_or(Duration::ZERO);
                    if age < stale_after {
                        bail!(
                            "another run holds the lock at {} (age {}s)",
                            path.display(),
                            age.as_secs()
                        );
                    }
                    warn!(
                        "breaking stale lock at {} ({}s old)",
                        path.display(),
                        age.as_secs()
                    );
                    fs::remove_file(path)
                        .with_context(|| format!("removing stale lock {}", path.display()))?;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("creating lock {}", path.display()));
                }
            }
        }
        bail!("could not acquire lock at {}", path.display())
    }
}

impl Drop for JobLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("failed to remove lock {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lock_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("signal-pipeline-{}-{}.lock", name, std::process::id()))
    }

    #[test]
    fn test_second_acquire_fails_while_held() {
        let path = lock_path("held");
        let _guard = JobLock::acquire(&path).unwrap();
        assert!(JobLock::acquire(&path).is_err());
    }

    #[test]
    fn test_lock_released_on_drop() {
        let path = lock_path("release");
        {
            let _guard = JobLock::acquire(&path).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
        let _guard = JobLock::acquire(&path).unwrap();
    }

    #[test]
    fn test_stale_lock_is_broken() {
        let path = lock_path("stale");
        fs::write(&path, "12345\n").unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let guard = JobLock::acquire_with_stale_timeout(&path, Duration::from_millis(1)).unwrap();
        drop(guard);
        assert!(!path.exists());
    }
}
