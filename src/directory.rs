use crate::errors::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::watch;

const PROBE_FILE: &str = ".canvas-notes-probe";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectoryState {
    notes_directory: PathBuf,
}

/// Owns the persisted handle to the user-selected notes directory.
///
/// Selection verifies read-write access and persists the handle so it
/// survives process restarts; `persisted_directory` re-validates silently and
/// reports a missing or revoked handle as `None`, never as an error, so
/// startup cannot block on it.
pub struct DirectoryAccess {
    state_path: PathBuf,
    changed: watch::Sender<Option<PathBuf>>,
}

impl DirectoryAccess {
    /// `state_path` is the file the directory handle is persisted in,
    /// injected by the caller so no global state is involved.
    pub fn new(state_path: PathBuf) -> Self {
        let initial = load_state(&state_path).map(|state| state.notes_directory);
        let (changed, _) = watch::channel(initial);
        Self { state_path, changed }
    }

    /// Interactive path: the UI has already picked `path`; verify read-write
    /// access, persist the handle, and notify subscribers.
    pub fn select_directory(&self, path: &Path) -> StoreResult<PathBuf> {
        fs::create_dir_all(path)
            .map_err(|error| StoreError::PermissionDenied(format!("{}: {}", path.display(), error)))?;
        verify_read_write(path)?;
        let canonical = fs::canonicalize(path)?;

        if let Some(parent) = self.state_path.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                StoreError::UnsupportedEnvironment(format!(
                    "cannot persist directory handle under {}: {}",
                    parent.display(),
                    error
                ))
            })?;
        }
        let state = DirectoryState {
            notes_directory: canonical.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&state)?;
        fs::write(&self.state_path, bytes)?;

        tracing::info!(directory = %canonical.display(), "notes directory selected");
        let _ = self.changed.send(Some(canonical.clone()));
        Ok(canonical)
    }

    /// Silent path: load the persisted handle and re-check permission without
    /// any interaction. A missing handle, a vanished directory, and revoked
    /// permission all come back as `Ok(None)`.
    pub fn persisted_directory(&self) -> StoreResult<Option<PathBuf>> {
        let Some(state) = load_state(&self.state_path) else {
            return Ok(None);
        };
        let root = state.notes_directory;
        if !root.is_dir() {
            tracing::warn!(directory = %root.display(), "persisted notes directory no longer exists");
            return Ok(None);
        }
        if verify_read_write(&root).is_err() {
            tracing::warn!(directory = %root.display(), "persisted notes directory is no longer writable");
            return Ok(None);
        }
        Ok(Some(root))
    }

    pub fn has_selected_directory(&self) -> bool {
        matches!(self.persisted_directory(), Ok(Some(_)))
    }

    pub fn display_name(&self) -> Option<String> {
        let state = load_state(&self.state_path)?;
        state
            .notes_directory
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
    }

    /// Forget the persisted handle (explicit directory switch).
    pub fn clear(&self) -> StoreResult<()> {
        match fs::remove_file(&self.state_path) {
            Ok(()) => {}
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => return Err(error.into()),
        }
        let _ = self.changed.send(None);
        Ok(())
    }

    /// "Directory changed" notification for external collaborators.
    pub fn subscribe(&self) -> watch::Receiver<Option<PathBuf>> {
        self.changed.subscribe()
    }
}

fn load_state(state_path: &Path) -> Option<DirectoryState> {
    let bytes = fs::read(state_path).ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(state) => Some(state),
        Err(error) => {
            tracing::warn!(path = %state_path.display(), error = %error, "ignoring unreadable directory state file");
            None
        }
    }
}

fn verify_read_write(root: &Path) -> StoreResult<()> {
    fs::read_dir(root)
        .map_err(|error| StoreError::PermissionDenied(format!("{}: {}", root.display(), error)))?;
    let probe = root.join(PROBE_FILE);
    fs::write(&probe, b"probe")
        .map_err(|error| StoreError::PermissionDenied(format!("{}: {}", root.display(), error)))?;
    let _ = fs::remove_file(&probe);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn access_in(dir: &Path) -> DirectoryAccess {
        DirectoryAccess::new(dir.join("state").join("directory.json"))
    }

    #[test]
    fn no_handle_means_none_not_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let access = access_in(dir.path());
        assert_eq!(access.persisted_directory().expect("silent check"), None);
        assert!(!access.has_selected_directory());
    }

    #[test]
    fn selection_persists_across_instances() {
        let dir = tempfile::tempdir().expect("tempdir");
        let notes_root = dir.path().join("My Notes");

        let access = access_in(dir.path());
        let selected = access.select_directory(&notes_root).expect("select");
        assert!(selected.is_dir());

        let reopened = access_in(dir.path());
        let persisted = reopened
            .persisted_directory()
            .expect("silent check")
            .expect("handle survives restart");
        assert_eq!(persisted, selected);
        assert_eq!(reopened.display_name().as_deref(), Some("My Notes"));
    }

    #[test]
    fn clear_forgets_the_handle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let access = access_in(dir.path());
        access.select_directory(&dir.path().join("notes")).expect("select");
        access.clear().expect("clear");
        assert!(!access.has_selected_directory());
        access.clear().expect("clearing twice is fine");
    }

    #[test]
    fn unwritable_state_location_is_unsupported_environment() {
        let dir = tempfile::tempdir().expect("tempdir");
        // A regular file where the state directory should go: the handle can
        // never be persisted there.
        let blocker = dir.path().join("state");
        fs::write(&blocker, b"not a directory").expect("seed blocker file");

        let access = DirectoryAccess::new(blocker.join("directory.json"));
        let error = access
            .select_directory(&dir.path().join("notes"))
            .expect_err("state parent cannot be created");
        assert!(matches!(error, StoreError::UnsupportedEnvironment(_)));
    }

    #[test]
    fn selection_notifies_subscribers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let access = access_in(dir.path());
        let receiver = access.subscribe();
        assert_eq!(*receiver.borrow(), None);

        let selected = access.select_directory(&dir.path().join("notes")).expect("select");
        assert_eq!(*receiver.borrow(), Some(selected));
    }

    #[cfg(unix)]
    #[test]
    fn revoked_permission_reads_as_none() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let access = access_in(dir.path());
        let notes_root = access
            .select_directory(&dir.path().join("notes"))
            .expect("select");

        let mut perms = fs::metadata(&notes_root).expect("metadata").permissions();
        perms.set_mode(0o555);
        fs::set_permissions(&notes_root, perms).expect("drop write permission");

        assert_eq!(access.persisted_directory().expect("silent check"), None);

        let mut restore = fs::metadata(&notes_root).expect("metadata").permissions();
        restore.set_mode(0o755);
        fs::set_permissions(&notes_root, restore).expect("restore permission");
    }
}
