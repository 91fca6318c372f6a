//! [`FileSnapshotStore`]: the local state as a JSON file.
//!
//! Writes go to a sibling temporary file which is synced and then renamed
//! over the snapshot, so a crash mid-write leaves the previous snapshot
//! intact. A snapshot that no longer parses is moved aside to
//! `<name>.corrupt` and the machine starts from defaults.

use std::{
  fs::{self, File},
  io::{self, Write as _},
  path::{Path, PathBuf},
};

use levelup_core::machine::{LocalState, SnapshotStore};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
  #[error("snapshot io error at {}: {source}", .path.display())]
  Io {
    path:   PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("snapshot encode error: {0}")]
  Encode(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> SnapshotError + '_ {
  move |source| SnapshotError::Io { path: path.to_path_buf(), source }
}

#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
  path: PathBuf,
}

impl FileSnapshotStore {
  pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }

  pub fn path(&self) -> &Path { &self.path }

  fn sibling(&self, suffix: &str) -> PathBuf {
    let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    self.path.with_file_name(name)
  }
}

impl SnapshotStore for FileSnapshotStore {
  type Error = SnapshotError;

  fn load(&self) -> Result<Option<LocalState>, SnapshotError> {
    let bytes = match fs::read(&self.path) {
      Ok(bytes) => bytes,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(io_error(&self.path)(e)),
    };

    match serde_json::from_slice::<LocalState>(&bytes) {
      Ok(state) => Ok(Some(state)),
      Err(e) => {
        let aside = self.sibling(".corrupt");
        tracing::warn!(
          path = %self.path.display(),
          moved_to = %aside.display(),
          error = %e,
          "local snapshot unreadable; starting fresh"
        );
        fs::rename(&self.path, &aside).map_err(io_error(&self.path))?;
        Ok(None)
      }
    }
  }

  fn save(&self, state: &LocalState) -> Result<(), SnapshotError> {
    if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
      fs::create_dir_all(dir).map_err(io_error(dir))?;
    }

    let json = serde_json::to_vec_pretty(state)?;
    let tmp = self.sibling(".tmp");
    {
      let mut file = File::create(&tmp).map_err(io_error(&tmp))?;
      file.write_all(&json).map_err(io_error(&tmp))?;
      file.sync_all().map_err(io_error(&tmp))?;
    }
    fs::rename(&tmp, &self.path).map_err(io_error(&self.path))
  }
}
