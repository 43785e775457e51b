// Scratch directory shared by all executions. Nothing inside it is shared:
// every run gets its own directory no other invocation can produce, used
// as both the program's location and its working directory.
use anyhow::{Context, Result};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// File name of the wrapped program inside its run directory.
const PROGRAM_STEM: &str = "main";

#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Create the workspace root if it does not exist yet. Idempotent.
    pub fn create(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reserve a fresh run directory and write `contents` into its program
    /// file.
    ///
    /// The directory and everything the run leaves in it are removed when
    /// the returned guard is dropped, including when writing fails halfway.
    pub async fn allocate(&self, prefix: &str, extension: &str, contents: &str) -> Result<RunDirectory> {
        let dir = self.root.join(unique_dir_name(prefix));

        tokio::fs::create_dir(&dir)
            .await
            .with_context(|| format!("Failed to create run directory {}", dir.display()))?;

        let guard = RunDirectory {
            program: dir.join(format!("{}.{}", PROGRAM_STEM, extension.trim_start_matches('.'))),
            dir,
        };

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&guard.program)
            .await
            .with_context(|| format!("Failed to create program file {}", guard.program.display()))?;

        file.write_all(contents.as_bytes())
            .await
            .with_context(|| format!("Failed to write program file {}", guard.program.display()))?;
        file.flush().await.context("Failed to flush program file")?;

        debug!(dir = %guard.dir.display(), bytes = contents.len(), "Run directory allocated");
        Ok(guard)
    }
}

/// Delete a run directory and whatever is in it. Already-absent paths are
/// fine; other failures are logged and swallowed so cleanup never masks an
/// execution result.
pub fn release(path: &Path) {
    let removed = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };

    match removed {
        Ok(()) => debug!(path = %path.display(), "Workspace entry released"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to release workspace entry"),
    }
}

/// Run directory guard - guarantees recursive removal on drop
#[derive(Debug)]
pub struct RunDirectory {
    dir: PathBuf,
    program: PathBuf,
}

impl RunDirectory {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Drop for RunDirectory {
    fn drop(&mut self) {
        release(&self.dir);
    }
}

/// `<prefix>_<unix nanos>_<uuid>`
fn unique_dir_name(prefix: &str) -> String {
    let prefix: String = prefix
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let token = uuid::Uuid::new_v4().simple();

    format!("{}_{}_{}", prefix, nanos, token)
}
