use std::io;
use std::path::{Path, PathBuf};

use futures::future::try_join_all;

/// Ephemeral per-job directory tree under `<tmp>/<namespace>/<jobId>`.
///
/// Owned by the pipeline service: created before stack execution and
/// removed on every exit path unless debug mode keeps it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDirs {
    pub root: PathBuf,
    pub video: PathBuf,
    pub frames: PathBuf,
    pub candidates: PathBuf,
    pub extracted: PathBuf,
    pub final_dir: PathBuf,
    pub commercial: PathBuf,
}

impl WorkDirs {
    /// Compute the layout without touching the filesystem.
    pub fn layout(tmp: &Path, namespace: &str, job_id: &str) -> Self {
        let root = tmp.join(namespace).join(job_id);
        Self {
            video: root.join("video"),
            frames: root.join("frames"),
            candidates: root.join("candidates"),
            extracted: root.join("extracted"),
            final_dir: root.join("final"),
            commercial: root.join("commercial"),
            root,
        }
    }

    fn subdirs(&self) -> [&Path; 6] {
        [
            &self.video,
            &self.frames,
            &self.candidates,
            &self.extracted,
            &self.final_dir,
            &self.commercial,
        ]
    }

    /// Create the root and all six subdirectories, subdirs in parallel.
    pub async fn create(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        try_join_all(
            self.subdirs()
                .into_iter()
                .map(|dir| tokio::fs::create_dir_all(dir.to_path_buf())),
        )
        .await?;
        Ok(())
    }

    /// Remove the whole tree; a missing root is fine.
    pub async fn remove(&self) -> io::Result<()> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    pub fn exists(&self) -> bool {
        self.root.exists()
    }
}
