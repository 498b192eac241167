//! Staged backing files.
//!
//! An upload never writes to a record's final path. Bytes go to a uniquely
//! named sibling (`<final>.partial-<uuid>`) that only becomes visible through
//! [`StagedFile::commit`]. Dropping an uncommitted guard removes the staging
//! file, so an aborted or failed upload leaves nothing behind and never
//! touches the previously committed file.

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

pub struct StagedFile {
    path: PathBuf,
    file: Option<BufWriter<File>>,
    armed: bool,
}

impl StagedFile {
    /// Create a fresh staging file next to `final_path`.
    pub async fn create(final_path: &Path) -> io::Result<Self> {
        let path = staging_path(final_path);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        debug!(path = %path.display(), "staging file created");
        Ok(Self {
            path,
            file: Some(BufWriter::new(file)),
            armed: true,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer()?.write_all(bytes).await
    }

    /// Flush and fsync; the file is closed afterwards.
    pub async fn finish(&mut self) -> io::Result<()> {
        let writer = self.writer()?;
        writer.flush().await?;
        writer.get_ref().sync_all().await?;
        self.file = None;
        Ok(())
    }

    /// Atomically move the staged bytes to `final_path`.
    ///
    /// On error the guard stays armed and the staging file is removed on drop.
    pub async fn commit(mut self, final_path: &Path) -> io::Result<()> {
        if self.file.is_some() {
            self.finish().await?;
        }
        tokio::fs::rename(&self.path, final_path).await?;
        self.armed = false;
        Ok(())
    }

    fn writer(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("staging file already finished"))
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.file = None;
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "staging file discarded"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), "failed to remove staging file: {e}"),
        }
    }
}

fn staging_path(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_owned();
    name.push(format!(".partial-{}", uuid::Uuid::new_v4()));
    PathBuf::from(name)
}
