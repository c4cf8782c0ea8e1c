//! Scratch directories and the file-based inputs and outputs of a run.

use rand::Rng;
use rand::seq::SliceRandom;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};

/// Removes `path` if present and recreates it empty.
pub fn reset(path: &Path) -> io::Result<()> {
    if path.exists() {
        debug!("Removing existing dir '{}'", path.display());
        fs::remove_dir_all(path)?;
    }
    fs::create_dir_all(path)?;
    Ok(())
}

/// Regular, non-hidden files of `dir`, sorted by name.
pub fn list_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if !hidden && entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Picks one background video uniformly at random.
pub fn pick_background<R: Rng + ?Sized>(dir: &Path, rng: &mut R) -> Result<PathBuf> {
    let files = match list_files(dir) {
        Ok(files) => files,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(e.into()),
    };
    files
        .choose(rng)
        .cloned()
        .ok_or_else(|| PipelineError::NoBackgroundVideo(dir.to_path_buf()))
}

/// The overlay image, if the images directory holds one. More than one is an error.
pub fn find_overlay(dir: &Path) -> Result<Option<PathBuf>> {
    let mut files = match list_files(dir) {
        Ok(files) => files,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    match files.len() {
        0 => Ok(None),
        1 => Ok(files.pop()),
        count => Err(PipelineError::AmbiguousOverlay {
            dir: dir.to_path_buf(),
            count,
        }),
    }
}

/// `story<N>.mp4`, where N is the number of entries already in `dir`.
pub fn next_output_path(dir: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let mut index = fs::read_dir(dir)?.count();
    loop {
        let candidate = dir.join(format!("story{}.mp4", index));
        if !candidate.exists() {
            return Ok(candidate);
        }
        index += 1;
    }
}

/// Exclusive claim on a workspace, released when dropped.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(workspace: &Path) -> Result<Self> {
        fs::create_dir_all(workspace)?;
        let path = workspace.join(".lock");
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id())?;
                info!("Locked workspace '{}'", workspace.display());
                Ok(Self { path })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(PipelineError::Busy(workspace.to_path_buf()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
