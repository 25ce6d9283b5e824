// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Atomically write data to a file using a temporary file and rename.
/// This prevents a reader from ever seeing a half-written PEM file.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    use std::io::Write;

    let temp_path = temp_path_for(path)?;

    let mut file = fs::File::create(&temp_path).map_err(|e| Error::WriteFile {
        path: temp_path.clone(),
        source: e,
    })?;

    file.write_all(contents).map_err(|e| Error::WriteFile {
        path: temp_path.clone(),
        source: e,
    })?;

    file.sync_all().map_err(|e| Error::WriteFile {
        path: temp_path.clone(),
        source: e,
    })?;

    drop(file);

    rename_into_place(&temp_path, path)
}

/// Atomically write a private key with owner-only permissions.
pub fn atomic_write_secret(path: &Path, contents: &[u8]) -> Result<()> {
    let temp_path = temp_path_for(path)?;
    write_secret_file(&temp_path, contents)?;
    rename_into_place(&temp_path, path)
}

fn temp_path_for(path: &Path) -> Result<std::path::PathBuf> {
    // Same directory as the target so the rename stays on one filesystem.
    let parent = path.parent().ok_or_else(|| Error::WriteFile {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent"),
    })?;
    let random_suffix: u64 = rand::Rng::random(&mut rand::rng());
    Ok(parent.join(format!(".tmp-{:x}", random_suffix)))
}

fn rename_into_place(temp_path: &Path, path: &Path) -> Result<()> {
    fs::rename(temp_path, path).map_err(|e| {
        if temp_path.exists() {
            let _ = fs::remove_file(temp_path);
        }
        Error::WriteFile {
            path: path.to_path_buf(),
            source: e,
        }
    })
}

#[cfg(unix)]
pub fn write_secret_file(path: &Path, contents: &[u8]) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .map_err(|e| Error::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })?;

    file.write_all(contents).map_err(|e| Error::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    Ok(())
}

#[cfg(not(unix))]
pub fn write_secret_file(path: &Path, contents: &[u8]) -> Result<()> {
    fs::write(path, contents).map_err(|e| Error::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Remove a file, treating "already gone" as success.
pub fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Remove {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| Error::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })
}
