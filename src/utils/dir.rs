use std::{env, io, path::PathBuf};

use anyhow::{Context, Result};

/// Directory holding settings, logs and, unless configured otherwise, the tracker data.
pub fn create_application_default_path() -> Result<PathBuf> {
    let path = {
        #[cfg(windows)]
        {
            let mut path = env::var("APPDATA")
                .map(PathBuf::from)
                .context("APPDATA should be present on Windows")?;
            path.push("ratchet");
            path
        }
        #[cfg(not(windows))]
        {
            let mut path = env::var("XDG_DATA_HOME")
                .map(PathBuf::from)
                .or_else(|_| {
                    env::var("HOME").map(|home| {
                        let mut path = PathBuf::from(home);
                        path.push(".local/share");
                        path
                    })
                })
                .context("Couldn't find neither XDG_DATA_HOME nor HOME")?;
            path.push("ratchet");
            path
        }
    };

    match std::fs::create_dir_all(&path) {
        Ok(_) => Ok(path),
        Err(v) if v.kind() == io::ErrorKind::AlreadyExists => Ok(path),
        Err(v) => Err(v.into()),
    }
}
