use anyhow::{Context, Result};
use core_types::RaceSession;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// A session file holds either one session or an array of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum SessionFile {
    Many(Vec<RaceSession>),
    One(Box<RaceSession>),
}

/// Reads every `*.json` file in `dir`, in file name order.
pub fn load_sessions(dir: &Path) -> Result<Vec<RaceSession>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read input directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut sessions = Vec::new();
    for path in &paths {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file: SessionFile = serde_json::from_str(&contents)
            .with_context(|| format!("{} is not a race session document", path.display()))?;
        match file {
            SessionFile::Many(many) => sessions.extend(many),
            SessionFile::One(one) => sessions.push(*one),
        }
    }

    tracing::info!(
        files = paths.len(),
        sessions = sessions.len(),
        dir = %dir.display(),
        "Loaded race sessions."
    );
    Ok(sessions)
}
