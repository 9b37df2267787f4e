//! On-disk macro storage: one JSON file per (map, direction) under
//! `<root>/<map>/<direction>.json`.

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use serde::Serialize;

use crate::geometry::Direction;
use crate::trace::InputTrace;

#[derive(Clone, Debug)]
pub struct MacroStore {
    root: PathBuf,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct PruneReport {
    pub files: usize,
    pub rewritten: usize,
    pub frames_removed: usize,
    pub failures: Vec<String>,
}

impl MacroStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, map: &str, direction: Direction) -> Result<PathBuf> {
        Ok(self
            .map_dir(map)?
            .join(format!("{}.json", direction.as_str())))
    }

    fn map_dir(&self, map: &str) -> Result<PathBuf> {
        validate_map_name(map)?;
        Ok(self.root.join(map))
    }

    /// Writes `trace` wholesale, replacing any earlier recording.
    pub fn save(&self, map: &str, direction: Direction, trace: &InputTrace) -> Result<PathBuf> {
        let path = self.path_for(map, direction)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed creating directory {}", parent.display()))?;
        }
        let encoded = serde_json::to_vec(trace)?;
        fs::write(&path, encoded).with_context(|| format!("failed writing {}", path.display()))?;
        Ok(path)
    }

    /// `Ok(None)` when nothing has been recorded for this slot.
    pub fn load(&self, map: &str, direction: Direction) -> Result<Option<InputTrace>> {
        let path = self.path_for(map, direction)?;
        read_trace(&path)
    }

    pub fn saved_directions(&self, map: &str) -> Result<BTreeSet<Direction>> {
        let dir = self.map_dir(map)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("failed listing {}", dir.display()))
            }
        };

        let mut directions = BTreeSet::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(direction) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<Direction>().ok())
            {
                directions.insert(direction);
            }
        }
        Ok(directions)
    }

    pub fn maps(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed listing {}", self.root.display()))
            }
        };

        let mut maps: Vec<String> = entries
            .flatten()
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect();
        maps.sort();
        Ok(maps)
    }

    pub fn delete(&self, map: &str, direction: Direction) -> Result<bool> {
        let path = self.path_for(map, direction)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).with_context(|| format!("failed removing {}", path.display())),
        }
    }

    /// Re-applies padding trimming to every stored trace, in parallel. Files that
    /// fail to parse are reported and left untouched.
    pub fn prune_all(&self) -> Result<PruneReport> {
        let mut files = Vec::new();
        for map in self.maps()? {
            for direction in self.saved_directions(&map)? {
                files.push(self.path_for(&map, direction)?);
            }
        }

        let outcomes: Vec<Result<usize, String>> = files
            .par_iter()
            .map(|path| prune_file(path).map_err(|err| format!("{}: {err:#}", path.display())))
            .collect();

        let mut report = PruneReport {
            files: files.len(),
            ..PruneReport::default()
        };
        for outcome in outcomes {
            match outcome {
                Ok(0) => {}
                Ok(removed) => {
                    report.rewritten += 1;
                    report.frames_removed += removed;
                }
                Err(message) => {
                    tracing::warn!("prune skipped {message}");
                    report.failures.push(message);
                }
            }
        }
        Ok(report)
    }
}

fn read_trace(path: &Path) -> Result<Option<InputTrace>> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err).with_context(|| format!("failed reading {}", path.display())),
    };
    let trace = serde_json::from_slice(&raw)
        .with_context(|| format!("invalid macro file {}", path.display()))?;
    Ok(Some(trace))
}

fn prune_file(path: &Path) -> Result<usize> {
    let trace = read_trace(path)?.ok_or_else(|| anyhow!("file vanished"))?;
    let trimmed = trace.trimmed();
    let removed = trace.len() - trimmed.len();
    if removed > 0 {
        fs::write(path, serde_json::to_vec(&trimmed)?)
            .with_context(|| format!("failed writing {}", path.display()))?;
    }
    Ok(removed)
}

fn validate_map_name(map: &str) -> Result<()> {
    let name = map.trim();
    if name.is_empty() {
        return Err(anyhow!("map name is empty"));
    }
    if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(anyhow!("invalid map name (must not be a path): {map}"));
    }
    Ok(())
}
