//! Content-addressed experiment storage on disk.
//!
//! Layout under the output directory:
//!
//! ```text
//! <output_dir>/<group>/summary.json
//! <output_dir>/<group>/<hash>/params.json
//! <output_dir>/<group>/<hash>/results.json
//! ```
//!
//! `<hash>` is the [`content_hash`](crate::tree::content_hash) of the
//! sampled parameters, so re-running a search finds the results of every
//! experiment it already completed. Files are read under a shared lock and
//! written under an exclusive one, so several processes may share a group.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::tree::JsonMap;

/// Name of the parameter file inside an experiment directory.
pub const PARAMS_FILE: &str = "params.json";
/// Name of the result file inside an experiment directory.
pub const RESULTS_FILE: &str = "results.json";
/// Name of the group summary file.
pub const SUMMARY_FILE: &str = "summary.json";

/// Paths of one experiment.
///
/// The default value holds empty paths and stands for an experiment that
/// is not persisted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentPaths {
    /// The experiment directory.
    pub experiment_dir: PathBuf,
    /// The parameter file.
    pub params_path: PathBuf,
    /// The result file.
    pub results_path: PathBuf,
}

/// Best experiment of a group, as written to `summary.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// The group name.
    pub group: String,
    /// Directory of the best experiment.
    pub experiment_dir: PathBuf,
    /// Objective of the best experiment, on the minimization scale.
    pub objective: f64,
    /// Resolved parameters of the best experiment.
    pub params: JsonMap,
    /// Results of the best experiment.
    pub results: JsonMap,
}

/// One experiment group on disk.
#[derive(Clone, Debug)]
pub struct ExperimentStore {
    group: String,
    group_dir: PathBuf,
}

impl ExperimentStore {
    /// Opens the group `group` under `output_dir`. Nothing is created until
    /// the first write.
    #[must_use]
    pub fn new(output_dir: impl AsRef<Path>, group: impl Into<String>) -> Self {
        let group = group.into();
        let group_dir = output_dir.as_ref().join(&group);
        Self { group, group_dir }
    }

    /// The group name.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// The group directory.
    #[must_use]
    pub fn group_dir(&self) -> &Path {
        &self.group_dir
    }

    /// Path of the group summary file.
    #[must_use]
    pub fn summary_path(&self) -> PathBuf {
        self.group_dir.join(SUMMARY_FILE)
    }

    /// Paths of the experiment with content hash `hash`.
    #[must_use]
    pub fn paths(&self, hash: &str) -> ExperimentPaths {
        let experiment_dir = self.group_dir.join(hash);
        ExperimentPaths {
            params_path: experiment_dir.join(PARAMS_FILE),
            results_path: experiment_dir.join(RESULTS_FILE),
            experiment_dir,
        }
    }

    /// Stored results of an experiment, or `None` if it never completed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedResults`] if the file exists but does not
    /// hold a JSON object, and [`Error::Io`] if it cannot be read.
    pub fn cached_results(&self, paths: &ExperimentPaths) -> Result<Option<JsonMap>> {
        if !paths.results_path.is_file() {
            return Ok(None);
        }
        read_results(&paths.results_path).map(Some)
    }

    /// Writes `params.json`, creating the experiment directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the directory or file cannot be written.
    pub fn write_params(&self, paths: &ExperimentPaths, params: &JsonMap) -> Result<()> {
        fs::create_dir_all(&paths.experiment_dir).map_err(|e| Error::io(&paths.experiment_dir, e))?;
        write_json(&paths.params_path, params)
    }

    /// Writes `results.json`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be written.
    pub fn write_results(&self, paths: &ExperimentPaths, results: &JsonMap) -> Result<()> {
        fs::create_dir_all(&paths.experiment_dir).map_err(|e| Error::io(&paths.experiment_dir, e))?;
        write_json(&paths.results_path, results)
    }

    /// Writes the group summary and returns its path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be written.
    pub fn write_summary(&self, summary: &Summary) -> Result<PathBuf> {
        fs::create_dir_all(&self.group_dir).map_err(|e| Error::io(&self.group_dir, e))?;
        let path = self.summary_path();
        write_json(&path, summary)?;
        trace_info!(path = %path.display(), "summary written");
        Ok(path)
    }

    /// Reads the group summary.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and
    /// [`Error::Serialization`] if it is not a valid summary.
    pub fn read_summary(&self) -> Result<Summary> {
        let path = self.summary_path();
        let text = read_locked(&path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Reads a result file written by an evaluation.
///
/// # Errors
///
/// Returns [`Error::MissingResults`] if the file does not exist and
/// [`Error::MalformedResults`] if it does not hold a JSON object.
pub fn read_results(path: &Path) -> Result<JsonMap> {
    if !path.is_file() {
        return Err(Error::MissingResults {
            path: path.to_path_buf(),
        });
    }
    let text = read_locked(path)?;
    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(Error::MalformedResults {
            path: path.to_path_buf(),
            reason: format!("expected a JSON object, found {}", json_kind(&other)),
        }),
        Err(e) => Err(Error::MalformedResults {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn read_locked(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| Error::io(path, e))?;
    file.lock_shared().map_err(|e| Error::io(path, e))?;
    let mut text = String::new();
    let read = file.read_to_string(&mut text);
    file.unlock().map_err(|e| Error::io(path, e))?;
    read.map_err(|e| Error::io(path, e))?;
    Ok(text)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .map_err(|e| Error::io(path, e))?;
    file.lock_exclusive().map_err(|e| Error::io(path, e))?;

    let written = file
        .set_len(0)
        .and_then(|()| file.write_all(text.as_bytes()))
        .and_then(|()| file.write_all(b"\n"))
        .and_then(|()| file.flush());
    file.unlock().map_err(|e| Error::io(path, e))?;
    written.map_err(|e| Error::io(path, e))
}
