//! Durable trial log
//!
//! A CSV file with header `[<param names...>, validation_loss]` and one row
//! per completed trial, fully rewritten after each trial so a crash
//! mid-search loses at most the in-flight trial. A write failure is a
//! `Persistence` error and must stop the search: a corrupted log would
//! silently invalidate the resumability guarantee.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

use super::space::{ParameterValue, SearchSpace};

/// One completed trial: an immutable vector/objective pair
#[derive(Clone, Debug, PartialEq)]
pub struct Trial {
    pub vector: Vec<ParameterValue>,
    pub objective: f64,
}

impl Trial {
    pub fn new(vector: Vec<ParameterValue>, objective: f64) -> Self {
        Self { vector, objective }
    }
}

/// Rewrite-on-update CSV log of completed trials
pub struct TrialLog {
    path: PathBuf,
}

impl TrialLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn header(space: &SearchSpace) -> String {
        let mut columns = space.names().join(",");
        columns.push_str(",validation_loss");
        columns
    }

    /// Rewrite the whole log from the trial list (temp file + rename)
    pub fn rewrite(&self, space: &SearchSpace, trials: &[Trial]) -> Result<()> {
        let mut text = Self::header(space);
        text.push('\n');
        for trial in trials {
            let row: Vec<String> = trial.vector.iter().map(ToString::to_string).collect();
            text.push_str(&row.join(","));
            text.push(',');
            text.push_str(&trial.objective.to_string());
            text.push('\n');
        }

        let write = || -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let tmp = self.path.with_extension("csv.tmp");
            std::fs::write(&tmp, &text)?;
            std::fs::rename(&tmp, &self.path)
        };
        write().map_err(|e| Error::Persistence(format!("rewrite of {:?} failed: {e}", self.path)))
    }

    /// Load persisted trials; a missing file is an empty, fresh log
    pub fn load(&self, space: &SearchSpace) -> Result<Vec<Trial>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::Persistence(format!("read of {:?} failed: {e}", self.path)))?;

        let mut lines = text.lines();
        let header = lines
            .next()
            .ok_or_else(|| Error::Persistence("trial log is empty".to_string()))?;
        if header != Self::header(space) {
            return Err(Error::Persistence(format!(
                "trial log header '{header}' does not match the search space"
            )));
        }

        let mut trials = Vec::new();
        for (line_no, line) in lines.enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() != space.len() + 1 {
                return Err(Error::Persistence(format!(
                    "trial log row {} has {} fields, expected {}",
                    line_no + 2,
                    fields.len(),
                    space.len() + 1
                )));
            }

            let mut vector = Vec::with_capacity(space.len());
            for (i, field) in fields[..space.len()].iter().enumerate() {
                vector.push(space.domain(i).parse(field)?);
            }
            let objective: f64 = fields[space.len()].parse().map_err(|_| {
                Error::Persistence(format!("bad objective '{}' in trial log", fields[space.len()]))
            })?;
            if !objective.is_finite() {
                return Err(Error::Persistence(
                    "trial log contains a non-finite objective".to_string(),
                ));
            }
            trials.push(Trial::new(vector, objective));
        }
        Ok(trials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::space::ParameterDomain;
    use tempfile::TempDir;

    fn space() -> SearchSpace {
        let mut space = SearchSpace::new();
        space.add("lr", ParameterDomain::Continuous { low: 1e-5, high: 1.0, log_scale: true });
        space.add("width", ParameterDomain::Integer { low: 1, high: 256 });
        space.add("reg", ParameterDomain::Categorical { choices: vec!["l1".into(), "hoyer_square".into()] });
        space
    }

    fn trial(lr: f64, width: i64, reg: &str, objective: f64) -> Trial {
        Trial::new(
            vec![
                ParameterValue::Float(lr),
                ParameterValue::Int(width),
                ParameterValue::Categorical(reg.to_string()),
            ],
            objective,
        )
    }

    #[test]
    fn test_rewrite_then_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let log = TrialLog::new(dir.path().join("search.csv"));
        let space = space();

        let trials = vec![trial(0.01, 64, "l1", 1.5), trial(0.001, 32, "hoyer_square", 0.8)];
        log.rewrite(&space, &trials).unwrap();

        let loaded = log.load(&space).unwrap();
        assert_eq!(loaded, trials);
    }

    #[test]
    fn test_header_and_row_format() {
        let dir = TempDir::new().unwrap();
        let log = TrialLog::new(dir.path().join("search.csv"));
        let space = space();

        log.rewrite(&space, &[trial(0.5, 2, "l1", 3.25)]).unwrap();
        let text = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "lr,width,reg,validation_loss");
        assert_eq!(lines[1], "0.5,2,l1,3.25");
    }

    #[test]
    fn test_missing_file_is_fresh() {
        let dir = TempDir::new().unwrap();
        let log = TrialLog::new(dir.path().join("none.csv"));
        assert!(log.load(&space()).unwrap().is_empty());
    }

    #[test]
    fn test_each_rewrite_replaces_the_file() {
        let dir = TempDir::new().unwrap();
        let log = TrialLog::new(dir.path().join("search.csv"));
        let space = space();

        log.rewrite(&space, &[trial(0.1, 1, "l1", 9.0)]).unwrap();
        let trials = vec![trial(0.2, 2, "l1", 5.0), trial(0.3, 3, "l1", 4.0)];
        log.rewrite(&space, &trials).unwrap();

        assert_eq!(log.load(&space).unwrap(), trials);
    }

    #[test]
    fn test_header_mismatch_is_persistence_error() {
        let dir = TempDir::new().unwrap();
        let log = TrialLog::new(dir.path().join("search.csv"));
        std::fs::write(log.path(), "other,columns\n").unwrap();
        assert!(matches!(log.load(&space()), Err(Error::Persistence(_))));
    }

    #[test]
    fn test_corrupted_row_is_persistence_error() {
        let dir = TempDir::new().unwrap();
        let log = TrialLog::new(dir.path().join("search.csv"));
        std::fs::write(log.path(), "lr,width,reg,validation_loss\n0.1,oops,l1,1.0\n").unwrap();
        assert!(matches!(log.load(&space()), Err(Error::Persistence(_))));
    }

    #[test]
    fn test_unwritable_path_is_persistence_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();

        let log = TrialLog::new(blocker.join("search.csv"));
        let err = log.rewrite(&space(), &[]).unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
    }
}
