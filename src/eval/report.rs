//! Final sweep metrics log

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::reg::RegularizerConfig;

use super::reporter::EvalReport;

/// One row of the final metrics table: the evaluation of one
/// (regularizer kind, strength, shape parameter) combination.
#[derive(Clone, Debug)]
pub struct SweepRecord {
    pub reg_type: String,
    pub beta: Option<f64>,
    pub alpha: f64,
    pub loss: f32,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl SweepRecord {
    /// Combine a regularizer selection with its evaluation result
    pub fn new(config: &RegularizerConfig, report: &EvalReport) -> Self {
        Self {
            reg_type: config.kind.clone(),
            beta: config.beta,
            alpha: config.alpha,
            loss: report.loss,
            accuracy: report.accuracy,
            precision: report.precision,
            recall: report.recall,
            f1: report.f1,
        }
    }
}

/// Rewrite-on-update CSV of final metrics, one row per combination
pub struct SweepReport {
    path: PathBuf,
}

impl SweepReport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrite the whole table
    pub fn write(&self, records: &[SweepRecord]) -> Result<()> {
        let mut text = String::from("reg_type,beta,alpha,loss,accuracy,precision,recall,f1\n");
        for r in records {
            let beta = r.beta.map(|b| b.to_string()).unwrap_or_default();
            text.push_str(&format!(
                "{},{},{},{},{},{},{},{}\n",
                r.reg_type, beta, r.alpha, r.loss, r.accuracy, r.precision, r.recall, r.f1
            ));
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
}
