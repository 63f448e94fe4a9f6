use anyhow::Result;
use chrono::{DateTime, Utc};
use race_core::{FieldNames, Outcome};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum TrialOutcome {
    Classified(Outcome),
    Error(String),
}

impl TrialOutcome {
    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            TrialOutcome::Classified(o) => Some(*o),
            TrialOutcome::Error(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrialRecord {
    pub index: usize,
    pub key: String,
    pub flag_value: bool,
    pub set_member: String,
    pub outcome: TrialOutcome,
    pub document: Option<Value>,
    pub elapsed: Duration,
}

impl TrialRecord {
    pub fn to_json(&self) -> Value {
        let (status, outcome, error) = match &self.outcome {
            TrialOutcome::Classified(o) => ("classified", Some(o.as_str()), None),
            TrialOutcome::Error(msg) => ("error", None, Some(msg.as_str())),
        };
        json!({
            "index": self.index,
            "key": self.key,
            "flag_value": self.flag_value,
            "set_member": self.set_member,
            "status": status,
            "outcome": outcome,
            "error": error,
            "document": self.document,
            "elapsed_ms": self.elapsed.as_millis() as u64,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Report {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub backend: String,
    pub fields: FieldNames,
    pub trials: Vec<TrialRecord>,
    pub counts: BTreeMap<Outcome, usize>,
    pub errors: usize,
    pub key_collisions: usize,
}

impl Report {
    pub fn new(backend: &str, fields: FieldNames) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            backend: backend.to_string(),
            fields,
            trials: Vec::new(),
            counts: Outcome::ALL.iter().map(|o| (*o, 0)).collect(),
            errors: 0,
            key_collisions: 0,
        }
    }

    pub fn push(&mut self, trial: TrialRecord) {
        match trial.outcome.outcome() {
            Some(o) => *self.counts.entry(o).or_insert(0) += 1,
            None => self.errors += 1,
        }
        self.trials.push(trial);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.counts.get(&outcome).copied().unwrap_or(0)
    }

    pub fn successes(&self) -> usize {
        self.count(Outcome::FullSuccess)
    }

    pub fn losses(&self) -> usize {
        self.classified() - self.successes()
    }

    pub fn classified(&self) -> usize {
        self.counts.values().sum()
    }

    /// Fraction of classified trials that lost a write. Errored trials are
    /// excluded from both sides of the ratio.
    pub fn loss_rate(&self) -> f64 {
        match self.classified() {
            0 => 0.0,
            n => self.losses() as f64 / n as f64,
        }
    }

    pub fn to_json(&self) -> Value {
        let counts: BTreeMap<&str, usize> = self
            .counts
            .iter()
            .map(|(o, n)| (o.as_str(), *n))
            .collect();
        json!({
            "schema_version": "race_report_v1",
            "started_at": self.started_at.to_rfc3339(),
            "finished_at": self.finished_at.map(|t| t.to_rfc3339()),
            "backend": self.backend,
            "fields": {
                "flag": self.fields.flag,
                "set": self.fields.set,
                "unset": self.fields.unset,
            },
            "trial_count": self.trials.len(),
            "successes": self.successes(),
            "losses": self.losses(),
            "errors": self.errors,
            "key_collisions": self.key_collisions,
            "loss_rate": self.loss_rate(),
            "counts": counts,
            "trials": self.trials.iter().map(TrialRecord::to_json).collect::<Vec<_>>(),
        })
    }
}

pub fn render_trial_line(trial: &TrialRecord, fields: &FieldNames) -> String {
    let status = match &trial.outcome {
        TrialOutcome::Classified(Outcome::FullSuccess) => {
            format!("\u{2705} Run {}: Success", trial.index)
        }
        TrialOutcome::Classified(o) => format!(
            "\u{274c} Run {}: Missing {}",
            trial.index,
            o.missing_fields(fields).join(" ")
        ),
        TrialOutcome::Error(msg) => format!("\u{26a0}\u{fe0f} Run {}: Error: {}", trial.index, msg),
    };
    let document = match &trial.document {
        Some(doc) => doc.to_string(),
        None => "null".to_string(),
    };
    format!("{}\n   Document: {}", status, document)
}

pub fn render_summary(report: &Report) -> [String; 2] {
    let mut results = format!(
        "Results: {} successes, {} failures",
        report.successes(),
        report.losses()
    );
    if report.errors > 0 {
        results.push_str(&format!(", {} errors", report.errors));
    }
    let rate = format!("Data loss rate: {:.1}%", report.loss_rate() * 100.0);
    [results, rate]
}

pub fn write_report(path: &Path, report: &Report) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let bytes = serde_json::to_vec_pretty(&report.to_json())?;
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("report");
    let tmp = path.with_file_name(format!(
        ".{}.tmp.{}.{}",
        name,
        std::process::id(),
        Utc::now().timestamp_micros()
    ));
    let mut file = fs::File::create(&tmp)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}
