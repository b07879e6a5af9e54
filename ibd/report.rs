//! CSV and text outputs of a run.
//!
//! For an output prefix `out` a run writes `out.csv` (the trace),
//! `out.summary.csv` (posterior summaries) and, with model comparison,
//! `out-null.csv`, `out-null.summary.csv` and `out.model_comp.txt`.

use crate::compare::ModelComparison;
use crate::data::PairwiseData;
use crate::trace::{Quantity, Summary, Trace, TraceError};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to write CSV output: {0}")]
    Csv(#[from] csv::Error),
    #[error("Failed to summarize trace: {0}")]
    Trace(#[from] TraceError),
}

/// Paths of every file written for one prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub trace: PathBuf,
    pub summary: PathBuf,
    pub null_trace: PathBuf,
    pub null_summary: PathBuf,
    pub model_comparison: PathBuf,
}

impl OutputPaths {
    pub fn from_prefix(prefix: impl AsRef<Path>) -> Self {
        let prefix = prefix.as_ref().as_os_str().to_string_lossy().into_owned();
        Self {
            trace: PathBuf::from(format!("{prefix}.csv")),
            summary: PathBuf::from(format!("{prefix}.summary.csv")),
            null_trace: PathBuf::from(format!("{prefix}-null.csv")),
            null_summary: PathBuf::from(format!("{prefix}-null.summary.csv")),
            model_comparison: PathBuf::from(format!("{prefix}.model_comp.txt")),
        }
    }
}

/// Column names of the trace file.
pub fn trace_header(trace: &Trace) -> Vec<String> {
    let mut header: Vec<String> = ["iteration"]
        .into_iter()
        .chain(Quantity::ALL.iter().map(|q| q.column()))
        .chain(["loglik", "deviance"])
        .map(String::from)
        .collect();
    if let Some(simulated) = trace.records().first().and_then(|r| r.simulated.as_ref()) {
        let (pairs, markers) = simulated.dim();
        for pair in 0..pairs {
            for marker in 0..markers {
                header.push(format!("Lsim_{pair}_{marker}"));
            }
        }
    }
    header
}

/// Writes one row per retained state.
pub fn write_trace<W: Write>(writer: W, trace: &Trace) -> Result<(), ReportError> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(trace_header(trace))?;
    for record in trace.records() {
        let mut row = vec![record.iteration.to_string()];
        row.extend(Quantity::ALL.iter().map(|&q| record.get(q).to_string()));
        row.push(record.log_likelihood.to_string());
        row.push(record.deviance.to_string());
        if let Some(simulated) = &record.simulated {
            row.extend(simulated.iter().map(|count| count.to_string()));
        }
        csv.write_record(&row)?;
    }
    csv.flush()?;
    Ok(())
}

/// Writes one row of posterior summaries per [`Quantity`].
pub fn write_summaries<W: Write>(writer: W, trace: &Trace, level: f64) -> Result<(), ReportError> {
    let summaries = trace.summaries(level)?;
    write_summary_rows(writer, &summaries)?;
    Ok(())
}

fn write_summary_rows<W: Write>(writer: W, summaries: &[Summary]) -> Result<(), ReportError> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record([
        "quantity", "samples", "mean", "sd", "median", "level", "ci_lower", "ci_upper",
        "hpd_lower", "hpd_upper",
    ])?;
    for s in summaries {
        csv.write_record([
            s.quantity.column().to_string(),
            s.samples.to_string(),
            s.mean.to_string(),
            s.std_dev.to_string(),
            s.median.to_string(),
            s.level.to_string(),
            s.credible_interval.0.to_string(),
            s.credible_interval.1.to_string(),
            s.hpd_interval.0.to_string(),
            s.hpd_interval.1.to_string(),
        ])?;
    }
    csv.flush()?;
    Ok(())
}

/// Pairwise distances and counts, one row per pair.
pub fn write_pairwise_table<W: Write>(writer: W, data: &PairwiseData) -> Result<(), ReportError> {
    let mut csv = csv::Writer::from_writer(writer);
    let mut header = vec!["first".to_string(), "second".to_string(), "distance".to_string()];
    for name in data.marker_names() {
        header.push(format!("{name}.ibd"));
        header.push(format!("{name}.total"));
    }
    csv.write_record(&header)?;

    let samples = data.samples();
    for (pair, &(i, j)) in data.pairs().iter().enumerate() {
        let mut row = vec![
            samples[i].id.clone(),
            samples[j].id.clone(),
            data.distances()[pair].to_string(),
        ];
        for marker in 0..data.n_markers() {
            row.push(data.ibd()[[pair, marker]].to_string());
            row.push(data.total()[[pair, marker]].to_string());
        }
        csv.write_record(&row)?;
    }
    csv.flush()?;
    Ok(())
}

/// Per-marker background identity and likelihood weight.
pub fn write_marker_summaries<W: Write>(writer: W, data: &PairwiseData) -> Result<(), ReportError> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(["marker", "tsz", "fbar", "fbar_1", "weight"])?;
    for (name, summary) in data.marker_names().iter().zip(data.summaries()) {
        csv.write_record([
            name.clone(),
            summary.tsz.to_string(),
            summary.fbar.to_string(),
            summary.fbar_1.to_string(),
            summary.weight.to_string(),
        ])?;
    }
    csv.flush()?;
    Ok(())
}

fn create(path: &Path) -> Result<BufWriter<File>, ReportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(BufWriter::new(File::create(path)?))
}

/// Writes every output file of a run under `prefix`.
pub fn write_outputs(
    prefix: impl AsRef<Path>,
    comparison: &ModelComparison,
    level: f64,
) -> Result<OutputPaths, ReportError> {
    let paths = OutputPaths::from_prefix(prefix);

    write_trace(create(&paths.trace)?, &comparison.full)?;
    write_summaries(create(&paths.summary)?, &comparison.full, level)?;
    log::info!("Wrote {} and {}", paths.trace.display(), paths.summary.display());

    if let Some(null) = &comparison.null {
        write_trace(create(&paths.null_trace)?, null)?;
        write_summaries(create(&paths.null_summary)?, null, level)?;
        let mut out = create(&paths.model_comparison)?;
        out.write_all(comparison.report().as_bytes())?;
        out.flush()?;
        log::info!(
            "Wrote {}, {} and {}",
            paths.null_trace.display(),
            paths.null_summary.display(),
            paths.model_comparison.display()
        );
    }
    Ok(paths)
}
