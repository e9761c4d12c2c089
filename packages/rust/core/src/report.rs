//! End-of-run CSV reports for operator review.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use registerscout_shared::{Result, ScoutError};

use crate::ledger::RunSummary;

pub const MISSING_FILE: &str = "missing_officials.csv";
pub const MANUAL_REVIEW_FILE: &str = "manual_review_pdfs.csv";
pub const FAILURES_FILE: &str = "failures.csv";

fn needs_quotes(field: &str) -> bool {
    field.contains([',', '"', '\n', '\r'])
}

fn write_row<W: Write>(mut w: W, row: &[&str]) -> io::Result<()> {
    for (i, cell) in row.iter().enumerate() {
        if i > 0 {
            w.write_all(b",")?;
        }
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            w.write_all(cell.as_bytes())?;
        }
    }
    writeln!(w)
}

fn write_csv(path: &Path, header: &[&str], rows: &[Vec<String>]) -> Result<()> {
    let file = File::create(path).map_err(|e| ScoutError::io(path, e))?;
    let mut w = BufWriter::new(file);

    write_row(&mut w, header).map_err(|e| ScoutError::io(path, e))?;
    for row in rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        write_row(&mut w, &cells).map_err(|e| ScoutError::io(path, e))?;
    }
    w.flush().map_err(|e| ScoutError::io(path, e))
}

/// Write the three side-channel reports into `dir`, creating it if needed.
/// Returns the written paths.
pub fn write_reports(dir: &Path, summary: &RunSummary) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).map_err(|e| ScoutError::io(dir, e))?;

    let missing: Vec<Vec<String>> = summary
        .missing
        .iter()
        .map(|o| {
            vec![
                o.id.to_string(),
                o.name.clone(),
                o.council.clone(),
                o.ward.clone().unwrap_or_default(),
            ]
        })
        .collect();

    let manual: Vec<Vec<String>> = summary
        .manual_review
        .iter()
        .map(|r| {
            vec![
                r.official_id.to_string(),
                r.name.clone(),
                r.council.clone(),
                r.pdf_url.clone(),
                r.found_on.clone().unwrap_or_default(),
            ]
        })
        .collect();

    let failures: Vec<Vec<String>> = summary
        .failures
        .iter()
        .map(|f| {
            vec![
                f.official_id.to_string(),
                f.name.clone(),
                f.council.clone(),
                f.issue_kind.clone(),
                f.detail.clone(),
            ]
        })
        .collect();

    let outputs = [
        (MISSING_FILE, &["id", "name", "council", "ward"][..], missing),
        (
            MANUAL_REVIEW_FILE,
            &["official_id", "name", "council", "pdf_url", "found_on"][..],
            manual,
        ),
        (
            FAILURES_FILE,
            &["official_id", "name", "council", "issue_kind", "detail"][..],
            failures,
        ),
    ];

    let mut paths = Vec::with_capacity(outputs.len());
    for (file, header, rows) in outputs {
        let path = dir.join(file);
        write_csv(&path, header, &rows)?;
        paths.push(path);
    }
    Ok(paths)
}
