// Copyright 2026 Scanrelay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Export consolidation: every CSV export in the work directory becomes one
//! keyed JSON document.
//!
//! Each file's stem is its key; its rows become records in file order with
//! columns in header order. Empty cells are `null`, not `""`. The document
//! is written to the output file and the consumed exports are deleted.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One CSV row keyed by column name, in header order.
pub type Record = serde_json::Map<String, Value>;

/// Extension of the exports the scan runner produces.
pub const EXPORT_EXTENSION: &str = "csv";

/// Scan name → rows of that scan's export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsolidatedDocument {
    scans: BTreeMap<String, Vec<Record>>,
}

impl ConsolidatedDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, records: Vec<Record>) {
        self.scans.insert(name.into(), records);
    }

    pub fn get(&self, name: &str) -> Option<&[Record]> {
        self.scans.get(name).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.scans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scans.is_empty()
    }

    /// Total number of records across all scans.
    pub fn record_count(&self) -> usize {
        self.scans.values().map(Vec::len).sum()
    }
}

/// List the export files directly inside `dir`, sorted by name.
pub fn find_exports(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;

    let mut exports = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_export = path.is_file()
            && path.extension().and_then(|e| e.to_str()) == Some(EXPORT_EXTENSION);
        if is_export {
            exports.push(path);
        }
    }
    exports.sort();
    Ok(exports)
}

/// Parse one export. The first row is the header.
pub fn read_export<R: Read>(reader: R) -> Result<Vec<Record>> {
    let mut csv = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(reader);

    let headers = unique_headers(csv.headers().context("failed to read CSV header")?);

    let mut records = Vec::new();
    for (line, row) in csv.records().enumerate() {
        let row = row.with_context(|| format!("malformed CSV row {}", line + 1))?;
        let record: Record = headers
            .iter()
            .zip(row.iter())
            .map(|(column, cell)| {
                let value = if cell.is_empty() {
                    Value::Null
                } else {
                    Value::String(cell.to_string())
                };
                (column.clone(), value)
            })
            .collect();
        records.push(record);
    }
    Ok(records)
}

/// Disambiguate repeated column names as `name.1`, `name.2`, ...
fn unique_headers(headers: &csv::StringRecord) -> Vec<String> {
    let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
    headers
        .iter()
        .map(|h| {
            let count = seen.entry(h).or_insert(0);
            let name = if *count == 0 {
                h.to_string()
            } else {
                format!("{h}.{count}")
            };
            *count += 1;
            name
        })
        .collect()
}

/// Key under which an export's rows are stored: its file stem.
fn export_key(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .with_context(|| format!("export has no usable name: {}", path.display()))
}

/// Write `doc` as JSON with a four-space indent.
pub fn write_document(doc: &ConsolidatedDocument, output: &Path) -> Result<()> {
    let file = File::create(output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    let mut writer = BufWriter::new(file);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut writer, formatter);
    doc.serialize(&mut serializer)
        .context("failed to serialize consolidated document")?;
    writer.flush()?;
    Ok(())
}

/// Merge every export in `work_dir` into one document written to `output`.
///
/// Read or parse failures abort before anything is deleted. Deleting the
/// consumed exports is best effort: each failure is logged and skipped.
pub fn consolidate(work_dir: &Path, output: &Path) -> Result<ConsolidatedDocument> {
    consolidate_with(work_dir, output, |path| std::fs::remove_file(path))
}

fn consolidate_with<F>(work_dir: &Path, output: &Path, remove: F) -> Result<ConsolidatedDocument>
where
    F: Fn(&Path) -> io::Result<()>,
{
    let exports = find_exports(work_dir)?;
    let mut doc = ConsolidatedDocument::new();

    for path in &exports {
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let records =
            read_export(file).with_context(|| format!("failed to parse {}", path.display()))?;
        doc.insert(export_key(path)?, records);
    }

    write_document(&doc, output)?;
    info!(
        exports = exports.len(),
        records = doc.record_count(),
        "all CSVs merged into '{}'",
        output.display()
    );

    remove_exports(&exports, remove);
    Ok(doc)
}

/// Delete each export, logging failures. Returns how many were removed.
fn remove_exports<F>(exports: &[PathBuf], remove: F) -> usize
where
    F: Fn(&Path) -> io::Result<()>,
{
    let mut removed = 0;
    for path in exports {
        match remove(path) {
            Ok(()) => {
                info!("deleted '{}'", path.display());
                removed += 1;
            }
            Err(e) => warn!("error deleting '{}': {e}", path.display()),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    fn write(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn test_sample_exports_merge_with_nulls() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "daily.csv", "Symbol,Rank\nAAPL,1\nMSFT,\n");
        write(dir.path(), "weekly.csv", "Symbol,Rank\nGOOG,3\n");
        let output = dir.path().join("merged_output.json");

        let doc = consolidate(dir.path(), &output).unwrap();

        let expected = json!({
            "daily": [{"Symbol": "AAPL", "Rank": "1"}, {"Symbol": "MSFT", "Rank": null}],
            "weekly": [{"Symbol": "GOOG", "Rank": "3"}]
        });
        assert_json_eq!(serde_json::to_value(&doc).unwrap(), expected.clone());

        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_json_eq!(written, expected);
    }

    #[test]
    fn test_exports_removed_and_output_kept() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "daily.csv", "A\n1\n");
        write(dir.path(), "monthly.csv", "A\n2\n");
        write(dir.path(), "notes.txt", "untouched");
        let output = dir.path().join("merged_output.json");

        consolidate(dir.path(), &output).unwrap();

        assert!(find_exports(dir.path()).unwrap().is_empty());
        assert!(output.exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_failed_delete_does_not_abort() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "daily.csv", "A\n1\n");
        write(dir.path(), "monthly.csv", "A\n2\n");
        write(dir.path(), "weekly.csv", "A\n3\n");
        let output = dir.path().join("merged_output.json");

        let doc = consolidate_with(dir.path(), &output, |path| {
            if path.ends_with("monthly.csv") {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"))
            } else {
                std::fs::remove_file(path)
            }
        })
        .unwrap();

        assert_eq!(doc.len(), 3);
        assert!(output.exists());
        let left: Vec<PathBuf> = find_exports(dir.path()).unwrap();
        assert_eq!(left, vec![dir.path().join("monthly.csv")]);
    }

    #[test]
    fn test_remove_exports_counts_successes() {
        let paths = vec![PathBuf::from("a.csv"), PathBuf::from("b.csv")];
        let removed = remove_exports(&paths, |path| {
            if path.ends_with("a.csv") {
                Ok(())
            } else {
                Err(io::Error::new(io::ErrorKind::NotFound, "gone"))
            }
        });
        assert_eq!(removed, 1);
    }

    #[test]
    fn test_row_order_and_column_order_preserved() {
        let rows = "Zeta,Alpha,Mid\nz3,a3,m3\nz1,a1,m1\nz2,a2,m2\n";
        let records = read_export(rows.as_bytes()).unwrap();

        let zetas: Vec<&str> = records.iter().map(|r| r["Zeta"].as_str().unwrap()).collect();
        assert_eq!(zetas, ["z3", "z1", "z2"]);

        let columns: Vec<&str> = records[0].keys().map(String::as_str).collect();
        assert_eq!(columns, ["Zeta", "Alpha", "Mid"]);
    }

    #[test]
    fn test_whitespace_cell_is_not_absent() {
        let records = read_export("A,B\n ,\n".as_bytes()).unwrap();
        assert_eq!(records[0]["A"], json!(" "));
        assert_eq!(records[0]["B"], Value::Null);
    }

    #[test]
    fn test_quoted_cells_with_commas() {
        let records = read_export("Name,Sector\n\"Apple, Inc.\",Tech\n".as_bytes()).unwrap();
        assert_eq!(records[0]["Name"], json!("Apple, Inc."));
    }

    #[test]
    fn test_duplicate_headers_are_disambiguated() {
        let records = read_export("Close,Close,Close\n1,2,3\n".as_bytes()).unwrap();
        assert_eq!(records[0]["Close"], json!("1"));
        assert_eq!(records[0]["Close.1"], json!("2"));
        assert_eq!(records[0]["Close.2"], json!("3"));
    }

    #[test]
    fn test_header_only_export_yields_empty_rows() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "weekly.csv", "Symbol,Rank\n");
        let doc = consolidate(dir.path(), &dir.path().join("out.json")).unwrap();
        assert_eq!(doc.get("weekly").unwrap().len(), 0);
        assert_eq!(doc.len(), 1);
    }

    #[test]
    fn test_no_exports_writes_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("merged_output.json");

        let doc = consolidate(dir.path(), &output).unwrap();

        assert!(doc.is_empty());
        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(written, json!({}));
    }

    #[test]
    fn test_ragged_row_aborts_without_deleting() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "daily.csv", "A,B\n1,2,3\n");

        let err = consolidate(dir.path(), &dir.path().join("out.json")).unwrap_err();

        assert!(format!("{err:#}").contains("daily.csv"));
        assert!(dir.path().join("daily.csv").exists());
    }

    #[test]
    fn test_output_uses_four_space_indent() {
        let mut doc = ConsolidatedDocument::new();
        let mut record = Record::new();
        record.insert("Symbol".into(), json!("AAPL"));
        doc.insert("daily", vec![record]);

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.json");
        write_document(&doc, &output).unwrap();

        let text = std::fs::read_to_string(&output).unwrap();
        assert!(text.contains("\n    \"daily\": ["));
    }
}
