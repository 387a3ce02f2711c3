// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::MetricsError;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::{fmt::Write as _, path::Path};

/// Metrics whose name contains this marker are internal channel metrics.
pub const CHANNEL_METRIC_MARKER: &str = "tx_";

const AUTHORITY_COLUMN: &str = "authority";
const MISSING_VALUE: &str = "-";

/// One row per authority, one column per reduced metric.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricsTable {
    rows: IndexMap<String, IndexMap<String, f64>>,
}

impl MetricsTable {
    pub fn insert_row(&mut self, authority: String, row: IndexMap<String, f64>) {
        self.rows.insert(authority, row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, authority: &str) -> Option<&IndexMap<String, f64>> {
        self.rows.get(authority)
    }

    pub fn get(&self, authority: &str, metric: &str) -> Option<f64> {
        self.rows.get(authority)?.get(metric).copied()
    }

    pub fn authorities(&self) -> impl Iterator<Item = &String> {
        self.rows.keys()
    }

    /// The union of every row's metric names, in first-seen order.
    pub fn columns(&self) -> Vec<String> {
        let columns: IndexSet<&String> = self.rows.values().flat_map(|row| row.keys()).collect();
        columns.into_iter().cloned().collect()
    }

    /// Splits the columns into consensus metrics and channel metrics.
    pub fn split_columns(&self) -> (Vec<String>, Vec<String>) {
        self.columns()
            .into_iter()
            .partition(|column| !column.contains(CHANNEL_METRIC_MARKER))
    }

    /// Renders the given columns as fixed-width text, `chunk_size` columns
    /// per block so wide tables stay readable in a terminal.
    pub fn render(&self, columns: &[String], chunk_size: usize) -> String {
        let mut out = String::new();
        let name_width = self
            .rows
            .keys()
            .map(|name| name.len())
            .chain(std::iter::once(AUTHORITY_COLUMN.len()))
            .max()
            .unwrap_or_default();

        for chunk in columns.chunks(chunk_size.max(1)) {
            let widths: Vec<usize> = chunk
                .iter()
                .map(|column| {
                    self.rows
                        .values()
                        .map(|row| format_value(row.get(column)).len())
                        .chain(std::iter::once(column.len()))
                        .max()
                        .unwrap_or_default()
                })
                .collect();

            let _ = write!(out, "{:<name_width$}", AUTHORITY_COLUMN);
            for (column, width) in chunk.iter().zip(&widths) {
                let _ = write!(out, "  {:>width$}", column);
            }
            out.push('\n');
            for (name, row) in &self.rows {
                let _ = write!(out, "{:<name_width$}", name);
                for (column, width) in chunk.iter().zip(&widths) {
                    let _ = write!(out, "  {:>width$}", format_value(row.get(column)));
                }
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }

    pub fn to_json(&self) -> Result<String, MetricsError> {
        serde_json::to_string_pretty(self)
            .map_err(|error| MetricsError::Json("metrics table".into(), error))
    }

    /// Writes the table as CSV with an `authority` column followed by every
    /// metric column. Missing values are left empty.
    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> Result<(), MetricsError> {
        let mut writer = csv::Writer::from_writer(writer);
        let columns = self.columns();
        let header = std::iter::once(AUTHORITY_COLUMN.to_string()).chain(columns.iter().cloned());
        writer.write_record(header)?;
        for (name, row) in &self.rows {
            let values = columns
                .iter()
                .map(|column| row.get(column).map(|value| value.to_string()).unwrap_or_default());
            writer.write_record(std::iter::once(name.clone()).chain(values))?;
        }
        writer
            .flush()
            .map_err(|error| MetricsError::IO("metrics csv".into(), error))
    }

    pub fn save_csv(&self, path: &Path) -> Result<(), MetricsError> {
        let file = std::fs::File::create(path)
            .map_err(|error| MetricsError::IO(path.display().to_string(), error))?;
        self.write_csv(file)
    }
}

fn format_value(value: Option<&f64>) -> String {
    match value {
        Some(value) if value.fract() == 0.0 && value.is_finite() => format!("{:.0}", value),
        Some(value) => format!("{:.3}", value),
        None => MISSING_VALUE.to_string(),
    }
}
