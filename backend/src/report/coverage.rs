//! Coverage matrix: a cross-tabulation of two record fields.
//!
//! ```text
//! id  os       supports_nfc              true  false
//! A1  android  true          →  android     2      0
//! A2  ios      false             ios         0      1
//! A3  android  true
//! ```
//!
//! Labels are the distinct observed values of each field. They keep
//! first-seen order unless alphabetical order is requested explicitly.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::models::DeviceRecord;

/// What a cell holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellMode {
    /// Number of records per (row, column) pair.
    Count,
    /// Whether any record has the pair.
    Presence,
}

impl FromStr for CellMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "count" => Ok(CellMode::Count),
            "presence" => Ok(CellMode::Presence),
            other => Err(format!("mode must be 'count' or 'presence', got '{}'", other)),
        }
    }
}

/// Axis label ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LabelOrder {
    #[default]
    FirstSeen,
    /// Byte order of the label text.
    Alphabetical,
}

impl FromStr for LabelOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "first-seen" | "first_seen" => Ok(LabelOrder::FirstSeen),
            "alphabetical" => Ok(LabelOrder::Alphabetical),
            other => Err(format!(
                "order must be 'first-seen' or 'alphabetical', got '{}'",
                other
            )),
        }
    }
}

/// A filled coverage matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageMatrix {
    pub row_labels: Vec<String>,
    pub column_labels: Vec<String>,
    pub mode: CellMode,
    /// `cells[row][column]`; 0/1 in presence mode.
    cells: Vec<Vec<u64>>,
}

impl CoverageMatrix {
    pub fn cell(&self, row: usize, column: usize) -> u64 {
        self.cells
            .get(row)
            .and_then(|r| r.get(column))
            .copied()
            .unwrap_or(0)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u64]> {
        self.cells.iter().map(Vec::as_slice)
    }

    /// Sum of all cells.
    pub fn total(&self) -> u64 {
        self.cells.iter().flatten().sum()
    }
}

/// Distinct labels with their first-seen position.
#[derive(Default)]
struct LabelIndex {
    labels: Vec<String>,
    index: HashMap<String, usize>,
}

impl LabelIndex {
    fn position(&mut self, label: String) -> usize {
        if let Some(&i) = self.index.get(&label) {
            return i;
        }
        let i = self.labels.len();
        self.index.insert(label.clone(), i);
        self.labels.push(label);
        i
    }

    /// Permutation that sorts the labels; `order[new] = old`.
    fn sorted_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.labels.len()).collect();
        order.sort_by(|&a, &b| self.labels[a].cmp(&self.labels[b]));
        order
    }
}

/// Build the matrix in a single pass over the records.
///
/// Both fields are required by the request-scoped schema, so every record
/// carries them.
pub fn build_coverage(
    records: &[DeviceRecord],
    row_field: &str,
    column_field: &str,
    mode: CellMode,
    order: LabelOrder,
) -> CoverageMatrix {
    let mut rows = LabelIndex::default();
    let mut columns = LabelIndex::default();
    let mut cells: Vec<Vec<u64>> = Vec::new();

    for record in records {
        let (Some(row_label), Some(column_label)) =
            (record.label(row_field), record.label(column_field))
        else {
            continue;
        };

        let r = rows.position(row_label);
        let c = columns.position(column_label);

        if r == cells.len() {
            cells.push(Vec::new());
        }
        let row = &mut cells[r];
        if row.len() <= c {
            row.resize(c + 1, 0);
        }

        match mode {
            CellMode::Count => row[c] += 1,
            CellMode::Presence => row[c] = 1,
        }
    }

    let width = columns.labels.len();
    for row in cells.iter_mut() {
        row.resize(width, 0);
    }

    match order {
        LabelOrder::FirstSeen => CoverageMatrix {
            row_labels: rows.labels,
            column_labels: columns.labels,
            mode,
            cells,
        },
        LabelOrder::Alphabetical => {
            let row_order = rows.sorted_order();
            let column_order = columns.sorted_order();
            CoverageMatrix {
                row_labels: row_order.iter().map(|&i| rows.labels[i].clone()).collect(),
                column_labels: column_order
                    .iter()
                    .map(|&i| columns.labels[i].clone())
                    .collect(),
                mode,
                cells: row_order
                    .iter()
                    .map(|&r| column_order.iter().map(|&c| cells[r][c]).collect())
                    .collect(),
            }
        }
    }
}
