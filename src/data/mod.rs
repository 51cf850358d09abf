//! Tabular datasets: records of numeric entries plus per-dimension metadata.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod csv;

/// One cell of a data table. Entries parsed from non-numeric text keep the
/// original string alongside the numeric value assigned to it.
#[derive(Debug, Clone, PartialEq)]
pub struct DataEntry {
    pub value: f64,
    pub text: Option<String>,
}

impl DataEntry {
    pub fn numeric(value: f64) -> Self {
        Self { value, text: None }
    }

    pub fn textual(text: impl Into<String>, value: f64) -> Self {
        Self { value, text: Some(text.into()) }
    }
}

impl std::fmt::Display for DataEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.text {
            Some(t) => write!(f, "{}", t),
            None => write!(f, "{}", self.value),
        }
    }
}

/// One row of a data table.
pub type DataRecord = Vec<DataEntry>;

/// Metadata for one dimension (column) of a data table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionMeta {
    pub name: String,
    pub min: f64,
    pub max: f64,
}

impl DimensionMeta {
    /// Map a value into [0,1] over this dimension's observed range.
    /// A zero-width range maps everything to 0.
    pub fn normalize(&self, value: f64) -> f64 {
        let span = self.max - self.min;
        if span == 0.0 {
            0.0
        } else {
            (value - self.min) / span
        }
    }
}

/// A generic table of data.
///
/// `dimensions` is empty when the source rows were not rectangular; the
/// metadata would be meaningless in that case, and consumers treat such a
/// table as having no usable data.
#[derive(Debug, Clone, Default)]
pub struct DataTable {
    pub records: Vec<DataRecord>,
    pub dimensions: Vec<DimensionMeta>,
    name: Option<String>,
}

impl DataTable {
    /// Build a table from rows of strings. The first row holds the dimension
    /// names. Each remaining entry becomes numeric if it parses as a number;
    /// otherwise it receives the lexicographic rank of its string within
    /// that dimension, so categorical columns still plot and serialize.
    pub fn from_strings(rows: Vec<Vec<String>>, name: Option<String>) -> Self {
        if rows.is_empty() {
            return Self { records: Vec::new(), dimensions: Vec::new(), name };
        }

        let width = rows[0].len();

        // Lexicographic IDs for the non-numeric strings of each dimension
        let mut string_ids: Vec<BTreeMap<String, usize>> = vec![BTreeMap::new(); width];
        for row in rows.iter().skip(1) {
            for (dim, cell) in row.iter().enumerate().take(width) {
                if cell.parse::<f64>().is_err() {
                    string_ids[dim].insert(cell.clone(), 0);
                }
            }
        }
        for map in &mut string_ids {
            for (rank, id) in map.values_mut().enumerate() {
                *id = rank;
            }
        }

        let mut records: Vec<DataRecord> = Vec::with_capacity(rows.len().saturating_sub(1));
        let mut rectangular = true;
        for row in rows.iter().skip(1) {
            if row.len() != width {
                rectangular = false;
            }
            let record = row
                .iter()
                .enumerate()
                .map(|(dim, cell)| match cell.parse::<f64>() {
                    Ok(v) => DataEntry::numeric(v),
                    Err(_) => {
                        let id = string_ids
                            .get(dim)
                            .and_then(|m| m.get(cell))
                            .copied()
                            .unwrap_or(0);
                        DataEntry::textual(cell.clone(), id as f64)
                    }
                })
                .collect();
            records.push(record);
        }

        let dimensions = if rectangular {
            rows[0]
                .iter()
                .enumerate()
                .map(|(dim, title)| {
                    let mut min = f64::INFINITY;
                    let mut max = f64::NEG_INFINITY;
                    for record in &records {
                        let v = record[dim].value;
                        if v < min {
                            min = v;
                        }
                        if v > max {
                            max = v;
                        }
                    }
                    DimensionMeta { name: title.trim().to_string(), min, max }
                })
                .collect()
        } else {
            Vec::new()
        };

        Self { records, dimensions, name }
    }

    /// The value at the given record and dimension.
    pub fn get(&self, record: usize, dimension: usize) -> f64 {
        self.records[record][dimension].value
    }

    /// The dataset name, derived from the file name, or "" if unnamed.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(raw: &[&[&str]]) -> Vec<Vec<String>> {
        raw.iter()
            .map(|r| r.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn builds_numeric_table_with_metadata() {
        let t = DataTable::from_strings(
            rows(&[&["x", "y"], &["1", "4"], &["3", "2"]]),
            Some("demo".into()),
        );
        assert_eq!(t.records.len(), 2);
        assert_eq!(t.dimensions.len(), 2);
        assert_eq!(t.dimensions[0].name, "x");
        assert_eq!(t.dimensions[0].min, 1.0);
        assert_eq!(t.dimensions[0].max, 3.0);
        assert_eq!(t.get(1, 1), 2.0);
        assert_eq!(t.name(), "demo");
    }

    #[test]
    fn strings_get_lexicographic_ids() {
        let t = DataTable::from_strings(
            rows(&[&["species"], &["setosa"], &["virginica"], &["versicolor"], &["setosa"]]),
            None,
        );
        // sorted: setosa=0, versicolor=1, virginica=2
        assert_eq!(t.get(0, 0), 0.0);
        assert_eq!(t.get(1, 0), 2.0);
        assert_eq!(t.get(2, 0), 1.0);
        assert_eq!(t.get(3, 0), 0.0);
        assert_eq!(t.records[0][0].text.as_deref(), Some("setosa"));
    }

    #[test]
    fn non_rectangular_rows_clear_dimensions() {
        let t = DataTable::from_strings(rows(&[&["a", "b"], &["1", "2"], &["3"]]), None);
        assert!(t.dimensions.is_empty());
    }

    #[test]
    fn normalize_maps_range_to_unit_interval() {
        let d = DimensionMeta { name: "d".into(), min: 2.0, max: 4.0 };
        assert_eq!(d.normalize(2.0), 0.0);
        assert_eq!(d.normalize(3.0), 0.5);
        assert_eq!(d.normalize(4.0), 1.0);

        let flat = DimensionMeta { name: "flat".into(), min: 1.0, max: 1.0 };
        assert_eq!(flat.normalize(1.0), 0.0);
    }
}
