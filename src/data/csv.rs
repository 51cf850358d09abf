//! Reading and writing CSV data table files.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

use super::DataTable;

/// Read a CSV file into a [`DataTable`]. The dataset name is taken from the
/// file stem.
pub fn read_path(path: impl AsRef<Path>) -> Result<DataTable> {
    let path = path.as_ref();
    if !path.is_file() {
        bail!("data file '{}' does not exist", path.display());
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read data file '{}'", path.display()))?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned());
    Ok(read_str(&text, name))
}

/// Parse CSV text into a [`DataTable`]. Fields are trimmed and surrounding
/// double quotes are stripped; blank lines are skipped.
pub fn read_str(text: &str, name: Option<String>) -> DataTable {
    let rows: Vec<Vec<String>> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            line.split(',')
                .map(|field| {
                    let field = field.trim();
                    let field = field
                        .strip_prefix('"')
                        .and_then(|f| f.strip_suffix('"'))
                        .unwrap_or(field);
                    field.to_string()
                })
                .collect()
        })
        .collect();
    DataTable::from_strings(rows, name)
}

/// Write a table back out: a header row of dimension names, then one line
/// per record. Textual entries are written as their original strings.
pub fn write_path(table: &DataTable, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut out = String::new();
    let names: Vec<&str> = table.dimensions.iter().map(|d| d.name.as_str()).collect();
    out.push_str(&names.join(","));
    out.push('\n');
    for record in &table.records {
        let fields: Vec<String> = record.iter().map(|e| e.to_string()).collect();
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    fs::write(path, out)
        .with_context(|| format!("failed to write data file '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn parses_quoted_and_padded_fields() {
        let t = read_str("\"x\" , y\n 1 ,\"2\"\n\n3,4\n", None);
        assert_eq!(t.dimensions[0].name, "x");
        assert_eq!(t.get(0, 1), 2.0);
        assert_eq!(t.records.len(), 2);
    }

    #[test]
    fn read_path_names_table_after_file_stem() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("iris.csv");
        let mut f = fs::File::create(&path)?;
        writeln!(f, "a,b")?;
        writeln!(f, "1,2")?;
        writeln!(f, "3,4")?;

        let t = read_path(&path)?;
        assert_eq!(t.name(), "iris");
        assert_eq!(t.records.len(), 2);
        Ok(())
    }

    #[test]
    fn read_path_fails_on_missing_file() {
        assert!(read_path("no/such/file.csv").is_err());
    }

    #[test]
    fn round_trips_through_write_path() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.csv");
        let t = read_str("x,label\n1,red\n2,blue\n", None);
        write_path(&t, &path)?;

        let text = fs::read_to_string(&path)?;
        assert_eq!(text, "x,label\n1,red\n2,blue\n");
        Ok(())
    }
}
