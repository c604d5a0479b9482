//! CSV export of grid rows.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use stockgrid_core::logging::targets;

use crate::error::Result;
use crate::model::{Column, Row, display_value};

/// Write `rows` as CSV with one column per descriptor.
///
/// Without descriptors the columns are the first row's fields in key order.
/// Returns the number of data records written.
pub fn write_csv<W: Write>(writer: W, columns: &[Column], rows: &[Row]) -> Result<usize> {
    let mut csv = csv::Writer::from_writer(writer);

    if columns.is_empty() {
        let fields: Vec<&String> = rows
            .first()
            .map(|row| row.fields().keys().collect())
            .unwrap_or_default();
        csv.write_record(&fields)?;
        for row in rows {
            csv.write_record(
                fields
                    .iter()
                    .map(|field| row.get(field).map(display_value).unwrap_or_default()),
            )?;
        }
    } else {
        csv.write_record(columns.iter().map(|column| column.header.as_str()))?;
        for (index, row) in rows.iter().enumerate() {
            csv.write_record(columns.iter().map(|column| column.cell_text(row, index)))?;
        }
    }

    csv.flush()?;
    Ok(rows.len())
}

/// Resolve the path a download named `file_name` is written to.
///
/// Directory components are stripped and a `.csv` extension is added when
/// missing.
pub fn export_path(dir: &Path, file_name: &str) -> PathBuf {
    let base = Path::new(file_name)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .unwrap_or("export");
    let mut path = dir.join(base);
    let is_csv = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if !is_csv {
        path = dir.join(format!("{base}.csv"));
    }
    path
}

/// Write `rows` to `dir/file_name` and return the final path.
pub fn export_to_file(dir: &Path, file_name: &str, columns: &[Column], rows: &[Row]) -> Result<PathBuf> {
    let path = export_path(dir, file_name);
    let file = File::create(&path)?;
    let written = write_csv(file, columns, rows)?;
    tracing::info!(target: targets::TRANSFER, path = %path.display(), rows = written, "export written");
    Ok(path)
}
