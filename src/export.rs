use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::records::Record;

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

/// Write one comma-separated row, quoting cells that need it.
pub fn write_row<W: Write, S: AsRef<str>>(w: &mut W, row: &[S]) -> io::Result<()> {
    for (i, cell) in row.iter().enumerate() {
        if i > 0 {
            write!(w, ",")?;
        }
        let cell = cell.as_ref();
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            write!(w, "{}", cell)?;
        }
    }
    writeln!(w)
}

/// Header from the record's column schema, then one row per record in order.
pub fn write_records<W: Write, T: Record>(w: &mut W, records: &[T]) -> io::Result<()> {
    write_row(w, T::COLUMNS)?;
    for record in records {
        write_row(w, &record.row())?;
    }
    Ok(())
}

/// Write `records` to a CSV file at `path`, replacing it. Returns the row count.
pub fn save_csv<T: Record>(path: &Path, records: &[T]) -> Result<usize> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut w = BufWriter::new(file);
    write_records(&mut w, records).with_context(|| format!("writing {}", path.display()))?;
    w.flush()?;
    Ok(records.len())
}

// ── Tests ──
