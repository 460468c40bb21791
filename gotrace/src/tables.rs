//! Minimal aligned-column table rendering for the screen-facing views.

use std::io::{self, Write};

/// Writes `rows` under `header` with left-aligned, two-space-separated
/// columns, followed by an optional footer behind a rule.
pub(crate) fn write_table<W: Write>(
    w: &mut W,
    header: &[&str],
    rows: &[Vec<String>],
    footer: Option<&[String]>,
) -> io::Result<()> {
    let mut widths: Vec<usize> = header.iter().map(|h| h.len()).collect();
    let mut widen = |row: &[String]| {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    };
    for row in rows {
        widen(row);
    }
    if let Some(footer) = footer {
        widen(footer);
    }

    let header: Vec<String> = header.iter().map(|s| s.to_string()).collect();
    write_row(w, &widths, &header)?;
    for row in rows {
        write_row(w, &widths, row)?;
    }
    if let Some(footer) = footer {
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        write_row(w, &widths, &rule)?;
        write_row(w, &widths, footer)?;
    }
    Ok(())
}

fn write_row<W: Write>(w: &mut W, widths: &[usize], cells: &[String]) -> io::Result<()> {
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            write!(w, "  ")?;
        }
        if i + 1 == cells.len() {
            write!(w, "{cell}")?;
        } else {
            write!(w, "{cell:<width$}", width = widths[i])?;
        }
    }
    writeln!(w)
}
