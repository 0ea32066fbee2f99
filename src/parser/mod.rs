//! File parsing boundary: bytes in, headers + rows out
//!
//! The engine itself never decodes file bytes; it consumes a
//! [`ParseResult`] produced by a [`FileParser`]. CSV and XLSX
//! implementations are provided, and the raw preview lets a UI offer
//! header-row re-selection when the first row is not the header.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

mod csv;
mod xlsx;

pub use csv::CsvParser;
pub use xlsx::XlsxParser;

/// Rows of the raw grid kept for header-row disambiguation
pub const PREVIEW_ROWS: usize = 10;

/// Options controlling how the raw grid is interpreted
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Zero-based index of the row holding the column headers; rows
    /// above it are discarded.
    pub header_row_index: usize,
}

impl ParseOptions {
    pub fn with_header_row(index: usize) -> Self {
        Self {
            header_row_index: index,
        }
    }
}

/// A parsed file: headers plus one map per data row, keyed by header
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseResult {
    pub headers: Vec<String>,
    pub rows: Vec<HashMap<String, String>>,
    /// First [`PREVIEW_ROWS`] rows of the raw grid, before the header
    /// row was applied
    pub raw_preview: Vec<Vec<String>>,
}

/// Decodes spreadsheet bytes into a [`ParseResult`]
pub trait FileParser: Send + Sync {
    fn parse(&self, bytes: &[u8], opts: &ParseOptions) -> Result<ParseResult>;
}

/// Turn a raw grid into a [`ParseResult`] using the configured header
/// row. Shared by the CSV and XLSX parsers.
pub(crate) fn from_grid(grid: Vec<Vec<String>>, opts: &ParseOptions) -> Result<ParseResult> {
    let raw_preview: Vec<Vec<String>> = grid.iter().take(PREVIEW_ROWS).cloned().collect();

    if grid.len() <= opts.header_row_index {
        anyhow::bail!("El archivo está vacío o no contiene la fila de encabezados");
    }

    let headers: Vec<String> = grid[opts.header_row_index]
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        anyhow::bail!("La fila de encabezados está vacía");
    }

    let mut rows = Vec::new();
    for raw_row in grid.into_iter().skip(opts.header_row_index + 1) {
        // Skip fully empty rows
        if raw_row.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        let mut row = HashMap::new();
        for (i, header) in headers.iter().enumerate() {
            if header.is_empty() {
                continue;
            }
            let value = raw_row.get(i).map(|c| c.as_str()).unwrap_or("");
            row.insert(header.clone(), value.to_string());
        }
        rows.push(row);
    }

    if rows.is_empty() {
        anyhow::bail!("El archivo no contiene filas de datos");
    }

    Ok(ParseResult {
        headers,
        rows,
        raw_preview,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(cells: &[&[&str]]) -> Vec<Vec<String>> {
        cells
            .iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_from_grid_basic() {
        let result = from_grid(
            grid(&[&["Nombre", "Email"], &["Ana", "ana@x.com"]]),
            &ParseOptions::default(),
        )
        .unwrap();

        assert_eq!(result.headers, vec!["Nombre", "Email"]);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].get("Nombre").unwrap(), "Ana");
    }

    #[test]
    fn test_from_grid_header_row_offset() {
        let result = from_grid(
            grid(&[
                &["Listado de clientes", ""],
                &["Nombre", "Email"],
                &["Ana", "ana@x.com"],
            ]),
            &ParseOptions::with_header_row(1),
        )
        .unwrap();

        assert_eq!(result.headers, vec!["Nombre", "Email"]);
        assert_eq!(result.rows.len(), 1);
        // Preview keeps the rows above the header for re-selection
        assert_eq!(result.raw_preview.len(), 3);
    }

    #[test]
    fn test_from_grid_skips_empty_rows_and_headers() {
        let result = from_grid(
            grid(&[
                &["Nombre", "", "Email"],
                &["Ana", "x", "ana@x.com"],
                &["", "  ", ""],
            ]),
            &ParseOptions::default(),
        )
        .unwrap();

        assert_eq!(result.rows.len(), 1);
        // The empty header column is dropped from row maps
        assert_eq!(result.rows[0].len(), 2);
    }

    #[test]
    fn test_from_grid_short_row_padded() {
        let result = from_grid(
            grid(&[&["Nombre", "Email"], &["Ana"]]),
            &ParseOptions::default(),
        )
        .unwrap();
        assert_eq!(result.rows[0].get("Email").unwrap(), "");
    }

    #[test]
    fn test_from_grid_empty_file() {
        assert!(from_grid(vec![], &ParseOptions::default()).is_err());
    }

    #[test]
    fn test_from_grid_no_data_rows() {
        assert!(from_grid(grid(&[&["Nombre"]]), &ParseOptions::default()).is_err());
    }
}
