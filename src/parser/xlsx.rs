//! XLSX file parser backed by calamine

use anyhow::{Context, Result};
use calamine::{Data, Reader, Xlsx};
use std::io::Cursor;

use super::{FileParser, ParseOptions, ParseResult};

/// Parses the first worksheet of an XLSX workbook.
#[derive(Debug, Clone, Default)]
pub struct XlsxParser;

impl XlsxParser {
    pub fn new() -> Self {
        Self
    }

    fn cell_to_string(cell: &Data) -> String {
        match cell {
            Data::Empty => String::new(),
            other => other.to_string(),
        }
    }
}

impl FileParser for XlsxParser {
    fn parse(&self, bytes: &[u8], opts: &ParseOptions) -> Result<ParseResult> {
        let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes.to_vec()))
            .context("El archivo no es un XLSX válido")?;

        let range = workbook
            .worksheet_range_at(0)
            .context("El libro no contiene hojas")?
            .context("No se pudo leer la primera hoja")?;

        let grid: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(Self::cell_to_string).collect())
            .collect();

        log::debug!("Parsed XLSX: {} raw rows", grid.len());
        super::from_grid(grid, opts)
    }
}
