//! CSV file parser

use anyhow::{Context, Result};
use csv::ReaderBuilder;

use super::{FileParser, ParseOptions, ParseResult};

/// Parses CSV bytes. Delimiter detection covers the `,` and `;`
/// variants produced by Excel's locale-dependent CSV export.
#[derive(Debug, Clone, Default)]
pub struct CsvParser;

impl CsvParser {
    pub fn new() -> Self {
        Self
    }

    /// Pick `;` when the first line carries more semicolons than
    /// commas (Excel in es/eu locales exports that way).
    fn detect_delimiter(bytes: &[u8]) -> u8 {
        let first_line = bytes.split(|&b| b == b'\n').next().unwrap_or(&[]);
        let commas = first_line.iter().filter(|&&b| b == b',').count();
        let semicolons = first_line.iter().filter(|&&b| b == b';').count();
        if semicolons > commas { b';' } else { b',' }
    }
}

impl FileParser for CsvParser {
    fn parse(&self, bytes: &[u8], opts: &ParseOptions) -> Result<ParseResult> {
        let delimiter = Self::detect_delimiter(bytes);

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(bytes);

        let mut grid = Vec::new();
        for (line_num, record) in reader.records().enumerate() {
            let record = record
                .with_context(|| format!("Línea {} del CSV no se pudo leer", line_num + 1))?;
            grid.push(record.iter().map(|c| c.to_string()).collect());
        }

        log::debug!("Parsed CSV: {} raw rows, delimiter '{}'", grid.len(), delimiter as char);
        super::from_grid(grid, opts)
    }
}
