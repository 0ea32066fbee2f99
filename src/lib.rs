//! Bulk spreadsheet import engine.
//!
//! Takes an arbitrary spreadsheet, maps its columns onto a target entity
//! schema, validates and deduplicates rows against live system state,
//! resolves foreign-key reference conflicts (including deferred creation
//! of missing referenced entities), commits through a caller-supplied
//! backend and learns confirmed mappings per organization + entity so
//! the next import of the same shape maps itself.
//!
//! The caller drives an [`engine::session::ImportSession`] through its
//! stages (upload, mapping, validation, conflicts, importing, result)
//! and renders whatever UI it wants on top; everything external (file
//! bytes, duplicate checks, reference options, the actual commit) comes
//! in through the [`backend::ImportBackend`] and [`parser::FileParser`]
//! traits.

pub mod backend;
pub mod engine;
pub mod parser;
pub mod patterns;
pub mod resilience;

pub use backend::{CreatedRef, ImportBackend, ImportResult, RefOption};
pub use engine::config::{ColumnSpec, ForeignKeySpec, ImportConfig, Normalize, ValueRule};
pub use engine::conflicts::{FkConflict, MatchedValue};
pub use engine::resolution::{ResolutionAction, ResolutionEntry, ResolutionMap};
pub use engine::session::{ImportPhase, ImportSession, SessionOptions, Stage};
pub use engine::validator::{ValidatedRow, ValidationSummary};
pub use parser::{CsvParser, FileParser, ParseOptions, ParseResult, XlsxParser};
pub use patterns::{MemoryPatternStore, PatternStore, SqlitePatternStore};
