//! Import session: the state machine driving the pipeline
//!
//! One session imports one file into one entity type for one
//! organization. Stages run strictly forward
//! (`Upload → Mapping → Validation → Conflicts → Importing → Result`)
//! with linear one-step back navigation; the `Conflicts` stage only
//! exists when the config declares FK columns, and is always shown then
//! so the user can review auto-matches. All interactive state lives in
//! this object and is transitioned by explicit methods with guards; no
//! step-local flags are threaded through callbacks.

use anyhow::Result;
use log::warn;
use std::sync::Arc;
use uuid::Uuid;

use super::config::ImportConfig;
use super::conflicts::{FkConflict, detect_conflicts};
use super::creation::execute_deferred_creations;
use super::mapper::{self, DEFAULT_FUZZY_THRESHOLD, Mapping};
use super::resolution::{
    ResolutionAction, ResolutionMap, apply_resolutions, filter_ignored_rows,
};
use super::validator::{self, ValidationSummary};
use crate::backend::{ImportBackend, ImportResult, ImportRow};
use crate::parser::{FileParser, ParseOptions, ParseResult};
use crate::patterns::{MappingPatterns, PatternStore};
use crate::resilience::{RetryConfig, RetryPolicy};

/// Pipeline stage the session is currently in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Upload,
    Mapping,
    Validation,
    Conflicts,
    Importing,
    Result,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Upload => "upload",
            Stage::Mapping => "mapping",
            Stage::Validation => "validation",
            Stage::Conflicts => "conflicts",
            Stage::Importing => "importing",
            Stage::Result => "result",
        }
    }
}

/// Progress phase reported while the commit runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportPhase {
    CreatingReferences,
    ApplyingResolutions,
    Committing,
    Learning,
}

impl ImportPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportPhase::CreatingReferences => "creating_references",
            ImportPhase::ApplyingResolutions => "applying_resolutions",
            ImportPhase::Committing => "committing",
            ImportPhase::Learning => "learning",
        }
    }
}

/// Tuning knobs for a session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Acceptance threshold for fuzzy header matches
    pub fuzzy_threshold: f64,
    /// Concurrency limit shared by all fan-out points
    pub fan_out_limit: usize,
    pub retry: RetryConfig,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            fan_out_limit: 4,
            retry: RetryConfig::default(),
        }
    }
}

/// One import run for one organization + entity type
pub struct ImportSession {
    /// Correlation id carried through log lines
    id: Uuid,
    config: ImportConfig,
    org_id: String,
    backend: Arc<dyn ImportBackend>,
    patterns: Arc<dyn PatternStore>,
    options: SessionOptions,
    retry: RetryPolicy,

    stage: Stage,
    file_bytes: Vec<u8>,
    header_row_index: usize,
    parse: Option<ParseResult>,
    learned_mapping: MappingPatterns,
    mapping: Mapping,
    validation: Option<ValidationSummary>,
    conflicts: Vec<FkConflict>,
    resolutions: ResolutionMap,
    detection_skipped: bool,
    phase: Option<ImportPhase>,
    result: Option<ImportResult>,
}

impl ImportSession {
    pub fn new(
        config: ImportConfig,
        org_id: impl Into<String>,
        backend: Arc<dyn ImportBackend>,
        patterns: Arc<dyn PatternStore>,
    ) -> Self {
        Self::with_options(config, org_id, backend, patterns, SessionOptions::default())
    }

    pub fn with_options(
        config: ImportConfig,
        org_id: impl Into<String>,
        backend: Arc<dyn ImportBackend>,
        patterns: Arc<dyn PatternStore>,
        options: SessionOptions,
    ) -> Self {
        let retry = RetryPolicy::new(options.retry.clone());
        Self {
            id: Uuid::new_v4(),
            config,
            org_id: org_id.into(),
            backend,
            patterns,
            options,
            retry,
            stage: Stage::Upload,
            file_bytes: Vec::new(),
            header_row_index: 0,
            parse: None,
            learned_mapping: MappingPatterns::new(),
            mapping: Mapping::new(),
            validation: None,
            conflicts: Vec::new(),
            resolutions: ResolutionMap::default(),
            detection_skipped: false,
            phase: None,
            result: None,
        }
    }

    // --- state exposed upward ---

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn parse_result(&self) -> Option<&ParseResult> {
        self.parse.as_ref()
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub fn mapping_valid(&self) -> bool {
        mapper::validate(&self.mapping, &self.config.columns)
    }

    pub fn validation(&self) -> Option<&ValidationSummary> {
        self.validation.as_ref()
    }

    pub fn conflicts(&self) -> &[FkConflict] {
        &self.conflicts
    }

    pub fn resolutions(&self) -> &ResolutionMap {
        &self.resolutions
    }

    pub fn all_resolved(&self) -> bool {
        self.resolutions.all_resolved(&self.conflicts)
    }

    /// Whether conflict detection was skipped because options could not
    /// be fetched (degraded mode: FK values go to the backend raw)
    pub fn detection_skipped(&self) -> bool {
        self.detection_skipped
    }

    pub fn phase(&self) -> Option<ImportPhase> {
        self.phase
    }

    pub fn result(&self) -> Option<&ImportResult> {
        self.result.as_ref()
    }

    // --- upload stage ---

    /// Parse an uploaded file and auto-map its headers. On parse
    /// failure the session stays in `Upload` and the user re-uploads.
    pub async fn upload(&mut self, parser: &dyn FileParser, bytes: Vec<u8>) -> Result<()> {
        self.ensure_stage(Stage::Upload)?;

        self.header_row_index = 0;
        let parse = parser.parse(&bytes, &ParseOptions::default())?;
        self.file_bytes = bytes;

        self.learned_mapping = match self
            .retry
            .execute("mapping pattern fetch", || {
                self.patterns
                    .mapping_patterns(&self.org_id, &self.config.entity_id)
            })
            .await
        {
            Ok(patterns) => patterns,
            Err(e) => {
                warn!("Could not load learned mapping patterns: {}", e);
                MappingPatterns::new()
            }
        };

        self.mapping = mapper::auto_map(
            &parse.headers,
            &self.config.columns,
            &self.learned_mapping,
            self.options.fuzzy_threshold,
        );
        self.parse = Some(parse);
        self.stage = Stage::Mapping;
        Ok(())
    }

    // --- mapping stage ---

    /// Re-interpret the uploaded file with a different header row
    /// (picked from the raw preview) and re-run auto-mapping.
    pub fn set_header_row(&mut self, parser: &dyn FileParser, index: usize) -> Result<()> {
        self.ensure_stage(Stage::Mapping)?;

        let parse = parser.parse(&self.file_bytes, &ParseOptions::with_header_row(index))?;
        self.header_row_index = index;
        self.mapping = mapper::auto_map(
            &parse.headers,
            &self.config.columns,
            &self.learned_mapping,
            self.options.fuzzy_threshold,
        );
        self.parse = Some(parse);
        Ok(())
    }

    /// Assign or clear a header's target column.
    pub fn map_header(&mut self, header: &str, column_id: Option<String>) -> Result<()> {
        self.ensure_stage(Stage::Mapping)?;
        match column_id {
            Some(id) => {
                self.mapping.insert(header.to_string(), id);
            }
            None => {
                self.mapping.remove(header);
            }
        }
        Ok(())
    }

    /// Advance to validation. Returns `false` (without advancing) while
    /// the mapping is invalid; that is the UI's blocking flag, not an
    /// error.
    pub async fn confirm_mapping(&mut self) -> Result<bool> {
        self.ensure_stage(Stage::Mapping)?;
        if !self.mapping_valid() {
            return Ok(false);
        }

        let rows = self.parse.as_ref().map(|p| p.rows.clone()).unwrap_or_default();
        let duplicate_sets = validator::fetch_duplicate_sets(
            &self.backend,
            &self.retry,
            &self.org_id,
            &self.config.table_name,
            &self.config.columns,
            &self.mapping,
            &rows,
            self.options.fan_out_limit,
        )
        .await;

        self.validation = Some(validator::validate_rows(
            &rows,
            &self.mapping,
            &self.config.columns,
            &duplicate_sets,
        ));
        self.stage = Stage::Validation;
        Ok(true)
    }

    // --- validation stage ---

    /// Leave validation: detect conflicts when the config has FK
    /// columns, otherwise (or when detection degrades) run the import
    /// directly.
    pub async fn continue_from_validation(&mut self) -> Result<()> {
        self.ensure_stage(Stage::Validation)?;

        if !self.config.has_fk_columns() {
            return self.run_import().await;
        }

        let learned_values = match self
            .retry
            .execute("value pattern fetch", || {
                self.patterns
                    .value_patterns(&self.org_id, &self.config.entity_id)
            })
            .await
        {
            Ok(patterns) => patterns,
            Err(e) => {
                warn!("Could not load learned value patterns: {}", e);
                Default::default()
            }
        };

        let rows = self.validation.as_ref().map(|v| v.rows.as_slice()).unwrap_or(&[]);
        match detect_conflicts(
            rows,
            &self.config,
            &self.org_id,
            &learned_values,
            &self.backend,
            &self.retry,
            self.options.fan_out_limit,
        )
        .await
        {
            Ok(conflicts) => {
                self.resolutions = ResolutionMap::prefill(&conflicts);
                self.conflicts = conflicts;
                self.stage = Stage::Conflicts;
                Ok(())
            }
            Err(e) => {
                warn!("Conflict detection failed, importing without resolution: {}", e);
                self.detection_skipped = true;
                self.conflicts.clear();
                self.resolutions = ResolutionMap::default();
                self.run_import().await
            }
        }
    }

    // --- conflicts stage ---

    /// Record a decision for one (field, value) pair. Resolutions are
    /// read-only once importing begins.
    pub fn set_resolution(
        &mut self,
        field: &str,
        value: &str,
        action: Option<ResolutionAction>,
        target_id: Option<String>,
    ) -> Result<()> {
        self.ensure_stage(Stage::Conflicts)?;
        self.resolutions.set(field, value, action, target_id);
        Ok(())
    }

    /// Run the import once every missing value is resolved. Returns
    /// `false` (without advancing) while decisions are pending.
    pub async fn confirm_conflicts(&mut self) -> Result<bool> {
        self.ensure_stage(Stage::Conflicts)?;
        if !self.all_resolved() {
            return Ok(false);
        }
        self.run_import().await?;
        Ok(true)
    }

    // --- navigation ---

    /// One linear step back. No-op in `Upload`, `Importing` and
    /// `Result`.
    pub fn back(&mut self) {
        self.stage = match self.stage {
            Stage::Mapping => Stage::Upload,
            Stage::Validation => Stage::Mapping,
            Stage::Conflicts => Stage::Validation,
            other => other,
        };
    }

    /// Bulk revert of a committed batch, delegated to the backend.
    pub async fn revert(&self, batch_id: &str) -> Result<()> {
        self.backend.revert(batch_id).await
    }

    // --- importing ---

    async fn run_import(&mut self) -> Result<()> {
        self.stage = Stage::Importing;

        self.phase = Some(ImportPhase::CreatingReferences);
        let creation = match execute_deferred_creations(
            &mut self.resolutions,
            &self.config,
            &self.org_id,
            &self.backend,
            &self.retry,
            self.options.fan_out_limit,
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                self.return_to_validation();
                return Err(e);
            }
        };

        self.phase = Some(ImportPhase::ApplyingResolutions);
        let rows = self.validation.as_ref().map(|v| v.rows.clone()).unwrap_or_default();
        // Filter on raw values first: a resolved target id may textually
        // collide with another raw value that resolved to Ignore
        let rows = filter_ignored_rows(rows, &self.config, &self.resolutions);
        let rows = apply_resolutions(rows, &self.config, &self.resolutions);
        let payload: Vec<ImportRow> = rows.into_iter().map(|r| r.values).collect();

        self.phase = Some(ImportPhase::Committing);
        let mut result = match self.backend.import(payload).await {
            Ok(result) => result,
            Err(e) => {
                self.return_to_validation();
                return Err(e);
            }
        };
        result.warnings.extend(creation.warnings);

        if result.imported > 0 {
            self.phase = Some(ImportPhase::Learning);
            self.learn_patterns();
        }

        log::info!(
            "Import {} finished: {} rows, {} errors, {} warnings",
            self.id,
            result.imported,
            result.errors.len(),
            result.warnings.len()
        );
        self.result = Some(result);
        self.phase = None;
        self.stage = Stage::Result;
        Ok(())
    }

    /// Fire-and-forget persistence of the confirmed column mapping and
    /// value mappings. Failures are logged, never surfaced.
    fn learn_patterns(&self) {
        let patterns = self.patterns.clone();
        let org_id = self.org_id.clone();
        let entity_id = self.config.entity_id.clone();
        let mapping = self.mapping.clone();
        let value_patterns = self.resolutions.mapped_patterns();

        tokio::spawn(async move {
            if let Err(e) = patterns
                .save_mapping_patterns(&org_id, &entity_id, &mapping)
                .await
            {
                warn!("Failed to persist mapping patterns: {}", e);
            }
            if !value_patterns.is_empty() {
                if let Err(e) = patterns
                    .save_value_patterns(&org_id, &entity_id, &value_patterns)
                    .await
                {
                    warn!("Failed to persist value patterns: {}", e);
                }
            }
        });
    }

    fn return_to_validation(&mut self) {
        self.phase = None;
        self.stage = Stage::Validation;
    }

    fn ensure_stage(&self, expected: Stage) -> Result<()> {
        anyhow::ensure!(
            self.stage == expected,
            "Operation requires stage '{}', session is in '{}'",
            expected.as_str(),
            self.stage.as_str()
        );
        Ok(())
    }
}
