//! End-to-end pipeline tests driving [`ImportSession`] through the
//! public API with an in-memory backend.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use import_engine::{
    ColumnSpec, CreatedRef, CsvParser, ImportBackend, ImportConfig, ImportResult, ImportSession,
    MemoryPatternStore, RefOption, ResolutionAction, SqlitePatternStore, Stage, ValueRule,
};

type ImportRow = HashMap<String, String>;

/// Small in-memory tenant: known duplicate values, reference options
/// per FK field, committed batches.
#[derive(Default)]
struct InMemoryBackend {
    duplicates: Mutex<HashMap<String, Vec<String>>>,
    options: Mutex<HashMap<String, Vec<RefOption>>>,
    next_id: AtomicUsize,
    committed: Mutex<Vec<(String, Vec<ImportRow>)>>,
    reverted: Mutex<Vec<String>>,
}

impl InMemoryBackend {
    fn with_options(field: &str, options: Vec<RefOption>) -> Self {
        let backend = Self::default();
        backend
            .options
            .lock()
            .unwrap()
            .insert(field.to_string(), options);
        backend
    }

    fn committed_rows(&self) -> Vec<ImportRow> {
        self.committed
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(_, rows)| rows.clone())
            .collect()
    }
}

#[async_trait]
impl ImportBackend for InMemoryBackend {
    async fn check_duplicates(
        &self,
        _org_id: &str,
        _table: &str,
        column: &str,
        values: &[String],
    ) -> Result<Vec<String>> {
        let known = self.duplicates.lock().unwrap();
        let existing = known.get(column).cloned().unwrap_or_default();
        Ok(values
            .iter()
            .filter(|v| existing.iter().any(|e| e.eq_ignore_ascii_case(v)))
            .cloned()
            .collect())
    }

    async fn reference_options(&self, _org_id: &str, field: &str) -> Result<Vec<RefOption>> {
        Ok(self
            .options
            .lock()
            .unwrap()
            .get(field)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_reference(
        &self,
        _org_id: &str,
        field: &str,
        value: &str,
    ) -> Result<CreatedRef> {
        let id = format!("ref-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.options
            .lock()
            .unwrap()
            .entry(field.to_string())
            .or_default()
            .push(RefOption::new(&id, value));
        Ok(CreatedRef { id })
    }

    async fn import(&self, rows: Vec<ImportRow>) -> Result<ImportResult> {
        let batch_id = format!("batch-{}", self.committed.lock().unwrap().len() + 1);
        let imported = rows.len();
        self.committed.lock().unwrap().push((batch_id.clone(), rows));
        Ok(ImportResult {
            success: true,
            imported,
            errors: Vec::new(),
            warnings: Vec::new(),
            batch_id: Some(batch_id),
        })
    }

    async fn revert(&self, batch_id: &str) -> Result<()> {
        self.reverted.lock().unwrap().push(batch_id.to_string());
        Ok(())
    }
}

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn clients_config() -> ImportConfig {
    ImportConfig::new(
        "clients",
        "Clientes",
        "clients",
        vec![
            ColumnSpec::new("name", "Nombre").required(),
            ColumnSpec::new("email", "Email")
                .alias("Correo")
                .unique()
                .rule(ValueRule::Email),
            ColumnSpec::new("phone", "Teléfono").rule(ValueRule::Phone),
        ],
    )
}

fn services_config() -> ImportConfig {
    ImportConfig::new(
        "services",
        "Servicios",
        "services",
        vec![
            ColumnSpec::new("name", "Nombre").required(),
            ColumnSpec::new("category", "Categoría").foreign_key(true),
        ],
    )
}

fn session(config: ImportConfig, backend: Arc<InMemoryBackend>) -> ImportSession {
    ImportSession::new(
        config,
        "org-1",
        backend,
        Arc::new(MemoryPatternStore::new()),
    )
}

#[tokio::test]
async fn fuzzy_headers_map_and_import() {
    init_logs();
    let backend = Arc::new(InMemoryBackend::default());
    let mut session = session(clients_config(), backend.clone());

    // Headers differ from the configured labels in accent, case and
    // suffix; all three should auto-map.
    let csv = "NOMBRE,Email Cliente,Telefono\nAna Pérez,ana@x.com,099123456\n";
    session
        .upload(&CsvParser::new(), csv.as_bytes().to_vec())
        .await
        .unwrap();

    assert_eq!(session.mapping().get("NOMBRE").unwrap(), "name");
    assert_eq!(session.mapping().get("Email Cliente").unwrap(), "email");
    assert_eq!(session.mapping().get("Telefono").unwrap(), "phone");

    assert!(session.confirm_mapping().await.unwrap());
    session.continue_from_validation().await.unwrap();

    assert_eq!(session.stage(), Stage::Result);
    let rows = backend.committed_rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name").unwrap(), "Ana Pérez");
}

#[tokio::test]
async fn validation_reports_spanish_errors_but_does_not_block() {
    init_logs();
    let backend = Arc::new(InMemoryBackend::default());
    backend
        .duplicates
        .lock()
        .unwrap()
        .insert("email".to_string(), vec!["ana@x.com".to_string()]);
    let mut session = session(clients_config(), backend.clone());

    let csv = "Nombre,Email\n\
               ,sin-nombre@x.com\n\
               Luis,no-es-un-email\n\
               Ana,ANA@X.COM\n\
               Eva,eva@x.com\n";
    session
        .upload(&CsvParser::new(), csv.as_bytes().to_vec())
        .await
        .unwrap();
    session.confirm_mapping().await.unwrap();

    let summary = session.validation().unwrap();
    assert_eq!(summary.valid_count, 1);
    assert_eq!(summary.invalid_count, 3);
    assert_eq!(summary.rows[0].errors, vec!["Nombre es obligatorio"]);
    assert_eq!(summary.rows[1].errors, vec!["Email tiene un formato inválido"]);
    assert_eq!(summary.rows[2].errors, vec!["Email ya existe en el sistema"]);

    // Invalid rows are still handed to the backend
    session.continue_from_validation().await.unwrap();
    assert_eq!(backend.committed_rows().len(), 4);
}

#[tokio::test]
async fn conflicts_match_case_insensitively_and_reuse_ids() {
    init_logs();
    let backend = Arc::new(InMemoryBackend::with_options(
        "category",
        vec![RefOption::new("1", "Plomería"), RefOption::new("2", "Electricidad")],
    ));
    let mut session = session(services_config(), backend.clone());

    let csv = "Nombre,Categoría\n\
               Destape,PLOMERÍA\n\
               Cableado,Electricidad\n\
               Pintura interior,Pintura\n";
    session
        .upload(&CsvParser::new(), csv.as_bytes().to_vec())
        .await
        .unwrap();
    session.confirm_mapping().await.unwrap();
    session.continue_from_validation().await.unwrap();

    assert_eq!(session.stage(), Stage::Conflicts);
    let conflict = &session.conflicts()[0];
    assert_eq!(conflict.missing_values, vec!["Pintura"]);
    assert_eq!(conflict.matched_values.len(), 2);
    assert!(!session.all_resolved());

    // Map the missing value to an existing option and commit
    session
        .set_resolution("category", "Pintura", Some(ResolutionAction::Map), Some("1".into()))
        .unwrap();
    assert!(session.confirm_conflicts().await.unwrap());

    let rows = backend.committed_rows();
    assert_eq!(rows[0].get("category").unwrap(), "1");
    assert_eq!(rows[1].get("category").unwrap(), "2");
    assert_eq!(rows[2].get("category").unwrap(), "1");
}

#[tokio::test]
async fn deferred_creation_runs_once_per_value_at_commit() {
    init_logs();
    let backend = Arc::new(InMemoryBackend::with_options(
        "category",
        vec![RefOption::new("1", "Plomería")],
    ));
    let mut session = session(services_config(), backend.clone());

    // "Jardinería" appears twice but must be created exactly once
    let csv = "Nombre,Categoría\n\
               Poda,Jardinería\n\
               Riego,Jardinería\n\
               Destape,Plomería\n";
    session
        .upload(&CsvParser::new(), csv.as_bytes().to_vec())
        .await
        .unwrap();
    session.confirm_mapping().await.unwrap();
    session.continue_from_validation().await.unwrap();

    session
        .set_resolution("category", "Jardinería", Some(ResolutionAction::Create), None)
        .unwrap();
    assert!(session.confirm_conflicts().await.unwrap());

    let options = backend.options.lock().unwrap().get("category").cloned().unwrap();
    assert_eq!(options.len(), 2);
    let created = options.iter().find(|o| o.label == "Jardinería").unwrap();

    // Both rows carry the id of the single created reference
    let rows = backend.committed_rows();
    assert_eq!(rows[0].get("category").unwrap(), &created.id);
    assert_eq!(rows[1].get("category").unwrap(), &created.id);
    assert_eq!(rows[2].get("category").unwrap(), "1");
}

#[tokio::test]
async fn ignored_values_drop_their_rows() {
    init_logs();
    let backend = Arc::new(InMemoryBackend::with_options(
        "category",
        vec![RefOption::new("1", "Plomería")],
    ));
    let mut session = session(services_config(), backend.clone());

    let csv = "Nombre,Categoría\n\
               Destape,Plomería\n\
               Pintura exterior,Pintura\n\
               Pintura interior,Pintura\n";
    session
        .upload(&CsvParser::new(), csv.as_bytes().to_vec())
        .await
        .unwrap();
    session.confirm_mapping().await.unwrap();
    session.continue_from_validation().await.unwrap();

    session
        .set_resolution("category", "Pintura", Some(ResolutionAction::Ignore), None)
        .unwrap();
    assert!(session.confirm_conflicts().await.unwrap());

    let rows = backend.committed_rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name").unwrap(), "Destape");
    assert_eq!(session.result().unwrap().imported, 1);
}

#[tokio::test]
async fn learned_patterns_survive_across_sessions() {
    init_logs();
    let backend = Arc::new(InMemoryBackend::with_options(
        "category",
        vec![RefOption::new("1", "Plomería")],
    ));
    let patterns = Arc::new(SqlitePatternStore::open_in_memory().await.unwrap());

    let mut first = ImportSession::new(
        services_config(),
        "org-1",
        backend.clone(),
        patterns.clone(),
    );
    let csv = "Rubro,Categoría\nDestape,Sanitaria\n";
    first
        .upload(&CsvParser::new(), csv.as_bytes().to_vec())
        .await
        .unwrap();
    // "Rubro" resembles nothing; assign it by hand
    first.map_header("Rubro", Some("name".to_string())).unwrap();
    first.confirm_mapping().await.unwrap();
    first.continue_from_validation().await.unwrap();
    first
        .set_resolution("category", "Sanitaria", Some(ResolutionAction::Map), Some("1".into()))
        .unwrap();
    assert!(first.confirm_conflicts().await.unwrap());

    // Learning is fire-and-forget
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let mut second = ImportSession::new(services_config(), "org-1", backend, patterns);
    second
        .upload(&CsvParser::new(), csv.as_bytes().to_vec())
        .await
        .unwrap();
    // The hand-made header assignment came back on its own
    assert_eq!(second.mapping().get("Rubro").unwrap(), "name");

    second.confirm_mapping().await.unwrap();
    second.continue_from_validation().await.unwrap();
    // "Sanitaria" is auto-matched from the learned value pattern
    assert_eq!(second.stage(), Stage::Conflicts);
    assert!(second.all_resolved());
    let matched = &second.conflicts()[0].matched_values;
    assert!(matched.iter().any(|m| m.original == "Sanitaria" && m.target_id == "1"));
}

#[tokio::test]
async fn revert_delegates_to_backend() {
    init_logs();
    let backend = Arc::new(InMemoryBackend::default());
    let mut session = session(clients_config(), backend.clone());

    let csv = "Nombre,Email\nAna,ana@x.com\n";
    session
        .upload(&CsvParser::new(), csv.as_bytes().to_vec())
        .await
        .unwrap();
    session.confirm_mapping().await.unwrap();
    session.continue_from_validation().await.unwrap();

    let batch_id = session.result().unwrap().batch_id.clone().unwrap();
    session.revert(&batch_id).await.unwrap();
    assert_eq!(*backend.reverted.lock().unwrap(), vec![batch_id]);
}

#[tokio::test]
async fn xlsx_headers_offset_reselection() {
    init_logs();
    // CSV stands in for the grid shape here; XLSX decoding has its own
    // unit tests. This exercises the re-selection flow end to end.
    let backend = Arc::new(InMemoryBackend::default());
    let mut session = session(clients_config(), backend);

    let csv = "Listado de clientes,,\n\
               Nombre,Email,Teléfono\n\
               Ana,ana@x.com,099123456\n";
    session
        .upload(&CsvParser::new(), csv.as_bytes().to_vec())
        .await
        .unwrap();
    assert!(!session.mapping_valid());
    assert_eq!(session.parse_result().unwrap().raw_preview.len(), 3);

    session.set_header_row(&CsvParser::new(), 1).unwrap();
    assert!(session.mapping_valid());
    assert!(session.confirm_mapping().await.unwrap());
}
