//! Import configuration: the target schema for one entity type
//!
//! An [`ImportConfig`] describes the columns a spreadsheet must be
//! mapped onto, including per-column validation rules, normalization,
//! uniqueness and foreign-key declarations. Configs are supplied by the
//! caller and stay constant for the lifetime of a session.

use once_cell::sync::Lazy;
use regex::Regex;

/// Format rule applied to a normalized cell value
#[derive(Debug, Clone, PartialEq)]
pub enum ValueRule {
    Email,
    Phone,
    /// Decimal number, `,` accepted as decimal separator
    Number,
    Integer,
    /// ISO date (YYYY-MM-DD) or DD/MM/YYYY
    Date,
    /// Custom pattern, must match the full value
    Regex(String),
}

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());
static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9][0-9\s\-().]{5,19}$").unwrap());
static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d+([.,]\d+)?$").unwrap());
static INTEGER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+$").unwrap());

/// Accepted spreadsheet date shapes: ISO and the `d/m/y` variants Excel
/// produces in es-* locales. Parsed with chrono so `31/02/2024` fails.
fn is_valid_date(value: &str) -> bool {
    const FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%d/%m/%y"];
    FORMATS
        .iter()
        .any(|f| chrono::NaiveDate::parse_from_str(value, f).is_ok())
}

impl ValueRule {
    /// Check a normalized, non-empty value against this rule
    pub fn check(&self, value: &str) -> bool {
        match self {
            ValueRule::Email => EMAIL_RE.is_match(value),
            ValueRule::Phone => PHONE_RE.is_match(value),
            ValueRule::Number => NUMBER_RE.is_match(value),
            ValueRule::Integer => INTEGER_RE.is_match(value),
            ValueRule::Date => is_valid_date(value),
            ValueRule::Regex(pattern) => match Regex::new(&format!("^(?:{})$", pattern)) {
                Ok(re) => re.is_match(value),
                Err(e) => {
                    log::warn!("Invalid column rule pattern '{}': {}", pattern, e);
                    true
                }
            },
        }
    }
}

/// Normalization applied to a raw cell before any check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Normalize {
    #[default]
    Trim,
    /// Trim, then lowercase
    Lowercase,
    /// Trim, then uppercase
    Uppercase,
    None,
}

impl Normalize {
    pub fn apply(&self, value: &str) -> String {
        match self {
            Normalize::Trim => value.trim().to_string(),
            Normalize::Lowercase => value.trim().to_lowercase(),
            Normalize::Uppercase => value.trim().to_uppercase(),
            Normalize::None => value.to_string(),
        }
    }
}

/// Foreign-key declaration for a column whose values must resolve to an
/// existing related entity's id before commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKeySpec {
    /// Whether missing values may be resolved by creating the entity
    pub allow_create: bool,
}

/// One target field of the import schema
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub id: String,
    pub label: String,
    /// Alternative header spellings accepted by the auto-mapper
    pub aliases: Vec<String>,
    pub required: bool,
    /// Checked case-insensitively against live data during validation
    pub unique: bool,
    pub rule: Option<ValueRule>,
    pub normalize: Normalize,
    pub foreign_key: Option<ForeignKeySpec>,
}

impl ColumnSpec {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            aliases: Vec::new(),
            required: false,
            unique: false,
            rule: None,
            normalize: Normalize::default(),
            foreign_key: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn rule(mut self, rule: ValueRule) -> Self {
        self.rule = Some(rule);
        self
    }

    pub fn normalize(mut self, normalize: Normalize) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn foreign_key(mut self, allow_create: bool) -> Self {
        self.foreign_key = Some(ForeignKeySpec { allow_create });
        self
    }
}

/// Schema + identity for one importable entity type
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Stable identifier used to scope learned patterns
    pub entity_id: String,
    /// Display name shown to the user
    pub entity_label: String,
    /// Table queried by the backend's duplicate check
    pub table_name: String,
    pub columns: Vec<ColumnSpec>,
}

impl ImportConfig {
    pub fn new(
        entity_id: impl Into<String>,
        entity_label: impl Into<String>,
        table_name: impl Into<String>,
        columns: Vec<ColumnSpec>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            entity_label: entity_label.into(),
            table_name: table_name.into(),
            columns,
        }
    }

    pub fn column(&self, id: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.id == id)
    }

    pub fn fk_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| c.foreign_key.is_some())
    }

    pub fn has_fk_columns(&self) -> bool {
        self.fk_columns().next().is_some()
    }

    pub fn unique_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| c.unique)
    }
}
