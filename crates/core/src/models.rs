use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Canonical string form used for distinct-value counting.
    pub fn canonical(&self) -> Option<String> {
        match self {
            CellValue::Null => None,
            CellValue::Number(value) => Some(format!("n:{:x}", value.to_bits())),
            CellValue::Text(value) => Some(format!("t:{value}")),
        }
    }

    pub fn display(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Number(value) => {
                if value.fract() == 0.0 && value.abs() < 1e15 {
                    format!("{}", *value as i64)
                } else {
                    format!("{value}")
                }
            }
            CellValue::Text(value) => value.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<CellValue>,
}

impl Column {
    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|value| value.is_null()).count()
    }

    pub fn numbers(&self) -> Vec<f64> {
        self.values
            .iter()
            .filter_map(|value| match value {
                CellValue::Number(number) => Some(*number),
                _ => None,
            })
            .collect()
    }

    /// A column is numeric when it holds at least one number and no text.
    pub fn is_numeric(&self) -> bool {
        let mut seen_number = false;
        for value in &self.values {
            match value {
                CellValue::Text(_) => return false,
                CellValue::Number(_) => seen_number = true,
                CellValue::Null => {}
            }
        }
        seen_number
    }
}

/// An ordered tabular relation. All columns hold the same number of rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Relation {
    pub columns: Vec<Column>,
}

impl Relation {
    pub fn row_count(&self) -> usize {
        self.columns
            .first()
            .map(|column| column.values.len())
            .unwrap_or(0)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.name.clone()).collect()
    }

    pub fn numeric_columns(&self) -> Vec<&Column> {
        self.columns.iter().filter(|column| column.is_numeric()).collect()
    }

    /// Render the first `limit` rows as a markdown table for chat previews.
    pub fn to_markdown(&self, limit: usize) -> String {
        if self.columns.is_empty() {
            return String::new();
        }

        let header = self
            .columns
            .iter()
            .map(|column| column.name.as_str())
            .collect::<Vec<_>>()
            .join(" | ");
        let divider = self
            .columns
            .iter()
            .map(|_| "---")
            .collect::<Vec<_>>()
            .join(" | ");

        let mut lines = vec![format!("| {header} |"), format!("| {divider} |")];
        for row in 0..self.row_count().min(limit) {
            let cells = self
                .columns
                .iter()
                .map(|column| column.values[row].display())
                .collect::<Vec<_>>()
                .join(" | ");
            lines.push(format!("| {cells} |"));
        }

        lines.join("\n")
    }
}

/// The dataset a session operates on. Replacing it invalidates any
/// embedding index built for the previous one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DatasetRef {
    Tabular(Relation),
    Text(String),
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub row_count: usize,
    pub column_names: Vec<String>,
    pub null_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QualityScore {
    pub completeness: f64,
    pub unique_ratio: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ColumnStats {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub q50: f64,
    pub q75: f64,
    pub max: f64,
}

/// One gathered piece of evidence for a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ContextItem {
    Summary(DatasetSummary),
    Stats(BTreeMap<String, ColumnStats>),
    Fragments(Vec<String>),
    Note(String),
}

/// Ordered, read-only evidence handed to the generation backend for a
/// single query. Empty means "no factual grounding", never an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextEnvelope {
    items: Vec<ContextItem>,
}

impl ContextEnvelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: ContextItem) {
        self.items.push(item);
    }

    pub fn extend(&mut self, other: ContextEnvelope) {
        self.items.extend(other.items);
    }

    pub fn items(&self) -> &[ContextItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Serialize the envelope into the prompt text the generation backend
    /// treats as its source of truth.
    pub fn render(&self) -> String {
        if self.items.is_empty() {
            return "No specific context retrieved.".to_string();
        }

        let mut sections = Vec::new();
        for item in &self.items {
            match item {
                ContextItem::Summary(summary) => sections.push(format!(
                    "Dataset summary:\n{}",
                    serde_json::to_string_pretty(summary).unwrap_or_default()
                )),
                ContextItem::Stats(stats) => sections.push(format!(
                    "Descriptive statistics:\n{}",
                    serde_json::to_string_pretty(stats).unwrap_or_default()
                )),
                ContextItem::Fragments(fragments) => sections.push(format!(
                    "Retrieved passages:\n{}",
                    fragments.join("\n---\n")
                )),
                ContextItem::Note(note) => sections.push(note.clone()),
            }
        }

        sections.join("\n\n")
    }
}

/// Result of a full `analyze` request over the active dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub response: String,
    pub key_insights: Vec<String>,
    pub quality: Option<QualityScore>,
    pub recommendations: Vec<String>,
}
