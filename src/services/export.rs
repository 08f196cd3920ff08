//! CSV and JSON export of history entries

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{iso_millis, FilterCriteria, LogEntry};

/// Columns written by [`to_csv`], in order
pub const CSV_COLUMNS: [&str; 7] = [
    "id",
    "timestamp",
    "type",
    "entite",
    "utilisateur",
    "commentaire",
    "donnees",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json; charset=utf-8",
            ExportFormat::Csv => "text/csv; charset=utf-8",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            _ => Err(format!("Invalid export format: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvOptions {
    pub separator: char,
    pub include_header: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            separator: ';',
            include_header: true,
        }
    }
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Render entries as CSV; no entries yields an empty string
pub fn to_csv(entries: &[LogEntry], options: CsvOptions) -> String {
    if entries.is_empty() {
        return String::new();
    }

    let separator = options.separator.to_string();
    let mut lines = Vec::with_capacity(entries.len() + 1);

    if options.include_header {
        lines.push(CSV_COLUMNS.join(&separator));
    }

    for entry in entries {
        let fields = [
            quote(&entry.id),
            quote(&iso_millis::format(&entry.timestamp)),
            quote(entry.action.as_str()),
            quote(&entry.entite),
            quote(&entry.utilisateur),
            quote(&entry.commentaire),
            quote(&entry.donnees.to_string()),
        ];
        lines.push(fields.join(&separator));
    }

    lines.join("\n")
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportMeta<'a> {
    #[serde(with = "iso_millis")]
    date_export: DateTime<Utc>,
    total: usize,
    criteres: &'a FilterCriteria,
}

#[derive(Serialize)]
struct ExportDocument<'a> {
    meta: ExportMeta<'a>,
    donnees: &'a [LogEntry],
}

/// Render entries as a pretty-printed JSON document with export metadata
pub fn to_json(
    entries: &[LogEntry],
    criteria: &FilterCriteria,
    exported_at: DateTime<Utc>,
) -> Result<String, serde_json::Error> {
    let document = ExportDocument {
        meta: ExportMeta {
            date_export: exported_at,
            total: entries.len(),
            criteres: criteria,
        },
        donnees: entries,
    };
    serde_json::to_string_pretty(&document)
}

/// Render entries in `format`, CSV with a header row
pub fn render(
    format: ExportFormat,
    entries: &[LogEntry],
    criteria: &FilterCriteria,
    separator: char,
    exported_at: DateTime<Utc>,
) -> Result<String, serde_json::Error> {
    match format {
        ExportFormat::Csv => Ok(to_csv(
            entries,
            CsvOptions {
                separator,
                include_header: true,
            },
        )),
        ExportFormat::Json => to_json(entries, criteria, exported_at),
    }
}

/// `<base>_<YYYY-MM-DD>.<ext>`
pub fn download_filename(base: &str, format: ExportFormat, date: NaiveDate) -> String {
    format!(
        "{}_{}.{}",
        base,
        date.format("%Y-%m-%d"),
        format.extension()
    )
}
