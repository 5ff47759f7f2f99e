//! Tabular artifact analyzer for CSV and JSON uploads.
//!
//! Parses rows into JSON objects, classifies the artifact by its column
//! names and computes a handful of per-type metrics.

use std::collections::BTreeSet;
use std::path::Path;

use campflow_core::external::analyzer::{AnalyzedArtifact, ArtifactAnalyzer};
use campflow_types::cache::ArtifactMetadata;
use campflow_types::error::CallError;
use serde_json::{Map, Number, Value, json};

pub const HISTORICAL: &str = "historical";
pub const EXPERIMENT_RESULTS: &str = "experiment_results";
pub const ENRICHMENT: &str = "enrichment";
pub const UNKNOWN: &str = "unknown";

const EXPERIMENT_INDICATORS: &[&str] =
    &["experiment_id", "variant", "variation", "test_group", "control"];
const CAMPAIGN_INDICATORS: &[&str] = &[
    "campaign_name",
    "campaign_id",
    "spend",
    "conversions",
    "impressions",
    "clicks",
    "ctr",
    "cpa",
    "roas",
];
const ENRICHMENT_INDICATORS: &[&str] = &["competitor", "market", "benchmark", "industry", "category"];

/// Campaign columns needed before a file counts as historical data.
const MIN_CAMPAIGN_COLUMNS: usize = 3;

/// Analyzer for `.csv` and `.json` artifacts.
#[derive(Debug, Default, Clone, Copy)]
pub struct TabularAnalyzer;

impl TabularAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl ArtifactAnalyzer for TabularAnalyzer {
    fn analyze(&self, file_name: &str, bytes: &[u8]) -> Result<AnalyzedArtifact, CallError> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let (columns, rows) = match extension.as_str() {
            "csv" => parse_csv(bytes)?,
            "json" => parse_json(bytes)?,
            other => {
                return Err(CallError::Malformed(format!(
                    "unsupported file format: .{other}"
                )));
            }
        };

        let artifact_type = classify(&columns);
        let metrics = match artifact_type {
            HISTORICAL => historical_metrics(&columns, &rows),
            EXPERIMENT_RESULTS => experiment_metrics(&columns, &rows),
            _ => Value::Object(Map::new()),
        };

        tracing::debug!(
            file_name,
            artifact_type,
            rows = rows.len(),
            columns = columns.len(),
            "artifact analyzed"
        );

        Ok(AnalyzedArtifact {
            artifact_type: artifact_type.to_string(),
            metadata: ArtifactMetadata {
                row_count: rows.len() as u64,
                columns,
                metrics,
            },
            rows,
        })
    }
}

/// Classify by column names, case-insensitively.
pub fn classify(columns: &[String]) -> &'static str {
    let lower: BTreeSet<String> = columns.iter().map(|c| c.to_lowercase()).collect();
    let hits = |indicators: &[&str]| indicators.iter().filter(|i| lower.contains(**i)).count();

    if hits(EXPERIMENT_INDICATORS) > 0 {
        EXPERIMENT_RESULTS
    } else if hits(CAMPAIGN_INDICATORS) >= MIN_CAMPAIGN_COLUMNS {
        HISTORICAL
    } else if hits(ENRICHMENT_INDICATORS) > 0 {
        ENRICHMENT
    } else {
        UNKNOWN
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

fn parse_csv(bytes: &[u8]) -> Result<(Vec<String>, Vec<Value>), CallError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| CallError::Malformed(format!("CSV is not UTF-8: {e}")))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut records = split_records(text)?.into_iter();
    let Some(header) = records.next() else {
        return Err(CallError::Malformed("CSV has no header row".into()));
    };
    let columns: Vec<String> = header.into_iter().map(|c| c.trim().to_string()).collect();

    let rows = records
        .filter(|fields| !(fields.len() == 1 && fields[0].trim().is_empty()))
        .map(|fields| {
            let mut row = Map::new();
            for (i, column) in columns.iter().enumerate() {
                let cell = fields.get(i).map(String::as_str).unwrap_or("");
                row.insert(column.clone(), cell_value(cell));
            }
            Value::Object(row)
        })
        .collect();

    Ok((columns, rows))
}

/// Split CSV text into records, honouring quoted fields and `""` escapes.
fn split_records(text: &str) -> Result<Vec<Vec<String>>, CallError> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            ('"', true) => in_quotes = false,
            ('"', false) if field.is_empty() => in_quotes = true,
            (',', false) => record.push(std::mem::take(&mut field)),
            ('\r', false) => {}
            ('\n', false) => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            (c, _) => field.push(c),
        }
    }
    if in_quotes {
        return Err(CallError::Malformed("unterminated quoted field".into()));
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}

fn cell_value(cell: &str) -> Value {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(int) = trimmed.parse::<i64>() {
        return Value::Number(int.into());
    }
    if let Some(number) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(number);
    }
    Value::String(trimmed.to_string())
}

fn parse_json(bytes: &[u8]) -> Result<(Vec<String>, Vec<Value>), CallError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| CallError::Malformed(format!("invalid JSON artifact: {e}")))?;
    let rows = match value {
        Value::Array(items) => items,
        object @ Value::Object(_) => vec![object],
        _ => return Err(CallError::Malformed("unsupported JSON structure".into())),
    };

    let mut columns: Vec<String> = Vec::new();
    for row in &rows {
        let Some(object) = row.as_object() else {
            return Err(CallError::Malformed("JSON rows must be objects".into()));
        };
        for key in object.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }
    Ok((columns, rows))
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

fn numbers<'a>(rows: &'a [Value], column: &'a str) -> impl Iterator<Item = f64> + 'a {
    rows.iter()
        .filter_map(move |row| row.get(column).and_then(Value::as_f64))
}

fn sum(rows: &[Value], column: &str) -> Option<f64> {
    let mut values = numbers(rows, column).peekable();
    values.peek()?;
    Some(values.sum())
}

fn mean(rows: &[Value], column: &str) -> Option<f64> {
    let (total, count) = numbers(rows, column).fold((0.0, 0usize), |(t, n), v| (t + v, n + 1));
    (count > 0).then(|| total / count as f64)
}

fn historical_metrics(columns: &[String], rows: &[Value]) -> Value {
    let mut metrics = Map::new();
    for column in columns {
        match column.to_lowercase().as_str() {
            "spend" | "cost" | "budget" => {
                metrics.insert("total_spend".into(), json!(sum(rows, column)));
                metrics.insert("avg_daily_spend".into(), json!(mean(rows, column)));
            }
            "conversions" | "conv" => {
                metrics.insert("total_conversions".into(), json!(sum(rows, column)));
            }
            "cpa" | "cost_per_acquisition" => {
                metrics.insert("avg_cpa".into(), json!(mean(rows, column)));
            }
            "ctr" | "click_through_rate" => {
                metrics.insert("avg_ctr".into(), json!(mean(rows, column)));
            }
            "roas" | "return_on_ad_spend" => {
                metrics.insert("avg_roas".into(), json!(mean(rows, column)));
            }
            _ => {}
        }
    }
    Value::Object(metrics)
}

fn experiment_metrics(columns: &[String], rows: &[Value]) -> Value {
    let mut metrics = Map::new();
    let distinct = |column: &str| -> Vec<Value> {
        let mut seen = Vec::new();
        for value in rows.iter().filter_map(|row| row.get(column)) {
            if !value.is_null() && !seen.contains(value) {
                seen.push(value.clone());
            }
        }
        seen
    };

    if columns.iter().any(|c| c == "experiment_id") {
        metrics.insert("experiment_count".into(), json!(distinct("experiment_id").len()));
    }

    if let Some(column) = columns.iter().find(|c| {
        let lower = c.to_lowercase();
        lower.contains("variant") || lower.contains("variation")
    }) {
        metrics.insert("variants".into(), Value::Array(distinct(column.as_str())));
    }

    if let Some(column) = columns.iter().find(|c| c.to_lowercase().contains("date")) {
        let dates: BTreeSet<&str> = rows
            .iter()
            .filter_map(|row| row.get(column.as_str()).and_then(Value::as_str))
            .filter(|d| chrono::NaiveDate::parse_from_str(d.get(..10).unwrap_or(d), "%Y-%m-%d").is_ok())
            .collect();
        if let (Some(start), Some(end)) = (dates.first(), dates.last()) {
            metrics.insert("date_range".into(), json!({"start": start, "end": end}));
        }
    }

    Value::Object(metrics)
}
