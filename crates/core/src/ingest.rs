use crate::error::IngestError;
use crate::models::{CellValue, Column, DatasetRef, Relation};
use std::fs;
use std::path::Path;

/// Load an uploaded artifact into a dataset reference: `.csv` becomes a
/// typed tabular relation, `.txt`/`.md` become a text blob. Word and PDF
/// extraction happen in an external collaborator; their extensions are
/// rejected here.
pub fn load_dataset(path: &Path) -> Result<DatasetRef, IngestError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .ok_or_else(|| IngestError::UnsupportedFormat(path.display().to_string()))?;

    match extension.as_str() {
        "csv" => {
            let contents = fs::read_to_string(path)?;
            Ok(DatasetRef::Tabular(parse_csv(&contents)?))
        }
        "txt" | "md" => {
            let contents = fs::read_to_string(path)?;
            if contents.trim().is_empty() {
                return Err(IngestError::EmptyFile(path.display().to_string()));
            }
            Ok(DatasetRef::Text(contents))
        }
        other => Err(IngestError::UnsupportedFormat(other.to_string())),
    }
}

/// Parse CSV text into a typed relation. Header names are trimmed; a
/// column whose non-empty cells all parse as numbers is typed numeric;
/// empty cells become nulls. A header without any data rows is an error,
/// matching the upstream "CSV file is empty" behavior.
pub fn parse_csv(contents: &str) -> Result<Relation, IngestError> {
    let mut lines = contents
        .lines()
        .filter(|line| !line.trim().is_empty());

    let header_line = lines
        .next()
        .ok_or_else(|| IngestError::CsvParse("missing header row".to_string()))?;
    let names: Vec<String> = split_csv_line(header_line)
        .into_iter()
        .map(|name| name.trim().to_string())
        .collect();

    let mut rows: Vec<Vec<String>> = Vec::new();
    for (number, line) in lines.enumerate() {
        let fields = split_csv_line(line);
        if fields.len() > names.len() {
            return Err(IngestError::CsvParse(format!(
                "row {} has {} fields, expected at most {}",
                number + 2,
                fields.len(),
                names.len()
            )));
        }
        let mut padded = fields;
        padded.resize(names.len(), String::new());
        rows.push(padded);
    }

    if rows.is_empty() {
        return Err(IngestError::EmptyFile("csv has a header but no rows".to_string()));
    }

    let columns = names
        .iter()
        .enumerate()
        .map(|(col, name)| {
            let raw: Vec<&str> = rows.iter().map(|row| row[col].as_str()).collect();
            Column {
                name: name.clone(),
                values: type_column(&raw),
            }
        })
        .collect();

    Ok(Relation { columns })
}

fn type_column(raw: &[&str]) -> Vec<CellValue> {
    let numeric = raw.iter().any(|cell| !cell.trim().is_empty())
        && raw
            .iter()
            .filter(|cell| !cell.trim().is_empty())
            .all(|cell| cell.trim().parse::<f64>().is_ok());

    raw.iter()
        .map(|cell| {
            let trimmed = cell.trim();
            if trimmed.is_empty() {
                CellValue::Null
            } else if numeric {
                match trimmed.parse::<f64>() {
                    Ok(number) => CellValue::Number(number),
                    Err(_) => CellValue::Text(trimmed.to_string()),
                }
            } else {
                CellValue::Text(trimmed.to_string())
            }
        })
        .collect()
}

/// Split one CSV line, honoring double-quoted fields with `""` escapes.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            other => current.push(other),
        }
    }
    fields.push(current);
    fields
}
