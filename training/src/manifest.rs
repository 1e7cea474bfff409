//! Reader for the `Filename,Class` CSV manifest.

use std::path::Path;

use crate::TrainingError;

pub(crate) const FILENAME_COLUMN: &str = "Filename";
pub(crate) const CLASS_COLUMN: &str = "Class";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ManifestRow {
    pub filename: String,
    pub label: String,
}

pub(crate) fn read(path: &Path) -> Result<Vec<ManifestRow>, TrainingError> {
    let text = std::fs::read_to_string(path).map_err(|source| TrainingError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&text, path)
}

fn parse(text: &str, path: &Path) -> Result<Vec<ManifestRow>, TrainingError> {
    let malformed = |line: usize, reason: String| TrainingError::Manifest {
        path: path.to_path_buf(),
        line,
        reason,
    };

    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim_end_matches('\r')))
        .filter(|(_, l)| !l.trim().is_empty());

    let (header_line, header) = lines
        .next()
        .ok_or_else(|| malformed(1, "missing header".into()))?;
    let header = split_record(header).map_err(|reason| malformed(header_line, reason))?;
    let column = |name: &str| {
        header
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| malformed(header_line, format!("missing column {name:?}")))
    };
    let filename_idx = column(FILENAME_COLUMN)?;
    let class_idx = column(CLASS_COLUMN)?;

    lines
        .map(|(line, record)| {
            let fields = split_record(record).map_err(|reason| malformed(line, reason))?;
            match (fields.get(filename_idx), fields.get(class_idx)) {
                (Some(filename), Some(label)) => Ok(ManifestRow {
                    filename: filename.trim().to_string(),
                    label: label.trim().to_string(),
                }),
                _ => Err(malformed(
                    line,
                    format!("expected {} fields, found {}", header.len(), fields.len()),
                )),
            }
        })
        .collect()
}

/// Splits one CSV record, honouring double-quoted fields with `""` escapes.
fn split_record(record: &str) -> Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = record.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            ('"', true) => in_quotes = false,
            ('"', false) if field.trim().is_empty() => {
                field.clear();
                in_quotes = true;
            }
            (',', false) => fields.push(std::mem::take(&mut field)),
            (c, _) => field.push(c),
        }
    }

    if in_quotes {
        return Err("unterminated quoted field".into());
    }
    fields.push(field);
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(text: &str) -> Result<Vec<ManifestRow>, TrainingError> {
        parse(text, Path::new("TRAIN.csv"))
    }

    #[test]
    fn reads_rows_in_order() {
        let rows = parse_str("Filename,Class\na.wav,Positive\nb.wav,Negative\n").unwrap();
        assert_eq!(
            rows,
            vec![
                ManifestRow {
                    filename: "a.wav".into(),
                    label: "Positive".into()
                },
                ManifestRow {
                    filename: "b.wav".into(),
                    label: "Negative".into()
                },
            ]
        );
    }

    #[test]
    fn columns_are_found_by_name() {
        let rows = parse_str("Class,Extra,Filename\r\nNeutral,x,\"dir, with comma/c.wav\"\r\n\r\n")
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].filename, "dir, with comma/c.wav");
        assert_eq!(rows[0].label, "Neutral");
    }

    #[test]
    fn missing_column_is_reported() {
        let err = parse_str("Filename,Label\na.wav,x\n").unwrap_err();
        assert!(matches!(err, TrainingError::Manifest { line: 1, .. }));
    }

    #[test]
    fn short_row_is_reported_with_its_line() {
        let err = parse_str("Filename,Class\na.wav,x\nb.wav\n").unwrap_err();
        assert!(matches!(err, TrainingError::Manifest { line: 3, .. }));
    }

    #[test]
    fn quoted_quote_is_unescaped() {
        assert_eq!(
            split_record(r#""say ""hi""",b"#).unwrap(),
            vec!["say \"hi\"".to_string(), "b".to_string()]
        );
        assert!(split_record("\"open").is_err());
    }
}
