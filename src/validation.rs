//! Column checks applied to parsed input files.

use crate::errors::ParseError;
use crate::schema::{Column, RAW_REQUIRED, TRANSFORMED_REQUIRED};
use std::path::Path;

/// Required columns for a file: the transformed layout when a `timestamp`
/// column is present, the raw layout otherwise.
pub fn required_columns_for(columns: &[Column]) -> &'static [Column] {
    if columns.contains(&Column::Timestamp) {
        &TRANSFORMED_REQUIRED
    } else {
        &RAW_REQUIRED
    }
}

/// Checks that every column in `required` is present.
pub fn require_columns(path: &Path, present: &[Column], required: &[Column]) -> Result<(), ParseError> {
    let missing: Vec<String> = required
        .iter()
        .filter(|c| !present.contains(c))
        .map(|c| c.name().to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ParseError::MissingColumns { path: path.to_path_buf(), missing })
    }
}

/// Checks that `columns` holds the same set of columns as `expected`.
pub fn require_same_schema(path: &Path, expected: &[Column], columns: &[Column]) -> Result<(), ParseError> {
    let missing: Vec<String> = expected
        .iter()
        .filter(|c| !columns.contains(c))
        .map(|c| c.name().to_string())
        .collect();
    let extra: Vec<String> = columns
        .iter()
        .filter(|c| !expected.contains(c))
        .map(|c| c.name().to_string())
        .collect();
    if missing.is_empty() && extra.is_empty() {
        Ok(())
    } else {
        Err(ParseError::SchemaMismatch { path: path.to_path_buf(), missing, extra })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_missing_required_columns() {
        let present = [Column::Year, Column::Month, Column::Station];
        let err = require_columns(Path::new("a.csv"), &present, &RAW_REQUIRED).unwrap_err();
        match err {
            ParseError::MissingColumns { missing, .. } => {
                assert!(missing.contains(&"PM2.5".to_string()));
                assert!(!missing.contains(&"year".to_string()));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_layout_detection() {
        assert_eq!(required_columns_for(&[Column::Timestamp, Column::Aqi]), &TRANSFORMED_REQUIRED);
        assert_eq!(required_columns_for(&[Column::Year]), &RAW_REQUIRED);
    }

    #[test]
    fn test_schema_mismatch_lists_both_sides() {
        let err = require_same_schema(
            Path::new("b.csv"),
            &[Column::Year, Column::Pm25],
            &[Column::Year, Column::Pm10],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ParseError::SchemaMismatch { ref missing, ref extra, .. }
                if missing == &vec!["PM2.5".to_string()] && extra == &vec!["PM10".to_string()]
        ));
    }

    #[test]
    fn test_column_order_does_not_matter() {
        assert!(require_same_schema(Path::new("c.csv"), &[Column::Year, Column::Pm25], &[Column::Pm25, Column::Year]).is_ok());
    }
}
