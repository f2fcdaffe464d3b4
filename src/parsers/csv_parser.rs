use crate::aqi::AqiCategory;
use crate::data_models::Observation;
use crate::errors::ParseError;
use crate::schema::{Column, ColumnRole, ValueType};
use chrono::NaiveDateTime;
use csv::{ReaderBuilder, StringRecord};
use log::{debug, warn};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Timestamp layouts accepted for a `timestamp` column.
const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

#[derive(Debug, Clone, PartialEq)]
pub struct CsvOptions {
    pub delimiter: u8,
    pub null_markers: Vec<String>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            null_markers: ["", "NA", "NaN", "nan"].iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Rows of one delimited file, with the known columns in header order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFile {
    pub path: PathBuf,
    pub columns: Vec<Column>,
    pub rows: Vec<Observation>,
    pub skipped_rows: usize,
    pub unknown_columns: Vec<String>,
    pub bytes: u64,
}

/// Parse a float that may use comma as decimal separator
pub fn parse_locale_float(s: &str) -> Result<f64, std::num::ParseFloatError> {
    s.replace(',', ".").parse::<f64>()
}

/// Integer field, accepting whole-number floats such as `2013.0`.
fn parse_whole_number(s: &str) -> Option<i64> {
    match s.parse::<i64>() {
        Ok(v) => Some(v),
        Err(_) => match parse_locale_float(s) {
            Ok(f) if f.is_finite() && (f - f.round()).abs() < 1e-9 => Some(f.round() as i64),
            _ => None,
        },
    }
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
}

/// Reads a delimited file with a header row.
pub fn read_observations(path: &Path, options: &CsvOptions) -> Result<ParsedFile, ParseError> {
    let file = File::open(path).map_err(|e| ParseError::IoError { path: path.to_path_buf(), source: e })?;
    let bytes = file.metadata().map(|m| m.len()).unwrap_or(0);
    let mut parsed = read_observations_from_reader(file, path, options)?;
    parsed.bytes = bytes;
    Ok(parsed)
}

/// Same as [`read_observations`] over any reader; `path` only labels errors
/// and log lines.
pub fn read_observations_from_reader<R: Read>(
    source: R,
    path: &Path,
    options: &CsvOptions,
) -> Result<ParsedFile, ParseError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(source);

    let headers = reader
        .headers()
        .map_err(|e| ParseError::HeaderReadError { path: path.to_path_buf(), source: e })?
        .clone();

    // (column, source index) for every recognised header
    let mut column_index_map: Vec<(Column, usize)> = Vec::new();
    let mut unknown_columns = Vec::new();
    for (index, header) in headers.iter().enumerate() {
        match Column::from_name(header) {
            Some(column) if !column_index_map.iter().any(|(c, _)| *c == column) => {
                column_index_map.push((column, index));
            }
            Some(column) => warn!("Duplicate column '{}' in {}; keeping the first", column, path.display()),
            None => unknown_columns.push(header.trim().to_string()),
        }
    }
    if !unknown_columns.is_empty() {
        debug!("Ignoring unknown columns {:?} in {}", unknown_columns, path.display());
    }

    let mut parsed = ParsedFile {
        path: path.to_path_buf(),
        columns: column_index_map.iter().map(|(c, _)| *c).collect(),
        unknown_columns,
        ..Default::default()
    };

    for (row_index, result) in reader.records().enumerate() {
        let file_row_num = row_index + 2;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("Failed to read record at file row {} in {}: {}", file_row_num, path.display(), e);
                parsed.skipped_rows += 1;
                continue;
            }
        };

        match parse_record(&record, &column_index_map, options, path, file_row_num) {
            Some(observation) => parsed.rows.push(observation),
            None => parsed.skipped_rows += 1,
        }
    }

    debug!(
        "Finished parsing {}: {} rows, {} skipped",
        path.display(),
        parsed.rows.len(),
        parsed.skipped_rows
    );
    Ok(parsed)
}

/// One record to an observation. Unparseable measurements become missing
/// values; a calendar field that is missing or not an integer rejects the row.
fn parse_record(
    record: &StringRecord,
    column_index_map: &[(Column, usize)],
    options: &CsvOptions,
    path: &Path,
    file_row_num: usize,
) -> Option<Observation> {
    let mut observation = Observation::default();

    for (column, index) in column_index_map {
        let raw_value = match record.get(*index) {
            Some(v) => v,
            None => {
                warn!("Missing field '{}' at file row {} in {}", column, file_row_num, path.display());
                ""
            }
        };
        let value = raw_value.trim();
        if value.is_empty() || options.null_markers.iter().any(|marker| marker == raw_value || marker == value) {
            // calendar fields are never defaulted
            if matches!(column.role(), ColumnRole::Calendar) {
                warn!("Skipping row {} in {}: '{}' is missing", file_row_num, path.display(), column);
                return None;
            }
            continue;
        }

        match column.value_type() {
            ValueType::Float => match parse_locale_float(value) {
                Ok(v) if v.is_finite() => {
                    if let Some(slot) = observation.float_mut(*column) {
                        *slot = Some(v);
                    }
                }
                _ => warn!(
                    "Float parse failed for '{}' ('{}') in {} at row {}. Setting field to None.",
                    column,
                    raw_value,
                    path.display(),
                    file_row_num
                ),
            },
            ValueType::Integer => {
                let Some(v) = parse_whole_number(value) else {
                    warn!(
                        "Skipping row {} in {}: '{}' is not an integer ('{}')",
                        file_row_num,
                        path.display(),
                        column,
                        raw_value
                    );
                    return None;
                };
                let in_range = match column {
                    Column::No => {
                        observation.no = Some(v);
                        true
                    }
                    Column::Year => i32::try_from(v).map(|y| observation.year = y).is_ok(),
                    Column::Month => u32::try_from(v).map(|m| observation.month = m).is_ok(),
                    Column::Day => u32::try_from(v).map(|d| observation.day = Some(d)).is_ok(),
                    Column::Hour => u32::try_from(v).map(|h| observation.hour = Some(h)).is_ok(),
                    _ => true,
                };
                if !in_range {
                    warn!(
                        "Skipping row {} in {}: '{}' value {} is out of range",
                        file_row_num,
                        path.display(),
                        column,
                        v
                    );
                    return None;
                }
            }
            ValueType::Text => {
                if let Some(slot) = observation.text_mut(*column) {
                    *slot = Some(value.to_string());
                }
            }
            ValueType::Category => match AqiCategory::from_label(value) {
                Some(category) => observation.aqi_category = Some(category),
                None => warn!(
                    "Unknown AQI category '{}' in {} at row {}. Setting field to None.",
                    value,
                    path.display(),
                    file_row_num
                ),
            },
            ValueType::Timestamp => match parse_timestamp(value) {
                Some(ts) => observation.timestamp = Some(ts),
                None => {
                    warn!(
                        "Skipping row {} in {}: cannot parse timestamp '{}'",
                        file_row_num,
                        path.display(),
                        value
                    );
                    return None;
                }
            },
        }
    }

    Some(observation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::timestamp_from_parts;

    const RAW: &str = "\
No,year,month,day,hour,PM2.5,PM10,SO2,NO2,CO,O3,TEMP,PRES,DEWP,RAIN,wd,WSPM,station
1,2013,3,1,0,4,4,4,7,300,77,-0.7,1023,-18.8,0,NNW,4.4,Aotizhongxin
2,2013,3,1,1,NA,8,4,7,300,77,\"-1,1\",1023.2,-18.2,0,N,4.7,Aotizhongxin
3,2013,x,1,2,7,7,5,10,300,73,-1.1,1023.5,-18.2,0,,5.6,Aotizhongxin
";

    fn parse(text: &str) -> ParsedFile {
        read_observations_from_reader(text.as_bytes(), Path::new("test.csv"), &CsvOptions::default()).unwrap()
    }

    #[test]
    fn test_parses_raw_rows() {
        let parsed = parse(RAW);
        assert_eq!(parsed.columns.len(), 18);
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.skipped_rows, 1);

        let first = &parsed.rows[0];
        assert_eq!(first.no, Some(1));
        assert_eq!((first.year, first.month, first.day, first.hour), (2013, 3, Some(1), Some(0)));
        assert_eq!(first.pm25, Some(4.0));
        assert_eq!(first.wd.as_deref(), Some("NNW"));
        assert_eq!(first.station.as_deref(), Some("Aotizhongxin"));
    }

    #[test]
    fn test_null_markers_and_comma_decimals() {
        let parsed = parse(RAW);
        let second = &parsed.rows[1];
        assert_eq!(second.pm25, None);
        assert_eq!(second.temp, Some(-1.1));
    }

    #[test]
    fn test_unknown_columns_are_ignored() {
        let parsed = parse("year,month,extra,PM2.5\n2014,5,abc,12.5\n");
        assert_eq!(parsed.columns, vec![Column::Year, Column::Month, Column::Pm25]);
        assert_eq!(parsed.unknown_columns, vec!["extra".to_string()]);
        assert_eq!(parsed.rows[0].pm25, Some(12.5));
    }

    #[test]
    fn test_reads_transformed_output() {
        let text = "timestamp,year,month,station,AQI,AQI_category\n2015-06-01 03:00:00,2015,6,Dongsi,57,Moderate\n";
        let parsed = parse(text);
        let row = &parsed.rows[0];
        assert_eq!(row.timestamp, timestamp_from_parts(2015, 6, 1, 3));
        assert_eq!(row.aqi, Some(57.0));
        assert_eq!(row.aqi_category, Some(AqiCategory::Moderate));
    }

    #[test]
    fn test_whole_number_floats_are_integers() {
        assert_eq!(parse_whole_number("2013.0"), Some(2013));
        assert_eq!(parse_whole_number("12"), Some(12));
        assert_eq!(parse_whole_number("1.5"), None);
        assert_eq!(parse_whole_number("-1.5"), None);
        assert_eq!(parse_whole_number("abc"), None);
    }

    #[test]
    fn test_blank_year_skips_row() {
        let text = "\
No,year,month,day,hour,PM2.5,station
1, ,3,1,0,4,Dongsi
2,2013,3,1,1,8,Dongsi
";
        let parsed = parse(text);
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.skipped_rows, 1);
        assert_eq!(parsed.rows[0].year, 2013);
        assert!(parsed.rows.iter().all(|r| r.year != 0));
    }

    #[test]
    fn test_padded_null_marker_is_missing() {
        let parsed = parse("year,month,PM2.5\n2014,5, NA \n");
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].pm25, None);
    }

    #[test]
    fn test_missing_day_or_hour_skips_row() {
        let text = "\
No,year,month,day,hour,PM2.5,station
1,2013,3,NA,0,4,Dongsi
2,2013,3,1,,8,Dongsi
3,2013,3,1,2,9,Dongsi
";
        let parsed = parse(text);
        assert_eq!(parsed.skipped_rows, 2);
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!((parsed.rows[0].day, parsed.rows[0].hour), (Some(1), Some(2)));
    }

    #[test]
    fn test_unparseable_float_becomes_missing() {
        let parsed = parse("year,month,PM2.5\n2014,5,high\n");
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].pm25, None);
    }
}
