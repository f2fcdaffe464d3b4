//! Input discovery and parallel parsing of observation files.

use crate::data_models::Dataset;
use crate::errors::{ParseError, PipelineError};
use crate::metrics::METRICS;
use crate::parsers::csv_parser::{read_observations, CsvOptions, ParsedFile};
use crate::validation::{require_columns, require_same_schema, required_columns_for};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use walkdir::WalkDir;

/// Result of parsing a single file
#[derive(Debug)]
pub struct FileLoadResult {
    pub path: PathBuf,
    pub parsed: Result<ParsedFile, ParseError>,
    pub processing_time_ms: u128,
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}

/// Expands `input` into a sorted list of files: a file is used as is, a
/// directory is walked recursively for `.csv` files and anything else is
/// treated as a glob pattern.
pub fn resolve_inputs(input: &str) -> Result<Vec<PathBuf>, ParseError> {
    let path = Path::new(input);
    let mut files: Vec<PathBuf> = if path.is_file() {
        vec![path.to_path_buf()]
    } else if path.is_dir() {
        WalkDir::new(path)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(e) => Some(e),
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", input, e);
                    None
                }
            })
            .filter(|e| e.file_type().is_file() && is_csv(e.path()))
            .map(|e| e.into_path())
            .collect()
    } else {
        let paths = glob::glob(input).map_err(|e| ParseError::InvalidPattern {
            pattern: input.to_string(),
            message: e.to_string(),
        })?;
        let expanded: Vec<PathBuf> = paths.filter_map(|entry| entry.ok()).filter(|p| p.is_file()).collect();
        info!("Expanded glob {} to {} files", input, expanded.len());
        expanded
    };

    if files.is_empty() {
        return Err(ParseError::NoInputFiles { pattern: input.to_string() });
    }
    files.sort();
    Ok(files)
}

/// Parallel file loader using Rayon
pub struct ParallelLoader {
    num_workers: usize,
    options: CsvOptions,
    show_progress: bool,
}

impl ParallelLoader {
    pub fn new(options: CsvOptions) -> Self {
        let num_workers = num_cpus::get();
        info!("Initializing ParallelLoader with {} workers", num_workers);
        Self { num_workers, options, show_progress: true }
    }

    /// Caps the parsing pool at `num_workers` threads (at least one).
    pub fn with_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers.max(1);
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Parses every file in parallel. Results keep the order of `files`.
    pub fn load_files(&self, files: &[PathBuf]) -> Vec<FileLoadResult> {
        let total_files = files.len();
        info!("Starting parallel parsing of {} files", total_files);

        let progress = Arc::new(if self.show_progress {
            ProgressBar::new(total_files as u64)
        } else {
            ProgressBar::hidden()
        });
        if let Ok(style) =
            ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        {
            progress.set_style(style.progress_chars("#>-"));
        }

        let parse_all = || -> Vec<FileLoadResult> {
            files
                .par_iter()
                .map(|path| {
                    let start = Instant::now();
                    let progress_clone = Arc::clone(&progress);
                    METRICS.lock().record_file_attempt();

                    let parsed = read_observations(path, &self.options).and_then(|file| {
                        require_columns(path, &file.columns, required_columns_for(&file.columns))?;
                        Ok(file)
                    });
                    let processing_time = start.elapsed().as_millis();

                    match &parsed {
                        Ok(file) => {
                            info!(
                                "Parsed {} rows from {} in {}ms",
                                file.rows.len(),
                                path.display(),
                                processing_time
                            );
                            let mut metrics = METRICS.lock();
                            metrics.record_file_success(file.rows.len() as u64, file.bytes);
                            metrics.record_skipped_rows(file.skipped_rows as u64);
                        }
                        Err(e) => {
                            error!("Failed to parse {}: {}", path.display(), e);
                            METRICS.lock().record_file_failure();
                        }
                    }

                    progress_clone.inc(1);
                    FileLoadResult { path: path.clone(), parsed, processing_time_ms: processing_time }
                })
                .collect()
        };

        let results = match ThreadPoolBuilder::new().num_threads(self.num_workers).build() {
            Ok(pool) => pool.install(parse_all),
            Err(e) => {
                warn!("Could not build a {}-thread pool ({}), using the global pool", self.num_workers, e);
                parse_all()
            }
        };

        progress.finish_with_message("File parsing completed");
        results
    }

    /// Parses and concatenates files into one dataset. Every file must
    /// carry the same set of columns as the first.
    pub fn load_dataset(&self, files: &[PathBuf]) -> Result<Dataset, PipelineError> {
        let mut dataset: Option<Dataset> = None;
        for result in self.load_files(files) {
            let file = result.parsed?;
            match dataset.as_mut() {
                None => dataset = Some(Dataset::new(file.columns, file.rows)),
                Some(existing) => {
                    require_same_schema(&file.path, existing.columns(), &file.columns)?;
                    existing.extend(file.rows);
                }
            }
        }
        let dataset = dataset.unwrap_or_default();
        info!("Loaded {} rows from {} files", dataset.len(), files.len());
        Ok(dataset)
    }
}

/// Resolves `input` and loads every matching file.
pub fn load_input(input: &str, options: &CsvOptions) -> Result<Dataset, PipelineError> {
    let files = resolve_inputs(input)?;
    ParallelLoader::new(options.clone()).load_dataset(&files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;
    use std::fs;

    const HEADER: &str = "No,year,month,day,hour,PM2.5,PM10,SO2,NO2,CO,O3,TEMP,PRES,DEWP,RAIN,wd,WSPM,station";

    fn write_station(dir: &Path, name: &str, station: &str) -> PathBuf {
        let path = dir.join(name);
        let body = format!(
            "{}\n1,2013,3,1,0,4,4,4,7,300,77,-0.7,1023,-18.8,0,NNW,4.4,{}\n2,2013,3,1,1,8,8,4,7,300,77,-1.1,1023.2,-18.2,0,N,4.7,{}\n",
            HEADER, station, station
        );
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_resolve_directory_is_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        write_station(dir.path(), "b.csv", "B");
        write_station(dir.path(), "a.csv", "A");
        fs::write(dir.path().join("notes.txt"), "ignore").unwrap();

        let files = resolve_inputs(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.csv"));
    }

    #[test]
    fn test_resolve_glob_without_matches() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = format!("{}/*.csv", dir.path().display());
        assert!(matches!(resolve_inputs(&pattern), Err(ParseError::NoInputFiles { .. })));
    }

    #[test]
    fn test_load_concatenates_in_path_order() {
        let dir = tempfile::tempdir().unwrap();
        let b = write_station(dir.path(), "b.csv", "Tiantan");
        let a = write_station(dir.path(), "a.csv", "Dongsi");

        let loader = ParallelLoader::new(CsvOptions::default()).with_progress(false);
        let dataset = loader.load_dataset(&[a, b]).unwrap();
        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.stations(), vec!["Dongsi", "Tiantan"]);
        assert!(dataset.has_column(Column::Wd));
    }

    #[test]
    fn test_worker_count_does_not_change_result() {
        let dir = tempfile::tempdir().unwrap();
        let files: Vec<PathBuf> = ["Aotizhongxin", "Dongsi", "Tiantan"]
            .iter()
            .enumerate()
            .map(|(i, station)| write_station(dir.path(), &format!("{}.csv", i), station))
            .collect();

        let single = ParallelLoader::new(CsvOptions::default()).with_progress(false).with_workers(1);
        assert_eq!(single.num_workers(), 1);
        assert_eq!(ParallelLoader::new(CsvOptions::default()).with_workers(0).num_workers(), 1);

        let default = ParallelLoader::new(CsvOptions::default()).with_progress(false);
        let one_thread = single.load_dataset(&files).unwrap();
        assert_eq!(one_thread, default.load_dataset(&files).unwrap());
        assert_eq!(one_thread.stations(), vec!["Aotizhongxin", "Dongsi", "Tiantan"]);
    }

    #[test]
    fn test_missing_required_column_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.csv");
        fs::write(&path, "year,month,PM2.5\n2013,3,4\n").unwrap();

        let loader = ParallelLoader::new(CsvOptions::default()).with_progress(false);
        let err = loader.load_dataset(&[path]).unwrap_err();
        assert!(matches!(err, PipelineError::Parse(ParseError::MissingColumns { .. })));
    }
}
