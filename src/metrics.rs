use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Global metrics instance
pub static METRICS: Lazy<Mutex<Metrics>> = Lazy::new(|| Mutex::new(Metrics::new()));

/// Pipeline metrics tracker
#[derive(Debug, Default)]
pub struct Metrics {
    pub total_files_attempted: u64,
    pub total_files_successful: u64,
    pub total_files_failed: u64,
    pub total_records_parsed: u64,
    pub total_records_skipped: u64,
    pub total_rows_lag_dropped: u64,
    pub total_rows_date_dropped: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub total_bytes_processed: u64,
    /// Accumulated per operation, in first-recorded order.
    pub processing_times: Vec<(String, Duration)>,
    pub start_time: Option<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn record_file_attempt(&mut self) {
        self.total_files_attempted += 1;
    }

    pub fn record_file_success(&mut self, records: u64, bytes: u64) {
        self.total_files_successful += 1;
        self.total_records_parsed += records;
        self.total_bytes_processed += bytes;
    }

    pub fn record_file_failure(&mut self) {
        self.total_files_failed += 1;
    }

    pub fn record_skipped_rows(&mut self, count: u64) {
        self.total_records_skipped += count;
    }

    pub fn record_lag_dropped(&mut self, count: u64) {
        self.total_rows_lag_dropped += count;
    }

    pub fn record_date_dropped(&mut self, count: u64) {
        self.total_rows_date_dropped += count;
    }

    pub fn record_cache_hit(&mut self) {
        self.cache_hits += 1;
    }

    pub fn record_cache_miss(&mut self) {
        self.cache_misses += 1;
    }

    pub fn record_processing_time(&mut self, operation: String, duration: Duration) {
        match self.processing_times.iter_mut().find(|(op, _)| *op == operation) {
            Some((_, total)) => *total += duration,
            None => self.processing_times.push((operation, duration)),
        }
    }

    pub fn get_total_duration(&self) -> Duration {
        self.start_time
            .map(|start| start.elapsed())
            .unwrap_or_default()
    }

    pub fn get_throughput(&self) -> f64 {
        let duration_secs = self.get_total_duration().as_secs_f64();
        if duration_secs > 0.0 {
            self.total_records_parsed as f64 / duration_secs
        } else {
            0.0
        }
    }

    pub fn print_summary(&self) {
        let duration = self.get_total_duration();
        println!("\n========== Pipeline Metrics Summary ==========");
        println!("Total Duration: {:.2?}", duration);
        println!("Files Attempted: {}", self.total_files_attempted);
        println!("Files Successful: {}", self.total_files_successful);
        println!("Files Failed: {}", self.total_files_failed);
        println!("Records Parsed: {}", self.total_records_parsed);
        println!("Records Skipped: {}", self.total_records_skipped);
        println!("Rows Dropped (invalid date): {}", self.total_rows_date_dropped);
        println!("Rows Dropped (no lag history): {}", self.total_rows_lag_dropped);
        println!("Stage Cache: {} hits / {} misses", self.cache_hits, self.cache_misses);
        println!("Bytes Processed: {:.2} MB", self.total_bytes_processed as f64 / 1_048_576.0);
        println!("Throughput: {:.2} records/sec", self.get_throughput());

        if !self.processing_times.is_empty() {
            println!("\nProcessing Times:");
            for (op, duration) in &self.processing_times {
                println!("  {}: {:.2?}", op, duration);
            }
        }
        println!("=============================================\n");
    }
}

/// Helper macro to time an operation
#[macro_export]
macro_rules! time_operation {
    ($name:expr, $op:expr) => {{
        let start = std::time::Instant::now();
        let result = $op;
        let duration = start.elapsed();
        $crate::metrics::METRICS.lock().record_processing_time($name.to_string(), duration);
        result
    }};
}
