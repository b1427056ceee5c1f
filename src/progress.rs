//! Wall-clock progress and ETA accounting for the batch loop.
//!
//! Purely observational: nothing here affects which records run.
use std::fmt;
use std::time::{Duration, Instant};

/// Emits a snapshot at most once per check-in interval.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    started: Instant,
    last_report: Instant,
    interval: Duration,
    start_index: usize,
    total: usize,
}

impl ProgressTracker {
    /// `start_index` is where this run resumed; throughput only counts
    /// records processed after it.
    pub fn new(now: Instant, interval: Duration, start_index: usize, total: usize) -> Self {
        Self {
            started: now,
            last_report: now,
            interval,
            start_index,
            total,
        }
    }

    /// Snapshot if the check-in interval has elapsed since the last one.
    pub fn poll(&mut self, now: Instant, completed: usize) -> Option<ProgressSnapshot> {
        if now.saturating_duration_since(self.last_report) < self.interval {
            return None;
        }
        self.last_report = now;
        Some(self.snapshot(now, completed))
    }

    pub fn snapshot(&self, now: Instant, completed: usize) -> ProgressSnapshot {
        let elapsed = now.saturating_duration_since(self.started);
        let processed = completed.saturating_sub(self.start_index);
        let secs = elapsed.as_secs_f64();
        let per_sec = if secs > 0.0 {
            processed as f64 / secs
        } else {
            0.0
        };
        let remaining = self.total.saturating_sub(completed);
        let eta = (per_sec > 0.0).then(|| Duration::from_secs_f64(remaining as f64 / per_sec));
        let percent = if self.total == 0 {
            100.0
        } else {
            completed as f64 * 100.0 / self.total as f64
        };
        ProgressSnapshot {
            completed,
            total: self.total,
            processed_this_run: processed,
            elapsed,
            records_per_minute: per_sec * 60.0,
            percent,
            eta,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub total: usize,
    pub processed_this_run: usize,
    pub elapsed: Duration,
    pub records_per_minute: f64,
    pub percent: f64,
    /// `None` until at least one record has been processed this run.
    pub eta: Option<Duration>,
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} ({:.1}%) | {:.1} records/min | elapsed {}",
            self.completed,
            self.total,
            self.percent,
            self.records_per_minute,
            format_duration(self.elapsed)
        )?;
        match self.eta {
            Some(eta) => write!(f, " | ETA {}", format_duration(eta)),
            None => write!(f, " | ETA unknown"),
        }
    }
}

pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h {minutes:02}m {seconds:02}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throughput_counts_only_this_run() {
        let start = Instant::now();
        let tracker = ProgressTracker::new(start, Duration::from_secs(120), 40, 100);

        let snapshot = tracker.snapshot(start + Duration::from_secs(60), 52);

        assert_eq!(snapshot.processed_this_run, 12);
        assert!((snapshot.records_per_minute - 12.0).abs() < 1e-9);
        assert!((snapshot.percent - 52.0).abs() < 1e-9);
        assert_eq!(snapshot.eta, Some(Duration::from_secs(240)));
        assert_eq!(
            snapshot.to_string(),
            "52/100 (52.0%) | 12.0 records/min | elapsed 1m 00s | ETA 4m 00s"
        );
    }

    #[test]
    fn poll_respects_checkin_interval() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::new(start, Duration::from_secs(120), 0, 10);

        assert!(tracker.poll(start + Duration::from_secs(30), 1).is_none());
        assert!(tracker.poll(start + Duration::from_secs(120), 2).is_some());
        assert!(tracker.poll(start + Duration::from_secs(200), 3).is_none());
        assert!(tracker.poll(start + Duration::from_secs(241), 4).is_some());
    }

    #[test]
    fn eta_unknown_before_first_record() {
        let start = Instant::now();
        let tracker = ProgressTracker::new(start, Duration::from_secs(1), 5, 10);
        let snapshot = tracker.snapshot(start + Duration::from_secs(10), 5);
        assert_eq!(snapshot.eta, None);
        assert!(snapshot.to_string().ends_with("ETA unknown"));
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(Duration::from_secs(7)), "7s");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1h 02m 03s");
    }
}
