//! Turn metrics for chat sessions
//!
//! Each user turn records one set of metrics through [`TurnMetrics`].
//!
//! # Metrics
//!
//! - `parley_turns_total`: Counter of turns started, labeled by mode
//! - `parley_turn_failures_total`: Counter of failed turns, labeled by error kind
//! - `parley_turn_duration_seconds`: Histogram of successful turn duration
//! - `parley_fragments_received`: Histogram of fragments per successful turn
//! - `parley_turns_in_flight`: Gauge of turns awaiting a completion
//!
//! # Examples
//!
//! ```
//! use parley::session::metrics::TurnMetrics;
//!
//! let metrics = TurnMetrics::new(true);
//! metrics.record_fragment();
//! metrics.record_success();
//! ```

use metrics::{decrement_gauge, histogram, increment_counter, increment_gauge};
use std::cell::Cell;
use std::time::Instant;

/// Metrics for a single turn
///
/// Uses `Cell` so recording works through shared references held by an
/// in-progress turn. The in-flight gauge is decremented exactly once, either
/// when an outcome is recorded or on drop.
#[derive(Debug)]
pub struct TurnMetrics {
    mode: &'static str,
    start: Instant,
    fragments: Cell<usize>,
    recorded: Cell<bool>,
}

impl TurnMetrics {
    /// Starts tracking a turn and increments the in-flight gauge
    ///
    /// # Arguments
    ///
    /// * `streaming` - Whether the reply is consumed as a fragment stream
    pub fn new(streaming: bool) -> Self {
        let mode = if streaming { "stream" } else { "single" };
        increment_counter!("parley_turns_total", "mode" => mode);
        increment_gauge!("parley_turns_in_flight", 1.0);

        Self {
            mode,
            start: Instant::now(),
            fragments: Cell::new(0),
            recorded: Cell::new(false),
        }
    }

    /// Counts one received fragment
    pub fn record_fragment(&self) {
        self.fragments.set(self.fragments.get() + 1);
    }

    /// Number of fragments counted so far
    pub fn fragments(&self) -> usize {
        self.fragments.get()
    }

    /// Records a committed reply
    pub fn record_success(&self) {
        if self.recorded.replace(true) {
            return;
        }

        histogram!(
            "parley_turn_duration_seconds",
            self.start.elapsed().as_secs_f64(),
            "mode" => self.mode
        );
        histogram!("parley_fragments_received", self.fragments.get() as f64);
        decrement_gauge!("parley_turns_in_flight", 1.0);
    }

    /// Records a failed turn
    ///
    /// # Arguments
    ///
    /// * `kind` - Short error label, see `ParleyError::kind`
    pub fn record_failure(&self, kind: &str) {
        if self.recorded.replace(true) {
            return;
        }

        increment_counter!("parley_turn_failures_total", "kind" => kind.to_string());
        decrement_gauge!("parley_turns_in_flight", 1.0);
    }

    /// Returns elapsed time since the turn started
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

impl Drop for TurnMetrics {
    fn drop(&mut self) {
        if !self.recorded.get() {
            decrement_gauge!("parley_turns_in_flight", 1.0);
        }
    }
}

/// Initializes the metrics exporter for Prometheus
///
/// Only has an effect when compiled with the `prometheus` feature; otherwise
/// it is a no-op that is still safe to call.
///
/// # Examples
///
/// ```
/// use parley::session::metrics::init_metrics_exporter;
///
/// init_metrics_exporter();
/// ```
pub fn init_metrics_exporter() {
    #[cfg(feature = "prometheus")]
    {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let builder = PrometheusBuilder::new();
        let _ = builder.install().map_err(|e| {
            tracing::warn!("Failed to install Prometheus exporter: {}", e);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_metrics_mode() {
        assert_eq!(TurnMetrics::new(true).mode, "stream");
        assert_eq!(TurnMetrics::new(false).mode, "single");
    }

    #[test]
    fn test_record_fragment_counts() {
        let metrics = TurnMetrics::new(true);
        metrics.record_fragment();
        metrics.record_fragment();
        assert_eq!(metrics.fragments(), 2);
    }

    #[test]
    fn test_record_success_sets_flag() {
        let metrics = TurnMetrics::new(true);
        metrics.record_success();
        assert!(metrics.recorded.get());
    }

    #[test]
    fn test_failure_after_success_ignored() {
        let metrics = TurnMetrics::new(false);
        metrics.record_success();
        metrics.record_failure("timeout");
        assert!(metrics.recorded.get());
    }

    #[test]
    fn test_drop_without_recording() {
        let metrics = TurnMetrics::new(true);
        assert!(!metrics.recorded.get());
        drop(metrics);
    }

    #[test]
    fn test_elapsed_increases() {
        let metrics = TurnMetrics::new(true);
        let t1 = metrics.elapsed();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(metrics.elapsed() > t1);
    }

    #[test]
    fn test_init_metrics_exporter() {
        init_metrics_exporter();
    }
}
