use std::time::{Duration, Instant};

/// Emitted frames between throughput reports.
pub const THROUGHPUT_REPORT_EVERY: u64 = 5;

const MIN_INFERENCE_SECS: f64 = 1e-6;

/// Drop-frame rate limiter.
///
/// A frame is admitted when at least `1 / max_fps` has passed since the last
/// admitted frame. Rejected frames are discarded, never queued.
#[derive(Clone, Debug)]
pub struct Throttle {
    min_interval: Duration,
    last_emit: Option<Instant>,
}

impl Throttle {
    pub fn new(max_fps: u32) -> Self {
        Self {
            min_interval: Duration::from_nanos(1_000_000_000 / u64::from(max_fps.max(1))),
            last_emit: None,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Admit or drop a frame read at `now`. Admission records `now` as the
    /// last emission.
    pub fn admit(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_emit {
            if now.saturating_duration_since(last) < self.min_interval {
                return false;
            }
        }
        self.last_emit = Some(now);
        true
    }
}

/// Converts inference durations into throughput reports.
#[derive(Clone, Debug, Default)]
pub struct ThroughputTracker {
    emitted: u64,
    last_reported: Option<f64>,
}

impl ThroughputTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one emitted frame's inference duration. Returns the throughput
    /// (`1 / duration`) on every fifth emitted frame.
    pub fn record(&mut self, inference: Duration) -> Option<f64> {
        self.emitted += 1;
        if self.emitted % THROUGHPUT_REPORT_EVERY != 0 {
            return None;
        }
        let fps = 1.0 / inference.as_secs_f64().max(MIN_INFERENCE_SECS);
        self.last_reported = Some(fps);
        Some(fps)
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn last_reported(&self) -> Option<f64> {
        self.last_reported
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_frame_is_always_admitted() {
        let mut throttle = Throttle::new(10);
        assert!(throttle.admit(Instant::now()));
    }

    #[test]
    fn frames_inside_interval_are_dropped() {
        let mut throttle = Throttle::new(10);
        let start = Instant::now();
        assert!(throttle.admit(start));
        assert!(!throttle.admit(start + Duration::from_millis(50)));
        assert!(!throttle.admit(start + Duration::from_millis(99)));
        assert!(throttle.admit(start + Duration::from_millis(100)));
        // Interval restarts from the last admitted frame, not the last read.
        assert!(!throttle.admit(start + Duration::from_millis(150)));
        assert!(throttle.admit(start + Duration::from_millis(200)));
    }

    #[test]
    fn zero_rate_is_clamped_to_one_per_second() {
        let throttle = Throttle::new(0);
        assert_eq!(throttle.min_interval(), Duration::from_secs(1));
    }

    #[test]
    fn admitted_rate_never_exceeds_cap() {
        let mut throttle = Throttle::new(5);
        let start = Instant::now();
        // A source delivering every 10 ms for one second.
        let admitted = (0..100)
            .filter(|i| throttle.admit(start + Duration::from_millis(i * 10)))
            .count();
        assert_eq!(admitted, 5);
    }

    #[test]
    fn throughput_reported_every_fifth_frame() {
        let mut tracker = ThroughputTracker::new();
        let reports: Vec<Option<f64>> = (1..=10)
            .map(|k| tracker.record(Duration::from_millis(k * 10)))
            .collect();
        for (i, report) in reports.iter().enumerate() {
            let k = i as u64 + 1;
            if k % 5 == 0 {
                let expected = 1.0 / (k as f64 * 0.01);
                let fps = report.expect("report on fifth frame");
                assert!((fps - expected).abs() < 1e-9, "frame {k}: {fps} vs {expected}");
            } else {
                assert!(report.is_none(), "frame {k} must not report");
            }
        }
        assert_eq!(tracker.emitted(), 10);
        assert!(tracker.last_reported().is_some());
    }

    #[test]
    fn instant_inference_is_bounded() {
        let mut tracker = ThroughputTracker::new();
        for _ in 0..4 {
            tracker.record(Duration::ZERO);
        }
        let fps = tracker.record(Duration::ZERO).expect("fifth frame reports");
        assert!((fps - 1e6).abs() < 1e-3);
    }
}
