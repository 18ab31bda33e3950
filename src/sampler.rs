//! Frame sampling and throttling.
//!
//! A frame reaches the detector only when its 1-based count is a multiple of
//! `skip_frames` and at least `1 / target_fps` has elapsed since the last
//! processed frame. Rejected frames are dropped, never buffered.

use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplerSettings {
    /// Process every Nth frame. Zero is treated as one.
    pub skip_frames: u64,
    /// Upper bound on processed frames per second.
    pub target_fps: f64,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            skip_frames: 5,
            target_fps: 5.0,
        }
    }
}

impl SamplerSettings {
    /// Minimum spacing between processed frames.
    pub fn frame_interval(&self) -> Duration {
        if self.target_fps.is_finite() && self.target_fps > 0.0 {
            Duration::from_secs_f64(1.0 / self.target_fps)
        } else {
            Duration::ZERO
        }
    }
}

#[derive(Clone, Debug)]
pub struct Sampler {
    skip_frames: u64,
    interval: Duration,
    last_processed: Instant,
}

impl Sampler {
    /// `started_at` seeds the time gate, so the first accepted frame is at
    /// least one interval after the session opened.
    pub fn new(settings: SamplerSettings, started_at: Instant) -> Self {
        Self {
            skip_frames: settings.skip_frames.max(1),
            interval: settings.frame_interval(),
            last_processed: started_at,
        }
    }

    /// Modulus gate alone, without touching the time gate.
    pub fn passes_skip(&self, frame_count: u64) -> bool {
        frame_count % self.skip_frames == 0
    }

    /// Decide whether frame `frame_count`, seen at `now`, should be processed.
    pub fn admit(&mut self, frame_count: u64, now: Instant) -> bool {
        if !self.passes_skip(frame_count) {
            return false;
        }
        if now.saturating_duration_since(self.last_processed) < self.interval {
            return false;
        }
        self.last_processed = now;
        true
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn last_processed(&self) -> Instant {
        self.last_processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(skip_frames: u64, target_fps: f64) -> SamplerSettings {
        SamplerSettings {
            skip_frames,
            target_fps,
        }
    }

    #[test]
    fn modulus_gate_keeps_every_fifth_frame() {
        let sampler = Sampler::new(settings(5, 5.0), Instant::now());
        let candidates = (1..=100u64).filter(|n| sampler.passes_skip(*n)).count();
        assert_eq!(candidates, 20);
        assert!(!sampler.passes_skip(4));
        assert!(sampler.passes_skip(5));
    }

    #[test]
    fn time_gate_drops_frames_inside_interval() {
        let start = Instant::now();
        let mut sampler = Sampler::new(settings(1, 5.0), start);
        assert_eq!(sampler.interval(), Duration::from_millis(200));

        let first = start + Duration::from_millis(250);
        assert!(sampler.admit(1, first));
        assert!(!sampler.admit(2, first + Duration::from_millis(100)));
        assert!(!sampler.admit(3, first + Duration::from_millis(199)));
        assert!(sampler.admit(4, first + Duration::from_millis(250)));
    }

    #[test]
    fn first_frame_waits_one_interval_after_start() {
        let start = Instant::now();
        let mut sampler = Sampler::new(settings(1, 5.0), start);
        assert!(!sampler.admit(1, start + Duration::from_millis(50)));
        assert_eq!(sampler.last_processed(), start);
        assert!(sampler.admit(2, start + Duration::from_millis(200)));
    }

    #[test]
    fn rejected_frames_leave_state_untouched() {
        let start = Instant::now();
        let mut sampler = Sampler::new(settings(5, 5.0), start);
        let later = start + Duration::from_secs(1);
        assert!(!sampler.admit(3, later));
        assert_eq!(sampler.last_processed(), start);
        assert!(sampler.admit(5, later));
        assert_eq!(sampler.last_processed(), later);
    }

    #[test]
    fn both_gates_combine() {
        let start = Instant::now();
        let mut sampler = Sampler::new(settings(5, 5.0), start);
        // 30 fps source: frame n arrives at n * 33ms.
        let accepted: Vec<u64> = (1..=60u64)
            .filter(|n| sampler.admit(*n, start + Duration::from_millis(n * 33)))
            .collect();
        assert_eq!(accepted, vec![10, 20, 30, 40, 50, 60]);
    }

    #[test]
    fn zero_skip_is_treated_as_one() {
        let start = Instant::now();
        let mut sampler = Sampler::new(settings(0, 1000.0), start);
        assert!(sampler.admit(7, start + Duration::from_millis(5)));
    }
}
