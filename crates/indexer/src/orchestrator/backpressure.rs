//! Pause/resume state machine.

use crate::scraper::ScrapeControl;

/// Decides when the scraper must stop issuing fetches.
///
/// Pauses when either the staged or the in-flight count exceeds the pause
/// threshold; resumes only once both are below the resume threshold. The gap
/// between the two thresholds keeps the signal from flapping.
#[derive(Debug, Clone)]
pub struct Backpressure {
    state: ScrapeControl,
    pause_threshold: usize,
    resume_threshold: usize,
}

impl Backpressure {
    /// Start in the running state.
    pub fn new(pause_threshold: usize, resume_threshold: usize) -> Self {
        Self {
            state: ScrapeControl::Running,
            pause_threshold,
            resume_threshold,
        }
    }

    /// Current state.
    pub fn state(&self) -> ScrapeControl {
        self.state
    }

    /// Feed the current counts. Returns the new state on a transition.
    pub fn evaluate(&mut self, staged: usize, in_flight: usize) -> Option<ScrapeControl> {
        let next = match self.state {
            ScrapeControl::Running
                if staged > self.pause_threshold || in_flight > self.pause_threshold =>
            {
                ScrapeControl::Paused
            }
            ScrapeControl::Paused
                if staged < self.resume_threshold && in_flight < self.resume_threshold =>
            {
                ScrapeControl::Running
            }
            _ => return None,
        };
        self.state = next;
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hysteresis() {
        let mut bp = Backpressure::new(100, 50);

        assert_eq!(bp.evaluate(100, 0), None);
        assert_eq!(bp.evaluate(101, 0), Some(ScrapeControl::Paused));
        assert_eq!(bp.evaluate(101, 0), None);

        // Below pause but not below resume: stay paused.
        assert_eq!(bp.evaluate(60, 10), None);
        assert_eq!(bp.evaluate(49, 50), None);
        assert_eq!(bp.evaluate(49, 49), Some(ScrapeControl::Running));
        assert_eq!(bp.state(), ScrapeControl::Running);
    }

    #[test]
    fn test_in_flight_alone_pauses() {
        let mut bp = Backpressure::new(100, 50);
        assert_eq!(bp.evaluate(0, 101), Some(ScrapeControl::Paused));
    }
}
