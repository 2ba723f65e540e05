// stats.rs — Running latency statistics for the frame loop.
//
// One `ExecStats` lives for the whole run. Each iteration records its
// wall-clock duration (acquire → filter → display) and the average is the
// total divided by the frame count. Nothing ever resets it: the average
// reported on frame N covers frames 1..=N.

use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecStats {
    total: Duration,
    frames: u64,
    last: Duration,
}

impl ExecStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one iteration.
    pub fn record(&mut self, elapsed: Duration) {
        self.total += elapsed;
        self.frames += 1;
        self.last = elapsed;
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    /// Duration of the most recent iteration (zero before the first).
    pub fn last(&self) -> Duration {
        self.last
    }

    /// Mean iteration time; zero before the first frame.
    pub fn average(&self) -> Duration {
        if self.frames == 0 {
            return Duration::ZERO;
        }
        // Duration / u32 only; divide nanoseconds to keep u64 frame counts.
        let nanos = self.total.as_nanos() / u128::from(self.frames);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

impl fmt::Display for ExecStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "time {:.3} ms, avg {:.3} ms over {} frames",
            self.last.as_secs_f64() * 1e3,
            self.average().as_secs_f64() * 1e3,
            self.frames
        )
    }
}
