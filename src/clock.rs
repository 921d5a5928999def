use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use log::trace;

const NANOS_PER_SEC: u64 = 1_000_000_000;

// Millihertz resolution for the fractional-rate constructor.
const RATE_SCALE: u64 = 1000;

// Sleep wake-up imprecision left for the yield spin to absorb.
const SPIN_THRESHOLD_NS: u64 = 2_000_000;

// Nanoseconds on a process-local monotonic clock; the epoch is the
// first call in the process.
fn monotonic_ns() -> u64 {
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    ORIGIN.get_or_init(Instant::now).elapsed().as_nanos() as u64
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SyncPrecision {
    /// Few milliseconds of jitter with low cpu usage.
    Low,
    /// Sub-millisecond jitter with slightly more cpu usage than
    /// `SyncPrecision::Low`.
    Medium,
    /// Sub-microsecond jitter at full cpu usage.
    High,
}

/// Paces emulated ticks against the wall clock, one frame at a time.
///
/// Feed every [`elapse`](ClockSync::elapse) the cycle count of the last
/// instruction; once a frame's worth of ticks has accumulated the call
/// blocks until the wall clock catches up with the frame deadline.
pub struct ClockSync {
    frame_period: u64,
    frame_period_rem: u64,
    ticks_per_frame: u64,
    ticks_per_frame_rem: u64,
    rate_den: u64,
    precision: SyncPrecision,

    frame_budget: u64,
    tick_rem_acc: u64,
    period_rem_acc: u64,

    frame_count: u64,
    frame_ticks: u64,
    total_ticks: u64,
    busy_period: u64,
    idle_period: u64,
    frame_first_ts: u64,
    frame_next_ts: u64,
    frame_last_ts: u64,
    started: bool,
}

impl ClockSync {
    /// Rates are in ticks and frames per second; both must be nonzero.
    #[must_use]
    pub fn new(clock_rate: u64, frame_rate: u64, precision: SyncPrecision) -> Self {
        Self::with_fractions(clock_rate, 0, frame_rate, 0, precision)
    }

    /// Fractional-rate constructor; the fraction arguments are
    /// thousandths of a unit, so `(1_789_772, 727)` means 1789772.727
    /// ticks per second.
    #[must_use]
    pub fn with_fractions(
        clock_rate: u64,
        clock_rate_fraction: u64,
        frame_rate: u64,
        frame_rate_fraction: u64,
        precision: SyncPrecision,
    ) -> Self {
        assert!(clock_rate > 0 && frame_rate > 0);
        assert!(clock_rate_fraction < RATE_SCALE && frame_rate_fraction < RATE_SCALE);

        let clock_scaled = clock_rate * RATE_SCALE + clock_rate_fraction;
        let frame_scaled = frame_rate * RATE_SCALE + frame_rate_fraction;
        let period_num = NANOS_PER_SEC * RATE_SCALE;

        Self {
            frame_period: period_num / frame_scaled,
            frame_period_rem: period_num % frame_scaled,
            ticks_per_frame: clock_scaled / frame_scaled,
            ticks_per_frame_rem: clock_scaled % frame_scaled,
            rate_den: frame_scaled,
            precision,
            frame_budget: clock_scaled / frame_scaled,
            tick_rem_acc: 0,
            period_rem_acc: 0,
            frame_count: 0,
            frame_ticks: 0,
            total_ticks: 0,
            busy_period: 0,
            idle_period: 0,
            frame_first_ts: 0,
            frame_next_ts: 0,
            frame_last_ts: 0,
            started: false,
        }
    }

    /// Account for `ticks` emulated cycles. Returns immediately inside a
    /// frame; at a frame boundary, blocks until the frame deadline.
    pub fn elapse(&mut self, ticks: u8) {
        if !self.started {
            let now = monotonic_ns();
            self.started = true;
            self.frame_first_ts = now;
            self.frame_next_ts = now;
            self.frame_last_ts = now;
        }

        self.total_ticks += u64::from(ticks);
        self.frame_ticks += u64::from(ticks);
        if self.frame_ticks < self.frame_budget {
            return;
        }

        self.frame_ticks -= self.frame_budget;
        self.frame_count += 1;

        // Roll the fractional remainders into the next budget and the
        // next deadline; long-run totals stay exact within one tick.
        self.tick_rem_acc += self.ticks_per_frame_rem;
        self.frame_budget = self.ticks_per_frame;
        if self.tick_rem_acc >= self.rate_den {
            self.tick_rem_acc -= self.rate_den;
            self.frame_budget += 1;
        }

        self.period_rem_acc += self.frame_period_rem;
        let mut period = self.frame_period;
        if self.period_rem_acc >= self.rate_den {
            self.period_rem_acc -= self.rate_den;
            period += 1;
        }
        self.frame_next_ts += period;

        let transition = monotonic_ns();
        let woke = self.wait_until(self.frame_next_ts);

        trace!(
            "frame {} busy {}ns idle {}ns",
            self.frame_count,
            transition - self.frame_last_ts,
            self.frame_next_ts.saturating_sub(transition)
        );

        self.busy_period += transition - self.frame_last_ts;
        // Saturates when the frame overran its deadline.
        self.idle_period += self.frame_next_ts.saturating_sub(transition);
        self.frame_last_ts = woke;
    }

    fn wait_until(&self, target: u64) -> u64 {
        let mut now = monotonic_ns();
        match self.precision {
            SyncPrecision::Low => {
                // A sleep can wake early; go back down until the
                // deadline is actually reached.
                while now < target {
                    thread::sleep(Duration::from_nanos(target - now));
                    now = monotonic_ns();
                }
            }
            SyncPrecision::Medium => {
                if target.saturating_sub(now) > SPIN_THRESHOLD_NS {
                    thread::sleep(Duration::from_nanos(target - now - SPIN_THRESHOLD_NS));
                    now = monotonic_ns();
                }
                while now < target {
                    thread::yield_now();
                    now = monotonic_ns();
                }
            }
            SyncPrecision::High => {
                while now < target {
                    std::hint::spin_loop();
                    now = monotonic_ns();
                }
            }
        }
        now
    }

    #[inline]
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    #[inline]
    #[must_use]
    pub fn busy_period(&self) -> u64 {
        self.busy_period
    }

    #[inline]
    #[must_use]
    pub fn idle_period(&self) -> u64 {
        self.idle_period
    }

    #[inline]
    #[must_use]
    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    #[inline]
    #[must_use]
    pub fn timestamp_of_first_frame(&self) -> u64 {
        self.frame_first_ts
    }

    #[inline]
    #[must_use]
    pub fn timestamp_of_last_frame(&self) -> u64 {
        self.frame_last_ts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_frame_inside_budget() {
        let mut sync = ClockSync::new(1000, 100, SyncPrecision::Low);
        sync.elapse(5);
        assert_eq!(sync.frame_count(), 0);
        assert_eq!(sync.total_ticks(), 5);
    }

    // 50500 Hz at 5000 fps is 10.1 ticks a frame: ten a frame plus one
    // extra debited every tenth frame.
    #[test]
    fn fractional_ticks_converge() {
        let mut sync = ClockSync::new(50_500, 5000, SyncPrecision::Low);

        for _ in 0..33 {
            sync.elapse(10);
        }
        // 330 ticks: budgets run ten frames of 10 then one of 11, so
        // 33 frames cost 333 ticks and only 32 have completed here.
        assert_eq!(sync.frame_count(), 32);
        assert_eq!(sync.total_ticks(), 330);

        sync.elapse(3);
        assert_eq!(sync.frame_count(), 33);
        assert_eq!(sync.total_ticks(), 333);
    }

    // 2500.5 Hz at 1000 fps: two ticks a frame with an extra one every
    // other frame, exercising the millihertz constructor.
    #[test]
    fn fractional_rate_constructor() {
        let mut sync = ClockSync::with_fractions(2500, 500, 1000, 0, SyncPrecision::Low);

        for _ in 0..9 {
            sync.elapse(1);
        }
        // Budgets 2,2,3,2 consume the first nine ticks over four frames.
        assert_eq!(sync.frame_count(), 4);

        for _ in 0..3 {
            sync.elapse(1);
        }
        // The extra tick lands every other frame; frame five costs 3.
        assert_eq!(sync.frame_count(), 5);
    }

    #[test]
    fn paces_wall_clock() {
        let start = Instant::now();
        let mut sync = ClockSync::new(10_000, 1000, SyncPrecision::High);

        for _ in 0..20 {
            sync.elapse(10);
        }

        assert_eq!(sync.frame_count(), 20);
        // Twenty 1 ms frames cannot complete early.
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert!(sync.timestamp_of_last_frame() >= sync.timestamp_of_first_frame());
        assert!(sync.busy_period() + sync.idle_period() <= start.elapsed().as_nanos() as u64);
    }

    #[test]
    fn medium_precision_reaches_deadline() {
        let start = Instant::now();
        let mut sync = ClockSync::new(5000, 1000, SyncPrecision::Medium);

        for _ in 0..5 {
            sync.elapse(5);
        }

        assert_eq!(sync.frame_count(), 5);
        assert!(start.elapsed() >= Duration::from_millis(5));
    }
}
