//! Trial timeline state: cycles within quarters within the 100-cycle
//! alpha cycle. One `Time` instance is threaded through every network
//! method so layers can condition on quarter and phase.

/// Timing state for the simulation.
#[derive(Clone, Debug, PartialEq)]
pub struct Time {
    /// Accumulated simulated time, in seconds.
    pub time: f32,
    /// Cycle counter within the current alpha cycle, 0..4*cyc_per_qtr.
    pub cycle: u32,
    /// Total cycle counter across the whole run.
    pub cyc_tot: u64,
    /// Current quarter, 0..4. Quarters 0-2 are the minus phase, quarter 3
    /// is the plus phase.
    pub quarter: u32,
    /// Whether the plus phase (clamped targets) is active.
    pub plus_phase: bool,

    /// Simulated seconds per cycle.
    pub time_per_cyc: f32,
    /// Cycles per quarter. 4 quarters make the 100-cycle alpha cycle at
    /// the default of 25.
    pub cyc_per_qtr: u32,
}

impl Default for Time {
    fn default() -> Self {
        Self {
            time: 0.0,
            cycle: 0,
            cyc_tot: 0,
            quarter: 0,
            plus_phase: false,
            time_per_cyc: 0.001,
            cyc_per_qtr: 25,
        }
    }
}

impl Time {
    /// Reset all counters, at start of a run.
    pub fn reset(&mut self) {
        self.time = 0.0;
        self.cycle = 0;
        self.cyc_tot = 0;
        self.quarter = 0;
        self.plus_phase = false;
    }

    /// Start a new alpha cycle: within-trial counters reset, total time
    /// keeps accumulating.
    pub fn alpha_cyc_start(&mut self) {
        self.cycle = 0;
        self.quarter = 0;
        self.plus_phase = false;
    }

    /// Advance one cycle.
    pub fn cycle_inc(&mut self) {
        self.cycle += 1;
        self.cyc_tot += 1;
        self.time += self.time_per_cyc;
    }

    /// Advance one quarter; the fourth quarter is the plus phase.
    pub fn quarter_inc(&mut self) {
        self.quarter += 1;
        self.plus_phase = self.quarter == 3;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quarter_three_is_plus_phase() {
        let mut t = Time::default();
        for q in 0..4 {
            assert_eq!(t.quarter, q);
            assert_eq!(t.plus_phase, q == 3);
            for _ in 0..t.cyc_per_qtr {
                t.cycle_inc();
            }
            t.quarter_inc();
        }
        assert_eq!(t.cycle, 100);
        assert_eq!(t.cyc_tot, 100);
        t.alpha_cyc_start();
        assert_eq!(t.cycle, 0);
        assert!(!t.plus_phase);
        assert_eq!(t.cyc_tot, 100);
    }
}
