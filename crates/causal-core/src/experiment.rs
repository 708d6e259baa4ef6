//! Experiment model: the selected line, its virtual speedup, and the
//! record emitted once it has run.

use core::fmt;
use std::time::Duration;

use rand::Rng;

use crate::frame::{CallFrame, MethodId};
use crate::line_table::LineSelection;

/// Half-open bytecode offset interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LocationRange {
    pub start: i32,
    pub end: i32,
}

impl LocationRange {
    pub const fn new(start: i32, end: i32) -> Self {
        LocationRange { start, end }
    }

    #[inline]
    pub fn contains(&self, offset: i32) -> bool {
        offset >= self.start && offset < self.end
    }
}

/// One virtual-speedup trial on one source line
#[derive(Debug, Clone, PartialEq)]
pub struct Experiment {
    /// Method holding the selected line
    pub method: MethodId,
    /// Offset of the sampled frame that picked this line
    pub offset: i32,
    /// Selected source line
    pub line: i32,
    /// Every offset range compiled from `line`
    pub ranges: Vec<LocationRange>,
    /// Fraction of the base interval charged per in-range sample
    pub speedup: f32,
    /// `speedup * base interval`, in nanoseconds
    pub delay_per_hit_ns: i64,
}

impl Experiment {
    /// Experiment on the line owning `frame`, with no speedup chosen yet.
    pub fn new(frame: CallFrame, selection: LineSelection) -> Self {
        Experiment {
            method: frame.method,
            offset: frame.offset,
            line: selection.line,
            ranges: selection.ranges,
            speedup: 0.0,
            delay_per_hit_ns: 0,
        }
    }

    /// Fix the speedup and derive the per-hit delay from the base interval.
    pub fn set_speedup(&mut self, speedup: f32, base_interval: Duration) {
        self.speedup = speedup;
        self.delay_per_hit_ns = (speedup as f64 * base_interval.as_nanos() as f64).round() as i64;
    }

    /// Whether `frame` executes inside the selected line.
    pub fn contains(&self, frame: &CallFrame) -> bool {
        frame.method == self.method && self.ranges.iter().any(|r| r.contains(frame.offset))
    }
}

/// Number of equally likely non-zero speedups (0.05 steps up to 1.0)
pub const SPEEDUP_STEPS: u32 = 20;

/// Draw a virtual speedup.
///
/// One draw in five is exactly 0.0, the baseline every other speedup is
/// compared against. The rest are uniform over {0.05, 0.10, ..., 1.00}.
pub fn calculate_random_speedup<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    let draw = rng.gen_range(0..SPEEDUP_STEPS + 5);
    if draw < 5 {
        0.0
    } else {
        (draw - 4) as f32 / SPEEDUP_STEPS as f32
    }
}

/// Turn a class signature into a display name.
///
/// `Lcom/acme/Outer$Inner;` becomes `com.acme.Outer`: the type sigil and
/// trailing `;` go, package separators become dots, and everything from the
/// first nested-class marker is cut. Signatures shorter than three
/// characters are returned unchanged.
pub fn clean_signature(signature: &str) -> String {
    if signature.len() < 3 {
        return signature.to_string();
    }
    let mut chars = signature.chars();
    chars.next();
    chars.next_back();
    chars
        .take_while(|&c| c != '$')
        .map(|c| if c == '/' { '.' } else { c })
        .collect()
}

/// CSV header of the result stream
pub const CSV_HEADER: &str =
    "selectedClassLineNo,speedup,duration,effectiveDuration,progressPointHits";

/// One completed experiment, as persisted
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentRecord {
    /// `<dotted.class.name>:<line>`
    pub class_line: String,
    pub speedup: f32,
    /// Wall-clock duration, nanoseconds
    pub duration_ns: i64,
    /// `duration_ns` minus the delay inserted during the experiment
    pub effective_duration_ns: i64,
    pub progress_point_hits: u64,
}

impl ExperimentRecord {
    pub fn new(
        class: &str,
        line: i32,
        speedup: f32,
        duration_ns: i64,
        delay_ns: i64,
        progress_point_hits: u64,
    ) -> Self {
        ExperimentRecord {
            class_line: format!("{}:{}", class, line),
            speedup,
            duration_ns,
            effective_duration_ns: duration_ns - delay_ns,
            progress_point_hits,
        }
    }

    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.class_line,
            self.speedup,
            self.duration_ns,
            self.effective_duration_ns,
            self.progress_point_hits
        )
    }
}

impl fmt::Display for ExperimentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[class: {}] [speedup: {}] [points hit: {}] [delay: {}] [duration: {}]",
            self.class_line,
            self.speedup,
            self.progress_point_hits,
            self.duration_ns - self.effective_duration_ns,
            self.duration_ns
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_table::LineTable;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    #[test]
    fn test_range_is_half_open() {
        let r = LocationRange::new(5, 9);
        assert!(!r.contains(4));
        assert!(r.contains(5));
        assert!(r.contains(8));
        assert!(!r.contains(9));
    }

    #[test]
    fn test_experiment_contains_only_its_method() {
        let table = LineTable::from_pairs(&[(0, 7), (4, 8), (8, 7)]);
        let frame = CallFrame::new(MethodId::new(3), 1);
        let exp = Experiment::new(frame, table.locate(1).unwrap());
        assert_eq!(exp.line, 7);
        assert!(exp.contains(&CallFrame::new(MethodId::new(3), 9)));
        assert!(!exp.contains(&CallFrame::new(MethodId::new(3), 5)));
        assert!(!exp.contains(&CallFrame::new(MethodId::new(4), 1)));
    }

    #[test]
    fn test_delay_per_hit() {
        let table = LineTable::from_pairs(&[(0, 1)]);
        let mut exp = Experiment::new(CallFrame::new(MethodId::new(1), 0), table.locate(0).unwrap());
        exp.set_speedup(0.25, Duration::from_millis(1));
        assert_eq!(exp.delay_per_hit_ns, 250_000);
        // Every 0.05 step lands on a whole multiple of 50us.
        for step in 1..=SPEEDUP_STEPS {
            exp.set_speedup(step as f32 / SPEEDUP_STEPS as f32, Duration::from_millis(1));
            assert_eq!(exp.delay_per_hit_ns, step as i64 * 50_000);
        }
        exp.set_speedup(0.35, Duration::from_millis(1));
        assert_eq!(exp.delay_per_hit_ns, 350_000);
        exp.set_speedup(0.0, Duration::from_millis(1));
        assert_eq!(exp.delay_per_hit_ns, 0);
    }

    #[test]
    fn test_speedup_distribution() {
        const DRAWS: usize = 50_000;
        let mut rng = StdRng::seed_from_u64(0xC0FFEE);
        let mut counts: HashMap<u32, usize> = HashMap::new();

        for _ in 0..DRAWS {
            let s = calculate_random_speedup(&mut rng);
            assert!((0.0..=1.0).contains(&s), "speedup out of range: {}", s);
            let step = (s * SPEEDUP_STEPS as f32).round() as u32;
            assert!(
                (s - step as f32 / SPEEDUP_STEPS as f32).abs() < 1e-6,
                "speedup {} is not a multiple of 0.05",
                s
            );
            *counts.entry(step).or_default() += 1;
        }

        // 0.0 with probability 1/5.
        let zero = counts.get(&0).copied().unwrap_or(0) as f64 / DRAWS as f64;
        assert!((zero - 0.2).abs() < 0.015, "zero frequency {}", zero);

        // Each of the 20 non-zero values with probability 4/5 * 1/20 = 0.04.
        for step in 1..=SPEEDUP_STEPS {
            let freq = counts.get(&step).copied().unwrap_or(0) as f64 / DRAWS as f64;
            assert!((freq - 0.04).abs() < 0.008, "step {} frequency {}", step, freq);
        }
        assert_eq!(counts.len(), SPEEDUP_STEPS as usize + 1);
    }

    #[test]
    fn test_clean_signature() {
        assert_eq!(clean_signature("Lcom/acme/Foo;"), "com.acme.Foo");
        assert_eq!(clean_signature("Lcom/acme/Outer$Inner;"), "com.acme.Outer");
        assert_eq!(clean_signature("LMain;"), "Main");
        assert_eq!(clean_signature("LA"), "LA");
    }

    #[test]
    fn test_record_csv_row() {
        let rec = ExperimentRecord::new("com.acme.Foo", 42, 0.35, 10_000, 2_500, 17);
        assert_eq!(rec.effective_duration_ns, 7_500);
        assert_eq!(rec.to_csv_row(), "com.acme.Foo:42,0.35,10000,7500,17");

        let zero = ExperimentRecord::new("Main", 3, 0.0, 5, 0, 0);
        assert_eq!(zero.to_csv_row(), "Main:3,0,5,5,0");
        assert_eq!(CSV_HEADER.split(',').count(), 5);
    }
}
