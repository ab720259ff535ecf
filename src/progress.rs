use std::io::{self, Write};
use std::time::Instant;

/// Operator-facing lines on stderr, stamped with the time since construction.
/// Structured diagnostics go through `tracing`; this is only for the console.
pub struct ConsoleProgress {
    enabled: bool,
    t0: Instant,
}

impl ConsoleProgress {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            t0: Instant::now(),
        }
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        self.emit(msg.as_ref());
    }

    /// One batch step: position, share done, remaining-time estimate and an
    /// optional per-query summary such as its rank and anomaly score.
    pub fn step(&self, label: &str, current: usize, total: usize, detail: Option<&str>) {
        if !self.enabled {
            return;
        }
        let elapsed = self.t0.elapsed().as_secs_f64();
        self.emit(&step_line(label, current, total, elapsed, detail));
    }

    fn emit(&self, line: &str) {
        if !self.enabled {
            return;
        }
        let ts = fmt_clock(self.t0.elapsed().as_secs_f64());
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "[{ts}] {line}");
    }
}

fn step_line(
    label: &str,
    current: usize,
    total: usize,
    elapsed: f64,
    detail: Option<&str>,
) -> String {
    let total = total.max(1);
    let current = current.min(total);
    let pct = (current as f64 / total as f64) * 100.0;
    let mut line = format!("{label} {current}/{total} ({pct:5.1}%)");
    if current > 0 && current < total {
        let eta = elapsed / current as f64 * (total - current) as f64;
        line.push_str(&format!(" eta {}", fmt_clock(eta)));
    }
    if let Some(detail) = detail.filter(|d| !d.is_empty()) {
        line.push_str(" | ");
        line.push_str(detail);
    }
    line
}

fn fmt_clock(seconds: f64) -> String {
    let seconds = seconds.max(0.0) as u64;
    let (h, m, s) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if h > 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_formats() {
        assert_eq!(fmt_clock(5.4), "00:05");
        assert_eq!(fmt_clock(125.0), "02:05");
        assert_eq!(fmt_clock(3725.0), "01:02:05");
        assert_eq!(fmt_clock(-1.0), "00:00");
    }

    #[test]
    fn step_line_estimates_remaining_time() {
        // 4 of 40 done in 20s: 36 more at 5s each
        assert_eq!(
            step_line("translate", 4, 40, 20.0, Some("q3 rank=2 lad=81.0")),
            "translate 4/40 ( 10.0%) eta 03:00 | q3 rank=2 lad=81.0"
        );
    }

    #[test]
    fn step_line_clamps_and_drops_eta_when_finished() {
        assert_eq!(step_line("translate", 9, 0, 3.0, None), "translate 1/1 (100.0%)");
        assert_eq!(step_line("translate", 0, 8, 3.0, Some("")), "translate 0/8 (  0.0%)");
    }
}
