//! Progress arithmetic and rendering for the presentation boundary.
//!
//! The registry keeps the exact percentage; everything a human sees goes
//! through [`display_percent`] so that repeated renders of the same value
//! compare equal and can be skipped.

/// Width of the text progress bar.
pub const BAR_WIDTH: usize = 10;

/// Percentage of `done` out of `total`, in `0.0..=100.0`.
///
/// A zero `total` counts as complete.
pub fn percent(done: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (done.min(total) as f64 / total as f64) * 100.0
}

/// Round to one decimal place, the precision shown to callers.
pub fn display_percent(value: f64) -> f64 {
    (value.clamp(0.0, 100.0) * 10.0).round() / 10.0
}

/// Render a fixed-width bar such as `▮▮▮▯▯▯▯▯▯▯`.
pub fn progress_bar(value: f64, width: usize) -> String {
    let filled = ((value.clamp(0.0, 100.0) / 100.0) * width as f64).floor() as usize;
    let filled = filled.min(width);
    "▮".repeat(filled) + &"▯".repeat(width - filled)
}

/// One-line rendering: `[42.5%] ▮▮▮▮▯▯▯▯▯▯ Processing frames`.
pub fn render(value: f64, message: &str) -> String {
    let shown = display_percent(value);
    format!("[{shown}%] {} {message}", progress_bar(shown, BAR_WIDTH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_of_frames() {
        assert_eq!(percent(1, 10), 10.0);
        assert_eq!(percent(10, 10), 100.0);
        assert_eq!(percent(12, 10), 100.0);
        assert_eq!(percent(0, 0), 100.0);
    }

    #[test]
    fn display_rounds_to_one_decimal() {
        assert_eq!(display_percent(33.333), 33.3);
        assert_eq!(display_percent(66.666), 66.7);
        assert_eq!(display_percent(-3.0), 0.0);
    }

    #[test]
    fn bar_fills_proportionally() {
        assert_eq!(progress_bar(0.0, 4), "▯▯▯▯");
        assert_eq!(progress_bar(50.0, 4), "▮▮▯▯");
        assert_eq!(progress_bar(100.0, 4), "▮▮▮▮");
    }

    #[test]
    fn render_is_stable_for_sub_precision_changes() {
        assert_eq!(render(10.01, "x"), render(10.04, "x"));
        assert_ne!(render(10.0, "x"), render(10.1, "x"));
    }
}
