/// `M:SS`, minutes unbounded. Negative or non-finite input renders as `0:00`.
pub fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "0:00".to_string();
    }
    let whole = seconds.floor() as u64;
    format!("{}:{:02}", whole / 60, whole % 60)
}

pub fn progress_pct(position: f64, duration: f64) -> f64 {
    if duration.is_nan() || duration <= 0.0 || !position.is_finite() {
        return 0.0;
    }
    (position / duration * 100.0).clamp(0.0, 100.0)
}
