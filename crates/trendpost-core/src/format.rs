/// Formats a whole count with comma thousands separators: `12345` -> `12,345`.
pub fn count(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Formats a non-negative metric value. Whole numbers get thousands
/// separators, fractional values keep one decimal.
pub fn metric(value: f64) -> String {
    if value.fract().abs() < f64::EPSILON && value >= 0.0 && value < u64::MAX as f64 {
        count(value as u64)
    } else {
        format!("{value:.1}")
    }
}

/// `25.0` -> `+25.0%`, `-4.76` -> `-4.8%`, `0` -> `0.0%`.
pub fn signed_percent(value: f64) -> String {
    if value > 0.0 {
        format!("+{value:.1}%")
    } else {
        format!("{value:.1}%")
    }
}
