//! Money helpers.
//!
//! Every amount in the system is an `i64` count of minor units (cents).
//! Conversions to and from client-facing strings go through this module so
//! rounding happens in exactly one place.

/// Swiss rounding step: 0.05 of the currency unit.
pub const DEFAULT_STEP_CENTS: i64 = 5;

/// Round a fractional cent amount to the nearest multiple of `step`
/// (halves round away from zero).
pub fn round_to_step(cents: f64, step: i64) -> i64 {
    if step <= 1 {
        return cents.round() as i64;
    }
    let step_f = step as f64;
    ((cents / step_f).round() * step_f) as i64
}

/// Round an exact cent amount up to the next multiple of `step`.
pub fn ceil_to_step(cents: i64, step: i64) -> i64 {
    if step <= 1 || cents <= 0 {
        return cents.max(0);
    }
    let rem = cents % step;
    if rem == 0 {
        cents
    } else {
        cents + (step - rem)
    }
}

/// Divide `total` among `parts` and round the share up to `step`.
pub fn split_ceil(total: i64, parts: i64, step: i64) -> i64 {
    if parts <= 0 {
        return total;
    }
    // Exact ceiling division first so the step rounding works on whole cents.
    let share = (total + parts - 1) / parts;
    ceil_to_step(share, step)
}

/// Format cents as a plain decimal string, e.g. `2850` -> `"28.50"`.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Parse a user supplied amount (`"12"`, `"12.5"`, `"12,50"`) into cents.
///
/// Returns `None` for malformed input or more than two decimals.
pub fn parse_amount(input: &str) -> Option<i64> {
    let normalized = input.trim().replace(',', ".");
    if normalized.is_empty() || normalized.starts_with('-') {
        return None;
    }
    let (whole, frac) = match normalized.split_once('.') {
        Some((w, f)) => (w, f),
        None => (normalized.as_str(), ""),
    };
    if frac.len() > 2 || !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let frac_cents: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().ok()? * 10,
        _ => frac.parse().ok()?,
    };
    whole.checked_mul(100)?.checked_add(frac_cents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to_nearest_five() {
        assert_eq!(round_to_step(7357.0, 5), 7355);
        assert_eq!(round_to_step(7358.0, 5), 7360);
        assert_eq!(round_to_step(2499.0, 5), 2500);
        assert_eq!(round_to_step(1011.0, 5), 1010);
        assert_eq!(round_to_step(1013.0, 5), 1015);
    }

    #[test]
    fn test_ceil_and_split() {
        assert_eq!(ceil_to_step(1338, 5), 1340);
        assert_eq!(ceil_to_step(1335, 5), 1335);
        assert_eq!(split_ceil(2000, 3, 5), 670);
        assert_eq!(split_ceil(2000, 2, 5), 1000);
    }

    #[test]
    fn test_parse_and_format() {
        assert_eq!(parse_amount("12"), Some(1200));
        assert_eq!(parse_amount("12.5"), Some(1250));
        assert_eq!(parse_amount("12,05"), Some(1205));
        assert_eq!(parse_amount("1.234"), None);
        assert_eq!(parse_amount("-3"), None);
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(format_cents(2850), "28.50");
        assert_eq!(format_cents(5), "0.05");
    }
}
