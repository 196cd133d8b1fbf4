use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Renders an age in days as `1y 3m`, `2y` or `5m`; unknown or non-positive
/// ages render as an em dash.
pub fn format_age_days(days: Option<f64>) -> String {
    let Some(days) = days.filter(|days| *days > 0.0) else {
        return "—".to_owned();
    };

    let months = (days / 30.44).round() as u64;
    let years = months / 12;
    let rest = months % 12;
    match (years, rest) {
        (0, rest) => format!("{rest}m"),
        (years, 0) => format!("{years}y"),
        (years, rest) => format!("{years}y {rest}m"),
    }
}

pub fn format_percent(ratio: Option<f64>) -> String {
    ratio
        .filter(|ratio| ratio.is_finite())
        .map(|ratio| format!("{}%", (ratio * 100.0).round() as i64))
        .unwrap_or_else(|| "—".to_owned())
}

/// `0x1234…cdef` for graph labels.
pub fn short_id(id: &str) -> String {
    let chars = id.chars().collect::<Vec<_>>();
    if chars.len() <= 10 {
        return id.to_owned();
    }
    let head = chars[..6].iter().collect::<String>();
    let tail = chars[chars.len() - 4..].iter().collect::<String>();
    format!("{head}…{tail}")
}

/// Longer form used by hover readouts.
pub fn abbreviate_id(id: &str) -> String {
    let chars = id.chars().collect::<Vec<_>>();
    if chars.len() <= 16 {
        return id.to_owned();
    }
    let head = chars[..10].iter().collect::<String>();
    let tail = chars[chars.len() - 6..].iter().collect::<String>();
    format!("{head}…{tail}")
}

pub fn stable_hash(id: &str, salt: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    salt.hash(&mut hasher);
    hasher.finish()
}

/// Deterministic value in `[0, 1)` for an identifier and a salt.
pub fn stable_unit(id: &str, salt: &str) -> f64 {
    (stable_hash(id, salt) >> 11) as f64 / (1u64 << 53) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ages_render_in_years_and_months() {
        assert_eq!(format_age_days(None), "—");
        assert_eq!(format_age_days(Some(0.0)), "—");
        assert_eq!(format_age_days(Some(61.0)), "2m");
        assert_eq!(format_age_days(Some(365.25)), "1y");
        assert_eq!(format_age_days(Some(365.25 + 91.0)), "1y 3m");
    }

    #[test]
    fn short_ids_keep_head_and_tail() {
        assert_eq!(
            short_id("0x1234567890abcdef1234567890abcdef12345678"),
            "0x1234…5678"
        );
        assert_eq!(short_id("0xabc"), "0xabc");
    }

    #[test]
    fn stable_units_are_deterministic_and_bounded() {
        let first = stable_unit("0xabc", "risk");
        assert_eq!(first, stable_unit("0xabc", "risk"));
        assert_ne!(first, stable_unit("0xabc", "age"));
        assert!((0.0..1.0).contains(&first));
    }
}
