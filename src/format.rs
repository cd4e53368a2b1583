/// Short label for an axis tick: 1.2K, 3.4M, 5.6B.
pub fn compact(value: f64) -> String {
    let abs = value.abs();
    if abs >= 1_000_000_000.0 {
        format!("{:.1}B", value / 1_000_000_000.0)
    } else if abs >= 1_000_000.0 {
        format!("{:.1}M", value / 1_000_000.0)
    } else if abs >= 1_000.0 {
        format!("{:.1}K", value / 1_000.0)
    } else {
        format!("{:.0}", value)
    }
}

/// Whole number with thousands separators, e.g. 1,234,567.
pub fn thousands(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if rounded < 0.0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Cell text for a possibly missing number.
pub fn or_dash(value: Option<f64>, fmt: fn(f64) -> String) -> String {
    value.map(fmt).unwrap_or_else(|| "-".to_string())
}

/// Trade values are thousands of USD; show them as dollars.
pub fn usd_from_thousands(value: f64) -> String {
    format!("${}", compact(value * 1000.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_picks_a_suffix() {
        assert_eq!(compact(950.0), "950");
        assert_eq!(compact(1_240.0), "1.2K");
        assert_eq!(compact(3_400_000.0), "3.4M");
        assert_eq!(compact(-2_000_000_000.0), "-2.0B");
    }

    #[test]
    fn thousands_groups_digits() {
        assert_eq!(thousands(0.0), "0");
        assert_eq!(thousands(999.0), "999");
        assert_eq!(thousands(1234567.4), "1,234,567");
        assert_eq!(thousands(-45210.0), "-45,210");
    }

    #[test]
    fn missing_values_render_as_dash() {
        assert_eq!(or_dash(None, thousands), "-");
        assert_eq!(or_dash(Some(89690.0), usd_from_thousands), "$89.7M");
    }
}
