//! Number formatting shared by the text writers.
//!
//! The correction table and the report files are consumed by tools that expect the compact
//! `%g` notation (6 significant digits, trailing zeros removed, exponent form outside
//! `1e-4 ..= 1e6`). [`fmt_g`] reproduces it.

/// Format a float the way C's `%g` does with the default precision of 6.
///
/// Arguments
/// -----------------
/// * `value` – Number to format.
///
/// Return
/// ----------
/// * The shortest `%g` rendering: `"0"`, `"12.5"`, `"1e+07"`, `"-3.2e-05"`, `"nan"`, `"inf"`.
pub fn fmt_g(value: f64) -> String {
    fmt_g_prec(value, 6)
}

/// Same as [`fmt_g`] with an explicit number of significant digits (`%.<prec>g`).
pub fn fmt_g_prec(value: f64, prec: usize) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    let prec = prec.max(1);
    // Exponent after rounding to `prec` significant digits
    let sci = format!("{:.*e}", prec - 1, value);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };

    if exp < -4 || exp >= prec as i32 {
        let mantissa = strip_trailing_zeros(mantissa);
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exp.abs())
    } else {
        let decimals = (prec as i32 - 1 - exp).max(0) as usize;
        strip_trailing_zeros(&format!("{value:.decimals$}")).to_string()
    }
}

fn strip_trailing_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

#[cfg(test)]
mod format_tests {
    use super::*;

    #[test]
    fn test_fixed_notation() {
        assert_eq!(fmt_g(1.0), "1");
        assert_eq!(fmt_g(12.5), "12.5");
        assert_eq!(fmt_g(-0.25), "-0.25");
        assert_eq!(fmt_g(123456.0), "123456");
        assert_eq!(fmt_g(0.0001), "0.0001");
        assert_eq!(fmt_g(3.14159265), "3.14159");
    }

    #[test]
    fn test_exponent_notation() {
        assert_eq!(fmt_g(1234567.0), "1.23457e+06");
        assert_eq!(fmt_g(1e7), "1e+07");
        assert_eq!(fmt_g(-3.2e-5), "-3.2e-05");
        assert_eq!(fmt_g(1e-300), "1e-300");
    }

    #[test]
    fn test_special_values() {
        assert_eq!(fmt_g(0.0), "0");
        assert_eq!(fmt_g(f64::NAN), "nan");
        assert_eq!(fmt_g(f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn test_rounding_moves_exponent() {
        // 999999.5 rounds to 1e+06 at 6 significant digits
        assert_eq!(fmt_g(999999.5), "1e+06");
        assert_eq!(fmt_g(0.000099999999), "0.0001");
    }
}
