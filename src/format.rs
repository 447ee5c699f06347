//! Display helpers for money and dates.

use chrono::NaiveDate;

/// Formats an amount in minor units, e.g. `123450` with `"USD"` as `"USD 1,234.50"`.
pub fn format_currency(amount_minor: i64, currency: &str) -> String {
    let negative = amount_minor < 0;
    let abs = amount_minor.unsigned_abs();
    let major = group_thousands(abs / 100);
    let minor = abs % 100;
    let sign = if negative { "-" } else { "" };
    format!("{currency} {sign}{major}.{minor:02}")
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%-d %b %Y").to_string()
}

pub fn format_date_range(check_in: NaiveDate, check_out: NaiveDate) -> String {
    format!("{} - {}", format_date(check_in), format_date(check_out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_thousands_and_pads_cents() {
        assert_eq!(format_currency(123_450, "USD"), "USD 1,234.50");
        assert_eq!(format_currency(5, "EUR"), "EUR 0.05");
        assert_eq!(format_currency(100_000_000, "IDR"), "IDR 1,000,000.00");
        assert_eq!(format_currency(99_900, "USD"), "USD 999.00");
    }

    #[test]
    fn keeps_sign_for_negative_amounts() {
        assert_eq!(format_currency(-250, "USD"), "USD -2.50");
    }

    #[test]
    fn formats_dates_without_leading_zero() {
        let day = NaiveDate::from_ymd_opt(2026, 10, 8).unwrap();
        assert_eq!(format_date(day), "8 Oct 2026");
        let out = NaiveDate::from_ymd_opt(2026, 10, 11).unwrap();
        assert_eq!(format_date_range(day, out), "8 Oct 2026 - 11 Oct 2026");
    }
}
