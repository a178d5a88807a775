use chrono::{Duration, NaiveDate, NaiveDateTime};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d", "%d.%m.%Y", "%d-%b-%Y", "%d %b %Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y %H:%M:%S", "%d/%m/%Y %H:%M"];

/// Excel serials outside this window are almost certainly not dates
/// (1 = 1900-01-01, 2958465 = 9999-12-31).
const SERIAL_MIN: f64 = 1.0;
const SERIAL_MAX: f64 = 2_958_465.0;

/// Renders spreadsheet numbers the way a person typed them: `1001.0` → `1001`.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(d);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date());
        }
    }

    raw.parse::<f64>()
        .ok()
        .filter(|n| (SERIAL_MIN..=SERIAL_MAX).contains(n))
        .and_then(excel_serial_to_date)
}

/// Day 0 of the 1900 date system is 1899-12-30 once the phantom 1900-02-29
/// is accounted for.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(Duration::days(serial.floor() as i64))
}

/// Accepts `1,234.50`, `Tk 1,200`, `Rs. 1,200`, `$ 99`, `(250.00)` and `-250`.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let first_digit = raw.find(|c: char| c.is_ascii_digit())?;

    let negative = (raw.starts_with('(') && raw.ends_with(')')) || raw[..first_digit].contains('-');

    // a dot is a decimal point only between a non-letter and a digit, so
    // abbreviations like `Rs.` and `Tk.` never reach the number
    let chars: Vec<char> = raw.chars().collect();
    let mut cleaned = String::with_capacity(chars.len());
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_digit() {
            cleaned.push(c);
        } else if c == '.' {
            let next_is_digit = chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
            let after_letter = i > 0 && chars[i - 1].is_alphabetic();
            if next_is_digit && !after_letter {
                cleaned.push(c);
            }
        }
    }

    let value = cleaned.parse::<f64>().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if negative { -value } else { value })
}

/// Empty cells become `None`.
pub fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_common_date_spellings() {
        assert_eq!(parse_date("2024-03-05"), Some(ymd(2024, 3, 5)));
        assert_eq!(parse_date("05/03/2024"), Some(ymd(2024, 3, 5)));
        assert_eq!(parse_date("05-03-2024"), Some(ymd(2024, 3, 5)));
        assert_eq!(parse_date("05.03.2024"), Some(ymd(2024, 3, 5)));
        assert_eq!(parse_date("05-Mar-2024"), Some(ymd(2024, 3, 5)));
        assert_eq!(parse_date("2024-03-05 10:30:00"), Some(ymd(2024, 3, 5)));
        assert_eq!(parse_date("not a date"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn parses_excel_serials() {
        assert_eq!(parse_date("45292"), Some(ymd(2024, 1, 1)));
        assert_eq!(parse_date("45292.75"), Some(ymd(2024, 1, 1)));
        assert_eq!(parse_date("0"), None);
    }

    #[test]
    fn parses_amounts() {
        assert_eq!(parse_amount("1,234.50"), Some(1234.5));
        assert_eq!(parse_amount("Tk 1,200"), Some(1200.0));
        assert_eq!(parse_amount("(250.00)"), Some(-250.0));
        assert_eq!(parse_amount("-75"), Some(-75.0));
        assert_eq!(parse_amount("n/a"), None);
        assert_eq!(parse_amount(".5"), Some(0.5));
        assert_eq!(parse_amount(""), None);
    }

    #[test]
    fn formats_numbers() {
        assert_eq!(format_number(1001.0), "1001");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(2.25), "2.25");
    }

    #[test]
    fn currency_abbreviations_keep_their_period_out_of_the_amount() {
        assert_eq!(parse_amount("Rs. 1,200"), Some(1200.0));
        assert_eq!(parse_amount("Tk. 500"), Some(500.0));
        assert_eq!(parse_amount("Tk.500"), Some(500.0));
        assert_eq!(parse_amount("1,200.75 Tk."), Some(1200.75));
        assert_eq!(parse_amount("- Rs. 40"), Some(-40.0));
    }
}
