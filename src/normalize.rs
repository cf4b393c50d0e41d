use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::FieldValue;


// ASCII, Arabic-Indic, Eastern Arabic-Indic and full-width digits
static NOT_DIGIT_OR_POINT: Lazy<Regex> = Lazy::new(|| Regex::new(
    r"[^0-9.\x{0660}-\x{0669}\x{06F0}-\x{06F9}\x{FF10}-\x{FF19}]"
).expect("failed to compile regex"));


/// Coerces a stored amount (a number, or text such as `"$1,234.50"`) into a finite float.
pub(crate) fn normalize_number(value: Option<&FieldValue>) -> Option<f64> {
    let number = match value? {
        FieldValue::Integer(i) => *i as f64,
        FieldValue::Float(f) => *f,
        FieldValue::Text(text) => parse_amount(text)?,
        _ => return None,
    };
    if number.is_finite() {
        Some(number)
    } else {
        None
    }
}

/// Coerces a stored quantity into an integer; fractional numbers are truncated.
pub(crate) fn normalize_count(value: Option<&FieldValue>) -> Option<i64> {
    match value? {
        FieldValue::Integer(i) => Some(*i),
        FieldValue::Float(f) if f.is_finite() => Some(f.trunc() as i64),
        FieldValue::Bool(b) => Some(i64::from(*b)),
        FieldValue::Text(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Calendar date of a timestamp (in UTC) or of text starting with `YYYY-MM-DD`.
pub(crate) fn normalize_date(value: Option<&FieldValue>) -> Option<NaiveDate> {
    match value? {
        FieldValue::Timestamp(ts) => Some(ts.to_utc().date_naive()),
        FieldValue::Text(text) => {
            let head = match text.char_indices().nth(10) {
                Some((end, _)) => &text[..end],
                None => text.as_str(),
            };
            NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
        },
        _ => None,
    }
}

fn parse_amount(text: &str) -> Option<f64> {
    let kept = NOT_DIGIT_OR_POINT.replace_all(text, "");
    if kept.is_empty() {
        return None;
    }
    let ascii: String = kept.chars()
        .map(ascii_digit)
        .collect::<Option<String>>()?;
    ascii.parse().ok()
}

fn ascii_digit(c: char) -> Option<char> {
    match c {
        '0'..='9' | '.' => Some(c),
        '\u{0660}'..='\u{0669}' => char::from_digit(c as u32 - 0x0660, 10),
        '\u{06F0}'..='\u{06F9}' => char::from_digit(c as u32 - 0x06F0, 10),
        '\u{FF10}'..='\u{FF19}' => char::from_digit(c as u32 - 0xFF10, 10),
        _ => None,
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> FieldValue {
        FieldValue::Text(s.to_owned())
    }

    #[test]
    fn number_from_formatted_text() {
        assert_eq!(normalize_number(Some(&text("1,234.50"))), Some(1234.5));
        assert_eq!(normalize_number(Some(&text("$ 99.99"))), Some(99.99));
        assert_eq!(normalize_number(Some(&text("12 SAR"))), Some(12.0));
    }

    #[test]
    fn number_from_arabic_digits() {
        assert_eq!(normalize_number(Some(&text("١٢٣٫"))), Some(123.0));
        assert_eq!(normalize_number(Some(&text("۴۵.5"))), Some(45.5));
        assert_eq!(normalize_number(Some(&text("１２"))), Some(12.0));
        assert_eq!(normalize_number(Some(&text("1２.5 SAR"))), Some(12.5));
    }

    #[test]
    fn digits_of_other_scripts_are_dropped() {
        assert_eq!(normalize_number(Some(&text("१२"))), None);
        assert_eq!(normalize_number(Some(&text("৩4"))), Some(4.0));
    }

    #[test]
    fn number_missing_or_empty() {
        assert_eq!(normalize_number(Some(&text(""))), None);
        assert_eq!(normalize_number(Some(&text("n/a"))), None);
        assert_eq!(normalize_number(Some(&text("1.2.3"))), None);
        assert_eq!(normalize_number(None), None);
        assert_eq!(normalize_number(Some(&FieldValue::Null)), None);
        assert_eq!(normalize_number(Some(&FieldValue::Bool(true))), None);
    }

    #[test]
    fn number_from_numbers() {
        assert_eq!(normalize_number(Some(&FieldValue::Integer(42))), Some(42.0));
        assert_eq!(normalize_number(Some(&FieldValue::Float(2.5))), Some(2.5));
        assert_eq!(normalize_number(Some(&FieldValue::Float(f64::NAN))), None);
        assert_eq!(normalize_number(Some(&FieldValue::Float(f64::NEG_INFINITY))), None);
    }

    #[test]
    fn counts() {
        assert_eq!(normalize_count(Some(&FieldValue::Integer(7))), Some(7));
        assert_eq!(normalize_count(Some(&FieldValue::Float(7.9))), Some(7));
        assert_eq!(normalize_count(Some(&text(" 12 "))), Some(12));
        assert_eq!(normalize_count(Some(&text("12.5"))), None);
        assert_eq!(normalize_count(Some(&text(""))), None);
        assert_eq!(normalize_count(None), None);
    }

    #[test]
    fn dates() {
        let expected = NaiveDate::from_ymd_opt(2026, 11, 2);
        assert_eq!(normalize_date(Some(&text("2026-11-02"))), expected);
        assert_eq!(normalize_date(Some(&text("2026-11-02T10:00:00Z"))), expected);
        assert_eq!(normalize_date(Some(&text("soon"))), None);
        assert_eq!(normalize_date(Some(&FieldValue::Integer(20261102))), None);

        let ts = crate::model::Timestamp::parse("2026-11-02T23:30:00-02:00").unwrap();
        assert_eq!(normalize_date(Some(&FieldValue::Timestamp(ts))), NaiveDate::from_ymd_opt(2026, 11, 3));
    }
}
