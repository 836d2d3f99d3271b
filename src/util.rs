// Parsing and formatting helpers.
//
// Sheet exports carry Brazilian-formatted money (`R$ 1.234,56`) and dates
// (`DD/MM/YYYY`); everything that touches those strings goes through here so
// the rest of the crate works with `f64` and `NaiveDate`.
use crate::types::Valor;
use chrono::NaiveDate;
use num_format::{Locale, ToFormattedString};
use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Placeholder values the sheet uses for "no value".
static JUNK_LABELS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["#N/A", "N/A", "na", "NaN"].into_iter().collect());

/// Normalize a monetary string to an amount.
///
/// - Drops the `R$` prefix and any whitespace (including non-breaking spaces).
/// - Removes `.` thousands separators and turns the `,` decimal into `.`.
/// - Anything that still does not parse, or parses to a non-finite value,
///   becomes `0.0`. Callers never see an error.
pub fn parse_currency(raw: &str) -> f64 {
    let cleaned: String = raw
        .replace("R$", "")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '.')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if cleaned.is_empty() {
        return 0.0;
    }
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

pub fn parse_valor(valor: &Valor) -> f64 {
    match valor {
        Valor::Number(v) if v.is_finite() => *v,
        Valor::Number(_) | Valor::Missing => 0.0,
        Valor::Text(s) => parse_currency(s),
    }
}

/// Parse a completion date. The sheet mostly uses `DD/MM/YYYY`, but two-digit
/// years, ISO dates and a trailing time component all show up in practice.
pub fn parse_br_date(s: &str) -> Option<NaiveDate> {
    let s = s.split_whitespace().next()?;
    let fmt = if s.contains('-') {
        "%Y-%m-%d"
    } else if s.rsplit('/').next().map_or(false, |y| y.len() == 2) {
        "%d/%m/%y"
    } else {
        "%d/%m/%Y"
    };
    NaiveDate::parse_from_str(s, fmt).ok()
}

/// `YYYY-MM` of a date string, or an empty string when it does not parse.
pub fn month_key(s: &str) -> String {
    parse_br_date(s)
        .map(|d| d.format("%Y-%m").to_string())
        .unwrap_or_default()
}

pub fn format_date_br(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Trimmed label, or `None` for blanks and spreadsheet placeholders.
pub fn clean_label(s: Option<&str>) -> Option<String> {
    let s = s?.trim();
    if s.is_empty() || JUNK_LABELS.contains(s) {
        return None;
    }
    Some(s.to_string())
}

/// Format an amount as Brazilian currency, e.g. `R$ 1.234,56`.
pub fn format_brl(n: f64) -> String {
    let neg = n < 0.0;
    let s = format!("{:.2}", n.abs());
    let (int_part, frac_part) = match s.split_once('.') {
        Some(parts) => parts,
        None => (s.as_str(), "00"),
    };
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let grouped = int_val.to_formatted_string(&Locale::pt);
    format!("{}R$ {},{}", if neg { "-" } else { "" }, grouped, frac_part)
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::pt)
}
