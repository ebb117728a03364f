//! Best-effort publication date normalisation.
//!
//! Year/month/day parts become `YYYY-MM-DD`, `YYYY-MM` or `YYYY`. Anything
//! that does not parse degrades to the raw text instead of failing.

use chrono::NaiveDate;

use crate::models::RawPubDate;

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

pub fn normalise_pub_date(raw: &RawPubDate) -> String {
    parse_parts(raw).unwrap_or_else(|| raw_text(raw))
}

fn parse_parts(raw: &RawPubDate) -> Option<String> {
    let year: i32 = part(&raw.year)?
        .parse()
        .ok()
        .filter(|y| (1000..=9999).contains(y))?;

    let Some(month) = part(&raw.month) else {
        // a day without a month cannot be placed
        return part(&raw.day).is_none().then(|| format!("{year:04}"));
    };
    let month = parse_month(month)?;

    match part(&raw.day) {
        None => Some(format!("{year:04}-{month:02}")),
        Some(day) => {
            let day: u32 = day.parse().ok()?;
            let date = NaiveDate::from_ymd_opt(year, month, day)?;
            Some(date.format("%Y-%m-%d").to_string())
        }
    }
}

/// `Jan`, `January`, `01` or `1`.
fn parse_month(month: &str) -> Option<u32> {
    if let Ok(n) = month.parse::<u32>() {
        return (1..=12).contains(&n).then_some(n);
    }
    let lower = month.to_ascii_lowercase();
    let prefix = lower.get(..3)?;
    let idx = MONTHS.iter().position(|m| *m == prefix)?;
    let full_ok = chrono::Month::try_from(idx as u8 + 1)
        .map(|m| lower.len() == 3 || m.name().eq_ignore_ascii_case(&lower))
        .unwrap_or(false);
    full_ok.then_some(idx as u32 + 1)
}

fn raw_text(raw: &RawPubDate) -> String {
    if let Some(medline) = part(&raw.medline_date) {
        return medline.to_string();
    }
    [&raw.year, &raw.month, &raw.day]
        .into_iter()
        .filter_map(|p| part(p))
        .collect::<Vec<_>>()
        .join(" ")
}

fn part(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
