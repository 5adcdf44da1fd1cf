use chrono::Weekday;
use serde::{Deserialize, Serialize};

const ABBREVIATIONS: [(&str, Weekday); 7] = [
    ("Mon", Weekday::Mon),
    ("Tue", Weekday::Tue),
    ("Wed", Weekday::Wed),
    ("Thu", Weekday::Thu),
    ("Fri", Weekday::Fri),
    ("Sat", Weekday::Sat),
    ("Sun", Weekday::Sun),
];

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DayMatching {
    #[default]
    Exact,
    IgnoreCase,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateDays {
    /// Keep the first occurrence of each weekday.
    #[default]
    Collapse,
    /// Every occurrence plans the whole window again.
    Repeat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DayExpansionPolicy {
    pub matching: DayMatching,
    pub duplicates: DuplicateDays,
}

/// Maps free-form day tokens to weekdays by their first three characters.
///
/// Order is preserved and unrecognised tokens are dropped without error.
pub fn expand_days<S: AsRef<str>>(tokens: &[S], policy: DayExpansionPolicy) -> Vec<Weekday> {
    let mut seen = [false; 7];
    let mut expanded = Vec::with_capacity(tokens.len());

    for token in tokens {
        let Some(day) = match_abbreviation(token.as_ref(), policy.matching) else {
            continue;
        };
        if policy.duplicates == DuplicateDays::Collapse {
            let index = day.num_days_from_monday() as usize;
            if seen[index] {
                continue;
            }
            seen[index] = true;
        }
        expanded.push(day);
    }

    expanded
}

fn match_abbreviation(token: &str, matching: DayMatching) -> Option<Weekday> {
    // Surrounding whitespace is ignored: " Wed" is Wednesday.
    let prefix = token.trim().chars().take(3).collect::<String>();
    ABBREVIATIONS
        .iter()
        .find(|(abbreviation, _)| match matching {
            DayMatching::Exact => *abbreviation == prefix,
            DayMatching::IgnoreCase => abbreviation.eq_ignore_ascii_case(&prefix),
        })
        .map(|(_, day)| *day)
}
