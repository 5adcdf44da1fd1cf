use crate::infrastructure::error::InfraError;
use chrono::NaiveDateTime;
use url::Url;

const CALENDAR_TEMPLATE_BASE: &str = "https://www.google.com/calendar/render";
const CALENDAR_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Builds a "create event" link for Google Calendar. The session times are
/// written as given; no timezone conversion happens here.
pub fn google_calendar_link(
    title: &str,
    start: NaiveDateTime,
    end: NaiveDateTime,
    details: &str,
) -> Result<String, InfraError> {
    let dates = format!(
        "{}/{}",
        start.format(CALENDAR_DATE_FORMAT),
        end.format(CALENDAR_DATE_FORMAT)
    );
    let url = Url::parse_with_params(
        CALENDAR_TEMPLATE_BASE,
        &[
            ("action", "TEMPLATE"),
            ("text", title),
            ("dates", dates.as_str()),
            ("details", details),
        ],
    )
    .map_err(|error| InfraError::Internal(format!("invalid calendar link: {error}")))?;
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(value: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M").expect("valid timestamp")
    }

    #[test]
    fn link_carries_title_dates_and_details() {
        let link = google_calendar_link(
            "Linear algebra & proofs",
            at("2025-04-28 09:00"),
            at("2025-04-28 10:30"),
            "Manual study session for Linear algebra & proofs",
        )
        .expect("build link");

        let parsed = Url::parse(&link).expect("parse link");
        assert_eq!(parsed.host_str(), Some("www.google.com"));
        let pairs = parsed.query_pairs().into_owned().collect::<Vec<_>>();
        assert_eq!(pairs[0], ("action".to_string(), "TEMPLATE".to_string()));
        assert_eq!(pairs[1].1, "Linear algebra & proofs");
        assert_eq!(pairs[2].1, "20250428T090000Z/20250428T103000Z");
        assert!(link.contains("text=Linear+algebra+%26+proofs"));
    }
}
