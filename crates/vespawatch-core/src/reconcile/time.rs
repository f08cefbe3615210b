//! Observation timestamp parsing for remote payloads.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{Error, Result};
use crate::inat::{ObservedOnDetails, RemoteObservation};

/// Formats observed in remote observed-on strings, tried in order.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%d-%m-%Y %H:%M",
];

const NAIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d-%m-%Y"];

enum ParsedTime {
    /// Carried its own offset
    Aware(DateTime<Utc>),
    /// No timezone information in the string
    Naive(NaiveDateTime),
}

/// Derive the observation timestamp for a remote payload.
///
/// The observed-on string is tried first; when it cannot be parsed, the
/// timestamp is reconstructed from the explicit date components (hour-level
/// precision only). Naive results are interpreted in the payload's timezone
/// when it names a valid zone, otherwise in the deployment timezone. Fails
/// with [`Error::ParseDate`] when neither source yields a timestamp.
pub fn observation_time_from_payload(
    payload: &RemoteObservation,
    deployment_timezone: Tz,
) -> Result<DateTime<Utc>> {
    let payload_zone = payload
        .observed_time_zone
        .as_deref()
        .and_then(|name| name.parse::<Tz>().ok());

    if let Some(parsed) = parse_observed_on_string(&payload.observed_on_string) {
        return match parsed {
            ParsedTime::Aware(aware) => Ok(aware),
            ParsedTime::Naive(naive) => {
                resolve_naive(naive, payload_zone, deployment_timezone)
            }
        };
    }

    if let Some(details) = payload.observed_on_details {
        let naive = naive_from_details(&details)?;
        return resolve_naive(naive, payload_zone, deployment_timezone);
    }

    Err(Error::ParseDate(payload.observed_on_string.clone()))
}

/// Attach the deployment-region timezone to a naive timestamp.
///
/// The sole deployment region means every timezone-less observation time can
/// be assumed local. This is the only place that assumption is applied.
pub fn assume_deployment_timezone(
    naive: NaiveDateTime,
    deployment_timezone: Tz,
) -> Result<DateTime<Utc>> {
    localize(naive, deployment_timezone)
}

fn resolve_naive(
    naive: NaiveDateTime,
    payload_zone: Option<Tz>,
    deployment_timezone: Tz,
) -> Result<DateTime<Utc>> {
    match payload_zone {
        Some(zone) => localize(naive, zone),
        None => assume_deployment_timezone(naive, deployment_timezone),
    }
}

fn localize(naive: NaiveDateTime, zone: Tz) -> Result<DateTime<Utc>> {
    // earliest() picks the first occurrence for times repeated by a DST
    // transition; times skipped by a transition do not exist in the zone
    zone.from_local_datetime(&naive)
        .earliest()
        .map(|aware| aware.with_timezone(&Utc))
        .ok_or_else(|| Error::ParseDate(format!("{naive} does not exist in {zone}")))
}

fn parse_observed_on_string(raw: &str) -> Option<ParsedTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(aware) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(ParsedTime::Aware(aware.with_timezone(&Utc)));
    }
    if let Ok(aware) = DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S %z") {
        return Some(ParsedTime::Aware(aware.with_timezone(&Utc)));
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(ParsedTime::Naive(naive));
        }
    }
    for format in NAIVE_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(ParsedTime::Naive(date.and_hms_opt(0, 0, 0)?));
        }
    }

    None
}

fn naive_from_details(details: &ObservedOnDetails) -> Result<NaiveDateTime> {
    NaiveDate::from_ymd_opt(details.year, details.month, details.day)
        .and_then(|date| date.and_hms_opt(details.hour, 0, 0))
        .ok_or_else(|| {
            Error::ParseDate(format!(
                "Invalid date components: {}-{}-{} {}h",
                details.year, details.month, details.day, details.hour
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inat::RemoteTaxon;
    use chrono::Timelike;

    fn payload(
        observed_on_string: &str,
        observed_time_zone: Option<&str>,
        observed_on_details: Option<ObservedOnDetails>,
    ) -> RemoteObservation {
        RemoteObservation {
            id: 1,
            taxon: RemoteTaxon {
                id: 119_019,
                name: "Vespa velutina".to_string(),
            },
            community_taxon_id: None,
            observed_on_string: observed_on_string.to_string(),
            observed_time_zone: observed_time_zone.map(str::to_string),
            observed_on_details,
            geojson: None,
            ofvs: Vec::new(),
            photos: Vec::new(),
            description: None,
            project_ids: Vec::new(),
        }
    }

    const BRUSSELS: Tz = chrono_tz::Europe::Brussels;

    #[test]
    fn test_naive_string_uses_payload_timezone() {
        // June: Brussels is UTC+2
        let result = observation_time_from_payload(
            &payload("2021-06-01 10:00", Some("Europe/Brussels"), None),
            BRUSSELS,
        )
        .unwrap();
        assert_eq!(result.to_rfc3339(), "2021-06-01T08:00:00+00:00");
    }

    #[test]
    fn test_winter_offset_differs_from_summer() {
        // January: Brussels is UTC+1
        let result = observation_time_from_payload(
            &payload("2021-01-01 10:00", Some("Europe/Brussels"), None),
            BRUSSELS,
        )
        .unwrap();
        assert_eq!(result.to_rfc3339(), "2021-01-01T09:00:00+00:00");
    }

    #[test]
    fn test_aware_string_keeps_its_offset() {
        let result = observation_time_from_payload(
            &payload("2021-06-01T10:00:00+05:00", None, None),
            BRUSSELS,
        )
        .unwrap();
        assert_eq!(result.to_rfc3339(), "2021-06-01T05:00:00+00:00");
    }

    #[test]
    fn test_missing_zone_assumes_deployment_region() {
        let result =
            observation_time_from_payload(&payload("2021-06-01 10:00", None, None), BRUSSELS)
                .unwrap();
        assert_eq!(result.to_rfc3339(), "2021-06-01T08:00:00+00:00");
    }

    #[test]
    fn test_date_only_string_is_midnight_local() {
        let result =
            observation_time_from_payload(&payload("2021-06-01", None, None), BRUSSELS).unwrap();
        assert_eq!(result.to_rfc3339(), "2021-05-31T22:00:00+00:00");
    }

    #[test]
    fn test_falls_back_to_date_components() {
        let details = ObservedOnDetails {
            year: 2019,
            month: 4,
            day: 20,
            hour: 9,
        };
        let result = observation_time_from_payload(
            &payload("zaterdag middag", Some("Europe/Brussels"), Some(details)),
            BRUSSELS,
        )
        .unwrap();
        // Hour-level precision only
        assert_eq!(result.to_rfc3339(), "2019-04-20T07:00:00+00:00");
        assert_eq!(result.minute(), 0);
    }

    #[test]
    fn test_unparseable_without_details_is_parse_date_error() {
        let error = observation_time_from_payload(
            &payload("niet te ontleden", None, None),
            BRUSSELS,
        )
        .unwrap_err();
        assert!(matches!(error, Error::ParseDate(_)));
    }

    #[test]
    fn test_invalid_date_components_are_parse_date_error() {
        let details = ObservedOnDetails {
            year: 2019,
            month: 2,
            day: 30,
            hour: 9,
        };
        let error =
            observation_time_from_payload(&payload("", None, Some(details)), BRUSSELS)
                .unwrap_err();
        assert!(matches!(error, Error::ParseDate(_)));
    }
}
