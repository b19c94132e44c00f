use super::TrafficAccident;
use crate::error::{CoreError, CoreResult};
use chrono::{NaiveDate, NaiveDateTime};
use tracing::warn;

/// Accepted `crash_date` formats, tried in order.
pub const DATE_FORMATS: [&str; 9] = [
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%d-%m-%Y",
    "%Y/%m/%d",
    "%m/%d/%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
    "%Y-%m-%d %I:%M:%S %p",
];

/// Maximum length of a text field, in characters.
pub const MAX_TEXT_LEN: usize = 255;

/// Parses a crash date in any of the accepted formats.
#[must_use]
pub fn parse_crash_date(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATE_FORMATS.iter().find_map(|format| {
        if format.contains("%H") || format.contains("%I") {
            NaiveDateTime::parse_from_str(text, format).ok()
        } else {
            NaiveDate::parse_from_str(text, format)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        }
    })
}

/// Rewrites an accepted crash date as `%Y-%m-%d`.
#[must_use]
pub fn normalize_crash_date(text: &str) -> Option<String> {
    parse_crash_date(text).map(|dt| dt.format("%Y-%m-%d").to_string())
}

pub(super) fn validate(record: &TrafficAccident) -> CoreResult<()> {
    if record.crash_date.trim().is_empty() {
        return Err(CoreError::invalid("crash_date", "required"));
    }
    if parse_crash_date(&record.crash_date).is_none() {
        return Err(CoreError::invalid(
            "crash_date",
            format!("unrecognised date {:?}", record.crash_date),
        ));
    }

    let texts: [(&str, &str); 14] = [
        ("crash_date", &record.crash_date),
        ("traffic_control_device", &record.traffic_control_device),
        ("weather_condition", &record.weather_condition),
        ("lighting_condition", &record.lighting_condition),
        ("first_crash_type", &record.first_crash_type),
        ("trafficway_type", &record.trafficway_type),
        ("alignment", &record.alignment),
        ("roadway_surface_cond", &record.roadway_surface_cond),
        ("road_defect", &record.road_defect),
        ("crash_type", &record.crash_type),
        ("intersection_related_i", &record.intersection_related_i),
        ("damage", &record.damage),
        ("prim_contributory_cause", &record.prim_contributory_cause),
        ("most_severe_injury", &record.most_severe_injury),
    ];
    for (field, value) in texts {
        check_text(field, value)?;
    }

    if record.crash_type.trim().is_empty() {
        return Err(CoreError::invalid("crash_type", "required"));
    }

    match record.intersection_related_i.to_ascii_uppercase().as_str() {
        "Y" | "N" | "UNKNOWN" | "" => {}
        other => {
            return Err(CoreError::invalid(
                "intersection_related_i",
                format!("expected Y, N or UNKNOWN, got {other:?}"),
            ))
        }
    }

    check_range("crash_hour", record.crash_hour, 0, 23)?;
    check_range("crash_day_of_week", record.crash_day_of_week, 1, 7)?;
    check_range("crash_month", record.crash_month, 1, 12)?;

    let breakdown = record.injuries_breakdown_sum();
    if u64::from(record.injuries_total) < breakdown {
        warn!(
            injuries_total = record.injuries_total,
            breakdown, "injuries_total is below the sum of its parts"
        );
    }
    Ok(())
}

fn check_text(field: &str, value: &str) -> CoreResult<()> {
    if value.chars().count() > MAX_TEXT_LEN {
        return Err(CoreError::invalid(
            field,
            format!("longer than {MAX_TEXT_LEN} characters"),
        ));
    }
    if value.chars().any(char::is_control) {
        return Err(CoreError::invalid(field, "contains control characters"));
    }
    Ok(())
}

fn check_range(field: &str, value: u8, min: u8, max: u8) -> CoreResult<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(CoreError::invalid(
            field,
            format!("{value} outside {min}..={max}"),
        ))
    }
}
