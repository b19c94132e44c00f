//! The traffic accident record schema.
//!
//! The schema is closed: every record carries all [`FIELD_NAMES`], and
//! missing values are represented by sentinels (`"UNKNOWN"`, `""`, `0`).

mod row;
mod validate;

pub use row::{join_row, split_row, RowLayout};
pub use validate::{normalize_crash_date, parse_crash_date, DATE_FORMATS, MAX_TEXT_LEN};

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Sentinel for unknown categorical values.
pub const UNKNOWN: &str = "UNKNOWN";

/// Field names in declaration order.
pub const FIELD_NAMES: [&str; 24] = [
    "crash_date",
    "traffic_control_device",
    "weather_condition",
    "lighting_condition",
    "first_crash_type",
    "trafficway_type",
    "alignment",
    "roadway_surface_cond",
    "road_defect",
    "crash_type",
    "intersection_related_i",
    "damage",
    "prim_contributory_cause",
    "num_units",
    "most_severe_injury",
    "injuries_total",
    "injuries_fatal",
    "injuries_incapacitating",
    "injuries_non_incapacitating",
    "injuries_reported_not_evident",
    "injuries_no_indication",
    "crash_hour",
    "crash_day_of_week",
    "crash_month",
];

/// One traffic accident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrafficAccident {
    /// Date of the crash, in one of [`DATE_FORMATS`].
    pub crash_date: String,
    /// Traffic control device present.
    pub traffic_control_device: String,
    /// Weather at the time of the crash.
    pub weather_condition: String,
    /// Lighting condition.
    pub lighting_condition: String,
    /// First collision type.
    pub first_crash_type: String,
    /// Type of trafficway.
    pub trafficway_type: String,
    /// Road alignment.
    pub alignment: String,
    /// Roadway surface condition.
    pub roadway_surface_cond: String,
    /// Road defect.
    pub road_defect: String,
    /// Crash classification. Required.
    pub crash_type: String,
    /// `Y`, `N`, `UNKNOWN` or empty.
    pub intersection_related_i: String,
    /// Damage estimate bracket.
    pub damage: String,
    /// Primary contributory cause.
    pub prim_contributory_cause: String,
    /// Number of units involved.
    pub num_units: u32,
    /// Most severe injury.
    pub most_severe_injury: String,
    /// Total injuries.
    pub injuries_total: u32,
    /// Fatal injuries.
    pub injuries_fatal: u32,
    /// Incapacitating injuries.
    pub injuries_incapacitating: u32,
    /// Non-incapacitating injuries.
    pub injuries_non_incapacitating: u32,
    /// Injuries reported but not evident.
    pub injuries_reported_not_evident: u32,
    /// Injuries with no indication.
    pub injuries_no_indication: u32,
    /// Hour of day, `0..=23`.
    pub crash_hour: u8,
    /// Day of week, `1..=7` with 1 = Monday.
    pub crash_day_of_week: u8,
    /// Month, `1..=12`.
    pub crash_month: u8,
}

impl Default for TrafficAccident {
    fn default() -> Self {
        let unknown = || UNKNOWN.to_string();
        Self {
            crash_date: String::new(),
            traffic_control_device: unknown(),
            weather_condition: unknown(),
            lighting_condition: unknown(),
            first_crash_type: unknown(),
            trafficway_type: unknown(),
            alignment: unknown(),
            roadway_surface_cond: unknown(),
            road_defect: unknown(),
            crash_type: unknown(),
            intersection_related_i: unknown(),
            damage: unknown(),
            prim_contributory_cause: unknown(),
            num_units: 0,
            most_severe_injury: "NONE".to_string(),
            injuries_total: 0,
            injuries_fatal: 0,
            injuries_incapacitating: 0,
            injuries_non_incapacitating: 0,
            injuries_reported_not_evident: 0,
            injuries_no_indication: 0,
            crash_hour: 0,
            crash_day_of_week: 1,
            crash_month: 1,
        }
    }
}

impl TrafficAccident {
    /// Creates a record with the two required fields set and defaults elsewhere.
    #[must_use]
    pub fn new(crash_date: impl Into<String>, crash_type: impl Into<String>) -> Self {
        Self {
            crash_date: crash_date.into(),
            crash_type: crash_type.into(),
            ..Self::default()
        }
    }

    /// Checks the record against the schema rules.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> CoreResult<()> {
        validate::validate(self)
    }

    /// Encodes the canonical payload: compact JSON with sorted keys.
    pub fn to_payload(&self) -> CoreResult<Vec<u8>> {
        let map = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map.into_iter().collect::<BTreeMap<String, Value>>(),
            Ok(_) => return Err(CoreError::invalid("payload", "record is not an object")),
            Err(e) => return Err(CoreError::invalid("payload", e.to_string())),
        };
        serde_json::to_vec(&map).map_err(|e| CoreError::invalid("payload", e.to_string()))
    }

    /// Decodes a payload read from the data file at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CorruptRecord`] if the bytes are not a complete
    /// record object.
    pub fn from_payload(payload: &[u8], offset: u64) -> CoreResult<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| CoreError::corrupt_record(offset, format!("undecodable payload: {e}")))
    }

    /// Returns the value of `field` rendered as text, or `None` for an
    /// unknown field name.
    #[must_use]
    pub fn field_text(&self, field: &str) -> Option<String> {
        let text = match field {
            "crash_date" => self.crash_date.clone(),
            "traffic_control_device" => self.traffic_control_device.clone(),
            "weather_condition" => self.weather_condition.clone(),
            "lighting_condition" => self.lighting_condition.clone(),
            "first_crash_type" => self.first_crash_type.clone(),
            "trafficway_type" => self.trafficway_type.clone(),
            "alignment" => self.alignment.clone(),
            "roadway_surface_cond" => self.roadway_surface_cond.clone(),
            "road_defect" => self.road_defect.clone(),
            "crash_type" => self.crash_type.clone(),
            "intersection_related_i" => self.intersection_related_i.clone(),
            "damage" => self.damage.clone(),
            "prim_contributory_cause" => self.prim_contributory_cause.clone(),
            "num_units" => self.num_units.to_string(),
            "most_severe_injury" => self.most_severe_injury.clone(),
            "injuries_total" => self.injuries_total.to_string(),
            "injuries_fatal" => self.injuries_fatal.to_string(),
            "injuries_incapacitating" => self.injuries_incapacitating.to_string(),
            "injuries_non_incapacitating" => self.injuries_non_incapacitating.to_string(),
            "injuries_reported_not_evident" => self.injuries_reported_not_evident.to_string(),
            "injuries_no_indication" => self.injuries_no_indication.to_string(),
            "crash_hour" => self.crash_hour.to_string(),
            "crash_day_of_week" => self.crash_day_of_week.to_string(),
            "crash_month" => self.crash_month.to_string(),
            _ => return None,
        };
        Some(text)
    }

    /// All field values as text, in [`FIELD_NAMES`] order.
    #[must_use]
    pub fn to_cells(&self) -> Vec<String> {
        FIELD_NAMES
            .iter()
            .map(|name| self.field_text(name).unwrap_or_default())
            .collect()
    }

    /// Sum of the specific injury counters.
    #[must_use]
    pub fn injuries_breakdown_sum(&self) -> u64 {
        [
            self.injuries_fatal,
            self.injuries_incapacitating,
            self.injuries_non_incapacitating,
            self.injuries_reported_not_evident,
            self.injuries_no_indication,
        ]
        .iter()
        .map(|&n| u64::from(n))
        .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TrafficAccident {
        TrafficAccident {
            weather_condition: "RAIN".into(),
            num_units: 2,
            injuries_total: 1,
            injuries_non_incapacitating: 1,
            crash_hour: 17,
            crash_day_of_week: 5,
            crash_month: 7,
            ..TrafficAccident::new("2023-07-14", "INJURY AND / OR TOW DUE TO CRASH")
        }
    }

    #[test]
    fn defaults_use_sentinels() {
        let record = TrafficAccident::default();
        assert_eq!(record.weather_condition, UNKNOWN);
        assert_eq!(record.most_severe_injury, "NONE");
        assert_eq!(record.crash_date, "");
        assert_eq!(record.crash_day_of_week, 1);
        assert_eq!(record.crash_month, 1);
    }

    #[test]
    fn payload_keys_are_sorted_and_compact() {
        let payload = sample().to_payload().unwrap();
        let text = String::from_utf8(payload).unwrap();
        assert!(text.starts_with("{\"alignment\":\"UNKNOWN\",\"crash_date\":\"2023-07-14\""));
        assert!(!text.contains("\": "));
        assert!(!text.contains('\n'));
    }

    #[test]
    fn payload_is_deterministic() {
        assert_eq!(sample().to_payload().unwrap(), sample().to_payload().unwrap());
    }

    #[test]
    fn payload_decodes_to_equal_record() {
        let record = sample();
        let payload = record.to_payload().unwrap();
        assert_eq!(TrafficAccident::from_payload(&payload, 0).unwrap(), record);
    }

    #[test]
    fn incomplete_payload_is_corrupt_record() {
        let err = TrafficAccident::from_payload(br#"{"crash_date":"2023-01-01"}"#, 99).unwrap_err();
        assert_eq!(err.offset(), Some(99));
    }

    #[test]
    fn cells_follow_field_order() {
        let cells = sample().to_cells();
        assert_eq!(cells.len(), FIELD_NAMES.len());
        assert_eq!(cells[0], "2023-07-14");
        assert_eq!(cells[13], "2");
        assert_eq!(cells[21], "17");
        assert!(sample().field_text("colour").is_none());
    }
}
