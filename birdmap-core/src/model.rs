use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

pub const CHECKLIST_URL_BASE: &str = "https://ebird.org/checklist/";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }
}

/// When a sighting was made. eBird reports either a bare date or a date with
/// a local minute-resolution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ObservedAt {
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
}

impl ObservedAt {
    /// Parse eBird's `obsDt` field: `YYYY-MM-DD` or `YYYY-MM-DD HH:MM`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();

        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M") {
            return Some(Self { date: dt.date(), time: Some(dt.time()) });
        }

        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .map(|date| Self { date, time: None })
    }
}

impl fmt::Display for ObservedAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.time {
            Some(time) => write!(f, "{} {}", self.date.format("%Y-%m-%d"), time.format("%H:%M")),
            None => write!(f, "{}", self.date.format("%Y-%m-%d")),
        }
    }
}

/// A single notable sighting. Every record returned by the notable endpoint
/// is notable, so there is no flag for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub species_code: Option<String>,
    pub common_name: String,
    pub scientific_name: Option<String>,
    pub location_id: Option<String>,
    pub location_name: String,
    pub coordinate: Coordinate,
    pub observed_at: ObservedAt,
    pub how_many: Option<u32>,
    pub checklist_id: Option<String>,
}

impl Observation {
    pub fn checklist_url(&self) -> Option<String> {
        self.checklist_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .map(|id| format!("{CHECKLIST_URL_BASE}{id}"))
    }
}

/// Parameters of one "notable observations near a point" request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NotableQuery {
    pub center: Coordinate,
    pub radius_km: u32,
    pub back_days: u32,
    pub max_results: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_date_only() {
        let at = ObservedAt::parse("2024-01-05").expect("date should parse");
        assert_eq!(at.time, None);
        assert_eq!(at.to_string(), "2024-01-05");
    }

    #[test]
    fn parses_date_with_time() {
        let at = ObservedAt::parse("2024-01-05 07:42").expect("datetime should parse");
        assert_eq!(at.date, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert_eq!(at.to_string(), "2024-01-05 07:42");
    }

    #[test]
    fn rejects_garbage_dates() {
        assert!(ObservedAt::parse("yesterday").is_none());
        assert!(ObservedAt::parse("2024-13-40").is_none());
        assert!(ObservedAt::parse("").is_none());
    }

    #[test]
    fn coordinate_bounds() {
        assert!(Coordinate::new(42.36, -71.06).is_valid());
        assert!(Coordinate::new(-90.0, 180.0).is_valid());
        assert!(!Coordinate::new(90.5, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, -180.1).is_valid());
        assert!(!Coordinate::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn checklist_url_only_when_id_present() {
        let mut obs = Observation {
            species_code: None,
            common_name: "Snowy Owl".into(),
            scientific_name: None,
            location_id: None,
            location_name: "Logan Airport".into(),
            coordinate: Coordinate::new(42.36, -71.06),
            observed_at: ObservedAt::parse("2024-01-05").unwrap(),
            how_many: Some(1),
            checklist_id: Some("S123".into()),
        };
        assert_eq!(obs.checklist_url().as_deref(), Some("https://ebird.org/checklist/S123"));

        obs.checklist_id = Some(String::new());
        assert_eq!(obs.checklist_url(), None);
    }
}
