//! Canonical coordinate type and the boundary adapter for legacy shapes.
//!
//! The planner backend has returned coordinates under several field-name
//! variants over time. Everything that enters the core goes through
//! [`RawCoordinates`] exactly once and comes out as [`Coordinates`].

use serde::{Deserialize, Serialize};

/// Latitude/longitude pair in WGS84 degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Returns `None` for NaN/infinite values or points outside WGS84 bounds.
    pub fn checked(lat: f64, lng: f64) -> Option<Self> {
        let valid = lat.is_finite()
            && lng.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lng);
        valid.then_some(Self { lat, lng })
    }

    /// Coordinates rounded to 4 decimals (~11 m), as fixed-point integers.
    pub fn rounded_e4(&self) -> (i64, i64) {
        (
            (self.lat * 10_000.0).round() as i64,
            (self.lng * 10_000.0).round() as i64,
        )
    }
}

/// Number that some backend versions serialize as a string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LooseNumber {
    Number(f64),
    Text(String),
}

impl LooseNumber {
    fn value(&self) -> Option<f64> {
        match self {
            LooseNumber::Number(n) => Some(*n),
            LooseNumber::Text(s) => s.trim().replace(',', ".").parse().ok(),
        }
    }
}

/// Every coordinate shape the backend has been seen to emit.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawCoordinates {
    /// `{lat, lng}`, `{latitude, longitude}`, `{lat, lon}`
    Flat {
        #[serde(alias = "latitude")]
        lat: LooseNumber,
        #[serde(alias = "longitude", alias = "lon")]
        lng: LooseNumber,
    },
    /// `{coordinates: {...}}`
    Nested { coordinates: Box<RawCoordinates> },
    /// `[lat, lng]`
    Pair([f64; 2]),
}

impl RawCoordinates {
    /// Normalize into the canonical type, rejecting unusable points.
    pub fn normalize(&self) -> Option<Coordinates> {
        match self {
            RawCoordinates::Flat { lat, lng } => Coordinates::checked(lat.value()?, lng.value()?),
            RawCoordinates::Nested { coordinates } => coordinates.normalize(),
            RawCoordinates::Pair([lat, lng]) => Coordinates::checked(*lat, *lng),
        }
    }

    /// Parse any JSON value; anything unrecognized yields `None`.
    pub fn from_value(value: &serde_json::Value) -> Option<Coordinates> {
        serde_json::from_value::<RawCoordinates>(value.clone())
            .ok()
            .and_then(|raw| raw.normalize())
    }
}
