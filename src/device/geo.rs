use derive_more::Display;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

/// Mean earth radius used by the haversine formula, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Display, ToSchema)]
#[display(fmt = "{:.6}, {:.6}", latitude, longitude)]
pub struct Coordinate {
    #[schema(example = json!(-6.2077))]
    pub latitude: f64,
    #[schema(example = 105.9729)]
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if !(-90.0..=90.0).contains(&self.latitude) || !self.latitude.is_finite() {
            return Err(AppError::invalid("latitude", "Latitude must be within -90..90"));
        }
        if !(-180.0..=180.0).contains(&self.longitude) || !self.longitude.is_finite() {
            return Err(AppError::invalid(
                "longitude",
                "Longitude must be within -180..180",
            ));
        }
        Ok(())
    }

    /// Great-circle distance in meters.
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        let phi1 = self.latitude.to_radians();
        let phi2 = other.latitude.to_radians();
        let d_phi = (other.latitude - self.latitude).to_radians();
        let d_lambda = (other.longitude - self.longitude).to_radians();

        let a = (d_phi / 2.0).sin().powi(2)
            + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_M * c
    }
}

/// Reference point plus the maximum accepted distance for clock events.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geofence {
    pub reference: Coordinate,
    pub radius_m: f64,
}

impl Geofence {
    pub fn new(reference: Coordinate, radius_m: f64) -> Self {
        Self {
            reference,
            radius_m,
        }
    }

    pub fn distance(&self, point: &Coordinate) -> f64 {
        point.distance_to(&self.reference)
    }

    /// Boundary is inclusive.
    pub fn contains_distance(&self, distance_m: f64) -> bool {
        distance_m <= self.radius_m
    }

    pub fn out_of_range_message(&self, distance_m: f64) -> String {
        format!(
            "You are outside the school radius ({}m). Maximum radius: {}m.",
            distance_m.round(),
            self.radius_m.round()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LocationFailure {
    PermissionDenied,
    Timeout,
    Unsupported,
}

impl LocationFailure {
    fn describe(&self) -> &'static str {
        match self {
            LocationFailure::PermissionDenied => "location permission denied",
            LocationFailure::Timeout => "timed out waiting for a GPS fix",
            LocationFailure::Unsupported => "device has no geolocation support",
        }
    }
}

/// What the client's geolocation API produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocationReport {
    Fix(Coordinate),
    Failure { error: LocationFailure },
}

/// Source of a single position fix.
#[allow(async_fn_in_trait)]
pub trait GeoLocator {
    async fn acquire(&self) -> AppResult<Coordinate>;
}

/// Locator resolved from a position the client already measured.
pub struct ReportedLocator(pub LocationReport);

impl GeoLocator for ReportedLocator {
    async fn acquire(&self) -> AppResult<Coordinate> {
        match self.0 {
            LocationReport::Fix(coordinate) => {
                coordinate.validate()?;
                Ok(coordinate)
            }
            LocationReport::Failure { error } => {
                Err(AppError::LocationUnavailable(error.describe().to_string()))
            }
        }
    }
}
