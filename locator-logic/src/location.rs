use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Convenience alias for UTC DT
pub type UtcDT = DateTime<Utc>;

/// A "part" of a location
pub type LocationComponent = f64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
/// Some position on the globe, in degrees
pub struct Coordinate {
    /// Latitude, -90 to 90
    pub lat: LocationComponent,
    /// Longitude, -180 to 180
    pub long: LocationComponent,
}

impl Coordinate {
    pub const fn new(lat: LocationComponent, long: LocationComponent) -> Self {
        Self { lat, long }
    }

    /// Whether both parts are finite and within their ranges
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.long.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.long)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.lat, self.long)
    }
}

/// Render a coordinate as `"lat, long"` with six decimal places
pub fn format_coordinate(coordinate: Coordinate) -> String {
    coordinate.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// A single position reading as reported by a [crate::LocationService]
pub struct Fix {
    pub coordinate: Coordinate,
    /// Meters above sea level, if the platform could determine it
    pub altitude: Option<LocationComponent>,
    /// Horizontal accuracy radius in meters
    pub accuracy: Option<LocationComponent>,
    /// Altitude accuracy in meters
    pub vertical_accuracy: Option<LocationComponent>,
    /// Ground speed in meters per second
    pub speed: Option<LocationComponent>,
    /// Bearing in degrees, GPS can't always determine this
    pub heading: Option<LocationComponent>,
    /// When the reading was taken
    pub timestamp: UtcDT,
}

impl Fix {
    pub fn new(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            altitude: None,
            accuracy: None,
            vertical_accuracy: None,
            speed: None,
            heading: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_altitude(mut self, altitude: LocationComponent) -> Self {
        self.altitude = Some(altitude);
        self
    }

    pub fn with_accuracy(mut self, accuracy: LocationComponent) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    pub fn with_vertical_accuracy(mut self, vertical_accuracy: LocationComponent) -> Self {
        self.vertical_accuracy = Some(vertical_accuracy);
        self
    }

    pub fn with_speed(mut self, speed: LocationComponent) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_heading(mut self, heading: LocationComponent) -> Self {
        self.heading = Some(heading);
        self
    }
}
