// src/models/ride.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::RideError;
use crate::models::user::Role;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideStatus {
    Requested, // Created by a rider, waiting for a driver
    Accepted,  // A driver took the ride and is heading to pickup
    PickedUp,  // Rider is in the vehicle
    InTransit, // On the way to destination
    Completed, // Dropped off
    Cancelled, // Side exit from any non-terminal state
    #[serde(other)]
    Unknown, // Anything the Ride Service sends that we do not recognize
}

impl RideStatus {
    /// The forward lifecycle, in order.
    pub const LIFECYCLE: [RideStatus; 5] = [
        RideStatus::Requested,
        RideStatus::Accepted,
        RideStatus::PickedUp,
        RideStatus::InTransit,
        RideStatus::Completed,
    ];

    /// Every status a ride can be displayed in.
    pub const ALL: [RideStatus; 6] = [
        RideStatus::Requested,
        RideStatus::Accepted,
        RideStatus::PickedUp,
        RideStatus::InTransit,
        RideStatus::Completed,
        RideStatus::Cancelled,
    ];

    /// Position on the forward lifecycle. `Cancelled` and `Unknown` have none.
    pub fn ordinal(&self) -> Option<usize> {
        Self::LIFECYCLE.iter().position(|s| s == self)
    }

    pub fn next(&self) -> Option<RideStatus> {
        self.ordinal().and_then(|i| Self::LIFECYCLE.get(i + 1).copied())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RideStatus::Completed | RideStatus::Cancelled)
    }

    /// `Requested` through `InTransit`.
    pub fn is_active(&self) -> bool {
        !self.is_terminal() && *self != RideStatus::Unknown
    }

    pub fn is_forward_of(&self, other: RideStatus) -> bool {
        match (self.ordinal(), other.ordinal()) {
            (Some(a), Some(b)) => a > b,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Requested => "REQUESTED",
            RideStatus::Accepted => "ACCEPTED",
            RideStatus::PickedUp => "PICKED_UP",
            RideStatus::InTransit => "IN_TRANSIT",
            RideStatus::Completed => "COMPLETED",
            RideStatus::Cancelled => "CANCELLED",
            RideStatus::Unknown => "UNKNOWN",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RideStatus::Requested => "Requested",
            RideStatus::Accepted => "Accepted",
            RideStatus::PickedUp => "Picked Up",
            RideStatus::InTransit => "In Transit",
            RideStatus::Completed => "Completed",
            RideStatus::Cancelled => "Cancelled",
            RideStatus::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleType {
    Car,
    Bike,
    Bicycle,
}

impl VehicleType {
    pub fn label(&self) -> &'static str {
        match self {
            VehicleType::Car => "Car",
            VehicleType::Bike => "Motorcycle",
            VehicleType::Bicycle => "Bicycle",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancelledBy {
    Rider,
    Driver,
    Admin,
}

impl From<Role> for CancelledBy {
    fn from(role: Role) -> Self {
        match role {
            Role::Rider => CancelledBy::Rider,
            Role::Driver => CancelledBy::Driver,
            Role::Admin | Role::SuperAdmin => CancelledBy::Admin,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GeoLocation {
    #[serde(alias = "lati", alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "long", alias = "lng")]
    pub longitude: f64,
    pub address: String,
}

impl GeoLocation {
    pub fn new(latitude: f64, longitude: f64, address: impl Into<String>) -> Self {
        Self { latitude, longitude, address: address.into() }
    }

    /// Great-circle distance using the haversine formula.
    pub fn distance_km(&self, other: &GeoLocation) -> f64 {
        let earth_radius_km = 6371.0;
        let lat1_rad = self.latitude.to_radians();
        let lat2_rad = other.latitude.to_radians();
        let delta_lat = (other.latitude - self.latitude).to_radians();
        let delta_lon = (other.longitude - self.longitude).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        earth_radius_km * c
    }
}

/// Append-only log of lifecycle timestamps. Each key is written once.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimestampsLog {
    pub requested_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picked_up_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl TimestampsLog {
    pub fn new(requested_at: DateTime<Utc>) -> Self {
        Self {
            requested_at,
            accepted_at: None,
            picked_up_at: None,
            completed_at: None,
            cancelled_at: None,
        }
    }

    /// Stamp the key that belongs to `status`. `InTransit` has no key.
    pub fn record(&mut self, status: RideStatus, at: DateTime<Utc>) -> Result<(), RideError> {
        let slot = match status {
            RideStatus::Accepted => &mut self.accepted_at,
            RideStatus::PickedUp => &mut self.picked_up_at,
            RideStatus::Completed => &mut self.completed_at,
            RideStatus::Cancelled => &mut self.cancelled_at,
            RideStatus::InTransit => return Ok(()),
            RideStatus::Requested | RideStatus::Unknown => {
                return Err(RideError::conflict(format!("{} cannot be stamped", status)));
            }
        };

        if slot.is_some() {
            return Err(RideError::conflict(format!("timestamp for {} is already set", status)));
        }
        *slot = Some(at);
        Ok(())
    }

    /// Lifecycle keys that are set, in lifecycle order. Cancellation is not included.
    pub fn populated(&self) -> Vec<(&'static str, DateTime<Utc>)> {
        let mut keys = vec![("requestedAt", self.requested_at)];
        if let Some(at) = self.accepted_at {
            keys.push(("acceptedAt", at));
        }
        if let Some(at) = self.picked_up_at {
            keys.push(("pickedUpAt", at));
        }
        if let Some(at) = self.completed_at {
            keys.push(("completedAt", at));
        }
        keys
    }

    pub fn is_chronological(&self) -> bool {
        let keys = self.populated();
        let ordered = keys.windows(2).all(|w| w[0].1 < w[1].1);
        let cancel_ok = self
            .cancelled_at
            .map(|c| keys.last().map_or(true, |(_, last)| *last <= c))
            .unwrap_or(true);
        ordered && cancel_ok
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ride {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub rider_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<String>,
    pub pickup_location: GeoLocation,
    pub destination: GeoLocation,
    pub vehicle_type: VehicleType,
    #[serde(rename = "rideStatus", alias = "status")]
    pub status: RideStatus,
    pub timestamps_log: TimestampsLog,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_by: Option<CancelledBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

impl Ride {
    pub fn is_assigned_to(&self, driver_id: &str) -> bool {
        self.driver_id.as_deref() == Some(driver_id)
    }

    pub fn has_feedback(&self) -> bool {
        self.feedback.is_some()
    }

    pub fn distance_km(&self) -> f64 {
        self.pickup_location.distance_km(&self.destination)
    }

    /// Case-insensitive match on rider id, driver id and both addresses.
    pub fn matches_search(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return true;
        }
        [
            Some(self.rider_id.as_str()),
            self.driver_id.as_deref(),
            Some(self.pickup_location.address.as_str()),
            Some(self.destination.address.as_str()),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&term))
    }

    /// Whole minutes from request to completion, once completed.
    pub fn duration_minutes(&self) -> Option<i64> {
        self.timestamps_log
            .completed_at
            .map(|done| (done - self.timestamps_log.requested_at).num_minutes())
    }
}

// Request payloads
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RideRequest {
    pub vehicle_type: VehicleType,
    pub pickup_location: GeoLocation,
    pub destination: GeoLocation,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub ride_status: RideStatus,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub cancel_reason: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FeedbackRequest {
    pub feedback: String,
}

// Pagination
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub page: u32,
    pub limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RideStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_term: Option<String>,
}

impl PageQuery {
    pub fn new(page: u32, limit: u32) -> Self {
        Self { page: page.max(1), limit: limit.max(1), status: None, search_term: None }
    }

    pub fn with_status(mut self, status: RideStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_search(mut self, term: impl Into<String>) -> Self {
        self.search_term = Some(term.into());
        self
    }

    /// Stable string form used in cache keys and query strings.
    pub fn fingerprint(&self) -> String {
        format!(
            "page={}&limit={}&status={}&q={}",
            self.page,
            self.limit,
            self.status.map(|s| s.as_str()).unwrap_or(""),
            self.search_term.as_deref().unwrap_or("")
        )
    }
}

impl Default for PageQuery {
    fn default() -> Self {
        Self::new(1, 10)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub page: u32,
    pub total_page: u32,
    pub total: u64,
}

impl PageMeta {
    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_page
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

impl<T: Clone> Paginated<T> {
    /// Slice `items` into the page `query` asks for.
    pub fn from_items(items: &[T], query: &PageQuery) -> Self {
        let limit = query.limit.max(1) as usize;
        let total = items.len();
        let total_page = total.div_ceil(limit).max(1) as u32;
        let start = (query.page.max(1) as usize - 1) * limit;
        let data = items.iter().skip(start).take(limit).cloned().collect();

        Self {
            data,
            meta: PageMeta { page: query.page.max(1), total_page, total: total as u64 },
        }
    }
}
