//! Presentation adapters.
//!
//! Each view is a pure function of the rides it shows and who is looking.
//! Offered actions always come from [`policy::legal_actions`], so a view can
//! never enable something the policy does not allow.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::ride::{CancelledBy, PageMeta, Paginated, Ride, RideStatus, VehicleType};
use crate::models::user::Actor;
use crate::policy::{self, RideAction};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionControl {
    pub action: RideAction,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RideView {
    pub ride_id: String,
    pub displayed_status: RideStatus,
    pub status_label: &'static str,
    pub enabled_actions: Vec<ActionControl>,
}

impl RideView {
    pub fn offers(&self, action: RideAction) -> bool {
        self.enabled_actions.iter().any(|c| c.action == action)
    }
}

/// `(ride, viewer) -> { displayedStatus, enabledActions }`.
pub fn present(ride: &Ride, viewer: &Actor) -> RideView {
    let enabled_actions = if ride.timestamps_log.is_chronological() {
        policy::legal_actions(ride, viewer)
            .into_iter()
            .map(|action| ActionControl { action, label: action.label() })
            .collect()
    } else {
        tracing::warn!("Ride {} has an out-of-order timestamp log; offering no actions", ride.id);
        Vec::new()
    };

    RideView {
        ride_id: ride.id.clone(),
        displayed_status: ride.status,
        status_label: ride.status.label(),
        enabled_actions,
    }
}

/// Last six characters of an identifier.
pub fn short_id(id: &str) -> String {
    let chars: Vec<char> = id.chars().collect();
    chars[chars.len().saturating_sub(6)..].iter().collect()
}

// Rider history

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiderHistoryRow {
    pub view: RideView,
    pub requested_at: DateTime<Utc>,
    pub pickup_address: String,
    pub destination_address: String,
    pub vehicle_label: &'static str,
    pub can_cancel: bool,
    pub can_give_feedback: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiderHistoryPage {
    pub rows: Vec<RiderHistoryRow>,
    pub meta: PageMeta,
    pub has_previous: bool,
    pub has_next: bool,
}

pub fn rider_history(page: &Paginated<Ride>, rider: &Actor) -> RiderHistoryPage {
    let rows = page
        .data
        .iter()
        .map(|ride| {
            let view = present(ride, rider);
            RiderHistoryRow {
                can_cancel: view.offers(RideAction::Cancel),
                can_give_feedback: view.offers(RideAction::AttachFeedback),
                view,
                requested_at: ride.timestamps_log.requested_at,
                pickup_address: ride.pickup_location.address.clone(),
                destination_address: ride.destination.address.clone(),
                vehicle_label: ride.vehicle_type.label(),
            }
        })
        .collect();

    RiderHistoryPage {
        rows,
        meta: page.meta,
        has_previous: page.meta.has_previous(),
        has_next: page.meta.has_next(),
    }
}

// Driver pick list

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PickListRow {
    pub view: RideView,
    pub short_rider_id: String,
    pub pickup_address: String,
    pub destination_address: String,
    pub distance_km: f64,
}

/// Requested, unassigned rides for `vehicle_type`. Only Accept is offered.
pub fn driver_pick_list(rides: &[Ride], driver: &Actor, vehicle_type: Option<VehicleType>) -> Vec<PickListRow> {
    rides
        .iter()
        .filter(|r| r.status == RideStatus::Requested && r.driver_id.is_none())
        .filter(|r| vehicle_type.is_none_or(|v| r.vehicle_type == v))
        .map(|ride| PickListRow {
            view: present(ride, driver),
            short_rider_id: short_id(&ride.rider_id),
            pickup_address: ride.pickup_location.address.clone(),
            destination_address: ride.destination.address.clone(),
            distance_km: ride.distance_km(),
        })
        .collect()
}

// Admin moderation table

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminFilter {
    pub search_term: Option<String>,
    pub status: Option<RideStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusOption {
    pub status: RideStatus,
    pub label: &'static str,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminRow {
    pub view: RideView,
    pub short_ride_id: String,
    pub short_rider_id: String,
    pub short_driver_id: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub duration_minutes: Option<i64>,
    pub status_options: Vec<StatusOption>,
}

/// Status selector entries. The current status is listed but never enabled.
pub fn status_options(view: &RideView) -> Vec<StatusOption> {
    RideStatus::ALL
        .iter()
        .map(|status| StatusOption {
            status: *status,
            label: status.label(),
            enabled: view
                .enabled_actions
                .iter()
                .any(|c| c.action.target(view.displayed_status) == *status && *status != view.displayed_status),
        })
        .collect()
}

pub fn admin_table(rides: &[Ride], admin: &Actor, filter: &AdminFilter) -> Vec<AdminRow> {
    rides
        .iter()
        .filter(|r| filter.status.is_none_or(|s| r.status == s))
        .filter(|r| filter.search_term.as_deref().is_none_or(|term| r.matches_search(term)))
        .map(|ride| {
            let view = present(ride, admin);
            AdminRow {
                status_options: status_options(&view),
                view,
                short_ride_id: short_id(&ride.id),
                short_rider_id: short_id(&ride.rider_id),
                short_driver_id: ride.driver_id.as_deref().map(short_id),
                requested_at: ride.timestamps_log.requested_at,
                duration_minutes: ride.duration_minutes(),
            }
        })
        .collect()
}

// Ride detail

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RideDetailView {
    pub view: RideView,
    pub distance_km: f64,
    pub timeline: Vec<(&'static str, DateTime<Utc>)>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub cancelled_by: Option<CancelledBy>,
    pub feedback: Option<String>,
}

pub fn ride_detail(ride: &Ride, viewer: &Actor) -> RideDetailView {
    RideDetailView {
        view: present(ride, viewer),
        distance_km: ride.distance_km(),
        timeline: ride.timestamps_log.populated(),
        cancelled_at: ride.timestamps_log.cancelled_at,
        cancel_reason: ride.cancel_reason.clone(),
        cancelled_by: ride.cancelled_by,
        feedback: ride.feedback.clone(),
    }
}
