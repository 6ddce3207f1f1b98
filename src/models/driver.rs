// src/models/driver.rs
use serde::{Deserialize, Serialize};

use crate::models::ride::VehicleType;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriverApprovalStatus {
    Pending,  // Application submitted, not yet reviewed
    Approved, // May accept rides
}

impl DriverApprovalStatus {
    /// Status an admin's approve/revoke toggle moves to.
    pub fn toggled(&self) -> DriverApprovalStatus {
        match self {
            DriverApprovalStatus::Approved => DriverApprovalStatus::Pending,
            DriverApprovalStatus::Pending => DriverApprovalStatus::Approved,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VehicleInfo {
    #[serde(rename = "type", alias = "vehicleType")]
    pub vehicle_type: VehicleType,
    #[serde(alias = "vehicleModel")]
    pub model: String,
    #[serde(alias = "vehicleNumberPlate")]
    pub plate_number: String,
    #[serde(default, alias = "vehicleColor", skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seats: Option<String>,
}

/// Vehicle onboarding form a user submits to become a driver. The same
/// shape updates an existing profile.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriverApplication {
    #[serde(rename = "NIDNumber")]
    pub nid_number: String,
    pub license_number: String,
    pub vehicle_info: VehicleInfo,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriverProfile {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub user_id: String,
    pub license_number: String,
    pub vehicle_info: VehicleInfo,
    pub driver_status: DriverApprovalStatus,
}

impl DriverProfile {
    pub fn vehicle_type(&self) -> VehicleType {
        self.vehicle_info.vehicle_type
    }

    pub fn is_approved(&self) -> bool {
        self.driver_status == DriverApprovalStatus::Approved
    }
}

/// Body of an admin approval change.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DriverStatusUpdate {
    pub driver_status: DriverApprovalStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_wire_names() {
        let json = r#"{
            "NIDNumber": "1234567890",
            "licenseNumber": "DL-42",
            "vehicleInfo": {"type": "CAR", "model": "Corolla", "plateNumber": "GR-1234-20"}
        }"#;
        let app: DriverApplication = serde_json::from_str(json).unwrap();
        assert_eq!(app.nid_number, "1234567890");
        assert_eq!(app.vehicle_info.vehicle_type, VehicleType::Car);
        assert_eq!(app.vehicle_info.color, None);
    }

    #[test]
    fn test_profile_accepts_server_vehicle_names() {
        let json = r#"{
            "_id": "drv-251018-a1b2c",
            "userId": "user-1",
            "licenseNumber": "DL-42",
            "vehicleInfo": {"vehicleType": "BIKE", "vehicleModel": "Boxer", "vehicleNumberPlate": "M-77"},
            "driverStatus": "PENDING"
        }"#;
        let profile: DriverProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.vehicle_type(), VehicleType::Bike);
        assert_eq!(profile.vehicle_info.plate_number, "M-77");
        assert!(!profile.is_approved());
    }

    #[test]
    fn test_approval_toggle() {
        assert_eq!(DriverApprovalStatus::Pending.toggled(), DriverApprovalStatus::Approved);
        assert_eq!(DriverApprovalStatus::Approved.toggled(), DriverApprovalStatus::Pending);
    }
}
