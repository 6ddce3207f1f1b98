// src/validation.rs
// Local checks run before any payload leaves the client.
use crate::errors::{RideError, RideResult, ValidationError};
use crate::models::driver::DriverApplication;
use crate::models::ride::{GeoLocation, RideRequest};

pub const CANCEL_REASON_MIN: usize = 2;
pub const CANCEL_REASON_MAX: usize = 100;
pub const FEEDBACK_MAX: usize = 500;

fn push(errors: &mut Vec<ValidationError>, field: &str, message: impl Into<String>) {
    errors.push(ValidationError { field: field.to_string(), message: message.into() });
}

fn finish(errors: Vec<ValidationError>) -> RideResult<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(RideError::ValidationFailed(errors))
    }
}

fn check_location(errors: &mut Vec<ValidationError>, field: &str, location: &GeoLocation, label: &str) {
    if !location.latitude.is_finite() || !(-90.0..=90.0).contains(&location.latitude) {
        push(errors, &format!("{}.latitude", field), "Latitude must be between -90 and 90");
    }
    if !location.longitude.is_finite() || !(-180.0..=180.0).contains(&location.longitude) {
        push(errors, &format!("{}.longitude", field), "Longitude must be between -180 and 180");
    }
    if location.address.trim().is_empty() {
        push(errors, &format!("{}.address", field), format!("{} address required", label));
    }
}

pub fn validate_ride_request(request: &RideRequest) -> RideResult<()> {
    let mut errors = Vec::new();
    check_location(&mut errors, "pickupLocation", &request.pickup_location, "Pickup");
    check_location(&mut errors, "destination", &request.destination, "Destination");

    let same_point = request.pickup_location.latitude == request.destination.latitude
        && request.pickup_location.longitude == request.destination.longitude;
    if errors.is_empty() && same_point {
        push(&mut errors, "destination", "Destination must differ from pickup");
    }

    finish(errors)
}

pub fn validate_cancel_reason(reason: &str) -> RideResult<()> {
    let len = reason.trim().chars().count();
    let mut errors = Vec::new();
    if len < CANCEL_REASON_MIN {
        push(&mut errors, "cancelReason", "Reason is too short");
    } else if len > CANCEL_REASON_MAX {
        push(&mut errors, "cancelReason", "Reason is too long");
    }
    finish(errors)
}

pub fn validate_feedback(feedback: &str) -> RideResult<()> {
    let len = feedback.trim().chars().count();
    let mut errors = Vec::new();
    if len == 0 {
        push(&mut errors, "feedback", "Feedback is required");
    } else if len > FEEDBACK_MAX {
        push(&mut errors, "feedback", "Feedback is too long");
    }
    finish(errors)
}

pub fn validate_driver_application(application: &DriverApplication) -> RideResult<()> {
    let mut errors = Vec::new();

    let nid = application.nid_number.trim().chars().count();
    if nid < 10 {
        push(&mut errors, "NIDNumber", "NID must be at least 10 digits");
    } else if nid > 15 {
        push(&mut errors, "NIDNumber", "NID must not exceed 15 digits");
    }
    if application.license_number.trim().chars().count() < 3 {
        push(&mut errors, "licenseNumber", "License number must be at least 3 characters");
    }

    let vehicle = &application.vehicle_info;
    if vehicle.model.trim().chars().count() < 2 {
        push(&mut errors, "vehicleInfo.model", "Vehicle model must be at least 2 characters");
    }
    if vehicle.plate_number.trim().chars().count() < 3 {
        push(&mut errors, "vehicleInfo.plateNumber", "Plate number must be at least 3 characters");
    }
    if let Some(seats) = vehicle.seats.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        match seats.parse::<u8>() {
            Ok(n) if (1..=20).contains(&n) => {}
            _ => push(&mut errors, "vehicleInfo.seats", "Seats must be a number between 1 and 20"),
        }
    }

    finish(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::driver::VehicleInfo;
    use crate::models::ride::VehicleType;

    fn request() -> RideRequest {
        RideRequest {
            vehicle_type: VehicleType::Bike,
            pickup_location: GeoLocation::new(5.6037, -0.1870, "Accra Mall"),
            destination: GeoLocation::new(5.5560, -0.1969, "Independence Square"),
        }
    }

    fn fields(result: RideResult<()>) -> Vec<String> {
        match result {
            Err(RideError::ValidationFailed(errors)) => errors.into_iter().map(|e| e.field).collect(),
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_ride_request() {
        assert!(validate_ride_request(&request()).is_ok());
    }

    #[test]
    fn test_ride_request_ranges() {
        let mut bad = request();
        bad.pickup_location.latitude = 91.0;
        bad.destination.longitude = f64::NAN;
        bad.destination.address = "   ".to_string();
        assert_eq!(
            fields(validate_ride_request(&bad)),
            vec!["pickupLocation.latitude", "destination.longitude", "destination.address"]
        );
    }

    #[test]
    fn test_ride_request_same_point() {
        let mut bad = request();
        bad.destination = bad.pickup_location.clone();
        assert_eq!(fields(validate_ride_request(&bad)), vec!["destination"]);
    }

    #[test]
    fn test_cancel_reason_bounds() {
        assert!(validate_cancel_reason("change of plans").is_ok());
        assert!(validate_cancel_reason(" a ").is_err());
        assert!(validate_cancel_reason(&"x".repeat(101)).is_err());
        assert!(validate_cancel_reason(&"x".repeat(100)).is_ok());
    }

    #[test]
    fn test_feedback_bounds() {
        assert!(validate_feedback("Great driver").is_ok());
        assert!(validate_feedback("  ").is_err());
        assert!(validate_feedback(&"y".repeat(501)).is_err());
    }

    #[test]
    fn test_driver_application() {
        let mut app = DriverApplication {
            nid_number: "1990123456".to_string(),
            license_number: "DL-42".to_string(),
            vehicle_info: VehicleInfo {
                vehicle_type: VehicleType::Car,
                model: "Corolla".to_string(),
                plate_number: "GR-1234-20".to_string(),
                color: Some("Silver".to_string()),
                seats: Some("4".to_string()),
            },
        };
        assert!(validate_driver_application(&app).is_ok());

        app.nid_number = "123".to_string();
        app.vehicle_info.seats = Some("forty".to_string());
        assert_eq!(fields(validate_driver_application(&app)), vec!["NIDNumber", "vehicleInfo.seats"]);
    }
}
