// src/services/ride_service.rs
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use crate::{
    errors::{RideError, RideResult},
    models::{
        driver::{DriverApplication, DriverApprovalStatus, DriverProfile, VehicleInfo},
        ride::{CancelledBy, PageQuery, Paginated, Ride, RideRequest, RideStatus, TimestampsLog, VehicleType},
        user::{AccountStatus, Actor, Role, UserAccount},
    },
    policy::{self, RideAction},
    services::account_service::AccountOperations,
    utils::id_generator::{IdGenerator, IdType},
    validation,
};

/// The remote Ride Service. It is the authority on ride state; every
/// method returns the ride as the service stored it.
#[async_trait]
pub trait RideOperations: Send + Sync {
    async fn request_ride(&self, rider: &Actor, request: RideRequest) -> RideResult<Ride>;
    async fn available_rides(&self, driver: &Actor) -> RideResult<Vec<Ride>>;
    async fn accept_ride(&self, driver: &Actor, ride_id: &str) -> RideResult<Ride>;
    async fn update_ride_status(&self, actor: &Actor, ride_id: &str, status: RideStatus) -> RideResult<Ride>;
    async fn cancel_ride(&self, actor: &Actor, ride_id: &str, cancel_reason: &str) -> RideResult<Ride>;
    async fn attach_feedback(&self, rider: &Actor, ride_id: &str, feedback: &str) -> RideResult<Ride>;
    async fn ride_history(&self, rider: &Actor, query: &PageQuery) -> RideResult<Paginated<Ride>>;
    async fn get_ride(&self, actor: &Actor, ride_id: &str) -> RideResult<Ride>;
    async fn admin_rides(&self, admin: &Actor, query: &PageQuery) -> RideResult<Paginated<Ride>>;
}

/// In-process Ride Service for development and testing.
///
/// Mutations run under one write lock, so two actors racing on the same
/// ride are serialized and the loser sees the winner's state.
pub struct InMemoryRideService {
    rides: RwLock<Vec<Ride>>,
    drivers: RwLock<HashMap<String, DriverProfile>>,
    blocked: RwLock<HashSet<String>>,
    clock: std::sync::Mutex<DateTime<Utc>>,
}

impl Default for InMemoryRideService {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRideService {
    pub fn new() -> Self {
        Self {
            rides: RwLock::new(Vec::new()),
            drivers: RwLock::new(HashMap::new()),
            blocked: RwLock::new(HashSet::new()),
            clock: std::sync::Mutex::new(DateTime::<Utc>::MIN_UTC),
        }
    }

    /// Shortcut for an approved driver of `vehicle_type`.
    pub async fn register_driver(&self, user_id: &str, vehicle_type: VehicleType) -> DriverProfile {
        let profile = DriverProfile {
            id: IdGenerator::generate(IdType::Driver),
            user_id: user_id.to_string(),
            license_number: format!("DL-{}", user_id),
            vehicle_info: VehicleInfo {
                vehicle_type,
                model: vehicle_type.label().to_string(),
                plate_number: format!("GR-{}", user_id),
                color: None,
                seats: None,
            },
            driver_status: DriverApprovalStatus::Approved,
        };
        tracing::info!("Registering driver {} with {:?}", user_id, vehicle_type);
        self.drivers.write().await.insert(user_id.to_string(), profile.clone());
        profile
    }

    async fn ensure_active(&self, actor: &Actor) -> RideResult<()> {
        if self.blocked.read().await.contains(&actor.id) {
            return Err(RideError::forbidden("Your account is blocked"));
        }
        Ok(())
    }

    /// Strictly increasing wall clock, so lifecycle stamps never tie.
    fn now(&self) -> DateTime<Utc> {
        let mut last = match self.clock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut now = Utc::now();
        if now <= *last {
            now = *last + Duration::microseconds(1);
        }
        *last = now;
        now
    }

    async fn driver_vehicle(&self, driver: &Actor) -> RideResult<VehicleType> {
        if driver.role != Role::Driver {
            return Err(RideError::forbidden("Only drivers can do this"));
        }
        self.ensure_active(driver).await?;

        let drivers = self.drivers.read().await;
        let profile = drivers
            .get(&driver.id)
            .ok_or_else(|| RideError::forbidden(format!("No driver profile for {}", driver.id)))?;
        if !profile.is_approved() {
            return Err(RideError::forbidden("Your driver profile is awaiting approval"));
        }
        Ok(profile.vehicle_type())
    }

    /// Run `apply` against the stored ride under the write lock.
    async fn mutate<F>(&self, ride_id: &str, apply: F) -> RideResult<Ride>
    where
        F: FnOnce(&mut Ride, DateTime<Utc>) -> RideResult<()> + Send,
    {
        let mut rides = self.rides.write().await;
        let ride = rides
            .iter_mut()
            .find(|r| r.id == ride_id)
            .ok_or_else(|| RideError::ride_not_found(ride_id))?;

        // work on a copy so a failed step leaves the stored ride untouched
        let mut updated = ride.clone();
        apply(&mut updated, self.now())?;
        *ride = updated.clone();
        Ok(updated)
    }

    fn newest_first(rides: impl Iterator<Item = Ride>) -> Vec<Ride> {
        let mut rides: Vec<Ride> = rides.collect();
        rides.reverse();
        rides
    }
}

#[async_trait]
impl RideOperations for InMemoryRideService {
    async fn request_ride(&self, rider: &Actor, request: RideRequest) -> RideResult<Ride> {
        if !policy::can_request_ride(rider.role) {
            return Err(RideError::forbidden("Only riders can request a ride"));
        }
        validation::validate_ride_request(&request)?;
        self.ensure_active(rider).await?;

        let mut rides = self.rides.write().await;
        if rides.iter().any(|r| r.rider_id == rider.id && r.status.is_active()) {
            return Err(RideError::conflict("You already have an active ride"));
        }

        let ride = Ride {
            id: IdGenerator::generate(IdType::Ride),
            rider_id: rider.id.clone(),
            driver_id: None,
            pickup_location: request.pickup_location,
            destination: request.destination,
            vehicle_type: request.vehicle_type,
            status: RideStatus::Requested,
            timestamps_log: TimestampsLog::new(self.now()),
            cancel_reason: None,
            cancelled_by: None,
            feedback: None,
        };
        rides.push(ride.clone());

        tracing::info!("Ride {} requested by {}", ride.id, rider.id);
        Ok(ride)
    }

    async fn available_rides(&self, driver: &Actor) -> RideResult<Vec<Ride>> {
        let vehicle = self.driver_vehicle(driver).await?;
        let rides = self.rides.read().await;

        Ok(rides
            .iter()
            .filter(|r| r.status == RideStatus::Requested && r.driver_id.is_none() && r.vehicle_type == vehicle)
            .cloned()
            .collect())
    }

    async fn accept_ride(&self, driver: &Actor, ride_id: &str) -> RideResult<Ride> {
        let vehicle = self.driver_vehicle(driver).await?;

        let ride = self
            .mutate(ride_id, |ride, now| {
                if ride.vehicle_type != vehicle {
                    return Err(RideError::forbidden("Ride needs a different vehicle type"));
                }
                let to = policy::authorize(ride, driver, RideAction::Accept)?;
                ride.driver_id = Some(driver.id.clone());
                ride.status = to;
                ride.timestamps_log.record(to, now)
            })
            .await?;

        tracing::info!("Driver {} accepted ride {}", driver.id, ride_id);
        Ok(ride)
    }

    async fn update_ride_status(&self, actor: &Actor, ride_id: &str, status: RideStatus) -> RideResult<Ride> {
        if status == RideStatus::Cancelled {
            return Err(RideError::bad_request("Use the cancel endpoint to cancel a ride"));
        }
        let action = if actor.role.is_admin() {
            RideAction::Override(status)
        } else {
            RideAction::Advance(status)
        };

        let ride = self
            .mutate(ride_id, |ride, now| {
                let to = policy::authorize(ride, actor, action)?;
                ride.status = to;
                ride.timestamps_log.record(to, now)
            })
            .await?;

        tracing::info!("Ride {} moved to {} by {}", ride_id, status, actor.id);
        Ok(ride)
    }

    async fn cancel_ride(&self, actor: &Actor, ride_id: &str, cancel_reason: &str) -> RideResult<Ride> {
        validation::validate_cancel_reason(cancel_reason)?;

        let ride = self
            .mutate(ride_id, |ride, now| {
                let to = policy::authorize(ride, actor, RideAction::Cancel)?;
                ride.status = to;
                ride.cancel_reason = Some(cancel_reason.trim().to_string());
                ride.cancelled_by = Some(CancelledBy::from(actor.role));
                ride.timestamps_log.record(to, now)
            })
            .await?;

        tracing::info!("Ride {} cancelled by {} ({})", ride_id, actor.role, actor.id);
        Ok(ride)
    }

    async fn attach_feedback(&self, rider: &Actor, ride_id: &str, feedback: &str) -> RideResult<Ride> {
        validation::validate_feedback(feedback)?;

        self.mutate(ride_id, |ride, _| {
            policy::authorize(ride, rider, RideAction::AttachFeedback)?;
            ride.feedback = Some(feedback.trim().to_string());
            Ok(())
        })
        .await
    }

    async fn ride_history(&self, rider: &Actor, query: &PageQuery) -> RideResult<Paginated<Ride>> {
        let rides = self.rides.read().await;
        let mine = Self::newest_first(rides.iter().filter(|r| r.rider_id == rider.id).cloned());
        Ok(Paginated::from_items(&mine, query))
    }

    async fn get_ride(&self, actor: &Actor, ride_id: &str) -> RideResult<Ride> {
        let rides = self.rides.read().await;
        let ride = rides
            .iter()
            .find(|r| r.id == ride_id)
            .ok_or_else(|| RideError::ride_not_found(ride_id))?;

        let visible = match actor.role {
            Role::Rider => ride.rider_id == actor.id,
            Role::Driver => ride.is_assigned_to(&actor.id) || ride.driver_id.is_none(),
            Role::Admin | Role::SuperAdmin => true,
        };
        if !visible {
            return Err(RideError::ride_not_found(ride_id));
        }
        Ok(ride.clone())
    }

    async fn admin_rides(&self, admin: &Actor, query: &PageQuery) -> RideResult<Paginated<Ride>> {
        if !admin.role.is_admin() {
            return Err(RideError::forbidden("Admin access required"));
        }
        let rides = self.rides.read().await;
        let matching = Self::newest_first(
            rides
                .iter()
                .filter(|r| query.status.is_none_or(|s| r.status == s))
                .filter(|r| query.search_term.as_deref().is_none_or(|term| r.matches_search(term)))
                .cloned(),
        );
        Ok(Paginated::from_items(&matching, query))
    }
}

#[async_trait]
impl AccountOperations for InMemoryRideService {
    async fn my_driver_profile(&self, driver: &Actor) -> RideResult<DriverProfile> {
        self.drivers
            .read()
            .await
            .get(&driver.id)
            .cloned()
            .ok_or_else(|| RideError::NotFound(format!("No driver profile for {}", driver.id)))
    }

    async fn apply_for_driver(&self, user: &Actor, application: DriverApplication) -> RideResult<DriverProfile> {
        validation::validate_driver_application(&application)?;
        self.ensure_active(user).await?;

        let mut drivers = self.drivers.write().await;
        if drivers.contains_key(&user.id) {
            return Err(RideError::conflict("You have already applied as a driver"));
        }

        let profile = DriverProfile {
            id: IdGenerator::generate(IdType::Driver),
            user_id: user.id.clone(),
            license_number: application.license_number.trim().to_string(),
            vehicle_info: application.vehicle_info,
            driver_status: DriverApprovalStatus::Pending,
        };
        drivers.insert(user.id.clone(), profile.clone());

        tracing::info!("Driver application {} filed by {}", profile.id, user.id);
        Ok(profile)
    }

    async fn update_driver_profile(&self, driver: &Actor, update: DriverApplication) -> RideResult<DriverProfile> {
        validation::validate_driver_application(&update)?;
        self.ensure_active(driver).await?;

        let mut drivers = self.drivers.write().await;
        let profile = drivers
            .get_mut(&driver.id)
            .ok_or_else(|| RideError::NotFound(format!("No driver profile for {}", driver.id)))?;
        profile.license_number = update.license_number.trim().to_string();
        profile.vehicle_info = update.vehicle_info;

        tracing::info!("Driver {} now drives a {:?}", driver.id, profile.vehicle_type());
        Ok(profile.clone())
    }

    async fn set_driver_approval(
        &self,
        admin: &Actor,
        driver_id: &str,
        status: DriverApprovalStatus,
    ) -> RideResult<DriverProfile> {
        if !admin.role.is_admin() {
            return Err(RideError::forbidden("Admin access required"));
        }
        let mut drivers = self.drivers.write().await;
        let profile = drivers
            .values_mut()
            .find(|p| p.id == driver_id)
            .ok_or_else(|| RideError::NotFound(format!("Driver not found: {}", driver_id)))?;
        profile.driver_status = status;

        tracing::info!("Driver {} is now {:?}", driver_id, status);
        Ok(profile.clone())
    }

    async fn set_account_status(&self, admin: &Actor, user_id: &str, status: AccountStatus) -> RideResult<UserAccount> {
        if !admin.role.is_admin() {
            return Err(RideError::forbidden("Admin access required"));
        }
        let mut blocked = self.blocked.write().await;
        match status {
            AccountStatus::Blocked => blocked.insert(user_id.to_string()),
            AccountStatus::Active | AccountStatus::Inactive => blocked.remove(user_id),
        };

        tracing::info!("Account {} is now {:?}", user_id, status);
        Ok(UserAccount { id: user_id.to_string(), role: None, is_active: status })
    }
}
