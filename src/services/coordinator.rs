// src/services/coordinator.rs
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    errors::{ErrorKind, RideError, RideResult},
    models::{
        driver::{DriverApplication, DriverApprovalStatus, DriverProfile},
        ride::{PageQuery, Paginated, Ride, RideRequest, RideStatus},
        user::{AccountStatus, Actor, UserAccount},
    },
    policy::{self, RideAction},
    services::{
        account_service::AccountOperations,
        cache_service::{CacheKey, Lookup, QueryCache, Tag},
        notification_service::{Notifier, Toast},
        ride_service::RideOperations,
    },
    validation,
};

/// A state-changing request a view can submit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Mutation {
    Request(RideRequest),
    Accept { ride_id: String },
    Advance { ride_id: String, to: RideStatus },
    Cancel { ride_id: String, reason: String },
    Feedback { ride_id: String, feedback: String },
    Override { ride_id: String, to: RideStatus },
}

impl Mutation {
    pub fn ride_id(&self) -> Option<&str> {
        match self {
            Mutation::Request(_) => None,
            Mutation::Accept { ride_id }
            | Mutation::Advance { ride_id, .. }
            | Mutation::Cancel { ride_id, .. }
            | Mutation::Feedback { ride_id, .. }
            | Mutation::Override { ride_id, .. } => Some(ride_id),
        }
    }

    pub fn action(&self) -> Option<RideAction> {
        match self {
            Mutation::Request(_) => None,
            Mutation::Accept { .. } => Some(RideAction::Accept),
            Mutation::Advance { to, .. } => Some(RideAction::Advance(*to)),
            Mutation::Cancel { .. } => Some(RideAction::Cancel),
            Mutation::Feedback { .. } => Some(RideAction::AttachFeedback),
            Mutation::Override { to, .. } => Some(RideAction::Override(*to)),
        }
    }

    /// Local payload checks. Nothing is sent when these fail.
    pub fn validate(&self) -> RideResult<()> {
        match self {
            Mutation::Request(request) => validation::validate_ride_request(request),
            Mutation::Cancel { reason, .. } => validation::validate_cancel_reason(reason),
            Mutation::Feedback { feedback, .. } => validation::validate_feedback(feedback),
            Mutation::Advance { to, .. } | Mutation::Override { to, .. } if *to == RideStatus::Cancelled => Err(
                RideError::validation_error("rideStatus", "Cancelling needs a reason"),
            ),
            _ => Ok(()),
        }
    }

    fn success_message(&self) -> String {
        match self {
            Mutation::Request(_) => "Ride requested successfully".to_string(),
            Mutation::Accept { .. } => "Ride accepted successfully".to_string(),
            Mutation::Advance { to, .. } | Mutation::Override { to, .. } => {
                format!("Ride status updated to {}", to.label())
            }
            Mutation::Cancel { .. } => "Ride cancelled".to_string(),
            Mutation::Feedback { .. } => "Thanks for your feedback".to_string(),
        }
    }
}

/// What `submit` reports back to a view.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    Applied(Ride),
    Rejected(ErrorKind),
}

impl MutationOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, MutationOutcome::Applied(_))
    }
}

/// Sends mutations to the Ride Service and keeps the query cache in step
/// with what the service confirmed.
pub struct RideCoordinator {
    ride_service: Arc<dyn RideOperations>,
    accounts: Arc<dyn AccountOperations>,
    cache: Arc<QueryCache>,
    notifier: Arc<dyn Notifier>,
}

impl RideCoordinator {
    pub fn new(
        ride_service: Arc<dyn RideOperations>,
        accounts: Arc<dyn AccountOperations>,
        cache: Arc<QueryCache>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { ride_service, accounts, cache, notifier }
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// Run `mutation` as `actor`, propagating any failure.
    ///
    /// On success every query tagged with the ride is marked stale. On
    /// failure the cache is left exactly as it was.
    pub async fn execute(&self, actor: &Actor, mutation: Mutation) -> RideResult<Ride> {
        mutation.validate()?;
        self.precheck(actor, &mutation).await?;

        let service = &self.ride_service;
        let result = match &mutation {
            Mutation::Request(request) => service.request_ride(actor, request.clone()).await,
            Mutation::Accept { ride_id } => service.accept_ride(actor, ride_id).await,
            Mutation::Advance { ride_id, to } | Mutation::Override { ride_id, to } => {
                service.update_ride_status(actor, ride_id, *to).await
            }
            Mutation::Cancel { ride_id, reason } => service.cancel_ride(actor, ride_id, reason).await,
            Mutation::Feedback { ride_id, feedback } => service.attach_feedback(actor, ride_id, feedback).await,
        };

        match result {
            Ok(ride) => {
                let marked = self.cache.invalidate_tags(&QueryCache::tags_for(&ride)).await;
                tracing::info!(
                    ride_id = %ride.id,
                    status = %ride.status,
                    "{} {} applied {:?}; {} cached queries marked stale",
                    actor.role,
                    actor.id,
                    mutation.action(),
                    marked
                );
                Ok(ride)
            }
            Err(e) => {
                match e.kind() {
                    ErrorKind::Network => tracing::error!("Mutation by {} failed: {}", actor.id, e),
                    _ => tracing::warn!("Mutation by {} rejected: {}", actor.id, e),
                }
                Err(e)
            }
        }
    }

    /// Run `mutation` and turn the result into a toast. Never fails.
    ///
    /// A precondition rejection means our view of the ride was out of date,
    /// so the ride is refetched and every list showing it is marked stale
    /// before returning.
    pub async fn submit(&self, actor: &Actor, mutation: Mutation) -> MutationOutcome {
        let ride_id = mutation.ride_id().map(str::to_string);
        let message = mutation.success_message();

        match self.execute(actor, mutation).await {
            Ok(ride) => {
                self.notifier.notify(Toast::success(message)).await;
                MutationOutcome::Applied(ride)
            }
            Err(e) => {
                let kind = e.kind();
                self.notifier.notify(Toast::from_error(&e)).await;
                if let (ErrorKind::Precondition, Some(id)) = (kind, ride_id) {
                    self.refresh_after_rejection(actor, &id).await;
                }
                MutationOutcome::Rejected(kind)
            }
        }
    }

    /// Reject locally only when the service's current copy of the ride
    /// confirms the action is not allowed. A fresh cached copy that forbids
    /// it is refetched first; stale or missing copies defer to the service.
    async fn precheck(&self, actor: &Actor, mutation: &Mutation) -> RideResult<()> {
        if let Mutation::Request(_) = mutation {
            if !policy::can_request_ride(actor.role) {
                return Err(RideError::forbidden("Only riders can request a ride"));
            }
            return Ok(());
        }

        let (Some(ride_id), Some(action)) = (mutation.ride_id(), mutation.action()) else {
            return Ok(());
        };
        let key = CacheKey::RideDetail { ride_id: ride_id.to_string() };
        let Ok(Lookup::Fresh(cached)) = self.cache.get::<Ride>(&key).await else {
            return Ok(());
        };
        if policy::authorize(&cached, actor, action).is_ok() {
            return Ok(());
        }

        tracing::debug!("Cached ride {} forbids {:?}, refetching before rejecting", ride_id, action);
        match self.reconcile(actor, ride_id).await {
            Ok(current) => policy::authorize(&current, actor, action).map(|_| ()),
            Err(e) => {
                tracing::debug!("Refetch of ride {} failed ({}), leaving the decision to the service", ride_id, e);
                Ok(())
            }
        }
    }

    /// Fetch the ride from the service and store it as the detail entry.
    /// The entry is fresh unless a mutation of the ride landed meanwhile.
    pub async fn reconcile(&self, actor: &Actor, ride_id: &str) -> RideResult<Ride> {
        let key = CacheKey::RideDetail { ride_id: ride_id.to_string() };
        let generation = self.cache.generation(&key.tag()).await;
        let ride = self.ride_service.get_ride(actor, ride_id).await?;
        if let Err(e) = self.cache.set_as_of(&key, &ride, generation).await {
            tracing::debug!("Not caching ride {}: {}", ride_id, e);
        }
        tracing::debug!("Reconciled ride {} at {}", ride_id, ride.status);
        Ok(ride)
    }

    /// After the service rejected a mutation on `ride_id`, refetch the ride
    /// and mark every list that may still show the old state as stale.
    async fn refresh_after_rejection(&self, actor: &Actor, ride_id: &str) {
        let mut tags = vec![Tag::DriverRides, Tag::AdminRides];
        let known = match self.reconcile(actor, ride_id).await {
            Ok(ride) => Some(ride),
            Err(e) => {
                tracing::warn!("Could not refetch ride {} after rejection: {}", ride_id, e);
                tags.push(Tag::RideDetail(ride_id.to_string()));
                self.cached_ride(ride_id).await
            }
        };
        if let Some(ride) = known {
            tags.push(Tag::RideHistory(ride.rider_id));
        }
        self.cache.invalidate_tags(&tags).await;
    }

    pub async fn ride(&self, actor: &Actor, ride_id: &str) -> RideResult<Ride> {
        let key = CacheKey::RideDetail { ride_id: ride_id.to_string() };
        let service = self.ride_service.clone();
        let actor = actor.clone();
        let id = ride_id.to_string();
        self.cache
            .get_or_fetch(&key, move || async move { service.get_ride(&actor, &id).await }.boxed())
            .await
    }

    /// Last cached copy of a ride, fresh or not. Never touches the network.
    pub async fn cached_ride(&self, ride_id: &str) -> Option<Ride> {
        let key = CacheKey::RideDetail { ride_id: ride_id.to_string() };
        self.cache.get::<Ride>(&key).await.ok().and_then(Lookup::into_value)
    }

    pub async fn ride_history(&self, rider: &Actor, query: &PageQuery) -> RideResult<Paginated<Ride>> {
        let key = CacheKey::RideHistory { rider_id: rider.id.clone(), query: query.clone() };
        let service = self.ride_service.clone();
        let rider = rider.clone();
        let query = query.clone();
        self.cache
            .get_or_fetch(&key, move || async move { service.ride_history(&rider, &query).await }.boxed())
            .await
    }

    pub async fn available_rides(&self, driver: &Actor) -> RideResult<Vec<Ride>> {
        let key = CacheKey::DriverRides { driver_id: driver.id.clone() };
        let service = self.ride_service.clone();
        let driver = driver.clone();
        self.cache
            .get_or_fetch(&key, move || async move { service.available_rides(&driver).await }.boxed())
            .await
    }

    pub async fn admin_rides(&self, admin: &Actor, query: &PageQuery) -> RideResult<Paginated<Ride>> {
        let key = CacheKey::AdminRides { query: query.clone() };
        let service = self.ride_service.clone();
        let admin = admin.clone();
        let query = query.clone();
        self.cache
            .get_or_fetch(&key, move || async move { service.admin_rides(&admin, &query).await }.boxed())
            .await
    }
    pub async fn my_driver_profile(&self, driver: &Actor) -> RideResult<DriverProfile> {
        let key = CacheKey::DriverProfile { user_id: driver.id.clone() };
        let accounts = self.accounts.clone();
        let driver = driver.clone();
        self.cache
            .get_or_fetch(&key, move || async move { accounts.my_driver_profile(&driver).await }.boxed())
            .await
    }

    pub async fn apply_for_driver(&self, user: &Actor, application: DriverApplication) -> RideResult<DriverProfile> {
        validation::validate_driver_application(&application)?;
        let result = self.accounts.apply_for_driver(user, application).await;
        self.settle(result, &[Tag::DriverProfile(user.id.clone())], |_| {
            "Driver application submitted".to_string()
        })
        .await
    }

    /// Change the driver's vehicle. The pick list filters on the vehicle
    /// class, so it is marked stale as well.
    pub async fn update_driver_profile(&self, driver: &Actor, update: DriverApplication) -> RideResult<DriverProfile> {
        validation::validate_driver_application(&update)?;
        let result = self.accounts.update_driver_profile(driver, update).await;
        let tags = [Tag::DriverProfile(driver.id.clone()), Tag::DriverRides];
        self.settle(result, &tags, |_| "Vehicle updated successfully".to_string()).await
    }

    pub async fn set_driver_approval(
        &self,
        admin: &Actor,
        driver_id: &str,
        status: DriverApprovalStatus,
    ) -> RideResult<DriverProfile> {
        let result = self.accounts.set_driver_approval(admin, driver_id, status).await;
        let mut tags = vec![Tag::DriverRides];
        if let Ok(profile) = &result {
            tags.push(Tag::DriverProfile(profile.user_id.clone()));
        }
        self.settle(result, &tags, |profile| match profile.driver_status {
            DriverApprovalStatus::Approved => "Driver approved successfully".to_string(),
            DriverApprovalStatus::Pending => "Driver moved back to pending".to_string(),
        })
        .await
    }

    pub async fn set_account_status(
        &self,
        admin: &Actor,
        user_id: &str,
        status: AccountStatus,
    ) -> RideResult<UserAccount> {
        let result = self.accounts.set_account_status(admin, user_id, status).await;
        let tags = [
            Tag::DriverProfile(user_id.to_string()),
            Tag::DriverRides,
            Tag::AdminRides,
        ];
        self.settle(result, &tags, |account| match account.is_active {
            AccountStatus::Blocked => "User blocked".to_string(),
            AccountStatus::Active | AccountStatus::Inactive => "User unblocked".to_string(),
        })
        .await
    }

    /// Toast an account change and, when it succeeded, mark `tags` stale.
    async fn settle<T>(
        &self,
        result: RideResult<T>,
        tags: &[Tag],
        success: impl FnOnce(&T) -> String,
    ) -> RideResult<T> {
        match &result {
            Ok(value) => {
                self.cache.invalidate_tags(tags).await;
                self.notifier.notify(Toast::success(success(value))).await;
            }
            Err(e) => {
                tracing::warn!("Account change rejected: {}", e);
                self.notifier.notify(Toast::from_error(e)).await;
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ride::{GeoLocation, VehicleType};
    use crate::services::notification_service::{RecordingNotifier, ToastLevel};
    use crate::services::ride_service::InMemoryRideService;

    struct Fixture {
        service: Arc<InMemoryRideService>,
        notifier: Arc<RecordingNotifier>,
        coordinator: RideCoordinator,
    }

    async fn fixture() -> Fixture {
        let service = Arc::new(InMemoryRideService::new());
        service.register_driver("driver-a", VehicleType::Car).await;
        service.register_driver("driver-b", VehicleType::Car).await;
        let notifier = Arc::new(RecordingNotifier::new());
        let coordinator = RideCoordinator::new(
            service.clone(),
            service.clone(),
            Arc::new(QueryCache::default()),
            notifier.clone(),
        );
        Fixture { service, notifier, coordinator }
    }

    fn request() -> RideRequest {
        RideRequest {
            vehicle_type: VehicleType::Car,
            pickup_location: GeoLocation::new(5.6037, -0.1870, "Accra Mall"),
            destination: GeoLocation::new(5.5560, -0.1969, "Independence Square"),
        }
    }

    #[tokio::test]
    async fn test_success_marks_queries_stale() {
        let f = fixture().await;
        let rider = Actor::rider("rider-1");
        let ride = f.coordinator.execute(&rider, Mutation::Request(request())).await.unwrap();

        let history = f.coordinator.ride_history(&rider, &PageQuery::default()).await.unwrap();
        assert_eq!(history.data[0].status, RideStatus::Requested);
        f.coordinator.ride(&rider, &ride.id).await.unwrap();

        f.coordinator
            .execute(&Actor::driver("driver-a"), Mutation::Accept { ride_id: ride.id.clone() })
            .await
            .unwrap();

        let key = CacheKey::RideHistory { rider_id: rider.id.clone(), query: PageQuery::default() };
        assert!(matches!(f.coordinator.cache().get::<Paginated<Ride>>(&key).await.unwrap(), Lookup::Stale(_)));

        let history = f.coordinator.ride_history(&rider, &PageQuery::default()).await.unwrap();
        assert_eq!(history.data[0].status, RideStatus::Accepted);
        assert_eq!(f.coordinator.ride(&rider, &ride.id).await.unwrap().status, RideStatus::Accepted);
    }

    #[tokio::test]
    async fn test_validation_never_reaches_service() {
        let f = fixture().await;
        let rider = Actor::rider("rider-1");
        let ride = f.coordinator.execute(&rider, Mutation::Request(request())).await.unwrap();

        let outcome = f
            .coordinator
            .submit(&rider, Mutation::Cancel { ride_id: ride.id.clone(), reason: "x".to_string() })
            .await;
        assert_eq!(outcome, MutationOutcome::Rejected(ErrorKind::Validation));

        let stored = f.service.get_ride(&rider, &ride.id).await.unwrap();
        assert_eq!(stored.status, RideStatus::Requested);
        assert_eq!(f.notifier.last().await.unwrap().level, ToastLevel::Error);
    }

    #[tokio::test]
    async fn test_fresh_cache_blocks_illegal_action() {
        let f = fixture().await;
        let rider = Actor::rider("rider-1");
        let ride = f.coordinator.execute(&rider, Mutation::Request(request())).await.unwrap();
        f.coordinator.ride(&rider, &ride.id).await.unwrap();

        let result = f
            .coordinator
            .execute(&rider, Mutation::Advance { ride_id: ride.id.clone(), to: RideStatus::PickedUp })
            .await;
        assert!(matches!(result, Err(RideError::IllegalTransition { .. })));
    }

    #[tokio::test]
    async fn test_rejection_reconciles_detail() {
        let f = fixture().await;
        let rider = Actor::rider("rider-1");
        let driver = Actor::driver("driver-a");
        let ride = f.coordinator.execute(&rider, Mutation::Request(request())).await.unwrap();
        f.coordinator.execute(&driver, Mutation::Accept { ride_id: ride.id.clone() }).await.unwrap();

        // rider's view is fresh at ACCEPTED when the driver picks up elsewhere
        assert_eq!(f.coordinator.ride(&rider, &ride.id).await.unwrap().status, RideStatus::Accepted);
        f.service.update_ride_status(&driver, &ride.id, RideStatus::PickedUp).await.unwrap();

        let outcome = f
            .coordinator
            .submit(&rider, Mutation::Cancel { ride_id: ride.id.clone(), reason: "change of plans".to_string() })
            .await;
        assert_eq!(outcome, MutationOutcome::Rejected(ErrorKind::Precondition));
        assert_eq!(f.notifier.last().await.unwrap().level, ToastLevel::Error);

        let key = CacheKey::RideDetail { ride_id: ride.id.clone() };
        match f.coordinator.cache().get::<Ride>(&key).await.unwrap() {
            Lookup::Fresh(cached) => assert_eq!(cached.status, RideStatus::PickedUp),
            other => panic!("expected a fresh detail entry, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_losing_accept_reports_assignment() {
        let f = fixture().await;
        let ride = f.coordinator.execute(&Actor::rider("rider-1"), Mutation::Request(request())).await.unwrap();
        f.service.accept_ride(&Actor::driver("driver-a"), &ride.id).await.unwrap();

        let outcome = f
            .coordinator
            .submit(&Actor::driver("driver-b"), Mutation::Accept { ride_id: ride.id.clone() })
            .await;
        assert_eq!(outcome, MutationOutcome::Rejected(ErrorKind::Precondition));
        assert_eq!(f.notifier.last().await.unwrap().message, RideError::RideAlreadyAssigned.to_string());
    }

    #[tokio::test]
    async fn test_outdated_fresh_copy_does_not_block_legal_action() {
        let f = fixture().await;
        let rider = Actor::rider("rider-1");
        let driver = Actor::driver("driver-a");
        let ride = f.coordinator.execute(&rider, Mutation::Request(request())).await.unwrap();
        let accepted = f.coordinator.execute(&driver, Mutation::Accept { ride_id: ride.id.clone() }).await.unwrap();

        // another client moves the ride on; this client still holds ACCEPTED as fresh
        f.service.update_ride_status(&driver, &ride.id, RideStatus::PickedUp).await.unwrap();
        let key = CacheKey::RideDetail { ride_id: ride.id.clone() };
        f.coordinator.cache().set(&key, &accepted).await.unwrap();

        let moved = f
            .coordinator
            .execute(&driver, Mutation::Advance { ride_id: ride.id.clone(), to: RideStatus::InTransit })
            .await
            .unwrap();
        assert_eq!(moved.status, RideStatus::InTransit);
    }

    #[tokio::test]
    async fn test_rejection_refreshes_pick_list() {
        let f = fixture().await;
        let ride = f.coordinator.execute(&Actor::rider("rider-1"), Mutation::Request(request())).await.unwrap();

        let driver_b = Actor::driver("driver-b");
        let offered = f.coordinator.available_rides(&driver_b).await.unwrap();
        assert_eq!(offered.len(), 1);

        f.service.accept_ride(&Actor::driver("driver-a"), &ride.id).await.unwrap();
        let outcome = f.coordinator.submit(&driver_b, Mutation::Accept { ride_id: ride.id.clone() }).await;
        assert_eq!(outcome, MutationOutcome::Rejected(ErrorKind::Precondition));

        let key = CacheKey::DriverRides { driver_id: driver_b.id.clone() };
        assert!(matches!(f.coordinator.cache().get::<Vec<Ride>>(&key).await.unwrap(), Lookup::Stale(_)));
        assert!(f.coordinator.available_rides(&driver_b).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_vehicle_update_refreshes_pick_list() {
        use crate::models::driver::VehicleInfo;

        let f = fixture().await;
        let driver = Actor::driver("driver-a");
        let mut bike = request();
        bike.vehicle_type = VehicleType::Bike;
        f.coordinator.execute(&Actor::rider("rider-1"), Mutation::Request(bike)).await.unwrap();
        assert!(f.coordinator.available_rides(&driver).await.unwrap().is_empty());
        assert_eq!(f.coordinator.my_driver_profile(&driver).await.unwrap().vehicle_type(), VehicleType::Car);

        let update = DriverApplication {
            nid_number: "1990123456".to_string(),
            license_number: "DL-42".to_string(),
            vehicle_info: VehicleInfo {
                vehicle_type: VehicleType::Bike,
                model: "Boxer".to_string(),
                plate_number: "M-22-GR".to_string(),
                color: None,
                seats: None,
            },
        };
        f.coordinator.update_driver_profile(&driver, update).await.unwrap();
        assert_eq!(f.notifier.last().await.unwrap().message, "Vehicle updated successfully");

        assert_eq!(f.coordinator.available_rides(&driver).await.unwrap().len(), 1);
        assert_eq!(f.coordinator.my_driver_profile(&driver).await.unwrap().vehicle_type(), VehicleType::Bike);
    }

    #[tokio::test]
    async fn test_rejected_account_change_is_toasted() {
        let f = fixture().await;
        let result = f
            .coordinator
            .set_account_status(&Actor::rider("rider-1"), "driver-a", AccountStatus::Blocked)
            .await;
        assert!(matches!(result, Err(RideError::Forbidden(_))));
        assert_eq!(f.notifier.last().await.unwrap().level, ToastLevel::Error);
    }

    #[tokio::test]
    async fn test_submit_toasts_success() {
        let f = fixture().await;
        let outcome = f.coordinator.submit(&Actor::rider("rider-1"), Mutation::Request(request())).await;
        assert!(outcome.is_applied());
        let toast = f.notifier.last().await.unwrap();
        assert_eq!(toast.level, ToastLevel::Success);
        assert_eq!(toast.message, "Ride requested successfully");
    }

    #[tokio::test]
    async fn test_drivers_cannot_request() {
        let f = fixture().await;
        let result = f.coordinator.execute(&Actor::driver("driver-a"), Mutation::Request(request())).await;
        assert!(matches!(result, Err(RideError::Forbidden(_))));
    }

    #[test]
    fn test_status_update_cannot_cancel() {
        let m = Mutation::Override { ride_id: "r1".to_string(), to: RideStatus::Cancelled };
        assert!(matches!(m.validate(), Err(RideError::ValidationFailed(_))));
    }
}
