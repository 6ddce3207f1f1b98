use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use sparrow_rides::{
    adapters,
    errors::{ErrorKind, RideError, RideResult},
    models::ride::{GeoLocation, PageQuery, Paginated, Ride, RideRequest, RideStatus, VehicleType},
    models::{CancelledBy, Role},
    policy::{legal_next_states, RideAction},
    services::{
        cache_service::{CacheKey, Lookup, QueryCache},
        coordinator::{Mutation, MutationOutcome, RideCoordinator},
        notification_service::{RecordingNotifier, ToastLevel},
        ride_service::{InMemoryRideService, RideOperations},
    },
    Actor,
};

fn request() -> RideRequest {
    RideRequest {
        vehicle_type: VehicleType::Car,
        pickup_location: GeoLocation::new(5.6037, -0.1870, "Accra Mall"),
        destination: GeoLocation::new(5.5560, -0.1969, "Independence Square"),
    }
}

async fn in_memory() -> (Arc<InMemoryRideService>, Arc<RecordingNotifier>, RideCoordinator) {
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
    (service, notifier, coordinator)
}

/// Delegates to an in-memory service, but fails every mutation while `offline` is set.
struct FlakyRideService {
    inner: Arc<InMemoryRideService>,
    offline: AtomicBool,
}

impl FlakyRideService {
    fn check(&self) -> RideResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(RideError::NetworkConnection("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RideOperations for FlakyRideService {
    async fn request_ride(&self, rider: &Actor, request: RideRequest) -> RideResult<Ride> {
        self.check()?;
        self.inner.request_ride(rider, request).await
    }

    async fn available_rides(&self, driver: &Actor) -> RideResult<Vec<Ride>> {
        self.inner.available_rides(driver).await
    }

    async fn accept_ride(&self, driver: &Actor, ride_id: &str) -> RideResult<Ride> {
        self.check()?;
        self.inner.accept_ride(driver, ride_id).await
    }

    async fn update_ride_status(&self, actor: &Actor, ride_id: &str, status: RideStatus) -> RideResult<Ride> {
        self.check()?;
        self.inner.update_ride_status(actor, ride_id, status).await
    }

    async fn cancel_ride(&self, actor: &Actor, ride_id: &str, cancel_reason: &str) -> RideResult<Ride> {
        self.check()?;
        self.inner.cancel_ride(actor, ride_id, cancel_reason).await
    }

    async fn attach_feedback(&self, rider: &Actor, ride_id: &str, feedback: &str) -> RideResult<Ride> {
        self.check()?;
        self.inner.attach_feedback(rider, ride_id, feedback).await
    }

    async fn ride_history(&self, rider: &Actor, query: &PageQuery) -> RideResult<Paginated<Ride>> {
        self.inner.ride_history(rider, query).await
    }

    async fn get_ride(&self, actor: &Actor, ride_id: &str) -> RideResult<Ride> {
        self.inner.get_ride(actor, ride_id).await
    }

    async fn admin_rides(&self, admin: &Actor, query: &PageQuery) -> RideResult<Paginated<Ride>> {
        self.inner.admin_rides(admin, query).await
    }
}

#[tokio::test]
async fn test_concurrent_accept_keeps_first_driver() {
    let (_service, _notifier, coordinator) = in_memory().await;
    let rider = Actor::rider("rider-1");
    let ride = coordinator.execute(&rider, Mutation::Request(request())).await.unwrap();

    let driver_a = Actor::driver("driver-a");
    let driver_b = Actor::driver("driver-b");
    let (a, b) = tokio::join!(
        coordinator.execute(&driver_a, Mutation::Accept { ride_id: ride.id.clone() }),
        coordinator.execute(&driver_b, Mutation::Accept { ride_id: ride.id.clone() }),
    );

    let winner = match (&a, &b) {
        (Ok(ride), Err(RideError::RideAlreadyAssigned)) | (Err(RideError::RideAlreadyAssigned), Ok(ride)) => ride,
        other => panic!("expected exactly one accept to win, got {:?}", other),
    };
    assert_eq!(winner.status, RideStatus::Accepted);

    let stored = coordinator.ride(&rider, &ride.id).await.unwrap();
    assert_eq!(stored.driver_id, winner.driver_id);
}

#[tokio::test]
async fn test_rider_cancels_accepted_ride() {
    let (_service, _notifier, coordinator) = in_memory().await;
    let rider = Actor::rider("rider-1");
    let driver = Actor::driver("driver-a");
    let ride = coordinator.execute(&rider, Mutation::Request(request())).await.unwrap();
    coordinator.execute(&driver, Mutation::Accept { ride_id: ride.id.clone() }).await.unwrap();

    let cancelled = coordinator
        .execute(&rider, Mutation::Cancel { ride_id: ride.id.clone(), reason: "change of plans".to_string() })
        .await
        .unwrap();
    assert_eq!(cancelled.status, RideStatus::Cancelled);
    assert_eq!(cancelled.cancel_reason.as_deref(), Some("change of plans"));
    assert_eq!(cancelled.cancelled_by, Some(CancelledBy::Rider));
    assert!(cancelled.timestamps_log.cancelled_at.is_some());

    for role in [Role::Rider, Role::Driver, Role::Admin, Role::SuperAdmin] {
        assert!(legal_next_states(RideStatus::Cancelled, role).is_empty());
    }
    assert!(adapters::present(&cancelled, &driver).enabled_actions.is_empty());

    let advance = coordinator
        .execute(&driver, Mutation::Advance { ride_id: ride.id.clone(), to: RideStatus::PickedUp })
        .await;
    assert!(matches!(advance, Err(RideError::IllegalTransition { .. })));
    assert_eq!(coordinator.ride(&rider, &ride.id).await.unwrap().status, RideStatus::Cancelled);
}

#[tokio::test]
async fn test_full_progression_logs_four_timestamps() {
    let (_service, notifier, coordinator) = in_memory().await;
    let rider = Actor::rider("rider-1");
    let driver = Actor::driver("driver-a");
    let ride = coordinator.execute(&rider, Mutation::Request(request())).await.unwrap();

    assert!(coordinator.submit(&driver, Mutation::Accept { ride_id: ride.id.clone() }).await.is_applied());
    for to in [RideStatus::PickedUp, RideStatus::InTransit, RideStatus::Completed] {
        let view = adapters::present(&coordinator.ride(&driver, &ride.id).await.unwrap(), &driver);
        assert!(view.offers(RideAction::Advance(to)), "{} not offered", to);
        assert!(coordinator.submit(&driver, Mutation::Advance { ride_id: ride.id.clone(), to }).await.is_applied());
    }

    let done = coordinator.ride(&rider, &ride.id).await.unwrap();
    assert_eq!(done.status, RideStatus::Completed);

    let keys = done.timestamps_log.populated();
    assert_eq!(
        keys.iter().map(|(k, _)| *k).collect::<Vec<_>>(),
        vec!["requestedAt", "acceptedAt", "pickedUpAt", "completedAt"]
    );
    assert!(keys.windows(2).all(|w| w[0].1 < w[1].1));
    assert_eq!(done.timestamps_log.cancelled_at, None);

    let toasts = notifier.toasts().await;
    assert_eq!(toasts.len(), 4);
    assert!(toasts.iter().all(|t| t.level == ToastLevel::Success));
}

#[tokio::test]
async fn test_feedback_is_accepted_once() {
    let (_service, _notifier, coordinator) = in_memory().await;
    let rider = Actor::rider("rider-1");
    let driver = Actor::driver("driver-a");
    let ride = coordinator.execute(&rider, Mutation::Request(request())).await.unwrap();
    coordinator.execute(&driver, Mutation::Accept { ride_id: ride.id.clone() }).await.unwrap();
    for to in [RideStatus::PickedUp, RideStatus::InTransit, RideStatus::Completed] {
        coordinator.execute(&driver, Mutation::Advance { ride_id: ride.id.clone(), to }).await.unwrap();
    }

    let view = adapters::present(&coordinator.ride(&rider, &ride.id).await.unwrap(), &rider);
    assert_eq!(view.enabled_actions.len(), 1);
    assert!(view.offers(RideAction::AttachFeedback));

    let first = coordinator
        .submit(&rider, Mutation::Feedback { ride_id: ride.id.clone(), feedback: "Great driver".to_string() })
        .await;
    assert!(first.is_applied());

    let second = coordinator
        .submit(&rider, Mutation::Feedback { ride_id: ride.id.clone(), feedback: "Again".to_string() })
        .await;
    assert_eq!(second, MutationOutcome::Rejected(ErrorKind::Precondition));

    let stored = coordinator.ride(&rider, &ride.id).await.unwrap();
    assert_eq!(stored.feedback.as_deref(), Some("Great driver"));
    assert!(adapters::present(&stored, &rider).enabled_actions.is_empty());
}

#[tokio::test]
async fn test_network_failure_leaves_view_unchanged() {
    let inner = Arc::new(InMemoryRideService::new());
    inner.register_driver("driver-a", VehicleType::Car).await;
    let flaky = Arc::new(FlakyRideService { inner: inner.clone(), offline: AtomicBool::new(false) });
    let notifier = Arc::new(RecordingNotifier::new());
    let cache = Arc::new(QueryCache::default());
    let coordinator = RideCoordinator::new(flaky.clone(), inner, cache.clone(), notifier.clone());

    let rider = Actor::rider("rider-1");
    let driver = Actor::driver("driver-a");
    let ride = coordinator.execute(&rider, Mutation::Request(request())).await.unwrap();
    coordinator.execute(&driver, Mutation::Accept { ride_id: ride.id.clone() }).await.unwrap();

    let before = coordinator.ride(&driver, &ride.id).await.unwrap();
    let history_before = coordinator.ride_history(&rider, &PageQuery::default()).await.unwrap();

    flaky.offline.store(true, Ordering::SeqCst);
    let outcome = coordinator
        .submit(&driver, Mutation::Advance { ride_id: ride.id.clone(), to: RideStatus::PickedUp })
        .await;
    assert_eq!(outcome, MutationOutcome::Rejected(ErrorKind::Network));

    let toast = notifier.last().await.unwrap();
    assert_eq!(toast.level, ToastLevel::Error);
    assert_eq!(toast.message, "Something went wrong");

    // cached entries are still fresh and untouched
    let key = CacheKey::RideDetail { ride_id: ride.id.clone() };
    assert_eq!(cache.get::<Ride>(&key).await.unwrap(), Lookup::Fresh(before.clone()));
    let after = coordinator.ride(&driver, &ride.id).await.unwrap();
    assert_eq!(after.status, before.status);
    assert_eq!(after, before);
    assert_eq!(coordinator.ride_history(&rider, &PageQuery::default()).await.unwrap(), history_before);

    flaky.offline.store(false, Ordering::SeqCst);
    let retried = coordinator
        .execute(&driver, Mutation::Advance { ride_id: ride.id.clone(), to: RideStatus::PickedUp })
        .await
        .unwrap();
    assert_eq!(retried.status, RideStatus::PickedUp);
}

#[tokio::test]
async fn test_admin_moderation_flow() {
    let (_service, _notifier, coordinator) = in_memory().await;
    let admin = Actor::new("admin-1", Role::SuperAdmin);
    let rider = Actor::rider("rider-1");
    let driver = Actor::driver("driver-a");

    let ride = coordinator.execute(&rider, Mutation::Request(request())).await.unwrap();
    coordinator.execute(&driver, Mutation::Accept { ride_id: ride.id.clone() }).await.unwrap();

    let page = coordinator.admin_rides(&admin, &PageQuery::default()).await.unwrap();
    let rows = adapters::admin_table(&page.data, &admin, &adapters::AdminFilter::default());
    assert_eq!(rows.len(), 1);
    assert!(rows[0].status_options.iter().any(|o| o.status == RideStatus::Completed && o.enabled));
    assert!(!rows[0].status_options.iter().any(|o| o.status == RideStatus::Requested && o.enabled));

    let jumped = coordinator
        .execute(&admin, Mutation::Override { ride_id: ride.id.clone(), to: RideStatus::Completed })
        .await
        .unwrap();
    assert_eq!(jumped.status, RideStatus::Completed);

    let page = coordinator.admin_rides(&admin, &PageQuery::default()).await.unwrap();
    assert_eq!(page.data[0].status, RideStatus::Completed);

    let back = coordinator
        .execute(&admin, Mutation::Override { ride_id: ride.id.clone(), to: RideStatus::InTransit })
        .await;
    assert!(back.is_err());
}

#[tokio::test]
async fn test_rider_history_pages() {
    let (_service, _notifier, coordinator) = in_memory().await;
    let rider = Actor::rider("rider-1");
    for _ in 0..3 {
        let ride = coordinator.execute(&rider, Mutation::Request(request())).await.unwrap();
        coordinator
            .execute(&rider, Mutation::Cancel { ride_id: ride.id, reason: "changed my mind".to_string() })
            .await
            .unwrap();
    }

    let first = coordinator.ride_history(&rider, &PageQuery::new(1, 2)).await.unwrap();
    let view = adapters::rider_history(&first, &rider);
    assert_eq!(view.rows.len(), 2);
    assert!(!view.has_previous && view.has_next);
    assert!(view.rows.iter().all(|r| !r.can_cancel));

    let second = coordinator.ride_history(&rider, &PageQuery::new(2, 2)).await.unwrap();
    assert_eq!(second.data.len(), 1);
    assert_eq!(second.meta.total, 3);
}
