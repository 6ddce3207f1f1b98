use sparrow_rides::{
    adapters,
    models::ride::{GeoLocation, PageQuery, RideRequest, VehicleType},
    state::{AppConfig, AppState},
    Actor, Mutation, RideStatus,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if std::env::var("RIDE_SERVICE_URL").is_ok() {
        let config = AppConfig::from_env()?;
        let page_size = config.page_size;
        let state = AppState::new(config)?;

        // the bearer token decides who we are; assume an admin session
        let admin = Actor::admin("session");
        let page = state.coordinator.admin_rides(&admin, &PageQuery::new(1, page_size)).await?;
        for row in adapters::admin_table(&page.data, &admin, &adapters::AdminFilter::default()) {
            let driver = row.short_driver_id.as_deref().unwrap_or("-");
            println!(
                "{} {:<10} rider {} driver {}",
                row.short_ride_id, row.view.status_label, row.short_rider_id, driver
            );
        }
        return Ok(());
    }

    tracing::warn!("RIDE_SERVICE_URL not set, using in-memory ride service");
    let (state, service) = AppState::in_memory();
    let coordinator = &state.coordinator;
    service.register_driver("driver-kofi", VehicleType::Car).await;

    let rider = Actor::rider("rider-ama");
    let driver = Actor::driver("driver-kofi");

    let ride = coordinator
        .execute(
            &rider,
            Mutation::Request(RideRequest {
                vehicle_type: VehicleType::Car,
                pickup_location: GeoLocation::new(5.6037, -0.1870, "Accra Mall"),
                destination: GeoLocation::new(5.5560, -0.1969, "Independence Square"),
            }),
        )
        .await?;

    for row in adapters::driver_pick_list(&coordinator.available_rides(&driver).await?, &driver, None) {
        println!("available: {} ({:.1} km)", row.view.ride_id, row.distance_km);
    }

    coordinator.submit(&driver, Mutation::Accept { ride_id: ride.id.clone() }).await;
    for to in [RideStatus::PickedUp, RideStatus::InTransit, RideStatus::Completed] {
        coordinator.submit(&driver, Mutation::Advance { ride_id: ride.id.clone(), to }).await;
    }
    coordinator
        .submit(&rider, Mutation::Feedback { ride_id: ride.id.clone(), feedback: "Smooth ride".to_string() })
        .await;

    let detail = adapters::ride_detail(&coordinator.ride(&rider, &ride.id).await?, &rider);
    println!("{} is {}", detail.view.ride_id, detail.view.status_label);
    for (key, at) in &detail.timeline {
        println!("  {:<12} {}", key, at.to_rfc3339());
    }
    Ok(())
}
