// src/services/account_service.rs
use async_trait::async_trait;

use crate::{
    errors::RideResult,
    models::{
        driver::{DriverApplication, DriverApprovalStatus, DriverProfile},
        user::{AccountStatus, Actor, UserAccount},
    },
};

/// Driver onboarding and account moderation on the remote service.
///
/// These never change a ride, but they decide which rides a driver is
/// offered and whether a user may act at all.
#[async_trait]
pub trait AccountOperations: Send + Sync {
    /// The signed-in driver's own profile.
    async fn my_driver_profile(&self, driver: &Actor) -> RideResult<DriverProfile>;

    /// File a driver application. The profile starts out pending.
    async fn apply_for_driver(&self, user: &Actor, application: DriverApplication) -> RideResult<DriverProfile>;

    /// Replace the signed-in driver's licence and vehicle details.
    async fn update_driver_profile(&self, driver: &Actor, update: DriverApplication) -> RideResult<DriverProfile>;

    /// Approve or revoke the driver profile `driver_id`.
    async fn set_driver_approval(
        &self,
        admin: &Actor,
        driver_id: &str,
        status: DriverApprovalStatus,
    ) -> RideResult<DriverProfile>;

    /// Block or reactivate the account `user_id`.
    async fn set_account_status(&self, admin: &Actor, user_id: &str, status: AccountStatus) -> RideResult<UserAccount>;
}
