// src/services/http_ride_service.rs
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::{
    errors::{RideError, RideResult},
    models::{
        driver::{DriverApplication, DriverApprovalStatus, DriverProfile, DriverStatusUpdate},
        ride::{
            CancelRequest, FeedbackRequest, PageQuery, Paginated, Ride, RideRequest, RideStatus, StatusUpdate,
        },
        user::{AccountStatus, AccountStatusUpdate, Actor, UserAccount},
    },
    services::{account_service::AccountOperations, ride_service::RideOperations},
    state::AppConfig,
};

/// `{ success, message, data }` wrapper every Ride Service response uses.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

/// Client of the remote Ride Service. The caller's identity travels in the
/// bearer token; the `Actor` arguments are only used for logging.
pub struct HttpRideService {
    base_url: Url,
    client: reqwest::Client,
    bearer_token: Option<String>,
}

impl HttpRideService {
    pub fn new(config: &AppConfig) -> RideResult<Self> {
        let raw = config.ride_service_url.trim_end_matches('/');
        let base_url = Url::parse(raw).map_err(|e| RideError::InvalidUrl(format!("{}: {}", raw, e)))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(RideError::InvalidUrl(raw.to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            base_url,
            client,
            bearer_token: config.bearer_token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Resolve `segments` under the base URL. Each segment is percent-encoded
    /// on its own, so an id can never escape into another path.
    fn endpoint(&self, segments: &[&str]) -> RideResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RideError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// An id used as a path segment. Empty and dot segments are rejected
    /// since URL normalization would drop them.
    fn id_segment(id: &str) -> RideResult<&str> {
        if matches!(id.trim(), "" | "." | "..") {
            return Err(RideError::InvalidFieldValue {
                field: "id".to_string(),
                value: id.to_string(),
                reason: "not a valid identifier".to_string(),
            });
        }
        Ok(id)
    }

    fn request(&self, method: Method, segments: &[&str]) -> RideResult<RequestBuilder> {
        let url = self.endpoint(segments)?;
        let request_id = Uuid::new_v4();
        tracing::debug!(%request_id, "{} {}", method, url);

        let builder = self.client.request(method, url).header("X-Request-Id", request_id.to_string());
        Ok(match &self.bearer_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    /// Send a request for the resource `id` under `prefix`.
    async fn send_for<T: DeserializeOwned>(&self, method: Method, prefix: &[&str], id: &str) -> RideResult<T> {
        let segments: Vec<&str> = prefix.iter().copied().chain([Self::id_segment(id)?]).collect();
        self.send(self.request(method, &segments)?).await
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> RideResult<T> {
        let response = builder.send().await.map_err(|e| {
            tracing::error!("Ride Service request failed: {}", e);
            RideError::from(e)
        })?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiResponse<serde_json::Value>>(&body)
                .ok()
                .and_then(|r| r.message)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string());
            return Err(Self::map_status(status, message));
        }

        let envelope: ApiResponse<T> = serde_json::from_str(&body)?;
        if !envelope.success {
            return Err(RideError::bad_request(
                envelope.message.unwrap_or_else(|| "Request was not successful".to_string()),
            ));
        }
        envelope
            .data
            .ok_or_else(|| RideError::JsonParsing("response has no data".to_string()))
    }

    fn map_status(status: StatusCode, message: String) -> RideError {
        tracing::warn!("Ride Service answered {}: {}", status, message);
        match status {
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => RideError::BadRequest(message),
            StatusCode::UNAUTHORIZED => RideError::Unauthorized(message),
            StatusCode::FORBIDDEN => RideError::Forbidden(message),
            StatusCode::NOT_FOUND => RideError::NotFound(message),
            StatusCode::CONFLICT => RideError::Conflict(message),
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT => {
                RideError::ServiceUnavailable(message)
            }
            _ => RideError::InternalServer(message),
        }
    }

    async fn send_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        body: &B,
    ) -> RideResult<T> {
        self.send(self.request(method, segments)?.json(body)).await
    }

    async fn send_json_for<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        method: Method,
        prefix: &[&str],
        id: &str,
        body: &B,
    ) -> RideResult<T> {
        let segments: Vec<&str> = prefix.iter().copied().chain([Self::id_segment(id)?]).collect();
        self.send_json(method, &segments, body).await
    }

    fn page_params(query: &PageQuery) -> Vec<(&'static str, String)> {
        let mut params = vec![("page", query.page.to_string()), ("limit", query.limit.to_string())];
        if let Some(status) = query.status {
            params.push(("status", status.as_str().to_string()));
        }
        if let Some(term) = query.search_term.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            params.push(("searchTerm", term.to_string()));
        }
        params
    }
}

#[async_trait]
impl RideOperations for HttpRideService {
    async fn request_ride(&self, rider: &Actor, request: RideRequest) -> RideResult<Ride> {
        tracing::info!("Requesting {:?} ride for {}", request.vehicle_type, rider.id);
        self.send_json(Method::POST, &["rides", "request-ride"], &request).await
    }

    async fn available_rides(&self, driver: &Actor) -> RideResult<Vec<Ride>> {
        tracing::debug!("Fetching available rides for driver {}", driver.id);
        self.send(self.request(Method::GET, &["rides", "available-ride-driver"])?).await
    }

    async fn accept_ride(&self, driver: &Actor, ride_id: &str) -> RideResult<Ride> {
        tracing::info!("Driver {} accepting ride {}", driver.id, ride_id);
        self.send_for(Method::PATCH, &["rides", "accept"], ride_id).await
    }

    async fn update_ride_status(&self, actor: &Actor, ride_id: &str, status: RideStatus) -> RideResult<Ride> {
        tracing::info!("{} {} setting ride {} to {}", actor.role, actor.id, ride_id, status);
        let body = StatusUpdate { ride_status: status };
        self.send_json_for(Method::PATCH, &["rides", "status"], ride_id, &body).await
    }

    async fn cancel_ride(&self, actor: &Actor, ride_id: &str, cancel_reason: &str) -> RideResult<Ride> {
        tracing::info!("{} {} cancelling ride {}", actor.role, actor.id, ride_id);
        let body = CancelRequest { cancel_reason: cancel_reason.trim().to_string() };
        self.send_json_for(Method::PATCH, &["rides", "cancel"], ride_id, &body).await
    }

    async fn attach_feedback(&self, rider: &Actor, ride_id: &str, feedback: &str) -> RideResult<Ride> {
        tracing::info!("Rider {} leaving feedback on ride {}", rider.id, ride_id);
        let body = FeedbackRequest { feedback: feedback.trim().to_string() };
        self.send_json_for(Method::POST, &["rides", "feedback"], ride_id, &body).await
    }

    async fn ride_history(&self, rider: &Actor, query: &PageQuery) -> RideResult<Paginated<Ride>> {
        tracing::debug!("Fetching ride history for {} ({})", rider.id, query.fingerprint());
        let builder = self.request(Method::GET, &["rides", "all-ride-riders"])?.query(&Self::page_params(query));
        self.send(builder).await
    }

    async fn get_ride(&self, actor: &Actor, ride_id: &str) -> RideResult<Ride> {
        tracing::debug!("Fetching ride {} for {}", ride_id, actor.id);
        self.send_for(Method::GET, &["rides", "my-ride"], ride_id).await
    }

    async fn admin_rides(&self, admin: &Actor, query: &PageQuery) -> RideResult<Paginated<Ride>> {
        tracing::debug!("Fetching admin rides for {} ({})", admin.id, query.fingerprint());
        let builder = self.request(Method::GET, &["rides", "all-ride-admin"])?.query(&Self::page_params(query));
        self.send(builder).await
    }
}

#[async_trait]
impl AccountOperations for HttpRideService {
    async fn my_driver_profile(&self, driver: &Actor) -> RideResult<DriverProfile> {
        tracing::debug!("Fetching driver profile for {}", driver.id);
        self.send(self.request(Method::GET, &["drivers", "me"])?).await
    }

    async fn apply_for_driver(&self, user: &Actor, application: DriverApplication) -> RideResult<DriverProfile> {
        tracing::info!("{} applying to drive a {:?}", user.id, application.vehicle_info.vehicle_type);
        self.send_json(Method::POST, &["drivers", "apply-for-driver"], &application).await
    }

    async fn update_driver_profile(&self, driver: &Actor, update: DriverApplication) -> RideResult<DriverProfile> {
        tracing::info!("Driver {} updating vehicle to {:?}", driver.id, update.vehicle_info.vehicle_type);
        self.send_json(Method::PATCH, &["drivers", "update-my-driver-profile"], &update).await
    }

    async fn set_driver_approval(
        &self,
        admin: &Actor,
        driver_id: &str,
        status: DriverApprovalStatus,
    ) -> RideResult<DriverProfile> {
        tracing::info!("{} setting driver {} to {:?}", admin.id, driver_id, status);
        let body = DriverStatusUpdate { driver_status: status };
        self.send_json_for(Method::POST, &["drivers", "driver-status"], driver_id, &body).await
    }

    async fn set_account_status(&self, admin: &Actor, user_id: &str, status: AccountStatus) -> RideResult<UserAccount> {
        tracing::info!("{} setting account {} to {:?}", admin.id, user_id, status);
        let body = AccountStatusUpdate { is_active: status };
        self.send_json_for(Method::PATCH, &["users"], user_id, &body).await
    }
}
