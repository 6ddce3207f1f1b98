// src/services/mod.rs
pub mod account_service;
pub mod cache_service;
pub mod coordinator;
pub mod http_ride_service;
pub mod notification_service;
pub mod ride_service;
