// src/services/notification_service.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::errors::RideError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastLevel {
    Success,
    Error,
}

/// A short user-facing notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Toast {
    pub id: String,
    pub level: ToastLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Toast {
    pub fn new(level: ToastLevel, message: impl Into<String>) -> Self {
        Self {
            id: nanoid::nanoid!(10),
            level,
            message: message.into(),
            created_at: Utc::now(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(ToastLevel::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ToastLevel::Error, message)
    }

    pub fn from_error(error: &RideError) -> Self {
        Self::error(error.toast_message())
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, toast: Toast);
}

/// Writes toasts to the log.
#[derive(Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, toast: Toast) {
        match toast.level {
            ToastLevel::Success => tracing::info!(toast_id = %toast.id, "{}", toast.message),
            ToastLevel::Error => tracing::error!(toast_id = %toast.id, "{}", toast.message),
        }
    }
}

/// Keeps every toast in memory, for tests and headless runs.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    toasts: Mutex<Vec<Toast>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn toasts(&self) -> Vec<Toast> {
        self.toasts.lock().await.clone()
    }

    pub async fn last(&self) -> Option<Toast> {
        self.toasts.lock().await.last().cloned()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, toast: Toast) {
        tracing::debug!(level = ?toast.level, "recording toast: {}", toast.message);
        self.toasts.lock().await.push(toast);
    }
}
