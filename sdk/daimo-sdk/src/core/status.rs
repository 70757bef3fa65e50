use serde::Serialize;

use crate::error::{DaimoSdkError, ErrorKind};
use crate::types::Cost;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Idle,
    Loading,
    Success,
    Error,
}

/// UI-facing projection of an operation's progress. Never holds secrets.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActStatus<T> {
    pub status: Status,
    pub message: String,
    pub cost: Cost,
    /// Set on failures so the UI can choose between "Retry" and "Error"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKindTag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// Serializable mirror of [`ErrorKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKindTag {
    Cancelled,
    Fatal,
    Retryable,
    Ambiguous,
    Terminal,
}

impl From<ErrorKind> for ErrorKindTag {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Cancelled => ErrorKindTag::Cancelled,
            ErrorKind::Fatal => ErrorKindTag::Fatal,
            ErrorKind::Retryable => ErrorKindTag::Retryable,
            ErrorKind::Ambiguous => ErrorKindTag::Ambiguous,
            ErrorKind::Terminal => ErrorKindTag::Terminal,
        }
    }
}

impl<T> ActStatus<T> {
    pub fn idle(cost: Cost) -> Self {
        Self {
            status: Status::Idle,
            message: String::new(),
            cost,
            error_kind: None,
            data: None,
        }
    }

    pub fn loading(cost: Cost, message: impl Into<String>) -> Self {
        Self {
            status: Status::Loading,
            message: message.into(),
            cost,
            error_kind: None,
            data: None,
        }
    }

    pub fn success(cost: Cost, message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            status: Status::Success,
            message: message.into(),
            cost,
            error_kind: None,
            data,
        }
    }

    pub fn error(cost: Cost, err: &DaimoSdkError) -> Self {
        Self {
            status: Status::Error,
            message: error_message(err),
            cost,
            error_kind: Some(err.kind().into()),
            data: None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == Status::Loading
    }
}

/// Short human-readable text for an error.
pub fn error_message(err: &DaimoSdkError) -> String {
    match err {
        DaimoSdkError::UserCancelled => "Authentication cancelled".to_string(),
        DaimoSdkError::KeyNotFound(_) => "Device key not found".to_string(),
        DaimoSdkError::Connection(_) => "Network unavailable, try again".to_string(),
        DaimoSdkError::NonceRejected(_) => "Already submitted".to_string(),
        DaimoSdkError::BundleNotFound(_) => "Bundle not found".to_string(),
        DaimoSdkError::Reverted(_) => "Transaction reverted".to_string(),
        DaimoSdkError::AlreadyClaimed(_) => "Already claimed".to_string(),
        DaimoSdkError::InvalidLink(_) => "Invalid payment link".to_string(),
        other => other.to_string(),
    }
}
