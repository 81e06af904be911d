//! Fetch state wrapper shared by both polled resources.

use serde::{Deserialize, Serialize};

use crate::error::ErrorInfo;

/// Last known result of fetching a remote resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchState<T> {
    /// A request is in flight and nothing has been rendered yet
    pub loading: bool,

    /// Error from the most recent request, if it failed
    pub error: Option<ErrorInfo>,

    /// Latest snapshot
    pub data: Option<T>,
}

impl<T> Default for FetchState<T> {
    fn default() -> Self {
        Self::idle()
    }
}

impl<T> FetchState<T> {
    /// Nothing requested yet.
    pub fn idle() -> Self {
        Self {
            loading: false,
            error: None,
            data: None,
        }
    }

    /// First request issued, no answer yet.
    pub fn loading() -> Self {
        Self {
            loading: true,
            error: None,
            data: None,
        }
    }

    /// Successful response carrying a snapshot.
    pub fn ready(data: T) -> Self {
        Self::settled(Some(data))
    }

    /// Successful response, which may legitimately be empty.
    pub fn settled(data: Option<T>) -> Self {
        Self {
            loading: false,
            error: None,
            data,
        }
    }

    /// Failed request, optionally keeping an earlier snapshot.
    pub fn failed(error: ErrorInfo, data: Option<T>) -> Self {
        Self {
            loading: false,
            error: Some(error),
            data,
        }
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl<T: Clone> FetchState<T> {
    /// Same loading and error, data dropped.
    pub fn cleared(&self) -> Self {
        Self {
            loading: self.loading,
            error: self.error.clone(),
            data: None,
        }
    }

    /// Same error and data, with the outstanding request given up on.
    pub fn abandoned(&self) -> Self {
        Self {
            loading: false,
            error: self.error.clone(),
            data: self.data.clone(),
        }
    }
}
