//! Shared application state.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::ServerConfig;
use crate::core::realtime::{OpenAIRealtimeConnector, RealtimeConnector};

/// Error returned when no call slot is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionLimitError {
    GlobalLimitReached,
}

/// State shared by every route.
pub struct AppState {
    pub config: ServerConfig,
    /// Opens the realtime socket for each call
    pub connector: Arc<dyn RealtimeConnector>,
    active_calls: AtomicUsize,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("active_calls", &self.active_call_count())
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        Self::with_connector(config, Arc::new(OpenAIRealtimeConnector::new()))
    }

    pub fn with_connector(
        config: ServerConfig,
        connector: Arc<dyn RealtimeConnector>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            connector,
            active_calls: AtomicUsize::new(0),
        })
    }

    /// Reserve a call slot, honouring `max_concurrent_calls`.
    ///
    /// The slot is released when the returned [`CallPermit`] is dropped.
    pub fn try_acquire_call(self: &Arc<Self>) -> Result<CallPermit, ConnectionLimitError> {
        let limit = self.config.max_concurrent_calls;
        self.active_calls
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| match limit {
                Some(max) if current >= max => None,
                _ => Some(current + 1),
            })
            .map_err(|_| ConnectionLimitError::GlobalLimitReached)?;

        Ok(CallPermit {
            state: Arc::clone(self),
        })
    }

    pub fn active_call_count(&self) -> usize {
        self.active_calls.load(Ordering::Acquire)
    }
}

/// A reserved call slot.
#[derive(Debug)]
pub struct CallPermit {
    state: Arc<AppState>,
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        self.state.active_calls.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn config_with_limit(limit: Option<usize>) -> ServerConfig {
        unsafe { std::env::remove_var("MAX_CONCURRENT_CALLS") };
        let mut config = ServerConfig::from_env().unwrap();
        config.max_concurrent_calls = limit;
        config
    }

    #[test]
    #[serial]
    fn test_call_permits_respect_limit() {
        let state = AppState::new(config_with_limit(Some(2)));

        let first = state.try_acquire_call().unwrap();
        let _second = state.try_acquire_call().unwrap();
        assert_eq!(state.active_call_count(), 2);

        assert_eq!(
            state.try_acquire_call().unwrap_err(),
            ConnectionLimitError::GlobalLimitReached
        );

        drop(first);
        assert_eq!(state.active_call_count(), 1);
        assert!(state.try_acquire_call().is_ok());
    }

    #[test]
    #[serial]
    fn test_unlimited_calls() {
        let state = AppState::new(config_with_limit(None));

        let permits: Vec<_> = (0..50).map(|_| state.try_acquire_call().unwrap()).collect();
        assert_eq!(state.active_call_count(), 50);

        drop(permits);
        assert_eq!(state.active_call_count(), 0);
    }
}
