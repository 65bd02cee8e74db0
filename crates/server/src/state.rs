//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::services::{
    AuthService, CapacityGuard, CounterStore, LogResetLinkSink, PasswordHasher,
    PasswordResetManager, RateLimiter, ResetLinkSink, SessionManager,
};
use crate::store::Store;

/// Error building the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("invalid password hashing parameters: {0}")]
    Hashing(argon2::Error),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// configuration, the store, and the services built on top of it.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    store: Arc<dyn Store>,
    auth: AuthService,
    sessions: SessionManager,
    resets: PasswordResetManager,
    capacity: CapacityGuard,
    rate_limiter: RateLimiter,
    reset_links: Arc<dyn ResetLinkSink>,
}

impl AppState {
    /// Create a new application state over `store`.
    ///
    /// Reset links go to the log; they are only revealed in development.
    ///
    /// # Errors
    ///
    /// Returns an error if the hashing parameters are invalid.
    pub fn new<S: Store>(config: ServerConfig, store: Arc<S>) -> Result<Self, StateError> {
        Self::builder(config, store).build()
    }

    /// Create a new application state with a custom reset-link destination.
    ///
    /// # Errors
    ///
    /// Returns an error if the hashing parameters are invalid.
    pub fn with_reset_sink<S: Store>(
        config: ServerConfig,
        store: Arc<S>,
        reset_links: Arc<dyn ResetLinkSink>,
    ) -> Result<Self, StateError> {
        Self::builder(config, store).reset_links(reset_links).build()
    }

    /// Start building a state whose collaborators can be swapped out.
    #[must_use]
    pub fn builder<S: Store>(config: ServerConfig, store: Arc<S>) -> AppStateBuilder<S> {
        AppStateBuilder {
            config,
            store,
            reset_links: None,
            counters: None,
        }
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Get a reference to the backing store.
    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    #[must_use]
    pub fn auth(&self) -> &AuthService {
        &self.inner.auth
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.inner.sessions
    }

    #[must_use]
    pub fn resets(&self) -> &PasswordResetManager {
        &self.inner.resets
    }

    #[must_use]
    pub fn capacity(&self) -> &CapacityGuard {
        &self.inner.capacity
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.inner.rate_limiter
    }

    #[must_use]
    pub fn reset_links(&self) -> &dyn ResetLinkSink {
        self.inner.reset_links.as_ref()
    }
}

/// Builder for [`AppState`].
///
/// Unset collaborators fall back to a [`LogResetLinkSink`] and a
/// process-local [`MemoryCounterStore`](crate::services::MemoryCounterStore).
pub struct AppStateBuilder<S> {
    config: ServerConfig,
    store: Arc<S>,
    reset_links: Option<Arc<dyn ResetLinkSink>>,
    counters: Option<Arc<dyn CounterStore>>,
}

impl<S: Store> AppStateBuilder<S> {
    /// Send reset links to `sink`.
    #[must_use]
    pub fn reset_links(mut self, sink: Arc<dyn ResetLinkSink>) -> Self {
        self.reset_links = Some(sink);
        self
    }

    /// Keep rate-limit counters in `counters`, e.g. a store shared by
    /// several server processes.
    #[must_use]
    pub fn rate_limit_counters(mut self, counters: Arc<dyn CounterStore>) -> Self {
        self.counters = Some(counters);
        self
    }

    /// # Errors
    ///
    /// Returns an error if the hashing parameters are invalid.
    pub fn build(self) -> Result<AppState, StateError> {
        let Self {
            config,
            store,
            reset_links,
            counters,
        } = self;
        let hasher = PasswordHasher::new(&config.hashing).map_err(StateError::Hashing)?;
        let timeout = config.store_timeout;

        let auth = AuthService::new(store.clone(), hasher.clone(), timeout);
        let sessions = SessionManager::new(store.clone(), timeout);
        let resets = PasswordResetManager::new(
            store.clone(),
            store.clone(),
            hasher,
            config.base_url.clone(),
            timeout,
        );
        let capacity = CapacityGuard::new(store.clone(), timeout);
        let rate_limiter = counters.map_or_else(
            || RateLimiter::in_memory(&config.rate_limit),
            |counters| RateLimiter::new(counters, &config.rate_limit),
        );
        let reset_links = reset_links.unwrap_or_else(|| {
            Arc::new(LogResetLinkSink::new(config.environment.is_development()))
        });

        Ok(AppState {
            inner: Arc::new(AppStateInner {
                config,
                store,
                auth,
                sessions,
                resets,
                capacity,
                rate_limiter,
                reset_links,
            }),
        })
    }
}
