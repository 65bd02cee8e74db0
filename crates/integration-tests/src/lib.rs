//! Integration tests for Depot.
//!
//! Each test spawns the full router on an ephemeral port, backed by the
//! in-memory store, and talks to it over HTTP with a cookie-keeping client.
//! No database or external services are needed, except for the ignored
//! tests in `tests/postgres_store.rs`.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p depot-integration-tests
//! DEPOT_TEST_DATABASE_URL=postgres://localhost/depot_test \
//!     cargo test -p depot-integration-tests -- --ignored
//! ```

#![allow(clippy::expect_used, clippy::missing_panics_doc)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use depot_core::Role;
use depot_server::config::{HashingConfig, RateLimitConfig, ServerConfig};
use depot_server::services::{ResetDelivery, ResetLinkSink};
use depot_server::state::AppState;
use depot_server::store::MemoryStore;
use reqwest::{Client, Response, redirect};
use tokio::net::TcpListener;
use url::Url;

/// Reset-link sink that keeps every delivery for inspection.
#[derive(Debug, Default)]
pub struct CapturedLinks {
    deliveries: Mutex<Vec<ResetDelivery>>,
}

impl CapturedLinks {
    /// The most recently delivered link, if any.
    pub fn last_link(&self) -> Option<Url> {
        self.deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .map(|delivery| delivery.link.clone())
    }

    pub fn count(&self) -> usize {
        self.deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl ResetLinkSink for CapturedLinks {
    fn deliver(&self, delivery: ResetDelivery) {
        self.deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(delivery);
    }
}

/// A running server and handles into its state.
pub struct TestApp {
    pub addr: SocketAddr,
    pub state: AppState,
    pub store: MemoryStore,
    pub links: Arc<CapturedLinks>,
}

impl TestApp {
    /// Spawn a server with the default rate limit.
    pub async fn spawn() -> Self {
        Self::spawn_with(RateLimitConfig::default()).await
    }

    /// Spawn a server with the given rate limit.
    pub async fn spawn_with(rate_limit: RateLimitConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Failed to read local address");

        let base_url = Url::parse(&format!("http://{addr}")).expect("Invalid base URL");
        let mut config = ServerConfig::in_memory(base_url);
        config.hashing = HashingConfig::minimal();
        config.rate_limit = rate_limit;

        let store = MemoryStore::new();
        let links = Arc::new(CapturedLinks::default());
        let state = AppState::with_reset_sink(config, Arc::new(store.clone()), links.clone())
            .expect("Failed to build application state");

        let app = depot_server::routes::app(state.clone());
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .expect("Test server failed");
        });

        Self {
            addr,
            state,
            store,
            links,
        }
    }

    /// Absolute URL for `path` on this server.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// A client with its own cookie jar that does not follow redirects.
    pub fn client() -> Client {
        Client::builder()
            .cookie_store(true)
            .redirect(redirect::Policy::none())
            .build()
            .expect("Failed to create HTTP client")
    }

    /// Create an account directly through the service layer.
    pub async fn create_account(&self, email: &str, password: &str, role: Role) {
        self.state
            .auth()
            .create_account(email, password, role)
            .await
            .expect("Failed to create account");
    }

    pub async fn register(&self, client: &Client, email: &str, password: &str) -> Response {
        client
            .post(self.url("/register"))
            .form(&[
                ("email", email),
                ("password", password),
                ("confirm_password", password),
            ])
            .send()
            .await
            .expect("Register request failed")
    }

    pub async fn login(&self, client: &Client, email: &str, password: &str) -> Response {
        client
            .post(self.url("/login"))
            .form(&[("email", email), ("password", password)])
            .send()
            .await
            .expect("Login request failed")
    }

    pub async fn me(&self, client: &Client) -> Response {
        client
            .get(self.url("/api/me"))
            .send()
            .await
            .expect("Identity request failed")
    }

    /// Log in as a fresh admin and return the signed-in client.
    pub async fn admin_client(&self) -> Client {
        self.create_account("admin@depot.test", "admin-password", Role::Admin)
            .await;
        let client = Self::client();
        let response = self.login(&client, "admin@depot.test", "admin-password").await;
        assert!(response.status().is_redirection());
        client
    }
}
