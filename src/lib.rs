//! # Sitewatcher
//!
//! A multi-tenant control plane for website post discovery. Organizations
//! register sites to watch, crawling is delegated to an external discovery
//! worker, and discovered items plus run history are tracked per site.
//!
//! Usable as a standalone binary or as a library:
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sitewatcher::auth::{SessionKeys, TokenGenerator};
//! use sitewatcher::server::{AppState, create_router};
//! use sitewatcher::store::{SqliteStore, Store};
//! use sitewatcher::worker::WorkerClient;
//!
//! let store = SqliteStore::new("./data/sitewatcher.db")?;
//! store.initialize()?;
//!
//! let state = Arc::new(AppState {
//!     store: Arc::new(store),
//!     gateway: Arc::new(WorkerClient::new("https://worker.example.dev")?),
//!     sessions: SessionKeys::new(b"secret"),
//!     tokens: TokenGenerator::new(),
//!     public_base_url: "http://localhost:3000".to_string(),
//! });
//! let router = create_router(state);
//! // Serve with axum...
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod server;
pub mod store;
pub mod types;
pub mod worker;
