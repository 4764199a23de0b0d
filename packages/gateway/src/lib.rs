//! Lambda-compatible HTTP gateway: admission, routing, and pool-backed
//! invocation. Exposed as a library so `main.rs` and the orchestrator
//! integration tests can both drive [`api::router`] against an
//! [`state::AppState`].

pub mod api;
pub mod auth;
pub mod event;
pub mod invoker;
pub mod janitor;
pub mod state;
