//! Shared data model and core control-plane primitives for the gateway.
//!
//! This crate has no axum server of its own; it is imported by the
//! `gateway` and `orchestrator` binaries so that both sides of the
//! control plane agree on the `Worker` wire shape, the configuration
//! schema, and the pool/cache/breaker semantics.

pub mod breaker;
pub mod cache;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod routing;
pub mod trace;
pub mod worker;

pub use breaker::{CircuitBreaker, CircuitBreakerState};
pub use cache::HostCache;
pub use config::{FunctionConfig, FunctionRegistry, GatewaySettings, RouteTable};
pub use error::GatewayError;
pub use metrics::Metrics;
pub use pool::{ContainerPool, Lease, PoolConfig, PoolManager};
pub use routing::{Route, RouteMatch};
pub use worker::Worker;
