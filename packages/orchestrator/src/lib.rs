//! The Orchestrator: owns the container runtime on behalf of the Gateway.
//! Exposed as a library so integration tests can mount [`api::router`]
//! in-process against a [`runtime::FakeRuntime`].

pub mod api;
pub mod config;
pub mod runtime;
pub mod service;

pub use config::OrchestratorSettings;
pub use service::OrchestratorService;
