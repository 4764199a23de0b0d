//! Process-wide settings (env-sourced) and the route/function config files
//! (YAML-sourced), mirroring the teacher's `JwtConfig::from_env` pattern of
//! validating at construction time rather than deep in request handling.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Process-wide settings read once at startup. Immutable after load; a
/// fresh process is required to pick up changed environment variables.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub bind_addr: String,
    pub auth_username: String,
    pub auth_password: String,
    pub auth_api_key: String,
    pub jwt_secret: String,
    pub jwt_ttl_secs: u64,
    pub routes_file: String,
    pub functions_file: String,
    pub orchestrator_url: String,
    pub cache_ttl_secs: u64,
    pub cache_size: usize,
    pub pool_max: usize,
    pub pool_min: usize,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub breaker_threshold: u32,
    pub breaker_recovery_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub grace_period_secs: u64,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl GatewaySettings {
    /// Build settings from environment variables, falling back to the
    /// documented defaults. `GATEWAY_JWT_SECRET` is mandatory: a missing or
    /// too-weak secret is a fatal `ConfigError` at startup, matching the
    /// weak-secret rejection the teacher applies to `JWT_SECRET`.
    pub fn from_env() -> Result<Self, GatewayError> {
        let jwt_secret = env_var("GATEWAY_JWT_SECRET")
            .ok_or_else(|| GatewayError::ConfigError("GATEWAY_JWT_SECRET is required".to_string()))?;
        if jwt_secret.len() < 32 {
            return Err(GatewayError::ConfigError(
                "GATEWAY_JWT_SECRET must be at least 32 characters".to_string(),
            ));
        }

        let log_format = match env_var("GATEWAY_LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            bind_addr: env_var("GATEWAY_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            auth_username: env_var("GATEWAY_AUTH_USERNAME").unwrap_or_else(|| "admin".to_string()),
            auth_password: env_var("GATEWAY_AUTH_PASSWORD").unwrap_or_else(|| "admin".to_string()),
            auth_api_key: env_var("GATEWAY_AUTH_API_KEY").unwrap_or_default(),
            jwt_secret,
            jwt_ttl_secs: env_parse("GATEWAY_JWT_TTL_SECS", 3600),
            routes_file: env_var("GATEWAY_ROUTES_FILE").unwrap_or_else(|| "routes.yaml".to_string()),
            functions_file: env_var("GATEWAY_FUNCTIONS_FILE").unwrap_or_else(|| "functions.yaml".to_string()),
            orchestrator_url: env_var("GATEWAY_ORCHESTRATOR_URL")
                .unwrap_or_else(|| "http://127.0.0.1:9090".to_string()),
            cache_ttl_secs: env_parse("GATEWAY_CACHE_TTL_SECS", 300),
            cache_size: env_parse("GATEWAY_CACHE_SIZE", 256),
            pool_max: env_parse("GATEWAY_POOL_MAX", 4),
            pool_min: env_parse("GATEWAY_POOL_MIN", 0),
            acquire_timeout_secs: env_parse("GATEWAY_ACQUIRE_TIMEOUT_SECS", 10),
            idle_timeout_secs: env_parse("GATEWAY_IDLE_TIMEOUT_SECS", 300),
            breaker_threshold: env_parse("GATEWAY_BREAKER_THRESHOLD", 5),
            breaker_recovery_secs: env_parse("GATEWAY_BREAKER_RECOVERY_SECS", 30),
            heartbeat_interval_secs: env_parse("GATEWAY_HEARTBEAT_INTERVAL_SECS", 30),
            grace_period_secs: env_parse("GATEWAY_GRACE_PERIOD_SECS", 60),
            log_format,
        })
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn breaker_recovery_window(&self) -> Duration {
        Duration::from_secs(self.breaker_recovery_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env_var(name).and_then(|s| s.parse().ok()).unwrap_or(default)
}

/// A single function's configuration: optional container image and merged
/// environment. Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionConfig {
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub environment: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct FunctionRegistryFile {
    #[serde(default)]
    defaults: DefaultsFile,
    functions: HashMap<String, FunctionEntryFile>,
}

#[derive(Debug, Default, Deserialize)]
struct DefaultsFile {
    #[serde(default)]
    environment: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct FunctionEntryFile {
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    environment: HashMap<String, String>,
}

/// Function name → `FunctionConfig`, with each entry's environment merged
/// over `defaults.environment` at load time.
#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    functions: HashMap<String, FunctionConfig>,
}

impl FunctionRegistry {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let raw = fs::read_to_string(path.as_ref())
            .map_err(|e| GatewayError::ConfigError(format!("reading {}: {e}", path.as_ref().display())))?;
        let file: FunctionRegistryFile = serde_yaml::from_str(&raw)
            .map_err(|e| GatewayError::ConfigError(format!("parsing {}: {e}", path.as_ref().display())))?;

        let functions = file
            .functions
            .into_iter()
            .map(|(name, entry)| {
                let mut environment = file.defaults.environment.clone();
                environment.extend(entry.environment);
                (
                    name.clone(),
                    FunctionConfig {
                        name,
                        image: entry.image,
                        environment,
                    },
                )
            })
            .collect();

        Ok(Self { functions })
    }

    pub fn get(&self, name: &str) -> Option<&FunctionConfig> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.functions.keys().map(String::as_str).collect()
    }

    /// Build a registry directly from already-constructed entries, for
    /// tests that don't want to round-trip through a YAML fixture file.
    pub fn load_from_map(functions: HashMap<String, FunctionConfig>) -> Self {
        Self { functions }
    }
}

#[derive(Debug, Deserialize)]
struct RouteFile {
    method: String,
    path: String,
    function: String,
}

#[derive(Debug, Deserialize)]
struct RouteTableFile {
    routes: Vec<RouteFile>,
}

/// An ordered, validated route table loaded from YAML. Validation rejects
/// duplicate (method, path) pairs and routes pointing at an unknown
/// function so that a bad config file fails fast at startup rather than
/// producing silent 404s at request time.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<crate::routing::Route>,
}

impl RouteTable {
    pub fn load(path: impl AsRef<Path>, functions: &FunctionRegistry) -> Result<Self, GatewayError> {
        let raw = fs::read_to_string(path.as_ref())
            .map_err(|e| GatewayError::ConfigError(format!("reading {}: {e}", path.as_ref().display())))?;
        let file: RouteTableFile = serde_yaml::from_str(&raw)
            .map_err(|e| GatewayError::ConfigError(format!("parsing {}: {e}", path.as_ref().display())))?;

        let mut seen = std::collections::HashSet::new();
        let mut routes = Vec::with_capacity(file.routes.len());
        for entry in file.routes {
            if !functions.contains(&entry.function) {
                return Err(GatewayError::ConfigError(format!(
                    "route {} {} references unknown function {}",
                    entry.method, entry.path, entry.function
                )));
            }
            let route = crate::routing::Route::new(&entry.method, &entry.path, &entry.function)
                .map_err(|e| GatewayError::ConfigError(e.to_string()))?;
            let key = (route.method.clone(), route.pattern.clone());
            if !seen.insert(key) {
                return Err(GatewayError::ConfigError(format!(
                    "duplicate route {} {}",
                    entry.method, entry.path
                )));
            }
            routes.push(route);
        }

        Ok(Self { routes })
    }

    /// An empty route table, for tests that only exercise the direct
    /// invocation path and never need the catch-all route match.
    pub fn empty() -> Self {
        Self { routes: Vec::new() }
    }

    /// First-match-wins lookup over the ordered route list.
    pub fn match_route(&self, method: &str, path: &str) -> Option<crate::routing::RouteMatch> {
        self.routes.iter().find_map(|route| route.matches(method, path))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
