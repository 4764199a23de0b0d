mod container_pool;
mod manager;
mod types;

pub use container_pool::{ContainerPool, Lease};
pub use manager::{PoolConfigResolver, PoolManager};
pub use types::PoolConfig;
