//! Redis client wrapper shared by the store repositories.

use redis::aio::MultiplexedConnection;

use crate::error::StoreResult;

/// Thin wrapper over the Redis client with env-based construction.
#[derive(Clone)]
pub struct StoreClient {
    client: redis::Client,
}

impl StoreClient {
    /// Create a new store client.
    pub fn new(redis_url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// Create from the `REDIS_URL` environment variable.
    pub fn from_env() -> StoreResult<Self> {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        Self::new(&redis_url)
    }

    /// Open a multiplexed connection.
    pub async fn conn(&self) -> StoreResult<MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}
