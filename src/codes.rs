//! TTL store for numeric handoff fallback codes.
//!
//! When a visitor's device cannot scan the QR code, the desktop shows a
//! short numeric code instead. The code maps to the signed verify token and
//! lives in Redis with a native TTL, so it survives restarts and works
//! across instances. Redemption is atomic (`GETDEL`): a code is single-use.

use rand::Rng;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::Client;
use thiserror::Error;

const KEY_PREFIX: &str = "handoff:code:";
const ALLOC_ATTEMPTS: usize = 8;

#[derive(Debug, Error)]
pub enum CodeError {
    #[error("code store unavailable: {0}")]
    Store(#[from] redis::RedisError),
    #[error("could not allocate a unique code")]
    Exhausted,
}

#[derive(Clone)]
pub struct CodeStore {
    conn: ConnectionManager,
}

impl CodeStore {
    pub async fn connect(redis_url: &str) -> Result<Self, CodeError> {
        let config = ConnectionManagerConfig::new().set_number_of_retries(1);
        let client = Client::open(redis_url)?;
        let conn = client.get_connection_manager_with_config(config).await?;
        Ok(Self { conn })
    }

    /// Store `token` under a fresh 6-digit code with the given TTL.
    pub async fn put(&self, token: &str, ttl_secs: u64) -> Result<String, CodeError> {
        let mut conn = self.conn.clone();
        for _ in 0..ALLOC_ATTEMPTS {
            let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32));
            // NX so a live code is never overwritten.
            let set: Option<String> = redis::cmd("SET")
                .arg(format!("{KEY_PREFIX}{code}"))
                .arg(token)
                .arg("NX")
                .arg("EX")
                .arg(ttl_secs)
                .query_async(&mut conn)
                .await?;
            if set.is_some() {
                return Ok(code);
            }
        }
        Err(CodeError::Exhausted)
    }

    /// Redeem a code for its token, consuming it.
    pub async fn take(&self, code: &str) -> Result<Option<String>, CodeError> {
        let mut conn = self.conn.clone();
        let token: Option<String> = redis::cmd("GETDEL")
            .arg(format!("{KEY_PREFIX}{code}"))
            .query_async(&mut conn)
            .await?;
        Ok(token)
    }
}
