//! PostgreSQL connection pool
//!
//! Fixed-capacity pool over `postgres::Client`. Connections are created
//! lazily up to the cap; `acquire` blocks on a condvar until a connection
//! frees up or the deadline passes (`PoolExhausted`). The statement
//! timeout is a per-connection session setting applied once at creation,
//! not per query.
//!
//! The guard returns its connection on drop. Callers that observe a
//! broken connection mark the guard, which discards the connection and
//! frees its slot instead of recycling it.

use crate::error::{DialectError, Result};
use postgres::{Client, NoTls};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// libpq-style connection string.
    pub connection_string: String,
    pub max_connections: usize,
    /// How long `acquire` may block before `PoolExhausted`.
    pub acquire_timeout: Duration,
    /// Session statement timeout, applied once per connection.
    pub statement_timeout: Option<Duration>,
}

impl PoolConfig {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            max_connections: 8,
            acquire_timeout: Duration::from_secs(10),
            statement_timeout: Some(Duration::from_secs(30)),
        }
    }
}

struct PoolState {
    idle: Vec<Client>,
    /// Connections alive (idle + checked out).
    total: usize,
}

/// Fixed-capacity client pool.
pub struct ClientPool {
    config: PoolConfig,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl ClientPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                total: 0,
            }),
            available: Condvar::new(),
        }
    }

    fn connect(&self) -> Result<Client> {
        let mut client = Client::connect(&self.config.connection_string, NoTls)
            .map_err(|e| DialectError::Connection(e.to_string()))?;
        if let Some(timeout) = self.config.statement_timeout {
            client
                .batch_execute(&format!(
                    "SET statement_timeout = {}",
                    timeout.as_millis()
                ))
                .map_err(|e| DialectError::Connection(e.to_string()))?;
        }
        debug!("opened postgres connection");
        Ok(client)
    }

    /// Borrow a connection, blocking up to the configured timeout.
    pub fn acquire(&self) -> Result<PooledClient<'_>> {
        let deadline = Instant::now() + self.config.acquire_timeout;
        let mut state = self.state.lock().expect("pool mutex poisoned");

        loop {
            if let Some(client) = state.idle.pop() {
                return Ok(PooledClient {
                    pool: self,
                    client: Some(client),
                    broken: false,
                });
            }
            if state.total < self.config.max_connections {
                state.total += 1;
                // Connect outside the lock; other callers keep making
                // progress while we dial.
                drop(state);
                match self.connect() {
                    Ok(client) => {
                        return Ok(PooledClient {
                            pool: self,
                            client: Some(client),
                            broken: false,
                        })
                    }
                    Err(e) => {
                        let mut state = self.state.lock().expect("pool mutex poisoned");
                        state.total -= 1;
                        self.available.notify_one();
                        return Err(e);
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(DialectError::PoolExhausted {
                    waited_ms: self.config.acquire_timeout.as_millis() as u64,
                });
            }
            let (next, timeout) = self
                .available
                .wait_timeout(state, deadline - now)
                .expect("pool mutex poisoned");
            state = next;
            if timeout.timed_out() && state.idle.is_empty() {
                return Err(DialectError::PoolExhausted {
                    waited_ms: self.config.acquire_timeout.as_millis() as u64,
                });
            }
        }
    }

    fn release(&self, client: Option<Client>, broken: bool) {
        let mut state = self.state.lock().expect("pool mutex poisoned");
        match client {
            Some(client) if !broken => state.idle.push(client),
            _ => {
                // Broken connections free their slot; a replacement is
                // dialed lazily by the next acquirer.
                state.total -= 1;
                if broken {
                    warn!("discarded broken postgres connection");
                }
            }
        }
        self.available.notify_one();
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

/// Guard over a borrowed connection.
pub struct PooledClient<'a> {
    pool: &'a ClientPool,
    client: Option<Client>,
    broken: bool,
}

impl PooledClient<'_> {
    pub fn client(&mut self) -> &mut Client {
        self.client.as_mut().expect("client taken")
    }

    /// Mark this connection unusable; it is discarded instead of recycled.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }
}

impl Drop for PooledClient<'_> {
    fn drop(&mut self) {
        self.pool.release(self.client.take(), self.broken);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Pool behaviour that doesn't need a live server: exhaustion timing.
    #[test]
    fn acquire_fails_fast_when_server_is_unreachable() {
        let pool = ClientPool::new(PoolConfig {
            connection_string: "host=127.0.0.1 port=1 user=nobody connect_timeout=1".into(),
            max_connections: 1,
            acquire_timeout: Duration::from_millis(50),
            statement_timeout: None,
        });
        let err = pool.acquire().err().expect("unreachable server");
        assert!(matches!(err, DialectError::Connection(_)));
        // The failed dial must have freed its slot.
        assert_eq!(pool.state.lock().unwrap().total, 0);
    }
}
