//! Bounded connection pool for external backends.

use crate::error::{CoreError, CoreResult};
use parking_lot::{Condvar, Mutex};
use std::time::Duration;

/// Connection lifecycle hooks a backend provides.
pub trait ConnectionFactory: Send + Sync {
    /// The connection type.
    type Conn: Send;

    /// Opens a new connection.
    fn create_connection(&self) -> CoreResult<Self::Conn>;

    /// Closes a connection.
    fn close_connection(&self, conn: Self::Conn);

    /// Whether a pooled connection is still usable.
    fn is_valid(&self, conn: &Self::Conn) -> bool;
}

/// Pool sizing and wait behavior.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Connections opened up front and kept alive.
    pub min: usize,
    /// Upper bound on open connections.
    pub max: usize,
    /// How long `acquire` waits for a free slot before `PoolTimeout`.
    pub wait_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min: 1,
            max: 8,
            wait_timeout: Duration::from_secs(5),
        }
    }
}

struct PoolState<C> {
    idle: Vec<C>,
    /// Open connections, idle and handed out.
    total: usize,
}

/// A bounded pool of reusable connections.
///
/// Invalid connections are recycled: dropped on return or on acquire, and
/// replaced by fresh ones as demand requires. Waiting past the configured
/// timeout fails with `PoolTimeout`.
pub struct ConnectionPool<F: ConnectionFactory> {
    factory: F,
    config: PoolConfig,
    state: Mutex<PoolState<F::Conn>>,
    available: Condvar,
}

impl<F: ConnectionFactory> ConnectionPool<F> {
    /// Creates a pool, opening `min` connections up front.
    pub fn new(factory: F, config: PoolConfig) -> CoreResult<Self> {
        let mut idle = Vec::with_capacity(config.min);
        for _ in 0..config.min {
            idle.push(factory.create_connection()?);
        }
        let total = idle.len();
        Ok(Self {
            factory,
            config,
            state: Mutex::new(PoolState { idle, total }),
            available: Condvar::new(),
        })
    }

    /// Borrows a connection, waiting up to the configured timeout.
    pub fn acquire(&self) -> CoreResult<PooledConn<'_, F>> {
        let mut state = self.state.lock();
        loop {
            // Reuse an idle connection, recycling stale ones.
            while let Some(conn) = state.idle.pop() {
                if self.factory.is_valid(&conn) {
                    return Ok(PooledConn {
                        pool: self,
                        conn: Some(conn),
                    });
                }
                state.total -= 1;
                self.factory.close_connection(conn);
            }
            if state.total < self.config.max {
                state.total += 1;
                drop(state);
                match self.factory.create_connection() {
                    Ok(conn) => {
                        return Ok(PooledConn {
                            pool: self,
                            conn: Some(conn),
                        })
                    }
                    Err(err) => {
                        self.state.lock().total -= 1;
                        self.available.notify_one();
                        return Err(err);
                    }
                }
            }
            let timed_out = self
                .available
                .wait_for(&mut state, self.config.wait_timeout)
                .timed_out();
            if timed_out && state.idle.is_empty() && state.total >= self.config.max {
                return Err(CoreError::PoolTimeout);
            }
        }
    }

    /// Open connections, idle and handed out.
    #[must_use]
    pub fn size(&self) -> usize {
        self.state.lock().total
    }

    /// Idle connections available for reuse.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.state.lock().idle.len()
    }

    fn put_back(&self, conn: F::Conn) {
        let mut state = self.state.lock();
        if self.factory.is_valid(&conn) {
            state.idle.push(conn);
        } else {
            state.total -= 1;
            self.factory.close_connection(conn);
        }
        self.available.notify_one();
    }
}

/// A borrowed connection; returns to the pool on drop.
pub struct PooledConn<'a, F: ConnectionFactory> {
    pool: &'a ConnectionPool<F>,
    conn: Option<F::Conn>,
}

impl<F: ConnectionFactory> std::ops::Deref for PooledConn<'_, F> {
    type Target = F::Conn;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("present until drop")
    }
}

impl<F: ConnectionFactory> std::ops::DerefMut for PooledConn<'_, F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("present until drop")
    }
}

impl<F: ConnectionFactory> Drop for PooledConn<'_, F> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.put_back(conn);
        }
    }
}
