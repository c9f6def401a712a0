use std::future::Future;
use std::io;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Upper bound on a single connection attempt.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum DialFailure {
    #[error("dial timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Connect(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnState {
    Up,
    Down,
}

impl ConnState {
    pub fn value(self) -> f64 {
        match self {
            Self::Up => 1.0,
            Self::Down => 0.0,
        }
    }
}

#[derive(Debug)]
pub struct DialReport {
    pub state: ConnState,
    pub latency: Duration,
    pub failure: Option<DialFailure>,
}

/// Dials `endpoint` once and closes the connection if one was made.
///
/// Latency covers the attempt itself, so a failed dial reports its time to
/// failure (up to `limit` on timeout).
pub async fn dial(endpoint: &str, limit: Duration) -> DialReport {
    let report = observe(limit, TcpStream::connect(endpoint)).await;
    if report.state == ConnState::Up {
        tracing::debug!(endpoint = %endpoint, latency = ?report.latency, "dial succeeded");
    }
    report
}

async fn observe<F, C>(limit: Duration, connect: F) -> DialReport
where
    F: Future<Output = io::Result<C>>,
{
    let start = Instant::now();
    let attempt = timeout(limit, connect).await;
    let latency = start.elapsed();

    match attempt {
        Ok(Ok(conn)) => {
            drop(conn);
            DialReport {
                state: ConnState::Up,
                latency,
                failure: None,
            }
        }
        Ok(Err(err)) => DialReport {
            state: ConnState::Down,
            latency,
            failure: Some(DialFailure::Connect(err)),
        },
        Err(_) => DialReport {
            state: ConnState::Down,
            latency,
            failure: Some(DialFailure::Timeout(limit)),
        },
    }
}
