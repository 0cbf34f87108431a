//! One credential bound to one downloader

use std::time::Duration;

use github_client::Downloader;

/// Rate usage of one credential over a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RateUsage {
    /// Requests sent through the credential.
    pub used: u64,
    /// Requests per minute over the run's elapsed time.
    pub speed: f64,
}

/// A worker is one credential's downloader plus its position in the pool.
///
/// The request counter inside the client is atomic, so a worker's usage can
/// be read at end-of-run even if the lease that last used it just released.
/// Everything else is only touched by whichever caller holds the lease.
pub struct CredentialWorker {
    index: usize,
    downloader: Downloader,
}

impl CredentialWorker {
    pub fn new(index: usize, downloader: Downloader) -> Self {
        Self { index, downloader }
    }

    /// Position in the pool, stable for the pool's lifetime.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn downloader(&self) -> &Downloader {
        &self.downloader
    }

    /// Usage over `elapsed`, typically the whole run.
    pub fn rate_usage(&self, elapsed: Duration) -> RateUsage {
        let used = self.downloader.requests_used();
        let minutes = elapsed.as_secs_f64() / 60.0;
        let speed = if minutes > 0.0 {
            used as f64 / minutes
        } else {
            0.0
        };
        RateUsage { used, speed }
    }
}
