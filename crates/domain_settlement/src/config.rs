//! Settlement configuration

use std::time::Duration;

use serde::Deserialize;

use core_kernel::{Currency, Timezone};
use domain_agent::DEFAULT_MAX_DEPTH;
use domain_commission::MAX_TIER_LEVEL;

use crate::error::SettlementError;
use crate::retry::{RetryPolicy, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAYS_MS};

/// Default time a worker may hold a run in `processing`
pub const DEFAULT_PROCESSING_LEASE_SECS: u64 = 900;

/// Longest accepted processing lease (one week)
const MAX_PROCESSING_LEASE_SECS: u64 = 7 * 24 * 60 * 60;

/// Worker pool, retry and ledger settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Number of queue workers
    pub worker_count: usize,
    /// Bound of the job channel
    pub queue_capacity: usize,
    /// Upline levels that earn commission, 1 to 5
    pub max_upline_depth: u8,
    pub max_retries: u32,
    pub retry_delays_ms: Vec<u64>,
    /// A run still `processing` this long after its claim is failed for
    /// operator retry
    pub processing_lease_secs: u64,
    pub currency: Currency,
    /// Calendar used for monthly batches
    pub business_timezone: Timezone,
    /// Smallest withdrawal in minor units
    pub min_withdrawal_minor: i64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            queue_capacity: 1024,
            max_upline_depth: DEFAULT_MAX_DEPTH,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delays_ms: DEFAULT_RETRY_DELAYS_MS.to_vec(),
            processing_lease_secs: DEFAULT_PROCESSING_LEASE_SECS,
            currency: Currency::MYR,
            business_timezone: Timezone::default(),
            min_withdrawal_minor: 0,
        }
    }
}

impl SettlementConfig {
    /// Rejects settings the engine and the worker pool cannot run with
    pub fn validate(&self) -> Result<(), SettlementError> {
        if self.max_upline_depth == 0 || self.max_upline_depth > MAX_TIER_LEVEL {
            return Err(SettlementError::InvalidConfig(format!(
                "max_upline_depth must be between 1 and {MAX_TIER_LEVEL}, got {}",
                self.max_upline_depth
            )));
        }
        if self.worker_count == 0 {
            return Err(SettlementError::InvalidConfig(
                "worker_count must be at least 1".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(SettlementError::InvalidConfig(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.processing_lease_secs == 0 || self.processing_lease_secs > MAX_PROCESSING_LEASE_SECS {
            return Err(SettlementError::InvalidConfig(format!(
                "processing_lease_secs must be between 1 and {MAX_PROCESSING_LEASE_SECS}, got {}",
                self.processing_lease_secs
            )));
        }
        if self.min_withdrawal_minor < 0 {
            return Err(SettlementError::InvalidConfig(format!(
                "min_withdrawal_minor must not be negative, got {}",
                self.min_withdrawal_minor
            )));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_delays_ms.clone())
    }

    pub fn processing_lease(&self) -> Duration {
        Duration::from_secs(self.processing_lease_secs)
    }
}
