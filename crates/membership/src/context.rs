//! Process-scoped engine context
//!
//! Built once at startup and passed explicitly to every entry point, so the
//! engine can run against fakes without a live Discord session.

use std::sync::Arc;

use crate::clock::{DAY_MS, WARN_WINDOW_MS};
use crate::ports::{BackupPort, MembershipStore, NotificationPort, RolePort};

/// Default price of one month of Prime, in GP
pub const DEFAULT_MONTHLY_PRICE: i64 = 1000;

/// Tunables for the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Revenue recognized per purchased month
    pub price_per_month: i64,
    /// How long before expiry the single warning becomes due
    pub warn_window_ms: i64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            price_per_month: DEFAULT_MONTHLY_PRICE,
            warn_window_ms: WARN_WINDOW_MS,
        }
    }
}

impl EngineSettings {
    pub fn with_warn_window_days(mut self, days: u32) -> Self {
        self.warn_window_ms = i64::from(days) * DAY_MS;
        self
    }

    pub fn with_price_per_month(mut self, price: i64) -> Self {
        self.price_per_month = price;
        self
    }
}

#[derive(Clone)]
pub struct MembershipContext {
    pub store: Arc<dyn MembershipStore>,
    pub roles: Arc<dyn RolePort>,
    pub notifier: Arc<dyn NotificationPort>,
    pub backup: Arc<dyn BackupPort>,
    pub settings: EngineSettings,
}

impl MembershipContext {
    pub fn new(
        store: Arc<dyn MembershipStore>,
        roles: Arc<dyn RolePort>,
        notifier: Arc<dyn NotificationPort>,
        backup: Arc<dyn BackupPort>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            roles,
            notifier,
            backup,
            settings,
        }
    }
}
