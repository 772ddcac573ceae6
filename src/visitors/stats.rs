//! In-memory visitor aggregate: totals, daily buckets and page views

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Number of base64 characters of the user agent kept in a fingerprint
const USER_AGENT_PREFIX: usize = 10;

/// Who made a request, as seen by the HTTP layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitorInfo {
    pub address: String,
    pub user_agent: String,
}

impl VisitorInfo {
    pub fn new(address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            user_agent: user_agent.into(),
        }
    }

    /// Coarse visitor identity: `address-<first 10 chars of base64(user agent)>`.
    /// Collisions are expected and tolerated.
    pub fn fingerprint(&self) -> String {
        let encoded = STANDARD.encode(self.user_agent.as_bytes());
        let prefix = &encoded[..encoded.len().min(USER_AGENT_PREFIX)];
        format!("{}-{}", self.address, prefix)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DailyBucket {
    pub visits: u64,
    pub unique_visitors: HashSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisitorStats {
    pub total_visits: u64,
    pub unique_visitors: HashSet<String>,
    pub daily_stats: BTreeMap<NaiveDate, DailyBucket>,
    pub page_views: HashMap<String, u64>,
}

/// Rollup served to the rest of the application
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitorSummary {
    pub total_visits: u64,
    pub unique_visitors: usize,
    pub today_visits: u64,
    pub today_unique_visitors: usize,
}

impl VisitorStats {
    /// Count one page view and return the new total.
    pub fn record(&mut self, fingerprint: String, path: &str, today: NaiveDate) -> u64 {
        self.total_visits += 1;

        let bucket = self.daily_stats.entry(today).or_default();
        bucket.visits += 1;
        bucket.unique_visitors.insert(fingerprint.clone());

        self.unique_visitors.insert(fingerprint);

        *self.page_views.entry(path.to_string()).or_insert(0) += 1;

        self.total_visits
    }

    pub fn summary(&self, today: NaiveDate) -> VisitorSummary {
        let (today_visits, today_unique_visitors) = self
            .daily_stats
            .get(&today)
            .map(|b| (b.visits, b.unique_visitors.len()))
            .unwrap_or((0, 0));

        VisitorSummary {
            total_visits: self.total_visits,
            unique_visitors: self.unique_visitors.len(),
            today_visits,
            today_unique_visitors,
        }
    }

    /// Drop every daily bucket strictly older than `cutoff`. Returns how many were removed.
    pub fn prune_before(&mut self, cutoff: NaiveDate) -> usize {
        let before = self.daily_stats.len();
        self.daily_stats.retain(|date, _| *date >= cutoff);
        before - self.daily_stats.len()
    }
}
