//! On-disk representation of the visitor stats

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::warn;

use super::stats::{DailyBucket, VisitorStats};
use crate::error::{Result, StorageError};
use crate::fsutil;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Persisted stats document. Missing or `null` fields read as empty/zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsDocument {
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_visits: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub unique_visitors: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub daily_stats: BTreeMap<String, DailyDocument>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub page_views: BTreeMap<String, u64>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyDocument {
    #[serde(default, deserialize_with = "null_as_default")]
    pub visits: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub unique_visitors: Vec<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn sorted(set: &HashSet<String>) -> Vec<String> {
    let mut items: Vec<String> = set.iter().cloned().collect();
    items.sort();
    items
}

impl StatsDocument {
    /// Snapshot the in-memory aggregate for writing.
    pub fn capture(stats: &VisitorStats, now: DateTime<Utc>) -> Self {
        let daily_stats = stats
            .daily_stats
            .iter()
            .map(|(date, bucket)| {
                (
                    date.format(DATE_FORMAT).to_string(),
                    DailyDocument {
                        visits: bucket.visits,
                        unique_visitors: sorted(&bucket.unique_visitors),
                    },
                )
            })
            .collect();

        Self {
            total_visits: stats.total_visits,
            unique_visitors: sorted(&stats.unique_visitors),
            daily_stats,
            page_views: stats.page_views.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            last_updated: Some(now),
        }
    }

    /// Rebuild the in-memory aggregate. Day keys that are not `YYYY-MM-DD` are skipped.
    pub fn into_stats(self) -> VisitorStats {
        let mut daily_stats = BTreeMap::new();
        for (key, day) in self.daily_stats {
            match NaiveDate::parse_from_str(&key, DATE_FORMAT) {
                Ok(date) => {
                    daily_stats.insert(
                        date,
                        DailyBucket {
                            visits: day.visits,
                            unique_visitors: day.unique_visitors.into_iter().collect(),
                        },
                    );
                }
                Err(_) => warn!("Skipping daily stats entry with invalid date key {:?}", key),
            }
        }

        VisitorStats {
            total_visits: self.total_visits,
            unique_visitors: self.unique_visitors.into_iter().collect(),
            daily_stats,
            page_views: self.page_views.into_iter().collect(),
        }
    }
}

/// The JSON file holding [`StatsDocument`]
#[derive(Debug, Clone)]
pub struct StatsFile {
    path: PathBuf,
}

impl StatsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when the file does not exist yet, `Corrupt` when it cannot be parsed.
    pub async fn load(&self) -> Result<Option<StatsDocument>> {
        let Some(contents) = fsutil::read_optional(&self.path).await? else {
            return Ok(None);
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| StorageError::Corrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }

    pub async fn save(&self, document: &StatsDocument) -> Result<()> {
        fsutil::write_json(&self.path, document).await
    }

    /// Move an unreadable file aside as `<name>.corrupt-<timestamp>` and return the new path.
    /// A `-<n>` suffix keeps earlier quarantined files from the same second.
    pub async fn quarantine(&self, now: DateTime<Utc>) -> Result<PathBuf> {
        let mut base = self.path.file_name().unwrap_or_default().to_os_string();
        base.push(format!(".corrupt-{}", now.format("%Y%m%dT%H%M%S")));

        let mut target = self.path.with_file_name(&base);
        let mut n = 0;
        while tokio::fs::try_exists(&target)
            .await
            .map_err(|e| StorageError::io(&target, e))?
        {
            n += 1;
            let mut name = base.clone();
            name.push(format!("-{}", n));
            target = self.path.with_file_name(name);
        }

        tokio::fs::rename(&self.path, &target)
            .await
            .map_err(|e| StorageError::io(&self.path, e))?;
        Ok(target)
    }
}
