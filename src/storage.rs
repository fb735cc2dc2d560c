//! 浏览器 localStorage 上的战绩存储。

use serde::{Deserialize, Serialize};

use crate::game::{AggregateStats, GameResult, StatsStore};

const STATS_KEY: &str = "mjc_stats";
const TUTORIAL_KEY: &str = "mjc_tutorial_done";

/// localStorage 中的存储格式，字段名与旧版前端保持一致。
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
struct StoredStats {
    wins: u32,
    total: u32,
    captures: u32,
    evos: u32,
}

impl From<StoredStats> for AggregateStats {
    fn from(stored: StoredStats) -> Self {
        AggregateStats {
            wins: stored.wins,
            total: stored.total,
            captures: stored.captures,
            evolutions: stored.evos,
        }
    }
}

impl From<AggregateStats> for StoredStats {
    fn from(stats: AggregateStats) -> Self {
        StoredStats {
            wins: stats.wins,
            total: stats.total,
            captures: stats.captures,
            evos: stats.evolutions,
        }
    }
}

fn decode(raw: Option<&str>) -> AggregateStats {
    raw.and_then(|json| serde_json::from_str::<StoredStats>(json).ok())
        .unwrap_or_default()
        .into()
}

fn encode(stats: AggregateStats) -> Result<String, serde_json::Error> {
    serde_json::to_string(&StoredStats::from(stats))
}

pub struct LocalStorageStats {
    storage: web_sys::Storage,
}

impl LocalStorageStats {
    /// 非浏览器环境或存储不可用时返回 `None`。
    pub fn open() -> Option<Self> {
        if !cfg!(target_arch = "wasm32") {
            return None;
        }
        let storage = web_sys::window()?.local_storage().ok()??;
        Some(Self { storage })
    }

    fn update(&mut self, apply: impl FnOnce(&mut AggregateStats)) {
        let mut stats = self.read_aggregate();
        apply(&mut stats);
        let written = encode(stats)
            .map_err(|error| error.to_string())
            .and_then(|json| {
                self.storage
                    .set_item(STATS_KEY, &json)
                    .map_err(|error| format!("{error:?}"))
            });
        if let Err(error) = written {
            tracing::warn!(%error, "failed to persist stats");
        }
    }
}

impl StatsStore for LocalStorageStats {
    fn record_outcome(&mut self, result: GameResult) {
        self.update(|stats| {
            stats.total += 1;
            if result == GameResult::Win {
                stats.wins += 1;
            }
        });
    }

    fn record_capture(&mut self) {
        self.update(|stats| stats.captures += 1);
    }

    fn record_evolution(&mut self) {
        self.update(|stats| stats.evolutions += 1);
    }

    fn read_aggregate(&self) -> AggregateStats {
        let raw = self.storage.get_item(STATS_KEY).ok().flatten();
        decode(raw.as_deref())
    }

    fn tutorial_seen(&self) -> bool {
        matches!(self.storage.get_item(TUTORIAL_KEY), Ok(Some(_)))
    }

    fn mark_tutorial_seen(&mut self) {
        if let Err(error) = self.storage.set_item(TUTORIAL_KEY, "true") {
            tracing::warn!(?error, "failed to persist tutorial flag");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_record_decodes() {
        let stats = decode(Some(r#"{"wins":2,"total":5,"captures":17,"evos":1}"#));
        assert_eq!(
            stats,
            AggregateStats {
                wins: 2,
                total: 5,
                captures: 17,
                evolutions: 1,
            }
        );
    }

    #[test]
    fn missing_or_corrupt_record_starts_from_zero() {
        assert_eq!(decode(None), AggregateStats::default());
        assert_eq!(decode(Some("not json")), AggregateStats::default());
        assert_eq!(decode(Some(r#"{"wins":1}"#)).wins, 1);
    }

    #[test]
    fn encode_uses_legacy_field_names() {
        let json = encode(AggregateStats {
            wins: 1,
            total: 1,
            captures: 0,
            evolutions: 3,
        })
        .expect("stats encode");
        assert!(json.contains(r#""evos":3"#));
    }

    #[test]
    fn unavailable_outside_the_browser() {
        assert!(LocalStorageStats::open().is_none());
    }
}
