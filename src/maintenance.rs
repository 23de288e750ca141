use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::Config;
use crate::engine::FleetStore;

/// Background task that compacts the WAL once enough appends pile up.
pub async fn run_compactor(store: Arc<FleetStore>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        compact_if_due(&store, threshold).await;
    }
}

/// One compactor pass. Returns whether a compaction ran.
pub async fn compact_if_due(store: &FleetStore, threshold: u64) -> bool {
    let appends = store.wal_appends_since_compact().await;
    if appends < threshold {
        debug!("compactor skip: {appends} appends since last compaction");
        return false;
    }
    match store.compact_wal().await {
        Ok(()) => true,
        Err(e) => {
            warn!("WAL compaction failed: {e}");
            false
        }
    }
}

/// Spawn the compactor with the thresholds from `config`. The caller owns
/// the handle and aborts it on shutdown.
pub fn spawn_compactor(store: Arc<FleetStore>, config: &Config) -> JoinHandle<()> {
    tokio::spawn(run_compactor(
        store,
        config.compact_threshold,
        config.compact_interval,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use crate::wal::Wal;
    use std::path::PathBuf;

    const MON: Ms = 1_767_571_200_000;
    const H: Ms = 3_600_000;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("rental_test_maintenance");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    async fn churned_store(path: PathBuf) -> Arc<FleetStore> {
        let store = Arc::new(FleetStore::open(path).unwrap());
        let vin = Vin::parse("1HGCM82633A004352").unwrap();
        store
            .provision_vehicle(vin.clone(), StoreName::Airport, "Airport".into(), CarType::Compact)
            .await
            .unwrap();
        for day in 0..5 {
            let start = MON + day * 24 * H;
            store
                .commit_reservation(&vin, Span::new(start, start + 2 * H))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn compactor_waits_for_threshold() {
        let store = churned_store(test_wal_path("below_threshold.wal")).await;
        assert!(!compact_if_due(&store, 100).await);
        assert_eq!(store.wal_appends_since_compact().await, 6);
    }

    #[tokio::test]
    async fn compactor_compacts_past_threshold() {
        let path = test_wal_path("past_threshold.wal");
        let store = churned_store(path.clone()).await;
        assert!(compact_if_due(&store, 6).await);
        assert_eq!(store.wal_appends_since_compact().await, 0);

        // One provisioning + the surviving reservation.
        assert_eq!(Wal::replay(&path).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn spawned_compactor_runs_on_interval() {
        let path = test_wal_path("spawned.wal");
        let store = churned_store(path.clone()).await;
        let config = Config {
            compact_threshold: 1,
            compact_interval: Duration::from_millis(10),
            ..Config::default()
        };
        let handle = spawn_compactor(store.clone(), &config);

        let mut compacted = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if store.wal_appends_since_compact().await == 0 {
                compacted = true;
                break;
            }
        }
        handle.abort();
        assert!(compacted);
    }
}
