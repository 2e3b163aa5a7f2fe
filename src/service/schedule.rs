/// Daily rollover trigger.
///
/// The service never schedules itself. Hosts that have no scheduler of
/// their own can spawn [`run_daily_rollover`], which flushes open batches
/// shortly after every UTC midnight until told to stop.
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use super::AnchorService;
use crate::clock::{utc_midnight, MILLIS_PER_DAY};

/// Milliseconds from `now_millis` until the next UTC midnight.
///
/// Exactly at midnight this is a full day, never zero.
pub fn millis_until_next_rollover(now_millis: i64) -> u64 {
    let next_midnight_millis = utc_midnight(now_millis) * 1_000 + MILLIS_PER_DAY;
    (next_midnight_millis - now_millis) as u64
}

/// Flush the service after each UTC midnight plus `grace`.
///
/// Stops when `shutdown` turns true or its sender is dropped. A failed
/// flush is logged and retried at the next midnight; events recorded in
/// between retry it sooner through their own rollover.
pub async fn run_daily_rollover(
    service: Arc<AnchorService>,
    grace: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(grace_ms = grace.as_millis() as u64, "Daily rollover started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let until_midnight = millis_until_next_rollover(service.now_millis());
        let wait = Duration::from_millis(until_midnight) + grace;

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                match service.flush().await {
                    Ok(batches) if batches.is_empty() => {}
                    Ok(batches) => info!(batches = batches.len(), "Daily rollover anchored"),
                    Err(e) => warn!(error = %e, "Daily rollover failed, will retry"),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    info!("Daily rollover stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::SimulatedAdapter;
    use crate::clock::ManualClock;
    use crate::event::ConsentEvent;
    use crate::state::MemoryStore;

    #[test]
    fn test_millis_until_next_rollover() {
        assert_eq!(millis_until_next_rollover(0), MILLIS_PER_DAY as u64);
        assert_eq!(millis_until_next_rollover(MILLIS_PER_DAY - 1), 1);
        assert_eq!(
            millis_until_next_rollover(MILLIS_PER_DAY + 500),
            (MILLIS_PER_DAY - 500) as u64
        );
        assert_eq!(millis_until_next_rollover(-1), 1);
    }

    #[tokio::test]
    async fn test_rollover_task_flushes_and_stops() {
        let clock = Arc::new(ManualClock::new(MILLIS_PER_DAY - 20));
        let service = Arc::new(
            AnchorService::builder(
                Arc::new(SimulatedAdapter::default()),
                Arc::new(MemoryStore::new()),
            )
            .clock(clock.clone())
            .open()
            .await
            .unwrap(),
        );
        service
            .record_consent(ConsentEvent::new("https://a.test", "accept", 1))
            .await
            .unwrap();

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(run_daily_rollover(service.clone(), Duration::ZERO, rx));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(service.all_batches().len(), 1);
        assert_eq!(service.batch_info().await.count, 0);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_dropped_sender_stops_task() {
        let service = Arc::new(
            AnchorService::builder(
                Arc::new(SimulatedAdapter::default()),
                Arc::new(MemoryStore::new()),
            )
            .open()
            .await
            .unwrap(),
        );
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(run_daily_rollover(service, Duration::from_secs(60), rx));
        drop(tx);
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
