use chrono::{DateTime, Utc};
use croner::Cron;
use tokio::time::{interval, Duration};

use crate::db::Store;
use crate::services::leases;

const TICK_SECS: u64 = 60;

/// Lease sweeper expires ACTIVE leases whose end date has passed, on a cron schedule
pub struct LeaseSweeper {
    store: Store,
    schedule: String,
    stop_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl LeaseSweeper {
    pub fn new(store: Store, schedule: &str) -> Self {
        Self {
            store,
            schedule: schedule.to_string(),
            stop_tx: None,
        }
    }

    /// Start the sweeper. An invalid schedule is reported and the sweeper stays idle.
    pub fn start(&mut self) {
        let cron = match Cron::new(&self.schedule).parse() {
            Ok(c) => c,
            Err(e) => {
                tracing::error!("Lease sweeper disabled, invalid schedule '{}': {}", self.schedule, e);
                return;
            }
        };

        let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel();
        self.stop_tx = Some(stop_tx);

        let store = self.store.clone();
        tracing::info!("Lease sweeper scheduled ({})", self.schedule);

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(TICK_SECS));
            let mut last_run = Utc::now();

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = Utc::now();
                        if !is_due(&cron, &last_run, &now) {
                            continue;
                        }
                        last_run = now;
                        match leases::expire_overdue(&store, now.date_naive()).await {
                            Ok(report) => tracing::debug!("Lease sweep expired {} lease(s)", report.expired),
                            Err(e) => tracing::warn!("Lease sweep failed: {}", e),
                        }
                    }
                    _ = &mut stop_rx => {
                        tracing::info!("Lease sweeper stopped");
                        break;
                    }
                }
            }
        });
    }

    /// Stop the sweeper
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Due once the next occurrence after the last run is not in the future
fn is_due(cron: &Cron, last_run: &DateTime<Utc>, now: &DateTime<Utc>) -> bool {
    match cron.find_next_occurrence(last_run, false) {
        Ok(next) => next <= *now,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn daily() -> Cron {
        Cron::new("0 2 * * *").parse().unwrap()
    }

    #[test]
    fn test_due_after_scheduled_time() {
        let last = Utc.with_ymd_and_hms(2026, 3, 1, 1, 0, 0).unwrap();
        let before = Utc.with_ymd_and_hms(2026, 3, 1, 1, 59, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 3, 1, 2, 0, 30).unwrap();
        assert!(!is_due(&daily(), &last, &before));
        assert!(is_due(&daily(), &last, &after));
    }

    #[test]
    fn test_not_due_twice_the_same_day() {
        let last = Utc.with_ymd_and_hms(2026, 3, 1, 2, 0, 30).unwrap();
        let later = Utc.with_ymd_and_hms(2026, 3, 1, 23, 0, 0).unwrap();
        let next_day = Utc.with_ymd_and_hms(2026, 3, 2, 2, 1, 0).unwrap();
        assert!(!is_due(&daily(), &last, &later));
        assert!(is_due(&daily(), &last, &next_day));
    }

    #[test]
    fn test_invalid_schedule_stays_idle() {
        let parsed = Cron::new("not a cron").parse();
        assert!(parsed.is_err());
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let store = Store::in_memory().await.unwrap();
        let mut sweeper = LeaseSweeper::new(store, "0 2 * * *");
        sweeper.start();
        assert!(sweeper.stop_tx.is_some());
        sweeper.stop();
        assert!(sweeper.stop_tx.is_none());
    }
}
