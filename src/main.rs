mod config;
mod country;
mod http;
mod imaging;
mod internal;
mod marketplace;
mod matcher;
mod metrics;
mod models;
mod pipeline;
mod reconcile;
mod retry;

use config::AppConfig;
use pipeline::Pipeline;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::time::sleep;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

// Everything downstream assumes strictly sequential execution, so the
// runtime is pinned to a single thread.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env();
    if config.sp_api_key.is_empty() {
        warn!(
            target = "quotesync.driver",
            "SP_API_KEY is empty; marketplace calls will be rejected"
        );
    }
    info!(
        target = "quotesync.driver",
        store_code = %config.store_code,
        window_days = config.sweep_window_days,
        "starting quotation sweep loop"
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!(
                    target = "quotesync.driver",
                    "interrupt received; stopping after the current task"
                );
                shutdown.store(true, Ordering::SeqCst);
            }
        });
    }

    let pipeline = Pipeline::new(&config);
    run_loop(&pipeline, &config, &shutdown).await;
    info!(target = "quotesync.driver", "sweep loop stopped");
}

/// Repeat sweeps indefinitely: a sweep that saw tasks is followed
/// immediately by the next one, an empty sweep waits out the loop
/// interval first.
async fn run_loop(pipeline: &Pipeline, config: &AppConfig, shutdown: &AtomicBool) {
    let mut round = 0u64;
    while !shutdown.load(Ordering::SeqCst) {
        round += 1;
        info!(target = "quotesync.driver", round = round, "sweep started");
        let seen = run_sweep(pipeline, config, shutdown).await;
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        if seen == 0 {
            info!(
                target = "quotesync.driver",
                round = round,
                idle_secs = config.loop_interval.as_secs(),
                "no tasks this round; idling"
            );
            sleep(config.loop_interval).await;
        }
    }
}

/// One sweep over the date window, oldest date last. Returns how many
/// tasks were seen (processed or failed).
async fn run_sweep(pipeline: &Pipeline, config: &AppConfig, shutdown: &AtomicBool) -> usize {
    let mut seen = 0;
    let mut succeeded = 0;

    for created_at in sweep_dates(config.sweep_window_days) {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let quotation_tasks = match pipeline
            .internal()
            .fetch_quotation_tasks(&config.store_code, &created_at)
            .await
        {
            Ok(tasks) => tasks,
            Err(err) => {
                warn!(
                    target = "quotesync.driver",
                    created_at = %created_at,
                    error = %err,
                    "quotation task fetch failed; cooling down"
                );
                sleep(config.error_cooldown).await;
                Vec::new()
            }
        };
        let non_quotable_tasks = match pipeline
            .internal()
            .fetch_non_quotable_tasks(&config.store_code, &created_at)
            .await
        {
            Ok(tasks) => tasks,
            Err(err) => {
                warn!(
                    target = "quotesync.driver",
                    created_at = %created_at,
                    error = %err,
                    "non-quotable task fetch failed; cooling down"
                );
                sleep(config.error_cooldown).await;
                Vec::new()
            }
        };

        if quotation_tasks.is_empty() && non_quotable_tasks.is_empty() {
            continue;
        }
        info!(
            target = "quotesync.driver",
            created_at = %created_at,
            quotation = quotation_tasks.len(),
            non_quotable = non_quotable_tasks.len(),
            "tasks fetched"
        );

        for task in &quotation_tasks {
            let ok = pipeline.process_quotation(task).await;
            metrics::task_processed("quotation", ok);
            seen += 1;
            if ok {
                succeeded += 1;
            }
            sleep(config.task_pause).await;
            if shutdown.load(Ordering::SeqCst) {
                break;
            }
        }
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        for task in &non_quotable_tasks {
            let ok = pipeline.process_non_quotable(task).await;
            metrics::task_processed("non_quotable", ok);
            seen += 1;
            if ok {
                succeeded += 1;
            }
            sleep(config.task_pause).await;
            if shutdown.load(Ordering::SeqCst) {
                break;
            }
        }
    }

    info!(
        target = "quotesync.driver",
        seen = seen,
        succeeded = succeeded,
        failed = seen - succeeded,
        "sweep finished"
    );
    seen
}

/// The date window the task feeds are swept over: today first, then
/// back one day at a time.
fn sweep_dates(days: u32) -> Vec<String> {
    let today = chrono::Local::now().date_naive();
    (0..days.max(1))
        .map(|offset| {
            (today - chrono::Duration::days(offset as i64))
                .format("%Y-%m-%d")
                .to_string()
        })
        .collect()
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn sweep_dates_walk_backwards_from_today() {
        let dates = sweep_dates(3);
        assert_eq!(dates.len(), 3);
        let parsed: Vec<NaiveDate> = dates
            .iter()
            .map(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap())
            .collect();
        assert_eq!(parsed[0] - parsed[1], chrono::Duration::days(1));
        assert_eq!(parsed[1] - parsed[2], chrono::Duration::days(1));
    }

    #[test]
    fn sweep_dates_never_empty() {
        assert_eq!(sweep_dates(0).len(), 1);
    }
}
