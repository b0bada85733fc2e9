//! Scheduled daily sweep

use std::sync::Arc;

use primebot_membership::{run_daily_sweep, Clock, MembershipContext, SweepReport};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::{error, info, warn};

/// Log results of one sweep tick
fn log_sweep_report(report: &SweepReport) {
    info!(
        checked = report.checked,
        expired = report.expired,
        warned = report.warned,
        backup_pushed = report.backup_pushed,
        "Sweep cycle complete"
    );

    if report.delivery_failures > 0 || report.store_failures > 0 {
        warn!(
            delivery_failures = report.delivery_failures,
            store_failures = report.store_failures,
            "Sweep finished with failures"
        );
    }
}

/// Start a scheduler that runs the sweep on `cron` (6 fields, seconds first, UTC)
pub async fn start_sweep_scheduler(
    ctx: MembershipContext,
    clock: Arc<dyn Clock>,
    cron: &str,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    scheduler
        .add(Job::new_async(cron, move |_uuid, _l| {
            let ctx = ctx.clone();
            let clock = clock.clone();
            Box::pin(async move {
                info!("Running scheduled membership sweep");
                match run_daily_sweep(&ctx, clock.now_ms()).await {
                    Ok(report) => log_sweep_report(&report),
                    Err(e) => error!(error = %e, "Sweep aborted, membership set unreadable"),
                }
            })
        })?)
        .await?;
    info!(cron = %cron, "Scheduled: Membership sweep");

    scheduler.start().await?;
    Ok(scheduler)
}
