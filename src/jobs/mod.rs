//! Background job scheduling and the acquisition pipeline

pub mod acquisition;
pub mod manual;

use std::time::Duration;

use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::config::Config;
use crate::db::Database;
use crate::reconcile::ReconciliationStore;
use crate::services::LibraryScanner;

use acquisition::AcquisitionOrchestrator;

/// One full pass: scan the library, reconcile the ledger against it, then
/// hunt whatever is still missing. A failed stage is logged and the later
/// stages still run against the last persisted state.
pub async fn run_pipeline(config: &Config, db: &Database) -> anyhow::Result<()> {
    let scanner = LibraryScanner::new(
        db.clone(),
        &config.movie_library_path,
        &config.tv_library_path,
    );
    if let Err(e) = scanner.scan().await {
        error!(job = "pipeline", stage = "scan", error = %e, "library scan failed");
    }

    let store = ReconciliationStore::new(db.clone());
    if let Err(e) = store.run().await {
        error!(job = "pipeline", stage = "reconcile", error = %e, "reconciliation failed");
    }

    let orchestrator = AcquisitionOrchestrator::new(config, db.clone())?;
    if let Err(e) = orchestrator.run().await {
        error!(job = "pipeline", stage = "acquire", error = %e, "acquisition pass failed");
    }

    Ok(())
}

/// Initialize and start the job scheduler
pub async fn start_scheduler(config: Config, db: Database) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;
    let interval_hours = config.run_interval_hours;

    let pipeline_job = Job::new_repeated_async(
        Duration::from_secs(interval_hours * 3600),
        move |_uuid, _l| {
            let config = config.clone();
            let db = db.clone();
            Box::pin(async move {
                info!(job = "pipeline", "starting scheduled pass");
                if let Err(e) = run_pipeline(&config, &db).await {
                    error!(job = "pipeline", error = %e, "pipeline pass failed");
                }
            })
        },
    )?;
    scheduler.add(pipeline_job).await?;

    scheduler.start().await?;

    info!(interval_hours, "job scheduler started");
    Ok(scheduler)
}
