//! services/api/src/bin/backfill_links.rs
//!
//! One-time migration: links students that are only matched to an account by
//! email to that account directly, so role resolution no longer needs the
//! email fallback. Pass `--dry-run` to report without writing.

use api_lib::{
    adapters::DbAdapter,
    config::{Config, StorageBackend},
    error::ApiError,
};
use records_core::ports::RecordsRepository;
use records_core::roles::plan_identity_backfill;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    let dry_run = std::env::args().any(|a| a == "--dry-run");

    let StorageBackend::Postgres { database_url } = &config.storage else {
        return Err(ApiError::Internal(
            "backfill_links needs STORAGE_BACKEND=postgres".to_string(),
        ));
    };
    let db_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url)
        .await?;
    let repo = DbAdapter::new(db_pool);
    repo.run_migrations().await?;

    let (students, identities) =
        futures::try_join!(repo.list_students(None), repo.list_identities())?;
    let plan = plan_identity_backfill(&students, &identities);
    info!(
        to_link = plan.links.len(),
        skipped_no_email = plan.skipped_no_email,
        skipped_ambiguous = plan.skipped_ambiguous,
        unmatched = plan.unmatched,
        "Backfill plan ready"
    );
    if plan.skipped_ambiguous > 0 {
        warn!(
            "{} students share an email with several accounts; link them by hand",
            plan.skipped_ambiguous
        );
    }

    if dry_run {
        for (student_id, identity_id) in &plan.links {
            info!(%student_id, %identity_id, "Would link");
        }
        return Ok(());
    }

    let mut linked = 0usize;
    for (student_id, identity_id) in &plan.links {
        match repo.link_student_identity(*student_id, *identity_id).await {
            Ok(()) => linked += 1,
            // An identity may already own another student record.
            Err(e) => warn!(%student_id, %identity_id, "Skipped link: {}", e),
        }
    }
    info!(linked, "Backfill complete");
    Ok(())
}
