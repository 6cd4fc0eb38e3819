use anyhow::Context;
use std::sync::Arc;

use crm_billing::billing::{AdmCloudFactory, SeaOrmBillingStore, SeaOrmCrmDirectory};
use crm_billing::database::{self, Migrator};
use crm_billing::email::{ConsoleMailer, Mailer, SmtpMailer};
use crm_billing::health::{DatabaseHealthCheck, MailerHealthCheck};
use crm_billing::storage::{BlobStore, MemoryBlobStore, S3BlobStore};
use crm_billing::{
    AppContext, BillingService, ConfigBuilder, HealthChecker, billing_app, init_tracing_with_config,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigBuilder::new()
        .from_env()
        .build()
        .context("invalid configuration")?;
    init_tracing_with_config(&config);

    let db = database::connect(&config.database).await?;
    if config.database.auto_migrate {
        database::run_migrations::<Migrator>(&db).await?;
    }

    let mailer: Arc<dyn Mailer> = match config.smtp.clone() {
        Some(smtp) => Arc::new(SmtpMailer::new(smtp)?),
        None => {
            tracing::warn!("No SMTP host configured; proformas will be logged, not sent");
            Arc::new(ConsoleMailer::new())
        }
    };

    let blobs: Arc<dyn BlobStore> = if config.blob.bucket.is_some() {
        Arc::new(S3BlobStore::connect(config.blob.clone()).await?)
    } else {
        tracing::warn!("No billing bucket configured; PDFs are kept in memory");
        Arc::new(MemoryBlobStore::from_config(&config.blob))
    };

    let accounting = AdmCloudFactory::new(config.admcloud.clone())?;

    if config.cron_auth.is_disabled() {
        tracing::warn!("Batch trigger authentication is DISABLED");
    }

    let billing = BillingService::new(
        Arc::new(SeaOrmBillingStore::new(db.clone())),
        Arc::new(SeaOrmCrmDirectory::new(db.clone())),
        Arc::new(accounting),
        mailer.clone(),
        blobs,
    );

    let health = HealthChecker::new()
        .with_check(Arc::new(DatabaseHealthCheck::new(db)))
        .with_check(Arc::new(MailerHealthCheck::new(mailer)));

    let context = AppContext::builder()
        .with_billing(billing)
        .with_cron_auth(config.cron_auth.clone())
        .with_sessions(crm_billing::auth::SessionVerifier::new(&config.session))
        .with_health(health)
        .with_dev_mode(config.dev_mode)
        .build()?;

    billing_app(config.server.clone(), context).serve().await?;
    Ok(())
}
