use anyhow::Context;
use clickhouse::Client;
use log::{info, warn};

use crate::config::ClickHouseSettings;

/// ClickHouse connection plus the batching policy from configuration.
pub struct ClickhouseClient {
    pub(super) client: Client,
    pub(super) settings: ClickHouseSettings,
}

impl ClickhouseClient {
    pub async fn new(settings: ClickHouseSettings) -> anyhow::Result<Self> {
        info!("Connecting to ClickHouse at {}", settings.url);

        let client = Client::default()
            .with_url(settings.url.clone())
            .with_user(settings.user.clone())
            .with_password(settings.password.clone())
            .with_database(settings.database.clone());

        // Probe the connection with exponential backoff before declaring
        // the store reachable.
        let mut retries = 0;
        let max_retries = 3;
        loop {
            match client.query("SELECT 1").fetch_one::<u8>().await {
                Ok(_) => {
                    info!("Successfully connected to ClickHouse");
                    break;
                }
                Err(e) => {
                    retries += 1;
                    if retries >= max_retries {
                        return Err(anyhow::anyhow!(
                            "Failed to connect to ClickHouse after {max_retries} attempts: {e}"
                        ));
                    }
                    let delay = std::time::Duration::from_millis(100 * 2_u64.pow(retries));
                    warn!(
                        "Failed to connect to ClickHouse (attempt {retries}/{max_retries}), retrying in {delay:?}... Error: {e}"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Ok(Self { client, settings })
    }

    /// Execute `schema/clickhouse.sql` statement by statement.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        info!("Running ClickHouse migrations");
        let schema = tokio::fs::read_to_string("schema/clickhouse.sql")
            .await
            .context("Failed to read schema/clickhouse.sql")?;

        for statement in schema.split(';') {
            let stmt = statement.trim();
            if stmt.is_empty() {
                continue;
            }
            self.client
                .query(stmt)
                .execute()
                .await
                .with_context(|| format!("Failed to execute migration statement: {stmt}"))?;
        }

        info!("ClickHouse migrations completed successfully");
        Ok(())
    }

    /// Health check - verify connection is still alive.
    pub async fn health_check(&self) -> anyhow::Result<()> {
        self.client
            .query("SELECT 1")
            .fetch_one::<u8>()
            .await
            .context("ClickHouse health check failed")?;
        Ok(())
    }
}
