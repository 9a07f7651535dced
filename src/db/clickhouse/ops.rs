use anyhow::Context;
use async_trait::async_trait;
use clickhouse::{Row, RowOwned};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::chain::block::AssetId;
use crate::db::models::{AssetRow, BlockRow, Checkpoint, PriceRow, RuntimeUpgradeRow};
use crate::db::{clickhouse::ClickhouseClient, Store};

impl ClickhouseClient {
    /// One batched insert carrying a deduplication token: a retried
    /// insert with the same token is a server-side no-op, so every batch
    /// is safe to replay after a partial failure.
    async fn insert_with_token<T>(
        &self,
        table: &str,
        rows: &[T],
        token: &str,
    ) -> anyhow::Result<()>
    where
        T: Row + RowOwned + Serialize + Send + Sync,
    {
        if rows.is_empty() {
            return Ok(());
        }

        let client = self
            .client
            .clone()
            .with_option("insert_deduplication_token", token);

        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = async {
                let mut insert = client.insert::<T>(table).await?;
                for row in rows {
                    insert.write(row).await?;
                }
                insert.end().await?;
                Ok::<_, clickhouse::error::Error>(())
            }
            .await;

            match result {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.settings.insert_max_retries => {
                    let delay = std::time::Duration::from_millis(
                        self.settings.insert_retry_delay_ms * 2_u64.pow(attempt - 1),
                    );
                    warn!(
                        "insert into {table} failed (attempt {attempt}/{}), retrying in {delay:?}: {e}",
                        self.settings.insert_max_retries
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("insert into {table} failed after {attempt} attempts")
                    });
                }
            }
        }
    }

    /// Delete every row at `height` or above from prices, blocks and
    /// runtime upgrades, drop the candle buckets the range touched, and
    /// reset the main checkpoint. Mutations run synchronously so the
    /// caller can trust the store state on return.
    pub async fn rollback_to(&self, height: u32) -> anyhow::Result<()> {
        #[derive(Row, Deserialize)]
        struct TimestampRow {
            #[serde(with = "clickhouse::serde::time::datetime")]
            block_timestamp: OffsetDateTime,
        }

        let cutoff: Option<TimestampRow> = self
            .client
            .query("SELECT block_timestamp FROM blocks WHERE block_height = ? LIMIT 1")
            .bind(height)
            .fetch_optional()
            .await
            .context("failed to resolve rollback timestamp")?;

        let mutating = self.client.clone().with_option("mutations_sync", "2");

        for table in ["prices", "blocks", "runtime_upgrades"] {
            mutating
                .query(&format!("ALTER TABLE {table} DELETE WHERE block_height >= ?"))
                .bind(height)
                .execute()
                .await
                .with_context(|| format!("failed to delete {table} rows >= {height}"))?;
            info!("rolled back {table} to below block {height}");
        }

        // Candles are keyed by time bucket; anything intersecting the
        // deleted range must go so a replay can rebuild it cleanly.
        if let Some(cutoff) = cutoff {
            let unix = cutoff.block_timestamp.unix_timestamp();
            for (table, bucket_fn) in [
                ("candles_1m", "toStartOfMinute"),
                ("candles_1h", "toStartOfHour"),
                ("candles_1d", "toStartOfDay"),
            ] {
                mutating
                    .query(&format!(
                        "ALTER TABLE {table} DELETE WHERE bucket >= {bucket_fn}(toDateTime(?))"
                    ))
                    .bind(unix)
                    .execute()
                    .await
                    .with_context(|| format!("failed to delete {table} buckets"))?;
            }
            info!("rolled back candles intersecting block {height} and beyond");
        } else {
            warn!("no block row at height {height}, leaving candles untouched");
        }

        self.write_checkpoint(&Checkpoint::new(
            crate::db::models::MAIN_CHECKPOINT,
            height.saturating_sub(1),
        ))
        .await?;

        Ok(())
    }

    /// Scan the prices table for height gaps. Diagnostic only.
    pub async fn find_gaps(&self) -> anyhow::Result<Vec<(u32, u32)>> {
        let heights: Vec<u32> = self
            .client
            .query("SELECT DISTINCT block_height FROM prices ORDER BY block_height")
            .fetch_all()
            .await
            .context("failed to scan price heights")?;

        Ok(heights
            .windows(2)
            .filter(|pair| pair[1] - pair[0] > 1)
            .map(|pair| (pair[0], pair[1]))
            .collect())
    }
}

#[async_trait]
impl Store for ClickhouseClient {
    async fn insert_prices(&self, rows: &[PriceRow], token: &str) -> anyhow::Result<()> {
        self.insert_with_token("prices", rows, token).await
    }

    async fn insert_blocks(&self, rows: &[BlockRow], token: &str) -> anyhow::Result<()> {
        self.insert_with_token("blocks", rows, token).await
    }

    async fn insert_assets(&self, rows: &[AssetRow], token: &str) -> anyhow::Result<()> {
        self.insert_with_token("assets", rows, token).await
    }

    async fn insert_runtime_upgrades(
        &self,
        rows: &[RuntimeUpgradeRow],
        token: &str,
    ) -> anyhow::Result<()> {
        self.insert_with_token("runtime_upgrades", rows, token).await
    }

    async fn read_checkpoint(&self, id: &str) -> anyhow::Result<Option<Checkpoint>> {
        self.client
            .query(
                "SELECT ?fields FROM indexer_state WHERE id = ? \
                 ORDER BY updated_at DESC LIMIT 1",
            )
            .bind(id)
            .fetch_optional::<Checkpoint>()
            .await
            .with_context(|| format!("failed to read checkpoint {id}"))
    }

    async fn write_checkpoint(&self, checkpoint: &Checkpoint) -> anyhow::Result<()> {
        let mut insert = self.client.insert::<Checkpoint>("indexer_state").await?;
        insert.write(checkpoint).await?;
        insert.end().await?;
        Ok(())
    }

    async fn price_snapshot_at(&self, height: u32) -> anyhow::Result<Vec<(AssetId, String)>> {
        #[derive(Row, Deserialize)]
        struct PricePoint {
            asset_id: u32,
            usdt_price: String,
        }

        let points: Vec<PricePoint> = self
            .client
            .query(
                "SELECT asset_id, argMax(usdt_price, block_height) AS usdt_price \
                 FROM prices WHERE block_height <= ? AND usdt_price != '0' \
                 GROUP BY asset_id",
            )
            .bind(height)
            .fetch_all()
            .await
            .with_context(|| format!("failed to load price snapshot at {height}"))?;

        Ok(points.into_iter().map(|point| (point.asset_id, point.usdt_price)).collect())
    }
}
