use std::{path::PathBuf, process, sync::Arc, time::Duration};

use clap::Parser;
use log::{error, info, warn};
use omniflow::{
    chain::{BlockSource, FixtureSource},
    ClickhouseClient, Pipeline, PipelineMode, Settings,
};
use simple_logger::SimpleLogger;
use tokio_util::sync::CancellationToken;

/// Grace period for the in-flight block, final flush and checkpoint
/// after an interrupt.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[command(
    name = "omniflow",
    author,
    version,
    about = "Block-level USDT price and volume indexer for the Hydration DEX."
)]
struct Args {
    /// Start at this block, ignoring the stored checkpoint.
    #[arg(long)]
    from_block: Option<u32>,

    /// Stop after processing this block.
    #[arg(long)]
    to_block: Option<u32>,

    /// Delete all rows at this height and above, reset the checkpoint to
    /// the block below, and exit.
    #[arg(long)]
    rollback_to_block: Option<u32>,

    /// Scan the prices table for height gaps and report them.
    #[arg(long)]
    detect_gaps: bool,

    /// Re-emit volume rows using prices already in the store.
    #[arg(long)]
    replay_volumes: bool,

    /// Replay a JSON block dump instead of a live gateway.
    #[arg(long)]
    blocks_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .env()
        .init()
    {
        eprintln!("failed to initialize logging: {e}");
        process::exit(1);
    }

    match run(args).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            error!("fatal: {e:#}");
            process::exit(1);
        }
    }
}

async fn run(args: Args) -> anyhow::Result<i32> {
    let settings = Settings::new()?;
    let store = ClickhouseClient::new(settings.clickhouse.clone()).await?;
    store.migrate().await?;

    if let Some(height) = args.rollback_to_block {
        store.rollback_to(height).await?;
        info!("rollback to block {height} complete");
        return Ok(0);
    }

    if args.detect_gaps {
        // Diagnostic mode: always exits 0.
        match store.find_gaps().await {
            Ok(gaps) if gaps.is_empty() => info!("no gaps found in the prices table"),
            Ok(gaps) => {
                for (before, after) in &gaps {
                    warn!("gap between blocks {before} and {after}");
                }
                info!("{} gap(s) found", gaps.len());
            }
            Err(e) => error!("gap scan failed: {e:#}"),
        }
        return Ok(0);
    }

    let mode = if args.replay_volumes {
        PipelineMode::ReplayVolumes
    } else {
        PipelineMode::Follow
    };
    let mut pipeline = Pipeline::new(Arc::new(store), &settings, mode, args.to_block);

    let start_height = match args.from_block {
        Some(height) => height,
        None => pipeline.start_height().await?,
    };
    info!("starting from block {start_height}");

    // The live gateway implements `BlockSource` out of tree and drives
    // `Pipeline::process_batch`; this binary runs the pipeline over a
    // block dump.
    let blocks_file = args
        .blocks_file
        .or_else(|| settings.chain.blocks_file.as_ref().map(PathBuf::from));
    let Some(blocks_file) = blocks_file else {
        anyhow::bail!(
            "no block source configured: pass --blocks-file or set chain.blocks_file \
             (live follow is driven by the gateway service)"
        );
    };
    let mut source = FixtureSource::from_file(&blocks_file, start_height)?;

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            signal_token.cancel();
        }
    });

    run_pipeline(&mut pipeline, &mut source, token.clone()).await?;

    Ok(if token.is_cancelled() { EXIT_INTERRUPTED } else { 0 })
}

async fn run_pipeline<S, Src>(
    pipeline: &mut Pipeline<S>,
    source: &mut Src,
    token: CancellationToken,
) -> anyhow::Result<()>
where
    S: omniflow::Store,
    Src: BlockSource,
{
    let cancelled = token.clone();
    let work = pipeline.run(source, token);
    tokio::pin!(work);

    loop {
        tokio::select! {
            result = &mut work => return result,
            _ = cancelled.cancelled() => {
                // The pipeline finishes its in-flight block, flushes and
                // checkpoints; bound that with a hard timeout.
                return match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut work).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!("graceful shutdown timed out after {SHUTDOWN_TIMEOUT:?}");
                        Ok(())
                    }
                };
            }
        }
    }
}
