use std::path::{Path, PathBuf};

use anyhow::Context;
use ffmpeg_pipeline::{
    remux::remux_file, ContainerWriter, EncodePipeline, EncodeSummary, RemuxSummary,
};
use tokio_util::sync::CancellationToken;

use crate::config::EncodeConfig;
use crate::pattern::TestPattern;

mod config;
mod pattern;

fn init_logging() {
    let mut builder = env_logger::Builder::from_default_env();
    if std::env::var_os("RUST_LOG").is_none() {
        builder
            .filter_level(log::LevelFilter::Info)
            .filter_module("ffmpeg_pipeline", log::LevelFilter::Debug)
            .filter_module("frame_encoder", log::LevelFilter::Debug);
    }
    builder.init();
}

#[tokio::main]
async fn main() -> ! {
    init_logging();

    let code = match run().await {
        Ok(()) => 0,
        Err(e) => {
            log::error!("{:#}", e);
            1
        }
    };
    std::process::exit(code);
}

async fn run() -> anyhow::Result<()> {
    ffmpeg_pipeline::init().context("ffmpeg init")?;

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = EncodeConfig::load(config_path.as_deref())?;
    let descriptor = config.to_descriptor()?;

    let cancel = CancellationToken::new();
    let worker_cancel = cancel.clone();
    let worker_config = config.clone();
    let mut handle = tokio::task::spawn_blocking(move || {
        let mut writer = ContainerWriter::open(&worker_config.output, worker_config.format.as_deref())
            .with_context(|| format!("open output {}", worker_config.output.display()))?;
        writer.set_dump_format(worker_config.dump_format);
        let pipeline: EncodePipeline =
            EncodePipeline::with_writer(writer, descriptor).context("configure encoder")?;
        encode(pipeline, &worker_config, &worker_cancel)
    });

    let summary = tokio::select! {
        result = &mut handle => result.context("encode worker panicked")??,
        _ = tokio::signal::ctrl_c() => {
            log::warn!("interrupted, tearing down encoder");
            cancel.cancel();
            handle.await.context("encode worker panicked")??
        }
    };

    log::info!(
        "encoded {}: {} frames, {} packets ({} from flush, {} empty skipped)",
        config.output.display(),
        summary.frames_submitted,
        summary.packets_written,
        summary.drained_packets,
        summary.skipped_packets
    );
    if let Some(e) = summary.finalize_error {
        anyhow::bail!("{} was not finalized: {}", config.output.display(), e);
    }

    if let Some(remux_output) = config.remux_output.clone() {
        let input = config.output.clone();
        let format = config.remux_format.clone();
        let worker_output = remux_output.clone();
        let summary = tokio::task::spawn_blocking(move || {
            remux_file(&input, &worker_output, format.as_deref())
                .with_context(|| format!("remux into {}", worker_output.display()))
        })
        .await
        .context("remux worker panicked")??;

        remux_outcome(&remux_output, &summary)?;
    }

    Ok(())
}

/// A remux that stopped early still left a playable file; one whose trailer
/// or close failed did not, and fails the run like an unfinalized encode.
fn remux_outcome(output: &Path, summary: &RemuxSummary) -> anyhow::Result<()> {
    if let Some(e) = &summary.aborted {
        log::warn!("remux stopped early after {} packets: {}", summary.packets_written, e);
    }
    if let Some(e) = &summary.finalize_error {
        anyhow::bail!("{} was not finalized: {}", output.display(), e);
    }
    Ok(())
}

fn encode(
    mut pipeline: EncodePipeline,
    config: &EncodeConfig,
    cancel: &CancellationToken,
) -> anyhow::Result<EncodeSummary> {
    let frames = TestPattern::new(config.width, config.height).take(config.frames as usize);
    for (index, frame) in frames.enumerate() {
        if cancel.is_cancelled() {
            pipeline.abort();
            anyhow::bail!("cancelled after {} frames", index);
        }
        pipeline
            .push(&frame)
            .with_context(|| format!("encode frame {}", index))?;
    }
    pipeline.finish().context("finish encode")
}
