//! cartd - smart cart daemon
//!
//! This daemon:
//! 1. Loads configuration (SMART_CART_CONFIG file + environment overrides)
//! 2. Checks that the detection service answers
//! 3. Polls frames from a local image directory or an HTTP snapshot camera
//! 4. De-duplicates and stabilizes detections into a cart, logging changes
//! 5. Checks out on Ctrl-C, source end, or --max-cycles and prints the receipt

use anyhow::{anyhow, Result};
use clap::Parser;
use std::ops::ControlFlow;

use smart_cart::{
    CartConfig, CartSession, CycleOutcome, FrameDetector, FrameSource, HttpDetector,
    SessionState,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Camera-driven smart cart")]
struct Args {
    /// Frame source: a local image directory or an http(s) snapshot URL.
    #[arg(long, env = "SMART_CART_FRAMES")]
    frames: String,

    /// Loop a directory source instead of stopping after the last image.
    #[arg(long)]
    repeat: bool,

    /// Check out after this many detection cycles.
    #[arg(long, env = "SMART_CART_MAX_CYCLES")]
    max_cycles: Option<u64>,

    /// Skip the detection service reachability check.
    #[arg(long)]
    skip_probe: bool,

    /// Print the receipt as JSON.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let cfg = CartConfig::load()?;

    log::info!("cartd starting");
    log::info!("  Detector: {} ({:?})", cfg.detector.endpoint, cfg.detector.upload);
    log::info!("  Frames: {}", args.frames);
    log::info!(
        "  Thresholds: confidence={} overlap={}",
        cfg.nms.confidence_threshold,
        cfg.nms.overlap_threshold
    );
    log::info!(
        "  Window: {} frames, stable after {}",
        cfg.stabilizer.history_length,
        cfg.stabilizer.min_detection_frames
    );

    let mut detector = HttpDetector::new(cfg.detector.http_config())?;
    if !args.skip_probe {
        detector.probe().map_err(|e| {
            anyhow!(
                "cannot connect to detection server at {}: {}",
                cfg.detector.endpoint,
                e
            )
        })?;
        log::info!("detection server reachable at {}", detector.root_url());
    }

    let mut source = FrameSource::from_location(&args.frames, args.repeat, cfg.detector.timeout)?;
    source.connect()?;

    let mut session = CartSession::new(detector, cfg.nms, cfg.stabilizer);
    let latch = session.latch();
    ctrlc::set_handler(move || {
        if latch.close() {
            log::info!("checkout requested (Ctrl-C)");
        }
    })
    .map_err(|e| anyhow!("failed to set Ctrl-C handler: {}", e))?;

    let viewport = cfg.display;
    let mut cycles = 0u64;
    let state = session.poll(
        || source.next_frame(),
        &viewport,
        cfg.poll_interval,
        |outcome| {
            if let CycleOutcome::Applied(output) = outcome {
                for (class, position) in &output.positions {
                    log::debug!(
                        "{} at {} ({:.0}%)",
                        class,
                        position.region(&viewport),
                        position.confidence * 100.0
                    );
                }
            }
            cycles += 1;
            match args.max_cycles {
                Some(max) if cycles >= max => ControlFlow::Break(()),
                _ => ControlFlow::Continue(()),
            }
        },
    );

    let stats = session.stats();
    let source_stats = source.stats();
    log::info!(
        "polling stopped: cycles={} applied={} skipped={} discarded={} frame_errors={} frames={} from {} (healthy={})",
        stats.cycles,
        stats.applied,
        stats.skipped,
        stats.discarded,
        stats.frame_errors,
        source_stats.frames_captured,
        source_stats.source,
        source.is_healthy()
    );

    let receipt = match state {
        SessionState::Closed => session.receipt(&cfg.prices),
        SessionState::Active => match session.checkout(&cfg.prices) {
            Ok(receipt) => receipt,
            Err(e) => {
                log::warn!("checkout refused: {}", e);
                return Ok(());
            }
        },
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&receipt)?);
    } else {
        println!("{}", receipt);
    }
    Ok(())
}
