//! cart_replay - replay recorded detection responses through the cart pipeline.
//!
//! Input is JSON lines, one detection-service response per frame (either a bare
//! array of records or an object with `predictions`). Lines that are not valid
//! JSON, or whose envelope cannot be decoded, count as frames where detection was
//! unavailable: they are skipped without touching the history window.
//!
//! Prints the final cart, the last frame's positions and the receipt as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, BufRead};
use std::path::PathBuf;

use smart_cart::detect::{parse_detections, BoxFormat};
use smart_cart::{
    deduplicate, CartConfig, DetectionUnavailable, Receipt, StableCart, Stabilizer,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Replay recorded detection responses into a stable cart"
)]
struct Args {
    /// JSON-lines file of detection responses (reads stdin when omitted).
    input: Option<PathBuf>,

    /// Box convention of the recorded responses: corners, center_size or auto.
    #[arg(long, default_value = "auto")]
    box_format: String,

    /// Width of the frames the responses were produced from.
    #[arg(long)]
    frame_width: Option<u32>,

    /// Height of the frames the responses were produced from.
    #[arg(long)]
    frame_height: Option<u32>,
}

#[derive(Serialize)]
struct ReplayReport {
    cart: StableCart,
    positions: BTreeMap<String, ReportedPosition>,
    receipt: Receipt,
    frames: u64,
    skipped: u64,
    dropped_records: usize,
}

#[derive(Serialize)]
struct ReportedPosition {
    x: f32,
    y: f32,
    confidence: f32,
    region: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let cfg = CartConfig::load()?;
    let box_format = BoxFormat::from_str(&args.box_format)?;

    let viewport = cfg.display;
    let scale = viewport.scale_for(
        args.frame_width.unwrap_or(viewport.width),
        args.frame_height.unwrap_or(viewport.height),
    );

    let mut stabilizer = Stabilizer::new(cfg.stabilizer);
    let mut report = ReplayReport {
        cart: StableCart::default(),
        positions: BTreeMap::new(),
        receipt: Receipt::build(&StableCart::default(), &cfg.prices),
        frames: 0,
        skipped: 0,
        dropped_records: 0,
    };

    let reader: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(io::BufReader::new(
            std::fs::File::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Box::new(io::BufReader::new(io::stdin())),
    };

    for (index, line) in reader.lines().enumerate() {
        let line = line.context("failed to read input")?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        report.frames += 1;

        let parsed = serde_json::from_str::<serde_json::Value>(trimmed)
            .map_err(|e| DetectionUnavailable::Payload(e.to_string()))
            .and_then(|value| {
                parse_detections(&value, box_format)
                    .map_err(|e| DetectionUnavailable::Payload(e.to_string()))
            });
        let parsed = match parsed {
            Ok(parsed) => parsed,
            Err(err) => {
                log::warn!("line {}: {}, skipping frame", index + 1, err);
                report.skipped += 1;
                continue;
            }
        };
        report.dropped_records += parsed.dropped;

        let set = deduplicate(&parsed.detections, &cfg.nms);
        let output = stabilizer.update(&set, scale);
        report.positions = output
            .positions
            .iter()
            .map(|(class, position)| {
                (
                    class.clone(),
                    ReportedPosition {
                        x: position.x,
                        y: position.y,
                        confidence: position.confidence,
                        region: position.region(&viewport).to_string(),
                    },
                )
            })
            .collect();
    }

    report.cart = stabilizer.cart().clone();
    report.receipt = Receipt::build(&report.cart, &cfg.prices);
    log::info!(
        "replayed {} frames ({} skipped): {}",
        report.frames,
        report.skipped,
        report.cart
    );

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
