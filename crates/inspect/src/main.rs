//! Lamina overlay snapshot inspector.
//!
//! Reads a JSON overlay snapshot and prints how its targets share modifier
//! sets. Keys are shown in their persisted form without knowing the topology
//! that wrote them.

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;
use lamina_overlay::{OverlayConfig, OverlaySnapshot, SNAPSHOT_VERSION};
use serde_json::Value;
use tracing::{debug, info};

/// Inspector command line arguments.
#[derive(Parser, Debug)]
#[command(name = "lamina-inspect")]
#[command(about = "Summarize a persisted modifier overlay snapshot")]
struct Args {
	/// JSON snapshot written by `OverlaySnapshot::to_json`
	#[arg(value_name = "SNAPSHOT")]
	snapshot: PathBuf,

	/// List every key under its modifier set
	#[arg(short, long)]
	keys: bool,

	/// Overlay configuration to validate alongside the snapshot
	#[arg(short, long, value_name = "PATH")]
	config: Option<PathBuf>,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,
}

fn main() -> anyhow::Result<()> {
	let args = Args::parse();
	setup_tracing(args.verbose);

	if let Some(path) = &args.config {
		let config = OverlayConfig::load(path)?;
		info!(path = %path.display(), ?config, "configuration ok");
	}

	let src = std::fs::read_to_string(&args.snapshot)
		.with_context(|| format!("reading {}", args.snapshot.display()))?;
	let snapshot: OverlaySnapshot<Value> = OverlaySnapshot::from_json(&src)
		.with_context(|| format!("decoding {}", args.snapshot.display()))?;
	if snapshot.version != SNAPSHOT_VERSION {
		bail!(
			"snapshot version {} is not supported (expected {SNAPSHOT_VERSION})",
			snapshot.version
		);
	}
	debug!(sets = snapshot.sets.len(), data = snapshot.data.len(), "snapshot decoded");

	print!("{}", render(&snapshot, args.keys));
	Ok(())
}

fn render(snapshot: &OverlaySnapshot<Value>, list_keys: bool) -> String {
	let keys: usize = snapshot.sets.iter().map(|set| set.keys.len()).sum();
	let entries: usize = snapshot.data.iter().map(|record| record.entries.len()).sum();

	let mut out = String::new();
	let _ = writeln!(
		out,
		"snapshot v{}: {keys} keys in {} sets, {entries} data entries",
		snapshot.version,
		snapshot.sets.len()
	);

	let mut sets: Vec<_> = snapshot.sets.iter().collect();
	sets.sort_by(|a, b| b.keys.len().cmp(&a.keys.len()));
	for set in sets {
		let ids: Vec<&str> = set.modifiers.iter().map(|id| id.as_str()).collect();
		let _ = writeln!(out, "  [{}] {} keys", ids.join(", "), set.keys.len());
		if list_keys {
			for key in &set.keys {
				let _ = writeln!(out, "    {key}");
			}
		}
	}

	if !snapshot.data.is_empty() {
		let _ = writeln!(out, "data:");
		for record in &snapshot.data {
			let _ = writeln!(out, "  {}: {} entries", record.modifier, record.entries.len());
		}
	}
	out
}

fn setup_tracing(verbose: bool) {
	use tracing_subscriber::EnvFilter;

	let filter = EnvFilter::try_from_env("LAMINA_LOG")
		.or_else(|_| EnvFilter::try_from_default_env())
		.unwrap_or_else(|_| {
			if verbose {
				EnvFilter::new("lamina=trace,debug")
			} else {
				EnvFilter::new("warn")
			}
		});

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.init();
}
