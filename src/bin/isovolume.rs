// Copyright 2021 Tristam MacDonald
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
use anyhow::{bail, Context, Result};
use clap::Parser;
use isovolume::{
    loader::{discover_slices, sort_slice_paths},
    DatasetPresets, IsoMesh, Pipeline, RecomputeController, SessionConfig, ThresholdPolicy,
};
use log::info;
use std::{
    io::{self, BufRead},
    path::PathBuf,
    thread,
};

#[derive(Parser, Debug)]
#[command(name = "isovolume")]
#[command(about = "Extract isosurfaces from stacks of raw 16-bit slice images", long_about = None)]
struct Cli {
    /// Width of each slice in samples
    width: usize,

    /// Height of each slice in samples
    height: usize,

    /// Number of slices to load
    count: usize,

    /// Either exactly `count` slice files or a single directory of slices
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Distance between slices, relative to the distance between pixels
    #[arg(long)]
    z_spacing: Option<f32>,

    /// Standard deviation of the smoothing kernel, in voxels
    #[arg(long, default_value = "1.0")]
    sigma: f32,

    /// Skip smoothing and extract directly from the raw samples
    #[arg(long)]
    no_smooth: bool,

    /// Fixed threshold, overriding presets and the estimated default
    #[arg(long)]
    threshold: Option<f32>,

    /// JSON file of per-dataset presets
    #[arg(long)]
    presets: Option<PathBuf>,

    /// Read `threshold <v>`, `slices <k>` and `quit` commands from stdin
    #[arg(short, long)]
    interactive: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = session_config(&cli)?;
    let paths = slice_paths(&cli)?;

    let volume = config
        .loader()
        .load(&paths)
        .context("Failed to load slice stack")?;
    let pipeline = Pipeline::from_config(volume, &config);

    let range = pipeline.threshold_range();
    let slices = pipeline.slice_range();
    println!(
        "threshold range [{}, {}], default {}",
        range.min, range.max, range.default
    );
    println!("slice range [{}, {}]", slices.start(), slices.end());
    println!("{}", describe(&pipeline.snapshot().mesh));

    if cli.interactive {
        interact(pipeline, &config)?;
    }

    Ok(())
}

fn session_config(cli: &Cli) -> Result<SessionConfig> {
    let mut config = SessionConfig {
        width: cli.width,
        height: cli.height,
        ..SessionConfig::default()
    };
    config.smoothing.enabled = !cli.no_smooth;
    config.smoothing.sigma = [cli.sigma; 3];

    if let Some(path) = &cli.presets {
        let presets = DatasetPresets::load(path)
            .with_context(|| format!("Failed to load presets from {}", path.display()))?;
        let dataset = cli.images[0]
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if let Some((key, preset)) = presets.resolve(&dataset) {
            info!("Using preset {:?} for dataset {:?}", key, dataset);
            config.apply_preset(preset);
        }
    }

    if let Some(z_spacing) = cli.z_spacing {
        config.z_spacing = z_spacing;
    }
    if let Some(threshold) = cli.threshold {
        config.threshold = ThresholdPolicy::Fixed(threshold);
    }

    Ok(config)
}

/// Resolve the positional image arguments to `count` slice files in stack
/// order.
fn slice_paths(cli: &Cli) -> Result<Vec<PathBuf>> {
    let paths = if cli.images.len() == 1 && cli.images[0].is_dir() {
        discover_slices(&cli.images[0])
            .with_context(|| format!("Failed to list slices in {}", cli.images[0].display()))?
    } else if cli.images.len() == cli.count {
        sort_slice_paths(cli.images.clone())?
    } else {
        bail!(
            "expected {} slice files or a single directory, got {} paths",
            cli.count,
            cli.images.len()
        );
    };

    if paths.len() < cli.count {
        bail!("{} slices requested but only {} found", cli.count, paths.len());
    }
    Ok(paths.into_iter().take(cli.count).collect())
}

fn describe(mesh: &IsoMesh) -> String {
    match mesh.bounds() {
        Some((lo, hi)) => format!(
            "{} triangles, {} vertices, bounds ({:.2}, {:.2}, {:.2}) to ({:.2}, {:.2}, {:.2})",
            mesh.triangle_count(),
            mesh.vertex_count(),
            lo.x,
            lo.y,
            lo.z,
            hi.x,
            hi.y,
            hi.z
        ),
        None => "empty mesh".to_string(),
    }
}

fn interact(pipeline: Pipeline, config: &SessionConfig) -> Result<()> {
    let (mut controller, ready) = RecomputeController::spawn(pipeline, config.debounce())
        .context("Failed to start interactive session")?;

    let printer = thread::spawn(move || {
        for message in ready {
            println!(
                "[{}] threshold {}, {} slices: {}",
                message.generation,
                message.threshold,
                message.active_slices,
                describe(&message.mesh)
            );
        }
    });

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read command")?;
        let mut words = line.split_whitespace();
        match (words.next(), words.next()) {
            (None, _) => {}
            (Some("quit"), None) | (Some("exit"), None) => break,
            (Some("threshold"), Some(value)) => match value.parse() {
                Ok(threshold) => controller.set_threshold(threshold)?,
                Err(_) => eprintln!("invalid threshold {:?}", value),
            },
            (Some("slices"), Some(value)) => match value.parse() {
                Ok(count) => controller.set_active_slice_count(count)?,
                Err(_) => eprintln!("invalid slice count {:?}", value),
            },
            _ => eprintln!(
                "unknown command {:?}, expected `threshold <v>`, `slices <k>` or `quit`",
                line.trim()
            ),
        }
    }

    controller.shutdown();
    if printer.join().is_err() {
        bail!("notification printer panicked");
    }
    Ok(())
}
