// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
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

//! cdstream CLI entry point
//!
//! Streams one resource out of a disc image from the command line: loads
//! the segment layout, opens the image as the drive port, ticks the
//! subsystem to completion and writes the reassembled payload to a file.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use cdstream::core::config::StreamConfig;
use cdstream::core::drive::FileDisc;
use cdstream::core::fader::NoopMixer;
use cdstream::core::layout::ResourceLocator;
use cdstream::core::pipeline::PipelineState;
use cdstream::core::system::{ResourceKind, Streamer};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Graphics,
    Audio,
    GameData,
}

impl From<KindArg> for ResourceKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Graphics => ResourceKind::Graphics,
            KindArg::Audio => ResourceKind::Audio,
            KindArg::GameData => ResourceKind::GameData,
        }
    }
}

/// Stream a resource out of a disc image
#[derive(Parser, Debug)]
#[command(name = "cdstream-cli", version, about)]
struct Args {
    /// Segment layout file (TOML)
    layout: PathBuf,

    /// Disc image file (flat 2048-byte sectors)
    image: PathBuf,

    /// Resource id (decimal or 0x-prefixed hex)
    #[arg(long, value_parser = parse_id)]
    id: u32,

    /// Declared resource kind
    #[arg(long, value_enum)]
    kind: KindArg,

    /// Output file for the streamed payload
    #[arg(long, short)]
    out: PathBuf,

    /// Optional config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Give up after this many ticks
    #[arg(long, default_value_t = 100_000)]
    max_ticks: u32,
}

fn parse_id(text: &str) -> Result<u32, String> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| e.to_string())
    } else {
        text.parse().map_err(|e: std::num::ParseIntError| e.to_string())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Pick up RUST_LOG and friends from a local .env, then init logging.
    dotenvy::dotenv().ok();
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => StreamConfig::load(&path.to_string_lossy())?,
        None => StreamConfig::default(),
    };

    let locator = ResourceLocator::load(&args.layout.to_string_lossy())?;
    let disc = FileDisc::open(&args.image)?;
    log::info!(
        "streaming resource 0x{:08X} from {}",
        args.id,
        args.image.display()
    );

    let mut streamer = Streamer::new(locator, Box::new(disc), Box::new(NoopMixer), config);
    streamer.request_resource(args.id, args.kind.into())?;

    for tick in 0..args.max_ticks {
        streamer.tick()?;

        if let Some(resource) = streamer.take_finished() {
            std::fs::write(&args.out, &resource.data)?;
            log::info!(
                "wrote {} bytes to {} after {} ticks",
                resource.data.len(),
                args.out.display(),
                tick + 1
            );
            return Ok(());
        }

        if streamer.pipeline_state() == PipelineState::Fault {
            let status = streamer.query_status();
            eprintln!(
                "streaming faulted (flags {:?}): {}",
                status.flags,
                streamer
                    .pipeline_fault()
                    .map(|e| e.to_string())
                    .unwrap_or_default()
            );
            std::process::exit(1);
        }
    }

    eprintln!("gave up after {} ticks", args.max_ticks);
    std::process::exit(1);
}
