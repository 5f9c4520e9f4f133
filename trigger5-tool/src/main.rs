//! Trigger 5 adapter tool — entry point.
//!
//! ```text
//! trigger5-tool pll <khz>                     Fit the PLL to a pixel clock
//! trigger5-tool modes                         Dump the simulated mode catalog
//! trigger5-tool mode-request <preset>         Print the SET_MODE packet
//! trigger5-tool stream <preset> --frames N    Stream test frames
//! trigger5-tool --config <path>               Load a custom config TOML
//! trigger5-tool --gen-config                  Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use trigger5_core::mode::PRESETS;
use trigger5_core::{
    ClockFit, ConnectorStatus, DisplayTiming, ModeRequest, PipelineStats, Trigger5Device,
    Trigger5Error, select_mode,
};
use trigger5_tool::config::ToolConfig;
use trigger5_tool::pattern::TestPattern;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "trigger5-tool", about = "Trigger 5 USB display adapter tool")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "trigger5-tool.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Emit JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Find PLL parameters for a pixel clock in kHz.
    Pll { khz: u32 },
    /// List the modes the simulated adapter reports.
    Modes,
    /// Encode the SET_MODE packet for a preset timing.
    ModeRequest { preset: String },
    /// Stream test-pattern frames to the simulated adapter.
    Stream {
        preset: String,
        #[arg(long, default_value_t = 60)]
        frames: u32,
    },
}

#[derive(Serialize)]
struct ModeRequestReport {
    preset: String,
    mode_id: u8,
    clock: ClockFit,
    bytes: String,
}

#[derive(Serialize)]
struct StreamReport {
    preset: String,
    connector: ConnectorStatus,
    frames: u32,
    stats: PipelineStats,
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn preset(name: &str) -> Result<DisplayTiming, Box<dyn std::error::Error>> {
    DisplayTiming::preset(name).ok_or_else(|| {
        let known: Vec<&str> = PRESETS.iter().map(|(n, _)| *n).collect();
        format!("unknown preset {name:?}; known: {}", known.join(", ")).into()
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ── Commands ─────────────────────────────────────────────────────

fn run_pll(khz: u32, config: &ToolConfig, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let device = config.to_device_config();
    let fit = device.search_space.synthesize(khz);
    if json {
        return print_json(&fit);
    }

    let p = fit.params;
    println!("target    {khz} kHz");
    println!(
        "pll       prediv={} mul1={} mul2={} div1={} div2={}",
        p.prediv, p.mul1, p.mul2, p.div1, p.div2
    );
    println!("achieved  {} kHz", fit.achieved_khz());
    println!("error     {} kHz ({} ppm)", fit.error_khz(), fit.error_ppm());
    if !fit.is_within(device.max_clock_error_ppm) {
        println!("REJECTED  above {} ppm", device.max_clock_error_ppm);
    }
    Ok(())
}

fn run_modes(config: &ToolConfig, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = config.simulation.catalog();
    if json {
        return print_json(&catalog.modes());
    }

    println!(" id  width height  hz  clock  bpp");
    for m in catalog.iter() {
        println!(
            "{:3}  {:5} {:6} {:3} {:4}MHz {:4}",
            m.mode_number, m.width, m.height, m.hz, m.clock_mhz, m.bpp
        );
    }
    if let Some(b) = catalog.size_bounds() {
        println!(
            "size range {}x{} .. {}x{}",
            b.min_width, b.min_height, b.max_width, b.max_height
        );
    }
    Ok(())
}

fn run_mode_request(
    name: &str,
    config: &ToolConfig,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let timing = preset(name)?;
    let selection = select_mode(
        &config.simulation.catalog(),
        &config.to_device_config(),
        &timing,
    )?;
    let request = ModeRequest::new(&timing, selection.clock.params);
    let bytes = hex(&request.encode());

    if json {
        return print_json(&ModeRequestReport {
            preset: name.to_string(),
            mode_id: selection.mode_id,
            clock: selection.clock,
            bytes,
        });
    }
    println!("timing    {timing}");
    println!("mode id   {}", selection.mode_id);
    println!(
        "pll       {} ({} kHz, {} ppm)",
        selection.clock.params,
        selection.clock.achieved_khz(),
        selection.clock.error_ppm()
    );
    println!("SET_MODE  {bytes}");
    Ok(())
}

async fn run_stream(
    name: &str,
    frames: u32,
    config: &ToolConfig,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let timing = preset(name)?;
    let adapter = Arc::new(config.simulation.build_adapter());
    let device = Trigger5Device::attach(adapter, config.to_device_config()).await?;

    let connector = device.detect().await;
    info!(?connector, kind = ?device.connector_type(), "connector");
    device.set_mode(&timing).await?;

    let mut source = TestPattern::new(timing.hdisplay, timing.vdisplay);
    let mut last = None;
    for _ in 0..frames {
        match device.present(&mut source, None).await {
            Ok(handle) => last = handle,
            Err(e @ Trigger5Error::AllocationFailure { .. }) => warn!(error = %e, "frame dropped"),
            Err(e) => return Err(e.into()),
        }
    }
    if let Some(handle) = last {
        let status = handle.await;
        info!(?status, "last frame");
    }

    let stats = device.stats().await;
    device.detach().await;

    if json {
        return print_json(&StreamReport {
            preset: name.to_string(),
            connector,
            frames,
            stats,
        });
    }
    println!("streamed {frames} frames of {timing}");
    println!(
        "completed {} timed out {} failed {} abandoned {}",
        stats.completed, stats.timed_out, stats.failed, stats.abandoned
    );
    println!("bytes sent {}", stats.bytes_sent);
    Ok(())
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&ToolConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let config = ToolConfig::load(&cli.config);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("trigger5-tool v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(Command::Pll { khz }) => run_pll(khz, &config, cli.json),
        Some(Command::Modes) | None => run_modes(&config, cli.json),
        Some(Command::ModeRequest { preset }) => run_mode_request(&preset, &config, cli.json),
        Some(Command::Stream { preset, frames }) => {
            run_stream(&preset, frames, &config, cli.json).await
        }
    }
}
