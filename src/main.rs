use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use egui::ViewportBuilder;

use gpu_dashboard::app::DashboardApp;
use gpu_dashboard::attribution::PsTable;
use gpu_dashboard::command::SystemRunner;
use gpu_dashboard::config::{Args, Backend, DashboardSettings};
use gpu_dashboard::nvml::NvmlQuery;
use gpu_dashboard::poll::Collector;
use gpu_dashboard::query::{DeviceQuery, SmiQuery};
use gpu_dashboard::{logging, render};

fn create_query(args: &Args, runner: Arc<SystemRunner>) -> Box<dyn DeviceQuery> {
    if args.backend == Backend::Nvml {
        match NvmlQuery::new() {
            Ok(query) => {
                tracing::info!("✅ NVML backend initialized");
                return Box::new(query);
            }
            Err(err) => tracing::warn!("❌ NVML backend unavailable ({err}), using nvidia-smi"),
        }
    }
    Box::new(SmiQuery::new(runner, args.nvidia_smi.clone()))
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init();

    let runner = Arc::new(SystemRunner::new(args.timeout()).context("build tool runtime")?);
    tracing::debug!("external tools bounded by {:?}", runner.timeout());
    let query = create_query(&args, Arc::clone(&runner));
    let collector = Collector::new(query, Box::new(PsTable::new(runner, args.ps.clone())));

    if args.once {
        let snapshot = collector.poll_once();
        if !snapshot.available {
            tracing::warn!("GPU telemetry unavailable");
        }
        if args.json {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        } else {
            print!("{}", render::text_table(&snapshot.records));
        }
        return Ok(());
    }

    let defaults = DashboardSettings {
        refresh_secs: args.interval_secs,
        ..DashboardSettings::default()
    };
    let native_options = eframe::NativeOptions {
        viewport: ViewportBuilder::default().with_inner_size([1100.0, 800.0]),
        ..Default::default()
    };

    eframe::run_native(
        "GPU Usage Dashboard",
        native_options,
        Box::new(move |cc| Ok(Box::new(DashboardApp::new(cc, collector, defaults)))),
    )
    .map_err(|err| anyhow::anyhow!("failed to start dashboard: {err}"))
}
