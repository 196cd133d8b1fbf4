mod app;
mod util;
mod vision;

use std::time::Duration;

use clap::Parser;

use app::{Flags, SessionConfig};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Scoring API base URL. Without one, neighbors come from an offline
    /// synthetic fallback.
    #[arg(long, env = "VISION_API_BASE", default_value = "")]
    api_base: String,

    #[arg(long, default_value = "eth")]
    network: String,

    /// Upper bound on concurrent score requests during a batch.
    #[arg(long, default_value_t = 8)]
    concurrency: usize,

    /// Address to focus once the worker is ready.
    #[arg(long)]
    seed: Option<String>,

    /// Quiet period before a streamed score is rendered.
    #[arg(long, default_value_t = 180)]
    debounce_ms: u64,

    /// Node count above which labels are hidden.
    #[arg(long, default_value_t = 150)]
    label_threshold: usize,

    #[arg(long, default_value_t = 120)]
    default_cap: usize,

    /// Neighbors added per "Load more".
    #[arg(long, default_value_t = 120)]
    more_step: usize,

    /// Hide the signal badge panel.
    #[arg(long)]
    no_signals: bool,
}

impl Args {
    fn into_config(self) -> SessionConfig {
        SessionConfig {
            api_base: self.api_base.trim().to_owned(),
            network: self.network.trim().to_lowercase(),
            concurrency: self.concurrency.max(1),
            seed: self.seed.filter(|seed| !seed.trim().is_empty()),
            flags: Flags {
                debounce: Duration::from_millis(self.debounce_ms),
                label_threshold: self.label_threshold,
                default_cap: self.default_cap.max(1),
                more_step: self.more_step.max(1),
                enable_signals: !self.no_signals,
            },
        }
    }
}

fn main() -> eframe::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config();
    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default().with_inner_size([1440.0, 920.0]),
        ..Default::default()
    };

    eframe::run_native(
        "vision-graph",
        options,
        Box::new(move |cc| Ok(Box::new(app::VisionApp::new(cc, config.clone())))),
    )
}
