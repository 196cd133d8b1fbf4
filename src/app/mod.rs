use std::time::{Duration, Instant};

use eframe::egui::{self, Context};
use log::info;

mod graph;
mod panels;
mod render_utils;
mod session;
mod ui;

pub use session::{Flags, SessionConfig};

use session::{Phase, Session};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct VisionApp {
    config: SessionConfig,
    state: AppState,
}

enum AppState {
    Running(Box<ViewModel>),
    Error(String),
}

struct ViewModel {
    session: Session,
    address_input: String,
    search: String,
    network_choice: String,
    show_labels: bool,
}

impl VisionApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, config: SessionConfig) -> Self {
        let state = Self::start(&config);
        Self { config, state }
    }

    fn start(config: &SessionConfig) -> AppState {
        info!(
            "starting session on {} (api base {:?})",
            config.network, config.api_base
        );
        AppState::Running(Box::new(ViewModel::new(Session::start(config.clone()))))
    }
}

impl eframe::App for VisionApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        let mut transition = None;
        let now = Instant::now();

        match &mut self.state {
            AppState::Running(model) => {
                model.session.pump(now);

                match model.session.phase() {
                    Phase::Connecting => {
                        egui::CentralPanel::default().show(ctx, |ui| {
                            ui.vertical_centered(|ui| {
                                ui.add_space(120.0);
                                ui.heading("Starting scoring worker...");
                                ui.add_space(8.0);
                                ui.spinner();
                            });
                        });
                    }
                    Phase::Failed(error) => transition = Some(AppState::Error(error.clone())),
                    Phase::Ready => model.show(ctx, now),
                }

                if let Some(due) = model.session.next_deadline() {
                    ctx.request_repaint_after(due.saturating_duration_since(now));
                }
                if model.session.is_busy() {
                    ctx.request_repaint_after(POLL_INTERVAL);
                }
            }
            AppState::Error(error) => {
                egui::CentralPanel::default().show(ctx, |ui| {
                    ui.heading("Scoring worker unavailable");
                    ui.add_space(6.0);
                    ui.label(error.as_str());
                    ui.add_space(10.0);
                    if ui.button("Retry").clicked() {
                        transition = Some(Self::start(&self.config));
                    }
                });
            }
        }

        if let Some(next_state) = transition {
            self.state = next_state;
        }
    }
}
