use std::time::Instant;

use eframe::egui::{self, Align, Context, Layout};

use crate::util::short_id;

use super::super::ViewModel;
use super::super::session::Session;

impl ViewModel {
    pub(in crate::app) fn new(session: Session) -> Self {
        let network_choice = session.network().to_owned();
        Self {
            session,
            address_input: String::new(),
            search: String::new(),
            network_choice,
            show_labels: true,
        }
    }

    pub(in crate::app) fn show(&mut self, ctx: &Context, now: Instant) {
        egui::TopBottomPanel::top("top_bar")
            .resizable(false)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.heading("vision-graph");
                    ui.separator();
                    ui.label(format!("network: {}", self.session.network()));
                    ui.label(format!("nodes: {}", self.session.graph().node_count()));
                    ui.label(format!("scored: {}", self.session.cache().len()));
                    if let Some(selected) = self.session.selected() {
                        ui.label(format!("focus: {}", short_id(selected)))
                            .on_hover_text(selected);
                    }
                    ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                        ui.label(self.session.batch_status());
                    });
                });
            });

        egui::TopBottomPanel::bottom("status_bar")
            .resizable(false)
            .show(ctx, |ui| self.draw_status_bar(ui));

        egui::SidePanel::left("controls")
            .resizable(true)
            .default_width(300.0)
            .show(ctx, |ui| self.draw_controls(ui, now));

        egui::SidePanel::right("details")
            .resizable(true)
            .default_width(340.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical()
                    .auto_shrink([false, false])
                    .show(ui, |ui| {
                        self.draw_details(ui);
                        ui.add_space(10.0);
                        self.draw_signals(ui);
                    });
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui
                    .button("Zoom fit")
                    .on_hover_text("Frame every node in view.")
                    .clicked()
                {
                    self.session.graph_mut().zoom_fit();
                }
                if ui
                    .button("Reset view")
                    .on_hover_text("Return to the identity pan and zoom.")
                    .clicked()
                {
                    self.session.graph_mut().reset_view();
                }
            });
            ui.separator();

            let readout = self.session.hover_readout().map(str::to_owned);
            self.session
                .graph_mut()
                .show(ui, readout.as_deref(), now);
        });
    }

    fn draw_status_bar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let status = self.session.graph_status();
            if status.loading {
                ui.spinner();
            }
            ui.label(status.text.as_str());

            if status.overflow > 0 {
                let more = ui
                    .add_enabled(!status.loading, egui::Button::new("Load more"))
                    .on_hover_text(format!(
                        "{} neighbors beyond the current cap of {}.",
                        status.overflow,
                        self.session.neighbor_cap()
                    ));
                if more.clicked() {
                    self.session.load_more();
                }
            }
        });
    }
}
