use eframe::egui::{self, Color32, RichText, Ui};

use crate::util::abbreviate_id;

use super::super::ViewModel;
use super::super::render_utils::{BLOCKED_COLOR, score_color};

const RAISE_COLOR: Color32 = Color32::from_rgb(0xf5, 0x9e, 0x0b);
const LOWER_COLOR: Color32 = Color32::from_rgb(0x22, 0xc5, 0x5e);

impl ViewModel {
    pub(in crate::app) fn draw_details(&mut self, ui: &mut Ui) {
        ui.heading("Entity Details");
        ui.add_space(6.0);

        let Some(detail) = self.session.panels().detail() else {
            if self.session.is_scoring() {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label("Scoring...");
                });
            } else {
                ui.label("Focus an address or click a node in the graph.");
            }
            return;
        };

        ui.label(RichText::new(abbreviate_id(&detail.id)).strong());
        ui.small(detail.id.as_str());
        if let Some(label) = &detail.label {
            ui.label(RichText::new(label).italics());
        }
        ui.label(format!("Network: {}", detail.network));
        ui.add_space(6.0);

        let color = score_color(detail.score, detail.blocked);
        ui.add(
            egui::ProgressBar::new((detail.score / 100.0).clamp(0.0, 1.0) as f32)
                .fill(color)
                .text(format!("Risk {:.0}", detail.score)),
        );
        if detail.blocked {
            ui.label(RichText::new("Blocked").strong().color(BLOCKED_COLOR));
        }

        ui.separator();
        egui::Grid::new("entity_features")
            .num_columns(2)
            .striped(true)
            .show(ui, |ui| {
                ui.label("Wallet age");
                ui.label(detail.age.as_str());
                ui.end_row();
                ui.label("Mixer taint");
                ui.label(detail.mixer_taint.as_str());
                ui.end_row();
                ui.label("Neighbors flagged");
                ui.label(detail.neighbors_flagged.as_str());
                ui.end_row();
            });

        ui.separator();
        ui.label(RichText::new("Neighborhood").strong());
        egui::Grid::new("entity_neighbors")
            .num_columns(2)
            .show(ui, |ui| {
                ui.label("Neighbors");
                ui.label(detail.neighbors.count.as_str());
                ui.end_row();
                ui.label("Average age");
                ui.label(detail.neighbors.avg_age.as_str());
                ui.end_row();
                ui.label("Inactive");
                ui.label(detail.neighbors.inactive.as_str());
                ui.end_row();
            });
        if detail.neighbors.limited {
            ui.small("Limited neighbor data; metrics may be conservative.");
        }

        ui.separator();
        ui.label(RichText::new("Score breakdown").strong());
        if detail.breakdown.is_empty() {
            ui.label("No breakdown reported.");
            return;
        }
        egui::Grid::new("entity_breakdown")
            .num_columns(2)
            .show(ui, |ui| {
                for entry in &detail.breakdown {
                    ui.label(entry.label.as_str());
                    let color = if entry.delta >= 0.0 {
                        RAISE_COLOR
                    } else {
                        LOWER_COLOR
                    };
                    ui.label(RichText::new(format!("{:+.0}", entry.delta)).color(color));
                    ui.end_row();
                }
            });
    }
}
