use std::time::Instant;

use eframe::egui::{self, Key, Ui};

use super::super::ViewModel;
use super::super::session::{FocusOrigin, NETWORKS};

impl ViewModel {
    pub(in crate::app) fn draw_controls(&mut self, ui: &mut Ui, now: Instant) {
        ui.heading("Explore");
        ui.separator();
        ui.add_space(4.0);

        ui.label("Address")
            .on_hover_text("Any case is accepted; identifiers are compared lowercased.");
        let field = ui.text_edit_singleline(&mut self.address_input);
        let submitted = field.lost_focus() && ui.input(|input| input.key_pressed(Key::Enter));

        ui.horizontal(|ui| {
            let can_focus = !self.address_input.trim().is_empty();
            let focus = ui
                .add_enabled(can_focus, egui::Button::new("Focus"))
                .on_hover_text("Score the address and load its neighbors.");
            if (focus.clicked() || submitted) && can_focus {
                let address = self.address_input.trim().to_owned();
                self.session
                    .focus_address(&address, FocusOrigin::Push, now);
            }

            let navigator = self.session.navigator();
            let (can_back, can_forward) = (navigator.can_go_back(), navigator.can_go_forward());
            if ui.add_enabled(can_back, egui::Button::new("◀")).clicked() {
                self.session.back(now);
            }
            if ui.add_enabled(can_forward, egui::Button::new("▶")).clicked() {
                self.session.forward(now);
            }
        });

        ui.separator();

        egui::ComboBox::from_label("Network")
            .selected_text(self.network_choice.as_str())
            .show_ui(ui, |ui| {
                for network in NETWORKS {
                    ui.selectable_value(&mut self.network_choice, network.to_owned(), network);
                }
            });
        if self.network_choice != self.session.network() {
            let network = self.network_choice.clone();
            self.session.switch_network(&network);
        }

        ui.horizontal(|ui| {
            if ui
                .button("Refresh")
                .on_hover_text("Batch-score every node in the graph that has no score yet.")
                .clicked()
            {
                self.session.score_visible();
            }
            if ui
                .button("Clear")
                .on_hover_text("Empty the graph and reset the panels.")
                .clicked()
            {
                self.session.clear();
                self.address_input.clear();
            }
        });

        ui.separator();

        ui.label("Search")
            .on_hover_text("Fuzzy-highlight matching nodes without changing the graph.");
        if ui.text_edit_singleline(&mut self.search).changed() {
            self.session.graph_mut().set_search(&self.search);
        }
        if !self.search.trim().is_empty() {
            ui.small(format!(
                "{} matching nodes",
                self.session.graph().match_count()
            ));
        }

        ui.separator();

        if ui.checkbox(&mut self.show_labels, "Labels").changed() {
            self.session
                .graph_mut()
                .set_label_visibility(self.show_labels);
        }
        let graph = self.session.graph();
        if self.show_labels && !graph.labels_visible() && graph.node_count() > 0 {
            ui.small(format!(
                "Hidden above {} nodes.",
                graph.label_threshold()
            ));
        }

        if let Some(current) = self.session.navigator().current() {
            ui.add_space(8.0);
            ui.small(format!(
                "History: {} entries, at {current}",
                self.session.navigator().len()
            ));
        }
    }
}
