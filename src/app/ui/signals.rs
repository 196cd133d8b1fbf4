use eframe::egui::{Color32, RichText, Ui};

use super::super::ViewModel;
use super::super::panels::Tone;
use super::super::render_utils::BLOCKED_COLOR;

fn tone_color(tone: Tone) -> Color32 {
    match tone {
        Tone::Risk => BLOCKED_COLOR,
        Tone::Safe => Color32::from_rgb(0x22, 0xc5, 0x5e),
        Tone::Warn => Color32::from_rgb(0xf5, 0x9e, 0x0b),
        Tone::Info => Color32::from_rgb(0x67, 0xc4, 0xff),
    }
}

impl ViewModel {
    pub(in crate::app) fn draw_signals(&mut self, ui: &mut Ui) {
        let panels = self.session.panels();
        if !panels.signals_enabled() {
            return;
        }

        ui.heading("Signals");
        ui.add_space(4.0);

        let Some(badges) = panels.signals() else {
            ui.label("No signals yet.");
            return;
        };
        ui.horizontal_wrapped(|ui| {
            for badge in badges {
                ui.label(
                    RichText::new(format!(" {} ", badge.label))
                        .color(Color32::BLACK)
                        .background_color(tone_color(badge.tone)),
                );
            }
        });
    }
}
