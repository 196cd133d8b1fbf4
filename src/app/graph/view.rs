use std::time::Instant;

use eframe::egui::{Align2, Color32, FontId, Sense, Stroke, Ui, vec2};

use crate::util::short_id;

use super::super::render_utils::{
    BLOCKED_COLOR, IDLE_NODE_COLOR, LABEL_COLOR, blend_color, circle_visible, draw_background,
    edge_stroke_width, edge_visible, with_alpha,
};
use super::{GraphEngine, LABEL_OFFSET, NODE_CORE_RADIUS, NODE_RADIUS, NodeState, to_screen};

const SELECTED_COLOR: Color32 = Color32::from_rgb(245, 206, 93);
const MATCH_COLOR: Color32 = Color32::from_rgb(103, 196, 255);
const OUTER_FILL: Color32 = Color32::from_rgb(16, 26, 28);

impl GraphEngine {
    /// Paints the graph into the remaining space of `ui` and feeds pointer
    /// input back into the engine. `readout` is drawn in the top-left corner
    /// while a node is hovered.
    pub(in crate::app) fn show(&mut self, ui: &mut Ui, readout: Option<&str>, now: Instant) {
        let (rect, response) = ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());
        let painter = ui.painter_at(rect);

        self.set_viewport(rect.size());
        self.handle_graph_input(ui, rect, &response);

        let transform = self.transform;
        draw_background(&painter, rect, transform);

        if self.data.nodes.is_empty() {
            painter.text(
                rect.center(),
                Align2::CENTER_CENTER,
                "No graph loaded",
                FontId::proportional(14.0),
                LABEL_COLOR,
            );
            return;
        }

        let scale = transform.scale;
        let screen = self
            .positions
            .iter()
            .map(|position| to_screen(rect, transform, *position))
            .collect::<Vec<_>>();

        for (a, b, weight) in self.resolved_links() {
            let (start, end) = (screen[a], screen[b]);
            if !edge_visible(rect, start, end, 2.0) {
                continue;
            }
            let touches_hover = self.hovered.is_some_and(|hovered| hovered == a || hovered == b);
            let color = if touches_hover {
                Color32::from_rgba_unmultiplied(150, 190, 185, 220)
            } else {
                Color32::from_rgba_unmultiplied(70, 92, 90, 170)
            };
            painter.line_segment(
                [start, end],
                Stroke::new(edge_stroke_width(weight) * scale, color),
            );
        }

        let time = ui.input(|input| input.time) as f32;
        let labels = self.labels_visible();
        let label_font = FontId::proportional((10.0 * scale).clamp(6.0, 22.0));
        let mut animating = false;

        for (index, node) in self.data.nodes.iter().enumerate() {
            let position = screen[index];
            let radius = NODE_RADIUS * scale;
            if !circle_visible(rect, position, radius + 12.0 * scale) {
                continue;
            }

            let halo = self.halo(&node.id).copied();
            let state = self.node_state(&node.id);
            let halo_color = halo.map_or(IDLE_NODE_COLOR, |halo| halo.color);
            let intensity = halo.map_or(0.35, |halo| halo.intensity);

            let mut core = if self.is_match(index) {
                blend_color(halo_color, MATCH_COLOR, 0.65)
            } else {
                halo_color
            };
            if state == NodeState::Hovered {
                core = blend_color(core, Color32::WHITE, 0.3);
            }

            painter.circle_filled(position, radius, OUTER_FILL);
            painter.circle_stroke(
                position,
                radius,
                Stroke::new(
                    (1.0 + intensity * 1.8) * scale,
                    with_alpha(halo_color, 0.35 + intensity * 0.65),
                ),
            );
            painter.circle_filled(position, NODE_CORE_RADIUS * scale, core);

            if halo.is_some_and(|halo| halo.blocked) {
                let pulse = 0.5 + 0.5 * (time * 5.0).sin();
                painter.circle_stroke(
                    position,
                    radius + (3.0 + pulse * 4.0) * scale,
                    Stroke::new(1.5 * scale, with_alpha(BLOCKED_COLOR, 0.7 * (1.0 - pulse))),
                );
                animating = true;
            }

            let flash = self.flash_strength(&node.id, now);
            if flash > 0.0 {
                painter.circle_stroke(
                    position,
                    radius + (1.0 - flash) * 10.0 * scale,
                    Stroke::new(2.0 * scale, with_alpha(halo_color, flash)),
                );
                animating = true;
            }

            if state == NodeState::Selected {
                painter.circle_stroke(
                    position,
                    radius + 3.0 * scale,
                    Stroke::new(1.6 * scale, SELECTED_COLOR),
                );
            }

            if labels {
                painter.text(
                    position - vec2(0.0, LABEL_OFFSET * scale),
                    Align2::CENTER_BOTTOM,
                    short_id(&node.id),
                    label_font.clone(),
                    LABEL_COLOR,
                );
            }
        }

        if animating || response.dragged() {
            ui.ctx().request_repaint();
        }

        if let Some(readout) = readout.filter(|_| self.hovered.is_some()) {
            painter.text(
                rect.left_top() + vec2(10.0, 10.0),
                Align2::LEFT_TOP,
                readout,
                FontId::proportional(13.0),
                Color32::from_gray(240),
            );
        }
    }
}
