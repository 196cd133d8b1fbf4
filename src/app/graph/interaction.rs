use eframe::egui::{self, Pos2, Rect, Ui};

use super::{GraphEngine, GraphEvent, NODE_RADIUS, to_surface};

const WHEEL_ZOOM_IN: f32 = 1.1;
const WHEEL_ZOOM_OUT: f32 = 0.9;
const MIN_HIT_RADIUS: f32 = 4.0;

impl GraphEngine {
    /// Topmost node under a surface point.
    pub fn node_at(&self, pointer: Pos2) -> Option<usize> {
        let radius = (NODE_RADIUS * self.transform.scale).max(MIN_HIT_RADIUS);
        self.positions
            .iter()
            .enumerate()
            .filter_map(|(index, position)| {
                let distance = self.transform.apply(*position).distance(pointer);
                (distance <= radius).then_some((index, distance))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(index, _)| index)
    }

    /// Tracks the hovered node and reports enter/leave transitions.
    pub fn pointer_moved(&mut self, pointer: Option<Pos2>) {
        let hovered = pointer.and_then(|pointer| self.node_at(pointer));
        if hovered == self.hovered {
            return;
        }
        self.hovered = hovered;
        let id = self.hovered_id().map(str::to_owned);
        self.events.push(GraphEvent::HoverNode(id));
    }

    pub fn pointer_clicked(&mut self, pointer: Pos2) {
        if let Some(node) = self
            .node_at(pointer)
            .and_then(|index| self.data.nodes.get(index))
        {
            self.events.push(GraphEvent::SelectNode(node.id.clone()));
        }
    }

    pub fn wheel_zoom(&mut self, pointer: Pos2, scroll: f32) {
        if scroll.abs() <= f32::EPSILON {
            return;
        }
        let factor = if scroll > 0.0 {
            WHEEL_ZOOM_IN
        } else {
            WHEEL_ZOOM_OUT
        };
        self.zoom_at(pointer, factor);
    }

    pub(in crate::app) fn handle_graph_input(
        &mut self,
        ui: &Ui,
        rect: Rect,
        response: &egui::Response,
    ) {
        let hover = ui
            .input(|input| input.pointer.hover_pos())
            .filter(|pos| rect.contains(*pos));

        if response.hovered() {
            let scroll = ui.input(|input| input.raw_scroll_delta.y);
            let pointer = hover.unwrap_or_else(|| rect.center());
            self.wheel_zoom(to_surface(rect, pointer), scroll);
        }

        if response.dragged_by(egui::PointerButton::Primary)
            || response.dragged_by(egui::PointerButton::Secondary)
            || response.dragged_by(egui::PointerButton::Middle)
        {
            self.pan_by(response.drag_delta());
        }

        self.pointer_moved(hover.map(|pos| to_surface(rect, pos)));

        if response.clicked_by(egui::PointerButton::Primary)
            && let Some(pos) = response.interact_pointer_pos()
        {
            self.pointer_clicked(to_surface(rect, pos));
        }

        if self.hovered.is_some() {
            ui.output_mut(|output| {
                output.cursor_icon = egui::CursorIcon::PointingHand;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use eframe::egui::{pos2, vec2};

    use super::*;
    use crate::vision::record::{GraphDataset, GraphNode};

    fn engine() -> GraphEngine {
        let mut engine = GraphEngine::new(150);
        engine.set_viewport(vec2(400.0, 400.0));
        engine.set_data(GraphDataset {
            nodes: ["0xa", "0xb"]
                .into_iter()
                .map(|id| GraphNode::new(id, "eth"))
                .collect(),
            links: Vec::new(),
        });
        engine.take_events();
        engine
    }

    #[test]
    fn hover_reports_enter_and_leave_once() {
        let mut engine = engine();
        engine.pointer_moved(Some(pos2(203.0, 198.0)));
        engine.pointer_moved(Some(pos2(201.0, 200.0)));
        engine.pointer_moved(Some(pos2(20.0, 20.0)));
        assert_eq!(
            engine.take_events(),
            vec![
                GraphEvent::HoverNode(Some("0xa".to_owned())),
                GraphEvent::HoverNode(None),
            ]
        );
    }

    #[test]
    fn clicks_select_the_node_under_the_pointer() {
        let mut engine = engine();
        // Second node sits on the ring to the right of the focus.
        engine.pointer_clicked(pos2(200.0 + 112.0, 200.0));
        engine.pointer_clicked(pos2(5.0, 5.0));
        assert_eq!(
            engine.take_events(),
            vec![GraphEvent::SelectNode("0xb".to_owned())]
        );
    }

    #[test]
    fn hit_testing_follows_the_view_transform() {
        let mut engine = engine();
        engine.pan_by(vec2(50.0, 0.0));
        assert_eq!(engine.node_at(pos2(200.0, 200.0)), None);
        assert_eq!(engine.node_at(pos2(250.0, 200.0)), Some(0));

        engine.wheel_zoom(pos2(250.0, 200.0), 1.0);
        assert_eq!(engine.node_at(pos2(250.0, 200.0)), Some(0));
    }
}
