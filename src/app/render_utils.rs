use eframe::egui::{Color32, Painter, Pos2, Rect, Stroke};

use super::graph::ViewTransform;

pub(super) const BLOCKED_COLOR: Color32 = Color32::from_rgb(0xef, 0x44, 0x44);
pub(super) const IDLE_NODE_COLOR: Color32 = Color32::from_rgb(0x00, 0xee, 0xc3);
pub(super) const LABEL_COLOR: Color32 = Color32::from_rgb(0x8a, 0xa3, 0xa0);

/// Score bands from hottest to coolest. A blocked entity always takes the
/// blocked color regardless of its score.
pub(super) fn score_color(score: f64, blocked: bool) -> Color32 {
    if blocked {
        return BLOCKED_COLOR;
    }
    match score {
        s if s >= 80.0 => Color32::from_rgb(0xff, 0x3b, 0x3b),
        s if s >= 60.0 => Color32::from_rgb(0xff, 0xb0, 0x20),
        s if s >= 40.0 => Color32::from_rgb(0xff, 0xc8, 0x57),
        s if s >= 20.0 => Color32::from_rgb(0x22, 0xd3, 0x7b),
        _ => IDLE_NODE_COLOR,
    }
}

/// Low scores keep a visible floor.
pub(super) fn halo_intensity(score: f64) -> f32 {
    ((score / 100.0) as f32).clamp(0.25, 1.0)
}

/// Log-compressed so heavy links stay readable next to single transfers.
pub(super) fn edge_stroke_width(weight: f64) -> f32 {
    let weight = if weight.is_finite() { weight.max(0.0) } else { 1.0 };
    ((weight + 1.0).ln() + 0.5).max(1.0) as f32
}

pub(super) fn blend_color(base: Color32, overlay: Color32, amount: f32) -> Color32 {
    let amount = amount.clamp(0.0, 1.0);
    let inverse = 1.0 - amount;

    Color32::from_rgba_unmultiplied(
        ((base.r() as f32 * inverse) + (overlay.r() as f32 * amount)) as u8,
        ((base.g() as f32 * inverse) + (overlay.g() as f32 * amount)) as u8,
        ((base.b() as f32 * inverse) + (overlay.b() as f32 * amount)) as u8,
        ((base.a() as f32 * inverse) + (overlay.a() as f32 * amount)) as u8,
    )
}

pub(super) fn with_alpha(color: Color32, alpha: f32) -> Color32 {
    Color32::from_rgba_unmultiplied(
        color.r(),
        color.g(),
        color.b(),
        (alpha.clamp(0.0, 1.0) * 255.0) as u8,
    )
}

pub(super) fn draw_background(painter: &Painter, rect: Rect, transform: ViewTransform) {
    painter.rect_filled(rect, 0.0, Color32::from_rgb(11, 17, 19));

    let step = (48.0 * transform.scale.clamp(0.6, 1.8)).max(20.0);
    let origin = rect.min + transform.translate;
    let stroke = Stroke::new(1.0, Color32::from_rgba_unmultiplied(40, 60, 58, 60));

    let mut x = rect.left() + (origin.x - rect.left()).rem_euclid(step);
    while x < rect.right() {
        painter.line_segment([Pos2::new(x, rect.top()), Pos2::new(x, rect.bottom())], stroke);
        x += step;
    }

    let mut y = rect.top() + (origin.y - rect.top()).rem_euclid(step);
    while y < rect.bottom() {
        painter.line_segment([Pos2::new(rect.left(), y), Pos2::new(rect.right(), y)], stroke);
        y += step;
    }
}

pub(super) fn circle_visible(rect: Rect, position: Pos2, radius: f32) -> bool {
    !(position.x + radius < rect.left()
        || position.x - radius > rect.right()
        || position.y + radius < rect.top()
        || position.y - radius > rect.bottom())
}

pub(super) fn edge_visible(rect: Rect, start: Pos2, end: Pos2, padding: f32) -> bool {
    let min_x = start.x.min(end.x) - padding;
    let max_x = start.x.max(end.x) + padding;
    let min_y = start.y.min(end.y) - padding;
    let max_y = start.y.max(end.y) + padding;

    if max_x < rect.left() || min_x > rect.right() || max_y < rect.top() || min_y > rect.bottom() {
        return false;
    }

    if rect.contains(start) || rect.contains(end) {
        return true;
    }

    let top_left = rect.left_top();
    let top_right = rect.right_top();
    let bottom_left = rect.left_bottom();
    let bottom_right = rect.right_bottom();

    segments_intersect(start, end, top_left, top_right)
        || segments_intersect(start, end, top_right, bottom_right)
        || segments_intersect(start, end, bottom_right, bottom_left)
        || segments_intersect(start, end, bottom_left, top_left)
}

fn segments_intersect(a1: Pos2, a2: Pos2, b1: Pos2, b2: Pos2) -> bool {
    fn cross(o: Pos2, a: Pos2, b: Pos2) -> f32 {
        let oa = a - o;
        let ob = b - o;
        (oa.x * ob.y) - (oa.y * ob.x)
    }

    let c1 = cross(a1, a2, b1);
    let c2 = cross(a1, a2, b2);
    let c3 = cross(b1, b2, a1);
    let c4 = cross(b1, b2, a2);

    (c1 <= 0.0 && c2 >= 0.0 || c1 >= 0.0 && c2 <= 0.0)
        && (c3 <= 0.0 && c4 >= 0.0 || c3 >= 0.0 && c4 <= 0.0)
}
