//! Scene compositing using tiny-skia
//!
//! Draws one viewport frame in a fixed order: base image, procedural layers,
//! ML vector layers, coordinate grid, ROI polygon, user annotations and drafts,
//! label backgrounds, UTM center readout, scale bar. Layer overlays blend additively; user
//! annotations paint over them.

use image::RgbaImage;
use tiny_skia::{
    BlendMode, Color, FillRule, FilterQuality, GradientStop, LineCap, LineJoin, LinearGradient,
    Paint, Path, PathBuilder, Pixmap, PixmapPaint, SpreadMode, Stroke, StrokeDash, Transform,
};

use super::geometry::{self, annotation, detection, hud, roi};
use super::labels::{self, PlacedLabel};
use super::layers::LayerStack;
use crate::annotations::tools::Draft;
use crate::config::ShapeColor;
use crate::domain::{
    Annotation, AnnotationGeometry, GeoPoint, GroundSampleDistance, ImagePoint, ImageSize, Layer,
    LayerCategory, SceneAnalysis, UtmInfo, ViewportPoint,
};
use crate::measure;
use crate::transform::{ViewTransform, from_geographic, to_geographic, to_image, to_screen};

/// Viewer background behind the image
const BACKGROUND: [u8; 4] = [24, 24, 27, 255];

/// Upper bound on grid lines per axis
const MAX_GRID_LINES: usize = 64;

/// Strongest alpha a procedural layer reaches at metric 100 and full opacity
const PROCEDURAL_MAX_ALPHA: f32 = 0.6;

/// The ROI polygon as the overlay draws it
#[derive(Clone, Copy, Debug)]
pub struct RoiOverlay<'a> {
    pub vertices: &'a [ImagePoint],
    pub color: ShapeColor,
}

/// The shape being drawn, with the color it will get
#[derive(Clone, Copy, Debug)]
pub struct DraftOverlay<'a> {
    pub draft: &'a Draft,
    pub cursor: Option<ImagePoint>,
    pub color: ShapeColor,
}

/// Everything one frame needs
#[derive(Clone, Copy, Debug)]
pub struct Scene<'a> {
    pub base: Option<&'a RgbaImage>,
    pub image_size: ImageSize,
    pub layers: &'a LayerStack,
    pub analysis: Option<&'a SceneAnalysis>,
    pub roi: Option<RoiOverlay<'a>>,
    pub annotations: &'a [Annotation],
    pub draft: Option<DraftOverlay<'a>>,
    pub gsd: GroundSampleDistance,
    pub utm: Option<&'a UtmInfo>,
}

/// A rendered frame and the labels placed on it.
///
/// Label backgrounds are already painted; the text is left to the caller's
/// text renderer.
#[derive(Debug)]
pub struct RenderOutput {
    pub image: RgbaImage,
    pub labels: Vec<PlacedLabel>,
}

/// Render `scene` into a `viewport`-sized frame.
///
/// Returns `None` for an empty viewport.
pub fn render_scene(
    scene: &Scene<'_>,
    view: &ViewTransform,
    viewport: ImageSize,
) -> Option<RenderOutput> {
    let mut pixmap = Pixmap::new(viewport.width, viewport.height)?;
    let [r, g, b, a] = BACKGROUND;
    pixmap.fill(Color::from_rgba8(r, g, b, a));

    for layer in scene.layers.visible_in_z_order() {
        match layer.category {
            LayerCategory::Original => draw_base(&mut pixmap, scene.base, layer, view),
            LayerCategory::Trees => {
                if let Some(analysis) = scene.analysis {
                    draw_trees(&mut pixmap, analysis, layer, view);
                }
            }
            LayerCategory::Pests => {
                if let Some(analysis) = scene.analysis {
                    draw_pests(&mut pixmap, analysis, layer, view);
                }
            }
            // Drawn above the grid below
            LayerCategory::Roi => {}
            category if category.is_procedural() => {
                if let Some(metric) = scene.analysis.and_then(|a| procedural_metric(a, category)) {
                    draw_procedural(&mut pixmap, scene.image_size, metric, layer, view);
                }
            }
            _ => {}
        }
    }

    if let Some(utm) = scene.utm {
        draw_utm_grid(&mut pixmap, utm, scene.image_size, view);
    }

    let roi_visible = scene.layers.is_visible(LayerCategory::Roi);
    if let (Some(overlay), Some(layer)) = (scene.roi, scene.layers.get(LayerCategory::Roi))
        && layer.visible
    {
        draw_roi(&mut pixmap, overlay, layer.alpha(), view);
    }

    for a in scene.annotations {
        // The ROI layer owns ROI shapes
        if !matches!(a.geometry, AnnotationGeometry::Roi { .. }) {
            draw_annotation(&mut pixmap, a, view);
        }
    }

    // ROI area labels follow the ROI layer
    let mut placed = labels::layout(
        scene
            .annotations
            .iter()
            .filter(|a| roi_visible || !matches!(a.geometry, AnnotationGeometry::Roi { .. })),
        &scene.gsd,
        view,
    );

    if let Some(draft) = scene.draft {
        draw_draft(&mut pixmap, draft, view);
        placed.extend(labels::draft_label(
            Some(draft.draft),
            draft.cursor,
            &scene.gsd,
            view,
        ));
    }

    if let Some(text) = scene.utm.and_then(UtmInfo::center_readout) {
        placed.push(PlacedLabel {
            at: center_readout_anchor(&text, viewport),
            text,
            approximate: false,
        });
    }

    if let Some(bar) = measure::pick_scale_bar(scene.gsd.meters_per_pixel, view.zoom()) {
        let origin = draw_scale_bar(&mut pixmap, bar.screen_px as f32, viewport);
        placed.push(PlacedLabel {
            text: measure::flag_estimate(bar.label(), &scene.gsd),
            at: origin,
            approximate: scene.gsd.is_estimated,
        });
    }

    for label in &placed {
        draw_label_background(&mut pixmap, label);
    }

    Some(RenderOutput {
        image: to_rgba_image(&pixmap),
        labels: placed,
    })
}

// ============================================================================
// Pixel conversion
// ============================================================================

/// Premultiply an RGBA image into a pixmap
pub fn to_pixmap(img: &RgbaImage) -> Option<Pixmap> {
    let size = tiny_skia::IntSize::from_wh(img.width(), img.height())?;
    let mut data = img.as_raw().clone();
    for px in data.chunks_exact_mut(4) {
        let alpha = px[3] as u16;
        for c in &mut px[..3] {
            *c = ((*c as u16 * alpha + 127) / 255) as u8;
        }
    }
    Pixmap::from_vec(data, size)
}

/// Demultiply a pixmap back into an RGBA image
pub fn to_rgba_image(pixmap: &Pixmap) -> RgbaImage {
    let mut img = RgbaImage::new(pixmap.width(), pixmap.height());
    for (dst, src) in img.pixels_mut().zip(pixmap.pixels()) {
        let c = src.demultiply();
        dst.0 = [c.red(), c.green(), c.blue(), c.alpha()];
    }
    img
}

// ============================================================================
// Paint helpers
// ============================================================================

fn color(color: ShapeColor, alpha: f32) -> Color {
    let [r, g, b, _] = color.to_rgba_u8();
    Color::from_rgba8(r, g, b, (alpha.clamp(0.0, 1.0) * 255.0).round() as u8)
}

fn paint(fill: Color, blend_mode: BlendMode) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(fill);
    paint.anti_alias = true;
    paint.blend_mode = blend_mode;
    paint
}

fn stroke(width: f32, dash: Option<[f32; 2]>) -> Stroke {
    Stroke {
        width,
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        dash: dash.and_then(|d| StrokeDash::new(d.to_vec(), 0.0)),
        ..Default::default()
    }
}

fn screen(p: ImagePoint, view: &ViewTransform) -> (f32, f32) {
    let s = to_screen(p, view);
    (s.x as f32, s.y as f32)
}

fn polyline(points: &[ImagePoint], close: bool, view: &ViewTransform) -> Option<Path> {
    let (first, rest) = points.split_first()?;
    let mut pb = PathBuilder::new();
    let (x, y) = screen(*first, view);
    pb.move_to(x, y);
    for p in rest {
        let (x, y) = screen(*p, view);
        pb.line_to(x, y);
    }
    if close {
        pb.close();
    }
    pb.finish()
}

/// Stroke `path` with a dark border underneath
fn outlined(pixmap: &mut Pixmap, path: &Path, line: Color, width: f32, border: f32) {
    let shadow = paint(Color::from_rgba8(0, 0, 0, 200), BlendMode::SourceOver);
    pixmap.stroke_path(path, &shadow, &stroke(border, None), Transform::identity(), None);
    let main = paint(line, BlendMode::SourceOver);
    pixmap.stroke_path(path, &main, &stroke(width, None), Transform::identity(), None);
}

// ============================================================================
// Layers
// ============================================================================

fn draw_base(pixmap: &mut Pixmap, base: Option<&RgbaImage>, layer: &Layer, view: &ViewTransform) {
    let Some(base) = base else {
        return;
    };
    let Some(source) = to_pixmap(base) else {
        log::warn!("Cannot composite empty base image");
        return;
    };
    let paint = PixmapPaint {
        opacity: layer.alpha(),
        blend_mode: BlendMode::SourceOver,
        quality: FilterQuality::Bilinear,
    };
    pixmap.draw_pixmap(0, 0, source.as_ref(), &paint, view.to_skia(), None);
}

/// Scalar 0-100 metric driving a procedural layer
fn procedural_metric(analysis: &SceneAnalysis, category: LayerCategory) -> Option<f64> {
    match category {
        LayerCategory::Vegetation => analysis.vegetation_pct,
        LayerCategory::Health => analysis.health_index,
        LayerCategory::Water => analysis.water_pct,
        LayerCategory::Heatmap => analysis.heat_index,
        _ => None,
    }
}

fn draw_procedural(
    pixmap: &mut Pixmap,
    size: ImageSize,
    metric: f64,
    layer: &Layer,
    view: &ViewTransform,
) {
    if size.is_empty() {
        return;
    }
    let strength = (metric / 100.0).clamp(0.0, 1.0) as f32 * layer.alpha() * PROCEDURAL_MAX_ALPHA;
    if strength <= 0.0 {
        return;
    }
    let (w, h) = (size.width as f32, size.height as f32);
    let Some(shader) = LinearGradient::new(
        tiny_skia::Point::from_xy(0.0, 0.0),
        tiny_skia::Point::from_xy(w, h),
        vec![
            GradientStop::new(0.0, color(layer.color, strength)),
            GradientStop::new(1.0, color(layer.color, strength * 0.4)),
        ],
        SpreadMode::Pad,
        Transform::identity(),
    ) else {
        return;
    };
    let paint = Paint {
        shader,
        blend_mode: BlendMode::Plus,
        anti_alias: true,
        ..Default::default()
    };
    if let Some(rect) = tiny_skia::Rect::from_xywh(0.0, 0.0, w, h) {
        pixmap.fill_rect(rect, &paint, view.to_skia(), None);
    }
}

fn draw_trees(pixmap: &mut Pixmap, analysis: &SceneAnalysis, layer: &Layer, view: &ViewTransform) {
    let fill = paint(color(layer.color, layer.alpha()), BlendMode::Plus);
    for tree in &analysis.trees {
        let (cx, cy) = screen(tree.center, view);
        let radius = ((tree.radius_px() * view.zoom()) as f32).max(detection::MIN_TREE_RADIUS);
        if let Some(path) = PathBuilder::from_circle(cx, cy, radius) {
            pixmap.fill_path(&path, &fill, FillRule::Winding, Transform::identity(), None);
        }
    }
}

fn draw_pests(pixmap: &mut Pixmap, analysis: &SceneAnalysis, layer: &Layer, view: &ViewTransform) {
    let line = paint(color(layer.color, layer.alpha()), BlendMode::Plus);
    let dashed = stroke(detection::PEST_STROKE, Some(detection::PEST_DASH));
    for pest in &analysis.pests {
        let (x1, y1) = screen(pest.bbox.min, view);
        let (x2, y2) = screen(pest.bbox.max, view);
        let Some(rect) = tiny_skia::Rect::from_ltrb(x1, y1, x2, y2) else {
            continue;
        };
        let path = PathBuilder::from_rect(rect);
        pixmap.stroke_path(&path, &line, &dashed, Transform::identity(), None);
    }
}

fn draw_roi(pixmap: &mut Pixmap, overlay: RoiOverlay<'_>, alpha: f32, view: &ViewTransform) {
    let Some(path) = polyline(overlay.vertices, true, view) else {
        return;
    };
    let fill = paint(color(overlay.color, roi::FILL_ALPHA * alpha), BlendMode::Plus);
    pixmap.fill_path(&path, &fill, FillRule::Winding, Transform::identity(), None);
    let line = paint(color(overlay.color, alpha), BlendMode::Plus);
    pixmap.stroke_path(&path, &line, &stroke(roi::STROKE, None), Transform::identity(), None);
}

// ============================================================================
// Annotations
// ============================================================================

fn draw_annotation(pixmap: &mut Pixmap, a: &Annotation, view: &ViewTransform) {
    let line = color(a.color, 1.0);
    match &a.geometry {
        AnnotationGeometry::Point { at } => {
            let (cx, cy) = screen(*at, view);
            if let Some(path) = PathBuilder::from_circle(cx, cy, annotation::POINT_RADIUS) {
                let border = paint(Color::from_rgba8(0, 0, 0, 200), BlendMode::SourceOver);
                pixmap.stroke_path(&path, &border, &stroke(2.0, None), Transform::identity(), None);
                pixmap.fill_path(
                    &path,
                    &paint(line, BlendMode::SourceOver),
                    FillRule::Winding,
                    Transform::identity(),
                    None,
                );
            }
        }
        AnnotationGeometry::Polygon { vertices } | AnnotationGeometry::Roi { vertices } => {
            if let Some(path) = polyline(vertices, true, view) {
                let fill = paint(color(a.color, annotation::FILL_ALPHA), BlendMode::SourceOver);
                pixmap.fill_path(&path, &fill, FillRule::Winding, Transform::identity(), None);
                outlined(pixmap, &path, line, annotation::STROKE, annotation::BORDER);
            }
        }
        AnnotationGeometry::Measurement { start, end } => {
            draw_measurement(pixmap, *start, *end, line, view);
        }
        AnnotationGeometry::Circle { center, radius } => {
            let (cx, cy) = screen(*center, view);
            let r = (*radius * view.zoom()) as f32;
            if let Some(path) = PathBuilder::from_circle(cx, cy, r) {
                outlined(pixmap, &path, line, annotation::STROKE, annotation::BORDER);
            }
        }
        AnnotationGeometry::Rectangle { rect } => {
            let (x1, y1) = screen(rect.min, view);
            let (x2, y2) = screen(rect.max, view);
            if let Some(r) = tiny_skia::Rect::from_ltrb(x1, y1, x2, y2) {
                outlined(pixmap, &PathBuilder::from_rect(r), line, annotation::STROKE, annotation::BORDER);
            }
        }
    }
}

/// Measurement line with perpendicular end ticks
fn draw_measurement(
    pixmap: &mut Pixmap,
    start: ImagePoint,
    end: ImagePoint,
    line: Color,
    view: &ViewTransform,
) {
    let (ax, ay) = screen(start, view);
    let (bx, by) = screen(end, view);
    let mut pb = PathBuilder::new();
    pb.move_to(ax, ay);
    pb.line_to(bx, by);
    for (x, y) in [(ax, ay), (bx, by)] {
        if let Some((x1, y1, x2, y2)) =
            geometry::perpendicular_tick(ax, ay, bx, by, x, y, annotation::MEASURE_TICK)
        {
            pb.move_to(x1, y1);
            pb.line_to(x2, y2);
        }
    }
    if let Some(path) = pb.finish() {
        outlined(pixmap, &path, line, annotation::STROKE, annotation::BORDER);
    }
}

fn draw_draft(pixmap: &mut Pixmap, overlay: DraftOverlay<'_>, view: &ViewTransform) {
    let line = color(overlay.color, 1.0);
    let band = paint(line, BlendMode::SourceOver);
    let dashed = stroke(annotation::STROKE, Some(annotation::RUBBER_BAND_DASH));
    match overlay.draft {
        Draft::Ring { vertices, roi: is_roi } => {
            if let Some(path) = polyline(vertices, false, view) {
                let dash = is_roi.then_some(roi::OPEN_DASH);
                pixmap.stroke_path(
                    &path,
                    &band,
                    &stroke(annotation::STROKE, dash),
                    Transform::identity(),
                    None,
                );
            }
            if let (Some(last), Some(cursor)) = (vertices.last(), overlay.cursor)
                && let Some(path) = polyline(&[*last, cursor], false, view)
            {
                pixmap.stroke_path(&path, &band, &dashed, Transform::identity(), None);
            }
            for v in vertices {
                let (cx, cy) = screen(*v, view);
                if let Some(path) = PathBuilder::from_circle(cx, cy, annotation::VERTEX_RADIUS) {
                    pixmap.fill_path(&path, &band, FillRule::Winding, Transform::identity(), None);
                }
            }
        }
        Draft::Measurement { start } => {
            let Some(cursor) = overlay.cursor else {
                return;
            };
            if let Some(path) = polyline(&[*start, cursor], false, view) {
                pixmap.stroke_path(&path, &band, &dashed, Transform::identity(), None);
            }
        }
    }
}

// ============================================================================
// Heads-up elements
// ============================================================================

/// Grid lines at a nice easting/northing spacing over the visible footprint
fn draw_utm_grid(pixmap: &mut Pixmap, utm: &UtmInfo, size: ImageSize, view: &ViewTransform) {
    if !utm.has_gps || size.is_empty() {
        return;
    }
    // Visible part of the image, in image pixels
    let w = pixmap.width() as f64;
    let h = pixmap.height() as f64;
    let tl = to_image(ViewportPoint::new(0.0, 0.0), view);
    let br = to_image(ViewportPoint::new(w, h), view);
    let clamp = |p: ImagePoint| {
        ImagePoint::new(
            p.x.clamp(0.0, size.width as f64),
            p.y.clamp(0.0, size.height as f64),
        )
    };
    let (Some(geo_tl), Some(geo_br)) = (
        to_geographic(clamp(tl), utm, size),
        to_geographic(clamp(br), utm, size),
    ) else {
        return;
    };

    let line = paint(Color::from_rgba8(255, 255, 255, hud::GRID_ALPHA), BlendMode::SourceOver);
    let thin = stroke(hud::GRID_STROKE, None);
    let mut pb = PathBuilder::new();

    let (e0, e1) = ordered(geo_tl.easting(), geo_br.easting());
    for e in grid_values(e0, e1) {
        let top = from_geographic(GeoPoint::from_utm(e, geo_tl.northing()), utm, size);
        if let Some(p) = top {
            let x = to_screen(p, view).x as f32;
            pb.move_to(x, 0.0);
            pb.line_to(x, h as f32);
        }
    }
    let (n0, n1) = ordered(geo_tl.northing(), geo_br.northing());
    for n in grid_values(n0, n1) {
        let left = from_geographic(GeoPoint::from_utm(geo_tl.easting(), n), utm, size);
        if let Some(p) = left {
            let y = to_screen(p, view).y as f32;
            pb.move_to(0.0, y);
            pb.line_to(w as f32, y);
        }
    }
    if let Some(path) = pb.finish() {
        pixmap.stroke_path(&path, &line, &thin, Transform::identity(), None);
    }
}

fn ordered(a: f64, b: f64) -> (f64, f64) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Multiples of the nice spacing inside `[min, max]`
fn grid_values(min: f64, max: f64) -> Vec<f64> {
    let spacing = measure::nice_grid_spacing(max - min);
    if spacing <= 0.0 {
        return Vec::new();
    }
    let first = (min / spacing).ceil() as i64;
    (0..MAX_GRID_LINES)
        .map(|i| (first + i as i64) as f64 * spacing)
        .take_while(|v| *v <= max)
        .collect()
}

/// Draws the bar at the bottom-left corner and returns its label anchor
fn draw_scale_bar(pixmap: &mut Pixmap, length: f32, viewport: ImageSize) -> ViewportPoint {
    let x = hud::MARGIN;
    let y = viewport.height as f32 - hud::MARGIN - hud::SCALE_BAR_HEIGHT;
    if let Some(rect) = tiny_skia::Rect::from_xywh(x, y, length, hud::SCALE_BAR_HEIGHT) {
        let path = PathBuilder::from_rect(rect);
        pixmap.fill_path(
            &path,
            &paint(Color::WHITE, BlendMode::SourceOver),
            FillRule::Winding,
            Transform::identity(),
            None,
        );
        let border = paint(Color::from_rgba8(0, 0, 0, 200), BlendMode::SourceOver);
        pixmap.stroke_path(&path, &border, &stroke(1.0, None), Transform::identity(), None);
    }
    ViewportPoint::new(
        (x + length / 2.0) as f64,
        (y - hud::LABEL_HEIGHT / 2.0 - hud::LABEL_PADDING) as f64,
    )
}

/// Top-right corner, clear of the scale bar
fn center_readout_anchor(text: &str, viewport: ImageSize) -> ViewportPoint {
    let (w, h) = geometry::label_box(text);
    ViewportPoint::new(
        (viewport.width as f32 - hud::MARGIN - w / 2.0) as f64,
        (hud::MARGIN + h / 2.0) as f64,
    )
}

fn draw_label_background(pixmap: &mut Pixmap, label: &PlacedLabel) {
    let (w, h) = geometry::label_box(&label.text);
    let x = label.at.x as f32 - w / 2.0;
    let y = label.at.y as f32 - h / 2.0;
    if let Some(rect) = tiny_skia::Rect::from_xywh(x, y, w, h) {
        let bg = paint(Color::from_rgba8(0, 0, 0, 160), BlendMode::SourceOver);
        pixmap.fill_rect(rect, &bg, Transform::identity(), None);
    }
}
