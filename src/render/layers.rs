//! Layer stack with per-layer visibility/opacity and view-mode presets

use crate::domain::{Layer, LayerCategory, ViewMode};

/// Ordered set of overlay layers, one per category
#[derive(Clone, Debug, PartialEq)]
pub struct LayerStack {
    layers: Vec<Layer>,
    view_mode: Option<ViewMode>,
}

impl Default for LayerStack {
    fn default() -> Self {
        Self::new(ViewMode::Original)
    }
}

impl LayerStack {
    pub fn new(mode: ViewMode) -> Self {
        let mut stack = Self {
            layers: LayerCategory::ALL.into_iter().map(Layer::new).collect(),
            view_mode: None,
        };
        stack.apply_view_mode(mode);
        stack
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn get(&self, category: LayerCategory) -> Option<&Layer> {
        self.layers.iter().find(|l| l.category == category)
    }

    pub fn get_by_id(&self, id: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    fn get_mut(&mut self, category: LayerCategory) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.category == category)
    }

    /// The preset last applied, `None` once a layer was toggled by hand
    pub fn view_mode(&self) -> Option<ViewMode> {
        self.view_mode
    }

    pub fn is_visible(&self, category: LayerCategory) -> bool {
        self.get(category).is_some_and(|l| l.visible)
    }

    /// Flip one layer's visibility; other layers are untouched
    pub fn toggle(&mut self, category: LayerCategory) -> bool {
        let Some(layer) = self.get_mut(category) else {
            return false;
        };
        layer.visible = !layer.visible;
        let visible = layer.visible;
        self.view_mode = None;
        log::debug!("Layer {:?} visible={}", category, visible);
        visible
    }

    pub fn set_visible(&mut self, category: LayerCategory, visible: bool) {
        if let Some(layer) = self.get_mut(category)
            && layer.visible != visible
        {
            layer.visible = visible;
            self.view_mode = None;
        }
    }

    /// Show a layer on top of the active preset without leaving it
    pub fn reveal(&mut self, category: LayerCategory) {
        if let Some(layer) = self.get_mut(category) {
            layer.visible = true;
        }
    }

    /// Set one layer's opacity percentage (clamped to 100)
    pub fn set_opacity(&mut self, category: LayerCategory, opacity: u8) {
        if let Some(layer) = self.get_mut(category) {
            layer.opacity = opacity.min(100);
        }
    }

    /// Apply a preset's visibility flags in a single assignment, so no reader
    /// ever sees a half-applied preset
    pub fn apply_view_mode(&mut self, mode: ViewMode) {
        let next: Vec<Layer> = self
            .layers
            .iter()
            .map(|l| Layer {
                visible: mode.shows(l.category),
                ..l.clone()
            })
            .collect();
        self.layers = next;
        self.view_mode = Some(mode);
        log::debug!("Applied view mode {:?}", mode);
    }

    /// Visible layers in compositing order (lowest tier first)
    pub fn visible_in_z_order(&self) -> Vec<&Layer> {
        let mut visible: Vec<&Layer> = self.layers.iter().filter(|l| l.visible).collect();
        visible.sort_by_key(|l| (l.category.z_tier(), l.category));
        visible
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_set_visibility_exactly() {
        let mut stack = LayerStack::new(ViewMode::Original);
        assert!(stack.is_visible(LayerCategory::Original));
        assert!(!stack.is_visible(LayerCategory::Vegetation));

        stack.apply_view_mode(ViewMode::Detection);
        for category in LayerCategory::ALL {
            assert_eq!(
                stack.is_visible(category),
                matches!(
                    category,
                    LayerCategory::Original
                        | LayerCategory::Vegetation
                        | LayerCategory::Trees
                        | LayerCategory::Pests
                ),
                "{category:?}"
            );
        }
        assert_eq!(stack.view_mode(), Some(ViewMode::Detection));
    }

    #[test]
    fn toggle_and_opacity_are_independent() {
        let mut stack = LayerStack::new(ViewMode::Vegetation);
        stack.set_opacity(LayerCategory::Health, 40);
        stack.set_opacity(LayerCategory::Vegetation, 250);
        assert!(stack.toggle(LayerCategory::Health));

        assert_eq!(stack.get(LayerCategory::Health).unwrap().opacity, 40);
        assert_eq!(stack.get(LayerCategory::Vegetation).unwrap().opacity, 100);
        assert!(stack.is_visible(LayerCategory::Vegetation));
        assert!(stack.is_visible(LayerCategory::Original));
        assert_eq!(stack.view_mode(), None);
    }

    #[test]
    fn presets_keep_opacity() {
        let mut stack = LayerStack::default();
        stack.set_opacity(LayerCategory::Trees, 15);
        stack.apply_view_mode(ViewMode::Detection);
        stack.apply_view_mode(ViewMode::Original);
        assert_eq!(stack.get(LayerCategory::Trees).unwrap().opacity, 15);
    }

    #[test]
    fn z_order_puts_base_first_and_roi_last() {
        let mut stack = LayerStack::new(ViewMode::Full);
        stack.set_visible(LayerCategory::Water, true);
        let order: Vec<LayerCategory> = stack
            .visible_in_z_order()
            .into_iter()
            .map(|l| l.category)
            .collect();
        assert_eq!(order.first(), Some(&LayerCategory::Original));
        assert_eq!(order.last(), Some(&LayerCategory::Roi));
        let trees = order.iter().position(|c| *c == LayerCategory::Trees).unwrap();
        let water = order.iter().position(|c| *c == LayerCategory::Water).unwrap();
        assert!(water < trees);
        assert_eq!(stack.get_by_id("water").map(|l| l.category), Some(LayerCategory::Water));
    }
}
