//! Pan/zoom state for rendered diagrams
//!
//! Every displayed diagram owns an [`InteractiveHandle`]. Handles are consumed
//! on disposal, and disposal hands back the image URI the handle displayed so
//! the shell can drop the decoded texture.

pub mod svg_ids;

use std::sync::Arc;

use egui::Vec2;

/// Multiplier applied by one zoom step
pub const ZOOM_FACTOR: f32 = 1.2;
pub const MIN_SCALE: f32 = 0.1;
pub const MAX_SCALE: f32 = 10.0;

/// Identifies a diagram within one render pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagramId {
    /// Render pass the diagram belongs to
    pub epoch: u64,
    pub index: usize,
}

impl DiagramId {
    pub fn new(epoch: u64, index: usize) -> Self {
        Self { epoch, index }
    }

    pub fn uri(&self) -> String {
        format!("bytes://markview/diagram-{}-{}.svg", self.epoch, self.index)
    }

    pub fn fullscreen_uri(&self) -> String {
        format!(
            "bytes://markview/fullscreen-{}-{}.svg",
            self.epoch, self.index
        )
    }

    fn fullscreen_suffix(&self) -> String {
        format!("-fs{}x{}", self.epoch, self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomDirection {
    In,
    Out,
    Reset,
}

/// Offset of the image center from the viewport center, plus scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanZoom {
    pub pan: Vec2,
    pub scale: f32,
}

impl Default for PanZoom {
    fn default() -> Self {
        Self {
            pan: Vec2::ZERO,
            scale: 1.0,
        }
    }
}

impl PanZoom {
    /// Scale by `factor`, keeping the point at `anchor` (relative to the
    /// viewport center) fixed on screen
    pub fn zoom_at(&mut self, factor: f32, anchor: Vec2) {
        let scale = (self.scale * factor).clamp(MIN_SCALE, MAX_SCALE);
        let ratio = scale / self.scale;
        self.pan = anchor + (self.pan - anchor) * ratio;
        self.scale = scale;
    }

    pub fn zoom_in(&mut self) {
        self.zoom_at(ZOOM_FACTOR, Vec2::ZERO);
    }

    pub fn zoom_out(&mut self) {
        self.zoom_at(1.0 / ZOOM_FACTOR, Vec2::ZERO);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn pan_by(&mut self, delta: Vec2) {
        self.pan += delta;
    }

    pub fn apply(&mut self, direction: ZoomDirection) {
        match direction {
            ZoomDirection::In => self.zoom_in(),
            ZoomDirection::Out => self.zoom_out(),
            ZoomDirection::Reset => self.reset(),
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }
}

/// Live interaction state bound to one displayed diagram image
#[derive(Debug)]
pub struct InteractiveHandle {
    target: DiagramId,
    uri: String,
    svg: Arc<[u8]>,
    pub view: PanZoom,
}

impl InteractiveHandle {
    fn new(target: DiagramId, uri: String, svg: Arc<[u8]>) -> Self {
        tracing::trace!("Attached viewport handle {}", uri);
        Self {
            target,
            uri,
            svg,
            view: PanZoom::default(),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn svg(&self) -> &Arc<[u8]> {
        &self.svg
    }

    fn dispose(self) -> String {
        tracing::trace!("Disposed viewport handle {}", self.uri);
        self.uri
    }
}

/// All live handles: one per displayed diagram plus an optional fullscreen one
#[derive(Debug, Default)]
pub struct ViewportLayer {
    handles: Vec<InteractiveHandle>,
    fullscreen: Option<InteractiveHandle>,
}

impl ViewportLayer {
    /// Attach a handle to a finished diagram. A handle already bound to the
    /// same diagram is disposed and its URI returned.
    pub fn attach(&mut self, target: DiagramId, svg: Arc<[u8]>) -> Option<String> {
        let replaced = self
            .handles
            .iter()
            .position(|h| h.target == target)
            .map(|pos| self.handles.swap_remove(pos).dispose());
        self.handles
            .push(InteractiveHandle::new(target, target.uri(), svg));
        replaced
    }

    pub fn handle(&self, target: DiagramId) -> Option<&InteractiveHandle> {
        self.handles.iter().find(|h| h.target == target)
    }

    pub fn handle_mut(&mut self, target: DiagramId) -> Option<&mut InteractiveHandle> {
        self.handles.iter_mut().find(|h| h.target == target)
    }

    pub fn len(&self) -> usize {
        self.handles.len() + usize::from(self.fullscreen.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Show a diagram fullscreen on an id-suffixed copy of its image.
    ///
    /// Returns the URIs of disposed handles (a previous fullscreen view), or
    /// `None` when the diagram has no handle.
    pub fn open_fullscreen(&mut self, target: DiagramId) -> Option<Vec<String>> {
        let source = self.handle(target)?;
        let text = String::from_utf8_lossy(source.svg());
        let copy = svg_ids::clone_with_suffix(&text, &target.fullscreen_suffix());
        let svg: Arc<[u8]> = Arc::from(copy.into_bytes());

        let disposed = self.close_fullscreen().into_iter().collect();
        self.fullscreen = Some(InteractiveHandle::new(
            target,
            target.fullscreen_uri(),
            svg,
        ));
        Some(disposed)
    }

    /// Dispose the fullscreen handle, if any
    pub fn close_fullscreen(&mut self) -> Option<String> {
        self.fullscreen.take().map(InteractiveHandle::dispose)
    }

    pub fn fullscreen(&self) -> Option<&InteractiveHandle> {
        self.fullscreen.as_ref()
    }

    pub fn fullscreen_mut(&mut self) -> Option<&mut InteractiveHandle> {
        self.fullscreen.as_mut()
    }

    /// Dispose every handle, each exactly once
    pub fn dispose_all(&mut self) -> Vec<String> {
        let mut uris: Vec<String> = self
            .handles
            .drain(..)
            .map(InteractiveHandle::dispose)
            .collect();
        uris.extend(self.close_fullscreen());
        if !uris.is_empty() {
            tracing::debug!("Disposed {} viewport handles", uris.len());
        }
        uris
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn svg(text: &str) -> Arc<[u8]> {
        Arc::from(text.as_bytes())
    }

    #[test]
    fn test_zoom_steps() {
        let mut view = PanZoom::default();
        view.zoom_in();
        assert!((view.scale - 1.2).abs() < 1e-6);
        view.zoom_out();
        assert!((view.scale - 1.0).abs() < 1e-6);

        view.pan_by(Vec2::new(10.0, -4.0));
        view.apply(ZoomDirection::Reset);
        assert!(view.is_identity());
    }

    #[test]
    fn test_zoom_keeps_center_fixed() {
        let mut view = PanZoom::default();
        view.pan_by(Vec2::new(50.0, 20.0));
        view.zoom_in();
        // The image point under the viewport center stays under it
        assert!((view.pan.x - 60.0).abs() < 1e-4);
        assert!((view.pan.y - 24.0).abs() < 1e-4);
    }

    #[test]
    fn test_zoom_clamped() {
        let mut view = PanZoom::default();
        for _ in 0..100 {
            view.zoom_in();
        }
        assert_eq!(view.scale, MAX_SCALE);
        for _ in 0..200 {
            view.zoom_out();
        }
        assert_eq!(view.scale, MIN_SCALE);
    }

    #[test]
    fn test_dispose_all_exactly_once() {
        let mut layer = ViewportLayer::default();
        for index in 0..3 {
            layer.attach(DiagramId::new(1, index), svg("<svg/>"));
        }
        layer.open_fullscreen(DiagramId::new(1, 2)).unwrap();
        assert_eq!(layer.len(), 4);

        let mut uris = layer.dispose_all();
        uris.sort();
        assert_eq!(
            uris,
            vec![
                "bytes://markview/diagram-1-0.svg",
                "bytes://markview/diagram-1-1.svg",
                "bytes://markview/diagram-1-2.svg",
                "bytes://markview/fullscreen-1-2.svg",
            ]
        );
        assert!(layer.is_empty());
        assert!(layer.dispose_all().is_empty());
    }

    #[test]
    fn test_reattach_disposes_previous() {
        let mut layer = ViewportLayer::default();
        let id = DiagramId::new(3, 0);
        assert_eq!(layer.attach(id, svg("<svg/>")), None);
        assert_eq!(layer.attach(id, svg("<svg/>")), Some(id.uri()));
        assert_eq!(layer.len(), 1);
    }

    #[test]
    fn test_fullscreen_copy_keeps_original_ids() {
        let mut layer = ViewportLayer::default();
        let id = DiagramId::new(7, 0);
        let original = r##"<svg id="d"><marker id="m"/><path marker-end="url(#m)"/></svg>"##;
        layer.attach(id, svg(original));

        assert_eq!(layer.open_fullscreen(id), Some(Vec::new()));
        let fullscreen = layer.fullscreen().unwrap();
        assert_eq!(fullscreen.uri(), id.fullscreen_uri());

        let copy = String::from_utf8_lossy(fullscreen.svg()).to_string();
        assert!(copy.contains("url(#m-fs7x0)"));
        assert_eq!(&**layer.handle(id).unwrap().svg(), original.as_bytes());

        // Opening again replaces the previous fullscreen handle
        assert_eq!(layer.open_fullscreen(id), Some(vec![id.fullscreen_uri()]));
        assert_eq!(layer.close_fullscreen(), Some(id.fullscreen_uri()));
        assert_eq!(layer.close_fullscreen(), None);
    }

    #[test]
    fn test_fullscreen_requires_handle() {
        let mut layer = ViewportLayer::default();
        assert_eq!(layer.open_fullscreen(DiagramId::new(0, 0)), None);
    }
}
