//! Diagram views: inline canvas with zoom controls and the fullscreen overlay

use eframe::egui::{self, Color32, RichText, Sense, Ui};

use super::block_renderer::RenderContext;
use super::BlockAction;
use crate::core::session::{DiagramState, Session, UiEvent, ViewTarget};
use crate::render::blocks::DiagramBlock;
use crate::viewport::{DiagramId, InteractiveHandle, PanZoom, ZoomDirection};

const INLINE_HEIGHT: f32 = 360.0;

fn zoom_buttons(ui: &mut Ui, target: ViewTarget, view: &PanZoom) -> Option<BlockAction> {
    let mut action = None;
    let zoom = |direction| {
        Some(BlockAction::Event(UiEvent::Zoom { target, direction }))
    };

    if ui.small_button("−").on_hover_text("Zoom out").clicked() {
        action = zoom(ZoomDirection::Out);
    }
    ui.label(RichText::new(format!("{:.0}%", view.scale * 100.0)).monospace());
    if ui.small_button("+").on_hover_text("Zoom in").clicked() {
        action = zoom(ZoomDirection::In);
    }
    let reset = ui.add_enabled(!view.is_identity(), egui::Button::new("⟲").small());
    if reset.on_hover_text("Reset view").clicked() {
        action = zoom(ZoomDirection::Reset);
    }
    action
}

/// Draw a diagram image into a clipped canvas with its pan/zoom applied
fn canvas(ui: &mut Ui, handle: &InteractiveHandle, size: egui::Vec2, target: ViewTarget) -> Option<BlockAction> {
    let (rect, response) = ui.allocate_exact_size(size, Sense::click_and_drag());
    let mut action = None;

    let image = egui::Image::from_bytes(
        handle.uri().to_string(),
        egui::load::Bytes::Shared(handle.svg().clone()),
    )
    .fit_to_original_size(1.0);

    let natural = match image.load_for_size(ui.ctx(), rect.size()) {
        Ok(poll) => poll.size(),
        Err(err) => {
            ui.painter().text(
                rect.center(),
                egui::Align2::CENTER_CENTER,
                format!("Cannot display diagram: {err}"),
                egui::FontId::proportional(13.0),
                ui.visuals().error_fg_color,
            );
            return None;
        }
    };

    match natural {
        Some(natural) if natural.x > 0.0 && natural.y > 0.0 => {
            let fit = (rect.width() / natural.x)
                .min(rect.height() / natural.y)
                .min(1.0);
            let shown = natural * fit * handle.view.scale;
            let image_rect = egui::Rect::from_center_size(rect.center() + handle.view.pan, shown);

            let mut clipped = ui.new_child(egui::UiBuilder::new().max_rect(rect));
            clipped.set_clip_rect(rect.intersect(ui.clip_rect()));
            image.paint_at(&clipped, image_rect);
        }
        _ => {
            ui.put(rect, egui::Spinner::new());
        }
    }

    if response.dragged() {
        action = Some(BlockAction::Event(UiEvent::Panned {
            target,
            delta: response.drag_delta(),
        }));
    } else if response.double_clicked() {
        if let ViewTarget::Inline(id) = target {
            action = Some(BlockAction::Event(UiEvent::FullscreenOpened(id)));
        }
    }
    if response.hovered() && response.drag_delta() == egui::Vec2::ZERO {
        ui.ctx().set_cursor_icon(egui::CursorIcon::Grab);
    }

    action
}

/// Render a diagram block in the document flow
pub fn show_inline(ui: &mut Ui, diagram: &DiagramBlock, ctx: &RenderContext<'_>) -> Option<BlockAction> {
    let id = DiagramId::new(ctx.epoch, diagram.index);
    let state = ctx.diagrams.get(diagram.index);
    let handle = ctx.viewports.handle(id);
    let mut action = None;

    egui::Frame::new()
        .stroke(egui::Stroke::new(1.0, ctx.palette.border))
        .inner_margin(egui::Margin::same(8))
        .outer_margin(egui::Margin::symmetric(0, 4))
        .corner_radius(4.0)
        .show(ui, |ui| {
            ui.set_width(ui.available_width());
            ui.horizontal(|ui| {
                ui.label(
                    RichText::new(diagram.kind.engine_name())
                        .monospace()
                        .color(ctx.palette.muted),
                );
                if let Some(handle) = handle {
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.small_button("⛶").on_hover_text("Fullscreen").clicked() {
                            action = Some(BlockAction::Event(UiEvent::FullscreenOpened(id)));
                        }
                        if let Some(a) = zoom_buttons(ui, ViewTarget::Inline(id), &handle.view) {
                            action = Some(a);
                        }
                    });
                }
            });
            ui.add_space(4.0);

            match (state, handle) {
                (Some(DiagramState::Ready), Some(handle)) => {
                    let size = egui::vec2(ui.available_width(), INLINE_HEIGHT);
                    if let Some(a) = canvas(ui, handle, size, ViewTarget::Inline(id)) {
                        action = Some(a);
                    }
                }
                (Some(DiagramState::Failed(message)), _) => {
                    ui.colored_label(ctx.palette.error, format!("Diagram failed: {message}"));
                    ui.label(
                        RichText::new(&diagram.source)
                            .monospace()
                            .color(ctx.palette.muted),
                    );
                }
                _ => {
                    ui.horizontal(|ui| {
                        ui.spinner();
                        ui.label(RichText::new("Rendering diagram…").color(ctx.palette.muted));
                    });
                }
            }
        });

    ui.add_space(8.0);
    action
}

/// Fullscreen overlay for the diagram that has a fullscreen handle
pub fn show_fullscreen(ctx: &egui::Context, session: &Session) -> Option<BlockAction> {
    let handle = session.viewports.fullscreen()?;
    let screen = ctx.screen_rect();
    let mut action = None;

    egui::Area::new(egui::Id::new("diagram_fullscreen"))
        .order(egui::Order::Foreground)
        .fixed_pos(screen.min)
        .show(ctx, |ui| {
            ui.set_min_size(screen.size());
            let backdrop = if session.theme.is_dark() {
                Color32::from_black_alpha(235)
            } else {
                Color32::from_white_alpha(245)
            };
            ui.painter().rect_filled(screen, 0.0, backdrop);

            ui.horizontal(|ui| {
                ui.add_space(8.0);
                if let Some(a) = zoom_buttons(ui, ViewTarget::Fullscreen, &handle.view) {
                    action = Some(a);
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.add_space(8.0);
                    if ui.button("✕").on_hover_text("Close (Esc)").clicked() {
                        action = Some(BlockAction::Event(UiEvent::FullscreenClosed));
                    }
                });
            });

            let size = ui.available_size();
            if let Some(a) = canvas(ui, handle, size, ViewTarget::Fullscreen) {
                action = Some(a);
            }
        });

    action
}
