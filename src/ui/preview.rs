//! Document panel: drop zone, rendered document or error

use eframe::egui::{self, RichText};

use super::block_renderer::{render_blocks, RenderContext};
use super::{BlockAction, Palette};
use crate::core::document::format_file_size;
use crate::core::session::{Content, RenderedView, Session, UiEvent};

/// Document panel
pub struct PreviewPanel;

impl PreviewPanel {
    /// Show the panel. Returns a URL the user asked to open.
    pub fn show(
        ui: &mut egui::Ui,
        session: &Session,
        scroll_to_top: bool,
        events: &mut Vec<UiEvent>,
    ) -> Option<String> {
        let palette = Palette::for_theme(session.theme);

        match &session.content {
            Content::Empty => {
                Self::show_drop_zone(ui, events);
                None
            }
            Content::Failed { name, message } => {
                Self::show_error(ui, name, message, &palette);
                None
            }
            Content::Rendered(view) => {
                Self::show_info_bar(ui, view, events);
                let ctx = RenderContext {
                    palette,
                    viewports: &session.viewports,
                    diagrams: &view.diagrams,
                    epoch: view.epoch,
                };

                let mut scroll = egui::ScrollArea::vertical()
                    .id_salt("preview_scroll")
                    .auto_shrink([false, false]);
                if scroll_to_top {
                    scroll = scroll.vertical_scroll_offset(0.0);
                }

                let action = scroll
                    .show(ui, |ui| {
                        ui.set_max_width(ui.available_width().min(980.0));
                        render_blocks(ui, &view.document.blocks, &ctx)
                    })
                    .inner;

                match action {
                    Some(BlockAction::OpenUrl(url)) => Some(url),
                    Some(BlockAction::Event(event)) => {
                        events.push(event);
                        None
                    }
                    None => None,
                }
            }
        }
    }

    /// File name, size and reading statistics
    fn show_info_bar(ui: &mut egui::Ui, view: &RenderedView, events: &mut Vec<UiEvent>) {
        ui.horizontal(|ui| {
            ui.strong(&view.name);
            ui.weak(format_file_size(view.size));
            ui.separator();
            let stats = view.document.stats;
            ui.weak(format!("{} words", stats.words));
            ui.weak(format!("{} min read", stats.minutes));

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.small_button("⬆ Top").on_hover_text("Scroll to top").clicked() {
                    events.push(UiEvent::ScrollToTopRequested);
                }
            });
        });
        ui.separator();
    }

    /// Empty state, also the drop target
    fn show_drop_zone(ui: &mut egui::Ui, events: &mut Vec<UiEvent>) {
        let hovering = ui.ctx().input(|i| !i.raw.hovered_files.is_empty());
        let stroke = if hovering {
            ui.visuals().selection.stroke
        } else {
            ui.visuals().widgets.noninteractive.bg_stroke
        };

        ui.centered_and_justified(|ui| {
            egui::Frame::new()
                .stroke(stroke)
                .corner_radius(8.0)
                .inner_margin(egui::Margin::same(32))
                .show(ui, |ui| {
                    ui.vertical_centered(|ui| {
                        ui.add_space(40.0);
                        ui.label(RichText::new("📄").size(48.0));
                        ui.label(RichText::new("Drop a Markdown file here").size(20.0));
                        ui.weak(".md or .markdown");
                        ui.add_space(12.0);
                        if ui.button("Open file…").clicked() {
                            events.push(UiEvent::OpenRequested);
                        }
                    });
                });
        });
    }

    fn show_error(ui: &mut egui::Ui, name: &str, message: &str, palette: &Palette) {
        ui.vertical_centered(|ui| {
            ui.add_space(50.0);
            ui.label(RichText::new(format!("Could not display {name}")).size(18.0).color(palette.error));
            ui.label(message);
        });
    }
}
