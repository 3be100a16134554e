//! Shortcut help and the transient notice toast

use eframe::egui::{self, RichText};

use crate::core::session::{Notice, UiEvent};

const SHORTCUTS: &[(&str, &str)] = &[
    ("Ctrl/Cmd + O", "Open a file"),
    ("Ctrl/Cmd + D", "Toggle dark/light theme"),
    ("Ctrl/Cmd + E", "Export as HTML"),
    ("F1 or ?", "Show this help"),
    ("Esc", "Close fullscreen or help"),
    ("+ / - / 0", "Zoom the fullscreen diagram"),
    ("Drag", "Pan a diagram"),
    ("Double-click", "Open a diagram fullscreen"),
];

/// Keyboard shortcut overlay
pub fn show_help(ctx: &egui::Context, events: &mut Vec<UiEvent>) {
    let mut open = true;

    egui::Window::new("Keyboard shortcuts")
        .open(&mut open)
        .collapsible(false)
        .resizable(false)
        .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
        .show(ctx, |ui| {
            egui::Grid::new("shortcut_grid")
                .num_columns(2)
                .spacing([24.0, 6.0])
                .show(ui, |ui| {
                    for (keys, action) in SHORTCUTS {
                        ui.label(RichText::new(*keys).monospace().strong());
                        ui.label(*action);
                        ui.end_row();
                    }
                });
        });

    if !open {
        events.push(UiEvent::HelpToggled);
    }
}

/// Toast at the bottom of the window
pub fn show_notice(ctx: &egui::Context, notice: &Notice, events: &mut Vec<UiEvent>) {
    egui::Area::new(egui::Id::new("notice_toast"))
        .order(egui::Order::Tooltip)
        .anchor(egui::Align2::CENTER_BOTTOM, egui::vec2(0.0, -24.0))
        .show(ctx, |ui| {
            egui::Frame::popup(ui.style()).show(ui, |ui| {
                ui.horizontal(|ui| {
                    ui.label(&notice.message);
                    if ui.small_button("✕").clicked() {
                        events.push(UiEvent::NoticeDismissed);
                    }
                });
            });
        });
}
