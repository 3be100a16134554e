//! Top toolbar

use eframe::egui;

use crate::core::session::{Session, UiEvent};

pub struct Toolbar;

impl Toolbar {
    /// Show the toolbar. `cache_status` describes the offline cache.
    pub fn show(ctx: &egui::Context, session: &Session, cache_status: &str, events: &mut Vec<UiEvent>) {
        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                if ui.button("📂 Open").on_hover_text("Ctrl/Cmd + O").clicked() {
                    events.push(UiEvent::OpenRequested);
                }
                if ui.button("💾 Export").on_hover_text("Ctrl/Cmd + E").clicked() {
                    events.push(UiEvent::ExportRequested);
                }

                ui.separator();

                let theme_label = if session.theme.is_dark() {
                    "☀ Light"
                } else {
                    "🌙 Dark"
                };
                if ui.button(theme_label).on_hover_text("Ctrl/Cmd + D").clicked() {
                    events.push(UiEvent::ThemeToggled);
                }
                if ui.button("?").on_hover_text("Keyboard shortcuts").clicked() {
                    events.push(UiEvent::HelpToggled);
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.weak(cache_status);
                });
            });
        });
    }
}
