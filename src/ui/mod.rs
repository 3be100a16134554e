//! UI components for Markview
//!
//! Components read the [`Session`](crate::core::session::Session) and report
//! what the user did as [`UiEvent`]s; they never change state directly.

pub mod block_renderer;
pub mod diagram;
pub mod overlays;
pub mod preview;
pub mod toolbar;

use eframe::egui::{self, Color32};

use crate::core::config::Theme;
use crate::core::session::UiEvent;

/// Action triggered by interacting with rendered content
#[derive(Debug, Clone)]
pub enum BlockAction {
    /// Open external URL
    OpenUrl(String),
    /// Forward to the session
    Event(UiEvent),
}

/// Colors used by the content renderer
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    pub heading: Color32,
    pub text: Color32,
    pub muted: Color32,
    pub code_bg: Color32,
    pub border: Color32,
    pub quote_bg: Color32,
    pub quote_bar: Color32,
    pub error: Color32,
}

impl Palette {
    pub fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::Dark => Self {
                heading: Color32::from_rgb(220, 220, 220),
                text: Color32::from_rgb(200, 200, 200),
                muted: Color32::from_rgb(128, 128, 128),
                code_bg: Color32::from_rgb(40, 40, 40),
                border: Color32::from_rgb(60, 60, 60),
                quote_bg: Color32::from_rgb(35, 35, 40),
                quote_bar: Color32::from_rgb(100, 100, 120),
                error: Color32::from_rgb(240, 110, 110),
            },
            Theme::Light => Self {
                heading: Color32::from_rgb(30, 30, 30),
                text: Color32::from_rgb(50, 50, 50),
                muted: Color32::from_rgb(110, 110, 110),
                code_bg: Color32::from_rgb(246, 248, 250),
                border: Color32::from_rgb(208, 215, 222),
                quote_bg: Color32::from_rgb(242, 244, 247),
                quote_bar: Color32::from_rgb(208, 215, 222),
                error: Color32::from_rgb(190, 40, 40),
            },
        }
    }
}

/// Switch egui's visuals to match the theme
pub fn apply_visuals(ctx: &egui::Context, theme: Theme) {
    let visuals = match theme {
        Theme::Dark => egui::Visuals::dark(),
        Theme::Light => egui::Visuals::light(),
    };
    ctx.set_visuals(visuals);
}
