//! Viewer session state and the event dispatcher
//!
//! The egui layer turns input into [`UiEvent`]s, hands them to
//! [`Session::dispatch`] and executes the returned [`Effect`]s. The session
//! never touches the window, the file system or the network itself.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use egui::{Key, Modifiers, Vec2};
use url::Url;

use super::config::Theme;
use super::document::{is_supported, window_title, LoadedFile};
use crate::render::{self, RenderedDocument, Renderer};
use crate::viewport::{DiagramId, ViewportLayer, ZoomDirection};

/// How long a transient notice stays visible
pub const NOTICE_DURATION: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub expires_at: Instant,
}

/// Progress of one diagram's image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagramState {
    Pending,
    Ready,
    Failed(String),
}

/// A document currently on screen
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedView {
    pub name: String,
    pub size: u64,
    pub source: String,
    pub document: RenderedDocument,
    /// Indexed by diagram index
    pub diagrams: Vec<DiagramState>,
    pub epoch: u64,
}

/// What the content area shows
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Content {
    /// Drop zone
    #[default]
    Empty,
    Rendered(Box<RenderedView>),
    Failed { name: String, message: String },
}

/// Which viewport a zoom or pan applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewTarget {
    Inline(DiagramId),
    Fullscreen,
}

/// Keyboard shortcuts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    Open,
    ToggleTheme,
    Export,
    Help,
    Escape,
    Zoom(ZoomDirection),
}

impl Shortcut {
    /// Map a key press; command means Ctrl, or Cmd on macOS
    pub fn from_key(key: Key, modifiers: Modifiers) -> Option<Self> {
        if modifiers.command {
            return match key {
                Key::O => Some(Self::Open),
                Key::D => Some(Self::ToggleTheme),
                Key::E => Some(Self::Export),
                _ => None,
            };
        }

        match key {
            Key::F1 | Key::Questionmark => Some(Self::Help),
            Key::Escape => Some(Self::Escape),
            Key::Plus | Key::Equals => Some(Self::Zoom(ZoomDirection::In)),
            Key::Minus => Some(Self::Zoom(ZoomDirection::Out)),
            Key::Num0 => Some(Self::Zoom(ZoomDirection::Reset)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum UiEvent {
    OpenRequested,
    FileOpened(LoadedFile),
    /// Reading a file failed before it reached the renderer
    LoadFailed(String),
    ThemeToggled,
    HelpToggled,
    Shortcut(Shortcut),
    Zoom {
        target: ViewTarget,
        direction: ZoomDirection,
    },
    Panned {
        target: ViewTarget,
        delta: Vec2,
    },
    FullscreenOpened(DiagramId),
    FullscreenClosed,
    ScrollToTopRequested,
    ExportRequested,
    ExportFinished(Result<PathBuf, String>),
    DiagramRendered {
        id: DiagramId,
        result: Result<Arc<[u8]>, String>,
    },
    NoticeDismissed,
    Tick,
}

/// A diagram image to fetch through the resource cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramJob {
    pub id: DiagramId,
    pub url: Url,
}

/// Work the shell performs on behalf of the session
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    ShowOpenDialog,
    ApplyTheme(Theme),
    PersistTheme(Theme),
    SetTitle(String),
    ScrollToTop,
    FetchDiagrams(Vec<DiagramJob>),
    /// Drop decoded images for these URIs
    ForgetImages(Vec<String>),
    Export {
        source: String,
        name: String,
        theme: Theme,
    },
}

#[derive(Debug, Default)]
pub struct Session {
    pub theme: Theme,
    pub content: Content,
    pub viewports: ViewportLayer,
    pub help_open: bool,
    pub notice: Option<Notice>,
    epoch: u64,
}

impl Session {
    pub fn new(theme: Theme) -> Self {
        Self {
            theme,
            ..Self::default()
        }
    }

    pub fn fullscreen_open(&self) -> bool {
        self.viewports.fullscreen().is_some()
    }

    fn notify(&mut self, message: impl Into<String>, now: Instant) {
        let message = message.into();
        tracing::info!("Notice: {}", message);
        self.notice = Some(Notice {
            message,
            expires_at: now + NOTICE_DURATION,
        });
    }

    /// Release every interactive handle; must run before the diagrams they
    /// display are discarded
    fn dispose_handles(&mut self, effects: &mut Vec<Effect>) {
        if self.viewports.is_empty() {
            return;
        }
        effects.push(Effect::ForgetImages(self.viewports.dispose_all()));
    }

    fn render_source(
        &mut self,
        name: String,
        size: u64,
        source: String,
        renderer: &Renderer,
        effects: &mut Vec<Effect>,
    ) {
        self.epoch += 1;
        let epoch = self.epoch;

        match renderer.render(&source, self.theme) {
            Ok(document) => {
                let jobs: Vec<DiagramJob> = document
                    .diagrams()
                    .into_iter()
                    .map(|diagram| DiagramJob {
                        id: DiagramId::new(epoch, diagram.index),
                        url: diagram.url.clone(),
                    })
                    .collect();

                tracing::info!("Rendered {} ({} diagrams)", name, jobs.len());
                self.content = Content::Rendered(Box::new(RenderedView {
                    name,
                    size,
                    source,
                    document,
                    diagrams: vec![DiagramState::Pending; jobs.len()],
                    epoch,
                }));

                if !jobs.is_empty() {
                    effects.push(Effect::FetchDiagrams(jobs));
                }
            }
            Err(err) => {
                tracing::warn!("Failed to render {}: {}", name, err);
                self.content = Content::Failed {
                    name,
                    message: err.to_string(),
                };
            }
        }
    }

    fn open_file(&mut self, file: LoadedFile, renderer: &Renderer, now: Instant) -> Vec<Effect> {
        if !is_supported(&file.name) {
            self.notify(
                format!("{} is not a Markdown file (.md or .markdown)", file.name),
                now,
            );
            return Vec::new();
        }

        let mut effects = Vec::new();
        self.dispose_handles(&mut effects);
        effects.push(Effect::SetTitle(window_title(Some(&file.name))));

        let size = file.size();
        match render::decode(&file.bytes) {
            Ok(text) => {
                let source = text.to_string();
                self.render_source(file.name, size, source, renderer, &mut effects);
            }
            Err(err) => {
                tracing::warn!("Failed to decode {}: {}", file.name, err);
                self.epoch += 1;
                self.content = Content::Failed {
                    name: file.name,
                    message: err.to_string(),
                };
            }
        }

        effects.push(Effect::ScrollToTop);
        effects
    }

    fn toggle_theme(&mut self, renderer: &Renderer) -> Vec<Effect> {
        self.theme = self.theme.toggled();
        let mut effects = vec![
            Effect::ApplyTheme(self.theme),
            Effect::PersistTheme(self.theme),
        ];

        // Diagrams and highlighting depend on the theme
        match std::mem::take(&mut self.content) {
            Content::Rendered(view) => {
                self.dispose_handles(&mut effects);
                let view = *view;
                self.render_source(view.name, view.size, view.source, renderer, &mut effects);
            }
            other => self.content = other,
        }
        effects
    }

    fn diagram_finished(&mut self, id: DiagramId, result: Result<Arc<[u8]>, String>) -> Vec<Effect> {
        let Content::Rendered(view) = &mut self.content else {
            return Vec::new();
        };
        if view.epoch != id.epoch {
            tracing::debug!("Dropping stale diagram {:?}", id);
            return Vec::new();
        }
        let Some(state) = view.diagrams.get_mut(id.index) else {
            return Vec::new();
        };

        match result {
            Ok(svg) => {
                *state = DiagramState::Ready;
                self.viewports
                    .attach(id, svg)
                    .map(|uri| vec![Effect::ForgetImages(vec![uri])])
                    .unwrap_or_default()
            }
            Err(message) => {
                *state = DiagramState::Failed(message);
                Vec::new()
            }
        }
    }

    fn view_mut(&mut self, target: ViewTarget) -> Option<&mut crate::viewport::PanZoom> {
        match target {
            ViewTarget::Inline(id) => self.viewports.handle_mut(id).map(|h| &mut h.view),
            ViewTarget::Fullscreen => self.viewports.fullscreen_mut().map(|h| &mut h.view),
        }
    }

    fn close_fullscreen(&mut self) -> Vec<Effect> {
        self.viewports
            .close_fullscreen()
            .map(|uri| vec![Effect::ForgetImages(vec![uri])])
            .unwrap_or_default()
    }

    fn shortcut(&mut self, shortcut: Shortcut, renderer: &Renderer, now: Instant) -> Vec<Effect> {
        match shortcut {
            Shortcut::Open => self.dispatch(UiEvent::OpenRequested, renderer, now),
            Shortcut::ToggleTheme => self.dispatch(UiEvent::ThemeToggled, renderer, now),
            Shortcut::Export => self.dispatch(UiEvent::ExportRequested, renderer, now),
            Shortcut::Help => self.dispatch(UiEvent::HelpToggled, renderer, now),
            Shortcut::Escape => {
                if self.fullscreen_open() {
                    self.close_fullscreen()
                } else {
                    self.help_open = false;
                    Vec::new()
                }
            }
            Shortcut::Zoom(direction) => {
                if self.fullscreen_open() {
                    self.dispatch(
                        UiEvent::Zoom {
                            target: ViewTarget::Fullscreen,
                            direction,
                        },
                        renderer,
                        now,
                    )
                } else {
                    Vec::new()
                }
            }
        }
    }

    /// Apply one event and report what the shell has to do
    pub fn dispatch(&mut self, event: UiEvent, renderer: &Renderer, now: Instant) -> Vec<Effect> {
        match event {
            UiEvent::OpenRequested => vec![Effect::ShowOpenDialog],
            UiEvent::FileOpened(file) => self.open_file(file, renderer, now),
            UiEvent::LoadFailed(message) => {
                self.notify(message, now);
                Vec::new()
            }
            UiEvent::ThemeToggled => self.toggle_theme(renderer),
            UiEvent::HelpToggled => {
                self.help_open = !self.help_open;
                Vec::new()
            }
            UiEvent::Shortcut(shortcut) => self.shortcut(shortcut, renderer, now),
            UiEvent::Zoom { target, direction } => {
                if let Some(view) = self.view_mut(target) {
                    view.apply(direction);
                }
                Vec::new()
            }
            UiEvent::Panned { target, delta } => {
                if let Some(view) = self.view_mut(target) {
                    view.pan_by(delta);
                }
                Vec::new()
            }
            UiEvent::FullscreenOpened(id) => match self.viewports.open_fullscreen(id) {
                Some(disposed) if !disposed.is_empty() => vec![Effect::ForgetImages(disposed)],
                _ => Vec::new(),
            },
            UiEvent::FullscreenClosed => self.close_fullscreen(),
            UiEvent::ScrollToTopRequested => vec![Effect::ScrollToTop],
            UiEvent::ExportRequested => match &self.content {
                Content::Rendered(view) => vec![Effect::Export {
                    source: view.source.clone(),
                    name: view.name.clone(),
                    theme: self.theme,
                }],
                _ => {
                    self.notify("Open a document before exporting", now);
                    Vec::new()
                }
            },
            UiEvent::ExportFinished(result) => {
                match result {
                    Ok(path) => self.notify(format!("Exported to {}", path.display()), now),
                    Err(message) => self.notify(format!("Export failed: {message}"), now),
                }
                Vec::new()
            }
            UiEvent::DiagramRendered { id, result } => self.diagram_finished(id, result),
            UiEvent::NoticeDismissed => {
                self.notice = None;
                Vec::new()
            }
            UiEvent::Tick => {
                if self.notice.as_ref().is_some_and(|n| n.expires_at <= now) {
                    self.notice = None;
                }
                Vec::new()
            }
        }
    }
}
