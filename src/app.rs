//! Main application state and UI coordination

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use eframe::egui;
use url::Url;

use crate::cache::disk::DiskStorage;
use crate::cache::fetch::HttpFetcher;
use crate::cache::manifest::EXPORT_DIAGRAM_SCRIPT;
use crate::cache::request::{Request, Response};
use crate::cache::store::{Backend, MemoryStorage};
use crate::cache::{CacheConfig, ResourceCache};
use crate::core::config::{AppConfig, Theme};
use crate::core::document::{is_supported, window_title, LoadedFile, SUPPORTED_EXTENSIONS};
use crate::core::session::{DiagramJob, Effect, Session, Shortcut, UiEvent};
use crate::render::html::stylesheet_url;
use crate::render::{ExportAssets, Renderer};
use crate::ui::{self, diagram, overlays, preview::PreviewPanel, toolbar::Toolbar, BlockAction};

/// Client id of the viewer window, claimed on activation
const CLIENT_ID: &str = "main-window";

type Cache = ResourceCache<HttpFetcher, Backend>;

/// Run-time settings from the command line
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub initial_file: Option<PathBuf>,
    pub diagram_server: Url,
    pub cache_dir: PathBuf,
    pub offline_cache: bool,
}

/// Results coming back from background tasks
enum Message {
    Event(UiEvent),
    CacheStatus(String),
    ExportReady {
        path: PathBuf,
        source: String,
        name: String,
        theme: Theme,
        assets: ExportAssets,
    },
}

/// Main application state
pub struct MarkviewApp {
    session: Session,
    renderer: Renderer,
    config: AppConfig,
    runtime: tokio::runtime::Runtime,
    cache: Arc<Cache>,
    tx: Sender<Message>,
    rx: Receiver<Message>,
    pending: VecDeque<UiEvent>,
    cache_status: String,
    /// Diagram jobs held back until the cache can serve stored records
    deferred: Option<Vec<DiagramJob>>,
    scroll_to_top: bool,
}

impl MarkviewApp {
    /// Create a new application instance
    pub fn new(cc: &eframe::CreationContext<'_>, options: AppOptions) -> Result<Self> {
        egui_extras::install_image_loaders(&cc.egui_ctx);

        let config = AppConfig::load().unwrap_or_else(|e| {
            tracing::warn!("Using default config: {:#}", e);
            AppConfig::default()
        });
        ui::apply_visuals(&cc.egui_ctx, config.theme);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .context("Failed to start async runtime")?;

        let storage = if options.offline_cache {
            Backend::Disk(
                DiskStorage::open(&options.cache_dir).with_context(|| {
                    format!("Failed to open cache at {}", options.cache_dir.display())
                })?,
            )
        } else {
            Backend::Memory(MemoryStorage::new())
        };
        let fetcher = HttpFetcher::new(options.diagram_server.clone())?;
        let cache = Arc::new(ResourceCache::new(CacheConfig::builtin(), fetcher, storage));

        let (tx, rx) = mpsc::channel();
        let mut app = Self {
            session: Session::new(config.theme),
            renderer: Renderer::new(options.diagram_server),
            config,
            runtime,
            cache,
            tx,
            rx,
            pending: VecDeque::new(),
            cache_status: "Offline cache disabled".to_string(),
            deferred: None,
            scroll_to_top: false,
        };

        if options.offline_cache {
            app.start_cache(cc.egui_ctx.clone());
        }
        if let Some(path) = options.initial_file {
            app.pending.push_back(load_event(&path));
        }

        Ok(app)
    }

    /// Install and activate the offline cache in the background
    fn start_cache(&mut self, ctx: egui::Context) {
        self.cache_status = "Preparing offline cache…".to_string();
        self.deferred = Some(Vec::new());
        let cache = Arc::clone(&self.cache);
        let tx = self.tx.clone();

        self.runtime.spawn(async move {
            cache.register_client(CLIENT_ID).await;

            let status = match cache.ensure_installed().await {
                Ok(()) => match cache.activate().await {
                    Ok(report) => {
                        if !report.failed.is_empty() {
                            tracing::warn!(
                                "Could not remove old cache generations {:?}",
                                report.failed
                            );
                        }
                        tracing::info!(
                            "Offline cache {} active, removed {:?}",
                            cache.generation(),
                            report.deleted
                        );
                        format!("Offline cache {}", cache.generation())
                    }
                    Err(e) => {
                        tracing::error!("Cache activation failed: {}", e);
                        "Offline cache unavailable".to_string()
                    }
                },
                Err(e) => {
                    tracing::error!("Cache install failed: {}", e);
                    "Offline cache unavailable".to_string()
                }
            };

            if cache.is_controlled(CLIENT_ID).await {
                tracing::debug!(
                    "Window controlled by {}; stored generations: {:?}",
                    cache.generation(),
                    cache.generations().await.unwrap_or_default()
                );
            }
            let _ = tx.send(Message::CacheStatus(status));
            ctx.request_repaint();
        });
    }

    fn fetch_diagrams(&mut self, ctx: &egui::Context, jobs: Vec<DiagramJob>) {
        if let Some(deferred) = &mut self.deferred {
            tracing::debug!("Holding {} diagram jobs until the cache is ready", jobs.len());
            deferred.extend(jobs);
            return;
        }

        for job in jobs {
            let cache = Arc::clone(&self.cache);
            let tx = self.tx.clone();
            let ctx = ctx.clone();

            self.runtime.spawn(async move {
                let response = cache.handle(&Request::get(job.url)).await;
                let result = diagram_result(&response);
                let _ = tx.send(Message::Event(UiEvent::DiagramRendered { id: job.id, result }));
                ctx.request_repaint();
            });
        }
    }

    /// Ask for a destination, then collect export assets in the background
    fn start_export(&self, ctx: &egui::Context, source: String, name: String, theme: Theme) {
        let stem = LoadedFile::new(name.clone(), Vec::new()).stem().to_string();
        let Some(path) = rfd::FileDialog::new()
            .add_filter("HTML", &["html"])
            .set_file_name(format!("{stem}.html"))
            .save_file()
        else {
            return;
        };

        let cache = Arc::clone(&self.cache);
        let tx = self.tx.clone();
        let ctx = ctx.clone();
        self.runtime.spawn(async move {
            let assets = ExportAssets {
                stylesheet: fetch_text(&cache, stylesheet_url(theme)).await,
                diagram_script: fetch_text(&cache, EXPORT_DIAGRAM_SCRIPT).await,
            };
            let _ = tx.send(Message::ExportReady {
                path,
                source,
                name,
                theme,
                assets,
            });
            ctx.request_repaint();
        });
    }

    fn write_export(
        &self,
        path: &Path,
        source: &str,
        name: &str,
        theme: Theme,
        assets: &ExportAssets,
    ) -> Result<()> {
        let html = self.renderer.export_html(source, name, theme, assets)?;
        std::fs::write(path, html)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Exported {} to {}", name, path.display());
        Ok(())
    }

    fn receive(&mut self, ctx: &egui::Context) {
        while let Ok(message) = self.rx.try_recv() {
            match message {
                Message::Event(event) => self.pending.push_back(event),
                Message::CacheStatus(status) => {
                    self.cache_status = status;
                    if let Some(jobs) = self.deferred.take() {
                        self.fetch_diagrams(ctx, jobs);
                    }
                }
                Message::ExportReady {
                    path,
                    source,
                    name,
                    theme,
                    assets,
                } => {
                    let result = self
                        .write_export(&path, &source, &name, theme, &assets)
                        .map(|()| path)
                        .map_err(|e| format!("{e:#}"));
                    self.pending.push_back(UiEvent::ExportFinished(result));
                }
            }
        }
    }

    fn collect_input(&mut self, ctx: &egui::Context) {
        ctx.input(|i| {
            for event in &i.events {
                if let egui::Event::Key {
                    key,
                    pressed: true,
                    repeat: false,
                    modifiers,
                    ..
                } = event
                {
                    if let Some(shortcut) = Shortcut::from_key(*key, *modifiers) {
                        self.pending.push_back(UiEvent::Shortcut(shortcut));
                    }
                }
            }

            for file in &i.raw.dropped_files {
                self.pending.push_back(dropped_event(file));
            }
        });
    }

    fn run_effect(&mut self, ctx: &egui::Context, effect: Effect) {
        match effect {
            Effect::ShowOpenDialog => {
                if let Some(path) = rfd::FileDialog::new()
                    .add_filter("Markdown", SUPPORTED_EXTENSIONS)
                    .pick_file()
                {
                    self.pending.push_back(load_event(&path));
                }
            }
            Effect::ApplyTheme(theme) => ui::apply_visuals(ctx, theme),
            Effect::PersistTheme(theme) => {
                self.config.theme = theme;
                if let Err(e) = self.config.save() {
                    tracing::error!("Failed to save config: {:#}", e);
                }
            }
            Effect::SetTitle(title) => ctx.send_viewport_cmd(egui::ViewportCommand::Title(title)),
            Effect::ScrollToTop => self.scroll_to_top = true,
            Effect::FetchDiagrams(jobs) => self.fetch_diagrams(ctx, jobs),
            Effect::ForgetImages(uris) => {
                for uri in uris {
                    ctx.forget_image(&uri);
                }
            }
            Effect::Export {
                source,
                name,
                theme,
            } => self.start_export(ctx, source, name, theme),
        }
    }

    fn process_pending(&mut self, ctx: &egui::Context) {
        while let Some(event) = self.pending.pop_front() {
            let effects = self.session.dispatch(event, &self.renderer, Instant::now());
            for effect in effects {
                self.run_effect(ctx, effect);
            }
        }
    }
}

fn load_event(path: &Path) -> UiEvent {
    match LoadedFile::from_path(path) {
        Ok(file) => UiEvent::FileOpened(file),
        Err(e) => {
            tracing::error!("Failed to open document: {:#}", e);
            UiEvent::LoadFailed(format!("{e:#}"))
        }
    }
}

fn dropped_event(file: &egui::DroppedFile) -> UiEvent {
    let name = match &file.path {
        Some(path) => path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| file.name.clone()),
        None => file.name.clone(),
    };

    // Rejected files are never read
    if !is_supported(&name) {
        return UiEvent::FileOpened(LoadedFile::new(name, Vec::new()));
    }

    match (&file.bytes, &file.path) {
        (Some(bytes), _) => UiEvent::FileOpened(LoadedFile::new(name, bytes.to_vec())),
        (None, Some(path)) => load_event(path),
        (None, None) => UiEvent::LoadFailed(format!("Could not read {name}")),
    }
}

/// Turn a diagram server response into image bytes or a displayable failure
fn diagram_result(response: &Response) -> Result<Arc<[u8]>, String> {
    if !response.is_ok() {
        return Err(failure_message(response));
    }
    let is_svg = response
        .header("content-type")
        .is_none_or(|kind| kind.contains("svg"));
    if !is_svg {
        return Err("Diagram server did not return an SVG image".to_string());
    }
    Ok(Arc::from(response.body.as_slice()))
}

fn failure_message(response: &Response) -> String {
    let body = String::from_utf8_lossy(&response.body);
    let detail: String = body.trim().chars().take(200).collect();
    if detail.is_empty() {
        format!("HTTP {}", response.status)
    } else {
        format!("HTTP {}: {}", response.status, detail)
    }
}

async fn fetch_text(cache: &Cache, url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    let response = cache.handle(&Request::get(url)).await;
    if !response.is_ok() {
        tracing::warn!("Export asset unavailable: {}", failure_message(&response));
        return None;
    }
    String::from_utf8(response.body).ok()
}

impl eframe::App for MarkviewApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.receive(ctx);
        self.collect_input(ctx);
        self.pending.push_back(UiEvent::Tick);
        self.process_pending(ctx);

        let mut events = Vec::new();
        Toolbar::show(ctx, &self.session, &self.cache_status, &mut events);

        let scroll_to_top = std::mem::take(&mut self.scroll_to_top);
        let url = egui::CentralPanel::default()
            .show(ctx, |ui| PreviewPanel::show(ui, &self.session, scroll_to_top, &mut events))
            .inner;

        let fullscreen_action = diagram::show_fullscreen(ctx, &self.session);
        match fullscreen_action {
            Some(BlockAction::Event(event)) => events.push(event),
            Some(BlockAction::OpenUrl(_)) | None => {}
        }

        if self.session.help_open {
            overlays::show_help(ctx, &mut events);
        }
        if let Some(notice) = &self.session.notice {
            overlays::show_notice(ctx, notice, &mut events);
            ctx.request_repaint_after(notice.expires_at.saturating_duration_since(Instant::now()));
        }

        if let Some(url) = url {
            if let Err(e) = open::that(&url) {
                tracing::error!("Failed to open {}: {}", url, e);
            }
        }

        self.pending.extend(events);
        if !self.pending.is_empty() {
            self.process_pending(ctx);
            ctx.request_repaint();
        }
    }
}

impl MarkviewApp {
    /// Title shown before any document is opened
    pub fn initial_title() -> String {
        window_title(None)
    }
}
