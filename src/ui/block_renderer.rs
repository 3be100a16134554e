//! Block rendering for the document view

use eframe::egui::{self, Color32, FontId, RichText, Ui};
use egui::text::{LayoutJob, TextFormat};

use super::{BlockAction, Palette};
use crate::core::session::DiagramState;
use crate::render::blocks::{plain_text, Block, Inline, ListItem, SpanStyle, TableAlignment};
use crate::render::highlight::HighlightedCode;
use crate::viewport::ViewportLayer;

const BODY_SIZE: f32 = 15.0;
const CODE_SIZE: f32 = 13.0;

/// What block rendering needs besides the blocks themselves
pub struct RenderContext<'a> {
    pub palette: Palette,
    pub viewports: &'a ViewportLayer,
    pub diagrams: &'a [DiagramState],
    pub epoch: u64,
}

/// Render a sequence of blocks, each under its own id scope
pub fn render_blocks(ui: &mut Ui, blocks: &[Block], ctx: &RenderContext<'_>) -> Option<BlockAction> {
    let mut action = None;
    for (idx, block) in blocks.iter().enumerate() {
        if let Some(a) = ui.push_id(idx, |ui| render_block(ui, block, ctx)).inner {
            action = Some(a);
        }
    }
    action
}

/// Render a single block to the UI
pub fn render_block(ui: &mut Ui, block: &Block, ctx: &RenderContext<'_>) -> Option<BlockAction> {
    match block {
        Block::Heading { level, content } => render_heading(ui, *level, content, &ctx.palette),
        Block::Paragraph { content } => {
            let action = render_inlines(ui, content, BODY_SIZE, &ctx.palette);
            ui.add_space(8.0);
            action
        }
        Block::Code { language, code } => render_code_block(ui, language.as_deref(), code, &ctx.palette),
        Block::Diagram(diagram) => super::diagram::show_inline(ui, diagram, ctx),
        Block::List {
            ordered,
            start,
            items,
        } => render_list(ui, items, *ordered, *start, ctx),
        Block::Quote { blocks } => render_blockquote(ui, blocks, ctx),
        Block::Table {
            alignments,
            headers,
            rows,
        } => render_table(ui, alignments, headers, rows, &ctx.palette),
        Block::Rule => {
            render_horizontal_rule(ui);
            None
        }
    }
}

fn styled(text: &str, style: SpanStyle, size: f32, palette: &Palette) -> RichText {
    let mut rich = if style.code {
        RichText::new(text)
            .font(FontId::monospace(size - 1.0))
            .background_color(palette.code_bg)
    } else {
        RichText::new(text).size(size)
    };
    if style.strong {
        rich = rich.strong();
    }
    if style.emphasis {
        rich = rich.italics();
    }
    if style.strikethrough {
        rich = rich.strikethrough();
    }
    rich
}

/// Render inline content with wrapping
pub fn render_inlines(
    ui: &mut Ui,
    content: &[Inline],
    size: f32,
    palette: &Palette,
) -> Option<BlockAction> {
    let mut action = None;

    ui.horizontal_wrapped(|ui| {
        ui.spacing_mut().item_spacing.x = 0.0;
        for inline in content {
            match inline {
                Inline::Text { text, style, link } => {
                    let rich = styled(text, *style, size, palette);
                    match link {
                        Some(url) => {
                            let response = ui.link(rich);
                            if response.clicked() {
                                action = Some(BlockAction::OpenUrl(url.clone()));
                            }
                            response.on_hover_text(url);
                        }
                        None => {
                            ui.label(rich.color(palette.text));
                        }
                    }
                }
                Inline::Image { alt, url, title } => {
                    if let Some(a) = render_image(ui, alt, url, title.as_deref(), palette) {
                        action = Some(a);
                    }
                }
                Inline::LineBreak => ui.end_row(),
            }
        }
    });

    action
}

/// Render a heading
pub fn render_heading(
    ui: &mut Ui,
    level: u8,
    content: &[Inline],
    palette: &Palette,
) -> Option<BlockAction> {
    let font_size = match level {
        1 => 28.0,
        2 => 24.0,
        3 => 20.0,
        4 => 18.0,
        5 => 16.0,
        _ => 14.0,
    };

    ui.add_space(4.0);
    ui.label(
        RichText::new(plain_text(content))
            .font(FontId::proportional(font_size))
            .color(palette.heading)
            .strong(),
    );
    if level <= 2 {
        ui.separator();
    }

    ui.add_space(match level {
        1 => 12.0,
        2 => 10.0,
        _ => 6.0,
    });

    None
}

fn code_layout(code: &HighlightedCode) -> LayoutJob {
    let font_id = FontId::monospace(CODE_SIZE);
    let mut job = LayoutJob::default();

    for (idx, line) in code.lines.iter().enumerate() {
        if idx > 0 {
            job.append("\n", 0.0, TextFormat::simple(font_id.clone(), Color32::GRAY));
        }
        for run in line {
            let [r, g, b] = run.color;
            let color = Color32::from_rgb(r, g, b);
            let mut format = TextFormat::simple(font_id.clone(), color);
            format.italics = run.italic;
            if run.underline {
                format.underline = egui::Stroke::new(1.0, color);
            }
            job.append(&run.text, 0.0, format);
        }
    }

    job.wrap.max_width = f32::INFINITY;
    job
}

fn code_text(code: &HighlightedCode) -> String {
    code.lines
        .iter()
        .map(|line| line.iter().map(|run| run.text.as_str()).collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render a highlighted code block
pub fn render_code_block(
    ui: &mut Ui,
    language: Option<&str>,
    code: &HighlightedCode,
    palette: &Palette,
) -> Option<BlockAction> {
    let bg_color = code
        .background
        .map(|[r, g, b]| Color32::from_rgb(r, g, b))
        .unwrap_or(palette.code_bg);

    egui::Frame::new()
        .fill(bg_color)
        .stroke(egui::Stroke::new(1.0, palette.border))
        .inner_margin(egui::Margin::same(8))
        .outer_margin(egui::Margin::symmetric(0, 4))
        .corner_radius(4.0)
        .show(ui, |ui| {
            ui.set_width(ui.available_width());
            ui.horizontal(|ui| {
                let label = language.unwrap_or(&code.syntax);
                ui.label(
                    RichText::new(label)
                        .font(FontId::monospace(12.0))
                        .color(palette.muted),
                );
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.small_button("Copy").clicked() {
                        ui.ctx().copy_text(code_text(code));
                    }
                });
            });
            ui.add_space(4.0);

            egui::ScrollArea::horizontal()
                .auto_shrink([false, true])
                .show(ui, |ui| {
                    ui.label(code_layout(code));
                });
        });

    ui.add_space(8.0);
    None
}

/// Render a list (ordered or unordered)
pub fn render_list(
    ui: &mut Ui,
    items: &[ListItem],
    ordered: bool,
    start: Option<u64>,
    ctx: &RenderContext<'_>,
) -> Option<BlockAction> {
    let mut action = None;
    let start_num = start.unwrap_or(1);

    for (idx, item) in items.iter().enumerate() {
        ui.push_id(idx, |ui| {
            ui.horizontal(|ui| {
                ui.add_space(16.0);

                let marker = match item.checkbox {
                    Some(true) => "☑".to_string(),
                    Some(false) => "☐".to_string(),
                    None if ordered => format!("{}.", start_num + idx as u64),
                    None => "•".to_string(),
                };
                ui.label(RichText::new(marker).size(BODY_SIZE).color(ctx.palette.muted));
                ui.add_space(4.0);

                ui.vertical(|ui| {
                    if let Some(a) = render_blocks(ui, &item.blocks, ctx) {
                        action = Some(a);
                    }
                });
            });
        });
    }

    ui.add_space(4.0);
    action
}

/// Render a blockquote
pub fn render_blockquote(
    ui: &mut Ui,
    blocks: &[Block],
    ctx: &RenderContext<'_>,
) -> Option<BlockAction> {
    let mut action = None;

    egui::Frame::new()
        .fill(ctx.palette.quote_bg)
        .inner_margin(egui::Margin {
            left: 12,
            right: 8,
            top: 8,
            bottom: 8,
        })
        .show(ui, |ui| {
            ui.set_width(ui.available_width());
            // Left border effect
            let rect = ui.max_rect();
            ui.painter().rect_filled(
                egui::Rect::from_min_size(
                    rect.min - egui::vec2(12.0, 8.0),
                    egui::vec2(4.0, rect.height() + 16.0),
                ),
                0.0,
                ctx.palette.quote_bar,
            );

            action = render_blocks(ui, blocks, ctx);
        });

    ui.add_space(8.0);
    action
}

/// Render a horizontal rule
pub fn render_horizontal_rule(ui: &mut Ui) {
    ui.add_space(8.0);
    ui.separator();
    ui.add_space(8.0);
}

fn cell_layout(alignment: TableAlignment) -> egui::Layout {
    let align = match alignment {
        TableAlignment::Left => egui::Align::Min,
        TableAlignment::Center => egui::Align::Center,
        TableAlignment::Right => egui::Align::Max,
    };
    egui::Layout::top_down(align)
}

/// Render a table
pub fn render_table(
    ui: &mut Ui,
    alignments: &[TableAlignment],
    headers: &[Vec<Inline>],
    rows: &[Vec<Vec<Inline>>],
    palette: &Palette,
) -> Option<BlockAction> {
    use egui_extras::{Column, TableBuilder};

    let num_cols = headers.len().max(1);
    let alignment = |col: usize| alignments.get(col).copied().unwrap_or_default();
    let mut action = None;

    TableBuilder::new(ui)
        .striped(true)
        .columns(Column::auto().at_least(60.0), num_cols)
        .header(22.0, |mut header| {
            for (col, cell) in headers.iter().enumerate() {
                header.col(|ui| {
                    ui.with_layout(cell_layout(alignment(col)), |ui| {
                        ui.strong(plain_text(cell));
                    });
                });
            }
        })
        .body(|mut body| {
            for row in rows {
                body.row(20.0, |mut row_ui| {
                    for col in 0..num_cols {
                        row_ui.col(|ui| {
                            let Some(cell) = row.get(col) else {
                                return;
                            };
                            ui.with_layout(cell_layout(alignment(col)), |ui| {
                                if let Some(a) = render_inlines(ui, cell, BODY_SIZE - 1.0, palette) {
                                    action = Some(a);
                                }
                            });
                        });
                    }
                });
            }
        });

    ui.add_space(8.0);
    action
}

/// Render an image reference; clicking opens it externally
pub fn render_image(
    ui: &mut Ui,
    alt: &str,
    url: &str,
    title: Option<&str>,
    palette: &Palette,
) -> Option<BlockAction> {
    let mut action = None;

    let response = egui::Frame::new()
        .fill(palette.quote_bg)
        .stroke(egui::Stroke::new(1.0, palette.border))
        .inner_margin(egui::Margin::same(6))
        .corner_radius(4.0)
        .show(ui, |ui| {
            ui.horizontal(|ui| {
                ui.label(RichText::new("🖼").font(FontId::proportional(18.0)));
                ui.vertical(|ui| {
                    if !alt.is_empty() {
                        ui.label(RichText::new(alt).italics());
                    }
                    ui.label(
                        RichText::new(url)
                            .font(FontId::monospace(12.0))
                            .color(palette.muted),
                    );
                });
            });
        })
        .response
        .interact(egui::Sense::click());

    if response.clicked() {
        action = Some(BlockAction::OpenUrl(url.to_string()));
    }
    if let Some(title) = title {
        response.on_hover_text(title);
    }

    action
}
