use crate::preview::document::{BadgeTone, ButtonVariant, Direction, PlanNode};
use crate::theme::Theme;
use eframe::egui::{self, RichText};
use std::collections::BTreeMap;

/// Paints a validated render plan with the app theme. Input widgets write
/// into the sandbox-local state map handed in by the caller; nothing here
/// touches host state.
pub struct WidgetRegistry;

impl WidgetRegistry {
    pub fn render(
        node: &PlanNode,
        ui: &mut egui::Ui,
        theme: &Theme,
        form_state: &mut BTreeMap<String, String>,
    ) {
        match node {
            PlanNode::Stack {
                direction,
                gap,
                children,
            } => {
                let render_all = |ui: &mut egui::Ui| {
                    ui.spacing_mut().item_spacing = egui::vec2(*gap, *gap);
                    for child in children {
                        Self::render(child, ui, theme, form_state);
                    }
                };
                match direction {
                    Direction::Vertical => {
                        ui.vertical(render_all);
                    }
                    Direction::Horizontal => {
                        ui.horizontal_wrapped(render_all);
                    }
                }
            }
            PlanNode::Heading { level, text } => {
                let size = match level {
                    1 => 22.0,
                    2 => 18.0,
                    _ => 15.0,
                };
                ui.label(
                    RichText::new(text)
                        .color(theme.text_primary)
                        .size(size)
                        .strong(),
                );
            }
            PlanNode::Text { text } => {
                ui.label(RichText::new(text).color(theme.text_primary).size(14.0));
            }
            PlanNode::Button { label, variant } => {
                let (fill, text_color) = match variant {
                    ButtonVariant::Primary => (theme.accent_primary, theme.text_on_accent),
                    ButtonVariant::Secondary => (theme.surface_2, theme.text_primary),
                };
                let widget = egui::Button::new(
                    RichText::new(label).color(text_color).size(13.0),
                )
                .fill(fill)
                .stroke(theme.subtle_button_stroke())
                .corner_radius(egui::CornerRadius::same(theme.radius_8))
                .min_size(egui::vec2(0.0, theme.button_height));
                // Clicks stay inside the sandbox; the preview is visual.
                let _ = ui.add(widget);
            }
            PlanNode::Input {
                id,
                label,
                placeholder,
            } => {
                if !label.is_empty() {
                    ui.label(RichText::new(label).color(theme.text_muted).size(12.0));
                }
                let value = form_state.entry(id.clone()).or_default();
                ui.add(
                    egui::TextEdit::singleline(value)
                        .desired_width(f32::INFINITY)
                        .hint_text(placeholder.as_str()),
                );
            }
            PlanNode::Image { src, alt, height } => {
                let frame = theme.panel_frame(theme.surface_3, theme.spacing_8 as i8);
                frame.show(ui, |ui| {
                    ui.set_min_height(*height);
                    ui.centered_and_justified(|ui| {
                        let caption = if alt.is_empty() { src.as_str() } else { alt.as_str() };
                        ui.label(RichText::new(caption).color(theme.text_muted).size(12.0));
                    });
                });
            }
            PlanNode::Card { title, children } => {
                theme.card_frame().show(ui, |ui| {
                    if let Some(title) = title {
                        ui.label(
                            RichText::new(title)
                                .color(theme.text_primary)
                                .size(14.0)
                                .strong(),
                        );
                        ui.add_space(theme.spacing_8);
                    }
                    for child in children {
                        Self::render(child, ui, theme, form_state);
                        ui.add_space(theme.spacing_4);
                    }
                });
            }
            PlanNode::Badge { label, tone } => {
                let accent = match tone {
                    BadgeTone::Neutral => theme.text_muted,
                    BadgeTone::Success => theme.success,
                    BadgeTone::Warning => theme.warning,
                    BadgeTone::Danger => theme.danger,
                };
                egui::Frame::new()
                    .fill(theme.surface_3)
                    .stroke(egui::Stroke::new(1.0, accent))
                    .corner_radius(egui::CornerRadius::same(theme.radius_10))
                    .inner_margin(egui::Margin::symmetric(
                        theme.spacing_8 as i8,
                        theme.spacing_4 as i8,
                    ))
                    .show(ui, |ui| {
                        ui.label(RichText::new(label).color(accent).size(11.0));
                    });
            }
            PlanNode::Divider => {
                ui.separator();
            }
        }
    }
}
