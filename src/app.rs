use crate::event::AppEvent;
use crate::export::github::{GithubExporter, RepoSummary};
use crate::export::share::{self, SHARE_BASE_URL};
use crate::gen::GenerationClient;
use crate::preview::capture::CaptureFormat;
use crate::preview::sandbox::{PreviewCommand, PreviewSandbox};
use crate::preview::DeviceMode;
use crate::project::{GithubConfig, Role};
use crate::session::{AppStatus, ExportStart, Workbench};
use crate::theme::Theme;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use eframe::egui::{self, RichText, ScrollArea};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ViewMode {
    Preview,
    Code,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StylePreset {
    Modern,
    Minimalist,
    Glassmorphism,
    Brutalist,
    Cyberpunk,
}

impl StylePreset {
    const ALL: [StylePreset; 5] = [
        StylePreset::Modern,
        StylePreset::Minimalist,
        StylePreset::Glassmorphism,
        StylePreset::Brutalist,
        StylePreset::Cyberpunk,
    ];

    fn label(&self) -> &'static str {
        match self {
            Self::Modern => "Modern",
            Self::Minimalist => "Minimalist",
            Self::Glassmorphism => "Glassmorphism",
            Self::Brutalist => "Brutalist",
            Self::Cyberpunk => "Cyberpunk",
        }
    }

    /// Fold the chosen style into the outgoing prompt; the default adds
    /// nothing.
    fn apply(&self, prompt: &str) -> String {
        match self {
            Self::Modern => prompt.to_string(),
            other => format!("{prompt}\n\nVisual style: {}.", other.label()),
        }
    }
}

/// Quick-start prompts shown on an empty project.
const MAGIC_PROMPTS: [(&str, &str); 4] = [
    ("Pricing table", "Build a three-tier pricing table with a highlighted middle plan"),
    ("Login form", "Build a login form with email, password, and a primary sign-in button"),
    ("Hero section", "Build a landing page hero with a headline, supporting copy, and two buttons"),
    ("Profile card", "Build a profile card with an avatar image, name, role badge, and contact button"),
];

const SHARE_FEEDBACK: Duration = Duration::from_secs(2);

/// Pretty-print a component document for the code tab; formatting is
/// display-only and falls back to the raw text.
fn format_for_display(code: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(code) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| code.to_string()),
        Err(_) => code.to_string(),
    }
}

pub struct MaquetteApp {
    rx: Receiver<AppEvent>,
    generation: GenerationClient,
    exporter: GithubExporter,
    bench: Workbench,
    theme: Theme,
    theme_applied: bool,
    view: ViewMode,
    device: DeviceMode,
    sandbox: Option<PreviewSandbox>,
    sandbox_artifact: Option<String>,
    input_buffer: String,
    attached_image: Option<String>,
    style: StylePreset,
    show_github_modal: bool,
    config_draft: GithubConfig,
    repos: Vec<RepoSummary>,
    share_copied_at: Option<Instant>,
    scroll_to_bottom: bool,
}

impl MaquetteApp {
    pub fn new(
        rx: Receiver<AppEvent>,
        generation: GenerationClient,
        exporter: GithubExporter,
        bench: Workbench,
    ) -> Self {
        let config_draft = bench.github().clone();
        Self {
            rx,
            generation,
            exporter,
            bench,
            theme: Theme::dark(),
            theme_applied: false,
            view: ViewMode::Preview,
            device: DeviceMode::Desktop,
            sandbox: None,
            sandbox_artifact: None,
            input_buffer: String::new(),
            attached_image: None,
            style: StylePreset::Modern,
            show_github_modal: false,
            config_draft,
            repos: Vec::new(),
            share_copied_at: None,
            scroll_to_bottom: false,
        }
    }

    fn drain_events(&mut self, ctx: &egui::Context) {
        loop {
            match self.rx.try_recv() {
                Ok(AppEvent::ReposListed { repos }) => {
                    self.repos = repos;
                    ctx.request_repaint();
                }
                Ok(event) => {
                    let versions_before = self.bench.active().history.len();
                    if let Some(request) = self.bench.apply_event(event) {
                        self.generation.request_suggestions(request);
                    }
                    if self.bench.active().history.len() > versions_before {
                        // A fresh artifact always lands in the preview tab.
                        self.view = ViewMode::Preview;
                        self.scroll_to_bottom = true;
                    }
                    ctx.request_repaint();
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    /// Keep exactly one sandbox alive, always for the currently selected
    /// artifact. Any version change tears the old context down wholesale.
    fn sync_sandbox(&mut self) {
        let current = self
            .bench
            .active()
            .current()
            .map(|artifact| (artifact.id.clone(), artifact.code.clone()));
        match current {
            Some((id, code)) => {
                if self.sandbox_artifact.as_deref() != Some(id.as_str()) {
                    self.sandbox = Some(PreviewSandbox::evaluate(&code));
                    self.sandbox_artifact = Some(id);
                }
            }
            None => {
                self.sandbox = None;
                self.sandbox_artifact = None;
            }
        }
    }

    fn absorb_dropped_image(&mut self, ctx: &egui::Context) {
        let dropped = ctx.input(|input| input.raw.dropped_files.clone());
        for file in dropped {
            let bytes = file
                .bytes
                .as_ref()
                .map(|bytes| bytes.to_vec())
                .or_else(|| file.path.as_ref().and_then(|path| std::fs::read(path).ok()));
            if let Some(bytes) = bytes {
                self.attached_image =
                    Some(format!("data:image/png;base64,{}", STANDARD.encode(&bytes)));
            }
        }
    }

    fn submit_prompt(&mut self, ctx: &egui::Context) {
        let text = self.input_buffer.trim().to_string();
        if text.is_empty() {
            return;
        }
        let prompt = self.style.apply(&text);
        let image = self.attached_image.clone();
        if let Some(request) = self.bench.send_message(&prompt, image) {
            self.generation.request_generation(request);
            self.attached_image = None;
            self.input_buffer.clear();
            self.scroll_to_bottom = true;
            ctx.request_repaint();
        }
    }

    fn start_github_export(&mut self) {
        match self.bench.begin_github_export() {
            ExportStart::Request(request) => self.exporter.request_publish(request),
            ExportStart::NeedsConfig => self.open_github_modal(),
            ExportStart::Busy => {}
        }
    }

    fn open_github_modal(&mut self) {
        self.config_draft = self.bench.github().clone();
        self.show_github_modal = true;
        if !self.config_draft.token.trim().is_empty() {
            self.exporter.request_repo_list(self.config_draft.token.clone());
        }
    }

    fn share_current(&mut self, ctx: &egui::Context) {
        let Some(artifact) = self.bench.active().current() else {
            return;
        };
        let url = share::share_url(SHARE_BASE_URL, &artifact.code, &artifact.prompt);
        ctx.copy_text(url);
        self.share_copied_at = Some(Instant::now());
    }

    fn render_header(&mut self, ctx: &egui::Context) {
        let has_artifact = self.bench.active().current().is_some();
        let busy = self.bench.is_busy();
        let share_copied = self
            .share_copied_at
            .is_some_and(|at| at.elapsed() < SHARE_FEEDBACK);

        let mut share_clicked = false;
        let mut settings_clicked = false;
        let mut export_clicked = false;
        let mut export_image: Option<CaptureFormat> = None;
        let mut toggle_theme = false;

        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.selectable_value(&mut self.view, ViewMode::Preview, "Preview");
                ui.selectable_value(&mut self.view, ViewMode::Code, "Code");
                ui.separator();
                for device in DeviceMode::ALL {
                    ui.selectable_value(&mut self.device, device, device.label());
                }
                ui.separator();

                if ui
                    .button(if self.theme.dark { "Light" } else { "Dark" })
                    .clicked()
                {
                    toggle_theme = true;
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui
                        .add_enabled(has_artifact && !busy, egui::Button::new("Export"))
                        .clicked()
                    {
                        export_clicked = true;
                    }
                    if ui
                        .add_enabled(has_artifact, egui::Button::new("Save to GitHub"))
                        .clicked()
                    {
                        settings_clicked = true;
                    }
                    let share_label = if share_copied { "Copied!" } else { "Share" };
                    if ui
                        .add_enabled(has_artifact, egui::Button::new(share_label))
                        .clicked()
                    {
                        share_clicked = true;
                    }
                    ui.separator();
                    for format in [CaptureFormat::Jpeg, CaptureFormat::Png] {
                        if ui
                            .add_enabled(
                                has_artifact && self.view == ViewMode::Preview,
                                egui::Button::new(format.label()),
                            )
                            .clicked()
                        {
                            export_image = Some(format);
                        }
                    }
                });
            });
        });

        if toggle_theme {
            self.theme = if self.theme.dark {
                Theme::light()
            } else {
                Theme::dark()
            };
            self.theme.apply_visuals(ctx);
        }
        if share_clicked {
            self.share_current(ctx);
        }
        if settings_clicked {
            self.open_github_modal();
        }
        if export_clicked {
            self.start_github_export();
        }
        if let Some(format) = export_image {
            if let Some(sandbox) = self.sandbox.as_mut() {
                sandbox.relay(PreviewCommand::ExportImage { format });
            }
        }
    }

    fn render_sidebar(&mut self, ctx: &egui::Context) {
        let busy = self.bench.is_busy();
        let mut new_project = false;
        let mut open_project: Option<String> = None;
        let mut pick_version: Option<usize> = None;
        let mut pick_suggestion: Option<String> = None;
        let mut send_now = false;

        egui::SidePanel::left("workspace_panel")
            .resizable(true)
            .default_width(300.0)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.heading("Maquette");
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.button("New project").clicked() {
                            new_project = true;
                        }
                    });
                });
                ui.separator();

                ui.strong("Projects");
                let active_id = self.bench.active().id.clone();
                for project in self.bench.projects() {
                    let marker = if project.id == active_id { "> " } else { "" };
                    if ui.button(format!("{marker}{}", project.name)).clicked() {
                        open_project = Some(project.id.clone());
                    }
                }
                if self.bench.projects().is_empty() {
                    ui.label(
                        RichText::new("Nothing saved yet")
                            .color(self.theme.text_muted)
                            .size(12.0),
                    );
                }
                ui.separator();

                let history = &self.bench.active().history;
                if !history.is_empty() {
                    ui.strong("Versions");
                    ui.horizontal_wrapped(|ui| {
                        for (index, artifact) in history.iter().enumerate() {
                            let selected = self.bench.active().current_index == Some(index);
                            if ui
                                .selectable_label(selected, format!("v{}", artifact.version))
                                .clicked()
                            {
                                pick_version = Some(index);
                            }
                        }
                    });
                    ui.separator();
                }

                let transcript_height = (ui.available_height() - 190.0).max(120.0);
                ScrollArea::vertical()
                    .id_salt("chat_transcript")
                    .max_height(transcript_height)
                    .stick_to_bottom(true)
                    .show(ui, |ui| {
                        if self.bench.active().messages.is_empty() {
                            ui.label(
                                RichText::new("Describe a component to get started, or try:")
                                    .color(self.theme.text_muted)
                                    .size(12.0),
                            );
                            for (label, prompt) in MAGIC_PROMPTS {
                                if ui.small_button(label).clicked() {
                                    pick_suggestion = Some(prompt.to_string());
                                }
                            }
                        }
                        for message in &self.bench.active().messages {
                            let speaker = match message.role {
                                Role::User => "[You]",
                                Role::Assistant => "[Maquette]",
                            };
                            ui.label(format!("{speaker} {}", message.content));
                            if message.image.is_some() {
                                ui.label(
                                    RichText::new("(reference image attached)")
                                        .color(self.theme.text_muted)
                                        .size(11.0),
                                );
                            }
                        }
                        if self.scroll_to_bottom {
                            ui.scroll_to_cursor(Some(egui::Align::BOTTOM));
                        }
                    });
                self.scroll_to_bottom = false;

                if !self.bench.suggestions().is_empty() {
                    ui.horizontal_wrapped(|ui| {
                        for suggestion in self.bench.suggestions() {
                            if ui.small_button(suggestion).clicked() {
                                pick_suggestion = Some(suggestion.clone());
                            }
                        }
                    });
                }

                egui::CollapsingHeader::new("Diagnostics")
                    .default_open(false)
                    .show(ui, |ui| {
                        ScrollArea::vertical()
                            .id_salt("diagnostics_log")
                            .max_height(90.0)
                            .stick_to_bottom(true)
                            .show(ui, |ui| {
                                for entry in self.bench.notes() {
                                    ui.label(RichText::new(entry).size(11.0));
                                }
                            });
                    });

                ui.separator();
                ui.horizontal(|ui| {
                    ui.label(RichText::new("Style").color(self.theme.text_muted).size(12.0));
                    egui::ComboBox::from_id_salt("style_preset")
                        .selected_text(self.style.label())
                        .show_ui(ui, |ui| {
                            for preset in StylePreset::ALL {
                                ui.selectable_value(&mut self.style, preset, preset.label());
                            }
                        });
                    if self.attached_image.is_some() {
                        if ui.small_button("image attached ✕").clicked() {
                            self.attached_image = None;
                        }
                    } else {
                        ui.label(
                            RichText::new("drop an image to attach")
                                .color(self.theme.text_muted)
                                .size(11.0),
                        );
                    }
                });

                let hint = if busy {
                    "Waiting for the model..."
                } else {
                    "Describe a component..."
                };
                ui.horizontal(|ui| {
                    let response = ui.add_enabled(
                        !busy,
                        egui::TextEdit::singleline(&mut self.input_buffer)
                            .desired_width(f32::INFINITY)
                            .hint_text(hint),
                    );
                    if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                        send_now = true;
                    }
                    let clicked = ui
                        .add_enabled(
                            !busy && !self.input_buffer.trim().is_empty(),
                            egui::Button::new("Send"),
                        )
                        .clicked();
                    send_now |= clicked;
                });
            });

        if new_project {
            self.bench.new_project();
        }
        if let Some(id) = open_project {
            self.bench.select_project(&id);
        }
        if let Some(index) = pick_version {
            self.bench.select_version(index);
        }
        if let Some(suggestion) = pick_suggestion {
            self.input_buffer = suggestion;
        }
        if send_now && !busy {
            self.submit_prompt(ctx);
        }
    }

    fn render_center(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            if let AppStatus::Error(message) = self.bench.status() {
                self.theme.fault_frame().show(ui, |ui| {
                    ui.label(
                        RichText::new("Something went wrong")
                            .color(self.theme.danger)
                            .strong(),
                    );
                    ui.label(RichText::new(message).size(12.0));
                });
                ui.add_space(self.theme.spacing_8);
            }

            let has_artifact = self.bench.active().current().is_some();
            if !has_artifact {
                ui.centered_and_justified(|ui| {
                    ui.vertical_centered(|ui| {
                        ui.heading("Design Playground");
                        ui.label(
                            RichText::new("Pick a quick start or describe a component to begin.")
                                .color(self.theme.text_muted),
                        );
                    });
                });
                return;
            }

            match self.view {
                ViewMode::Preview => {
                    let backdrop = self
                        .theme
                        .panel_frame(self.theme.preview_backdrop, self.theme.spacing_16 as i8);
                    backdrop.show(ui, |ui| {
                        ui.set_min_height(ui.available_height());
                        if let Some(sandbox) = self.sandbox.as_mut() {
                            sandbox.show(ui, &self.theme, self.device);
                        }
                    });
                }
                ViewMode::Code => self.render_code_view(ui),
            }
        });

        if let Some(label) = self.bench.progress_label() {
            let title = match self.bench.status() {
                AppStatus::Exporting => "Cloud Sync",
                _ => "Generating",
            };
            egui::Area::new(egui::Id::new("busy_overlay"))
                .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
                .show(ctx, |ui| {
                    self.theme.card_frame().show(ui, |ui| {
                        ui.vertical_centered(|ui| {
                            ui.spinner();
                            ui.label(RichText::new(title).strong().size(16.0));
                            ui.label(
                                RichText::new(label)
                                    .color(self.theme.text_muted)
                                    .size(12.0),
                            );
                        });
                    });
                });
            ctx.request_repaint_after(Duration::from_millis(250));
        }
    }

    fn render_code_view(&mut self, ui: &mut egui::Ui) {
        let Some(artifact) = self.bench.active().current() else {
            return;
        };
        let formatted = format_for_display(&artifact.code);
        let mut copy_clicked = false;
        ui.horizontal(|ui| {
            ui.label(
                RichText::new(format!("v{} · {}", artifact.version, artifact.description))
                    .color(self.theme.text_muted)
                    .size(12.0),
            );
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                copy_clicked = ui.small_button("Copy").clicked();
            });
        });
        ScrollArea::vertical().id_salt("code_view").show(ui, |ui| {
            ui.label(RichText::new(&formatted).monospace().size(12.0));
        });
        if copy_clicked {
            ui.ctx().copy_text(formatted);
        }
    }

    fn render_github_modal(&mut self, ctx: &egui::Context) {
        if !self.show_github_modal {
            return;
        }
        let mut close = false;
        let mut fetch_repos = false;
        let mut save_and_export = false;

        egui::Window::new("GitHub Integration")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
            .show(ctx, |ui| {
                ui.label(RichText::new("Personal access token").size(12.0));
                ui.horizontal(|ui| {
                    ui.add(
                        egui::TextEdit::singleline(&mut self.config_draft.token)
                            .password(true)
                            .desired_width(260.0),
                    );
                    if ui.button("Fetch repos").clicked() {
                        fetch_repos = true;
                    }
                });

                ui.label(RichText::new("Repository").size(12.0));
                let selected = if self.config_draft.repo.is_empty() {
                    "Select repository".to_string()
                } else {
                    format!("{}/{}", self.config_draft.owner, self.config_draft.repo)
                };
                egui::ComboBox::from_id_salt("gh_repo")
                    .selected_text(selected)
                    .width(320.0)
                    .show_ui(ui, |ui| {
                        for repo in &self.repos {
                            if ui
                                .selectable_label(
                                    self.config_draft.repo == repo.name,
                                    &repo.full_name,
                                )
                                .clicked()
                            {
                                self.config_draft.repo = repo.name.clone();
                                self.config_draft.owner = repo.owner.login.clone();
                            }
                        }
                    });

                ui.label(RichText::new("Branch").size(12.0));
                ui.text_edit_singleline(&mut self.config_draft.branch);
                ui.label(RichText::new("File path").size(12.0));
                ui.text_edit_singleline(&mut self.config_draft.path);
                ui.label(RichText::new("Commit message").size(12.0));
                ui.text_edit_singleline(&mut self.config_draft.commit_message);

                ui.separator();
                ui.horizontal(|ui| {
                    if ui.button("Authorize & Sync").clicked() {
                        save_and_export = true;
                    }
                    if ui.button("Close").clicked() {
                        close = true;
                    }
                });
            });

        if fetch_repos && !self.config_draft.token.trim().is_empty() {
            self.exporter.request_repo_list(self.config_draft.token.clone());
        }
        if save_and_export {
            self.bench.set_github_config(self.config_draft.clone());
            self.show_github_modal = false;
            self.start_github_export();
        }
        if close {
            self.show_github_modal = false;
        }
    }
}

impl eframe::App for MaquetteApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if !self.theme_applied {
            self.theme.apply_visuals(ctx);
            self.theme_applied = true;
        }
        self.drain_events(ctx);
        self.absorb_dropped_image(ctx);
        self.sync_sandbox();
        self.render_header(ctx);
        self.render_sidebar(ctx);
        self.render_center(ctx);
        self.render_github_modal(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_for_display_pretty_prints_valid_documents() {
        let formatted = format_for_display("{\"a\":1,\"b\":[2,3]}");
        assert!(formatted.contains('\n'));
        assert!(formatted.contains("\"a\": 1"));
    }

    #[test]
    fn format_for_display_falls_back_to_raw_text() {
        assert_eq!(format_for_display("not json at all"), "not json at all");
    }

    #[test]
    fn style_presets_fold_into_the_prompt() {
        assert_eq!(StylePreset::Modern.apply("a card"), "a card");
        let styled = StylePreset::Brutalist.apply("a card");
        assert!(styled.starts_with("a card"));
        assert!(styled.contains("Brutalist"));
    }
}
