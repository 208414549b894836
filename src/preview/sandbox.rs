use crate::preview::capture::{self, CaptureFormat};
use crate::preview::document::{self, RenderFault, RenderPlan};
use crate::preview::registry::WidgetRegistry;
use crate::preview::DeviceMode;
use crate::theme::Theme;
use eframe::egui::{self, RichText};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::mpsc::{self, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

/// Hard ceiling on document evaluation time; past this the sandbox
/// reports a contained timeout fault instead of holding up the host.
pub const EVAL_DEADLINE: Duration = Duration::from_secs(3);

/// Outer trigger: the toolbar asks the preview container to export an
/// image. The container relays it into the sandbox as a capture message.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PreviewCommand {
    ExportImage { format: CaptureFormat },
}

/// The only message the host sends across the sandbox boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SandboxMessage {
    CaptureScreenshot { format: CaptureFormat },
}

enum Outcome {
    Evaluating { since: Instant },
    Ready(RenderPlan),
    Faulted(RenderFault),
}

/// An isolated rendering context for one version of generated source.
/// Never reused: changing the displayed code means constructing a new
/// sandbox, so no form state, fault, or capture request survives a
/// version switch. Evaluation of the untrusted document runs on its own
/// worker thread; faults of any kind are contained and painted as an
/// error panel inside the preview container.
pub struct PreviewSandbox {
    outcome: Outcome,
    rx: mpsc::Receiver<Result<RenderPlan, RenderFault>>,
    form_state: BTreeMap<String, String>,
    pending_capture: Option<CaptureFormat>,
    awaiting_frame: Option<CaptureFormat>,
    container_rect: egui::Rect,
}

impl PreviewSandbox {
    pub fn evaluate(source: &str) -> Self {
        let (tx, rx) = mpsc::channel();
        let source = source.to_string();
        let spawned = thread::Builder::new()
            .name("maquette-preview-eval".to_string())
            .spawn(move || {
                let _ = tx.send(document::evaluate(&source));
            });

        let outcome = match spawned {
            Ok(_) => Outcome::Evaluating {
                since: Instant::now(),
            },
            Err(_) => Outcome::Faulted(RenderFault::WorkerLost),
        };

        Self {
            outcome,
            rx,
            form_state: BTreeMap::new(),
            pending_capture: None,
            awaiting_frame: None,
            container_rect: egui::Rect::NOTHING,
        }
    }

    /// Host-side relay of the public export trigger.
    pub fn relay(&mut self, command: PreviewCommand) {
        match command {
            PreviewCommand::ExportImage { format } => {
                self.receive(SandboxMessage::CaptureScreenshot { format });
            }
        }
    }

    pub fn receive(&mut self, message: SandboxMessage) {
        match message {
            SandboxMessage::CaptureScreenshot { format } => {
                self.pending_capture = Some(format);
            }
        }
    }

    fn poll(&mut self) {
        let since = match &self.outcome {
            Outcome::Evaluating { since } => *since,
            _ => return,
        };
        match self.rx.try_recv() {
            Ok(Ok(plan)) => self.outcome = Outcome::Ready(plan),
            Ok(Err(fault)) => self.outcome = Outcome::Faulted(fault),
            Err(TryRecvError::Empty) => {
                if since.elapsed() > EVAL_DEADLINE {
                    self.outcome =
                        Outcome::Faulted(RenderFault::Timeout(EVAL_DEADLINE.as_millis() as u64));
                }
            }
            Err(TryRecvError::Disconnected) => {
                self.outcome = Outcome::Faulted(RenderFault::WorkerLost);
            }
        }
    }

    pub fn fault(&mut self) -> Option<&RenderFault> {
        self.poll();
        match &self.outcome {
            Outcome::Faulted(fault) => Some(fault),
            _ => None,
        }
    }

    pub fn is_ready(&mut self) -> bool {
        self.poll();
        matches!(self.outcome, Outcome::Ready(_))
    }

    #[cfg(test)]
    fn has_pending_capture(&self) -> bool {
        self.pending_capture.is_some()
    }

    pub fn show(&mut self, ui: &mut egui::Ui, theme: &Theme, device: DeviceMode) {
        self.poll();
        if matches!(self.outcome, Outcome::Evaluating { .. }) {
            ui.ctx().request_repaint_after(Duration::from_millis(50));
        }

        let available = ui.available_width();
        let width = device
            .width()
            .map(|w| w.min(available))
            .unwrap_or(available);

        ui.with_layout(egui::Layout::top_down(egui::Align::Center), |ui| {
            ui.set_max_width(width);
            let container = theme
                .panel_frame(theme.preview_surface, theme.spacing_16 as i8)
                .show(ui, |ui| {
                    ui.set_width(width - 2.0 * theme.spacing_16);
                    match &self.outcome {
                        Outcome::Evaluating { .. } => {
                            ui.horizontal(|ui| {
                                ui.spinner();
                                ui.label(
                                    RichText::new("Evaluating document...")
                                        .color(theme.text_muted)
                                        .size(13.0),
                                );
                            });
                        }
                        Outcome::Ready(plan) => {
                            let root = plan.root.clone();
                            egui::ScrollArea::vertical()
                                .id_salt("preview_sandbox")
                                .show(ui, |ui| {
                                    WidgetRegistry::render(
                                        &root,
                                        ui,
                                        theme,
                                        &mut self.form_state,
                                    );
                                });
                        }
                        Outcome::Faulted(fault) => {
                            Self::fault_panel(fault, ui, theme);
                        }
                    }
                });
            self.container_rect = container.response.rect;
        });

        self.process_capture(ui.ctx());
    }

    fn fault_panel(fault: &RenderFault, ui: &mut egui::Ui, theme: &Theme) {
        theme.fault_frame().show(ui, |ui| {
            ui.label(
                RichText::new("Preview error")
                    .color(theme.danger)
                    .size(13.0)
                    .strong(),
            );
            ui.add_space(theme.spacing_4);
            ui.label(
                RichText::new(fault.to_string())
                    .color(theme.text_primary)
                    .size(12.0)
                    .monospace(),
            );
        });
    }

    /// Screenshot exchange: issue the viewport capture one frame, collect
    /// the returned image the next. Failures are logged, never surfaced.
    fn process_capture(&mut self, ctx: &egui::Context) {
        if let Some(format) = self.pending_capture.take() {
            ctx.send_viewport_cmd(egui::ViewportCommand::Screenshot(egui::UserData::default()));
            self.awaiting_frame = Some(format);
            ctx.request_repaint();
        }

        let Some(format) = self.awaiting_frame else {
            return;
        };
        let screenshot = ctx.input(|input| {
            input.events.iter().find_map(|event| match event {
                egui::Event::Screenshot { image, .. } => Some(image.clone()),
                _ => None,
            })
        });
        if let Some(image) = screenshot {
            self.awaiting_frame = None;
            let pixels_per_point = ctx.pixels_per_point();
            match capture::save_to_downloads(&image, self.container_rect, pixels_per_point, format)
            {
                Ok(path) => tracing::info!(path = %path.display(), "preview image exported"),
                Err(err) => tracing::warn!(error = %err, "screenshot capture failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settle(sandbox: &mut PreviewSandbox) {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            sandbox.poll();
            if !matches!(sandbox.outcome, Outcome::Evaluating { .. }) {
                return;
            }
            assert!(Instant::now() < deadline, "evaluation did not settle");
            thread::sleep(Duration::from_millis(5));
        }
    }

    const VALID: &str = r#"{
        "schema_version": 1,
        "definitions": [
            { "name": "Component", "node": { "kind": "text", "text": "hello" } }
        ]
    }"#;

    #[test]
    fn valid_source_becomes_ready() {
        let mut sandbox = PreviewSandbox::evaluate(VALID);
        settle(&mut sandbox);
        assert!(sandbox.is_ready());
        assert!(sandbox.fault().is_none());
    }

    #[test]
    fn faulting_source_is_contained() {
        let mut sandbox = PreviewSandbox::evaluate("definitely not json");
        settle(&mut sandbox);
        assert!(matches!(
            sandbox.fault(),
            Some(RenderFault::DocumentParse(_))
        ));
    }

    #[test]
    fn missing_entry_is_contained() {
        let source = json!({ "schema_version": 1, "definitions": [] }).to_string();
        let mut sandbox = PreviewSandbox::evaluate(&source);
        settle(&mut sandbox);
        assert_eq!(sandbox.fault(), Some(&RenderFault::NoEntryComponent));
    }

    #[test]
    fn fresh_sandbox_carries_no_residual_state() {
        let mut first = PreviewSandbox::evaluate(VALID);
        settle(&mut first);
        first
            .form_state
            .insert("email".to_string(), "typed text".to_string());

        let mut second = PreviewSandbox::evaluate(VALID);
        settle(&mut second);
        assert!(second.form_state.is_empty());
        assert!(!second.has_pending_capture());
    }

    #[test]
    fn export_trigger_relays_to_a_capture_message() {
        let mut sandbox = PreviewSandbox::evaluate(VALID);
        sandbox.relay(PreviewCommand::ExportImage {
            format: CaptureFormat::Png,
        });
        assert!(sandbox.has_pending_capture());
    }

    #[test]
    fn protocol_messages_serialize_to_the_wire_shape() {
        let message = SandboxMessage::CaptureScreenshot {
            format: CaptureFormat::Jpeg,
        };
        assert_eq!(
            serde_json::to_value(message).unwrap(),
            json!({ "type": "CAPTURE_SCREENSHOT", "format": "jpeg" })
        );
        let command = PreviewCommand::ExportImage {
            format: CaptureFormat::Png,
        };
        assert_eq!(
            serde_json::to_value(command).unwrap(),
            json!({ "type": "EXPORT_IMAGE", "format": "png" })
        );
    }
}
