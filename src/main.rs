mod app;
mod event;
mod export;
mod gen;
mod preview;
mod project;
mod session;
mod store;
mod theme;

use app::MaquetteApp;
use eframe::egui;
use export::github::GithubExporter;
use gen::GenerationClient;
use session::Workbench;
use std::sync::mpsc;
use store::Store;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("maquette=info")),
        )
        .init();

    let (tx, rx) = mpsc::channel();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("maquette-runtime")
        .build()?;

    let generation = GenerationClient::new(runtime.handle().clone(), tx.clone());
    let exporter = GithubExporter::new(runtime.handle().clone(), tx);
    let bench = Workbench::new(Store::open_default());
    let app = MaquetteApp::new(rx, generation, exporter, bench);
    let _runtime = runtime;

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_min_inner_size([1024.0, 640.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Maquette",
        native_options,
        Box::new(move |_creation_context| Ok(Box::new(app))),
    )
    .map_err(|err| anyhow::anyhow!("failed to launch UI: {err}"))?;

    Ok(())
}
