use aic_client::config::resolve_backend_url;
use aic_client::local_flag::ASSET_CHANGED_FLAG;
use aic_client::{
    AnalysisSnapshot, AnalysisStore, AnalysisView, ConnectionConfig, ConnectionManager,
    Dispatcher, LocalFlagStore, LogNotifier, ProjectState, SessionRef,
};
use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "aic-console")]
struct Args {
    #[arg(long, default_value = "")]
    backend_url: String,
    #[arg(long, default_value = "")]
    chat_id: String,
    #[arg(long, default_value_t = false)]
    debug: bool,
    #[arg(long, default_value = "")]
    log_dir: String,
    #[arg(long, default_value = "")]
    state_dir: String,
}

#[derive(Clone, Debug)]
struct Config {
    backend_url: String,
    chat_id: String,
    debug: bool,
    log_dir: String,
    state_dir: String,
    log_stdout: bool,
}

fn load_config() -> Config {
    let args = Args::parse();
    Config {
        backend_url: args.backend_url,
        chat_id: resolve_chat_id(&args.chat_id),
        debug: args.debug,
        log_dir: resolve_dir(&args.log_dir, "AIC_LOG_DIR", ".aic/logs"),
        state_dir: resolve_dir(&args.state_dir, "AIC_STATE_DIR", ".aic/state"),
        log_stdout: env_true("AIC_LOG_STDOUT"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config();
    let _log_guard = init_logging(&config);
    let url = resolve_backend_url(&config.backend_url);

    let session = SessionRef::new(config.chat_id.clone());
    let analysis = AnalysisStore::new();
    let project = ProjectState::new();
    let dispatcher = Dispatcher::new(analysis.clone(), project.clone(), Arc::new(LogNotifier));
    let mut manager =
        ConnectionManager::new(ConnectionConfig::new(url.clone()), session, dispatcher);

    info!(event = "console_start", url = %url, chat_id = %config.chat_id);
    let mut state_rx = manager.subscribe_state();
    let mut project_rx = project.subscribe();
    let mut analysis_rx = analysis.subscribe();
    manager.init_websocket();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("waiting for ctrl-c")?;
                break;
            }
            Ok(()) = state_rx.changed() => {
                let state = *state_rx.borrow_and_update();
                info!(event = "connection_state", state = %state);
            }
            Ok(()) = project_rx.changed() => {
                match project_rx.borrow_and_update().clone() {
                    Some(project) => {
                        info!(event = "project_opened", name = %project.name, path = %project.path)
                    }
                    None => info!(event = "project_closed"),
                }
            }
            Ok(()) = analysis_rx.changed() => {
                let snapshot = analysis_rx.borrow_and_update().clone();
                log_analysis(&snapshot);
            }
        }
    }

    manager.disconnect().await;
    report_unsaved_edits(&config.state_dir);
    info!(event = "console_stop");
    Ok(())
}

fn log_analysis(snapshot: &AnalysisSnapshot) {
    match AnalysisView::from_snapshot(snapshot) {
        Some(view) => info!(
            event = "analysis",
            headline = %view.headline,
            agent = view.agent_id.as_deref().unwrap_or("-"),
            materials = %view.material_ids.join(","),
            next_step = view.next_step.as_deref().unwrap_or("-"),
        ),
        None => info!(
            event = "analysis_update",
            agent = snapshot.agent_id.as_deref().unwrap_or("-"),
            materials = %snapshot.relevant_material_ids.join(","),
        ),
    }
}

fn report_unsaved_edits(state_dir: &str) {
    let flags = LocalFlagStore::new(state_dir);
    match flags.get(ASSET_CHANGED_FLAG) {
        Ok(Some(true)) => warn!(event = "unsaved_asset_edits", path = %flags.path().display()),
        Ok(_) => {}
        Err(err) => warn!(event = "local_flag_error", error = %err),
    }
}

fn init_logging(config: &Config) -> Option<LogGuard> {
    let level = if config.debug {
        "debug".to_string()
    } else if let Ok(level) = std::env::var("AIC_LOG_LEVEL") {
        level
    } else {
        "info".to_string()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let guard = match open_log_file(&config.log_dir) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("log_file_error: {err}");
            LogGuard { file: None }
        }
    };
    // Without a file the console would be silent.
    let stdout = config.log_stdout || guard.file.is_none();
    let file = guard.file.clone();
    let make_writer = BoxMakeWriter::new(move || MultiWriter::new(stdout, file.clone()));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(make_writer)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return None;
    }
    Some(guard)
}

struct LogGuard {
    file: Option<Arc<Mutex<std::fs::File>>>,
}

struct MultiWriter {
    stdout: Option<io::Stdout>,
    file: Option<Arc<Mutex<std::fs::File>>>,
}

impl MultiWriter {
    fn new(stdout: bool, file: Option<Arc<Mutex<std::fs::File>>>) -> Self {
        Self {
            stdout: stdout.then(io::stdout),
            file,
        }
    }
}

impl Write for MultiWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(stdout) = self.stdout.as_mut() {
            let _ = stdout.write_all(buf);
        }
        if let Some(file) = &self.file {
            let mut file = file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let _ = file.write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(stdout) = self.stdout.as_mut() {
            let _ = stdout.flush();
        }
        if let Some(file) = &self.file {
            let mut file = file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let _ = file.flush();
        }
        Ok(())
    }
}

fn open_log_file(log_dir: &str) -> io::Result<LogGuard> {
    if log_dir.trim().is_empty() {
        return Ok(LogGuard { file: None });
    }
    let dir = PathBuf::from(log_dir);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("aic-console-{}.log", Utc::now().format("%Y%m%d")));
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(LogGuard {
        file: Some(Arc::new(Mutex::new(file))),
    })
}

fn env_true(key: &str) -> bool {
    match std::env::var(key) {
        Ok(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => false,
    }
}

fn resolve_chat_id(flag: &str) -> String {
    if !flag.trim().is_empty() {
        return flag.to_string();
    }
    if let Ok(value) = std::env::var("AIC_CHAT_ID") {
        if !value.trim().is_empty() {
            return value;
        }
    }
    format!("chat-{}", Utc::now().timestamp_millis())
}

fn resolve_dir(flag: &str, env_key: &str, fallback: &str) -> String {
    if !flag.trim().is_empty() {
        return flag.to_string();
    }
    if let Ok(value) = std::env::var(env_key) {
        if !value.trim().is_empty() {
            return value;
        }
    }
    fallback.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_wins_over_fallback() {
        assert_eq!(resolve_dir("/tmp/logs", "AIC_TEST_UNSET_DIR", ".aic/logs"), "/tmp/logs");
        assert_eq!(resolve_dir("  ", "AIC_TEST_UNSET_DIR", ".aic/logs"), ".aic/logs");
    }

    #[test]
    fn explicit_chat_id_is_kept() {
        assert_eq!(resolve_chat_id("chat-42"), "chat-42");
        assert!(resolve_chat_id("").starts_with("chat-") || std::env::var("AIC_CHAT_ID").is_ok());
    }
}
