use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
#[cfg(feature = "provider-piston")]
use snipper_core::providers::PistonProvider;
use snipper_core::backend::LocalBackend;
use snipper_core::editor::{EditorStore, TextBuffer};
use snipper_core::languages::{language_config, supported_languages};
use snipper_core::providers::{ExecutionProvider, MockProvider};
use snipper_core::repl::{run_repl, SharingContext};
use snipper_core::schema::NewExecution;
use snipper_core::storage::FileStore;
use snipper_core::types::{AppConfig, EditorSnapshot, JsonEnvelope};
use std::fs;
use std::path::{Path, PathBuf};
use toml::Value;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Parser)]
#[command(
    name = "snipper",
    version,
    about = "Write, run and share code snippets on a remote Piston runtime"
)]
struct Cli {
    #[arg(long, global = true)]
    json: bool,
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    InitConfig {
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    Repl {
        #[arg(long)]
        language: Option<String>,
    },
    Run {
        file: PathBuf,
        #[arg(long)]
        language: Option<String>,
        #[arg(long, default_value_t = false)]
        save: bool,
    },
    Prefs {
        #[arg(long)]
        theme: Option<String>,
        #[arg(long = "font-size")]
        font_size: Option<u32>,
        #[arg(long)]
        language: Option<String>,
    },
    Languages,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::InitConfig { force } = cli.cmd {
        init_config_file(Path::new(".snipper.toml"), force)?;
        println!("initialized .snipper.toml");
        return Ok(());
    }

    let cfg = load_config()?;
    init_tracing(&cfg, cli.verbose)?;

    match cli.cmd {
        Commands::InitConfig { .. } => {}
        Commands::Repl { language } => {
            let storage = FileStore::open(data_path(&cfg.storage.path))?;
            let mut store = EditorStore::new(build_provider(&cfg)?, storage);
            if let Some(language) = language {
                store.set_language(&language)?;
            }
            let sharing = SharingContext::open(data_path(&cfg.backend.path), cfg.user.clone())?;
            run_repl(&mut store, Some(sharing)).await?;
        }
        Commands::Run {
            file,
            language,
            save,
        } => {
            run_file(&cfg, &file, language, save, cli.json).await?;
        }
        Commands::Prefs {
            theme,
            font_size,
            language,
        } => {
            let storage = FileStore::open(data_path(&cfg.storage.path))?;
            let mut store = EditorStore::new(build_provider(&cfg)?, storage);
            if let Some(theme) = theme {
                store.set_theme(&theme)?;
            }
            if let Some(size) = font_size {
                store.set_font_size(size)?;
            }
            if let Some(language) = language {
                store.set_language(&language)?;
            }
            print_prefs(&store.snapshot(), cli.json)?;
        }
        Commands::Languages => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(supported_languages())?);
            } else {
                for lang in supported_languages() {
                    println!(
                        "{:<12} {:<12} {} {}",
                        lang.id, lang.label, lang.runtime.language, lang.runtime.version
                    );
                }
            }
        }
    }

    Ok(())
}

const SAVE_NEEDS_USER: &str =
    "--save needs a user; set [user] id in .snipper.toml or SNIPPER_USER_ID";

async fn run_file(
    cfg: &AppConfig,
    file: &Path,
    language: Option<String>,
    save: bool,
    json_output: bool,
) -> anyhow::Result<()> {
    let code = fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let language = language
        .or_else(|| language_from_extension(file).map(ToString::to_string))
        .context("cannot infer language from file extension; pass --language")?;

    if save && !cfg.user.is_signed_in() {
        anyhow::bail!(SAVE_NEEDS_USER);
    }

    // one-shot runs leave saved preferences and drafts alone
    let mut store = EditorStore::detached(build_provider(cfg)?);
    store.set_language(&language)?;
    store.attach_editor(TextBuffer::new(code));
    store.run().await;

    if save {
        if let Some(result) = store.execution_result() {
            save_execution(cfg, &language, NewExecution::from_result(&language, result))?;
        }
    }

    let snapshot = store.snapshot();
    if json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(&JsonEnvelope {
                status: (if snapshot.error.is_some() { "error" } else { "ok" }).to_string(),
                phase: "execute".to_string(),
                message: snapshot
                    .error
                    .clone()
                    .unwrap_or_else(|| "execution completed".to_string()),
                details: json!({
                    "file": file,
                    "language": language,
                    "result": snapshot.execution_result,
                }),
            })?
        );
    } else if snapshot.error.is_none() {
        println!("{}", snapshot.output);
    }

    match snapshot.error {
        Some(error) => anyhow::bail!(error),
        None => Ok(()),
    }
}

fn save_execution(cfg: &AppConfig, language: &str, row: NewExecution) -> anyhow::Result<()> {
    if !cfg.user.is_signed_in() {
        anyhow::bail!(SAVE_NEEDS_USER);
    }
    let path = data_path(&cfg.backend.path);
    let mut backend = LocalBackend::load(&path)?;
    backend.sync_user(&cfg.user.id, &cfg.user.email, &cfg.user.name);
    let id = backend.save_execution(&cfg.user.id, row)?;
    backend.save(&path)?;
    tracing::info!(%id, language, "saved execution");
    Ok(())
}

fn print_prefs(snapshot: &EditorSnapshot, json_output: bool) -> anyhow::Result<()> {
    if json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "language": snapshot.language,
                "theme": snapshot.theme,
                "fontSize": snapshot.font_size,
            }))?
        );
    } else {
        println!("language:  {}", snapshot.language);
        println!("theme:     {}", snapshot.theme);
        println!("font size: {}", snapshot.font_size);
    }
    Ok(())
}

fn language_from_extension(file: &Path) -> Option<&'static str> {
    let ext = file.extension()?.to_str()?.to_ascii_lowercase();
    let id = match ext.as_str() {
        "js" | "mjs" | "cjs" => "javascript",
        "ts" => "typescript",
        "py" => "python",
        "java" => "java",
        "go" => "go",
        "rs" => "rust",
        "cpp" | "cc" | "cxx" | "hpp" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "swift" => "swift",
        _ => return None,
    };
    language_config(id).map(|lang| lang.id)
}

fn build_provider(cfg: &AppConfig) -> anyhow::Result<Box<dyn ExecutionProvider>> {
    match cfg.execution.provider.to_ascii_lowercase().as_str() {
        "mock" => Ok(Box::new(MockProvider::echo())),
        #[cfg(feature = "provider-piston")]
        "piston" => Ok(Box::new(PistonProvider::new(
            &cfg.execution.endpoint,
            cfg.execution.timeout_ms,
        )?)),
        #[cfg(not(feature = "provider-piston"))]
        "piston" => anyhow::bail!("provider `piston` is not compiled in; use `mock`"),
        other => anyhow::bail!("unknown provider `{other}`; expected `piston` or `mock`"),
    }
}

fn init_tracing(cfg: &AppConfig, verbose: bool) -> anyhow::Result<()> {
    let level = if verbose {
        Level::DEBUG
    } else {
        cfg.log.level.parse::<Level>().unwrap_or(Level::WARN)
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Relative data paths live under the home directory.
fn data_path(raw: &str) -> PathBuf {
    resolve_data_path(raw, std::env::var("HOME").ok().as_deref())
}

fn resolve_data_path(raw: &str, home: Option<&str>) -> PathBuf {
    let path = PathBuf::from(raw);
    match home {
        Some(home) if path.is_relative() => PathBuf::from(home).join(path),
        _ => path,
    }
}

fn load_config() -> anyhow::Result<AppConfig> {
    let local_path = PathBuf::from(".snipper.toml");
    let home_path = std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".snipper.toml"));

    let home = match &home_path {
        Some(path) => read_config_value(path)?,
        None => None,
    };
    let local = read_config_value(&local_path)?;

    resolve_config(home, local, |k| std::env::var(k).ok())
}

fn resolve_config<F>(
    home: Option<Value>,
    local: Option<Value>,
    env_get: F,
) -> anyhow::Result<AppConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut merged = Value::try_from(AppConfig::default())?;
    if let Some(home_value) = home {
        merge_toml(&mut merged, home_value);
    }
    if let Some(local_value) = local {
        merge_toml(&mut merged, local_value);
    }

    let mut cfg: AppConfig = merged.try_into()?;
    apply_env_overrides(&mut cfg, env_get);
    Ok(cfg)
}

fn read_config_value(path: &Path) -> anyhow::Result<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)?;
    let parsed = raw.parse::<Value>()?;
    Ok(Some(parsed))
}

fn merge_toml(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Table(base_map), Value::Table(overlay_map)) => {
            for (key, value) in overlay_map {
                if let Some(base_value) = base_map.get_mut(&key) {
                    merge_toml(base_value, value);
                } else {
                    base_map.insert(key, value);
                }
            }
        }
        (base_value, overlay_value) => {
            *base_value = overlay_value;
        }
    }
}

fn apply_env_overrides<F>(cfg: &mut AppConfig, env_get: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = env_get("SNIPPER_PROVIDER") {
        cfg.execution.provider = v;
    }
    if let Some(v) = env_get("SNIPPER_ENDPOINT") {
        cfg.execution.endpoint = v;
    }
    if let Some(v) = env_get("SNIPPER_TIMEOUT_MS").and_then(|v| v.parse::<u64>().ok()) {
        cfg.execution.timeout_ms = v;
    }

    if let Some(v) = env_get("SNIPPER_STORAGE_PATH") {
        cfg.storage.path = v;
    }
    if let Some(v) = env_get("SNIPPER_BACKEND_PATH") {
        cfg.backend.path = v;
    }

    if let Some(v) = env_get("SNIPPER_USER_ID") {
        cfg.user.id = v;
    }
    if let Some(v) = env_get("SNIPPER_USER_NAME") {
        cfg.user.name = v;
    }
    if let Some(v) = env_get("SNIPPER_USER_EMAIL") {
        cfg.user.email = v;
    }

    if let Some(v) = env_get("SNIPPER_LOG_LEVEL") {
        cfg.log.level = v;
    }
}

fn init_config_file(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists; re-run with --force to overwrite",
            path.display()
        );
    }
    fs::write(path, config_template())?;
    Ok(())
}

fn config_template() -> &'static str {
    r#"# snipper configuration
# precedence: CLI > env > local .snipper.toml > home ~/.snipper.toml > defaults

[execution]
# provider options: piston, mock
provider = "piston"
endpoint = "https://emkc.org/api/v2/piston/execute"
# 0 disables the request timeout
timeout_ms = 30000

[storage]
# editor preferences and per-language drafts; relative paths live under $HOME
path = ".snipper/preferences.json"

[backend]
# users, executions, snippets, comments and stars
path = ".snipper/backend.json"

[user]
# leave id empty to run without an identity (no saving or sharing)
id = ""
name = ""
email = ""

[log]
level = "warn"
"#
}
