use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use symdex::binding::BindingRegistry;
use symdex::config::Settings;
use symdex::registry::PackageRegistry;
use symdex::rpc::{serve, Session};
use symdex::store::SymbolStore;

#[derive(Parser)]
#[command(name = "symdex", version, about = "Incremental semantic code index")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a default .symdex/settings.toml in the current directory.
    Init {
        /// Overwrite an existing settings file.
        #[arg(long)]
        force: bool,
    },
    /// Index a project once and print statistics.
    Index {
        #[arg(long, default_value = ".")]
        root: PathBuf,
        #[arg(long, default_value = "plain")]
        language: String,
    },
    /// Index a project and run one read-only SQL query against it.
    Sql {
        query: String,
        #[arg(long, default_value = ".")]
        root: PathBuf,
        #[arg(long, default_value = "plain")]
        language: String,
        /// Emit JSON instead of a markdown table.
        #[arg(long)]
        json: bool,
    },
    /// Serve JSON-RPC on stdio.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Arc::new(Settings::load()?);
    symdex::logging::init_with_config(&settings.logging);

    match cli.command {
        Command::Init { force } => {
            let cwd = std::env::current_dir().context("cannot determine current directory")?;
            let path = Settings::init_config_file(&cwd, force)?;
            println!("created {}", path.display());
        }

        Command::Index { root, language } => {
            let registry = open_registry(&root, &language, settings)?;

            let bar = ProgressBar::new(0);
            bar.set_style(ProgressStyle::with_template(
                "{bar:40.cyan/blue} {pos}/{len} {msg}",
            )?);
            let progress = {
                let bar = bar.clone();
                move |processed: usize, total: usize, file: &str| {
                    bar.set_length(total as u64);
                    bar.set_position(processed as u64);
                    bar.set_message(file.to_string());
                }
            };

            let stats = registry.initial_index_all(Some(&progress));
            bar.finish_and_clear();

            println!(
                "indexed {} files, {} symbols ({} from cache, {} analyzed, {} failed)",
                stats.files, stats.symbols, stats.cache_hits, stats.analyzed, stats.failed
            );
        }

        Command::Sql {
            query,
            root,
            language,
            json,
        } => {
            let registry = open_registry(&root, &language, settings.clone())?;
            registry.initial_index_all(None);

            let store = SymbolStore::in_memory(&settings.store)?;
            registry.rebuild_store(&store)?;

            let result = store.query(&query, &[])?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result.to_json())?);
            } else {
                println!("{}", result.to_text());
            }
        }

        Command::Serve => {
            let session = Session::new(settings, BindingRegistry::with_builtin());
            serve(session).await?;
        }
    }

    Ok(())
}

fn open_registry(
    root: &std::path::Path,
    language: &str,
    settings: Arc<Settings>,
) -> anyhow::Result<PackageRegistry> {
    let bindings = BindingRegistry::with_builtin();
    let binding = bindings
        .get(language)
        .with_context(|| format!("no binding registered for language '{language}'"))?;
    let root = root
        .canonicalize()
        .with_context(|| format!("cannot resolve root '{}'", root.display()))?;
    Ok(PackageRegistry::open(&root, binding, settings)?)
}
