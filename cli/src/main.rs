//! confi CLI: inspect and edit configuration stores.
//!
//! # Usage
//!
//! ```text
//! confi --cnc "db://DB_FILE=app.db;CONFI_NAME=Main" tree
//! confi --cnc file:///etc/app.conf get network/port
//! confi add --parent network timeout 30
//! confi --root network set port 9090
//! confi configs "Ma%"
//! ```

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use confi_core::{settings, Confi, KeyTree, Registry, Settings};


#[derive(Parser, Debug)]
#[command(name = "confi", version, about = "Hierarchical configuration store", long_about = None)]
struct Cli {
    /// Connection string, e.g. `db://DB_FILE=app.db` or `file:///etc/app.conf`
    #[arg(long, env = "CONFI_CNC")]
    cnc: Option<String>,

    /// Settings file (YAML)
    #[arg(long, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Scope paths under this root
    #[arg(long)]
    root: Option<String>,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}


#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Print the whole configuration tree
    Tree,
    /// Print the value at PATH
    Get { path: String },
    /// Overwrite the value of an existing key
    Set { path: String, value: String },
    /// Create KEY under --parent (or under the root)
    Add {
        #[arg(long)]
        parent: Option<String>,
        key: String,
        #[arg(default_value = "")]
        value: String,
    },
    /// Print the key at PATH with its description
    Key { path: String },
    /// Remove PATH and everything beneath it
    Rm { path: String },
    /// Move PATH beneath PARENT
    Mv { path: String, parent: String },
    /// List configurations, optionally filtered with LIKE syntax
    Configs { filter: Option<String> },
    /// Create a configuration
    AddConfig {
        name: String,
        #[arg(default_value = "")]
        description: String,
    },
    /// Rename or re-describe the selected configuration
    SetConfig {
        name: String,
        #[arg(default_value = "")]
        description: String,
    },
    /// Delete the selected configuration and all its keys
    RemoveConfig,
}


fn main() {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(output) => {
            if !output.is_empty() {
                println!("{}", output);
            }
        }
        Err(e) => {
            eprintln!("confi: {}", e);
            process::exit(1);
        }
    }
}


fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}


fn resolve_config_dir() -> PathBuf {
    config_dir_from(
        std::env::var("CONFI_CONFIG_DIR").ok(),
        std::env::var("HOME").ok(),
    )
}


/// `CONFI_CONFIG_DIR` wins; otherwise `$HOME/.config/confi`.
fn config_dir_from(env_dir: Option<String>, home: Option<String>) -> PathBuf {
    if let Some(dir) = env_dir {
        return PathBuf::from(dir);
    }
    let home = home.unwrap_or_else(|| "/tmp".into());
    PathBuf::from(home).join(".config").join("confi")
}


fn load_settings(explicit: Option<&PathBuf>) -> Result<Settings, String> {
    let path = match explicit {
        Some(path) => path.clone(),
        None => resolve_config_dir().join("settings.yaml"),
    };
    debug!(settings = %path.display(), explicit = explicit.is_some(), "loading settings");
    let loaded = match explicit {
        Some(_) => settings::load(&path),
        None => settings::load_or_default(&path),
    };
    loaded.map_err(|e| e.to_string())
}


fn run(cli: Cli) -> Result<String, String> {
    let settings = load_settings(cli.settings.as_ref())?;
    let cnc = cli
        .cnc
        .clone()
        .or_else(|| settings.default_connection.clone())
        .ok_or("no connection string (use --cnc, CONFI_CNC or default_connection)")?;
    let registry = Registry::builtin();
    debug!(cnc = %cnc, root = ?cli.root, command = ?cli.command, "running command");

    match cli.command {
        Commands::Configs { filter } => {
            let list = Confi::configs_list_with(&cnc, filter.as_deref(), &settings, &registry)
                .map_err(|e| e.to_string())?;
            if cli.json {
                return to_json(&list);
            }
            Ok(list
                .iter()
                .map(|c| {
                    if c.description.is_empty() {
                        c.name.clone()
                    } else {
                        format!("{}\t{}", c.name, c.description)
                    }
                })
                .collect::<Vec<_>>()
                .join("\n"))
        }
        Commands::AddConfig { name, description } => {
            let info = Confi::add_config_with(&cnc, &name, &description, &settings, &registry)
                .map_err(|e| e.to_string())?;
            if cli.json {
                return to_json(&info);
            }
            Ok(format!("created configuration {}", info.name))
        }
        command => {
            let mut store =
                Confi::open_with(&cnc, &settings, &registry).map_err(|e| e.to_string())?;
            if let Some(root) = cli.root.as_deref() {
                store.set_root(Some(root)).map_err(|e| e.to_string())?;
            }
            let output = execute(&mut store, command, cli.json).map_err(|e| e.to_string())?;
            store.close().map_err(|e| e.to_string())?;
            Ok(output)
        }
    }
}


/// Commands that need an open store.
fn execute(
    store: &mut Confi,
    command: Commands,
    json: bool,
) -> Result<String, Box<dyn std::error::Error>> {
    let output = match command {
        Commands::Tree => {
            let tree = store.tree()?;
            if json {
                serde_json::to_string_pretty(&tree)?
            } else {
                render_tree(&tree)
            }
        }
        Commands::Get { path } => store.get(&path)?,
        Commands::Set { path, value } => {
            store.set(&path, &value)?;
            String::new()
        }
        Commands::Add { parent, key, value } => {
            let added = store.add_key(parent.as_deref(), &key, &value)?;
            if json {
                serde_json::to_string_pretty(&added)?
            } else {
                added.full_path()
            }
        }
        Commands::Key { path } => {
            let key = store.get_key(&path)?;
            if json {
                serde_json::to_string_pretty(&key)?
            } else if key.description.is_empty() {
                format!("{} = {}", key.full_path(), key.value)
            } else {
                format!("{} = {}\n  # {}", key.full_path(), key.value, key.description)
            }
        }
        Commands::Rm { path } => {
            store.remove_path(&path)?;
            String::new()
        }
        Commands::Mv { path, parent } => {
            store.move_path(&path, &parent)?;
            String::new()
        }
        Commands::SetConfig { name, description } => {
            store.set_config(&name, &description)?;
            String::new()
        }
        Commands::RemoveConfig => {
            let info = store.current_config()?;
            store.remove()?;
            format!("removed configuration {}", info.name)
        }
        Commands::Configs { .. } | Commands::AddConfig { .. } => String::new(),
    };
    Ok(output)
}


/// Indented text listing, two spaces per level, root omitted.
fn render_tree(tree: &KeyTree) -> String {
    tree.pre_order()
        .into_iter()
        .skip(1)
        .map(|(node, depth)| {
            let indent = "  ".repeat(depth - 1);
            if node.key.value.is_empty() {
                format!("{}{}", indent, node.key.key)
            } else {
                format!("{}{} = {}", indent, node.key.key, node.key.value)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}


fn to_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| e.to_string())
}
