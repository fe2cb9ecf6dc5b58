use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};

use task_cascade::cascade::{CascadeEngine, CascadeOptions};
use task_cascade::config::{self, TaskCascadeConfig};
use task_cascade::lock;
use task_cascade::log::resolve_log_level;
use task_cascade::provision;
use task_cascade::report;
use task_cascade::store;
use task_cascade::store_actor::{spawn_store, StoreHandle};
use task_cascade::trigger::ConfiguredTrigger;
use task_cascade::types::CascadeResult;
use task_cascade::{log_debug, log_info};

/// Runtime directory (lock + PID file), relative to the project root.
const RUNTIME_DIR: &str = ".task-cascade";

/// How long a command waits for another process holding the store lock.
const LOCK_WAIT_SECONDS: u64 = 30;

const SAMPLE_TEMPLATES: &str = r#"# Each template becomes one task per workflow instance.
# dependencies name other template ids.

[[templates]]
id = "intake"
name = "Collect submission documents"
order = 10

[[templates]]
id = "extract"
name = "Extract application data"
dependencies = ["intake"]
auto_executable = true
order = 20

[[templates]]
id = "review"
name = "Underwriter review"
dependencies = ["extract"]
order = 30

[[templates]]
id = "quote"
name = "Prepare quote"
dependencies = ["review"]
order = 40
"#;

#[derive(Parser)]
#[command(
    name = "task-cascade",
    about = "Dependency resolution and cascading status engine for workflow instances"
)]
struct Cli {
    /// Project root directory (defaults to current directory)
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Path to config file (defaults to {root}/task-cascade.toml).
    /// Config-relative paths resolve from the config file's parent directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log verbosity level (error, warn, info, debug); falls back to TASK_CASCADE_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Print results as JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a config file, a sample templates file and the store directory
    Init {
        /// Prefix for provisioned task IDs (e.g., TSK)
        #[arg(long, default_value = "TSK")]
        prefix: String,
    },
    /// Validate the templates file (ids, references, cycles)
    Validate,
    /// Create a workflow instance from the templates and make root tasks actionable
    Provision {
        /// Instance ID (also the file name in the store)
        instance_id: String,
        /// Human-readable instance name
        #[arg(long, default_value = "")]
        name: String,
    },
    /// Mark a task completed and cascade to its dependents
    Complete { instance_id: String, task_id: String },
    /// Cascade from a task that is already completed
    Cascade { instance_id: String, task_id: String },
    /// Re-evaluate every upcoming task in an instance
    Reconcile { instance_id: String },
    /// Show instance status (all instances when no ID is given)
    Status { instance_id: Option<String> },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match resolve_log_level(cli.log_level.as_deref()) {
        Ok(level) => task_cascade::log::set_log_level(level),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }

    let root = &cli.root;
    let config_base = match &cli.config {
        Some(p) => p.parent().unwrap_or(Path::new(".")).to_path_buf(),
        None => root.to_path_buf(),
    };

    let result = match cli.command {
        Commands::Init { prefix } => handle_init(root, &prefix),
        Commands::Validate => handle_validate(root, cli.config.as_deref(), &config_base),
        Commands::Provision { instance_id, name } => {
            match Context::load(root, cli.config.as_deref(), &config_base) {
                Ok(ctx) => handle_provision(&ctx, &instance_id, &name, cli.json).await,
                Err(e) => Err(e),
            }
        }
        Commands::Complete {
            instance_id,
            task_id,
        } => match Context::load(root, cli.config.as_deref(), &config_base) {
            Ok(ctx) => handle_complete(&ctx, &instance_id, &task_id, cli.json).await,
            Err(e) => Err(e),
        },
        Commands::Cascade {
            instance_id,
            task_id,
        } => match Context::load(root, cli.config.as_deref(), &config_base) {
            Ok(ctx) => handle_cascade(&ctx, &instance_id, &task_id, cli.json).await,
            Err(e) => Err(e),
        },
        Commands::Reconcile { instance_id } => {
            match Context::load(root, cli.config.as_deref(), &config_base) {
                Ok(ctx) => handle_reconcile(&ctx, &instance_id, cli.json).await,
                Err(e) => Err(e),
            }
        }
        Commands::Status { instance_id } => {
            match Context::load(root, cli.config.as_deref(), &config_base) {
                Ok(ctx) => handle_status(&ctx, instance_id.as_deref(), cli.json).await,
                Err(e) => Err(e),
            }
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

// --- Shared setup ---

struct Context {
    root: PathBuf,
    config_base: PathBuf,
    config: TaskCascadeConfig,
}

impl Context {
    fn load(root: &Path, config_path: Option<&Path>, config_base: &Path) -> Result<Self, String> {
        let config = config::load_config_from(config_path, root)?;
        log_debug!(
            "[config] store_dir={}, templates={}, executor={}",
            config.project.store_dir,
            config.project.templates_path,
            config.executor.command.as_deref().unwrap_or("(log only)")
        );
        Ok(Self {
            root: root.to_path_buf(),
            config_base: config_base.to_path_buf(),
            config,
        })
    }

    fn lock(&self) -> Result<lock::LockGuard, String> {
        lock::acquire_with_wait(
            &self.root.join(RUNTIME_DIR),
            Duration::from_secs(LOCK_WAIT_SECONDS),
        )
    }

    fn engine(&self) -> CascadeEngine<StoreHandle, ConfiguredTrigger> {
        let (store, _store_task) = spawn_store(self.config.store_dir(&self.config_base));
        CascadeEngine::new(
            store,
            ConfiguredTrigger::from_config(&self.config.executor),
            CascadeOptions::from_config(&self.config.engine),
        )
    }
}

fn print_result(result: &CascadeResult, json: bool) -> Result<(), String> {
    if json {
        let rendered = serde_json::to_string_pretty(result)
            .map_err(|e| format!("Failed to render result: {}", e))?;
        println!("{}", rendered);
    } else {
        for line in report::format_cascade_summary(result) {
            println!("{}", line);
        }
    }
    Ok(())
}

// --- Handlers ---

fn handle_init(root: &Path, prefix: &str) -> Result<(), String> {
    if !prefix
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        || prefix.is_empty()
    {
        return Err(
            "Prefix must contain only alphanumeric characters, hyphens, and underscores"
                .to_string(),
        );
    }

    let defaults = TaskCascadeConfig::default();
    let store_dir = defaults.store_dir(root);
    fs::create_dir_all(&store_dir)
        .map_err(|e| format!("Failed to create {}: {}", store_dir.display(), e))?;

    let config_path = root.join(config::CONFIG_FILE_NAME);
    if !config_path.exists() {
        fs::write(&config_path, config::default_config_contents(prefix))
            .map_err(|e| format!("Failed to write {}: {}", config_path.display(), e))?;
    }

    let templates_path = defaults.templates_path(root);
    if !templates_path.exists() {
        fs::write(&templates_path, SAMPLE_TEMPLATES)
            .map_err(|e| format!("Failed to write {}: {}", templates_path.display(), e))?;
    }

    // Lock and PID files are per-machine; instance files are data
    let gitignore_path = root.join(".gitignore");
    let existing = if gitignore_path.exists() {
        fs::read_to_string(&gitignore_path)
            .map_err(|e| format!("Failed to read .gitignore: {}", e))?
    } else {
        String::new()
    };
    let entries = [
        format!("{}/{}", RUNTIME_DIR, lock::LOCK_FILE_NAME),
        format!("{}/{}", RUNTIME_DIR, lock::PID_FILE_NAME),
    ];
    let mut contents = existing.clone();
    for entry in &entries {
        if !existing.lines().any(|line| line.trim() == entry) {
            if !contents.is_empty() && !contents.ends_with('\n') {
                contents.push('\n');
            }
            contents.push_str(entry);
            contents.push('\n');
        }
    }
    if contents != existing {
        fs::write(&gitignore_path, contents)
            .map_err(|e| format!("Failed to write .gitignore: {}", e))?;
    }

    println!("Initialized task-cascade in {}", root.display());
    println!("  Created: {}", store_dir.display());
    println!(
        "  Created: {}, {}",
        config::CONFIG_FILE_NAME,
        defaults.project.templates_path
    );
    Ok(())
}

fn handle_validate(
    root: &Path,
    config_path: Option<&Path>,
    config_base: &Path,
) -> Result<(), String> {
    let config = config::load_config_from(config_path, root)?;
    let templates_path = config.templates_path(config_base);
    let templates = provision::load_templates(&templates_path)?;

    provision::validate_templates(&templates).map_err(|errors| {
        format!(
            "{} is invalid:\n{}",
            templates_path.display(),
            errors
                .iter()
                .map(|e| format!("  - {}", e))
                .collect::<Vec<_>>()
                .join("\n")
        )
    })?;

    println!(
        "{}: {} template(s), no cycles",
        templates_path.display(),
        templates.len()
    );
    Ok(())
}

async fn handle_provision(
    ctx: &Context,
    instance_id: &str,
    name: &str,
    json: bool,
) -> Result<(), String> {
    store::validate_instance_id(instance_id)?;
    let templates = provision::load_templates(&ctx.config.templates_path(&ctx.config_base))?;
    let instance = provision::provision_instance(
        instance_id,
        name,
        &templates,
        &ctx.config.project.task_prefix,
    )?;

    let _lock = ctx.lock()?;
    let engine = ctx.engine();
    log_info!(
        "[provision] Creating {} with {} task(s)",
        instance_id,
        instance.tasks.len()
    );
    engine.store().insert_instance(instance).await?;

    let result = engine.reconcile(instance_id).await?;
    print_result(&result, json)
}

async fn handle_complete(
    ctx: &Context,
    instance_id: &str,
    task_id: &str,
    json: bool,
) -> Result<(), String> {
    store::validate_instance_id(instance_id)?;
    let _lock = ctx.lock()?;
    let engine = ctx.engine();
    let result = engine.complete_task(instance_id, task_id).await?;
    print_result(&result, json)
}

async fn handle_cascade(
    ctx: &Context,
    instance_id: &str,
    task_id: &str,
    json: bool,
) -> Result<(), String> {
    store::validate_instance_id(instance_id)?;
    let _lock = ctx.lock()?;
    let engine = ctx.engine();
    let result = engine.on_task_completed(instance_id, task_id).await?;
    print_result(&result, json)
}

async fn handle_reconcile(ctx: &Context, instance_id: &str, json: bool) -> Result<(), String> {
    store::validate_instance_id(instance_id)?;
    let _lock = ctx.lock()?;
    let engine = ctx.engine();
    let result = engine.reconcile(instance_id).await?;
    print_result(&result, json)
}

async fn handle_status(
    ctx: &Context,
    instance_id: Option<&str>,
    json: bool,
) -> Result<(), String> {
    let engine = ctx.engine();
    let ids = match instance_id {
        Some(id) => {
            store::validate_instance_id(id)?;
            vec![id.to_string()]
        }
        None => engine.store().list_instances().await?,
    };

    if ids.is_empty() {
        println!("No workflow instances found");
        return Ok(());
    }

    let mut instances = Vec::new();
    for id in &ids {
        instances.push(engine.store().get_instance(id).await?);
    }

    if json {
        let rendered = serde_json::to_string_pretty(&instances)
            .map_err(|e| format!("Failed to render status: {}", e))?;
        println!("{}", rendered);
        return Ok(());
    }

    for (i, instance) in instances.iter().enumerate() {
        if i > 0 {
            println!();
        }
        for line in report::format_instance_status(instance) {
            println!("{}", line);
        }
    }
    Ok(())
}
