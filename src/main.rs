//! ansibleplay CLI entrypoint.
//!
//! This is the main entrypoint for the ansibleplay command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use ansibleplay::cli::{Cli, Commands, OutputFormatter, StateCommands};
use ansibleplay::config::{Manifest, ManifestParser, ManifestValidator, find_manifest_file};
use ansibleplay::error::{AnsiblePlayError, PlanError, Result};
use ansibleplay::planner::{ApplyPlan, DiffEngine, PlanExecutor};
use ansibleplay::provider::ProviderResolver;
use ansibleplay::resource::RunResource;
use ansibleplay::runner::{CancelSource, CancelToken, ProcessRunner};
use ansibleplay::state::{
    LocalStateStore, LockInfo, ProviderState, STATE_DIR, StateStore, generate_holder_id,
};

use clap::Parser;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Manifest template written by `init`.
const MANIFEST_TEMPLATE: &str = include_str!("../templates/ansibleplay.yaml");

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<ExitCode> {
    let formatter = OutputFormatter::new(cli.output);

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force),
        Commands::Validate { warnings } => {
            cmd_validate(cli.config.as_ref(), warnings, &formatter)
        }
        Commands::Plan { replace } => cmd_plan(cli.config.as_ref(), &replace, &formatter).await,
        Commands::Apply {
            yes,
            replace,
            parallelism,
        } => cmd_apply(cli.config.as_ref(), yes, &replace, parallelism, &formatter).await,
        Commands::Refresh { parallelism } => {
            cmd_refresh(cli.config.as_ref(), parallelism, &formatter).await
        }
        Commands::Destroy { yes } => cmd_destroy(cli.config.as_ref(), yes, &formatter).await,
        Commands::State { command } => cmd_state(cli.config.as_ref(), command, &formatter).await,
    }
}

/// Writes a starter manifest.
fn cmd_init(path: &Path, force: bool) -> Result<ExitCode> {
    info!("Initializing ansibleplay project in: {}", path.display());

    let manifest_path = path.join("ansibleplay.yaml");
    let gitignore_path = path.join(".gitignore");

    if !force && manifest_path.exists() {
        eprintln!("Manifest already exists: {}", manifest_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(ExitCode::FAILURE);
    }

    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    std::fs::write(&manifest_path, MANIFEST_TEMPLATE)?;
    eprintln!("Created: {}", manifest_path.display());

    let state_entry = format!("{STATE_DIR}/");
    if gitignore_path.exists() {
        let existing = std::fs::read_to_string(&gitignore_path)?;
        let missing: Vec<&str> = [".env", state_entry.as_str()]
            .into_iter()
            .filter(|entry| !existing.lines().any(|line| line.trim() == *entry))
            .collect();
        if !missing.is_empty() {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(&gitignore_path)?;
            writeln!(file, "\n# ansibleplay")?;
            for entry in missing {
                writeln!(file, "{entry}")?;
            }
            eprintln!("Updated: {}", gitignore_path.display());
        }
    } else {
        std::fs::write(&gitignore_path, format!(".env\n{state_entry}\n"))?;
        eprintln!("Created: {}", gitignore_path.display());
    }

    eprintln!("\nNext steps:");
    eprintln!("  1. Edit ansibleplay.yaml with your hosts and playbooks");
    eprintln!("  2. Run 'ansibleplay validate' to check the manifest");
    eprintln!("  3. Run 'ansibleplay plan' to see what will be played");
    eprintln!("  4. Run 'ansibleplay apply' to play it");

    Ok(ExitCode::SUCCESS)
}

/// Validates the manifest and the provider configuration.
fn cmd_validate(
    config_path: Option<&PathBuf>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let manifest_path = resolve_manifest_path(config_path)?;
    let base_dir = base_dir(&manifest_path);
    let manifest = load_manifest(&manifest_path, &base_dir)?;

    let result = ManifestValidator::new().with_base_dir(&base_dir).check(&manifest);
    println!("{}", formatter.format_validation(&result, show_warnings));
    if !result.is_valid() {
        return Ok(ExitCode::FAILURE);
    }

    let resolved = ProviderResolver::new()
        .with_working_dir(&base_dir)
        .configure(&manifest.provider)?;
    eprintln!(
        "Runs: {}, playbook binary: {}, read policy: {}",
        manifest.runs.len(),
        resolved.binary.display(),
        resolved.read_policy
    );

    Ok(ExitCode::SUCCESS)
}

/// Shows what apply would do.
async fn cmd_plan(
    config_path: Option<&PathBuf>,
    replace: &[String],
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let workspace = Workspace::load(config_path)?;
    let state = workspace.store.load().await?;

    let plan = workspace.plan(state.as_ref(), replace)?;
    println!("{}", formatter.format_plan(&plan));

    Ok(ExitCode::SUCCESS)
}

/// Applies the plan.
async fn cmd_apply(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    replace: &[String],
    parallelism: usize,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let workspace = Workspace::load(config_path)?;
    let resource = workspace.resource()?;
    let lock = workspace.lock("apply").await?;

    let outcome = apply_locked(
        &workspace,
        resource,
        auto_approve,
        replace,
        parallelism,
        formatter,
    )
    .await;

    workspace.unlock(&lock).await?;
    outcome
}

async fn apply_locked(
    workspace: &Workspace,
    resource: RunResource,
    auto_approve: bool,
    replace: &[String],
    parallelism: usize,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let mut state = workspace.store.load().await?.unwrap_or_default();
    let plan = workspace.plan(Some(&state), replace)?;

    println!("{}", formatter.format_plan(&plan));
    if plan.is_empty() {
        return Ok(ExitCode::SUCCESS);
    }
    if !auto_approve && !confirm("Do you want to apply this plan? [y/N]: ", "y")? {
        eprintln!("Apply cancelled.");
        return Ok(ExitCode::SUCCESS);
    }

    let (cancel, watcher) = watch_interrupt();
    let executor = PlanExecutor::new(resource)
        .with_store(workspace.store.clone())
        .with_parallelism(parallelism)
        .with_cancel(cancel.clone());

    let result = executor.execute(&plan, &mut state).await;
    watcher.abort();
    let result = result?;
    println!("{}", formatter.format_execution(&result));

    finish(result.all_successful(), &cancel)
}

/// Reads back every recorded run.
async fn cmd_refresh(
    config_path: Option<&PathBuf>,
    parallelism: usize,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let workspace = Workspace::load(config_path)?;
    let resource = workspace.resource()?;
    let lock = workspace.lock("refresh").await?;

    let outcome = refresh_locked(&workspace, resource, parallelism, formatter).await;

    workspace.unlock(&lock).await?;
    outcome
}

async fn refresh_locked(
    workspace: &Workspace,
    resource: RunResource,
    parallelism: usize,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let Some(mut state) = workspace.store.load().await? else {
        eprintln!("No state found.");
        return Ok(ExitCode::SUCCESS);
    };

    let (cancel, watcher) = watch_interrupt();
    let executor = PlanExecutor::new(resource)
        .with_store(workspace.store.clone())
        .with_parallelism(parallelism)
        .with_cancel(cancel.clone());

    let reports = executor.refresh(&mut state).await;
    watcher.abort();
    let reports = reports?;
    println!("{}", formatter.format_refresh(&reports));

    finish(reports.iter().all(|r| r.success), &cancel)
}

/// Forgets every recorded run.
async fn cmd_destroy(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let workspace = Workspace::load(config_path)?;
    let resource = workspace.resource()?;
    let lock = workspace.lock("destroy").await?;

    let outcome = destroy_locked(&workspace, resource, auto_approve, formatter).await;

    workspace.unlock(&lock).await?;
    outcome
}

async fn destroy_locked(
    workspace: &Workspace,
    resource: RunResource,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let mut state = workspace.store.load().await?.unwrap_or_default();
    if state.runs.is_empty() {
        eprintln!("No runs to destroy.");
        return Ok(ExitCode::SUCCESS);
    }

    let plan = ApplyPlan::destroy(&state);
    println!("{}", formatter.format_plan(&plan));

    if !auto_approve
        && !confirm(
            "\nThis forgets every recorded run. Type 'destroy' to confirm: ",
            "destroy",
        )?
    {
        eprintln!("Destroy cancelled.");
        return Ok(ExitCode::SUCCESS);
    }

    let (cancel, watcher) = watch_interrupt();
    let executor = PlanExecutor::new(resource)
        .with_store(workspace.store.clone())
        .with_cancel(cancel.clone());

    let result = executor.execute(&plan, &mut state).await;
    watcher.abort();
    let result = result?;
    println!("{}", formatter.format_execution(&result));

    if result.all_successful() && state.runs.is_empty() {
        workspace.store.delete().await?;
        info!("State removed");
    }

    finish(result.all_successful(), &cancel)
}

/// State management commands.
async fn cmd_state(
    config_path: Option<&PathBuf>,
    command: StateCommands,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let workspace = Workspace::load(config_path)?;
    let store = &workspace.store;

    match command {
        StateCommands::Show => {
            if let Some(state) = store.load().await? {
                println!("{}", formatter.format_state(&state));
            } else {
                eprintln!("No state found.");
            }
            if let Some(lock) = store.get_lock_info().await? {
                eprintln!("Locked: {lock}");
            }
        }
        StateCommands::Lock { holder } => {
            let holder = holder.unwrap_or_else(generate_holder_id);
            let lock = store.acquire_lock(&holder, "manual").await?;
            println!("{}", formatter.format_lock(&lock));
        }
        StateCommands::Unlock { lock_id, force } => {
            if force {
                match store.force_unlock().await? {
                    Some(lock) => {
                        warn!("Removed lock {lock}");
                        println!("{}", formatter.message("success", "State forcefully unlocked."));
                    }
                    None => println!("{}", formatter.message("warning", "State is not locked.")),
                }
            } else if let Some(id) = lock_id {
                store.release_lock(&id).await?;
                println!("{}", formatter.message("success", "State unlocked."));
            } else {
                eprintln!("Please provide --lock-id or use --force");
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Loaded manifest with the paths derived from it.
struct Workspace {
    manifest: Manifest,
    base_dir: PathBuf,
    store: Arc<LocalStateStore>,
}

impl Workspace {
    /// Loads and validates the manifest, and opens the state store.
    fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let manifest_path = resolve_manifest_path(config_path)?;
        let base_dir = base_dir(&manifest_path);
        let manifest = load_manifest(&manifest_path, &base_dir)?;

        let validation = ManifestValidator::new()
            .with_base_dir(&base_dir)
            .validate(&manifest)?;
        for warning in &validation.warnings {
            warn!("{warning}");
        }

        let state_dir = manifest
            .state
            .path
            .as_ref()
            .map_or_else(|| base_dir.join(STATE_DIR), |path| base_dir.join(path));
        let store = Arc::new(LocalStateStore::with_base_dir(&state_dir));
        debug!(
            "Using {} state backend at: {}",
            store.backend_type(),
            state_dir.display()
        );

        Ok(Self {
            manifest,
            base_dir,
            store,
        })
    }

    /// Resolves the provider configuration into a run resource.
    fn resource(&self) -> Result<RunResource> {
        let resolved = ProviderResolver::new()
            .with_working_dir(&self.base_dir)
            .configure(&self.manifest.provider)?;
        info!("Using playbook binary: {}", resolved.binary.display());
        Ok(RunResource::new(Arc::new(resolved), Arc::new(ProcessRunner::new())))
    }

    /// Builds the plan against the given state.
    fn plan(&self, state: Option<&ProviderState>, replace: &[String]) -> Result<ApplyPlan> {
        let diff = DiffEngine::new()
            .with_base_dir(&self.base_dir)
            .compute_diff(&self.manifest, state, replace)?;
        Ok(ApplyPlan::from_diff(&diff, &self.manifest, state))
    }

    async fn lock(&self, operation: &str) -> Result<LockInfo> {
        self.store.acquire_lock(&generate_holder_id(), operation).await
    }

    async fn unlock(&self, lock: &LockInfo) -> Result<()> {
        self.store.release_lock(&lock.lock_id).await
    }
}

/// Resolves the manifest path.
fn resolve_manifest_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_manifest_file("."), |path| Ok(path.clone()))
}

/// Directory relative paths in the manifest resolve against.
fn base_dir(manifest_path: &Path) -> PathBuf {
    manifest_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Loads `.env` next to the manifest, then the manifest with overrides.
fn load_manifest(manifest_path: &Path, base_dir: &Path) -> Result<Manifest> {
    debug!("Loading manifest from: {}", manifest_path.display());
    let parser = ManifestParser::new().with_base_path(base_dir);
    parser.load_dotenv()?;
    parser.load_with_env(manifest_path)
}

/// Asks for confirmation on stderr.
fn confirm(prompt: &str, expected: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    Ok(input.trim().eq_ignore_ascii_case(expected))
}

/// Cancels the returned token on Ctrl-C until the watcher is aborted.
fn watch_interrupt() -> (CancelToken, JoinHandle<()>) {
    let source = CancelSource::new();
    let token = source.token();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight runs");
            source.cancel();
        }
    });
    (token, watcher)
}

/// Maps the outcome of an execution to the exit code.
fn finish(success: bool, cancel: &CancelToken) -> Result<ExitCode> {
    if cancel.is_cancelled() {
        return Err(AnsiblePlayError::Plan(PlanError::Aborted {
            reason: String::from("interrupted"),
        }));
    }
    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
