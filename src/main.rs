use anyhow::{Context, Result};
use bundle_patcher::config::{
    load_dir, load_from_path, HostConfig, PatchError, PatchOutcome, PatchResult,
    PluginPatchStatus,
};
use bundle_patcher::module::ModuleMap;
use bundle_patcher::plugin::{
    DataStore, HostServices, JsonFileStore, ManifestPlugin, MemoryStore, PluginManager,
};
use bundle_patcher::plugins::timezones::{SetTimezoneModal, TimezoneStore};
use bundle_patcher::plugins::{self, timezones};
use clap::{Parser, Subcommand};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bundle-patcher")]
#[command(about = "Apply plugin patches to bundled web-app modules", long_about = None)]
#[command(version)]
struct Cli {
    /// Host config file (defaults to $BUNDLE_PATCHER_CONFIG, then ./bundle-patcher.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply plugin patches to a directory of module sources
    Apply {
        /// Directory holding one `<module id>.js` file per module
        #[arg(short, long)]
        modules: PathBuf,

        /// Plugin manifest file or directory (defaults to ./patches if present)
        #[arg(short, long)]
        patches: Option<PathBuf>,

        /// Dry run - show what would be changed without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },

    /// Show per-plugin patch status without writing anything
    Status {
        #[arg(short, long)]
        modules: PathBuf,

        #[arg(short, long)]
        patches: Option<PathBuf>,
    },

    /// Check that every patch applies cleanly; exits 1 otherwise
    Verify {
        #[arg(short, long)]
        modules: PathBuf,

        #[arg(short, long)]
        patches: Option<PathBuf>,
    },

    /// List registered plugins
    List {
        #[arg(short, long)]
        patches: Option<PathBuf>,

        /// Show one plugin in detail
        plugin: Option<String>,
    },

    /// Manage stored user timezones
    Tz {
        #[command(subcommand)]
        action: TzAction,
    },
}

#[derive(Subcommand)]
enum TzAction {
    /// Set a user's timezone
    Set { user: String, timezone: String },
    /// Clear a user's timezone
    Clear { user: String },
    /// Show stored timezones
    Show { user: Option<String> },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = HostConfig::discover(cli.config.as_deref())?;

    match cli.command {
        Commands::Apply {
            modules,
            patches,
            dry_run,
            diff,
        } => cmd_apply(&config, &modules, patches, dry_run, diff),

        Commands::Status { modules, patches } => cmd_status(&config, &modules, patches),

        Commands::Verify { modules, patches } => cmd_verify(&config, &modules, patches),

        Commands::List { patches, plugin } => cmd_list(&config, patches, plugin),

        Commands::Tz { action } => cmd_tz(&config, action),
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "bundle_patcher=info",
        1 => "bundle_patcher=debug",
        _ => "bundle_patcher=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn open_datastore(config: &HostConfig) -> Arc<dyn DataStore> {
    match &config.datastore {
        Some(path) => Arc::new(JsonFileStore::new(path)),
        None => Arc::new(MemoryStore::new()),
    }
}

/// Helper: manifests from `--patches`, or `./patches` when it exists.
fn manifest_plugins(patches: Option<PathBuf>) -> Result<Vec<ManifestPlugin>> {
    let manifests = match patches {
        Some(path) if path.is_dir() => load_dir(&path)?,
        Some(path) => vec![load_from_path(&path)?],
        None => {
            let local = PathBuf::from("patches");
            if local.is_dir() {
                load_dir(&local)?
            } else {
                Vec::new()
            }
        }
    };
    Ok(manifests.into_iter().map(ManifestPlugin::from).collect())
}

/// Helper: built-in plugins followed by manifest plugins, with the host
/// config applied.
fn build_manager(config: &HostConfig, patches: Option<PathBuf>) -> Result<PluginManager> {
    let datastore = open_datastore(config);
    let mut manager = PluginManager::new(HostServices::new(Arc::clone(&datastore)));

    for plugin in plugins::builtin(config, datastore) {
        manager.register(plugin)?;
    }
    for plugin in manifest_plugins(patches)? {
        manager.register(Arc::new(plugin))?;
    }

    // Unknown names in the config are most likely typos
    for name in config.plugins.keys() {
        if manager.get(name).is_none() {
            let hint = suggest(name, manager.names())
                .map(|s| format!(" (did you mean '{s}'?)"))
                .unwrap_or_default();
            eprintln!(
                "{}",
                format!("Warning: config mentions unknown plugin '{name}'{hint}").yellow()
            );
        }
    }

    manager.apply_config(config)?;
    Ok(manager)
}

fn load_modules(dir: &Path) -> Result<ModuleMap> {
    let modules = ModuleMap::load_dir(dir)
        .with_context(|| format!("failed to load modules from {}", dir.display()))?;
    if modules.is_empty() {
        anyhow::bail!("No .js modules found in {}", dir.display());
    }
    Ok(modules)
}

fn suggest<'a>(input: &str, candidates: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    candidates
        .into_iter()
        .map(|candidate| (candidate, strsim::jaro_winkler(input, candidate)))
        .filter(|(_, score)| *score > 0.8)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(candidate, _)| candidate)
}

/// Helper: Show unified diff between original and modified content
fn display_diff(module: &str, original: &str, modified: &str) {
    println!("\n{}", format!("--- {module} (original)").dimmed());
    println!("{}", format!("+++ {module} (patched)").dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
    println!();
}

/// Print conflict diagnostics for one failure.
fn explain(error: &PatchError) {
    match error {
        PatchError::PatchNotFound { .. } => {
            eprintln!("  {}", "CONFLICT: find token matched no module".red());
            eprintln!("  Possible causes:");
            eprintln!("    - The host build renamed or removed the code");
            eprintln!("    - Another plugin's patch rewrote the token first");
        }
        PatchError::AmbiguousPatch { modules, .. } => {
            eprintln!(
                "  {}",
                format!("CONFLICT: find token matched {} modules (expected 1)", modules.len())
                    .red()
            );
            eprintln!("  Action: use a more specific find token, or set all = true");
        }
        PatchError::ReplacementNotFound { .. } => {
            eprintln!("  The module was left unpatched for this rule");
        }
        PatchError::InvalidPattern { .. } => {
            eprintln!("  Action: fix the regex in the plugin's patch definition");
        }
        PatchError::Edit { source, .. } => {
            eprintln!("  Edit error: {}", source);
        }
        PatchError::Version { .. } => {}
    }
}

fn outcome_label(outcome: &PatchOutcome) -> String {
    format!("{} [{}]", outcome.plugin, outcome.find)
}

fn outcome_text(outcome: &PatchOutcome) -> String {
    match &outcome.result {
        Ok(result) => result.to_string(),
        Err(e) => e.to_string(),
    }
}

fn cmd_apply(
    config: &HostConfig,
    modules_dir: &Path,
    patches: Option<PathBuf>,
    dry_run: bool,
    show_diff: bool,
) -> Result<()> {
    let mut manager = build_manager(config, patches)?;
    let modules = load_modules(modules_dir)?;

    println!("Modules: {} ({} loaded)", modules_dir.display(), modules.len());
    if let Some(version) = &config.host_version {
        println!("Host version: {}", version);
    }
    if dry_run {
        println!("{}", "[DRY RUN - showing what would be applied]".cyan());
    }
    println!();

    let report = manager.patch_modules(&modules, &config.apply_options());

    let mut total_applied = 0;
    let mut total_rolled_back = 0;
    let mut total_skipped = 0;
    let mut total_failed = 0;

    for outcome in &report.outcomes {
        let label = outcome_label(outcome);
        match &outcome.result {
            Ok(PatchResult::Applied { modules }) => {
                let verb = if dry_run { "Would apply" } else { "Applied" };
                let ids: Vec<&str> = modules.iter().map(|m| m.as_str()).collect();
                println!("{} {}: {} to {}", "✓".green(), label, verb, ids.join(", "));
                total_applied += 1;
            }
            Ok(PatchResult::Partial { failures, .. }) => {
                println!("{} {}: {}", "⊙".yellow(), label, outcome_text(outcome));
                for failure in failures {
                    eprintln!("  {}", failure.to_string().yellow());
                    explain(failure);
                }
                total_failed += 1;
            }
            Ok(result @ PatchResult::RolledBack { .. }) => {
                println!("{} {}: {}", "↺".yellow(), label, result);
                total_rolled_back += 1;
            }
            Ok(result @ (PatchResult::Skipped | PatchResult::SkippedVersion { .. })) => {
                println!("{} {}: {}", "⊘".cyan(), label, result);
                total_skipped += 1;
            }
            Err(e) => {
                eprintln!("{} {}: Error - {}", "✗".red(), label, e);
                explain(e);
                total_failed += 1;
            }
        }
    }

    let changed: Vec<_> = report
        .modules
        .iter()
        .filter(|(id, text)| modules.get(id) != Some(*text))
        .map(|(id, _)| id.clone())
        .collect();

    if show_diff {
        for id in &changed {
            if let (Some(before), Some(after)) = (modules.get(id), report.modules.get(id)) {
                display_diff(id.as_str(), before, after);
            }
        }
    }

    if !dry_run {
        let written = report.modules.write_changed(&modules)?;
        println!();
        println!("Wrote {} module(s)", written.len());
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} applied", format!("{}", total_applied).green());
    println!("  {} rolled back", format!("{}", total_rolled_back).yellow());
    println!("  {} skipped", format!("{}", total_skipped).cyan());
    println!("  {} failed", format!("{}", total_failed).red());
    println!("  {} module(s) changed", changed.len());

    if total_failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_status(config: &HostConfig, modules_dir: &Path, patches: Option<PathBuf>) -> Result<()> {
    let mut manager = build_manager(config, patches)?;
    let modules = load_modules(modules_dir)?;
    let report = manager.patch_modules(&modules, &config.apply_options());

    println!("{}", "Plugin Status Report".bold());
    println!("Modules: {}", modules_dir.display());
    println!();

    let mut applied = Vec::new();
    let mut degraded = Vec::new();
    let mut skipped = Vec::new();

    for (plugin, status) in &report.plugins {
        match status {
            PluginPatchStatus::Applied => applied.push(plugin.as_str()),
            PluginPatchStatus::Degraded { reason } => degraded.push((plugin.as_str(), reason)),
            PluginPatchStatus::SkippedVersion { reason } => skipped.push((plugin.as_str(), reason)),
        }
    }

    let disabled: Vec<&str> = manager
        .names()
        .into_iter()
        .filter(|name| !manager.is_enabled(name))
        .collect();

    if !applied.is_empty() {
        println!(
            "{} {} ({} plugins)",
            "✓".green(),
            "APPLIES".green().bold(),
            applied.len()
        );
        for name in &applied {
            println!("  - {}", name);
        }
        println!();
    }

    if !degraded.is_empty() {
        println!(
            "{} {} ({} plugins)",
            "✗".red(),
            "DEGRADED".red().bold(),
            degraded.len()
        );
        for (name, reason) in &degraded {
            println!("  - {} ({})", name, reason.dimmed());
        }
        println!();
    }

    if !skipped.is_empty() {
        println!(
            "{} {} ({} plugins)",
            "⊘".cyan(),
            "SKIPPED".cyan().bold(),
            skipped.len()
        );
        for (name, reason) in &skipped {
            println!("  - {} ({})", name, reason.dimmed());
        }
        println!();
    }

    if !disabled.is_empty() {
        println!(
            "{} {} ({} plugins)",
            "-".dimmed(),
            "DISABLED".dimmed().bold(),
            disabled.len()
        );
        for name in &disabled {
            println!("  - {}", name);
        }
        println!();
    }

    Ok(())
}

fn cmd_verify(config: &HostConfig, modules_dir: &Path, patches: Option<PathBuf>) -> Result<()> {
    let mut manager = build_manager(config, patches)?;
    let modules = load_modules(modules_dir)?;
    let report = manager.patch_modules(&modules, &config.apply_options());

    println!("{}", "Verifying patches...".bold());
    println!("Modules: {}", modules_dir.display());
    println!();

    let mut verified = 0;
    let mut mismatch = 0;
    let mut skipped = 0;

    for outcome in &report.outcomes {
        let label = outcome_label(outcome);
        match &outcome.result {
            Ok(PatchResult::Applied { .. }) => {
                println!("{} {}: Verified", "✓".green(), label);
                verified += 1;
            }
            Ok(PatchResult::Skipped | PatchResult::SkippedVersion { .. }) => {
                println!("{} {}: {}", "⊘".cyan(), label, outcome_text(outcome));
                skipped += 1;
            }
            Ok(PatchResult::Partial { failures, .. }) => {
                eprintln!("{} {}: MISMATCH", "✗".red(), label);
                for failure in failures {
                    eprintln!("  Error: {}", failure);
                }
                mismatch += 1;
            }
            Ok(PatchResult::RolledBack { .. }) => {
                eprintln!("{} {}: MISMATCH", "✗".red(), label);
                eprintln!("  Error: rolled back with the rest of {}", outcome.plugin);
                mismatch += 1;
            }
            Err(e) => {
                eprintln!("{} {}: MISMATCH", "✗".red(), label);
                eprintln!("  Error: {}", e);
                mismatch += 1;
            }
        }
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} verified", format!("{}", verified).green());
    println!("  {} mismatch", format!("{}", mismatch).red());
    println!("  {} skipped", format!("{}", skipped).cyan());

    if mismatch > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_list(config: &HostConfig, patches: Option<PathBuf>, plugin: Option<String>) -> Result<()> {
    let manager = build_manager(config, patches)?;

    let Some(name) = plugin else {
        println!("{}", "Plugins:".bold());
        for plugin in manager.plugins() {
            let meta = plugin.meta();
            let state = if manager.is_enabled(&meta.name) {
                "enabled".green()
            } else {
                "disabled".dimmed()
            };
            println!(
                "  {} [{}] {} patch(es) - {}",
                meta.name.bold(),
                state,
                plugin.patches().len(),
                meta.description
            );
        }
        return Ok(());
    };

    let Some(plugin) = manager.get(&name) else {
        match suggest(&name, manager.names()) {
            Some(candidate) => {
                anyhow::bail!("Unknown plugin '{name}'. Did you mean '{candidate}'?")
            }
            None => anyhow::bail!("Unknown plugin '{name}'"),
        }
    };

    let meta = plugin.meta();
    println!("{}", meta.name.bold());
    println!("  {}", meta.description);
    if !meta.authors.is_empty() {
        println!("  Authors: {}", meta.authors.join(", "));
    }
    if let Some(range) = plugin.host_version() {
        println!("  Host version: {}", range);
    }
    println!(
        "  State: {}",
        if manager.is_enabled(&name) { "enabled" } else { "disabled" }
    );

    println!("  {}", "Patches:".bold());
    for patch in plugin.patches() {
        println!("    find {:?}", patch.find);
        for rule in &patch.replacement {
            println!("      {} -> {:?}", rule.matcher, rule.replace);
        }
    }

    if let Some(settings) = plugin.settings() {
        println!("  {}", "Settings:".bold());
        for option in settings.definition().options() {
            let value = settings
                .get(&option.key)
                .unwrap_or_else(|| option.default.clone());
            println!(
                "    {:?} ({}) = {} - {}",
                option.key, option.kind, value, option.description
            );
        }
    }

    Ok(())
}

fn cmd_tz(config: &HostConfig, action: TzAction) -> Result<()> {
    if config.datastore.is_none() {
        anyhow::bail!(
            "{}\n  Set `datastore = \"datastore.json\"` in {}",
            "No datastore configured; timezones would not be saved.".red(),
            bundle_patcher::config::host::CONFIG_FILE_NAME
        );
    }
    if !config.is_enabled(timezones::NAME) {
        eprintln!(
            "{}",
            format!("Warning: the {} plugin is disabled", timezones::NAME).yellow()
        );
    }

    let store = TimezoneStore::new(open_datastore(config));
    store.load()?;

    match action {
        TzAction::Set { user, timezone } => {
            let modal = SetTimezoneModal::new(&user, Arc::clone(&store));
            if let Err(e) = modal.save(Some(&timezone)) {
                let hint = suggest(&timezone, SetTimezoneModal::choices())
                    .map(|s| format!(" Did you mean '{s}'?"))
                    .unwrap_or_default();
                anyhow::bail!("{e}.{hint}");
            }
            println!("{} {} → {}", "✓".green(), user, timezone);
        }
        TzAction::Clear { user } => {
            SetTimezoneModal::new(&user, Arc::clone(&store)).save(None)?;
            println!("{} {} cleared", "✓".green(), user);
        }
        TzAction::Show { user: Some(user) } => match store.get(&user) {
            Some(timezone) => println!("{}: {}", user, timezone),
            None => println!("{}: {}", user, "not set".dimmed()),
        },
        TzAction::Show { user: None } => {
            let entries = store.entries();
            if entries.is_empty() {
                println!("{}", "No timezones stored".dimmed());
            }
            for (user, timezone) in entries {
                match timezone {
                    Some(timezone) => println!("{}: {}", user, timezone),
                    None => println!("{}: {}", user, "cleared".dimmed()),
                }
            }
        }
    }

    Ok(())
}
