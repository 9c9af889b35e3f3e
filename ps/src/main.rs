//! promptstore - prompt template registry and resolver
//!
//! CLI entry point for loading, validating, filling, and exchanging
//! templates.

use std::path::{Path, PathBuf};

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use serde_json::Map;
use tracing::{debug, info};

use promptstore::cli::{self, Cli, Command, OutputFormat};
use promptstore::config::Config;
use promptstore::editor::Editor;
use promptstore::exchange::{self, ConflictPolicy};
use promptstore::resolver::{FillContext, Resolver};
use promptstore::store::{self, Registry, TemplateStore};
use promptstore::suggest::{SuggestionEngine, UsageContext};
use promptstore::validator;

fn setup_logging(cli_log_level: Option<&str>) -> Result<()> {
    let level = match cli_log_level.map(|s| s.to_uppercase()) {
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to WARN", s);
                tracing::Level::WARN
            }
        },
        None => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    debug!(command = ?cli.command, "dispatching command");

    match cli.command {
        Command::Load { dir, flat } => {
            let dir = dir.unwrap_or_else(|| config.store.template_dir.clone());
            let recursive = if flat { false } else { config.store.recursive };
            cmd_load(&dir, recursive)
        }
        Command::List { category, format } => {
            let store = open_store(&config)?;
            cmd_list(&store.snapshot(), category.as_deref(), format)
        }
        Command::Show { id, format } => {
            let store = open_store(&config)?;
            cmd_show(&store.snapshot(), &id, format)
        }
        Command::Validate { paths } => cmd_validate(&paths),
        Command::Fill {
            id,
            params,
            language,
            audience,
            structured,
        } => {
            let store = open_store(&config)?;
            let mut context = config.fill.context();
            if let Some(language) = language {
                context.language = language;
            }
            if let Some(audience) = audience {
                context.audience = audience;
            }
            cmd_fill(&store, &id, &params, &context, structured)
        }
        Command::Categories => {
            let store = open_store(&config)?;
            cmd_categories(&store.snapshot())
        }
        Command::Suggest {
            keywords,
            category,
            limit,
        } => {
            let store = open_store(&config)?;
            cmd_suggest(&store.snapshot(), &keywords, category, limit)
        }
        Command::Export {
            output,
            ids,
            with_deps,
        } => {
            let store = open_store(&config)?;
            cmd_export(&store, &output, &ids, with_deps)
        }
        Command::Import { input, on_conflict } => {
            let store = open_store(&config)?;
            cmd_import(&store, &config, &input, on_conflict.into())
        }
        Command::Remove { id, force } => {
            let store = open_store(&config)?;
            cmd_remove(&store, &config, &id, force)
        }
    }
}

/// Load the configured template directory into a fresh store
fn open_store(config: &Config) -> Result<TemplateStore> {
    let store = TemplateStore::new();
    if config.store.template_dir.exists() {
        let report = store
            .load(&config.store.template_dir, config.store.recursive)
            .context("Failed to load template directory")?;
        for failed in &report.failed {
            eprintln!("{} {}: {}", "skipped".yellow(), failed.path.display(), failed.reason);
        }
    }
    Ok(store)
}

fn cmd_load(dir: &Path, recursive: bool) -> Result<()> {
    let store = TemplateStore::new();
    let report = store.load(dir, recursive).context("Failed to load templates")?;

    println!("{} {} template(s) from {}", "Loaded".green(), report.loaded, dir.display());
    for warning in &report.warnings {
        println!("  {} {}", "warning:".yellow(), warning);
    }
    for failed in &report.failed {
        println!("  {} {}: {}", "failed:".red(), failed.path.display(), failed.reason);
    }
    if !report.failed.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_list(registry: &Registry, category: Option<&str>, format: OutputFormat) -> Result<()> {
    let templates = match category {
        Some(category) => registry.list_by_category(category, true),
        None => registry.list(),
    };

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&templates)?);
        }
        OutputFormat::Text => {
            for template in templates {
                let category = template.category.as_deref().unwrap_or("-");
                println!(
                    "{:<30} {:<10} {:<14} {}",
                    template.id.bold(),
                    template.template_type,
                    category,
                    template.name
                );
            }
        }
    }
    Ok(())
}

fn cmd_show(registry: &Registry, id: &str, format: OutputFormat) -> Result<()> {
    let template = registry
        .get(id)
        .ok_or_else(|| eyre::eyre!("Template '{}' not found", id))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(template)?),
        OutputFormat::Text => {
            println!("{}: {}", "id".bold(), template.id);
            println!("{}: {}", "name".bold(), template.name);
            println!("{}: {}", "type".bold(), template.template_type);
            println!("{}: {}", "version".bold(), template.version);
            if !template.description.is_empty() {
                println!("{}: {}", "description".bold(), template.description);
            }
            if let Some(category) = &template.category {
                println!("{}: {}", "category".bold(), category);
            }
            if !template.dependencies.is_empty() {
                println!("{}: {}", "dependencies".bold(), template.dependencies.join(", "));
            }
            for param in &template.parameters {
                let req = if param.required { "required" } else { "optional" };
                println!("  {} ({}, {})", param.name, param.kind, req);
            }
            println!("{}", "content:".bold());
            println!("{}", template.content);
        }
    }
    Ok(())
}

fn cmd_validate(paths: &[PathBuf]) -> Result<()> {
    let mut failed = false;

    for path in paths {
        let files = if path.is_dir() {
            store::definition_paths(path, true).context("Failed to scan directory")?
        } else {
            vec![path.clone()]
        };

        for file in files {
            match store::parse_definition(&file) {
                Ok(template) => {
                    let result = validator::validate(&template);
                    if result.is_valid() {
                        println!("{} {}", "ok".green(), file.display());
                    } else {
                        failed = true;
                        println!("{} {}", "invalid".red(), file.display());
                    }
                    for issue in &result.issues {
                        println!("  {}", issue);
                    }
                }
                Err(err) => {
                    failed = true;
                    println!("{} {}: {}", "error".red(), file.display(), err);
                }
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_fill(
    store: &TemplateStore,
    id: &str,
    raw_params: &[String],
    context: &FillContext,
    structured: bool,
) -> Result<()> {
    let mut params = Map::new();
    for raw in raw_params {
        let (name, value) = cli::parse_param(raw).map_err(|e| eyre::eyre!(e))?;
        params.insert(name, value);
    }

    let resolver = Resolver::new(store.snapshot());
    if structured {
        let value = resolver.fill_structured(id, &params, context)?;
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{}", resolver.fill_with_context(id, &params, context)?);
    }
    Ok(())
}

fn cmd_categories(registry: &Registry) -> Result<()> {
    fn print_tree(registry: &Registry, parent: Option<&str>, depth: usize) {
        for category in registry.list_categories() {
            if category.parent.as_deref() != parent {
                continue;
            }
            let count = registry.list_by_category(&category.id, false).len();
            println!("{}{} ({} template(s))", "  ".repeat(depth), category.id.bold(), count);
            print_tree(registry, Some(&category.id), depth + 1);
        }
    }

    print_tree(registry, None, 0);
    Ok(())
}

fn cmd_suggest(registry: &Registry, keywords: &[String], category: Option<String>, limit: usize) -> Result<()> {
    let engine = SuggestionEngine::new();
    let mut context = UsageContext {
        keywords: keywords.to_vec(),
        category: None,
    };
    if let Some(category) = category {
        context = context.in_category(category);
    }

    let suggestions = engine.suggest(registry, &context, limit);
    if suggestions.is_empty() {
        println!("No matching templates.");
        return Ok(());
    }
    for suggestion in suggestions {
        println!(
            "{:<30} {:.2}  {}",
            suggestion.template_id.bold(),
            suggestion.score,
            suggestion.reasons.join("; ")
        );
    }
    Ok(())
}

fn cmd_export(store: &TemplateStore, output: &Path, ids: &[String], with_deps: bool) -> Result<()> {
    let bundle = if ids.is_empty() {
        store.export_all()
    } else if with_deps {
        store.export_with_dependencies(ids)?
    } else {
        store.export(ids)?
    };

    exchange::write_bundle(&bundle, output)?;
    println!(
        "{} {} template(s) and {} category(ies) to {}",
        "Exported".green(),
        bundle.templates.len(),
        bundle.categories.len(),
        output.display()
    );
    Ok(())
}

fn cmd_import(store: &TemplateStore, config: &Config, input: &Path, policy: ConflictPolicy) -> Result<()> {
    let bundle = exchange::read_bundle(input)?;
    let report = store.import(bundle, policy)?;

    // Persist imported templates as definition files in the template dir
    std::fs::create_dir_all(&config.store.template_dir).context("Failed to create template directory")?;
    let snapshot = store.snapshot();
    for id in &report.imported {
        if let Some(template) = snapshot.get(id) {
            let path = config.store.template_dir.join(format!("{}.yml", id));
            std::fs::write(&path, serde_yaml::to_string(template)?)
                .context(format!("Failed to write {}", path.display()))?;
            info!(template_id = %id, path = %path.display(), "persisted imported template");
        }
    }

    println!("{} {} template(s)", "Imported".green(), report.imported.len());
    for (old, new) in &report.renamed {
        println!("  renamed {} -> {}", old, new);
    }
    for warning in &report.warnings {
        println!("  {} {}", "warning:".yellow(), warning);
    }
    Ok(())
}

fn cmd_remove(store: &TemplateStore, config: &Config, id: &str, force: bool) -> Result<()> {
    let editor = Editor::new(store);
    editor.delete(id, force)?;

    // Delete whichever definition file declared this id
    if config.store.template_dir.exists() {
        for path in store::definition_paths(&config.store.template_dir, config.store.recursive)? {
            if let Ok(template) = store::parse_definition(&path) {
                if template.id == id {
                    std::fs::remove_file(&path).context(format!("Failed to remove {}", path.display()))?;
                    info!(template_id = %id, path = %path.display(), "removed definition file");
                }
            }
        }
    }

    println!("{} {}", "Removed".green(), id);
    Ok(())
}
