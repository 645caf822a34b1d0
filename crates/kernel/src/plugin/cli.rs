//! CLI command implementations for plugin management.
//!
//! Planning commands print the plan, ask for confirmation and then wait
//! for the task to finish, so a one-shot process behaves like a session
//! with a single request.

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result, bail};

use super::catalog::{Catalog, CatalogStore};
use super::error::PluginError;
use super::meta::PluginRecord;
use super::runtime::Runtime;
use super::status::check_update;
use crate::session::Session;
use crate::task::{Confirmation, ConsoleReply, ReplySink, TaskState};

/// One row of the plugin table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginRow {
    pub id: String,
    pub latest: String,
    /// Loaded version, `?` when loaded without one, `-` when not loaded.
    pub installed: String,
    /// First line of the description.
    pub description: String,
}

impl PluginRow {
    fn new(record: &PluginRecord, runtime: &dyn Runtime) -> Self {
        let installed = match runtime.loaded_version(record.id()) {
            Some(version) => version.to_string(),
            None if runtime.is_loaded(record.id()) => "?".to_string(),
            None => "-".to_string(),
        };
        let description = record
            .description("en_us")
            .and_then(|text| text.lines().next())
            .unwrap_or_default()
            .to_string();

        Self {
            id: record.id().to_string(),
            latest: record.version().to_string(),
            installed,
            description,
        }
    }
}

fn ensure_loaded(catalog: &dyn Catalog) -> Result<()> {
    if !catalog.is_loaded() {
        bail!("plugin catalog is not loaded yet, run `mpm refresh` first");
    }
    Ok(())
}

fn rows_where(
    catalog: &dyn Catalog,
    runtime: &dyn Runtime,
    keep: impl Fn(&PluginRecord) -> bool,
) -> Vec<PluginRow> {
    catalog
        .all_ids()
        .into_iter()
        .filter_map(|id| catalog.get(&id))
        .filter(|record| keep(&**record))
        .map(|record| PluginRow::new(&record, runtime))
        .collect()
}

/// Catalog plugins carrying one of `labels` (all plugins when empty),
/// sorted by id.
pub fn list_rows(catalog: &dyn Catalog, runtime: &dyn Runtime, labels: &[String]) -> Result<Vec<PluginRow>> {
    ensure_loaded(catalog)?;
    Ok(rows_where(catalog, runtime, |record| record.has_any_label(labels)))
}

/// Catalog plugins whose id, name or description contains `query`.
pub fn search_rows(catalog: &dyn Catalog, runtime: &dyn Runtime, query: &str) -> Result<Vec<PluginRow>> {
    ensure_loaded(catalog)?;
    Ok(rows_where(catalog, runtime, |record| record.matches(query)))
}

fn print_rows(rows: &[PluginRow]) {
    if rows.is_empty() {
        println!("No plugins found.");
        return;
    }

    println!(
        "{:<32} {:<12} {:<12} {}",
        "PLUGIN", "LATEST", "INSTALLED", "DESCRIPTION"
    );
    println!("{}", "-".repeat(80));
    for row in rows {
        println!(
            "{:<32} {:<12} {:<12} {}",
            row.id, row.latest, row.installed, row.description
        );
    }
}

/// List catalog plugins, optionally only those carrying one of `labels`.
pub fn cmd_list(catalog: &dyn Catalog, runtime: &dyn Runtime, labels: &[String]) -> Result<()> {
    print_rows(&list_rows(catalog, runtime, labels)?);
    Ok(())
}

/// Search the catalog by id, name and description.
pub fn cmd_search(catalog: &dyn Catalog, runtime: &dyn Runtime, query: &str) -> Result<()> {
    let rows = search_rows(catalog, runtime, query)?;
    println!("{} plugin(s) match '{query}'", rows.len());
    print_rows(&rows);
    Ok(())
}

/// Detail lines for one catalog plugin: metadata, install status,
/// dependencies, package requirements and the latest release.
pub fn info_lines(catalog: &dyn Catalog, runtime: &dyn Runtime, id: &str) -> Result<Vec<String>> {
    ensure_loaded(catalog)?;
    let record = catalog.get(id).ok_or_else(|| PluginError::unknown_plugin(id))?;
    let meta = &record.meta;

    let name = if meta.name.is_empty() { &meta.id } else { &meta.name };
    let mut lines = vec![format!("{name} ({}@{})", meta.id, meta.version)];

    let status = check_update(&record, runtime);
    lines.push(match (&status.local_version, runtime.is_loaded(id)) {
        (Some(local), _) if !status.is_latest => {
            format!("Status: installed ({local}), {} available", status.latest_version)
        }
        (Some(local), _) => format!("Status: installed ({local})"),
        (None, true) => "Status: installed (unknown version)".to_string(),
        (None, false) => "Status: not installed".to_string(),
    });

    if !meta.authors.is_empty() {
        lines.push(format!("Authors: {}", meta.authors.join(", ")));
    }
    if !meta.repository.is_empty() {
        lines.push(format!("Repository: {}", meta.repository));
    }
    if !meta.labels.is_empty() {
        lines.push(format!("Labels: {}", meta.labels.join(", ")));
    }
    if let Some(description) = record.description("en_us") {
        lines.push(format!("Description: {description}"));
    }

    if !meta.dependencies.is_empty() {
        lines.push("Dependencies:".to_string());
        lines.extend(
            meta.dependencies
                .iter()
                .map(|(dependency, requirement)| format!("  {dependency} {requirement}")),
        );
    }
    if !meta.requirements.is_empty() {
        lines.push("Requirements:".to_string());
        lines.extend(meta.requirements.iter().map(|raw| format!("  {raw}")));
    }

    lines.push(match record.release.latest_release() {
        Some(release) => format!(
            "Latest release: {} ({}, {} bytes)",
            release.tag_name, release.asset.name, release.asset.size
        ),
        None => "Latest release: none".to_string(),
    });

    Ok(lines)
}

/// Show everything known about one catalog plugin.
pub fn cmd_info(catalog: &dyn Catalog, runtime: &dyn Runtime, id: &str) -> Result<()> {
    for line in info_lines(catalog, runtime, id)? {
        println!("{line}");
    }
    Ok(())
}

/// Download the catalog document and report how many plugins it holds.
pub async fn cmd_refresh(store: &CatalogStore, source: &str, timeout: std::time::Duration) -> Result<()> {
    let count = store
        .refresh(source, timeout)
        .await
        .context("failed to refresh plugin catalog")?;
    println!("Catalog refreshed: {count} plugins available.");
    Ok(())
}

/// The request a planning command submits.
#[derive(Debug, Clone)]
pub enum TaskCommand {
    Install { ids: Vec<String>, upgrade: bool },
    Uninstall { ids: Vec<String> },
}

/// Plan a task, confirm it (interactively unless `yes`) and wait for it.
///
/// Returns the final task state, or `None` when nothing was executed.
pub async fn cmd_run_task(session: &Session, command: TaskCommand, yes: bool) -> Result<Option<TaskState>> {
    let reply: Arc<dyn ReplySink> = Arc::new(ConsoleReply);

    let planned = match &command {
        TaskCommand::Install { ids, upgrade } => session.plan_install(ids, *upgrade, Arc::clone(&reply)),
        TaskCommand::Uninstall { ids } => session.plan_uninstall(ids, Arc::clone(&reply)),
    };
    // The rejection reason has already been printed.
    if planned.is_err() {
        return Ok(None);
    }

    if !yes && !prompt_confirmation()? {
        session.tasks().clear();
        println!("Aborted.");
        return Ok(None);
    }

    match session.confirm(reply.as_ref()) {
        Confirmation::NothingToConfirm | Confirmation::Busy => Ok(None),
        Confirmation::Started(handle) => {
            let state = handle.await.context("task execution panicked")?;
            Ok(Some(state))
        }
    }
}

fn prompt_confirmation() -> Result<bool> {
    print!("Proceed? [y/N] ");
    std::io::stdout().flush().context("failed to flush stdout")?;

    let mut answer = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("failed to read confirmation")?;

    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
