//! Output formatting for the pagekit CLI.
//!
//! Two modes:
//! - **JSON**: compact machine-readable output (default)
//! - **Pretty**: labeled fields for humans (`--pretty`)

use crate::db::PageKitError;
use crate::models::{Label, PageLog, Project, Workspace};
use crate::views::{PageDetailView, PageView, SubPageView};
use serde::Serialize;

/// Output mode for CLI results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Json,
    Pretty,
}

/// Serialize a value to compact JSON and print it to stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<(), PageKitError> {
    let json = serde_json::to_string(value)?;
    println!("{}", json);
    Ok(())
}

/// Print `value` as JSON or run `pretty_fn`, depending on `mode`.
pub fn print<T: Serialize>(mode: OutputMode, value: &T, pretty_fn: impl FnOnce()) -> Result<(), PageKitError> {
    match mode {
        OutputMode::Json => print_json(value),
        OutputMode::Pretty => {
            pretty_fn();
            Ok(())
        }
    }
}

pub fn print_pretty_workspace(workspace: &Workspace) {
    println!("Workspace: {}", workspace.slug);
    println!("Name:      {}", workspace.name);
    println!("ID:        {}", workspace.id);
}

pub fn print_pretty_workspaces(workspaces: &[Workspace]) {
    if workspaces.is_empty() {
        println!("(no workspaces)");
        return;
    }
    for ws in workspaces {
        println!("{} | {} | {}", ws.id, ws.slug, ws.name);
    }
}

pub fn print_pretty_project(project: &Project) {
    println!("Project:   {} ({})", project.identifier, project.name);
    println!("ID:        {}", project.id);
    println!("Workspace: {}", project.workspace_id);
}

/// One label per line: `<id> | <name> | <color>`.
pub fn print_pretty_labels(labels: &[Label]) {
    if labels.is_empty() {
        println!("(no labels)");
        return;
    }
    for label in labels {
        println!("{} | {} | {}", label.id, label.name, label.color);
    }
}

/// Print a page in human-readable format.
///
/// ```text
/// Name:     Roadmap
/// ID:       <uuid>
/// Project:  <uuid>
/// Access:   public
/// Labels:   <label-id>, <label-id>
/// Owner:    alice
/// Parent:   (none)
/// Flags:    locked, favorite
/// Archived: 2026-03-01
/// Updated:  2026-03-01T10:00:00+00:00 by bob
/// ```
pub fn print_pretty_page(page: &PageView) {
    println!("Name:     {}", page.name);
    println!("ID:       {}", page.id);
    println!("Project:  {}", page.project);
    println!("Access:   {}", page.access);

    if page.labels.is_empty() {
        println!("Labels:   (none)");
    } else {
        println!("Labels:   {}", page.labels.join(", "));
    }

    println!("Owner:    {}", page.owned_by);
    println!("Parent:   {}", page.parent.as_deref().unwrap_or("(none)"));

    let mut flags = Vec::new();
    if page.is_locked {
        flags.push("locked");
    }
    if page.is_favorite {
        flags.push("favorite");
    }
    if !flags.is_empty() {
        println!("Flags:    {}", flags.join(", "));
    }
    if let Some(ref archived_at) = page.archived_at {
        println!("Archived: {}", archived_at);
    }
    println!("Updated:  {} by {}", page.updated_at, page.updated_by);
}

pub fn print_pretty_page_detail(detail: &PageDetailView) {
    print_pretty_page(&detail.page);
    println!();
    println!("{}", detail.description_html);
}

/// One page per line: `<id> | <name> | <owner>`.
pub fn print_pretty_pages(pages: &[PageView]) {
    if pages.is_empty() {
        println!("(no pages)");
        return;
    }
    for page in pages {
        let archived = if page.archived_at.is_some() { " (archived)" } else { "" };
        println!("{} | {} | {}{}", page.id, page.name, page.owned_by, archived);
    }
}

/// Format: `<page> --[<entity_name>]--> <entity_identifier>`
pub fn print_pretty_log(log: &PageLog) {
    println!(
        "{} --[{}]--> {} ({})",
        log.page_id,
        log.entity_name,
        log.entity_identifier.as_deref().unwrap_or("-"),
        log.id
    );
}

pub fn print_pretty_logs(logs: &[PageLog]) {
    if logs.is_empty() {
        println!("(no log entries)");
        return;
    }
    for log in logs {
        print_pretty_log(log);
    }
}

/// A log line, followed by the linked page's name when it resolved.
pub fn print_pretty_sub_pages(views: &[SubPageView]) {
    if views.is_empty() {
        println!("(no linked pages)");
        return;
    }
    for view in views {
        print_pretty_log(&view.log);
        match view.entity_details {
            Some(ref page) => println!("    -> {} ({})", page.name, page.id),
            None => println!("    -> (unresolved)"),
        }
    }
}
