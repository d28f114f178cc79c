//! pagekit CLI: create, update and inspect project wiki pages.
//!
//! This binary stands in for the request layer: it reads JSON bodies,
//! validates them, supplies the create context (project, owner, rendered
//! HTML) and prints results. Output is compact JSON by default, or
//! human-readable with `--pretty`.

use clap::{Parser, Subcommand};
use pagekit::db::{self, PageKitError};
use pagekit::models::{EntityKind, NewPage, Page, PageContext, PagePatch, EMPTY_DESCRIPTION_HTML};
use pagekit::output::{self, OutputMode};
use pagekit::{repo, views};
use serde::de::DeserializeOwned;
use std::io::{self, Read as _};
use std::process;
use tracing::info;

/// Field validation for inbound payloads.
mod validation {
    use pagekit::db::PageKitError;
    use pagekit::models::{NewPage, PagePatch};

    pub const MAX_SLUG_LEN: usize = 128;
    pub const MAX_NAME_LEN: usize = 255;
    pub const MAX_COLOR_LEN: usize = 255;
    pub const MAX_HTML_LEN: usize = 10_000_000; // 10 MB
    pub const MAX_LABELS_COUNT: usize = 100;

    pub fn validate_slug(slug: &str) -> Result<(), PageKitError> {
        if slug.is_empty() {
            return Err(PageKitError::InvalidInput("Slug must not be empty".to_string()));
        }
        if slug.len() > MAX_SLUG_LEN {
            return Err(PageKitError::InvalidInput(format!("Slug too long (max {} characters)", MAX_SLUG_LEN)));
        }
        if !slug.starts_with(|c: char| c.is_ascii_lowercase()) {
            return Err(PageKitError::InvalidInput("Slug must start with a lowercase letter".to_string()));
        }
        if !slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_') {
            return Err(PageKitError::InvalidInput(
                "Slug must contain only lowercase letters, digits, hyphens, and underscores".to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_name(name: &str) -> Result<(), PageKitError> {
        if name.trim().is_empty() {
            return Err(PageKitError::InvalidInput("Name must not be empty".to_string()));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(PageKitError::InvalidInput(format!("Name too long (max {} characters)", MAX_NAME_LEN)));
        }
        Ok(())
    }

    pub fn validate_color(color: &str) -> Result<(), PageKitError> {
        if color.chars().count() > MAX_COLOR_LEN {
            return Err(PageKitError::InvalidInput(format!("Color too long (max {} characters)", MAX_COLOR_LEN)));
        }
        Ok(())
    }

    pub fn validate_html(html: &str) -> Result<(), PageKitError> {
        if html.len() > MAX_HTML_LEN {
            return Err(PageKitError::InvalidInput(format!("HTML body too long (max {} bytes)", MAX_HTML_LEN)));
        }
        Ok(())
    }

    pub fn validate_labels(labels: &[String]) -> Result<(), PageKitError> {
        if labels.len() > MAX_LABELS_COUNT {
            return Err(PageKitError::InvalidInput(format!("Too many labels (max {})", MAX_LABELS_COUNT)));
        }
        if labels.iter().any(|l| l.trim().is_empty()) {
            return Err(PageKitError::InvalidInput("Label ids must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn validate_archived_at(date: &str) -> Result<(), PageKitError> {
        chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map(|_| ())
            .map_err(|_| PageKitError::InvalidInput(format!("Invalid archived_at '{}' (expected YYYY-MM-DD)", date)))
    }

    pub fn validate_view_props(value: &serde_json::Value) -> Result<(), PageKitError> {
        if !value.is_object() {
            return Err(PageKitError::InvalidInput("view_props must be a JSON object".to_string()));
        }
        Ok(())
    }

    pub fn validate_new_page(page: &NewPage) -> Result<(), PageKitError> {
        validate_name(&page.name)?;
        validate_color(&page.color)?;
        validate_view_props(&page.view_props)?;
        if let Some(ref date) = page.archived_at {
            validate_archived_at(date)?;
        }
        if let Some(ref labels) = page.labels {
            validate_labels(labels)?;
        }
        Ok(())
    }

    pub fn validate_patch(patch: &PagePatch) -> Result<(), PageKitError> {
        if let Some(ref name) = patch.name {
            validate_name(name)?;
        }
        if let Some(ref color) = patch.color {
            validate_color(color)?;
        }
        if let Some(ref view_props) = patch.view_props {
            validate_view_props(view_props)?;
        }
        if let Some(Some(ref date)) = patch.archived_at {
            validate_archived_at(date)?;
        }
        if let Some(ref html) = patch.description_html {
            validate_html(html)?;
        }
        if let Some(ref labels) = patch.labels {
            validate_labels(labels)?;
        }
        Ok(())
    }
}

/// Project wiki pages, labels and page links stored in SQLite.
///
/// All output is JSON by default; use --pretty for human-readable format.
#[derive(Parser)]
#[command(name = "pagekit", version, about)]
struct Cli {
    /// Output in human-readable format instead of JSON.
    #[arg(long, global = true)]
    pretty: bool,

    /// Acting user id (default: $PAGEKIT_USER or $USER).
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage workspaces.
    Workspace {
        #[command(subcommand)]
        action: WorkspaceAction,
    },
    /// Manage projects.
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },
    /// Manage project labels.
    Label {
        #[command(subcommand)]
        action: LabelAction,
    },
    /// Manage pages.
    Page {
        #[command(subcommand)]
        action: PageAction,
    },
    /// Inspect and record page link log entries.
    Log {
        #[command(subcommand)]
        action: LogAction,
    },
}

#[derive(Subcommand)]
enum WorkspaceAction {
    /// Create a workspace.
    Create {
        /// URL-friendly slug (e.g. "acme").
        slug: String,
        /// Display name. Defaults to the slug.
        #[arg(long)]
        name: Option<String>,
    },
    /// List all workspaces.
    List,
}

#[derive(Subcommand)]
enum ProjectAction {
    /// Create a project in a workspace.
    Create {
        /// Workspace slug.
        #[arg(long)]
        workspace: String,
        /// Short project identifier (e.g. "WEB").
        identifier: String,
        /// Display name. Defaults to the identifier.
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Subcommand)]
enum LabelAction {
    /// Create a label in a project.
    Create {
        /// Project id.
        #[arg(long)]
        project: String,
        /// Label name (unique per project).
        name: String,
        /// Label color.
        #[arg(long, default_value = "")]
        color: String,
        /// Display position; lower sorts first.
        #[arg(long)]
        sort_order: Option<f64>,
    },
    /// List a project's labels.
    List {
        /// Project id.
        #[arg(long)]
        project: String,
    },
}

#[derive(Subcommand)]
enum PageAction {
    /// Create a page from a JSON body.
    Create {
        /// Project id the page belongs to.
        #[arg(long)]
        project: String,
        /// Pre-rendered HTML body.
        #[arg(long)]
        html: Option<String>,
        /// JSON body, e.g. '{"name":"Roadmap","labels":["<label-id>"]}'.
        #[arg(long)]
        data: Option<String>,
        /// Read the JSON body from stdin.
        #[arg(long)]
        stdin: bool,
        /// Include the HTML body in the output.
        #[arg(long)]
        detail: bool,
    },
    /// Get a page by id.
    Get {
        /// The page id.
        id: String,
        /// Include the HTML body in the output.
        #[arg(long)]
        detail: bool,
    },
    /// List pages with optional filters.
    List {
        /// Filter by project id.
        #[arg(long)]
        project: Option<String>,
        /// Filter by label id.
        #[arg(long)]
        label: Option<String>,
        /// Filter by owner.
        #[arg(long)]
        owned_by: Option<String>,
        /// Only archived pages.
        #[arg(long, conflicts_with = "active")]
        archived: bool,
        /// Only pages that are not archived.
        #[arg(long)]
        active: bool,
    },
    /// Partially update a page from a JSON body. Sending "labels" replaces
    /// the whole label set.
    Update {
        /// The page id.
        id: String,
        /// JSON body with the fields to change.
        #[arg(long)]
        data: Option<String>,
        /// Read the JSON body from stdin.
        #[arg(long)]
        stdin: bool,
        /// Include the HTML body in the output.
        #[arg(long)]
        detail: bool,
    },
    /// Archive a page and its descendants.
    Archive { id: String },
    /// Restore an archived page and its descendants.
    Unarchive { id: String },
    /// Mark a page as a favorite of the acting user.
    Favorite { id: String },
    /// Remove a page from the acting user's favorites.
    Unfavorite { id: String },
}

#[derive(Subcommand)]
enum LogAction {
    /// Record a log entry for a page.
    Create {
        /// Page id the entry belongs to.
        #[arg(long)]
        page: String,
        /// Entity kind (forward_link, back_link, issue, page_mention, ...).
        #[arg(long)]
        kind: String,
        /// Identifier of the referenced entity.
        #[arg(long)]
        entity: Option<String>,
    },
    /// Get a log entry by id.
    Get {
        /// The log entry id.
        id: String,
        /// Resolve the linked page into "entity_details".
        #[arg(long)]
        sub_page: bool,
    },
    /// List every log entry of a page.
    List {
        /// Page id.
        #[arg(long)]
        page: String,
    },
    /// List a page's forward/back links with the linked pages resolved.
    SubPages {
        /// Page id.
        #[arg(long)]
        page: String,
    },
}

/// Resolve the acting user from the CLI flag, env vars, or a fallback.
fn resolve_user(cli: &Cli) -> String {
    cli.user
        .clone()
        .or_else(|| std::env::var("PAGEKIT_USER").ok())
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Read a JSON body from --data or --stdin.
fn read_body(data: &Option<String>, stdin: bool) -> Result<String, PageKitError> {
    if stdin {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else if let Some(d) = data {
        Ok(d.clone())
    } else {
        Err(PageKitError::InvalidInput("No JSON body. Use --data or --stdin.".to_string()))
    }
}

fn parse_body<T: DeserializeOwned>(body: &str, what: &str) -> Result<T, PageKitError> {
    serde_json::from_str(body).map_err(|e| PageKitError::InvalidInput(format!("Invalid {} JSON: {}", what, e)))
}

fn parse_entity_kind(s: &str) -> Result<EntityKind, PageKitError> {
    EntityKind::from_str(s).ok_or_else(|| {
        let valid: Vec<&str> = EntityKind::ALL.iter().map(|k| k.as_str()).collect();
        PageKitError::InvalidInput(format!("Unknown kind '{}'. Valid kinds: {}", s, valid.join(", ")))
    })
}

/// Print a page as a plain or detail view for `viewer`.
fn print_page(
    conn: &rusqlite::Connection,
    mode: OutputMode,
    page: &Page,
    viewer: &str,
    detail: bool,
) -> Result<(), PageKitError> {
    let favorite = repo::is_favorite(conn, &page.id, viewer)?;
    if detail {
        let view = views::page_detail_view(conn, page, favorite)?;
        output::print(mode, &view, || output::print_pretty_page_detail(&view))
    } else {
        let view = views::page_view(conn, page, favorite)?;
        output::print(mode, &view, || output::print_pretty_page(&view))
    }
}

fn run() -> Result<(), PageKitError> {
    let cli = Cli::parse();
    let mode = if cli.pretty {
        OutputMode::Pretty
    } else {
        OutputMode::Json
    };
    let user = resolve_user(&cli);

    let mut conn = db::open_connection()?;
    db::run_migrations(&mut conn)?;

    match &cli.command {
        // =====================================================================
        // Workspaces, projects, labels
        // =====================================================================
        Commands::Workspace { action } => match action {
            WorkspaceAction::Create { slug, name } => {
                validation::validate_slug(slug)?;
                let display_name = name.as_deref().unwrap_or(slug);
                validation::validate_name(display_name)?;
                let workspace = repo::create_workspace(&conn, slug, display_name)?;
                info!(workspace_id = %workspace.id, "created workspace");
                output::print(mode, &workspace, || output::print_pretty_workspace(&workspace))?;
            }
            WorkspaceAction::List => {
                let workspaces = repo::list_workspaces(&conn)?;
                output::print(mode, &workspaces, || output::print_pretty_workspaces(&workspaces))?;
            }
        },

        Commands::Project { action } => match action {
            ProjectAction::Create {
                workspace,
                identifier,
                name,
            } => {
                let ws = repo::get_workspace_by_slug(&conn, workspace)?;
                let display_name = name.as_deref().unwrap_or(identifier);
                validation::validate_name(identifier)?;
                validation::validate_name(display_name)?;
                let project = repo::create_project(&conn, &ws.id, identifier, display_name)?;
                info!(project_id = %project.id, "created project");
                output::print(mode, &project, || output::print_pretty_project(&project))?;
            }
        },

        Commands::Label { action } => match action {
            LabelAction::Create {
                project,
                name,
                color,
                sort_order,
            } => {
                validation::validate_name(name)?;
                validation::validate_color(color)?;
                let label = repo::create_label(&conn, project, name, color, *sort_order)?;
                output::print(mode, &label, || {
                    output::print_pretty_labels(std::slice::from_ref(&label))
                })?;
            }
            LabelAction::List { project } => {
                let labels = repo::list_labels(&conn, project)?;
                output::print(mode, &labels, || output::print_pretty_labels(&labels))?;
            }
        },

        // =====================================================================
        // Pages
        // =====================================================================
        Commands::Page { action } => match action {
            PageAction::Create {
                project,
                html,
                data,
                stdin,
                detail,
            } => {
                let body = read_body(data, *stdin)?;
                let new_page: NewPage = parse_body(&body, "page")?;
                validation::validate_new_page(&new_page)?;
                let description_html = html.clone().unwrap_or_else(|| EMPTY_DESCRIPTION_HTML.to_string());
                validation::validate_html(&description_html)?;

                let ctx = PageContext {
                    project_id: project.clone(),
                    owned_by_id: user.clone(),
                    description_html,
                };
                let page = repo::create_page(&conn, &new_page, &ctx)?;
                info!(page_id = %page.id, "created page");
                print_page(&conn, mode, &page, &user, *detail)?;
            }
            PageAction::Get { id, detail } => {
                let page = repo::get_page(&conn, id)?;
                print_page(&conn, mode, &page, &user, *detail)?;
            }
            PageAction::List {
                project,
                label,
                owned_by,
                archived,
                active,
            } => {
                let filters = repo::PageFilters {
                    project_id: project.clone(),
                    owned_by: owned_by.clone(),
                    label_id: label.clone(),
                    archived: match (*archived, *active) {
                        (true, _) => Some(true),
                        (_, true) => Some(false),
                        _ => None,
                    },
                };
                let pages = repo::list_pages(&conn, &filters)?
                    .iter()
                    .map(|page| views::page_view_for(&conn, page, &user))
                    .collect::<Result<Vec<_>, _>>()?;
                output::print(mode, &pages, || output::print_pretty_pages(&pages))?;
            }
            PageAction::Update {
                id,
                data,
                stdin,
                detail,
            } => {
                let body = read_body(data, *stdin)?;
                let patch: PagePatch = parse_body(&body, "page")?;
                validation::validate_patch(&patch)?;
                let page = repo::update_page(&conn, id, &patch, &user)?;
                info!(page_id = %page.id, "updated page");
                print_page(&conn, mode, &page, &user, *detail)?;
            }
            PageAction::Archive { id } => {
                let page = repo::archive_page(&conn, id, &user)?;
                print_page(&conn, mode, &page, &user, false)?;
            }
            PageAction::Unarchive { id } => {
                let page = repo::unarchive_page(&conn, id, &user)?;
                print_page(&conn, mode, &page, &user, false)?;
            }
            PageAction::Favorite { id } => {
                repo::add_favorite(&conn, &user, id)?;
                let page = repo::get_page(&conn, id)?;
                print_page(&conn, mode, &page, &user, false)?;
            }
            PageAction::Unfavorite { id } => {
                repo::remove_favorite(&conn, &user, id)?;
                let page = repo::get_page(&conn, id)?;
                print_page(&conn, mode, &page, &user, false)?;
            }
        },

        // =====================================================================
        // Page logs
        // =====================================================================
        Commands::Log { action } => match action {
            LogAction::Create { page, kind, entity } => {
                let kind = parse_entity_kind(kind)?;
                let log = repo::create_page_log(&conn, page, kind, entity.as_deref(), &user)?;
                output::print(mode, &log, || output::print_pretty_log(&log))?;
            }
            LogAction::Get { id, sub_page } => {
                let log = repo::get_page_log(&conn, id)?;
                if *sub_page {
                    let view = views::sub_page_view(&conn, &log)?;
                    output::print(mode, &view, || {
                        output::print_pretty_sub_pages(std::slice::from_ref(&view))
                    })?;
                } else {
                    output::print(mode, &log, || output::print_pretty_log(&log))?;
                }
            }
            LogAction::List { page } => {
                let logs = repo::list_page_logs(&conn, page)?;
                output::print(mode, &logs, || output::print_pretty_logs(&logs))?;
            }
            LogAction::SubPages { page } => {
                let logs = repo::list_sub_page_logs(&conn, page)?;
                let sub_pages = views::sub_page_views(&conn, &logs)?;
                output::print(mode, &sub_pages, || output::print_pretty_sub_pages(&sub_pages))?;
            }
        },
    }

    Ok(())
}

/// Logs go to stderr so stdout stays machine-readable.
/// Filter: `PAGEKIT_LOG`, then `RUST_LOG`, then `warn`.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("PAGEKIT_LOG")
        .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() {
    init_tracing();

    if let Err(e) = run() {
        let error_json = serde_json::json!({
            "error": e.to_string()
        });
        eprintln!("{}", error_json);
        process::exit(1);
    }
}
