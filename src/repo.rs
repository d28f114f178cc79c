//! Repository layer: all SQL for workspaces, labels, pages and page logs.
//!
//! Plain functions that take a `rusqlite::Connection` as their first
//! parameter and return `Result<T, PageKitError>`. Multi-statement writes run
//! inside `unchecked_transaction()` so they commit or roll back as a unit.

use crate::db::PageKitError;
use crate::models::{
    EntityKind, Label, NewPage, Page, PageAccess, PageContext, PageLabel, PageLog, PagePatch,
    Project, Workspace,
};
use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

/// Association rows inserted per statement.
pub const LABEL_BATCH_SIZE: usize = 10;

const PAGE_COLUMNS: &str = "id, name, description_html, owned_by, access, color, parent_id, is_locked,
     archived_at, view_props, workspace_id, project_id, created_by, updated_by, created_at, updated_at";

const PAGE_LOG_COLUMNS: &str = "id, \"transaction\", page_id, entity_identifier, entity_name,
     workspace_id, project_id, created_at, updated_at, created_by, updated_by";

/// Filters for listing pages. Unset filters are ignored.
#[derive(Debug, Default)]
pub struct PageFilters {
    pub project_id: Option<String>,
    pub owned_by: Option<String>,
    pub label_id: Option<String>,
    /// `Some(true)` for archived pages only, `Some(false)` for active only.
    pub archived: Option<bool>,
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn not_found(kind: &str, id: &str) -> impl FnOnce(rusqlite::Error) -> PageKitError {
    let msg = format!("{} with ID '{}' not found", kind, id);
    move |e| match e {
        rusqlite::Error::QueryReturnedNoRows => PageKitError::NotFound(msg),
        _ => PageKitError::Db(e),
    }
}

/// Map a row selected with `PAGE_COLUMNS` to a Page.
fn row_to_page(row: &rusqlite::Row) -> Result<Page, rusqlite::Error> {
    let access_raw: i64 = row.get(4)?;
    let access = PageAccess::from_i64(access_raw).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(4, "access".to_string(), rusqlite::types::Type::Integer)
    })?;
    let view_props_str: String = row.get(9)?;
    let view_props = serde_json::from_str(&view_props_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Page {
        id: row.get(0)?,
        name: row.get(1)?,
        description_html: row.get(2)?,
        owned_by: row.get(3)?,
        access,
        color: row.get(5)?,
        parent_id: row.get(6)?,
        is_locked: row.get(7)?,
        archived_at: row.get(8)?,
        view_props,
        workspace_id: row.get(10)?,
        project_id: row.get(11)?,
        created_by: row.get(12)?,
        updated_by: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn row_to_page_log(row: &rusqlite::Row) -> Result<PageLog, rusqlite::Error> {
    let kind_str: String = row.get(4)?;
    let entity_name = EntityKind::from_str(&kind_str).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(4, "entity_name".to_string(), rusqlite::types::Type::Text)
    })?;
    Ok(PageLog {
        id: row.get(0)?,
        transaction: row.get(1)?,
        page_id: row.get(2)?,
        entity_identifier: row.get(3)?,
        entity_name,
        workspace_id: row.get(5)?,
        project_id: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        created_by: row.get(9)?,
        updated_by: row.get(10)?,
    })
}

fn row_to_label(row: &rusqlite::Row) -> Result<Label, rusqlite::Error> {
    Ok(Label {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        project_id: row.get(2)?,
        name: row.get(3)?,
        color: row.get(4)?,
        sort_order: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

// =============================================================================
// Workspaces & projects
// =============================================================================

/// Creates a workspace. The slug must be unique.
pub fn create_workspace(conn: &Connection, slug: &str, name: &str) -> Result<Workspace, PageKitError> {
    let id = uuid::Uuid::new_v4().to_string();
    let created_at = now();

    conn.execute(
        "INSERT INTO workspaces (id, slug, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![id, slug, name, created_at, created_at],
    )?;

    Ok(Workspace {
        id,
        slug: slug.to_string(),
        name: name.to_string(),
        created_at: created_at.clone(),
        updated_at: created_at,
    })
}

pub fn get_workspace_by_slug(conn: &Connection, slug: &str) -> Result<Workspace, PageKitError> {
    conn.query_row(
        "SELECT id, slug, name, created_at, updated_at FROM workspaces WHERE slug = ?1",
        [slug],
        |row| {
            Ok(Workspace {
                id: row.get(0)?,
                slug: row.get(1)?,
                name: row.get(2)?,
                created_at: row.get(3)?,
                updated_at: row.get(4)?,
            })
        },
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => {
            PageKitError::NotFound(format!("Workspace with slug '{}' not found", slug))
        }
        _ => PageKitError::Db(e),
    })
}

/// Lists all workspaces, newest first.
pub fn list_workspaces(conn: &Connection) -> Result<Vec<Workspace>, PageKitError> {
    let mut stmt = conn.prepare(
        "SELECT id, slug, name, created_at, updated_at FROM workspaces ORDER BY created_at DESC",
    )?;
    let workspaces = stmt
        .query_map([], |row| {
            Ok(Workspace {
                id: row.get(0)?,
                slug: row.get(1)?,
                name: row.get(2)?,
                created_at: row.get(3)?,
                updated_at: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(workspaces)
}

/// Creates a project inside a workspace. `identifier` is unique per workspace.
pub fn create_project(
    conn: &Connection,
    workspace_id: &str,
    identifier: &str,
    name: &str,
) -> Result<Project, PageKitError> {
    let id = uuid::Uuid::new_v4().to_string();
    let created_at = now();

    conn.execute(
        "INSERT INTO projects (id, workspace_id, identifier, name, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![id, workspace_id, identifier, name, created_at, created_at],
    )?;

    Ok(Project {
        id,
        workspace_id: workspace_id.to_string(),
        identifier: identifier.to_string(),
        name: name.to_string(),
        created_at: created_at.clone(),
        updated_at: created_at,
    })
}

pub fn get_project(conn: &Connection, id: &str) -> Result<Project, PageKitError> {
    conn.query_row(
        "SELECT id, workspace_id, identifier, name, created_at, updated_at FROM projects WHERE id = ?1",
        [id],
        |row| {
            Ok(Project {
                id: row.get(0)?,
                workspace_id: row.get(1)?,
                identifier: row.get(2)?,
                name: row.get(3)?,
                created_at: row.get(4)?,
                updated_at: row.get(5)?,
            })
        },
    )
    .map_err(not_found("Project", id))
}

// =============================================================================
// Labels
// =============================================================================

/// Creates a label in a project. Without a sort order the label sorts last
/// (`65535`, matching the column default).
pub fn create_label(
    conn: &Connection,
    project_id: &str,
    name: &str,
    color: &str,
    sort_order: Option<f64>,
) -> Result<Label, PageKitError> {
    let project = get_project(conn, project_id)?;
    let id = uuid::Uuid::new_v4().to_string();
    let created_at = now();
    let sort_order = sort_order.unwrap_or(65535.0);

    conn.execute(
        "INSERT INTO labels (id, workspace_id, project_id, name, color, sort_order, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![id, project.workspace_id, project_id, name, color, sort_order, created_at, created_at],
    )?;

    Ok(Label {
        id,
        workspace_id: project.workspace_id,
        project_id: project_id.to_string(),
        name: name.to_string(),
        color: color.to_string(),
        sort_order,
        created_at: created_at.clone(),
        updated_at: created_at,
    })
}

/// Lists a project's labels in display order.
pub fn list_labels(conn: &Connection, project_id: &str) -> Result<Vec<Label>, PageKitError> {
    let mut stmt = conn.prepare(
        "SELECT id, workspace_id, project_id, name, color, sort_order, created_at, updated_at
         FROM labels WHERE project_id = ?1 ORDER BY sort_order, name",
    )?;
    let labels = stmt
        .query_map([project_id], row_to_label)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(labels)
}

/// Ids of the labels currently associated with a page, in label display order.
pub fn get_label_ids(conn: &Connection, page_id: &str) -> Result<Vec<String>, PageKitError> {
    let mut stmt = conn.prepare(
        "SELECT l.id FROM page_labels pl
         INNER JOIN labels l ON l.id = pl.label_id
         WHERE pl.page_id = ?1
         ORDER BY l.sort_order, l.name",
    )?;
    let ids = stmt
        .query_map([page_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

/// Raw association rows for a page, oldest first.
pub fn list_page_labels(conn: &Connection, page_id: &str) -> Result<Vec<PageLabel>, PageKitError> {
    let mut stmt = conn.prepare(
        "SELECT id, page_id, label_id, project_id, workspace_id, created_by, updated_by, created_at, updated_at
         FROM page_labels WHERE page_id = ?1 ORDER BY created_at, label_id",
    )?;
    let rows = stmt
        .query_map([page_id], |row| {
            Ok(PageLabel {
                id: row.get(0)?,
                page_id: row.get(1)?,
                label_id: row.get(2)?,
                project_id: row.get(3)?,
                workspace_id: row.get(4)?,
                created_by: row.get(5)?,
                updated_by: row.get(6)?,
                created_at: row.get(7)?,
                updated_at: row.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Inserts one association per label id, `LABEL_BATCH_SIZE` rows per statement.
/// Each row copies project, workspace and audit actors from `page`.
///
/// Must be called inside the caller's transaction.
fn insert_page_labels(conn: &Connection, page: &Page, label_ids: &[String]) -> Result<(), PageKitError> {
    let stamped_at = now();

    for batch in label_ids.chunks(LABEL_BATCH_SIZE) {
        let placeholders = vec!["(?, ?, ?, ?, ?, ?, ?, ?, ?)"; batch.len()].join(", ");
        let sql = format!(
            "INSERT INTO page_labels
                (id, page_id, label_id, project_id, workspace_id, created_by, updated_by, created_at, updated_at)
             VALUES {}",
            placeholders
        );

        let mut values: Vec<String> = Vec::with_capacity(batch.len() * 9);
        for label_id in batch {
            values.extend([
                uuid::Uuid::new_v4().to_string(),
                page.id.clone(),
                label_id.clone(),
                page.project_id.clone(),
                page.workspace_id.clone(),
                page.created_by.clone(),
                page.updated_by.clone(),
                stamped_at.clone(),
                stamped_at.clone(),
            ]);
        }

        conn.execute(&sql, rusqlite::params_from_iter(values.iter()))?;
    }

    Ok(())
}

/// Replaces a page's whole association set: delete by page, then bulk insert.
///
/// Must be called inside the caller's transaction.
fn replace_page_labels(conn: &Connection, page: &Page, label_ids: &[String]) -> Result<(), PageKitError> {
    let removed = conn.execute("DELETE FROM page_labels WHERE page_id = ?1", [&page.id])?;
    insert_page_labels(conn, page, label_ids)?;
    debug!(page_id = %page.id, removed, inserted = label_ids.len(), "replaced page labels");
    Ok(())
}

// =============================================================================
// Pages
// =============================================================================

/// Creates a page from validated input plus the caller's context.
///
/// The workspace comes from the project. Creator and last editor are the
/// owner. When `new.labels` is present (even empty) the association rows are
/// written in the same transaction; when absent none are written.
///
/// # Errors
/// `NotFound` for an unknown project; `Db` for a missing parent or label, or
/// a label listed twice. Nothing is persisted on error.
pub fn create_page(conn: &Connection, new: &NewPage, ctx: &PageContext) -> Result<Page, PageKitError> {
    let project = get_project(conn, &ctx.project_id)?;
    let created_at = now();

    let page = Page {
        id: uuid::Uuid::new_v4().to_string(),
        name: new.name.clone(),
        description_html: ctx.description_html.clone(),
        owned_by: ctx.owned_by_id.clone(),
        access: new.access,
        color: new.color.clone(),
        parent_id: new.parent.clone(),
        is_locked: new.is_locked,
        archived_at: new.archived_at.clone(),
        view_props: new.view_props.clone(),
        workspace_id: project.workspace_id,
        project_id: project.id,
        created_by: ctx.owned_by_id.clone(),
        updated_by: ctx.owned_by_id.clone(),
        created_at: created_at.clone(),
        updated_at: created_at,
    };
    let view_props_json = serde_json::to_string(&page.view_props)?;

    let tx = conn.unchecked_transaction()?;

    tx.execute(
        &format!(
            "INSERT INTO pages ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            PAGE_COLUMNS
        ),
        rusqlite::params![
            page.id,
            page.name,
            page.description_html,
            page.owned_by,
            page.access.as_i64(),
            page.color,
            page.parent_id,
            page.is_locked,
            page.archived_at,
            view_props_json,
            page.workspace_id,
            page.project_id,
            page.created_by,
            page.updated_by,
            page.created_at,
            page.updated_at,
        ],
    )?;

    if let Some(ref labels) = new.labels {
        insert_page_labels(&tx, &page, labels)?;
    }

    tx.commit()?;

    debug!(
        page_id = %page.id,
        project_id = %page.project_id,
        labels = ?new.labels.as_ref().map(|l| l.len()),
        "created page"
    );
    Ok(page)
}

/// Retrieves a page by id.
///
/// # Errors
/// Returns `PageKitError::NotFound` if no page with the given id exists.
pub fn get_page(conn: &Connection, id: &str) -> Result<Page, PageKitError> {
    conn.query_row(
        &format!("SELECT {} FROM pages WHERE id = ?1", PAGE_COLUMNS),
        [id],
        row_to_page,
    )
    .map_err(not_found("Page", id))
}

/// Like [`get_page`] but a missing page is `Ok(None)`.
pub fn find_page(conn: &Connection, id: &str) -> Result<Option<Page>, PageKitError> {
    let page = conn
        .query_row(
            &format!("SELECT {} FROM pages WHERE id = ?1", PAGE_COLUMNS),
            [id],
            row_to_page,
        )
        .optional()?;
    Ok(page)
}

/// Applies a partial update to a page.
///
/// When `patch.labels` is present the association set is replaced first,
/// stamped from the page as it was before this update. Field changes and
/// label replacement share one transaction. `updated_at`/`updated_by` are
/// always refreshed.
///
/// # Errors
/// `NotFound` if the page doesn't exist; `InvalidInput` if the page would
/// become its own parent; `Db` for constraint failures.
pub fn update_page(conn: &Connection, id: &str, patch: &PagePatch, actor: &str) -> Result<Page, PageKitError> {
    if let Some(Some(ref parent)) = patch.parent {
        if parent == id {
            return Err(PageKitError::InvalidInput("A page cannot be its own parent".to_string()));
        }
    }

    let tx = conn.unchecked_transaction()?;
    let existing = get_page(&tx, id)?;

    if let Some(ref labels) = patch.labels {
        replace_page_labels(&tx, &existing, labels)?;
    }

    let mut assignments: Vec<&str> = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(ref name) = patch.name {
        assignments.push("name = ?");
        params.push(Box::new(name.clone()));
    }
    if let Some(access) = patch.access {
        assignments.push("access = ?");
        params.push(Box::new(access.as_i64()));
    }
    if let Some(ref color) = patch.color {
        assignments.push("color = ?");
        params.push(Box::new(color.clone()));
    }
    if let Some(ref parent) = patch.parent {
        assignments.push("parent_id = ?");
        params.push(Box::new(parent.clone()));
    }
    if let Some(is_locked) = patch.is_locked {
        assignments.push("is_locked = ?");
        params.push(Box::new(is_locked));
    }
    if let Some(ref archived_at) = patch.archived_at {
        assignments.push("archived_at = ?");
        params.push(Box::new(archived_at.clone()));
    }
    if let Some(ref view_props) = patch.view_props {
        assignments.push("view_props = ?");
        params.push(Box::new(serde_json::to_string(view_props)?));
    }
    if let Some(ref html) = patch.description_html {
        assignments.push("description_html = ?");
        params.push(Box::new(html.clone()));
    }

    assignments.push("updated_at = ?");
    params.push(Box::new(now()));
    assignments.push("updated_by = ?");
    params.push(Box::new(actor.to_string()));
    params.push(Box::new(id.to_string()));

    let sql = format!("UPDATE pages SET {} WHERE id = ?", assignments.join(", "));
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    tx.execute(&sql, &param_refs[..])?;

    tx.commit()?;

    debug!(page_id = %id, fields = assignments.len() - 2, labels_replaced = patch.labels.is_some(), "updated page");
    get_page(conn, id)
}

/// Lists pages matching the given filters, newest first.
pub fn list_pages(conn: &Connection, filters: &PageFilters) -> Result<Vec<Page>, PageKitError> {
    let columns = PAGE_COLUMNS
        .split(',')
        .map(|c| format!("p.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ");
    let mut sql = format!("SELECT DISTINCT {} FROM pages p", columns);

    let mut conditions = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if filters.label_id.is_some() {
        sql.push_str(" INNER JOIN page_labels pl ON p.id = pl.page_id");
    }

    if let Some(ref project_id) = filters.project_id {
        conditions.push("p.project_id = ?");
        params.push(Box::new(project_id.clone()));
    }

    if let Some(ref owned_by) = filters.owned_by {
        conditions.push("p.owned_by = ?");
        params.push(Box::new(owned_by.clone()));
    }

    if let Some(ref label_id) = filters.label_id {
        conditions.push("pl.label_id = ?");
        params.push(Box::new(label_id.clone()));
    }

    match filters.archived {
        Some(true) => conditions.push("p.archived_at IS NOT NULL"),
        Some(false) => conditions.push("p.archived_at IS NULL"),
        None => {}
    }

    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }

    sql.push_str(" ORDER BY p.created_at DESC");

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

    let pages = stmt
        .query_map(&param_refs[..], row_to_page)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(pages)
}

/// Sets `archived_at` to today (UTC) on a page and all of its descendants.
pub fn archive_page(conn: &Connection, id: &str, actor: &str) -> Result<Page, PageKitError> {
    get_page(conn, id)?;
    let today = chrono::Utc::now().date_naive().format("%Y-%m-%d").to_string();

    let affected = conn.execute(
        "WITH RECURSIVE subtree(id) AS (
             SELECT ?1
             UNION
             SELECT p.id FROM pages p INNER JOIN subtree s ON p.parent_id = s.id
         )
         UPDATE pages SET archived_at = ?2, updated_at = ?3, updated_by = ?4
         WHERE id IN (SELECT id FROM subtree)",
        rusqlite::params![id, today, now(), actor],
    )?;

    debug!(page_id = %id, affected, "archived page subtree");
    get_page(conn, id)
}

/// Clears `archived_at` on a page and all of its descendants. A page whose
/// parent is still archived is detached from that parent.
pub fn unarchive_page(conn: &Connection, id: &str, actor: &str) -> Result<Page, PageKitError> {
    let page = get_page(conn, id)?;
    let tx = conn.unchecked_transaction()?;
    let updated_at = now();

    if let Some(ref parent_id) = page.parent_id {
        let parent = get_page(&tx, parent_id)?;
        if parent.archived_at.is_some() {
            tx.execute("UPDATE pages SET parent_id = NULL WHERE id = ?1", [id])?;
        }
    }

    let affected = tx.execute(
        "WITH RECURSIVE subtree(id) AS (
             SELECT ?1
             UNION
             SELECT p.id FROM pages p INNER JOIN subtree s ON p.parent_id = s.id
         )
         UPDATE pages SET archived_at = NULL, updated_at = ?2, updated_by = ?3
         WHERE id IN (SELECT id FROM subtree)",
        rusqlite::params![id, updated_at, actor],
    )?;

    tx.commit()?;

    debug!(page_id = %id, affected, "unarchived page subtree");
    get_page(conn, id)
}

// =============================================================================
// Favorites
// =============================================================================

/// Marks a page as a favorite of `user_id`. Marking twice is a no-op.
pub fn add_favorite(conn: &Connection, user_id: &str, page_id: &str) -> Result<(), PageKitError> {
    let page = get_page(conn, page_id)?;
    conn.execute(
        "INSERT OR IGNORE INTO page_favorites (user_id, page_id, project_id, workspace_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![user_id, page.id, page.project_id, page.workspace_id, now()],
    )?;
    Ok(())
}

pub fn remove_favorite(conn: &Connection, user_id: &str, page_id: &str) -> Result<(), PageKitError> {
    conn.execute(
        "DELETE FROM page_favorites WHERE user_id = ?1 AND page_id = ?2",
        rusqlite::params![user_id, page_id],
    )?;
    Ok(())
}

pub fn is_favorite(conn: &Connection, page_id: &str, user_id: &str) -> Result<bool, PageKitError> {
    let found: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM page_favorites WHERE page_id = ?1 AND user_id = ?2)",
        rusqlite::params![page_id, user_id],
        |row| row.get(0),
    )?;
    Ok(found)
}

// =============================================================================
// Page logs
// =============================================================================

/// Records a log entry for `page_id`. Workspace and project come from the page.
pub fn create_page_log(
    conn: &Connection,
    page_id: &str,
    entity_name: EntityKind,
    entity_identifier: Option<&str>,
    actor: &str,
) -> Result<PageLog, PageKitError> {
    let page = get_page(conn, page_id)?;
    let created_at = now();

    let log = PageLog {
        id: uuid::Uuid::new_v4().to_string(),
        transaction: uuid::Uuid::new_v4().to_string(),
        page_id: page.id,
        entity_identifier: entity_identifier.map(|s| s.to_string()),
        entity_name,
        workspace_id: page.workspace_id,
        project_id: page.project_id,
        created_at: created_at.clone(),
        updated_at: created_at,
        created_by: Some(actor.to_string()),
        updated_by: Some(actor.to_string()),
    };

    conn.execute(
        &format!(
            "INSERT INTO page_logs ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            PAGE_LOG_COLUMNS
        ),
        rusqlite::params![
            log.id,
            log.transaction,
            log.page_id,
            log.entity_identifier,
            log.entity_name.as_str(),
            log.workspace_id,
            log.project_id,
            log.created_at,
            log.updated_at,
            log.created_by,
            log.updated_by,
        ],
    )?;

    Ok(log)
}

pub fn get_page_log(conn: &Connection, id: &str) -> Result<PageLog, PageKitError> {
    conn.query_row(
        &format!("SELECT {} FROM page_logs WHERE id = ?1", PAGE_LOG_COLUMNS),
        [id],
        row_to_page_log,
    )
    .map_err(not_found("Page log", id))
}

/// All log entries recorded for a page, oldest first.
pub fn list_page_logs(conn: &Connection, page_id: &str) -> Result<Vec<PageLog>, PageKitError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM page_logs WHERE page_id = ?1 ORDER BY created_at, id",
        PAGE_LOG_COLUMNS
    ))?;
    let logs = stmt
        .query_map([page_id], row_to_page_log)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(logs)
}

/// Only the forward/back link entries of a page, oldest first.
pub fn list_sub_page_logs(conn: &Connection, page_id: &str) -> Result<Vec<PageLog>, PageKitError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM page_logs
         WHERE page_id = ?1 AND entity_name IN (?2, ?3)
         ORDER BY created_at, id",
        PAGE_LOG_COLUMNS
    ))?;
    let logs = stmt
        .query_map(
            rusqlite::params![
                page_id,
                EntityKind::ForwardLink.as_str(),
                EntityKind::BackLink.as_str()
            ],
            row_to_page_log,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(logs)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_connection;
    use crate::models::NewPage;

    struct Fixture {
        conn: Connection,
        project: Project,
    }

    fn setup() -> Fixture {
        let conn = test_connection();
        let workspace = create_workspace(&conn, "acme", "Acme").expect("Failed to create workspace");
        let project = create_project(&conn, &workspace.id, "WEB", "Website").expect("Failed to create project");
        Fixture { conn, project }
    }

    fn context(project: &Project) -> PageContext {
        PageContext {
            project_id: project.id.clone(),
            owned_by_id: "alice".to_string(),
            description_html: "<p>hello</p>".to_string(),
        }
    }

    fn labels(fx: &Fixture, names: &[&str]) -> Vec<String> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                create_label(&fx.conn, &fx.project.id, name, "#ff0000", Some(i as f64))
                    .expect("Failed to create label")
                    .id
            })
            .collect()
    }

    fn new_page_with_labels(name: &str, label_ids: Option<Vec<String>>) -> NewPage {
        NewPage {
            labels: label_ids,
            ..NewPage::named(name)
        }
    }

    fn sorted(mut ids: Vec<String>) -> Vec<String> {
        ids.sort();
        ids
    }

    #[test]
    fn test_create_page_applies_context() {
        let fx = setup();
        let page = create_page(&fx.conn, &NewPage::named("Roadmap"), &context(&fx.project))
            .expect("Failed to create page");

        assert_eq!(page.name, "Roadmap");
        assert_eq!(page.owned_by, "alice");
        assert_eq!(page.created_by, "alice");
        assert_eq!(page.updated_by, "alice");
        assert_eq!(page.description_html, "<p>hello</p>");
        assert_eq!(page.project_id, fx.project.id);
        assert_eq!(page.workspace_id, fx.project.workspace_id);
        assert_eq!(page.access, PageAccess::Public);

        let stored = get_page(&fx.conn, &page.id).expect("Failed to get page");
        assert_eq!(stored, page);
    }

    #[test]
    fn test_create_page_unknown_project() {
        let fx = setup();
        let ctx = PageContext {
            project_id: "missing".to_string(),
            ..context(&fx.project)
        };
        let result = create_page(&fx.conn, &NewPage::named("Roadmap"), &ctx);
        assert!(matches!(result, Err(PageKitError::NotFound(_))));
    }

    #[test]
    fn test_create_page_with_labels_creates_one_association_each() {
        let fx = setup();
        let ids = labels(&fx, &["bug", "docs", "infra"]);

        let page = create_page(
            &fx.conn,
            &new_page_with_labels("Roadmap", Some(ids.clone())),
            &context(&fx.project),
        )
        .expect("Failed to create page");

        let rows = list_page_labels(&fx.conn, &page.id).expect("Failed to list associations");
        assert_eq!(rows.len(), 3);
        let linked: Vec<String> = rows.iter().map(|r| r.label_id.clone()).collect();
        assert_eq!(sorted(linked), sorted(ids));
    }

    #[test]
    fn test_create_page_stamps_associations_from_page() {
        let fx = setup();
        let ids = labels(&fx, &["bug"]);

        let page = create_page(
            &fx.conn,
            &new_page_with_labels("Roadmap", Some(ids)),
            &context(&fx.project),
        )
        .expect("Failed to create page");

        let row = &list_page_labels(&fx.conn, &page.id).expect("Failed to list associations")[0];
        assert_eq!(row.project_id, page.project_id);
        assert_eq!(row.workspace_id, page.workspace_id);
        assert_eq!(row.created_by, page.created_by);
        assert_eq!(row.updated_by, page.updated_by);
    }

    #[test]
    fn test_create_page_batches_more_than_batch_size() {
        let fx = setup();
        let names: Vec<String> = (0..23).map(|i| format!("label-{:02}", i)).collect();
        let name_refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        let ids = labels(&fx, &name_refs);

        let page = create_page(
            &fx.conn,
            &new_page_with_labels("Big", Some(ids.clone())),
            &context(&fx.project),
        )
        .expect("Failed to create page");

        assert_eq!(get_label_ids(&fx.conn, &page.id).unwrap(), ids);
    }

    #[test]
    fn test_absent_and_empty_labels_both_create_nothing() {
        let fx = setup();
        labels(&fx, &["bug"]);

        let absent = create_page(&fx.conn, &new_page_with_labels("A", None), &context(&fx.project))
            .expect("Failed to create page");
        let empty = create_page(&fx.conn, &new_page_with_labels("B", Some(vec![])), &context(&fx.project))
            .expect("Failed to create page");

        assert!(list_page_labels(&fx.conn, &absent.id).unwrap().is_empty());
        assert!(list_page_labels(&fx.conn, &empty.id).unwrap().is_empty());
    }

    #[test]
    fn test_create_page_with_duplicate_labels_fails_atomically() {
        let fx = setup();
        let ids = labels(&fx, &["bug"]);
        let duplicated = vec![ids[0].clone(), ids[0].clone()];

        let result = create_page(
            &fx.conn,
            &new_page_with_labels("Dup", Some(duplicated)),
            &context(&fx.project),
        );
        assert!(matches!(result, Err(PageKitError::Db(_))));

        let pages = list_pages(&fx.conn, &PageFilters::default()).unwrap();
        assert!(pages.is_empty(), "page insert should have rolled back");
    }

    #[test]
    fn test_create_page_with_unknown_label_fails() {
        let fx = setup();
        let result = create_page(
            &fx.conn,
            &new_page_with_labels("Ghost", Some(vec!["no-such-label".to_string()])),
            &context(&fx.project),
        );
        assert!(matches!(result, Err(PageKitError::Db(_))));
    }

    #[test]
    fn test_get_page_not_found() {
        let fx = setup();
        assert!(matches!(get_page(&fx.conn, "nope"), Err(PageKitError::NotFound(_))));
        assert_eq!(find_page(&fx.conn, "nope").unwrap(), None);
    }

    #[test]
    fn test_update_replaces_label_set() {
        let fx = setup();
        let ids = labels(&fx, &["a", "b", "c"]);
        let page = create_page(
            &fx.conn,
            &new_page_with_labels("P", Some(vec![ids[0].clone(), ids[1].clone()])),
            &context(&fx.project),
        )
        .unwrap();

        let patch = PagePatch {
            labels: Some(vec![ids[1].clone(), ids[2].clone()]),
            ..PagePatch::default()
        };
        update_page(&fx.conn, &page.id, &patch, "bob").expect("Failed to update page");

        assert_eq!(get_label_ids(&fx.conn, &page.id).unwrap(), vec![ids[1].clone(), ids[2].clone()]);

        update_page(&fx.conn, &page.id, &patch, "bob").expect("Second update should succeed");
        assert_eq!(get_label_ids(&fx.conn, &page.id).unwrap(), vec![ids[1].clone(), ids[2].clone()]);
        assert_eq!(list_page_labels(&fx.conn, &page.id).unwrap().len(), 2);
    }

    #[test]
    fn test_update_with_empty_labels_clears_set() {
        let fx = setup();
        let ids = labels(&fx, &["a"]);
        let page = create_page(&fx.conn, &new_page_with_labels("P", Some(ids)), &context(&fx.project)).unwrap();

        let patch = PagePatch {
            labels: Some(vec![]),
            ..PagePatch::default()
        };
        update_page(&fx.conn, &page.id, &patch, "bob").unwrap();
        assert!(get_label_ids(&fx.conn, &page.id).unwrap().is_empty());
    }

    #[test]
    fn test_update_without_labels_leaves_associations_untouched() {
        let fx = setup();
        let ids = labels(&fx, &["a", "b"]);
        let page = create_page(&fx.conn, &new_page_with_labels("P", Some(ids)), &context(&fx.project)).unwrap();
        let before = list_page_labels(&fx.conn, &page.id).unwrap();

        let patch = PagePatch {
            name: Some("Renamed".to_string()),
            ..PagePatch::default()
        };
        let updated = update_page(&fx.conn, &page.id, &patch, "bob").unwrap();

        assert_eq!(updated.name, "Renamed");
        assert_eq!(list_page_labels(&fx.conn, &page.id).unwrap(), before);
    }

    #[test]
    fn test_update_stamps_labels_from_page_before_update() {
        let fx = setup();
        let ids = labels(&fx, &["a"]);
        let page = create_page(&fx.conn, &NewPage::named("P"), &context(&fx.project)).unwrap();

        let patch = PagePatch {
            labels: Some(ids),
            ..PagePatch::default()
        };
        let updated = update_page(&fx.conn, &page.id, &patch, "bob").unwrap();

        let row = &list_page_labels(&fx.conn, &page.id).unwrap()[0];
        assert_eq!(row.updated_by, "alice");
        assert_eq!(updated.updated_by, "bob");
        assert_eq!(updated.created_by, "alice");
    }

    #[test]
    fn test_update_partial_fields() {
        let fx = setup();
        let parent = create_page(&fx.conn, &NewPage::named("Parent"), &context(&fx.project)).unwrap();
        let page = create_page(
            &fx.conn,
            &NewPage {
                parent: Some(parent.id.clone()),
                color: "#00ff00".to_string(),
                ..NewPage::named("Child")
            },
            &context(&fx.project),
        )
        .unwrap();

        let patch = PagePatch {
            access: Some(PageAccess::Private),
            is_locked: Some(true),
            view_props: Some(serde_json::json!({"full_width": true})),
            description_html: Some("<p>new</p>".to_string()),
            ..PagePatch::default()
        };
        let updated = update_page(&fx.conn, &page.id, &patch, "bob").unwrap();

        assert_eq!(updated.name, "Child");
        assert_eq!(updated.color, "#00ff00");
        assert_eq!(updated.parent_id, Some(parent.id.clone()));
        assert_eq!(updated.access, PageAccess::Private);
        assert!(updated.is_locked);
        assert_eq!(updated.view_props, serde_json::json!({"full_width": true}));
        assert_eq!(updated.description_html, "<p>new</p>");
        assert_eq!(updated.owned_by, "alice");
    }

    #[test]
    fn test_update_can_clear_nullable_fields() {
        let fx = setup();
        let parent = create_page(&fx.conn, &NewPage::named("Parent"), &context(&fx.project)).unwrap();
        let page = create_page(
            &fx.conn,
            &NewPage {
                parent: Some(parent.id.clone()),
                archived_at: Some("2026-01-02".to_string()),
                ..NewPage::named("Child")
            },
            &context(&fx.project),
        )
        .unwrap();

        let patch = PagePatch {
            parent: Some(None),
            archived_at: Some(None),
            ..PagePatch::default()
        };
        let updated = update_page(&fx.conn, &page.id, &patch, "bob").unwrap();
        assert_eq!(updated.parent_id, None);
        assert_eq!(updated.archived_at, None);
    }

    #[test]
    fn test_update_rejects_self_parent() {
        let fx = setup();
        let page = create_page(&fx.conn, &NewPage::named("P"), &context(&fx.project)).unwrap();
        let patch = PagePatch {
            parent: Some(Some(page.id.clone())),
            ..PagePatch::default()
        };
        let result = update_page(&fx.conn, &page.id, &patch, "bob");
        assert!(matches!(result, Err(PageKitError::InvalidInput(_))));
    }

    #[test]
    fn test_update_page_not_found() {
        let fx = setup();
        let result = update_page(&fx.conn, "missing", &PagePatch::default(), "bob");
        assert!(matches!(result, Err(PageKitError::NotFound(_))));
    }

    #[test]
    fn test_failed_update_keeps_old_labels_and_fields() {
        let fx = setup();
        let ids = labels(&fx, &["a", "b"]);
        let page = create_page(&fx.conn, &new_page_with_labels("P", Some(ids.clone())), &context(&fx.project)).unwrap();

        let patch = PagePatch {
            name: Some("Renamed".to_string()),
            labels: Some(vec![ids[0].clone(), ids[0].clone()]),
            ..PagePatch::default()
        };
        let result = update_page(&fx.conn, &page.id, &patch, "bob");
        assert!(matches!(result, Err(PageKitError::Db(_))));

        assert_eq!(get_label_ids(&fx.conn, &page.id).unwrap(), ids);
        assert_eq!(get_page(&fx.conn, &page.id).unwrap().name, "P");
    }

    #[test]
    fn test_label_ids_follow_label_sort_order() {
        let fx = setup();
        let late = create_label(&fx.conn, &fx.project.id, "late", "", Some(10.0)).unwrap();
        let early = create_label(&fx.conn, &fx.project.id, "early", "", Some(1.0)).unwrap();
        let page = create_page(
            &fx.conn,
            &new_page_with_labels("P", Some(vec![late.id.clone(), early.id.clone()])),
            &context(&fx.project),
        )
        .unwrap();

        assert_eq!(get_label_ids(&fx.conn, &page.id).unwrap(), vec![early.id, late.id]);
    }

    #[test]
    fn test_list_pages_filters() {
        let fx = setup();
        let ids = labels(&fx, &["a"]);
        let labelled = create_page(&fx.conn, &new_page_with_labels("L", Some(ids.clone())), &context(&fx.project)).unwrap();
        let archived = create_page(
            &fx.conn,
            &NewPage {
                archived_at: Some("2026-01-01".to_string()),
                ..NewPage::named("Old")
            },
            &context(&fx.project),
        )
        .unwrap();
        let other_owner = create_page(
            &fx.conn,
            &NewPage::named("Bob's"),
            &PageContext {
                owned_by_id: "bob".to_string(),
                ..context(&fx.project)
            },
        )
        .unwrap();

        let by_label = list_pages(
            &fx.conn,
            &PageFilters {
                label_id: Some(ids[0].clone()),
                ..PageFilters::default()
            },
        )
        .unwrap();
        assert_eq!(by_label.len(), 1);
        assert_eq!(by_label[0].id, labelled.id);

        let only_archived = list_pages(
            &fx.conn,
            &PageFilters {
                archived: Some(true),
                ..PageFilters::default()
            },
        )
        .unwrap();
        assert_eq!(only_archived.len(), 1);
        assert_eq!(only_archived[0].id, archived.id);

        let by_owner = list_pages(
            &fx.conn,
            &PageFilters {
                project_id: Some(fx.project.id.clone()),
                owned_by: Some("bob".to_string()),
                ..PageFilters::default()
            },
        )
        .unwrap();
        assert_eq!(by_owner.len(), 1);
        assert_eq!(by_owner[0].id, other_owner.id);

        let active = list_pages(
            &fx.conn,
            &PageFilters {
                archived: Some(false),
                ..PageFilters::default()
            },
        )
        .unwrap();
        assert_eq!(active.len(), 2);
    }

    #[test]
    fn test_archive_and_unarchive_cover_descendants() {
        let fx = setup();
        let root = create_page(&fx.conn, &NewPage::named("Root"), &context(&fx.project)).unwrap();
        let child = create_page(
            &fx.conn,
            &NewPage {
                parent: Some(root.id.clone()),
                ..NewPage::named("Child")
            },
            &context(&fx.project),
        )
        .unwrap();
        let grandchild = create_page(
            &fx.conn,
            &NewPage {
                parent: Some(child.id.clone()),
                ..NewPage::named("Grandchild")
            },
            &context(&fx.project),
        )
        .unwrap();

        let archived = archive_page(&fx.conn, &root.id, "bob").unwrap();
        assert!(archived.archived_at.is_some());
        assert!(get_page(&fx.conn, &grandchild.id).unwrap().archived_at.is_some());

        // Restoring a child under an archived root detaches it.
        let restored = unarchive_page(&fx.conn, &child.id, "bob").unwrap();
        assert_eq!(restored.archived_at, None);
        assert_eq!(restored.parent_id, None);
        assert_eq!(get_page(&fx.conn, &grandchild.id).unwrap().archived_at, None);
        assert!(get_page(&fx.conn, &root.id).unwrap().archived_at.is_some());
    }

    #[test]
    fn test_favorites() {
        let fx = setup();
        let page = create_page(&fx.conn, &NewPage::named("P"), &context(&fx.project)).unwrap();

        assert!(!is_favorite(&fx.conn, &page.id, "alice").unwrap());
        add_favorite(&fx.conn, "alice", &page.id).unwrap();
        add_favorite(&fx.conn, "alice", &page.id).expect("Second favorite should be a no-op");
        assert!(is_favorite(&fx.conn, &page.id, "alice").unwrap());
        assert!(!is_favorite(&fx.conn, &page.id, "bob").unwrap());

        remove_favorite(&fx.conn, "alice", &page.id).unwrap();
        assert!(!is_favorite(&fx.conn, &page.id, "alice").unwrap());
    }

    #[test]
    fn test_page_logs_inherit_scope_from_page() {
        let fx = setup();
        let page = create_page(&fx.conn, &NewPage::named("P"), &context(&fx.project)).unwrap();
        let target = create_page(&fx.conn, &NewPage::named("T"), &context(&fx.project)).unwrap();

        let log = create_page_log(&fx.conn, &page.id, EntityKind::ForwardLink, Some(&target.id), "alice").unwrap();
        assert_eq!(log.workspace_id, page.workspace_id);
        assert_eq!(log.project_id, page.project_id);

        let stored = get_page_log(&fx.conn, &log.id).unwrap();
        assert_eq!(stored, log);
    }

    #[test]
    fn test_list_sub_page_logs_only_returns_links() {
        let fx = setup();
        let page = create_page(&fx.conn, &NewPage::named("P"), &context(&fx.project)).unwrap();

        create_page_log(&fx.conn, &page.id, EntityKind::ForwardLink, Some("x"), "alice").unwrap();
        create_page_log(&fx.conn, &page.id, EntityKind::Issue, Some("y"), "alice").unwrap();
        create_page_log(&fx.conn, &page.id, EntityKind::BackLink, Some("z"), "alice").unwrap();

        assert_eq!(list_page_logs(&fx.conn, &page.id).unwrap().len(), 3);
        let links = list_sub_page_logs(&fx.conn, &page.id).unwrap();
        assert_eq!(links.len(), 2);
        assert!(links.iter().all(|l| l.entity_name.is_page_link()));
    }

    #[test]
    fn test_get_page_log_not_found() {
        let fx = setup();
        assert!(matches!(get_page_log(&fx.conn, "missing"), Err(PageKitError::NotFound(_))));
    }

    #[test]
    fn test_workspace_and_labels_listing() {
        let fx = setup();
        let ws = get_workspace_by_slug(&fx.conn, "acme").unwrap();
        assert_eq!(ws.id, fx.project.workspace_id);
        assert!(matches!(get_workspace_by_slug(&fx.conn, "none"), Err(PageKitError::NotFound(_))));
        assert_eq!(list_workspaces(&fx.conn).unwrap().len(), 1);

        labels(&fx, &["b", "a"]);
        let listed: Vec<String> = list_labels(&fx.conn, &fx.project.id)
            .unwrap()
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(listed, vec!["b".to_string(), "a".to_string()]);
    }
}
