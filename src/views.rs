//! Outbound representations of pages and page logs.
//!
//! Views are built from stored records at the moment they are serialized.
//! A page's `labels` field is always read from `page_labels` here, never
//! carried over from whatever the last write sent.

use crate::db::PageKitError;
use crate::models::{LinkTarget, Page, PageAccess, PageLog};
use crate::repo;
use rusqlite::Connection;
use serde::Serialize;

/// The external shape of a page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageView {
    pub id: String,
    pub name: String,
    pub owned_by: String,
    pub access: PageAccess,
    pub color: String,
    /// Ids of the associated labels.
    pub labels: Vec<String>,
    pub parent: Option<String>,
    pub is_favorite: bool,
    pub is_locked: bool,
    pub archived_at: Option<String>,
    pub workspace: String,
    pub project: String,
    pub created_at: String,
    pub updated_at: String,
    pub created_by: String,
    pub updated_by: String,
    pub view_props: serde_json::Value,
}

/// A page view plus its rendered HTML body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageDetailView {
    #[serde(flatten)]
    pub page: PageView,
    pub description_html: String,
}

/// A log entry plus the page it links to, if any.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubPageView {
    #[serde(flatten)]
    pub log: PageLog,
    pub entity_details: Option<PageView>,
}

/// Builds the outbound shape of `page`. `is_favorite` is caller-specific and
/// comes from outside.
pub fn page_view(conn: &Connection, page: &Page, is_favorite: bool) -> Result<PageView, PageKitError> {
    let labels = repo::get_label_ids(conn, &page.id)?;

    Ok(PageView {
        id: page.id.clone(),
        name: page.name.clone(),
        owned_by: page.owned_by.clone(),
        access: page.access,
        color: page.color.clone(),
        labels,
        parent: page.parent_id.clone(),
        is_favorite,
        is_locked: page.is_locked,
        archived_at: page.archived_at.clone(),
        workspace: page.workspace_id.clone(),
        project: page.project_id.clone(),
        created_at: page.created_at.clone(),
        updated_at: page.updated_at.clone(),
        created_by: page.created_by.clone(),
        updated_by: page.updated_by.clone(),
        view_props: page.view_props.clone(),
    })
}

/// [`page_view`] with `is_favorite` looked up for `viewer`.
pub fn page_view_for(conn: &Connection, page: &Page, viewer: &str) -> Result<PageView, PageKitError> {
    let favorite = repo::is_favorite(conn, &page.id, viewer)?;
    page_view(conn, page, favorite)
}

pub fn page_detail_view(
    conn: &Connection,
    page: &Page,
    is_favorite: bool,
) -> Result<PageDetailView, PageKitError> {
    Ok(PageDetailView {
        page: page_view(conn, page, is_favorite)?,
        description_html: page.description_html.clone(),
    })
}

/// Resolves what a log entry points at.
///
/// Forward and back links resolve to the linked page's view. A link to a page
/// that no longer exists, and every other kind of entry, resolve to `None`.
pub fn entity_details(conn: &Connection, log: &PageLog) -> Result<Option<PageView>, PageKitError> {
    match log.link_target() {
        LinkTarget::Page(page_id) => match repo::find_page(conn, page_id)? {
            Some(page) => Ok(Some(page_view(conn, &page, false)?)),
            None => Ok(None),
        },
        LinkTarget::Unresolved => Ok(None),
    }
}

pub fn sub_page_view(conn: &Connection, log: &PageLog) -> Result<SubPageView, PageKitError> {
    Ok(SubPageView {
        entity_details: entity_details(conn, log)?,
        log: log.clone(),
    })
}

pub fn sub_page_views(conn: &Connection, logs: &[PageLog]) -> Result<Vec<SubPageView>, PageKitError> {
    logs.iter().map(|log| sub_page_view(conn, log)).collect()
}
