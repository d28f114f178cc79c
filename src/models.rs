//! Core data structures for pages, labels and the page link log.
//!
//! Stored records (`Page`, `Label`, `PageLog`, ...) mirror table rows. Inbound
//! payloads (`NewPage`, `PagePatch`) are what callers send; they never carry
//! the read-only fields (workspace, project, owner), so those are silently
//! dropped when present in the JSON.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A workspace. Owns projects; every page and label inherits its workspace
/// from its project.
#[derive(Debug, Clone, Serialize)]
pub struct Workspace {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Project {
    pub id: String,
    #[serde(rename = "workspace")]
    pub workspace_id: String,
    pub identifier: String,
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A tag scoped to a project. Pages reference labels by id.
#[derive(Debug, Clone, Serialize)]
pub struct Label {
    pub id: String,
    #[serde(rename = "workspace")]
    pub workspace_id: String,
    #[serde(rename = "project")]
    pub project_id: String,
    pub name: String,
    pub color: String,
    pub sort_order: f64,
    pub created_at: String,
    pub updated_at: String,
}

/// Who may see a page. Stored and serialized as `0` (public) / `1` (private).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum PageAccess {
    #[default]
    Public,
    Private,
}

impl PageAccess {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Public => 0,
            Self::Private => 1,
        }
    }

    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            0 => Some(Self::Public),
            1 => Some(Self::Private),
            _ => None,
        }
    }
}

impl From<PageAccess> for u8 {
    fn from(access: PageAccess) -> u8 {
        access.as_i64() as u8
    }
}

impl TryFrom<u8> for PageAccess {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Self::from_i64(i64::from(v)).ok_or_else(|| format!("\"{}\" is not a valid access level", v))
    }
}

impl std::fmt::Display for PageAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Public => f.write_str("public"),
            Self::Private => f.write_str("private"),
        }
    }
}

/// A stored page row.
///
/// Labels are deliberately absent: they live in `page_labels` and are read
/// at serialization time.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub id: String,
    pub name: String,
    pub description_html: String,
    pub owned_by: String,
    pub access: PageAccess,
    pub color: String,
    pub parent_id: Option<String>,
    pub is_locked: bool,
    /// Archival date as `YYYY-MM-DD`.
    pub archived_at: Option<String>,
    pub view_props: Value,
    pub workspace_id: String,
    pub project_id: String,
    pub created_by: String,
    pub updated_by: String,
    pub created_at: String,
    pub updated_at: String,
}

/// One page-to-label association. Project, workspace and audit actors are
/// copied from the page when the row is written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageLabel {
    pub id: String,
    pub page_id: String,
    pub label_id: String,
    pub project_id: String,
    pub workspace_id: String,
    pub created_by: String,
    pub updated_by: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Default view configuration for new pages.
pub fn default_view_props() -> Value {
    serde_json::json!({ "full_width": false })
}

/// Default HTML body for pages created without one.
pub const EMPTY_DESCRIPTION_HTML: &str = "<p></p>";

/// Inbound payload for page creation.
///
/// `labels` is tri-state: absent (`None`) skips association creation, while
/// `Some(vec![])` is an explicit empty set.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewPage {
    pub name: String,
    #[serde(default)]
    pub access: PageAccess,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default)]
    pub archived_at: Option<String>,
    #[serde(default = "default_view_props")]
    pub view_props: Value,
    #[serde(default)]
    pub labels: Option<Vec<String>>,
}

impl NewPage {
    /// A public, unlocked page with default view props and no labels field.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            access: PageAccess::Public,
            color: String::new(),
            parent: None,
            is_locked: false,
            archived_at: None,
            view_props: default_view_props(),
            labels: None,
        }
    }
}

/// Values the caller supplies alongside a create request. None of these can be
/// set through the inbound JSON.
#[derive(Debug, Clone)]
pub struct PageContext {
    pub project_id: String,
    pub owned_by_id: String,
    pub description_html: String,
}

/// Inbound payload for partial page updates.
///
/// `None` leaves a field untouched. For nullable columns (`parent`,
/// `archived_at`) the inner option distinguishes "set to null" from
/// "not sent".
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PagePatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub access: Option<PageAccess>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub parent: Option<Option<String>>,
    #[serde(default)]
    pub is_locked: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub archived_at: Option<Option<String>>,
    #[serde(default)]
    pub view_props: Option<Value>,
    #[serde(default)]
    pub description_html: Option<String>,
    #[serde(default)]
    pub labels: Option<Vec<String>>,
}

/// Maps a present JSON value (including `null`) to `Some(..)`; absence is
/// handled by `#[serde(default)]`.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// What a page-log entry refers to. Stored as `entity_name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    ToDo,
    Issue,
    Image,
    Video,
    File,
    Link,
    Cycle,
    Module,
    BackLink,
    ForwardLink,
    PageMention,
    UserMention,
}

impl EntityKind {
    pub const ALL: [EntityKind; 12] = [
        Self::ToDo,
        Self::Issue,
        Self::Image,
        Self::Video,
        Self::File,
        Self::Link,
        Self::Cycle,
        Self::Module,
        Self::BackLink,
        Self::ForwardLink,
        Self::PageMention,
        Self::UserMention,
    ];

    /// Parse the stored/CLI string. Returns None for unrecognized kinds.
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToDo => "to_do",
            Self::Issue => "issue",
            Self::Image => "image",
            Self::Video => "video",
            Self::File => "file",
            Self::Link => "link",
            Self::Cycle => "cycle",
            Self::Module => "module",
            Self::BackLink => "back_link",
            Self::ForwardLink => "forward_link",
            Self::PageMention => "page_mention",
            Self::UserMention => "user_mention",
        }
    }

    /// Forward and back links point at another page.
    pub fn is_page_link(&self) -> bool {
        matches!(self, Self::ForwardLink | Self::BackLink)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored page-log entry. Serialized field-for-field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageLog {
    pub id: String,
    pub transaction: String,
    #[serde(rename = "page")]
    pub page_id: String,
    pub entity_identifier: Option<String>,
    pub entity_name: EntityKind,
    #[serde(rename = "workspace")]
    pub workspace_id: String,
    #[serde(rename = "project")]
    pub project_id: String,
    pub created_at: String,
    pub updated_at: String,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
}

/// The resolvable target of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTarget<'a> {
    /// A forward/back link naming a page id.
    Page(&'a str),
    /// Any other kind, or a link with no identifier.
    Unresolved,
}

impl PageLog {
    pub fn link_target(&self) -> LinkTarget<'_> {
        match (self.entity_name.is_page_link(), self.entity_identifier.as_deref()) {
            (true, Some(id)) => LinkTarget::Page(id),
            _ => LinkTarget::Unresolved,
        }
    }
}
