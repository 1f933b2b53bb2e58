//! Cursor pagination over the published feed.
//!
//! Order is `(updated_at DESC, id DESC)`. A cursor names the last row a
//! client has seen as `"<updatedAtUnixMillis>_<id>"`; the next page holds the
//! rows strictly after it in that order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use utoipa::{IntoParams, ToSchema};

use crate::models::{Blog, Id};

pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub updated_at_millis: i64,
    pub id: Id,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("malformed cursor")]
pub struct CursorError;

impl Cursor {
    pub fn of(blog: &Blog) -> Self {
        Cursor { updated_at_millis: blog.updated_at.timestamp_millis(), id: blog.id }
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        // decode rejects out-of-range millis, so this only falls back for hand-built cursors
        DateTime::from_timestamp_millis(self.updated_at_millis).unwrap_or_default()
    }

    /// True when `blog` sorts strictly after this cursor: older, or equally old
    /// with a smaller id.
    pub fn admits(&self, blog: &Blog) -> bool {
        let ts = blog.updated_at.timestamp_millis();
        ts < self.updated_at_millis || (ts == self.updated_at_millis && blog.id < self.id)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.updated_at_millis, self.id)
    }
}

impl FromStr for Cursor {
    type Err = CursorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ts, id) = s.split_once('_').ok_or(CursorError)?;
        let updated_at_millis: i64 = ts.parse().map_err(|_| CursorError)?;
        DateTime::from_timestamp_millis(updated_at_millis).ok_or(CursorError)?;
        let id = Id::parse_str(id).map_err(|_| CursorError)?;
        Ok(Cursor { updated_at_millis, id })
    }
}

/// Feed ordering: newest first, id descending on ties.
pub fn feed_order(a: &Blog, b: &Blog) -> Ordering {
    b.updated_at
        .timestamp_millis()
        .cmp(&a.updated_at.timestamp_millis())
        .then_with(|| b.id.cmp(&a.id))
}

/// Case-insensitive substring match on the title.
pub fn title_matches(blog: &Blog, text: Option<&str>) -> bool {
    match text {
        Some(t) => blog.title.to_lowercase().contains(&t.to_lowercase()),
        None => true,
    }
}

/// What a repository needs to fetch one feed window.
#[derive(Debug, Clone, Default)]
pub struct FeedFilter {
    pub text: Option<String>,
    pub after: Option<Cursor>,
    /// Rows to fetch; the caller asks for one more than it returns.
    pub fetch: i64,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FeedParams {
    /// Page size, 1-50 (default 10).
    pub limit: Option<i64>,
    /// `endCursor` of the previous page.
    pub after: Option<String>,
    /// Case-insensitive title filter.
    pub query: Option<String>,
}

impl FeedParams {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn text(&self) -> Option<String> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string)
    }

    pub fn cursor(&self) -> Result<Option<Cursor>, CursorError> {
        match self.after.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => raw.parse().map(Some),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BlogEdge {
    pub cursor: String,
    pub node: Blog,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BlogFeed {
    pub edges: Vec<BlogEdge>,
    pub total: i64,
    pub page_info: PageInfo,
}

/// Assemble a page from `limit + 1` fetched rows. The extra row only decides
/// `has_next_page`; `end_cursor` comes from the last row returned.
pub fn assemble_page(mut rows: Vec<Blog>, limit: i64, total: i64) -> BlogFeed {
    let limit = limit.max(0) as usize;
    let has_next_page = rows.len() > limit;
    rows.truncate(limit);
    let edges: Vec<BlogEdge> = rows
        .into_iter()
        .map(|node| BlogEdge { cursor: Cursor::of(&node).to_string(), node })
        .collect();
    let end_cursor = edges.last().map(|e| e.cursor.clone());
    BlogFeed { edges, total, page_info: PageInfo { has_next_page, end_cursor } }
}
