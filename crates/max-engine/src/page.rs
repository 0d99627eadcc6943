// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cursor-based pagination shared by every [`crate::Engine`] query.

use serde::{Deserialize, Serialize};

/// A page request: how many items to return, and where to resume from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    /// Opaque cursor returned by a previous page's `next_cursor`. `None`
    /// starts from the beginning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    /// Maximum number of items to return.
    pub limit: usize,
}

impl PageRequest {
    /// A first-page request for up to `limit` items.
    #[must_use]
    pub fn first(limit: usize) -> Self {
        Self { cursor: None, limit }
    }
}

/// One page of results plus a cursor for fetching the next page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// The items on this page, at most `request.limit` long.
    pub items: Vec<T>,
    /// Cursor to pass as the next request's `cursor`, if more items remain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    /// Build a page from an over-fetched slice (`limit + 1` items) plus the
    /// function used to derive a cursor from the last returned item. This
    /// is the standard "fetch one extra row to detect more-pages" pattern:
    /// if `overfetched` has more than `limit` items, the last one is
    /// dropped and used only to produce `next_cursor`.
    pub fn from_overfetch(mut overfetched: Vec<T>, limit: usize, cursor_of: impl Fn(&T) -> String) -> Self {
        if overfetched.len() > limit {
            overfetched.truncate(limit);
            let next_cursor = overfetched.last().map(cursor_of);
            Page {
                items: overfetched,
                next_cursor,
            }
        } else {
            Page {
                items: overfetched,
                next_cursor: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overfetch_under_limit_has_no_next_cursor() {
        let page = Page::from_overfetch(vec![1, 2], 5, |n| n.to_string());
        assert_eq!(page.items, vec![1, 2]);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn overfetch_at_limit_plus_one_truncates_and_sets_cursor() {
        let page = Page::from_overfetch(vec![1, 2, 3], 2, |n| n.to_string());
        assert_eq!(page.items, vec![1, 2]);
        assert_eq!(page.next_cursor, Some("2".to_string()));
    }

    #[test]
    fn page_request_first_has_no_cursor() {
        let req = PageRequest::first(10);
        assert!(req.cursor.is_none());
        assert_eq!(req.limit, 10);
    }
}
