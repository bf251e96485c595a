//! Remote browser abstraction.
//!
//! The pipeline only talks to these traits. [`cdp`] implements them over a
//! remote Chrome DevTools endpoint; tests drive the same code through an
//! in-memory page model.

#[cfg(feature = "browser")]
pub mod cdp;
pub mod connect;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BrowserError;
use crate::session::credentials::SessionCookie;

/// Result type for driver calls.
pub type BrowserResult<T> = std::result::Result<T, BrowserError>;

/// Browsing context a session runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextHandle {
    /// The remote already had a page open; reuse its default context.
    Shared,
    /// A context created for this invocation, disposed at teardown.
    Owned(String),
}

/// Header texts plus raw cell texts of one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Where a card's label and value live, relative to each `item` match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardQuery {
    pub item: &'static str,
    /// Label inside the item; `None` takes the item's own text.
    pub label: Option<&'static str>,
    /// Fall back to the item's previous sibling when the label is empty.
    pub label_from_previous: bool,
    pub value: &'static str,
    /// Ancestors to climb from the item before looking up `value`.
    pub value_scope: u8,
}

/// Opens connections to a remote browser endpoint.
#[async_trait]
pub trait BrowserConnector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> BrowserResult<Box<dyn RemoteBrowser>>;
}

/// An open connection to a remote browser.
#[async_trait]
pub trait RemoteBrowser: Send + Sync {
    /// Reuse the existing context if a page target exists, otherwise create one.
    async fn open_context(&self) -> BrowserResult<ContextHandle>;

    async fn add_cookies(
        &self,
        context: &ContextHandle,
        cookies: &[SessionCookie],
    ) -> BrowserResult<()>;

    async fn new_page(&self, context: &ContextHandle) -> BrowserResult<Box<dyn PageDriver>>;

    /// Dispose an owned context. Shared contexts are left alone.
    async fn close_context(&self, context: ContextHandle) -> BrowserResult<()>;

    async fn close(self: Box<Self>) -> BrowserResult<()>;
}

/// DOM-level operations on one page.
///
/// Selectors are CSS selector lists. Element indices refer to the order of
/// `querySelectorAll(selector)`, visible or not.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn goto(&self, url: &str) -> BrowserResult<()>;

    /// Current `document.readyState`.
    async fn ready_state(&self) -> BrowserResult<String>;

    /// Indices of matching elements that are rendered with a non-empty box.
    async fn visible_indices(&self, selector: &str) -> BrowserResult<Vec<usize>>;

    async fn is_visible(&self, selector: &str) -> BrowserResult<bool> {
        Ok(!self.visible_indices(selector).await?.is_empty())
    }

    async fn click(&self, selector: &str, index: usize) -> BrowserResult<()>;

    /// Focus, select all and type `text` with real key events.
    async fn fill_text(&self, selector: &str, index: usize, text: &str) -> BrowserResult<()>;

    /// Assign through the native value setter, then dispatch bubbling
    /// `input` and `change` events.
    async fn set_value(&self, selector: &str, index: usize, text: &str) -> BrowserResult<()>;

    async fn press_key(&self, key: &str) -> BrowserResult<()>;

    /// Trimmed text of every visible match.
    async fn texts(&self, selector: &str) -> BrowserResult<Vec<String>>;

    /// Click the `nth` visible match whose trimmed text equals `text`.
    /// Returns false when there is no such element.
    async fn click_text(&self, selector: &str, text: &str, nth: usize) -> BrowserResult<bool>;

    /// Read the first table matching `selector`, up to `max_rows` body rows.
    async fn read_table(&self, selector: &str, max_rows: usize)
        -> BrowserResult<Option<RawTable>>;

    /// Non-empty (label, value) text pairs, one per `query.item` match.
    async fn label_values(&self, query: &CardQuery) -> BrowserResult<Vec<(String, String)>>;

    /// Text of the block around the innermost element whose text contains
    /// `needle` (case-insensitive), if any.
    async fn block_text(&self, needle: &str) -> BrowserResult<Option<String>>;

    async fn content(&self) -> BrowserResult<String>;

    async fn title(&self) -> BrowserResult<String>;

    async fn url(&self) -> BrowserResult<String>;

    async fn close(self: Box<Self>) -> BrowserResult<()>;
}
