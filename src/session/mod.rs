//! Per-invocation browser session.

pub mod credentials;

use tracing::{debug, warn};

use crate::browser::{ContextHandle, PageDriver, RemoteBrowser};
use crate::error::{BrowserError, Result};
use credentials::SessionCookie;

/// A connection, one browsing context and one page, owned by a single
/// invocation. Parts are filled in as provisioning progresses so teardown
/// can release whatever exists at the moment the invocation ends.
pub struct Session {
    browser: Box<dyn RemoteBrowser>,
    context: Option<ContextHandle>,
    page: Option<Box<dyn PageDriver>>,
}

impl Session {
    pub fn new(browser: Box<dyn RemoteBrowser>) -> Self {
        Self {
            browser,
            context: None,
            page: None,
        }
    }

    /// Open the context, install cookies and create the working page.
    pub async fn provision(&mut self, cookies: &[SessionCookie]) -> Result<()> {
        let context = self.browser.open_context().await?;
        self.context = Some(context.clone());

        self.browser.add_cookies(&context, cookies).await?;
        debug!(count = cookies.len(), "Installed session cookies");

        self.page = Some(self.browser.new_page(&context).await?);
        Ok(())
    }

    pub fn page(&self) -> Result<&dyn PageDriver> {
        self.page
            .as_deref()
            .ok_or_else(|| BrowserError::Protocol("session has no page".to_string()).into())
    }

    /// Close page, context and connection in that order. Each step is
    /// guarded on its own; failures are logged and swallowed.
    pub async fn teardown(self) {
        let Session {
            browser,
            context,
            page,
        } = self;

        if let Some(page) = page {
            if let Err(e) = page.close().await {
                warn!("Failed to close page: {}", e);
            }
        }
        if let Some(context) = context {
            if let Err(e) = browser.close_context(context).await {
                warn!("Failed to close browser context: {}", e);
            }
        }
        if let Err(e) = browser.close().await {
            warn!("Failed to close browser connection: {}", e);
        }
        debug!("Session released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{FakeConnector, FakePage};
    use crate::browser::BrowserConnector;

    fn cookie() -> SessionCookie {
        credentials::normalize_cookies(
            &[serde_json::json!({"name": "sid", "value": "1"})],
            "app.upseller.com",
        )
        .remove(0)
    }

    #[tokio::test]
    async fn test_provision_and_teardown_order() {
        let page = FakePage::dual_input(false);
        let connector = FakeConnector::new(page.clone());
        let browser = connector.connect("wss://x").await.unwrap();

        let mut session = Session::new(browser);
        session.provision(&[cookie()]).await.unwrap();
        assert!(session.page().is_ok());
        session.teardown().await;

        assert_eq!(
            page.log(),
            vec![
                "context:open",
                "cookies:1",
                "page:new",
                "page:close",
                "context:close",
                "browser:close"
            ]
        );
    }

    #[tokio::test]
    async fn test_shared_context_is_not_disposed() {
        let page = FakePage::dual_input(false);
        let connector = FakeConnector::new(page.clone()).reusing_existing_context();
        let mut session = Session::new(connector.connect("wss://x").await.unwrap());
        session.provision(&[cookie()]).await.unwrap();
        session.teardown().await;

        let log = page.log();
        assert!(log.contains(&"context:shared".to_string()));
        assert!(!log.contains(&"context:close".to_string()));
        assert_eq!(log.last().map(String::as_str), Some("browser:close"));
    }

    #[tokio::test]
    async fn test_failed_closes_do_not_stop_teardown() {
        let page = FakePage::dual_input(false).failing_close();
        let connector = FakeConnector::new(page.clone());
        let mut session = Session::new(connector.connect("wss://x").await.unwrap());
        session.provision(&[cookie()]).await.unwrap();
        session.teardown().await;

        let log = page.log();
        let tail: Vec<_> = log.iter().rev().take(3).rev().map(String::as_str).collect();
        assert_eq!(tail, vec!["page:close", "context:close", "browser:close"]);
    }

    #[tokio::test]
    async fn test_teardown_without_page() {
        let page = FakePage::dual_input(false);
        let connector = FakeConnector::new(page.clone());
        let session = Session::new(connector.connect("wss://x").await.unwrap());
        session.teardown().await;
        assert_eq!(page.log(), vec!["browser:close"]);
    }
}
