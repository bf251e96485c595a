//! Chrome DevTools Protocol driver backed by chromiumoxide.
//!
//! Every call is bounded by an explicit timeout; navigation gets its own,
//! longer one. DOM queries run as small scripts so a whole selector list is
//! evaluated in one round-trip.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::input::{DispatchKeyEventParams, DispatchKeyEventType};
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, CookieSameSite, TimeSinceEpoch};
use chromiumoxide::cdp::browser_protocol::security::SetIgnoreCertificateErrorsParams;
use chromiumoxide::cdp::browser_protocol::storage::SetCookiesParams;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{
    BrowserConnector, BrowserResult, CardQuery, ContextHandle, PageDriver, RawTable, RemoteBrowser,
};
use crate::config::Timeouts;
use crate::error::BrowserError;
use crate::session::credentials::{SameSite, SessionCookie};

fn cdp_error(err: CdpError) -> BrowserError {
    BrowserError::from_message(err.to_string())
}

async fn bounded<T, F>(action: &str, limit: Duration, work: F) -> BrowserResult<T>
where
    F: Future<Output = Result<T, CdpError>>,
{
    match tokio::time::timeout(limit, work).await {
        Ok(result) => result.map_err(cdp_error),
        Err(_) => Err(BrowserError::Timeout {
            action: action.to_string(),
            timeout_ms: limit.as_millis() as u64,
        }),
    }
}

/// JSON-encode a value for splicing into a script.
fn js(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

const VISIBLE_FN: &str = r#"function __visible(el) {
  const r = el.getBoundingClientRect();
  const s = window.getComputedStyle(el);
  return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none';
}"#;

/// Connects to a remote browser over a WebSocket endpoint.
pub struct CdpConnector {
    timeouts: Timeouts,
}

impl CdpConnector {
    pub fn new(timeouts: Timeouts) -> Self {
        Self { timeouts }
    }
}

#[async_trait]
impl BrowserConnector for CdpConnector {
    async fn connect(&self, endpoint: &str) -> BrowserResult<Box<dyn RemoteBrowser>> {
        let (browser, mut handler) = Browser::connect(endpoint.to_string())
            .await
            .map_err(|e| BrowserError::Connect(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler event error: {}", e);
                }
            }
        });

        Ok(Box::new(CdpBrowser {
            browser: Mutex::new(browser),
            handler_task,
            timeouts: self.timeouts.clone(),
        }))
    }
}

/// An open CDP connection.
pub struct CdpBrowser {
    browser: Mutex<Browser>,
    handler_task: JoinHandle<()>,
    timeouts: Timeouts,
}

fn same_site(policy: SameSite) -> CookieSameSite {
    match policy {
        SameSite::Strict => CookieSameSite::Strict,
        SameSite::Lax => CookieSameSite::Lax,
        SameSite::None => CookieSameSite::None,
    }
}

fn cookie_param(cookie: &SessionCookie) -> CookieParam {
    let mut param = CookieParam::new(cookie.name.clone(), cookie.value.clone());
    param.domain = Some(cookie.domain.clone());
    param.path = Some(cookie.path.clone());
    param.secure = Some(cookie.secure);
    param.http_only = Some(cookie.http_only);
    param.same_site = Some(same_site(cookie.same_site));
    param.expires = cookie.expires.map(TimeSinceEpoch::new);
    param
}

#[async_trait]
impl RemoteBrowser for CdpBrowser {
    async fn open_context(&self) -> BrowserResult<ContextHandle> {
        let limit = self.timeouts.action;
        let mut browser = self.browser.lock().await;

        let targets = bounded("fetch targets", limit, browser.fetch_targets()).await?;
        if targets.iter().any(|t| t.r#type == "page") {
            debug!("Reusing existing browser context");
            return Ok(ContextHandle::Shared);
        }

        let created = bounded(
            "create context",
            limit,
            browser.execute(CreateBrowserContextParams::default()),
        )
        .await?;
        let id = created.result.browser_context_id.inner().clone();

        if let Err(e) = bounded(
            "ignore certificate errors",
            limit,
            browser.execute(SetIgnoreCertificateErrorsParams::new(true)),
        )
        .await
        {
            warn!("Could not disable certificate checks: {}", e);
        }

        debug!(context = %id, "Created browser context");
        Ok(ContextHandle::Owned(id))
    }

    async fn add_cookies(
        &self,
        context: &ContextHandle,
        cookies: &[SessionCookie],
    ) -> BrowserResult<()> {
        let mut params = SetCookiesParams::new(cookies.iter().map(cookie_param).collect());
        if let ContextHandle::Owned(id) = context {
            params.browser_context_id = Some(BrowserContextId::new(id.clone()));
        }
        let browser = self.browser.lock().await;
        bounded("set cookies", self.timeouts.action, browser.execute(params)).await?;
        Ok(())
    }

    async fn new_page(&self, context: &ContextHandle) -> BrowserResult<Box<dyn PageDriver>> {
        let mut builder = CreateTargetParams::builder().url("about:blank");
        if let ContextHandle::Owned(id) = context {
            builder = builder.browser_context_id(BrowserContextId::new(id.clone()));
        }
        let params = builder.build().map_err(BrowserError::Protocol)?;

        let browser = self.browser.lock().await;
        let page = bounded("new page", self.timeouts.action, browser.new_page(params)).await?;
        Ok(Box::new(CdpPage {
            page,
            timeouts: self.timeouts.clone(),
        }))
    }

    async fn close_context(&self, context: ContextHandle) -> BrowserResult<()> {
        let ContextHandle::Owned(id) = context else {
            return Ok(());
        };
        let browser = self.browser.lock().await;
        bounded(
            "dispose context",
            self.timeouts.action,
            browser.execute(DisposeBrowserContextParams::new(BrowserContextId::new(id))),
        )
        .await?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> BrowserResult<()> {
        let CdpBrowser {
            browser,
            handler_task,
            timeouts,
        } = *self;
        let mut browser = browser.into_inner();
        let result = bounded("close browser", timeouts.action, browser.close())
            .await
            .map(|_| ());
        handler_task.abort();
        result
    }
}

/// One page of a CDP session.
pub struct CdpPage {
    page: Page,
    timeouts: Timeouts,
}

#[derive(Debug, Deserialize)]
struct TableScan {
    found: bool,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CdpPage {
    async fn eval<T: serde::de::DeserializeOwned>(
        &self,
        action: &str,
        script: String,
    ) -> BrowserResult<T> {
        let result = bounded(action, self.timeouts.action, self.page.evaluate(script)).await?;
        result
            .into_value::<T>()
            .map_err(|e| BrowserError::Protocol(format!("{}: {}", action, e)))
    }

    async fn element(
        &self,
        selector: &str,
        index: usize,
    ) -> BrowserResult<chromiumoxide::element::Element> {
        let mut elements =
            bounded("find elements", self.timeouts.action, self.page.find_elements(selector))
                .await?;
        if index >= elements.len() {
            return Err(BrowserError::NotInteractable(format!(
                "no element #{} for {}",
                index, selector
            )));
        }
        Ok(elements.swap_remove(index))
    }

    async fn key_event(&self, kind: DispatchKeyEventType, key: &str) -> BrowserResult<()> {
        let mut builder = DispatchKeyEventParams::builder()
            .r#type(kind.clone())
            .key(key.to_string())
            .code(key.to_string());
        if key == "Enter" {
            builder = builder.windows_virtual_key_code(13).native_virtual_key_code(13);
            if kind == DispatchKeyEventType::KeyDown {
                builder = builder.text("\r");
            }
        }
        let params = builder.build().map_err(BrowserError::Protocol)?;
        bounded("dispatch key", self.timeouts.action, self.page.execute(params)).await?;
        Ok(())
    }
}

#[async_trait]
impl PageDriver for CdpPage {
    async fn goto(&self, url: &str) -> BrowserResult<()> {
        bounded("navigate", self.timeouts.navigation, self.page.goto(url)).await?;
        Ok(())
    }

    async fn ready_state(&self) -> BrowserResult<String> {
        self.eval("ready state", "document.readyState".to_string())
            .await
    }

    async fn visible_indices(&self, selector: &str) -> BrowserResult<Vec<usize>> {
        let script = format!(
            "(() => {{ {VISIBLE_FN}
              const out = [];
              document.querySelectorAll({sel}).forEach((el, i) => {{ if (__visible(el)) out.push(i); }});
              return out; }})()",
            sel = js(selector)
        );
        self.eval("query visible", script).await
    }

    async fn click(&self, selector: &str, index: usize) -> BrowserResult<()> {
        let element = self.element(selector, index).await?;
        bounded("click", self.timeouts.action, element.click()).await?;
        Ok(())
    }

    async fn fill_text(&self, selector: &str, index: usize, text: &str) -> BrowserResult<()> {
        let element = self.element(selector, index).await?;
        bounded("focus input", self.timeouts.action, element.click()).await?;
        bounded(
            "select input",
            self.timeouts.action,
            element.call_js_fn(
                "function() { this.focus(); if (this.select) this.select(); }",
                false,
            ),
        )
        .await?;
        bounded("type", self.timeouts.action, element.type_str(text)).await?;
        Ok(())
    }

    async fn set_value(&self, selector: &str, index: usize, text: &str) -> BrowserResult<()> {
        let script = format!(
            "(() => {{
              const el = document.querySelectorAll({sel})[{index}];
              if (!el) return false;
              const proto = el instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
              const setter = Object.getOwnPropertyDescriptor(proto, 'value').set;
              setter.call(el, {val});
              el.dispatchEvent(new Event('input', {{ bubbles: true }}));
              el.dispatchEvent(new Event('change', {{ bubbles: true }}));
              return true; }})()",
            sel = js(selector),
            val = js(text),
        );
        if self.eval::<bool>("set value", script).await? {
            Ok(())
        } else {
            Err(BrowserError::NotInteractable(format!(
                "no element #{} for {}",
                index, selector
            )))
        }
    }

    async fn press_key(&self, key: &str) -> BrowserResult<()> {
        self.key_event(DispatchKeyEventType::KeyDown, key).await?;
        self.key_event(DispatchKeyEventType::KeyUp, key).await
    }

    async fn texts(&self, selector: &str) -> BrowserResult<Vec<String>> {
        let script = format!(
            "(() => {{ {VISIBLE_FN}
              return Array.from(document.querySelectorAll({sel}))
                .filter(__visible)
                .map(el => (el.innerText || el.textContent || '').trim()); }})()",
            sel = js(selector)
        );
        self.eval("read texts", script).await
    }

    async fn click_text(&self, selector: &str, text: &str, nth: usize) -> BrowserResult<bool> {
        let script = format!(
            "(() => {{ {VISIBLE_FN}
              const hits = Array.from(document.querySelectorAll({sel}))
                .filter(el => __visible(el) && (el.textContent || '').trim() === {text});
              const el = hits[{nth}];
              if (!el) return false;
              el.click();
              return true; }})()",
            sel = js(selector),
            text = js(text),
        );
        self.eval("click text", script).await
    }

    async fn read_table(
        &self,
        selector: &str,
        max_rows: usize,
    ) -> BrowserResult<Option<RawTable>> {
        let script = format!(
            "(() => {{
              const root = document.querySelector({sel});
              if (!root) return {{ found: false, headers: [], rows: [] }};
              const text = el => (el.innerText || el.textContent || '').trim();
              const headers = Array.from(root.querySelectorAll('thead th')).map(text);
              const rows = Array.from(root.querySelectorAll('tbody tr'))
                .filter(tr => !['ant-table-measure-row', 'ant-table-placeholder', 'ant-table-expanded-row']
                  .some(c => tr.classList.contains(c)))
                .slice(0, {max_rows})
                .map(tr => Array.from(tr.querySelectorAll('td')).map(text));
              return {{ found: true, headers, rows }}; }})()",
            sel = js(selector),
        );
        let scan: TableScan = self.eval("read table", script).await?;
        Ok(scan.found.then_some(RawTable {
            headers: scan.headers,
            rows: scan.rows,
        }))
    }

    async fn label_values(&self, query: &CardQuery) -> BrowserResult<Vec<(String, String)>> {
        let script = format!(
            "(() => {{
              const text = el => el ? (el.innerText || el.textContent || '').trim() : '';
              const up = (el, n) => {{ let cur = el; for (let i = 0; i < n && cur; i++) cur = cur.parentElement; return cur; }};
              const labelSel = {label};
              return Array.from(document.querySelectorAll({item}))
                .map(el => {{
                  let label = labelSel === null ? text(el) : text(el.querySelector(labelSel));
                  if (!label && {previous}) label = text(el.previousElementSibling);
                  const root = up(el, {scope});
                  return [label, root ? text(root.querySelector({value})) : ''];
                }})
                .filter(([l, v]) => l && v); }})()",
            item = js(query.item),
            label = query.label.map(js).unwrap_or_else(|| "null".to_string()),
            previous = query.label_from_previous,
            scope = query.value_scope,
            value = js(query.value),
        );
        self.eval("read cards", script).await
    }

    async fn block_text(&self, needle: &str) -> BrowserResult<Option<String>> {
        let script = format!(
            "(() => {{
              const needle = {needle};
              const has = el => !['SCRIPT', 'STYLE'].includes(el.tagName)
                && (el.textContent || '').toLowerCase().includes(needle);
              const hits = document.body ? Array.from(document.body.querySelectorAll('*')).filter(has) : [];
              const inner = hits.find(el => !Array.from(el.children).some(has));
              if (!inner) return null;
              const block = inner.closest('.ant-card, .ant-statistic, .ant-col, .ant-typography, div') || inner;
              return (block.textContent || '').trim(); }})()",
            needle = js(&needle.to_lowercase()),
        );
        self.eval("read block", script).await
    }

    async fn content(&self) -> BrowserResult<String> {
        bounded("read content", self.timeouts.action, self.page.content()).await
    }

    async fn title(&self) -> BrowserResult<String> {
        Ok(
            bounded("read title", self.timeouts.action, self.page.get_title())
                .await?
                .unwrap_or_default(),
        )
    }

    async fn url(&self) -> BrowserResult<String> {
        Ok(bounded("read url", self.timeouts.action, self.page.url())
            .await?
            .unwrap_or_default())
    }

    async fn close(self: Box<Self>) -> BrowserResult<()> {
        let CdpPage { page, timeouts } = *self;
        bounded("close page", timeouts.action, page.close()).await
    }
}
