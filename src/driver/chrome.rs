//! eoka-backed driver: one stealth Chrome per session.

use super::{Driver, ElementHandle, Locator, Session};
use crate::config::BrowserConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use eoka::{Browser, Page};
use serde::Deserialize;
use tracing::debug;

/// Launches a new eoka browser for every session.
pub struct EokaDriver {
    config: BrowserConfig,
}

impl EokaDriver {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }

    fn stealth_config(&self) -> eoka::StealthConfig {
        eoka::StealthConfig {
            headless: self.config.headless,
            proxy: self.config.proxy.clone(),
            user_agent: self.config.user_agent.clone(),
            viewport_width: self.config.viewport.as_ref().map(|v| v.width).unwrap_or(1280),
            viewport_height: self.config.viewport.as_ref().map(|v| v.height).unwrap_or(720),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Driver for EokaDriver {
    async fn open(&self) -> Result<Box<dyn Session>> {
        debug!(
            "Launching browser (headless: {}, proxy: {:?})",
            self.config.headless, self.config.proxy
        );
        let browser = Browser::launch_with_config(self.stealth_config()).await?;
        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                // Don't leak the process when the first tab fails.
                let _ = browser.close().await;
                return Err(e.into());
            }
        };
        Ok(Box::new(EokaSession { browser, page }))
    }
}

/// A browser process and its single page.
pub struct EokaSession {
    browser: Browser,
    page: Page,
}

impl EokaSession {
    /// The underlying page, for callers that need more than the trait offers.
    pub fn page(&self) -> &Page {
        &self.page
    }
}

#[derive(Deserialize)]
struct Found {
    selector: String,
    tag: String,
    text: String,
}

/// Page-side resolver. Returns `{selector, tag, text}` for the first visible
/// element matching `(kind, value, name)`, or `null`.
const LOCATE_JS: &str = r#"
((kind, value, name) => {
    const lc = s => (s || '').toString().toLowerCase().replace(/\s+/g, ' ').trim();
    const want = lc(value);
    const wantName = lc(name);

    function selector(el) {
        if (el.id) return '#' + CSS.escape(el.id);
        const path = [];
        let n = el;
        while (n && n.nodeType === 1) {
            let s = n.tagName.toLowerCase();
            if (n.id) { path.unshift('#' + CSS.escape(n.id)); break; }
            const p = n.parentElement;
            if (p) {
                const sibs = [...p.children].filter(c => c.tagName === n.tagName);
                if (sibs.length > 1) s += ':nth-of-type(' + (sibs.indexOf(n) + 1) + ')';
            }
            path.unshift(s);
            n = p;
        }
        return path.join(' > ');
    }

    function visible(el) {
        const r = el.getBoundingClientRect();
        const s = getComputedStyle(el);
        return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none'
            && parseFloat(s.opacity || '1') > 0.05;
    }

    function enabled(el) {
        return !el.disabled && el.getAttribute('aria-disabled') !== 'true';
    }

    function label(el) {
        if (el.getAttribute('aria-label')) return el.getAttribute('aria-label');
        if (el.id) {
            const l = document.querySelector('label[for=' + JSON.stringify(el.id) + ']');
            if (l) return l.textContent;
        }
        const wrap = el.closest('label');
        if (wrap) return wrap.textContent;
        const by = el.getAttribute('aria-labelledby');
        if (by && document.getElementById(by)) return document.getElementById(by).textContent;
        return el.title || '';
    }

    function text(el) {
        return el.innerText || el.value || el.getAttribute('aria-label') || el.title || el.placeholder || '';
    }

    const TEXT_INPUT = 'textarea, input:not([type]), input[type="text"], input[type="search"], input[type="email"], input[type="password"], input[type="tel"], input[type="url"], input[type="number"], [contenteditable="true"], [role="textbox"], [role="searchbox"]';
    const INTERACTIVE = 'a, button, input, select, textarea, summary, [role="button"], [role="link"], [role="menuitem"], [role="tab"], [role="checkbox"], [onclick], [tabindex]';
    const IMPLICIT = {
        textbox: TEXT_INPUT,
        searchbox: 'input[type="search"], [role="searchbox"]',
        combobox: 'select, [role="combobox"], input[list]',
        button: 'button, input[type="submit"], input[type="button"], input[type="reset"], [role="button"]',
        link: 'a[href], [role="link"]',
        checkbox: 'input[type="checkbox"], [role="checkbox"]',
    };

    function all(sel) {
        try { return [...document.querySelectorAll(sel)]; } catch (e) { return []; }
    }
    const usable = els => els.filter(el => visible(el) && enabled(el));

    let el = null;
    switch (kind) {
        case 'css':
            el = usable(all(value))[0];
            break;
        case 'id':
            el = usable(all('[id]')).find(e => lc(e.id).replace(/[\s_-]/g, '').includes(want.replace(/[\s_-]/g, '')));
            break;
        case 'name':
            el = usable(all('[name]')).find(e => lc(e.getAttribute('name')).replace(/[\s_-]/g, '').includes(want.replace(/[\s_-]/g, '')));
            break;
        case 'placeholder':
            el = usable(all('[placeholder]')).find(e => lc(e.getAttribute('placeholder')).includes(want));
            break;
        case 'label':
            el = usable(all(INTERACTIVE)).find(e => lc(label(e)).includes(want));
            break;
        case 'text':
            el = usable(all(INTERACTIVE)).find(e => lc(text(e)) === want)
                || usable(all(INTERACTIVE)).find(e => lc(text(e)).includes(want));
            break;
        case 'visible_text': {
            const walker = document.createTreeWalker(document.body, NodeFilter.SHOW_ELEMENT, null);
            let best = null;
            while (walker.nextNode()) {
                const n = walker.currentNode;
                if (lc(n.innerText).includes(want) && visible(n)) best = n;
            }
            el = best;
            break;
        }
        case 'role': {
            const sel = (IMPLICIT[want] ? IMPLICIT[want] + ', ' : '') + '[role="' + value + '"]';
            const els = usable(all(sel));
            el = wantName ? els.find(e => lc(text(e)).includes(wantName) || lc(label(e)).includes(wantName)) : els[0];
            break;
        }
        case 'input':
            el = usable(all(TEXT_INPUT))[0];
            break;
    }

    if (!el) return null;
    return { selector: selector(el), tag: el.tagName.toLowerCase(), text: lc(text(el)).slice(0, 60) };
})
"#;

fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".into())
}

#[async_trait]
impl Session for EokaSession {
    async fn goto(&self, url: &str) -> Result<()> {
        self.page.goto(url).await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.page.url().await?)
    }

    async fn find(&self, locator: &Locator) -> Result<Option<ElementHandle>> {
        let (kind, value, name) = locator.as_args();
        let js = format!(
            "{}({},{},{})",
            LOCATE_JS,
            js_str(kind),
            js_str(value),
            js_str(name)
        );
        let found: Option<Found> = self.page.evaluate(&js).await?;
        Ok(found.map(|f| ElementHandle {
            selector: f.selector,
            tag: f.tag,
            text: f.text,
        }))
    }

    async fn click(&self, element: &ElementHandle) -> Result<()> {
        self.page.click(&element.selector).await?;
        Ok(())
    }

    async fn fill(&self, element: &ElementHandle, text: &str) -> Result<()> {
        if element.tag == "select" {
            return select_option(&self.page, &element.selector, text).await;
        }
        self.page.fill(&element.selector, text).await?;
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.page.human().press_key(key).await?;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(self.page.screenshot().await?)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let EokaSession { browser, page } = *self;
        drop(page);
        browser.close().await?;
        Ok(())
    }
}

/// `<select>` elements are "typed into" by choosing the matching option.
async fn select_option(page: &Page, selector: &str, value: &str) -> Result<()> {
    let js = format!(
        r#"(() => {{
            const sel = document.querySelector({sel});
            if (!sel) return 'element_not_found';
            const want = {val}.toLowerCase();
            const opt = Array.from(sel.options).find(o => o.value.toLowerCase() === want || o.text.trim().toLowerCase() === want);
            if (!opt) return 'option_not_found';
            sel.value = opt.value;
            sel.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return 'ok';
        }})()"#,
        sel = js_str(selector),
        val = js_str(value)
    );
    let result: String = page.evaluate(&js).await?;
    match result.as_str() {
        "ok" => Ok(()),
        "element_not_found" => Err(Error::NotFound(format!("select '{}'", selector))),
        "option_not_found" => Err(Error::ActionFailed(format!(
            "option '{}' not found in select",
            value
        ))),
        _ => Err(Error::ActionFailed(format!("select failed: {}", result))),
    }
}
