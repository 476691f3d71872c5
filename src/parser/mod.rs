pub mod blocks;
pub mod extract;

use anyhow::{anyhow, Result};
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// A parsed page (or fragment) that can be queried with CSS selectors.
pub struct Page {
    html: Html,
}

impl Page {
    pub fn parse(markup: &str) -> Self {
        Self {
            html: Html::parse_document(markup),
        }
    }

    pub fn root(&self) -> Node<'_> {
        Node(self.html.root_element())
    }

    pub fn find_first(&self, rule: &Rule) -> Option<Node<'_>> {
        self.root().find_first(rule)
    }

    pub fn find_all(&self, rule: &Rule) -> Vec<Node<'_>> {
        self.root().find_all(rule)
    }

    /// Text nodes in document order, skipping script and style bodies.
    pub fn text_nodes(&self) -> Vec<&str> {
        text_nodes(self.root().0)
    }

    /// All visible text joined line by line.
    pub fn full_text(&self) -> String {
        self.text_nodes().join("\n")
    }
}

/// One element inside a `Page`.
#[derive(Clone, Copy)]
pub struct Node<'a>(ElementRef<'a>);

impl<'a> Node<'a> {
    pub fn find_first(&self, rule: &Rule) -> Option<Node<'a>> {
        self.0.select(&rule.selector).next().map(Node)
    }

    pub fn find_all(&self, rule: &Rule) -> Vec<Node<'a>> {
        self.0.select(&rule.selector).map(Node).collect()
    }

    /// Whitespace-normalized text content.
    pub fn text(&self) -> String {
        self.0.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
    }

    /// Text nodes of this element, line-joined, as they appear in the source.
    pub fn raw_text(&self) -> String {
        text_nodes(self.0).join("\n")
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.0.value().attr(name)
    }

    pub fn parent(&self) -> Option<Node<'a>> {
        self.0.parent().and_then(ElementRef::wrap).map(Node)
    }
}

fn text_nodes(root: ElementRef<'_>) -> Vec<&str> {
    root.descendants()
        .filter_map(|n| {
            let text = n.value().as_text()?;
            let parent = n.parent().and_then(|p| p.value().as_element().map(|e| e.name()));
            if matches!(parent, Some("script" | "style" | "noscript")) {
                return None;
            }
            let t = text.trim();
            (!t.is_empty()).then_some(t)
        })
        .collect()
}

/// A single compiled CSS selector, keeping its source for logging.
#[derive(Debug, Clone)]
pub struct Rule {
    pub css: String,
    selector: Selector,
}

impl Rule {
    pub fn new(css: &str) -> Result<Self> {
        let selector =
            Selector::parse(css).map_err(|e| anyhow!("invalid selector `{}`: {:?}", css, e))?;
        Ok(Self {
            css: css.to_string(),
            selector,
        })
    }
}

/// Ordered fallback selectors: the first rule that yields a usable match wins,
/// later rules are only tried when earlier ones miss. Matches are never merged.
#[derive(Debug, Clone)]
pub struct RuleChain {
    rules: Vec<Rule>,
}

impl RuleChain {
    pub fn compile<S: AsRef<str>>(sources: &[S]) -> Result<Self> {
        let rules = sources
            .iter()
            .map(|s| Rule::new(s.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        if rules.is_empty() {
            return Err(anyhow!("rule chain needs at least one selector"));
        }
        Ok(Self { rules })
    }

    /// First element matched by the earliest rule that matches anything.
    pub fn find_first<'a>(&self, scope: Node<'a>) -> Option<Node<'a>> {
        self.rules.iter().find_map(|r| scope.find_first(r))
    }

    /// First non-empty text, trying each rule's first match in order.
    pub fn first_text(&self, scope: Node<'_>) -> Option<String> {
        self.rules
            .iter()
            .filter_map(|r| scope.find_first(r))
            .map(|n| n.text())
            .find(|t| !t.is_empty())
    }

    /// First `href` that resolves to an absolute URL, trying every match of
    /// each rule in order. Unusable hrefs (`javascript:`, `mailto:`) fall through.
    pub fn first_link(&self, scope: Node<'_>, origin: &str) -> Option<String> {
        self.rules.iter().find_map(|r| {
            scope
                .find_all(r)
                .into_iter()
                .filter_map(|n| n.attr("href"))
                .find_map(|href| resolve_href(origin, href))
        })
    }
}

/// Resolve `href` against the site origin. Absolute hrefs pass through untouched.
pub fn resolve_href(origin: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if let Ok(abs) = Url::parse(href) {
        return abs.has_host().then(|| href.to_string());
    }
    match Url::parse(origin) {
        Ok(base) => base.join(href).ok().map(String::from),
        Err(_) => Some(format!(
            "{}/{}",
            origin.trim_end_matches('/'),
            href.trim_start_matches('/')
        )),
    }
}

/// Host without a leading `www.`, lowercased.
pub fn bare_host(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.trim_start_matches("www.").to_string())
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    const SNIPPET: &str = r#"
        <html><body>
          <div class="card"><h2> <span>Wide   screen</span> </h2><a class="primary">x</a></div>
          <script>var x = "12345 Berlin";</script>
          <p>Hello</p>
        </body></html>"#;

    #[test]
    fn text_is_whitespace_normalized() {
        let page = Page::parse(SNIPPET);
        let h2 = page.find_first(&Rule::new("h2").unwrap()).unwrap();
        assert_eq!(h2.text(), "Wide screen");
    }

    #[test]
    fn text_nodes_skip_scripts() {
        let page = Page::parse(SNIPPET);
        let text = page.full_text();
        assert!(text.contains("Hello"));
        assert!(!text.contains("Berlin"));
    }

    #[test]
    fn chain_falls_back_in_order() {
        let page = Page::parse(SNIPPET);
        let chain = RuleChain::compile(&["a.missing", "a.primary", "a"]).unwrap();
        let hit = chain.find_first(page.root()).unwrap();
        assert_eq!(hit.attr("class"), Some("primary"));
    }

    #[test]
    fn chain_skips_empty_text_matches() {
        let page = Page::parse(r#"<div><span class="a"> </span><span class="b">4.5</span></div>"#);
        let chain = RuleChain::compile(&["span.a", "span.b"]).unwrap();
        assert_eq!(chain.first_text(page.root()).as_deref(), Some("4.5"));
    }

    #[test]
    fn invalid_selector_is_an_error() {
        assert!(Rule::new("div[").is_err());
        assert!(RuleChain::compile::<&str>(&[]).is_err());
    }

    #[test]
    fn unusable_href_falls_through_to_next_rule() {
        let page = Page::parse(
            r#"<div><a class="primary" href="javascript:void(0)">x</a><a href="mailto:a@b.de">m</a><a href="/dp/B9">y</a></div>"#,
        );
        let chain = RuleChain::compile(&["a.primary", "a[href]"]).unwrap();
        assert_eq!(
            chain.first_link(page.root(), "https://www.amazon.com").as_deref(),
            Some("https://www.amazon.com/dp/B9")
        );
    }

    #[test]
    fn relative_href_gets_origin() {
        assert_eq!(
            resolve_href("https://www.amazon.com", "/dp/B0ABC?ref=x").as_deref(),
            Some("https://www.amazon.com/dp/B0ABC?ref=x")
        );
    }

    #[test]
    fn absolute_href_not_prefixed_twice() {
        let href = "https://www.amazon.com/sspa/click?x=1";
        assert_eq!(resolve_href("https://www.amazon.com", href).as_deref(), Some(href));
        assert_eq!(resolve_href("https://www.amazon.com", "  "), None);
    }

    #[test]
    fn bare_host_strips_www() {
        assert_eq!(bare_host("https://WWW.Example.de/x").as_deref(), Some("example.de"));
        assert_eq!(bare_host("mailto:a@b.de"), None);
    }
}
