use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pagination::DriverOptions;

/// Selector tables for one search-results card. Each list is an ordered
/// fallback chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingSelectors {
    pub title: Vec<String>,
    pub link: Vec<String>,
    pub price_container: Vec<String>,
    pub price_text: Vec<String>,
    pub rating: Vec<String>,
    pub review_count: Vec<String>,
}

/// A paginated search site whose result cards become `ListingRecord`s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingSite {
    pub name: String,
    pub origin: String,
    /// Search URL with a `{}` placeholder for the encoded query.
    pub search_template: String,
    /// Structural marker of one result card; doubles as the render marker.
    pub block_marker: String,
    pub selectors: ListingSelectors,
    pub options: DriverOptions,
}

/// A job directory: numbered listing pages linking to detail pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobBoard {
    pub name: String,
    pub origin: String,
    /// Directory URL the page number is appended to.
    pub list_base: String,
    /// Anchors that can point at a job posting.
    pub job_anchor: String,
    /// Pattern an anchor's href must match to count as a job link.
    pub job_href_pattern: String,
    /// Only hrefs with this prefix are kept.
    pub job_prefix: String,
    pub list_marker: String,
    pub detail_marker: String,
    pub company: Vec<String>,
    pub options: DriverOptions,
    /// Pause between detail pages.
    pub detail_delay: Duration,
}

pub fn amazon() -> ListingSite {
    ListingSite {
        name: "amazon".into(),
        origin: "https://www.amazon.com".into(),
        search_template: "https://www.amazon.com/s?k={}&ref=nb_sb_noss_1".into(),
        block_marker: "div[data-component-type='s-search-result']".into(),
        selectors: ListingSelectors {
            title: strings(&["h2"]),
            link: strings(&["a.a-link-normal.s-no-outline", "a[href]"]),
            price_container: strings(&["span.a-price"]),
            price_text: strings(&["span.a-offscreen"]),
            rating: strings(&["span.a-icon-alt", "i[class*='a-star'] span"]),
            review_count: strings(&[
                "span.a-size-base.s-underline-text",
                "span.a-size-mini.puis-normal-weight-text.s-underline-text",
            ]),
        },
        options: DriverOptions {
            max_pages: 4,
            render_timeout: Duration::from_secs(10),
            delay: Duration::from_secs(2),
        },
    }
}

pub fn truckerboerse() -> JobBoard {
    JobBoard {
        name: "truckerboerse".into(),
        origin: "https://www.truckerboerse.net".into(),
        list_base: "https://www.truckerboerse.net/index.php?page=5140&js=&kat=lkw&stellenangebote_kraftfahrer=".into(),
        job_anchor: "a[href]".into(),
        job_href_pattern: r"kraftfahrer-jobs/\d+/".into(),
        job_prefix: "https://www.truckerboerse.net/kraftfahrer-jobs/".into(),
        list_marker: "a[href*='kraftfahrer-jobs/']".into(),
        detail_marker: "body".into(),
        company: strings(&["h1", "div[class*='company']", "div[class*='firma']"]),
        options: DriverOptions {
            max_pages: 2,
            render_timeout: Duration::from_secs(10),
            delay: Duration::from_secs(2),
        },
        detail_delay: Duration::from_millis(1500),
    }
}

impl ListingSite {
    /// `template` with the query spliced in (spaces become `+`) and `&page=N` appended.
    pub fn page_url(&self, query: &str, page: u32) -> String {
        search_url(&self.search_template, query, page)
    }
}

impl JobBoard {
    pub fn page_url(&self, page: u32) -> String {
        format!("{}{}", self.list_base, page)
    }
}

pub fn search_url(template: &str, query: &str, page: u32) -> String {
    let term = query.trim().replace(' ', "+");
    format!("{}&page={}", template.replacen("{}", &term, 1), page)
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
