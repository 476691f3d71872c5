use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, ScrapeError};
use crate::parser::blocks::{BlockLocator, JobLinkLocator};
use crate::parser::extract::detail::DetailEnricher;
use crate::parser::extract::listing::ListingExtractor;
use crate::parser::Page;
use crate::records::{JobRecord, ListingRecord, PageResult, Record};
use crate::render::Renderer;
use crate::sites::{JobBoard, ListingSite};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverOptions {
    /// Last page index fetched (pages start at 1).
    pub max_pages: u32,
    /// How long to wait for the render marker before reading the page anyway.
    pub render_timeout: Duration,
    /// Minimum gap between two fetches.
    pub delay: Duration,
}

/// What to do when a single page cannot be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    SkipPage,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    PageCeiling,
    EmptyPage(u32),
    Aborted(u32),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::PageCeiling => write!(f, "page ceiling reached"),
            StopReason::EmptyPage(page) => write!(f, "no results on page {}", page),
            StopReason::Aborted(page) => write!(f, "page {} failed", page),
        }
    }
}

/// Everything the driver carries from one page to the next.
#[derive(Debug)]
pub struct PaginationState<T> {
    /// Next page to fetch.
    pub page: u32,
    /// Primary keys already accepted this run.
    pub seen: HashSet<String>,
    pub records: Vec<T>,
    pub pages_fetched: u32,
    pub pages_skipped: u32,
}

impl<T: Record> PaginationState<T> {
    pub fn new() -> Self {
        Self {
            page: 1,
            seen: HashSet::new(),
            records: Vec::new(),
            pages_fetched: 0,
            pages_skipped: 0,
        }
    }

    /// Keep records whose key is new; later duplicates are dropped silently.
    fn absorb(mut self, records: Vec<T>) -> (Self, usize) {
        let before = self.records.len();
        for record in records {
            if record.key().is_empty() || !self.seen.insert(record.key().to_string()) {
                continue;
            }
            self.records.push(record);
        }
        let added = self.records.len() - before;
        (self, added)
    }

    fn finish(self, stop: StopReason) -> Run<T> {
        Run {
            records: self.records,
            pages_fetched: self.pages_fetched,
            pages_skipped: self.pages_skipped,
            stop,
        }
    }
}

impl<T: Record> Default for PaginationState<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub enum PageOutcome<T> {
    Extracted(PageResult<T>),
    Failed(ScrapeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Stop(StopReason),
}

/// One transition of the driver: fold a page's outcome into the state.
pub fn advance<T: Record>(
    state: PaginationState<T>,
    outcome: PageOutcome<T>,
    policy: FailurePolicy,
) -> (PaginationState<T>, Step) {
    let page = state.page;
    match outcome {
        PageOutcome::Failed(e) => match policy {
            FailurePolicy::SkipPage => {
                warn!("Error on page {}: {} (skipping)", page, e);
                let mut state = state;
                state.pages_skipped += 1;
                state.page += 1;
                (state, Step::Continue)
            }
            FailurePolicy::Abort => {
                warn!("Error on page {}: {} (stopping)", page, e);
                (state, Step::Stop(StopReason::Aborted(page)))
            }
        },
        PageOutcome::Extracted(result) => {
            let mut state = state;
            state.pages_fetched += 1;
            if result.records.is_empty() {
                info!("  No results on page {} ({} blocks). Stopping.", page, result.blocks);
                return (state, Step::Stop(StopReason::EmptyPage(page)));
            }
            let found = result.records.len();
            let (mut state, added) = state.absorb(result.records);
            info!(
                "  Extracted {} of {} blocks on page {} ({} new, {} unique so far)",
                found,
                result.blocks,
                page,
                added,
                state.records.len()
            );
            state.page += 1;
            (state, Step::Continue)
        }
    }
}

/// The completed output of a pagination run.
#[derive(Debug)]
pub struct Run<T> {
    pub records: Vec<T>,
    pub pages_fetched: u32,
    pub pages_skipped: u32,
    pub stop: StopReason,
}

/// Enforces a fixed minimum interval between fetches.
pub struct Pacer {
    interval: Duration,
    last: Option<Instant>,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// A pacer that treats "now" as the last fetch, so its first wait is a full interval.
    pub fn started(interval: Duration) -> Self {
        Self {
            interval,
            last: Some(Instant::now()),
        }
    }

    pub async fn wait(&mut self) {
        if let Some(last) = self.last {
            tokio::time::sleep_until(last + self.interval).await;
        }
        self.last = Some(Instant::now());
    }
}

/// Load `url`, give the render marker up to `timeout`, and return the markup
/// either way.
pub async fn render<R: Renderer + ?Sized>(
    renderer: &mut R,
    url: &str,
    marker: &str,
    timeout: Duration,
) -> Result<String, ScrapeError> {
    renderer.navigate(url).await?;
    if !renderer.wait_for(marker, timeout).await? {
        let e = ScrapeError::RenderTimeout {
            marker: marker.to_string(),
            timeout,
        };
        warn!("  {} ({}); reading page anyway", e, url);
    }
    renderer.current_markup().await
}

/// Walk pages `1..=max_pages` until the ceiling, an empty page, or an aborting failure.
pub async fn paginate<R, T, U, H>(
    renderer: &mut R,
    options: &DriverOptions,
    policy: FailurePolicy,
    marker: &str,
    page_url: U,
    harvest: H,
) -> Result<Run<T>, ScrapeError>
where
    R: Renderer + ?Sized,
    T: Record,
    U: Fn(u32) -> String,
    H: Fn(&str) -> PageResult<T>,
{
    let mut pacer = Pacer::new(options.delay);
    let mut state = PaginationState::new();

    let stop = loop {
        if state.page > options.max_pages {
            break StopReason::PageCeiling;
        }
        let url = page_url(state.page);
        info!("[Page {}/{}] {}", state.page, options.max_pages, url);

        pacer.wait().await;
        let outcome = match render(renderer, &url, marker, options.render_timeout).await {
            Ok(markup) => PageOutcome::Extracted(harvest(&markup)),
            Err(e) if e.kind() == ErrorKind::FatalSetupFailure => return Err(e),
            Err(e) => PageOutcome::Failed(e),
        };

        let (next, step) = advance(state, outcome, policy);
        state = next;
        if let Step::Stop(reason) = step {
            break reason;
        }
    };

    info!(
        "Pagination finished ({}): {} records from {} pages, {} skipped",
        stop,
        state.records.len(),
        state.pages_fetched,
        state.pages_skipped
    );
    Ok(state.finish(stop))
}

// ── Listing sites ──

pub fn harvest_listings(
    locator: &BlockLocator,
    extractor: &ListingExtractor,
    markup: &str,
) -> PageResult<ListingRecord> {
    let page = Page::parse(markup);
    let blocks = locator.locate(&page);
    let mut records = Vec::with_capacity(blocks.len());

    for (i, block) in blocks.iter().enumerate() {
        match extractor.extract(*block) {
            Ok(record) => records.push(record),
            Err(e) => debug!("  block {} dropped: {}", i, e),
        }
    }

    PageResult {
        blocks: blocks.len(),
        records,
    }
}

/// Search `site` for `query` and collect result cards page by page.
/// A failed page ends the run with whatever was collected so far.
pub async fn scrape_listings<R: Renderer + ?Sized>(
    renderer: &mut R,
    site: &ListingSite,
    query: &str,
    options: &DriverOptions,
) -> Result<Run<ListingRecord>> {
    let locator = BlockLocator::new(&site.block_marker)?;
    let extractor = ListingExtractor::new(site)?;

    let run = paginate(
        renderer,
        options,
        FailurePolicy::Abort,
        &site.block_marker,
        |page| site.page_url(query, page),
        |markup| harvest_listings(&locator, &extractor, markup),
    )
    .await?;
    Ok(run)
}

// ── Job boards ──

/// First pass: collect unique job links from the directory pages.
/// A failed page is skipped and the next one is tried.
pub async fn collect_job_links<R: Renderer + ?Sized>(
    renderer: &mut R,
    board: &JobBoard,
    options: &DriverOptions,
) -> Result<Run<String>> {
    let locator = JobLinkLocator::new(board)?;

    let run = paginate(
        renderer,
        options,
        FailurePolicy::SkipPage,
        &board.list_marker,
        |page| board.page_url(page),
        |markup| {
            let page = Page::parse(markup);
            locator.locate(&page)
        },
    )
    .await?;
    Ok(run)
}

#[derive(Debug)]
pub struct EnrichRun {
    pub records: Vec<JobRecord>,
    pub enriched: usize,
    pub failed: usize,
}

/// Second pass: visit each link once and fill in its details. A link whose
/// page cannot be loaded keeps only its link.
pub async fn enrich_jobs<R: Renderer + ?Sized>(
    renderer: &mut R,
    board: &JobBoard,
    links: Vec<String>,
    render_timeout: Duration,
) -> Result<EnrichRun> {
    let enricher = DetailEnricher::new(board)?;
    // The directory pass fetched from the same host just before this.
    let mut pacer = Pacer::started(board.detail_delay);
    let mut visited = HashSet::new();
    let mut run = EnrichRun {
        records: Vec::with_capacity(links.len()),
        enriched: 0,
        failed: 0,
    };

    let total = links.len();
    info!("Scraping details from {} job postings...", total);
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    for (index, link) in links.into_iter().enumerate() {
        pb.inc(1);
        if !visited.insert(link.clone()) {
            continue;
        }
        info!("[{}/{}] Scraping: {}", index + 1, total, link);

        pacer.wait().await;
        let record = JobRecord::discovered(link);
        match render(renderer, &record.link, &board.detail_marker, render_timeout).await {
            Ok(markup) => {
                let details = enricher.enrich(&markup);
                info!(
                    "  Company: {} | Email: {} | Phone: {}",
                    details.company, details.email, details.phone
                );
                run.records.push(record.with_details(details));
                run.enriched += 1;
            }
            Err(e) if e.kind() == ErrorKind::FatalSetupFailure => {
                pb.finish_and_clear();
                return Err(e.into());
            }
            Err(e) => {
                warn!("  Failed to scrape {}: {}", record.link, e);
                run.records.push(record);
                run.failed += 1;
            }
        }
    }

    pb.finish_and_clear();
    info!(
        "Finished job details: {} enriched, {} failed",
        run.enriched, run.failed
    );
    Ok(run)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;
    use crate::render::markup_has;
    use crate::sites::{amazon, truckerboerse};

    /// Serves canned markup per URL and records every navigation.
    #[derive(Default)]
    struct FakeRenderer {
        pages: HashMap<String, String>,
        failing: HashSet<String>,
        fatal: HashSet<String>,
        visited: Vec<String>,
        current: String,
    }

    impl FakeRenderer {
        fn page(mut self, url: String, markup: &str) -> Self {
            self.pages.insert(url, markup.to_string());
            self
        }

        fn failing(mut self, url: String) -> Self {
            self.failing.insert(url);
            self
        }
    }

    #[async_trait]
    impl Renderer for FakeRenderer {
        async fn navigate(&mut self, url: &str) -> Result<(), ScrapeError> {
            self.visited.push(url.to_string());
            if self.fatal.contains(url) {
                return Err(ScrapeError::FatalSetupFailure("browser went away".into()));
            }
            if self.failing.contains(url) {
                return Err(ScrapeError::fetch(url, anyhow::anyhow!("connection reset")));
            }
            self.current = self.pages.get(url).cloned().unwrap_or_default();
            Ok(())
        }

        async fn current_markup(&mut self) -> Result<String, ScrapeError> {
            Ok(self.current.clone())
        }

        async fn wait_for(&mut self, marker: &str, _timeout: Duration) -> Result<bool, ScrapeError> {
            Ok(markup_has(&self.current, marker))
        }
    }

    fn options(max_pages: u32) -> DriverOptions {
        DriverOptions {
            max_pages,
            render_timeout: Duration::from_millis(10),
            delay: Duration::ZERO,
        }
    }

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    fn job_list(ids: &[u32]) -> String {
        let anchors: String = ids
            .iter()
            .map(|id| {
                format!(
                    r#"<a href="https://www.truckerboerse.net/kraftfahrer-jobs/{}/stelle">Job {}</a>"#,
                    id, id
                )
            })
            .collect();
        format!("<html><body>{}</body></html>", anchors)
    }

    const QUERY: &str = "ultrawide monitor";

    #[tokio::test]
    async fn empty_page_three_stops_run() {
        let site = amazon();
        let full = fixture("search_page");
        let empty = fixture("empty_search_page");
        let mut renderer = FakeRenderer::default()
            .page(site.page_url(QUERY, 1), &full)
            .page(site.page_url(QUERY, 2), &full)
            .page(site.page_url(QUERY, 3), &empty)
            .page(site.page_url(QUERY, 4), &full);

        let run = scrape_listings(&mut renderer, &site, QUERY, &options(5)).await.unwrap();

        assert_eq!(renderer.visited.len(), 3);
        assert_eq!(renderer.visited[2], site.page_url(QUERY, 3));
        assert_eq!(run.stop, StopReason::EmptyPage(3));
        assert_eq!(run.pages_fetched, 3);
        // card three has no price; page two repeats page one
        assert_eq!(run.records.len(), 3);
        assert_eq!(run.records[1].url, "https://www.amazon.com/sspa/click?ie=UTF8&spc=MToxMjM");
        assert_eq!(run.records[2].rating, "");
    }

    #[tokio::test]
    async fn stops_at_page_ceiling() {
        let site = amazon();
        let full = fixture("search_page");
        let mut renderer = FakeRenderer::default()
            .page(site.page_url(QUERY, 1), &full)
            .page(site.page_url(QUERY, 2), &full)
            .page(site.page_url(QUERY, 3), &full);

        let run = scrape_listings(&mut renderer, &site, QUERY, &options(2)).await.unwrap();

        assert_eq!(renderer.visited.len(), 2);
        assert_eq!(run.stop, StopReason::PageCeiling);
    }

    #[tokio::test]
    async fn zero_page_budget_fetches_nothing() {
        let site = amazon();
        let mut renderer = FakeRenderer::default();
        let run = scrape_listings(&mut renderer, &site, QUERY, &options(0)).await.unwrap();
        assert!(renderer.visited.is_empty());
        assert!(run.records.is_empty());
    }

    #[tokio::test]
    async fn listing_fetch_failure_aborts_and_keeps_records() {
        let site = amazon();
        let full = fixture("search_page");
        let mut renderer = FakeRenderer::default()
            .page(site.page_url(QUERY, 1), &full)
            .failing(site.page_url(QUERY, 2))
            .page(site.page_url(QUERY, 3), &full);

        let run = scrape_listings(&mut renderer, &site, QUERY, &options(4)).await.unwrap();

        assert_eq!(run.stop, StopReason::Aborted(2));
        assert_eq!(renderer.visited.len(), 2);
        assert_eq!(run.records.len(), 3);
    }

    #[tokio::test]
    async fn blocked_page_counts_as_end_of_results() {
        let site = amazon();
        let mut renderer =
            FakeRenderer::default().page(site.page_url(QUERY, 1), "<html><body>Robot check</body></html>");

        let run = scrape_listings(&mut renderer, &site, QUERY, &options(4)).await.unwrap();

        assert_eq!(run.stop, StopReason::EmptyPage(1));
        assert!(run.records.is_empty());
    }

    #[tokio::test]
    async fn job_links_deduplicated_across_pages() {
        let board = truckerboerse();
        let mut renderer = FakeRenderer::default()
            .page(board.page_url(1), &job_list(&[1, 2, 3]))
            .page(board.page_url(2), &job_list(&[3, 4, 1]))
            .page(board.page_url(3), &job_list(&[5]));

        let run = collect_job_links(&mut renderer, &board, &options(3)).await.unwrap();

        let ids: Vec<&str> = run
            .records
            .iter()
            .map(|l| l.split('/').nth(4).unwrap())
            .collect();
        assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);
        let unique: HashSet<&String> = run.records.iter().collect();
        assert_eq!(unique.len(), run.records.len());
    }

    #[tokio::test]
    async fn job_page_failure_is_skipped() {
        let board = truckerboerse();
        let mut renderer = FakeRenderer::default()
            .failing(board.page_url(1))
            .page(board.page_url(2), &job_list(&[7, 8]));

        let run = collect_job_links(&mut renderer, &board, &options(2)).await.unwrap();

        assert_eq!(run.pages_skipped, 1);
        assert_eq!(run.pages_fetched, 1);
        assert_eq!(run.records.len(), 2);
        assert_eq!(run.stop, StopReason::PageCeiling);
    }

    #[tokio::test]
    async fn fatal_error_propagates() {
        let site = amazon();
        let mut renderer = FakeRenderer::default();
        renderer.fatal.insert(site.page_url(QUERY, 1));

        let err = paginate(
            &mut renderer,
            &options(3),
            FailurePolicy::SkipPage,
            &site.block_marker,
            |p| site.page_url(QUERY, p),
            |_| PageResult::<String>::empty(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::FatalSetupFailure);
        assert_eq!(renderer.visited.len(), 1);
    }

    #[tokio::test]
    async fn enrich_visits_each_link_once() {
        let mut board = truckerboerse();
        board.detail_delay = Duration::ZERO;
        let a = "https://www.truckerboerse.net/kraftfahrer-jobs/1/a".to_string();
        let b = "https://www.truckerboerse.net/kraftfahrer-jobs/2/b".to_string();
        let mut renderer = FakeRenderer::default()
            .page(a.clone(), &fixture("job_detail"))
            .failing(b.clone());

        let run = enrich_jobs(
            &mut renderer,
            &board,
            vec![a.clone(), b.clone(), a.clone()],
            Duration::from_millis(10),
        )
        .await
        .unwrap();

        assert_eq!(renderer.visited, vec![a.clone(), b.clone()]);
        assert_eq!(run.enriched, 1);
        assert_eq!(run.failed, 1);
        assert_eq!(run.records.len(), 2);
        assert_eq!(run.records[0].details.email, "personal@spedition-beispiel.de");
        assert_eq!(run.records[1].link, b);
        assert_eq!(run.records[1].details, Default::default());
    }

    #[test]
    fn advance_drops_seen_keys() {
        let state = PaginationState::<String>::new();
        let (state, step) = advance(
            state,
            PageOutcome::Extracted(PageResult {
                blocks: 2,
                records: vec!["a".into(), "b".into()],
            }),
            FailurePolicy::SkipPage,
        );
        assert_eq!(step, Step::Continue);
        let (state, step) = advance(
            state,
            PageOutcome::Extracted(PageResult {
                blocks: 2,
                records: vec!["b".into(), "c".into(), "".into()],
            }),
            FailurePolicy::SkipPage,
        );
        assert_eq!(step, Step::Continue);
        assert_eq!(state.records, vec!["a", "b", "c"]);
        assert_eq!(state.page, 3);
    }

    #[test]
    fn advance_stops_on_empty_page() {
        let state = PaginationState::<String>::new();
        let (state, step) = advance(
            state,
            PageOutcome::Extracted(PageResult {
                blocks: 4,
                records: vec![],
            }),
            FailurePolicy::SkipPage,
        );
        assert_eq!(step, Step::Stop(StopReason::EmptyPage(1)));
        assert_eq!(state.pages_fetched, 1);
    }

    #[tokio::test]
    async fn first_detail_fetch_waits_a_full_interval() {
        let mut board = truckerboerse();
        board.detail_delay = Duration::from_millis(40);
        let link = "https://www.truckerboerse.net/kraftfahrer-jobs/3/c".to_string();
        let mut renderer = FakeRenderer::default().page(link.clone(), "<html><body></body></html>");

        let start = Instant::now();
        enrich_jobs(&mut renderer, &board, vec![link], Duration::from_millis(10))
            .await
            .unwrap();

        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn pacer_spaces_fetches() {
        let mut pacer = Pacer::new(Duration::from_millis(30));
        let start = Instant::now();
        pacer.wait().await;
        assert!(start.elapsed() < Duration::from_millis(30));
        pacer.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
