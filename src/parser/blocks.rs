use anyhow::{Context, Result};
use regex::Regex;
use tracing::debug;

use super::{resolve_href, Node, Page, Rule};
use crate::records::PageResult;
use crate::sites::JobBoard;

/// Splits a results page into listing blocks using one structural marker.
///
/// The marker is an attribute the site uses to type its components rather than
/// a layout class, so it is the one selector here expected to need upkeep.
pub struct BlockLocator {
    marker: Rule,
}

impl BlockLocator {
    pub fn new(marker: &str) -> Result<Self> {
        Ok(Self {
            marker: Rule::new(marker)?,
        })
    }

    /// Blocks in document order. Empty means no results or a page that did not render.
    pub fn locate<'a>(&self, page: &'a Page) -> Vec<Node<'a>> {
        let blocks = page.find_all(&self.marker);
        debug!("{} blocks match {}", blocks.len(), self.marker.css);
        blocks
    }
}

/// Finds job-posting links on a directory page.
pub struct JobLinkLocator {
    anchor: Rule,
    href: Regex,
    origin: String,
    prefix: String,
}

impl JobLinkLocator {
    pub fn new(board: &JobBoard) -> Result<Self> {
        Ok(Self {
            anchor: Rule::new(&board.job_anchor)?,
            href: Regex::new(&board.job_href_pattern)
                .with_context(|| format!("bad job href pattern {}", board.job_href_pattern))?,
            origin: board.origin.clone(),
            prefix: board.job_prefix.clone(),
        })
    }

    /// `blocks` counts anchors whose href looks like a job; `records` holds the
    /// absolute links under the board's job prefix, first occurrence only.
    pub fn locate(&self, page: &Page) -> PageResult<String> {
        let mut result = PageResult::empty();

        for anchor in page.find_all(&self.anchor) {
            let Some(href) = anchor.attr("href") else {
                continue;
            };
            if !self.href.is_match(href) {
                continue;
            }
            result.blocks += 1;

            let Some(link) = resolve_href(&self.origin, href) else {
                continue;
            };
            if link.starts_with(&self.prefix) && !result.records.contains(&link) {
                result.records.push(link);
            }
        }

        result
    }
}

// ── Tests ──
