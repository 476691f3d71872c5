use anyhow::Result;
use tracing::debug;

use crate::error::ExtractionError;
use crate::parser::{Node, RuleChain};
use crate::records::ListingRecord;
use crate::sites::ListingSite;

/// Maps one result card to a `ListingRecord`.
///
/// Title, link and price are required and drop the card when missing. Rating
/// and review count are best effort and fall back to an empty string.
pub struct ListingExtractor {
    origin: String,
    title: RuleChain,
    link: RuleChain,
    price_container: RuleChain,
    price_text: RuleChain,
    rating: RuleChain,
    review_count: RuleChain,
}

impl ListingExtractor {
    pub fn new(site: &ListingSite) -> Result<Self> {
        let s = &site.selectors;
        Ok(Self {
            origin: site.origin.clone(),
            title: RuleChain::compile(&s.title)?,
            link: RuleChain::compile(&s.link)?,
            price_container: RuleChain::compile(&s.price_container)?,
            price_text: RuleChain::compile(&s.price_text)?,
            rating: RuleChain::compile(&s.rating)?,
            review_count: RuleChain::compile(&s.review_count)?,
        })
    }

    pub fn extract(&self, block: Node<'_>) -> Result<ListingRecord, ExtractionError> {
        let description = self.title.first_text(block).ok_or(missing("description"))?;

        let url = self.link.first_link(block, &self.origin).ok_or(missing("url"))?;

        let price = self
            .price_container
            .find_first(block)
            .and_then(|container| self.price_text.first_text(container))
            .ok_or(missing("price"))?;

        let rating = self.optional(&self.rating, block, "rating");
        let review_count = self.optional(&self.review_count, block, "review_count");

        Ok(ListingRecord {
            description,
            price,
            rating,
            review_count,
            url,
        })
    }

    fn optional(&self, chain: &RuleChain, block: Node<'_>, field: &str) -> String {
        chain.first_text(block).unwrap_or_else(|| {
            debug!("optional field {} missing", field);
            String::new()
        })
    }
}

fn missing(field: &'static str) -> ExtractionError {
    ExtractionError::MissingRequiredField { field }
}

// ── Tests ──
