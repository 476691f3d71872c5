use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;

use crate::parser::{bare_host, Page, Rule, RuleChain};
use crate::records::JobDetails;
use crate::sites::JobBoard;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    Email,
    Phone,
    Fax,
    Address,
}

/// One row of the text pattern table: which field, which regex, which group.
pub struct FieldPattern {
    pub field: TextField,
    pub pattern: &'static LazyLock<Regex>,
    pub group: usize,
}

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap());
// Digit runs may open with an area code in parentheses and use any
// horizontal whitespace (including U+00A0) but never cross a line.
const NUMBER_RUN: &str = r"([+\d(][+\d\(\)\-/[^\S\n]]{7,})";

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)(?:Tel\.|Telefon|Phone|Tel|Fon)[\s:]*{}", NUMBER_RUN)).unwrap()
});
static FAX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i)Fax[\s:]*{}", NUMBER_RUN)).unwrap());

const POSTAL_LOCALITY: &str = r"\b\d{5}[^\S\n]+[A-ZÄÖÜ][a-zäöüß]+(?:[^\S\n][A-ZÄÖÜ][a-zäöüß]+)*\b";

static STREET_ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)[A-ZÄÖÜ][a-zäöüß]+(?:straße|str\.|weg|platz|allee)?[^\S\n]+\d+[a-z]?[,\s]+{}",
        POSTAL_LOCALITY
    ))
    .unwrap()
});
static POSTAL_ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(POSTAL_LOCALITY).unwrap());
static FIVE_DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{5}").unwrap());

static CONTACT_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)kontakt|ansprechpartner|contact").unwrap()
});
static CONTACT_PERSON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:Ansprechpartner(?:in)?|Kontaktperson|Contact person|Contact)[\s:]*((?:Herr|Frau|Mr\.|Ms\.)?[^\S\n]*[A-ZÄÖÜ][a-zäöüß]+(?:[^\S\n][A-ZÄÖÜ][a-zäöüß]+)+)",
    )
    .unwrap()
});

/// Text patterns in evaluation order. Rows for the same field are alternatives:
/// the first row that matches fills the field and later rows are skipped.
pub static TEXT_PATTERNS: &[FieldPattern] = &[
    FieldPattern { field: TextField::Email, pattern: &EMAIL_RE, group: 0 },
    FieldPattern { field: TextField::Phone, pattern: &PHONE_RE, group: 1 },
    FieldPattern { field: TextField::Fax, pattern: &FAX_RE, group: 1 },
    FieldPattern { field: TextField::Address, pattern: &STREET_ADDRESS_RE, group: 0 },
    FieldPattern { field: TextField::Address, pattern: &POSTAL_ADDRESS_RE, group: 0 },
];

/// Reads contact details off a job's detail page. Every field is searched on
/// its own and stays empty when nothing matches.
pub struct DetailEnricher {
    site_host: Option<String>,
    company: RuleChain,
    link: Rule,
    labelled: Rule,
}

impl DetailEnricher {
    pub fn new(board: &JobBoard) -> Result<Self> {
        Ok(Self {
            site_host: bare_host(&board.origin),
            company: RuleChain::compile(&board.company)?,
            link: Rule::new("a[href]")?,
            labelled: Rule::new("div, p, td, li, span, strong, b, dt, dd")?,
        })
    }

    pub fn enrich(&self, markup: &str) -> JobDetails {
        let page = Page::parse(markup);
        let text = page.full_text();

        let mut details = JobDetails {
            company: self.company.first_text(page.root()).unwrap_or_default(),
            website: self.website(&page).unwrap_or_default(),
            contact_person: self.contact_person(&page).unwrap_or_default(),
            ..Default::default()
        };

        for row in TEXT_PATTERNS {
            let slot = match row.field {
                TextField::Email => &mut details.email,
                TextField::Phone => &mut details.phone,
                TextField::Fax => &mut details.fax,
                TextField::Address => &mut details.address,
            };
            if !slot.is_empty() {
                continue;
            }
            if let Some(m) = row.pattern.captures(&text).and_then(|c| c.get(row.group)) {
                *slot = m.as_str().trim().to_string();
            }
        }

        if details.address.is_empty() {
            details.address = postal_text_node(&page).unwrap_or_default();
        }

        details
    }

    /// First absolute link off the board's own host that is not a mail link.
    fn website(&self, page: &Page) -> Option<String> {
        page.find_all(&self.link).into_iter().find_map(|a| {
            let href = a.attr("href")?.trim();
            if !(href.starts_with("http://") || href.starts_with("https://")) {
                return None;
            }
            let host = bare_host(href)?;
            (Some(&host) != self.site_host.as_ref()).then(|| href.to_string())
        })
    }

    /// Name following a contact label, looked up only in the element around a
    /// text node that carries such a label.
    fn contact_person(&self, page: &Page) -> Option<String> {
        page.find_all(&self.labelled)
            .into_iter()
            .filter(|el| {
                el.raw_text()
                    .lines()
                    .next()
                    .is_some_and(|first| CONTACT_LABEL_RE.is_match(first))
            })
            .find_map(|el| {
                let block = el.parent().unwrap_or(el).raw_text();
                CONTACT_PERSON_RE
                    .captures(&block)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().trim().to_string())
            })
    }
}

/// Last resort: a short text node holding a 5-digit postal code.
fn postal_text_node(page: &Page) -> Option<String> {
    page.text_nodes()
        .into_iter()
        .find(|t| FIVE_DIGITS_RE.is_match(t) && t.chars().count() > 5 && t.chars().count() < 100)
        .map(str::to_string)
}

// ── Tests ──
