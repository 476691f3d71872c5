use serde::Serialize;

/// One product card from a search results page. Built whole or not at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingRecord {
    pub description: String,
    pub price: String,
    /// Empty when the card shows no rating.
    pub rating: String,
    /// Empty when the card shows no review count.
    pub review_count: String,
    pub url: String,
}

/// Secondary fields read off a job's detail page. Every field defaults to empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobDetails {
    pub company: String,
    pub address: String,
    pub website: String,
    pub contact_person: String,
    pub email: String,
    pub phone: String,
    pub fax: String,
}

/// A job posting. Discovery fills `link`; the detail pass fills `details` once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRecord {
    pub link: String,
    pub details: JobDetails,
}

impl JobRecord {
    pub fn discovered(link: impl Into<String>) -> Self {
        Self {
            link: link.into(),
            details: JobDetails::default(),
        }
    }

    pub fn with_details(self, details: JobDetails) -> Self {
        Self {
            link: self.link,
            details,
        }
    }
}

/// What one page yielded: how many blocks were found and the records that survived extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResult<T> {
    pub blocks: usize,
    pub records: Vec<T>,
}

impl<T> PageResult<T> {
    pub fn empty() -> Self {
        Self {
            blocks: 0,
            records: Vec::new(),
        }
    }
}

/// Records that carry a primary key and a fixed output column schema.
pub trait Record {
    const COLUMNS: &'static [&'static str];

    fn key(&self) -> &str;

    fn row(&self) -> Vec<String>;
}

impl Record for ListingRecord {
    const COLUMNS: &'static [&'static str] = &["Description", "Price", "Rating", "ReviewCount", "Url"];

    fn key(&self) -> &str {
        &self.url
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.description.clone(),
            self.price.clone(),
            self.rating.clone(),
            self.review_count.clone(),
            self.url.clone(),
        ]
    }
}

impl Record for JobRecord {
    const COLUMNS: &'static [&'static str] = &[
        "Job Link",
        "Company Name",
        "Address",
        "Website",
        "Contact Person",
        "Email",
        "Phone",
        "Fax",
    ];

    fn key(&self) -> &str {
        &self.link
    }

    fn row(&self) -> Vec<String> {
        let d = &self.details;
        vec![
            self.link.clone(),
            d.company.clone(),
            d.address.clone(),
            d.website.clone(),
            d.contact_person.clone(),
            d.email.clone(),
            d.phone.clone(),
            d.fax.clone(),
        ]
    }
}

/// Job links are the unit the directory pages yield; the link is its own key.
impl Record for String {
    const COLUMNS: &'static [&'static str] = &["Job Link"];

    fn key(&self) -> &str {
        self
    }

    fn row(&self) -> Vec<String> {
        vec![self.clone()]
    }
}
