use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::records::{JobRecord, ListingRecord};

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let conn = Connection::open(path).with_context(|| format!("opening {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS listings (
            url           TEXT PRIMARY KEY,
            description   TEXT NOT NULL,
            price         TEXT NOT NULL,
            rating        TEXT NOT NULL DEFAULT '',
            review_count  TEXT NOT NULL DEFAULT '',
            query         TEXT NOT NULL,
            scraped_at    TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_listings_query ON listings(query);

        CREATE TABLE IF NOT EXISTS jobs (
            link            TEXT PRIMARY KEY,
            company         TEXT NOT NULL DEFAULT '',
            address         TEXT NOT NULL DEFAULT '',
            website         TEXT NOT NULL DEFAULT '',
            contact_person  TEXT NOT NULL DEFAULT '',
            email           TEXT NOT NULL DEFAULT '',
            phone           TEXT NOT NULL DEFAULT '',
            fax             TEXT NOT NULL DEFAULT '',
            scraped_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;
    Ok(())
}

pub fn save_listings(conn: &Connection, query: &str, rows: &[ListingRecord]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO listings (url, description, price, rating, review_count, query)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for r in rows {
            count += stmt.execute(rusqlite::params![
                r.url, r.description, r.price, r.rating, r.review_count, query,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub fn save_jobs(conn: &Connection, rows: &[JobRecord]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO jobs
             (link, company, address, website, contact_person, email, phone, fax)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for j in rows {
            let d = &j.details;
            count += stmt.execute(rusqlite::params![
                j.link, d.company, d.address, d.website, d.contact_person, d.email, d.phone, d.fax,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::JobDetails;

    fn open() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = connect(&dir.path().join("out/scrape.sqlite")).unwrap();
        init_schema(&conn).unwrap();
        (dir, conn)
    }

    fn listing(url: &str, price: &str) -> ListingRecord {
        ListingRecord {
            description: "Monitor".into(),
            price: price.into(),
            rating: "".into(),
            review_count: "".into(),
            url: url.into(),
        }
    }

    #[test]
    fn listings_replace_by_url() {
        let (_dir, conn) = open();
        save_listings(&conn, "ultrawide monitor", &[listing("https://a/1", "$1"), listing("https://a/2", "$2")])
            .unwrap();
        save_listings(&conn, "ultrawide monitor", &[listing("https://a/1", "$3")]).unwrap();

        let n: usize = conn.query_row("SELECT COUNT(*) FROM listings", [], |r| r.get(0)).unwrap();
        assert_eq!(n, 2);
        let price: String = conn
            .query_row("SELECT price FROM listings WHERE url = ?1", ["https://a/1"], |r| r.get(0))
            .unwrap();
        assert_eq!(price, "$3");
    }

    #[test]
    fn jobs_store_details() {
        let (_dir, conn) = open();
        let job = JobRecord::discovered("https://www.truckerboerse.net/kraftfahrer-jobs/9/x").with_details(
            JobDetails {
                company: "Muster KG".into(),
                email: "jobs@muster.de".into(),
                ..Default::default()
            },
        );
        assert_eq!(save_jobs(&conn, &[job]).unwrap(), 1);

        let (company, fax): (String, String) = conn
            .query_row("SELECT company, fax FROM jobs", [], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap();
        assert_eq!(company, "Muster KG");
        assert_eq!(fax, "");
    }

    #[test]
    fn schema_is_idempotent() {
        let (_dir, conn) = open();
        init_schema(&conn).unwrap();
    }
}
