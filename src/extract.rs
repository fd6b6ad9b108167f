//! Row extractors: fetched document in, records out.
//!
//! Two policies live here.
//!
//! **Strict, positional** ([`extract_table`], [`extract_all_tables`]): field names come from the header row, cells are
//! read in order, and a body row whose cell count differs from the header's
//! is dropped whole. Stats tables vary page to page, so alignment is the
//! only guard against spliced or spanning markup.
//!
//! **Lenient, named** ([`extract_listing`]): the ranked market-value listing
//! is stable markup, read through one fixed selector per field. A missing
//! element becomes a null field and the row is kept.
//!
//! [`extract_transfers`] and [`first_link_containing`] are the per-page
//! readers for the transfer-history and profile-search jobs.

use crate::models::{Record, Value};
use crate::normalize::{parse_decimal, parse_fee, parse_market_value};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

static CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("th, td").unwrap());
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static TABLE_WITH_ID: Lazy<Selector> = Lazy::new(|| Selector::parse("table[id]").unwrap());

/// Selectors for a header-aligned table.
#[derive(Debug, Clone)]
pub struct TableLayout {
    /// Header cells, in column order.
    pub header: Selector,
    /// Body rows.
    pub row: Selector,
}

impl Default for TableLayout {
    /// The last header row's `th` cells, and every `tbody` row.
    fn default() -> Self {
        Self {
            header: Selector::parse("thead > tr:last-child > th").unwrap(),
            row: Selector::parse("tbody > tr").unwrap(),
        }
    }
}

/// Text of an element with each text node trimmed and the pieces joined
/// without separators.
pub fn cell_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Resolve `href` against `base`, keeping it verbatim when it cannot be joined.
pub fn absolute_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Cell text, followed by `" (<absolute link>)"` when the cell holds a link.
fn cell_with_link(cell: ElementRef<'_>, base: &Url) -> String {
    let text = cell_text(cell);
    match cell.select(&LINK).next().and_then(|a| a.value().attr("href")) {
        Some(href) => format!("{text} ({})", absolute_url(base, href)),
        None => text,
    }
}

/// Strict extraction from one table element.
pub fn extract_table(table: ElementRef<'_>, layout: &TableLayout, base: &Url) -> Vec<Record> {
    let names: Vec<String> = table.select(&layout.header).map(cell_text).collect();
    if names.is_empty() {
        return Vec::new();
    }

    let mut records = Vec::new();
    let mut dropped = 0usize;
    for tr in table.select(&layout.row) {
        let cells: Vec<String> = tr.select(&CELL).map(|c| cell_with_link(c, base)).collect();
        if cells.len() != names.len() {
            dropped += 1;
            continue;
        }
        let mut record = Record::new();
        for (name, cell) in names.iter().zip(cells) {
            record.push(name.clone(), Value::Text(cell));
        }
        records.push(record);
    }

    if dropped > 0 {
        debug!(
            table = table.value().id().unwrap_or_default(),
            columns = names.len(),
            dropped,
            kept = records.len(),
            "Dropped misaligned rows"
        );
    }
    records
}

/// Every `<table id=…>` on the page, as `(id, records)`; tables with no
/// aligned rows are left out.
pub fn extract_all_tables(document: &Html, base: &Url) -> Vec<(String, Vec<Record>)> {
    let layout = TableLayout::default();
    document
        .select(&TABLE_WITH_ID)
        .filter_map(|table| {
            let id = table.value().id()?.to_string();
            let records = extract_table(table, &layout, base);
            (!records.is_empty()).then_some((id, records))
        })
        .collect()
}

static LISTING_ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").unwrap());
static LISTING_NAME: Lazy<Selector> =
    Lazy::new(|| Selector::parse("td.td-player a[title]").unwrap());
static LISTING_AGE: Lazy<Selector> = Lazy::new(|| Selector::parse("td.age").unwrap());
static LISTING_CLUB: Lazy<Selector> =
    Lazy::new(|| Selector::parse("td.td-player .sub-text a[title]").unwrap());
static LISTING_POSITION: Lazy<Selector> =
    Lazy::new(|| Selector::parse("td.td-player span.sub-text").unwrap());
static LISTING_NATIONALITY: Lazy<Selector> =
    Lazy::new(|| Selector::parse("td.td-player figure img").unwrap());
static LISTING_SKILL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.table-skill__skill").unwrap());
static LISTING_POTENTIAL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.table-skill__pot").unwrap());
static LISTING_VALUE: Lazy<Selector> = Lazy::new(|| Selector::parse("span.player-tag").unwrap());

/// Column names written by [`extract_listing`], in order.
pub const LISTING_FIELDS: [&str; 10] = [
    "Name",
    "Player URL",
    "Age",
    "Club",
    "Club URL",
    "Position",
    "Nationality",
    "Skill",
    "Potential",
    "Market Value (€)",
];

/// Lenient extraction of the ranked market-value listing.
///
/// Only rows carrying a player link are listing rows; every other field is
/// optional and becomes null when its element is missing or unreadable.
pub fn extract_listing(document: &Html, base: &Url) -> Vec<Record> {
    let mut records = Vec::new();

    for row in document.select(&LISTING_ROW) {
        let Some(name_tag) = row.select(&LISTING_NAME).next() else {
            continue;
        };
        let find = |selector: &Selector| row.select(selector).next();

        let player_url = name_tag.value().attr("href").map(|h| absolute_url(base, h));
        let age = find(&LISTING_AGE).and_then(|e| cell_text(e).parse::<i64>().ok());
        let club_tag = find(&LISTING_CLUB);
        let club = club_tag.map(cell_text);
        let club_url = club_tag
            .and_then(|e| e.value().attr("href"))
            .map(|h| absolute_url(base, h));
        let position = find(&LISTING_POSITION).and_then(|e| {
            cell_text(e)
                .split('•')
                .next_back()
                .map(|p| p.trim().to_string())
        });
        let nationality = find(&LISTING_NATIONALITY)
            .and_then(|e| e.value().attr("alt"))
            .map(str::to_string);
        let skill = find(&LISTING_SKILL).and_then(|e| parse_decimal(&cell_text(e)));
        let potential = find(&LISTING_POTENTIAL).and_then(|e| parse_decimal(&cell_text(e)));
        let market_value = find(&LISTING_VALUE).and_then(|e| parse_market_value(&cell_text(e)));

        let [f_name, f_url, f_age, f_club, f_club_url, f_pos, f_nat, f_skill, f_pot, f_value] =
            LISTING_FIELDS;
        records.push(
            Record::new()
                .with(f_name, Value::Text(cell_text(name_tag)))
                .with(f_url, player_url)
                .with(f_age, age)
                .with(f_club, club)
                .with(f_club_url, club_url)
                .with(f_pos, position)
                .with(f_nat, nationality)
                .with(f_skill, skill)
                .with(f_pot, potential)
                .with(f_value, market_value),
        );
    }

    records
}

static HEADING: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static TRANSFER_ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("table tbody tr").unwrap());
static TRANSFER_CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("td").unwrap());
static TRANSFER_CLUB: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".transfer-club__name").unwrap());

pub const TRANSFER_FIELDS: [&str; 6] = [
    "Player Index",
    "Player",
    "Transfer From",
    "Transfer To",
    "Date",
    "Fee",
];

/// Transfer-history rows for one player.
///
/// The player name comes from the page heading, or `fallback_name` when the
/// page has none. Rows with fewer than three cells are not transfers; a
/// missing club is recorded as `"N/A"`.
pub fn extract_transfers(document: &Html, player_index: &str, fallback_name: &str) -> Vec<Record> {
    let player = document
        .select(&HEADING)
        .next()
        .map(cell_text)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| fallback_name.to_string());

    let index = player_index
        .parse::<i64>()
        .map(Value::Int)
        .unwrap_or_else(|_| Value::text(player_index));

    let [f_index, f_player, f_from, f_to, f_date, f_fee] = TRANSFER_FIELDS;
    let mut records = Vec::new();
    for row in document.select(&TRANSFER_ROW) {
        let cells: Vec<ElementRef<'_>> = row.select(&TRANSFER_CELL).collect();
        let [date, clubs, fee, ..] = cells.as_slice() else {
            continue;
        };
        let mut club_names = clubs.select(&TRANSFER_CLUB).map(cell_text);
        let from = club_names.next().unwrap_or_else(|| "N/A".to_string());
        let to = club_names.next().unwrap_or_else(|| "N/A".to_string());

        records.push(
            Record::new()
                .with(f_index, index.clone())
                .with(f_player, Value::text(player.as_str()))
                .with(f_from, Value::Text(from))
                .with(f_to, Value::Text(to))
                .with(f_date, Value::Text(cell_text(*date)))
                .with(f_fee, parse_fee(&cell_text(*fee))),
        );
    }

    debug!(player = %player, transfers = records.len(), "Parsed transfer history");
    records
}

/// First link whose target contains `needle`.
///
/// Search-engine redirect links (`/l/?uddg=<encoded target>`) are unwrapped
/// before matching, so the returned URL is the real destination.
pub fn first_link_containing(document: &Html, base: &Url, needle: &str) -> Option<String> {
    document
        .select(&LINK)
        .filter_map(|a| a.value().attr("href"))
        .map(|href| unwrap_redirect(base, href))
        .find(|target| target.contains(needle))
}

fn unwrap_redirect(base: &Url, href: &str) -> String {
    let Ok(url) = base.join(href) else {
        return href.to_string();
    };
    url.query_pairs()
        .find(|(key, _)| key == "uddg")
        .map(|(_, target)| target.into_owned())
        .unwrap_or_else(|| url.to_string())
}
