use tabled::{settings::Style, Table, Tabled};

use crate::record::{HistoryRecord, UrlRecord};

#[derive(Tabled)]
struct UrlRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "Interval (s)")]
    interval: i64,
}

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "Fetched at")]
    created_at: String,
    #[tabled(rename = "Duration (s)")]
    duration: String,
    #[tabled(rename = "Response")]
    response: String,
}

/// Render registered URLs; empty string when there are none.
pub fn url_table(records: &[UrlRecord]) -> String {
    if records.is_empty() {
        return String::new();
    }

    let rows = records.iter().map(|r| UrlRow {
        id: r.id,
        url: r.url.clone(),
        interval: r.interval,
    });
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Render fetch history; empty string when there is none.
pub fn history_table(records: &[HistoryRecord]) -> String {
    if records.is_empty() {
        return String::new();
    }

    let rows = records.iter().map(|r| HistoryRow {
        created_at: r.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        duration: format!("{:.3}", r.duration),
        response: r.response.clone(),
    });
    Table::new(rows).with(Style::rounded()).to_string()
}
