use askama::Template;

use crate::filters;
use crate::model::{OrderChoices, Record, Section, StatRow, StatRows};


/// Top-level views in navigation order: path segment and heading.
pub(crate) const VIEWS: [(&'static str, &'static str); 6] = [
    ("dashboard", "Dashboard"),
    ("inventory", "Inventory"),
    ("medicines", "Medicines"),
    ("orders", "Orders"),
    ("suppliers", "Suppliers"),
    ("reports", "Reports"),
];


pub(crate) struct NavLink {
    pub href: String,
    pub label: &'static str,
}

pub(crate) struct ChartBar {
    pub label: String,
    pub total: f64,
}

pub(crate) struct FieldCell {
    pub name: String,
    pub value: String,
}

pub(crate) struct RecordRow {
    pub id: String,
    pub cells: Vec<FieldCell>,
}

pub(crate) struct RecordGroup {
    pub heading: &'static str,
    pub rows: Vec<RecordRow>,
}

#[derive(Template)]
#[template(path = "section.html")]
pub(crate) struct SectionPage<'a> {
    pub title: &'a str,
    pub nav: Vec<NavLink>,
    pub stats: Vec<StatRow>,
    pub chart: Vec<ChartBar>,
    pub groups: Vec<RecordGroup>,
}


impl RecordRow {
    fn from_record(record: &Record) -> RecordRow {
        RecordRow {
            id: record.id().to_owned(),
            cells: record.fields().iter()
                .map(|(name, value)| FieldCell { name: name.clone(), value: value.to_string() })
                .collect(),
        }
    }
}

impl RecordGroup {
    fn of(heading: &'static str, records: &[Record]) -> Option<RecordGroup> {
        if records.is_empty() {
            return None;
        }
        Some(RecordGroup {
            heading,
            rows: records.iter().map(RecordRow::from_record).collect(),
        })
    }
}

fn nav_links(token: &str) -> Vec<NavLink> {
    let token_query = form_urlencoded::Serializer::new(String::new())
        .append_pair("token", token)
        .finish();
    VIEWS.iter()
        .map(|&(path, label)| NavLink {
            href: format!("{}?{}", path, token_query),
            label,
        })
        .collect()
}

impl<'a> SectionPage<'a> {
    pub fn new<S: StatRows>(title: &'a str, token: &str, section: &Section<S>) -> SectionPage<'a> {
        let chart = match &section.chart {
            Some(chart) => chart.months.iter()
                .zip(chart.sales.iter())
                .map(|(label, total)| ChartBar { label: label.clone(), total: *total })
                .collect(),
            None => Vec::new(),
        };

        SectionPage {
            title,
            nav: nav_links(token),
            stats: section.stats.stat_rows(),
            chart,
            groups: RecordGroup::of("Documents", &section.records).into_iter().collect(),
        }
    }

    pub fn order_choices(title: &'a str, token: &str, choices: &OrderChoices) -> SectionPage<'a> {
        SectionPage {
            title,
            nav: nav_links(token),
            stats: choices.stat_rows(),
            chart: Vec::new(),
            groups: [
                RecordGroup::of("Inventory items", &choices.items),
                RecordGroup::of("Suppliers", &choices.suppliers),
            ].into_iter().flatten().collect(),
        }
    }
}
