use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use derive_new::new;
use serde::{Deserialize, Serialize};
use serde::ser::SerializeMap;


/// Key of the single-entry JSON object that marks a stored timestamp.
pub(crate) const TIMESTAMP_TAG: &'static str = "$timestamp";

const NAIVE_TIMESTAMP_FORMATS: [&'static str; 2] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
];


#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub(crate) struct Config {
    pub listen_addr: String,
    pub base_url: String,
    pub data_path: String,
    pub auth_tokens: Vec<String>,
    #[serde(default)]
    pub log_dir: Option<String>,
    #[serde(default)]
    pub thresholds: Thresholds,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(default)]
pub(crate) struct Thresholds {
    /// An item is critical once its stock drops below `min / critical_divisor`...
    pub critical_divisor: i64,
    /// ... or below this floor, whichever is larger.
    pub critical_floor: i64,
    pub expiry_horizon_days: i64,
    pub recent_orders: usize,
    pub recent_reports: usize,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Timestamp {
    Zoned(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Timestamp(Timestamp),
    List(Vec<FieldValue>),
    Map(BTreeMap<String, FieldValue>),
}

#[derive(Clone, Debug, new, PartialEq)]
pub(crate) struct Record {
    id: String,
    fields: BTreeMap<String, FieldValue>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub(crate) struct DashboardStats {
    pub total_medicines: u64,
    pub expiring_soon: u64,
    pub active_prescriptions: u64,
    pub low_inventory: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub(crate) struct ChartData {
    pub months: Vec<String>,
    pub sales: Vec<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub(crate) struct InventoryStats {
    pub total_items: u64,
    pub active_items: u64,
    pub low_stock: u64,
    pub critical: u64,
    pub out_of_stock: u64,
    pub on_order: u64,
    pub inventory_value: f64,
    pub active_pct: u64,
    pub low_pct: u64,
    pub on_order_pct: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub(crate) struct OrderStats {
    pub total_orders: u64,
    pub pending: u64,
    pub month_total: f64,
    pub avg_order_value: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub(crate) struct SupplierStats {
    pub total_suppliers: u64,
    pub active_orders: u64,
    pub expenses_month: f64,
    pub avg_delivery_days: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub(crate) struct MedicineStats {
    pub total_medicines: u64,
    pub expiring_soon: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub(crate) struct ReportStats {
    pub total_reports: u64,
}

/// Everything one view shows: its figures, an optional trend chart and the listed documents.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub(crate) struct Section<S> {
    pub stats: S,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart: Option<ChartData>,
    pub records: Vec<Record>,
}

/// What a new order is put together from: the stocked items and the suppliers to order from.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub(crate) struct OrderChoices {
    pub items: Vec<Record>,
    pub suppliers: Vec<Record>,
}

#[derive(Clone, Debug, Eq, new, PartialEq)]
pub(crate) struct StatRow {
    pub label: &'static str,
    pub value: String,
}

pub(crate) trait StatRows {
    fn stat_rows(&self) -> Vec<StatRow>;
}


impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            critical_divisor: 2,
            critical_floor: 1,
            expiry_horizon_days: 30,
            recent_orders: 50,
            recent_reports: 10,
        }
    }
}

impl Timestamp {
    pub fn parse(text: &str) -> Option<Timestamp> {
        if let Ok(zoned) = DateTime::parse_from_rfc3339(text) {
            return Some(Timestamp::Zoned(zoned));
        }
        NAIVE_TIMESTAMP_FORMATS.iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
            .map(Timestamp::Naive)
    }

    /// Naive timestamps are taken to be UTC.
    pub fn to_utc(&self) -> DateTime<Utc> {
        match self {
            Timestamp::Zoned(zoned) => zoned.with_timezone(&Utc),
            Timestamp::Naive(naive) => Utc.from_utc_datetime(naive),
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            Timestamp::Zoned(zoned) => zoned.to_rfc3339(),
            Timestamp::Naive(naive) => naive.format(NAIVE_TIMESTAMP_FORMATS[0]).to_string(),
        }
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Timestamp::Zoned(value.fixed_offset())
    }
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<&Timestamp> {
        match self {
            FieldValue::Timestamp(ts) => Some(ts),
            _ => None,
        }
    }

    /// Whether the value counts as "set" when picking between alternative fields.
    pub fn is_truthy(&self) -> bool {
        match self {
            FieldValue::Null => false,
            FieldValue::Bool(b) => *b,
            FieldValue::Integer(i) => *i != 0,
            FieldValue::Float(f) => *f != 0.0,
            FieldValue::Text(s) => !s.is_empty(),
            FieldValue::Timestamp(_) => true,
            FieldValue::List(l) => !l.is_empty(),
            FieldValue::Map(m) => !m.is_empty(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Timestamp(ts) => {
                let mut tagged = serde_json::Map::new();
                tagged.insert(TIMESTAMP_TAG.to_owned(), Value::String(ts.to_text()));
                Value::Object(tagged)
            },
            FieldValue::List(items) => Value::Array(items.iter().map(|i| i.to_json()).collect()),
            FieldValue::Map(entries) => Value::Object(
                entries.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect()
            ),
        }
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Integer(i)
                } else {
                    n.as_f64()
                        .map(FieldValue::Float)
                        .unwrap_or(FieldValue::Null)
                }
            },
            Value::String(s) => FieldValue::Text(s),
            Value::Array(items) => FieldValue::List(items.into_iter().map(FieldValue::from).collect()),
            Value::Object(entries) => {
                if entries.len() == 1 {
                    if let Some(Value::String(text)) = entries.get(TIMESTAMP_TAG) {
                        // a mangled timestamp is as good as none
                        return Timestamp::parse(text)
                            .map(FieldValue::Timestamp)
                            .unwrap_or(FieldValue::Null);
                    }
                }
                FieldValue::Map(
                    entries.into_iter()
                        .map(|(k, v)| (k, FieldValue::from(v)))
                        .collect()
                )
            },
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Bool(b) => f.write_str(if *b { "yes" } else { "no" }),
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Float(x) => write!(f, "{}", x),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Timestamp(ts) => write!(f, "{}", ts.to_utc().format("%Y-%m-%d %H:%M")),
            FieldValue::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            },
            FieldValue::Map(entries) => {
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                Ok(())
            },
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl Record {
    pub fn id(&self) -> &str { &self.id }
    pub fn fields(&self) -> &BTreeMap<String, FieldValue> { &self.fields }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// The first of `fields` that holds a truthy value.
    pub fn first_set(&self, fields: &[&str]) -> Option<&FieldValue> {
        fields.iter()
            .filter_map(|f| self.fields.get(*f))
            .find(|v| v.is_truthy())
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(|v| v.as_str())
    }

    pub fn timestamp(&self, field: &str) -> Option<DateTime<Utc>> {
        self.get(field)
            .and_then(|v| v.as_timestamp())
            .map(|ts| ts.to_utc())
    }
}

impl Serialize for Record {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // a stored "id" field shadows the document identifier
        let shadowed = self.fields.contains_key("id");
        let len = self.fields.len() + if shadowed { 0 } else { 1 };
        let mut map = serializer.serialize_map(Some(len))?;
        if !shadowed {
            map.serialize_entry("id", &self.id)?;
        }
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}


fn count_text(count: u64) -> String {
    count.to_string()
}

fn amount_text(amount: f64) -> String {
    format!("{:.2}", amount)
}

fn optional_text(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", decimals, v),
        None => "n/a".to_owned(),
    }
}

impl StatRows for DashboardStats {
    fn stat_rows(&self) -> Vec<StatRow> {
        vec![
            StatRow::new("Total medicines", count_text(self.total_medicines)),
            StatRow::new("Expiring soon", count_text(self.expiring_soon)),
            StatRow::new("Active prescriptions", count_text(self.active_prescriptions)),
            StatRow::new("Low inventory", count_text(self.low_inventory)),
        ]
    }
}

impl StatRows for InventoryStats {
    fn stat_rows(&self) -> Vec<StatRow> {
        vec![
            StatRow::new("Total items", count_text(self.total_items)),
            StatRow::new("Active items", format!("{} ({}%)", self.active_items, self.active_pct)),
            StatRow::new("Low stock", format!("{} ({}%)", self.low_stock, self.low_pct)),
            StatRow::new("Critical", count_text(self.critical)),
            StatRow::new("Out of stock", count_text(self.out_of_stock)),
            StatRow::new("On order", format!("{} ({}%)", self.on_order, self.on_order_pct)),
            StatRow::new("Inventory value", amount_text(self.inventory_value)),
        ]
    }
}

impl StatRows for OrderStats {
    fn stat_rows(&self) -> Vec<StatRow> {
        vec![
            StatRow::new("Total orders", count_text(self.total_orders)),
            StatRow::new("Pending", count_text(self.pending)),
            StatRow::new("This month", amount_text(self.month_total)),
            StatRow::new("Average order value", optional_text(self.avg_order_value, 2)),
        ]
    }
}

impl StatRows for SupplierStats {
    fn stat_rows(&self) -> Vec<StatRow> {
        vec![
            StatRow::new("Total suppliers", count_text(self.total_suppliers)),
            StatRow::new("Active orders", count_text(self.active_orders)),
            StatRow::new("Expenses this month", amount_text(self.expenses_month)),
            StatRow::new("Average delivery days", optional_text(self.avg_delivery_days, 1)),
        ]
    }
}

impl StatRows for MedicineStats {
    fn stat_rows(&self) -> Vec<StatRow> {
        vec![
            StatRow::new("Total medicines", count_text(self.total_medicines)),
            StatRow::new("Expiring soon", count_text(self.expiring_soon)),
        ]
    }
}

impl StatRows for ReportStats {
    fn stat_rows(&self) -> Vec<StatRow> {
        vec![
            StatRow::new("Total reports", count_text(self.total_reports)),
        ]
    }
}

impl StatRows for OrderChoices {
    fn stat_rows(&self) -> Vec<StatRow> {
        vec![
            StatRow::new("Inventory items", count_text(self.items.len() as u64)),
            StatRow::new("Suppliers", count_text(self.suppliers.len() as u64)),
        ]
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tagged_timestamps_become_timestamps() {
        let value = FieldValue::from(json!({"$timestamp": "2026-03-04T05:06:07Z"}));
        let ts = value.as_timestamp().expect("not a timestamp");
        assert_eq!(ts.to_utc(), Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap());
    }

    #[test]
    fn naive_timestamps_are_utc() {
        let value = FieldValue::from(json!({"$timestamp": "2026-03-04T05:06:07"}));
        match &value {
            FieldValue::Timestamp(Timestamp::Naive(_)) => {},
            other => panic!("unexpected value {:?}", other),
        }
        let ts = value.as_timestamp().unwrap();
        assert_eq!(ts.to_utc(), Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap());
    }

    #[test]
    fn garbled_timestamp_is_null() {
        let value = FieldValue::from(json!({"$timestamp": "last tuesday"}));
        assert_eq!(value, FieldValue::Null);
    }

    #[test]
    fn objects_with_more_keys_stay_maps() {
        let value = FieldValue::from(json!({"$timestamp": "2026-03-04T05:06:07Z", "other": 1}));
        assert!(matches!(value, FieldValue::Map(_)));
    }

    #[test]
    fn json_round_trip_keeps_timestamps_tagged() {
        let tagged = json!({"$timestamp": "2026-03-04T05:06:07+02:00"});
        let value = FieldValue::from(tagged.clone());
        assert_eq!(value.to_json(), tagged);
    }

    #[test]
    fn record_serializes_id_first_unless_shadowed() {
        let mut fields = BTreeMap::new();
        fields.insert("name".to_owned(), FieldValue::Text("Aspirin".to_owned()));
        let record = Record::new("abc".to_owned(), fields.clone());
        assert_eq!(serde_json::to_value(&record).unwrap(), json!({"id": "abc", "name": "Aspirin"}));

        fields.insert("id".to_owned(), FieldValue::Text("#ORD1".to_owned()));
        let shadowed = Record::new("abc".to_owned(), fields);
        assert_eq!(serde_json::to_value(&shadowed).unwrap(), json!({"id": "#ORD1", "name": "Aspirin"}));
    }

    #[test]
    fn first_set_skips_falsy_values() {
        let mut fields = BTreeMap::new();
        fields.insert("expiry".to_owned(), FieldValue::Text(String::new()));
        fields.insert("expiration".to_owned(), FieldValue::Text("2026-01-01".to_owned()));
        let record = Record::new("m".to_owned(), fields);
        assert_eq!(record.first_set(&["expiry", "expiration"]).and_then(|v| v.as_str()), Some("2026-01-01"));
    }

    #[test]
    fn display_flattens_nested_values() {
        let value = FieldValue::from(json!([
            {"item_id": "a", "quantity": 2},
            {"item_id": "b", "at": {"$timestamp": "2026-10-02T08:15:00Z"}},
        ]));
        assert_eq!(value.to_string(), "item_id: a, quantity: 2; at: 2026-10-02 08:15, item_id: b");
        assert_eq!(FieldValue::Null.to_string(), "");
    }

    #[test]
    fn thresholds_fill_in_defaults() {
        let thresholds: Thresholds = toml::from_str("expiry_horizon_days = 14").unwrap();
        assert_eq!(thresholds.expiry_horizon_days, 14);
        assert_eq!(thresholds.critical_divisor, 2);
        assert_eq!(thresholds.critical_floor, 1);
        assert_eq!(thresholds.recent_orders, 50);
    }
}
