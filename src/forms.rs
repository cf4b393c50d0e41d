use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::model::{FieldValue, Timestamp};
use crate::sections::{MEDICINES, ORDERS, REPORTS, SUPPLIERS};
use crate::store::{DocumentStore, StoreError};
use crate::util::FormFields;


#[derive(Debug, Error)]
pub(crate) enum FormError {
    #[error("invalid value for {0:?}")]
    Invalid(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}


const SUPPLIER_FIELDS: [&'static str; 8] = [
    "name", "contact_person", "email", "phone", "address", "tax_id", "payment_terms", "notes",
];


fn text_or_null(form: &FormFields, key: &str) -> Value {
    form.get(key)
        .map(Value::from)
        .unwrap_or(Value::Null)
}

fn timestamp(now: DateTime<Utc>) -> Value {
    FieldValue::Timestamp(Timestamp::from(now)).to_json()
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}


pub(crate) fn add_medicine(store: &dyn DocumentStore, form: &FormFields) -> Result<String, FormError> {
    let stock: i64 = match form.get_nonempty("stock") {
        Some(s) => s.trim().parse()
            .map_err(|_| FormError::Invalid("stock"))?,
        None => 0,
    };

    let data = json!({
        "name": text_or_null(form, "name"),
        "category": text_or_null(form, "category"),
        "stock": stock,
        "expiry": text_or_null(form, "expiry"),
        "price": text_or_null(form, "price"),
    });
    Ok(store.add(MEDICINES, object(data))?)
}

/// New orders start out pending and dated now.
pub(crate) fn create_order(store: &dyn DocumentStore, form: &FormFields, now: DateTime<Utc>) -> Result<String, FormError> {
    let supplier = form.get_nonempty("supplier")
        .or_else(|| form.get("supplier_text"));

    let items: Vec<Value> = form.get_all("item_id[]").into_iter()
        .zip(form.get_all("quantity[]"))
        .filter(|(item_id, _)| !item_id.is_empty())
        .map(|(item_id, quantity)| json!({
            "item_id": item_id,
            "quantity": quantity.trim().parse::<i64>().unwrap_or(0),
        }))
        .collect();

    let data = json!({
        "supplier": supplier,
        "items": items,
        "status": "pending",
        "date": timestamp(now),
    });
    Ok(store.add(ORDERS, object(data))?)
}

pub(crate) fn add_supplier(store: &dyn DocumentStore, form: &FormFields, now: DateTime<Utc>) -> Result<String, FormError> {
    let mut data = Map::new();
    for field in SUPPLIER_FIELDS {
        data.insert(field.to_owned(), text_or_null(form, field));
    }
    data.insert("created_at".to_owned(), timestamp(now));
    data.insert("updated_at".to_owned(), timestamp(now));
    Ok(store.add(SUPPLIERS, data)?)
}

/// Drafts a report holding a snapshot of each selected medicine that still exists.
pub(crate) fn create_report(store: &dyn DocumentStore, form: &FormFields, now: DateTime<Utc>) -> Result<String, FormError> {
    let mut medicines = Vec::new();
    for id in form.get_all("selected_medicines") {
        let medicine = match store.get(MEDICINES, id)? {
            Some(doc) => doc.into_record(),
            None => continue,
        };
        let field_or = |name: &str, fallback: Value| medicine.get(name)
            .map(|v| v.to_json())
            .unwrap_or(fallback);
        medicines.push(json!({
            "id": id,
            "name": field_or("name", json!("Unnamed Medicine")),
            "stock": field_or("stock", json!(0)),
            "price": field_or("price", json!(0)),
            "category": field_or("category", json!("Uncategorized")),
        }));
    }

    let data = json!({
        "title": form.get("title").unwrap_or("Untitled Report"),
        "type": form.get("report_type").unwrap_or("custom"),
        "content": form.get("report_content").unwrap_or(""),
        "medicines": medicines,
        "include_stock": form.contains("include_stock"),
        "include_pricing": form.contains("include_pricing"),
        "export_format": form.get("export_format").unwrap_or("pdf"),
        "status": "draft",
        "created_at": timestamp(now),
        "updated_at": timestamp(now),
    });
    Ok(store.add(REPORTS, object(data))?)
}
