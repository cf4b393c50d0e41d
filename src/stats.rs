use std::collections::BTreeSet;

use chrono::{DateTime, Days, NaiveDate, Utc};

use crate::model::{
    ChartData, FieldValue, InventoryStats, MedicineStats, OrderStats, Record, Thresholds,
};
use crate::months::{MonthlyTotals, MonthWindow};
use crate::normalize::{normalize_count, normalize_date, normalize_number};
use crate::status::Status;
use crate::util::{percent_of, round_to};


/// Stock below this is critical for an item whose minimum is `min`.
pub(crate) fn critical_threshold(min: i64, thresholds: &Thresholds) -> i64 {
    min.div_euclid(thresholds.critical_divisor.max(1))
        .max(thresholds.critical_floor)
}

/// `open_orders` are the orders whose items count as being on order.
pub(crate) fn inventory_stats(items: &[Record], open_orders: &[Record], thresholds: &Thresholds) -> InventoryStats {
    let mut stats = InventoryStats {
        total_items: items.len() as u64,
        ..Default::default()
    };

    let mut value = 0.0;
    for item in items {
        let stock = normalize_count(item.get("stock")).unwrap_or(0);
        if let Some(price) = normalize_number(item.get("price")) {
            value += price * stock as f64;
        }

        let deactivated = item.get("active") == Some(&FieldValue::Bool(false));
        if stock > 0 && !deactivated {
            stats.active_items += 1;
        }
        if stock <= 0 {
            stats.out_of_stock += 1;
        }

        // items without a minimum are never low
        if let Some(min) = normalize_count(item.get("min")) {
            if stock < min {
                stats.low_stock += 1;
                if stock < critical_threshold(min, thresholds) {
                    stats.critical += 1;
                }
            }
        }
    }
    stats.inventory_value = round_to(value, 2);
    stats.on_order = items_on_order(open_orders).len() as u64;

    stats.active_pct = percent_of(stats.active_items, stats.total_items);
    stats.low_pct = percent_of(stats.low_stock, stats.total_items);
    stats.on_order_pct = percent_of(stats.on_order, stats.total_items);
    stats
}

/// Distinct item identifiers referenced by the rows of the orders' `items` lists.
pub(crate) fn items_on_order(orders: &[Record]) -> BTreeSet<String> {
    let mut ids = BTreeSet::new();
    for order in orders {
        let rows = match order.get("items") {
            Some(FieldValue::List(rows)) => rows,
            _ => continue,
        };
        for row in rows {
            let row = match row {
                FieldValue::Map(row) => row,
                _ => continue,
            };
            let id = ["item_id", "id", "code"].iter()
                .filter_map(|key| row.get(*key))
                .find(|v| v.is_truthy());
            match id {
                Some(FieldValue::Text(s)) => { ids.insert(s.clone()); },
                Some(FieldValue::Integer(i)) => { ids.insert(i.to_string()); },
                Some(FieldValue::Float(f)) => { ids.insert(f.to_string()); },
                _ => {},
            }
        }
    }
    ids
}

pub(crate) fn order_stats(orders: &[Record], now: DateTime<Utc>) -> OrderStats {
    let this_month = MonthWindow::current(now);
    let mut stats = OrderStats::default();
    let mut priced_sum = 0.0;
    let mut priced_count: u64 = 0;

    for order in orders {
        stats.total_orders += 1;
        if Status::of_value(order.get("status")) == Status::Pending {
            stats.pending += 1;
        }

        let amount = match normalize_number(order.get("total")) {
            Some(a) => a,
            None => continue,
        };
        priced_sum += amount;
        priced_count += 1;
        if order.timestamp("date").map_or(false, |d| this_month.contains(d)) {
            stats.month_total += amount;
        }
    }

    stats.month_total = round_to(stats.month_total, 2);
    if priced_count > 0 {
        stats.avg_order_value = Some(round_to(priced_sum / priced_count as f64, 2));
    }
    stats
}

pub(crate) fn medicine_stats(medicines: &[Record], today: NaiveDate, thresholds: &Thresholds) -> MedicineStats {
    let horizon_days = thresholds.expiry_horizon_days.max(0) as u64;
    let horizon = today.checked_add_days(Days::new(horizon_days))
        .unwrap_or(NaiveDate::MAX);

    let expiring_soon = medicines.iter()
        .filter_map(|m| normalize_date(m.first_set(&["expiry", "expiration"])))
        .filter(|expiry| today <= *expiry && *expiry <= horizon)
        .count();

    MedicineStats {
        total_medicines: medicines.len() as u64,
        expiring_soon: expiring_soon as u64,
    }
}

pub(crate) fn count_with_status(records: &[Record], wanted: Status) -> u64 {
    records.iter()
        .filter(|r| Status::of_value(r.get("status")) == wanted)
        .count() as u64
}

pub(crate) fn count_open(orders: &[Record]) -> u64 {
    orders.iter()
        .filter(|o| Status::of_value(o.get("status")).is_open())
        .count() as u64
}

/// Sum of the parsable `total`s, rounded to cents.
pub(crate) fn sum_totals(orders: &[Record]) -> f64 {
    let sum: f64 = orders.iter()
        .filter_map(|o| normalize_number(o.get("total")))
        .sum();
    round_to(sum, 2)
}

/// Mean days from `date` to `delivered_at` over the orders carrying both timestamps.
pub(crate) fn mean_delivery_days(delivered: &[Record]) -> Option<f64> {
    let spans: Vec<f64> = delivered.iter()
        .filter_map(|o| {
            let ordered = o.timestamp("date")?;
            let arrived = o.timestamp("delivered_at")?;
            Some((arrived - ordered).num_seconds() as f64 / 86_400.0)
        })
        .collect();
    if spans.is_empty() {
        return None;
    }
    Some(round_to(spans.iter().sum::<f64>() / spans.len() as f64, 1))
}

pub(crate) fn monthly_revenue(orders: &[Record], window: MonthWindow) -> ChartData {
    let mut totals = MonthlyTotals::new(window);
    for order in orders {
        let date = match order.timestamp("date") {
            Some(d) => d,
            None => continue,
        };
        if let Some(amount) = normalize_number(order.get("total")) {
            totals.add(date, amount);
        }
    }
    totals.into_chart()
}
