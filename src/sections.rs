use chrono::{DateTime, Utc};
use tracing::{error, warn};

use crate::model::{
    DashboardStats, InventoryStats, MedicineStats, OrderChoices, OrderStats, Record, ReportStats,
    Section, SupplierStats, Thresholds,
};
use crate::months::{MonthlyTotals, MonthWindow, TREND_MONTHS};
use crate::scanner::{scan, scan_where};
use crate::stats::{
    count_open, count_with_status, inventory_stats, mean_delivery_days, medicine_stats,
    monthly_revenue, order_stats, sum_totals,
};
use crate::status::Status;
use crate::store::{DocumentStore, FieldFilter, StoreError};


pub(crate) const INVENTORY: &'static str = "inventory";
pub(crate) const MEDICINES: &'static str = "medicines";
pub(crate) const ORDERS: &'static str = "orders";
pub(crate) const PRESCRIPTIONS: &'static str = "prescriptions";
pub(crate) const REPORTS: &'static str = "reports";
pub(crate) const SUPPLIERS: &'static str = "suppliers";


/// The view's contents, or `fallback()` if they could not be computed.
pub(crate) fn or_else<T, F: FnOnce() -> T>(view: &str, result: Result<T, StoreError>, fallback: F) -> T {
    result.unwrap_or_else(|e| {
        error!("failed to compute the {} view, showing defaults: {}", view, e);
        fallback()
    })
}

pub(crate) fn or_default<T: Default>(view: &str, result: Result<T, StoreError>) -> T {
    or_else(view, result, T::default)
}

fn or_fallback<T>(figure: &str, result: Result<T, StoreError>, fallback: T) -> T {
    result.unwrap_or_else(|e| {
        warn!("failed to compute {}: {}", figure, e);
        fallback
    })
}

fn with_status(statuses: Vec<Status>) -> [FieldFilter; 1] {
    [FieldFilter::StatusIn { field: "status", statuses }]
}

/// Newest first by the first of `fields` holding a timestamp; records without one are left out.
fn most_recent(records: Vec<Record>, fields: &[&str], limit: usize) -> Vec<Record> {
    let mut dated: Vec<(DateTime<Utc>, Record)> = records.into_iter()
        .filter_map(|r| {
            let at = fields.iter().find_map(|f| r.timestamp(f))?;
            Some((at, r))
        })
        .collect();
    dated.sort_by(|a, b| b.0.cmp(&a.0));
    dated.into_iter()
        .take(limit)
        .map(|(_, r)| r)
        .collect()
}


pub(crate) fn dashboard(
    store: &dyn DocumentStore,
    now: DateTime<Utc>,
    thresholds: &Thresholds,
) -> Result<Section<DashboardStats>, StoreError> {
    let medicines = scan(store, MEDICINES)?;
    let medicine = medicine_stats(&medicines, now.date_naive(), thresholds);

    let active_prescriptions = or_fallback(
        "active prescriptions",
        scan_where(store, PRESCRIPTIONS, &with_status(vec![Status::Active]))
            .map(|p| count_with_status(&p, Status::Active)),
        0,
    );
    let low_inventory = or_fallback(
        "low inventory",
        scan(store, INVENTORY).map(|items| inventory_stats(&items, &[], thresholds).low_stock),
        0,
    );

    let window = MonthWindow::trailing(now, TREND_MONTHS);
    let orders = scan_where(store, ORDERS, &FieldFilter::within("date", window.start(), window.end()))?;
    let chart = monthly_revenue(&orders, window);

    Ok(Section {
        stats: DashboardStats {
            total_medicines: medicine.total_medicines,
            expiring_soon: medicine.expiring_soon,
            active_prescriptions,
            low_inventory,
        },
        chart: Some(chart),
        records: Vec::new(),
    })
}

/// Zeroed dashboard figures that still chart the trailing months.
pub(crate) fn empty_dashboard(now: DateTime<Utc>) -> Section<DashboardStats> {
    let window = MonthWindow::trailing(now, TREND_MONTHS);
    Section {
        stats: DashboardStats::default(),
        chart: Some(MonthlyTotals::new(window).into_chart()),
        records: Vec::new(),
    }
}

pub(crate) fn inventory(
    store: &dyn DocumentStore,
    thresholds: &Thresholds,
) -> Result<Section<InventoryStats>, StoreError> {
    let items = scan(store, INVENTORY)?;
    let open_orders = scan_where(store, ORDERS, &with_status(vec![Status::Pending, Status::Active]))?;
    Ok(Section {
        stats: inventory_stats(&items, &open_orders, thresholds),
        chart: None,
        records: items,
    })
}

pub(crate) fn medicines(
    store: &dyn DocumentStore,
    now: DateTime<Utc>,
    thresholds: &Thresholds,
) -> Result<Section<MedicineStats>, StoreError> {
    let medicines = scan(store, MEDICINES)?;
    Ok(Section {
        stats: medicine_stats(&medicines, now.date_naive(), thresholds),
        chart: None,
        records: medicines,
    })
}

pub(crate) fn orders(
    store: &dyn DocumentStore,
    now: DateTime<Utc>,
    thresholds: &Thresholds,
) -> Result<Section<OrderStats>, StoreError> {
    let orders = scan(store, ORDERS)?;
    let stats = order_stats(&orders, now);
    Ok(Section {
        stats,
        chart: None,
        records: most_recent(orders, &["date"], thresholds.recent_orders),
    })
}

pub(crate) fn suppliers(
    store: &dyn DocumentStore,
    now: DateTime<Utc>,
) -> Result<Section<SupplierStats>, StoreError> {
    let suppliers = scan(store, SUPPLIERS)?;

    let active_orders = or_fallback(
        "active orders",
        scan_where(store, ORDERS, &with_status(vec![Status::Pending, Status::Active]))
            .map(|o| count_open(&o)),
        0,
    );

    let this_month = MonthWindow::current(now);
    let expenses_month = or_fallback(
        "this month's expenses",
        scan_where(store, ORDERS, &FieldFilter::within("date", this_month.start(), this_month.end()))
            .map(|o| sum_totals(&o)),
        0.0,
    );

    let avg_delivery_days = or_fallback(
        "average delivery time",
        scan_where(store, ORDERS, &with_status(vec![Status::Delivered]))
            .map(|o| mean_delivery_days(&o)),
        None,
    );

    Ok(Section {
        stats: SupplierStats {
            total_suppliers: suppliers.len() as u64,
            active_orders,
            expenses_month,
            avg_delivery_days,
        },
        chart: None,
        records: suppliers,
    })
}

pub(crate) fn reports(
    store: &dyn DocumentStore,
    thresholds: &Thresholds,
) -> Result<Section<ReportStats>, StoreError> {
    let reports = scan(store, REPORTS)?;
    Ok(Section {
        stats: ReportStats { total_reports: reports.len() as u64 },
        chart: None,
        records: most_recent(reports, &["created_at", "date"], thresholds.recent_reports),
    })
}

/// Medicines in stock that a new report can include, by name.
pub(crate) fn report_candidates(
    store: &dyn DocumentStore,
    now: DateTime<Utc>,
    thresholds: &Thresholds,
) -> Result<Section<MedicineStats>, StoreError> {
    let in_stock = [FieldFilter::GreaterThan { field: "stock", value: 0.0 }];
    let mut candidates = scan_where(store, MEDICINES, &in_stock)?;
    candidates.sort_by(|a, b| a.text("name").unwrap_or("").cmp(b.text("name").unwrap_or("")));
    Ok(Section {
        stats: medicine_stats(&candidates, now.date_naive(), thresholds),
        chart: None,
        records: candidates,
    })
}

pub(crate) fn order_choices(store: &dyn DocumentStore) -> Result<OrderChoices, StoreError> {
    Ok(OrderChoices {
        items: scan(store, INVENTORY)?,
        suppliers: scan(store, SUPPLIERS)?,
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    use crate::store::testing::MemoryStore;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap()
    }

    fn pharmacy() -> MemoryStore {
        MemoryStore::new()
            .with(MEDICINES, "m1", json!({"name": "Paracetamol", "stock": 40, "expiry": "2026-10-30"}))
            .with(MEDICINES, "m2", json!({"name": "Amoxicillin", "stock": 0, "expiry": "2027-03-01"}))
            .with(MEDICINES, "m3", json!({"name": "Cetirizine", "stock": "12", "expiration": "2026-11-10"}))
            .with(INVENTORY, "i1", json!({"name": "Paracetamol", "stock": 5, "min": 10, "price": "1.25"}))
            .with(INVENTORY, "i2", json!({"name": "Amoxicillin", "stock": 0, "min": 5, "price": 4}))
            .with(INVENTORY, "i3", json!({"name": "Cetirizine", "stock": 30, "min": 10}))
            .with(PRESCRIPTIONS, "p1", json!({"status": "active"}))
            .with(PRESCRIPTIONS, "p2", json!({"status": "قيد التنفيذ"}))
            .with(PRESCRIPTIONS, "p3", json!({"status": "completed"}))
            .with(ORDERS, "o1", json!({
                "status": "pending",
                "total": "1,000",
                "date": {"$timestamp": "2026-10-02T10:00:00Z"},
                "items": [{"item_id": "i1", "quantity": 10}],
            }))
            .with(ORDERS, "o2", json!({
                "status": "Shipped",
                "total": 250.5,
                "date": {"$timestamp": "2026-09-12T10:00:00Z"},
                "items": [{"item_id": "i2"}, {"item_id": "i1"}],
            }))
            .with(ORDERS, "o3", json!({
                "status": "تم التسليم",
                "total": "80",
                "date": {"$timestamp": "2026-10-01T00:00:00"},
                "delivered_at": {"$timestamp": "2026-10-04T00:00:00Z"},
                "items": [{"item_id": "i3"}],
            }))
            .with(ORDERS, "o4", json!({"status": "cancelled", "total": "n/a"}))
            .with(SUPPLIERS, "s1", json!({"name": "MediCorp"}))
            .with(SUPPLIERS, "s2", json!({"name": "HealthPlus"}))
            .with(REPORTS, "r1", json!({"title": "Q3", "created_at": {"$timestamp": "2026-09-30T00:00:00Z"}}))
            .with(REPORTS, "r2", json!({"title": "Old", "date": {"$timestamp": "2026-01-01T00:00:00Z"}}))
            .with(REPORTS, "r3", json!({"title": "Undated"}))
            .with(REPORTS, "r4", json!({"title": "Oct", "created_at": {"$timestamp": "2026-10-15T00:00:00Z"}}))
    }

    fn ids<S>(section: &Section<S>) -> Vec<&str> {
        section.records.iter().map(|r| r.id()).collect()
    }

    #[test]
    fn dashboard_figures() {
        let section = dashboard(&pharmacy(), now(), &Thresholds::default()).unwrap();
        assert_eq!(section.stats, DashboardStats {
            total_medicines: 3,
            expiring_soon: 2,
            active_prescriptions: 2,
            low_inventory: 2,
        });
        let chart = section.chart.expect("dashboard has a chart");
        assert_eq!(chart.months, vec!["May", "Jun", "Jul", "Aug", "Sep", "Oct"]);
        assert_eq!(chart.sales, vec![0.0, 0.0, 0.0, 0.0, 250.5, 1080.0]);
    }

    #[test]
    fn dashboard_survives_refused_queries() {
        let expected = dashboard(&pharmacy(), now(), &Thresholds::default()).unwrap();
        let fallback = dashboard(&pharmacy().rejecting_queries(), now(), &Thresholds::default()).unwrap();
        assert_eq!(fallback, expected);
    }

    #[test]
    fn dashboard_sub_figures_degrade_alone() {
        let store = pharmacy().breaking(PRESCRIPTIONS).breaking(INVENTORY);
        let section = dashboard(&store, now(), &Thresholds::default()).unwrap();
        assert_eq!(section.stats.active_prescriptions, 0);
        assert_eq!(section.stats.low_inventory, 0);
        assert_eq!(section.stats.total_medicines, 3);
    }

    #[test]
    fn broken_orders_zero_the_dashboard() {
        let store = pharmacy().breaking(ORDERS);
        let section = or_else(
            "dashboard",
            dashboard(&store, now(), &Thresholds::default()),
            || empty_dashboard(now()),
        );
        assert_eq!(section.stats, DashboardStats::default());
        assert!(section.records.is_empty());
        let chart = section.chart.expect("failed dashboard keeps its chart");
        assert_eq!(chart.months, vec!["May", "Jun", "Jul", "Aug", "Sep", "Oct"]);
        assert_eq!(chart.sales, vec![0.0; 6]);
    }

    #[test]
    fn broken_views_fall_back_to_defaults() {
        let store = pharmacy().breaking(INVENTORY);
        let section = or_default("inventory", inventory(&store, &Thresholds::default()));
        assert_eq!(section, Section::default());
    }

    #[test]
    fn inventory_figures() {
        let section = inventory(&pharmacy(), &Thresholds::default()).unwrap();
        assert_eq!(section.stats, InventoryStats {
            total_items: 3,
            active_items: 2,
            low_stock: 2,
            critical: 1,
            out_of_stock: 1,
            on_order: 2,
            inventory_value: 6.25,
            active_pct: 67,
            low_pct: 67,
            on_order_pct: 67,
        });
        assert_eq!(ids(&section), vec!["i1", "i2", "i3"]);
    }

    #[test]
    fn order_figures_and_listing() {
        let section = orders(&pharmacy(), now(), &Thresholds::default()).unwrap();
        assert_eq!(section.stats, OrderStats {
            total_orders: 4,
            pending: 1,
            month_total: 1080.0,
            avg_order_value: Some(443.5),
        });
        assert_eq!(ids(&section), vec!["o1", "o3", "o2"]);

        let short = Thresholds { recent_orders: 1, ..Thresholds::default() };
        let section = orders(&pharmacy(), now(), &short).unwrap();
        assert_eq!(ids(&section), vec!["o1"]);
    }

    #[test]
    fn supplier_figures() {
        let section = suppliers(&pharmacy(), now()).unwrap();
        assert_eq!(section.stats, SupplierStats {
            total_suppliers: 2,
            active_orders: 2,
            expenses_month: 1080.0,
            avg_delivery_days: Some(3.0),
        });
        assert_eq!(ids(&section), vec!["s1", "s2"]);

        let fallback = suppliers(&pharmacy().rejecting_queries(), now()).unwrap();
        assert_eq!(fallback, section);
    }

    #[test]
    fn supplier_figures_degrade_alone() {
        let section = suppliers(&pharmacy().breaking(ORDERS), now()).unwrap();
        assert_eq!(section.stats, SupplierStats {
            total_suppliers: 2,
            active_orders: 0,
            expenses_month: 0.0,
            avg_delivery_days: None,
        });
    }

    #[test]
    fn report_listing_is_newest_first() {
        let section = reports(&pharmacy(), &Thresholds::default()).unwrap();
        assert_eq!(section.stats.total_reports, 4);
        assert_eq!(ids(&section), vec!["r4", "r1", "r2"]);
    }

    #[test]
    fn report_candidates_are_in_stock_and_sorted() {
        let section = report_candidates(&pharmacy(), now(), &Thresholds::default()).unwrap();
        assert_eq!(ids(&section), vec!["m3", "m1"]);
        assert_eq!(section.stats.total_medicines, 2);
    }

    #[test]
    fn order_choices_list_items_and_suppliers() {
        let choices = order_choices(&pharmacy()).unwrap();
        let item_ids: Vec<&str> = choices.items.iter().map(|r| r.id()).collect();
        let supplier_ids: Vec<&str> = choices.suppliers.iter().map(|r| r.id()).collect();
        assert_eq!(item_ids, vec!["i1", "i2", "i3"]);
        assert_eq!(supplier_ids, vec!["s1", "s2"]);
    }

    #[test]
    fn broken_order_choices_are_empty() {
        let store = pharmacy().breaking(SUPPLIERS);
        assert!(order_choices(&store).is_err());
        assert_eq!(or_default("order choices", order_choices(&store)), OrderChoices::default());
    }

    #[test]
    fn empty_store_gives_zeroes() {
        let store = MemoryStore::new();
        let thresholds = Thresholds::default();
        assert_eq!(inventory(&store, &thresholds).unwrap(), Section::default());
        assert_eq!(orders(&store, now(), &thresholds).unwrap(), Section::default());
        assert_eq!(suppliers(&store, now()).unwrap(), Section::default());
        assert_eq!(medicines(&store, now(), &thresholds).unwrap(), Section::default());
        assert_eq!(reports(&store, &thresholds).unwrap(), Section::default());

        let section = dashboard(&store, now(), &thresholds).unwrap();
        assert_eq!(section.stats, DashboardStats::default());
        assert_eq!(section.chart.map(|c| c.sales), Some(vec![0.0; 6]));
    }
}
