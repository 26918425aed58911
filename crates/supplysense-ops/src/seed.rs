//! Sample-data seeding.
//!
//! Loads a JSON dataset and writes it into the SupplySense tables with
//! conditional puts, so a re-run never duplicates items. A table that
//! already holds data is left untouched unless `--force` is given. The
//! actions and approvals tables are always cleared first, since they hold
//! run-time state, not sample data.

use std::path::Path;

use aws_config::SdkConfig;
use snafu::prelude::*;

use crate::{
    aws::dynamodb::{self, PutOutcome},
    config::{Profile, TableSpec},
    console, DataParseSnafu, DataReadSnafu, MissingTableSnafu,
};

/// Page size when clearing tables.
const CLEAR_PAGE: i32 = 25;

/// The bundled dataset layout.
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedData {
    pub inventory: Vec<serde_json::Value>,
    pub orders: Vec<serde_json::Value>,
    pub suppliers: Vec<serde_json::Value>,
    pub logistics: Vec<serde_json::Value>,
    pub demand_forecast: Vec<serde_json::Value>,
}

impl SeedData {
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        log::debug!("loading seed data from {}", path.display());
        let contents = std::fs::read_to_string(path).context(DataReadSnafu { path })?;
        serde_json::from_str(&contents).context(DataParseSnafu { path })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SeedOpts {
    /// Overwrite existing data instead of skipping non-empty tables.
    pub force: bool,
    /// Report every inserted or skipped item.
    pub verbose: bool,
}

/// Whether a table that already reports `existing` items should receive
/// seed writes.
pub fn should_seed(existing: usize, force: bool) -> bool {
    existing == 0 || force
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TableSummary {
    pub inserted: usize,
    pub skipped: usize,
}

#[derive(Clone, Debug, PartialEq)]
enum SeedOutcome {
    Seeded(TableSummary),
    /// The table already had items and `--force` was absent; success.
    SkippedNonEmpty(usize),
    MissingTable,
    Failed(String),
}

fn item_label(spec: &TableSpec, value: &serde_json::Value) -> String {
    value
        .get(&spec.partition_key)
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_owned()
}

async fn seed_table(
    cfg: &SdkConfig,
    spec: &TableSpec,
    items: &[serde_json::Value],
    opts: SeedOpts,
) -> SeedOutcome {
    console::info(format!("seeding {} with {} items", spec.name, items.len()));

    match dynamodb::table_exists(cfg, &spec.name).await {
        Ok(true) => {}
        Ok(false) => {
            console::error(format!(
                "table {} does not exist; deploy infrastructure first",
                spec.name
            ));
            return SeedOutcome::MissingTable;
        }
        Err(err) => {
            console::error(format!("could not describe {}: {err:#}", spec.name));
            return SeedOutcome::Failed(format!("{err:#}"));
        }
    }

    let existing = match dynamodb::item_count(cfg, &spec.name).await {
        Ok(count) => count,
        Err(err) => {
            console::warning(format!(
                "could not count items in {}: {err:#}",
                spec.name
            ));
            0
        }
    };
    if !should_seed(existing, opts.force) {
        console::warning(format!(
            "table {} already has {existing} items; use --force to overwrite",
            spec.name
        ));
        return SeedOutcome::SkippedNonEmpty(existing);
    }

    let mut summary = TableSummary::default();
    for value in items {
        let Some(item) = dynamodb::item_from_json(value) else {
            console::warning(format!("  skipping a non-object item for {}", spec.name));
            summary.skipped += 1;
            continue;
        };
        match dynamodb::put_item(cfg, spec, item, opts.force).await {
            Ok(PutOutcome::Inserted) => {
                summary.inserted += 1;
                if opts.verbose {
                    console::success(format!("  inserted {}", item_label(spec, value)));
                }
            }
            Ok(PutOutcome::AlreadyExists) => {
                summary.skipped += 1;
                if opts.verbose {
                    console::warning(format!("  already exists: {}", item_label(spec, value)));
                }
            }
            Err(err) => {
                summary.skipped += 1;
                console::error(format!("  error inserting item: {err:#}"));
            }
        }
    }
    if summary.inserted > 0 {
        console::success(format!(
            "seeded {} items in {}",
            summary.inserted, spec.name
        ));
    }
    if summary.skipped > 0 {
        console::warning(format!(
            "{} items were skipped (already exist or errors)",
            summary.skipped
        ));
    }
    SeedOutcome::Seeded(summary)
}

/// Removes every item from a table, page by page. Best-effort; returns
/// the number deleted.
pub async fn clear_table(cfg: &SdkConfig, spec: &TableSpec) -> usize {
    console::info(format!("clearing {}", spec.name));
    match dynamodb::table_exists(cfg, &spec.name).await {
        Ok(true) => {}
        Ok(false) => {
            console::warning(format!("table {} does not exist, skipping", spec.name));
            return 0;
        }
        Err(err) => {
            console::warning(format!("could not describe {}: {err:#}", spec.name));
            return 0;
        }
    }
    let mut deleted = 0usize;
    let mut start_key: Option<dynamodb::Item> = None;
    loop {
        let (items, next) =
            match dynamodb::scan_page(cfg, &spec.name, start_key, CLEAR_PAGE).await {
                Ok(page) => page,
                Err(err) => {
                    console::error(format!("could not scan {}: {err:#}", spec.name));
                    return deleted;
                }
            };
        for item in items {
            let Some(key) = dynamodb::item_key(spec, &item) else {
                log::warn!("an item in {} is missing its key attributes", spec.name);
                continue;
            };
            match dynamodb::delete_item(cfg, &spec.name, key).await {
                Ok(()) => deleted += 1,
                Err(err) => console::error(format!("  error deleting item: {err:#}")),
            }
        }
        match next {
            Some(key) => start_key = Some(key),
            None => break,
        }
    }
    if deleted > 0 {
        console::success(format!("deleted {deleted} items from {}", spec.name));
    } else {
        console::info(format!("no items to delete in {}", spec.name));
    }
    deleted
}

/// Seeds all tables. The five seedable tables are independent, so their
/// writes are issued together and awaited as a group.
pub async fn run(
    cfg: &SdkConfig,
    profile: &Profile,
    data: &SeedData,
    opts: SeedOpts,
) -> crate::Result<()> {
    console::header("Seeding SupplySense sample data");

    let actions = clear_table(cfg, &profile.tables.actions).await;
    let approvals = clear_table(cfg, &profile.tables.approvals).await;
    console::success(format!("cleared {actions} actions and {approvals} approvals"));

    if opts.force {
        console::warning("force mode enabled - existing data will be overwritten");
    }

    let tables = &profile.tables;
    let (inventory, orders, suppliers, logistics, demand) = tokio::join!(
        seed_table(cfg, &tables.inventory, &data.inventory, opts),
        seed_table(cfg, &tables.orders, &data.orders, opts),
        seed_table(cfg, &tables.suppliers, &data.suppliers, opts),
        seed_table(cfg, &tables.logistics, &data.logistics, opts),
        seed_table(cfg, &tables.demand_forecast, &data.demand_forecast, opts),
    );

    let outcomes = [
        (&tables.inventory.name, inventory),
        (&tables.orders.name, orders),
        (&tables.suppliers.name, suppliers),
        (&tables.logistics.name, logistics),
        (&tables.demand_forecast.name, demand),
    ];
    for (name, outcome) in &outcomes {
        match outcome {
            SeedOutcome::MissingTable => {
                return MissingTableSnafu {
                    table: (*name).clone(),
                }
                .fail();
            }
            SeedOutcome::Failed(reason) => {
                return Err(anyhow::anyhow!("seeding {name} failed: {reason}").into());
            }
            SeedOutcome::Seeded(_) | SeedOutcome::SkippedNonEmpty(_) => {}
        }
    }

    console::header("Data seeding complete");
    console::info("sample data includes:");
    console::detail(format!("{} inventory records", data.inventory.len()));
    console::detail(format!("{} customer orders", data.orders.len()));
    console::detail(format!("{} suppliers", data.suppliers.len()));
    console::detail(format!("{} shipment records", data.logistics.len()));
    console::detail(format!("{} demand forecasts", data.demand_forecast.len()));
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_tables_are_always_seedable() {
        assert!(should_seed(0, false));
        assert!(should_seed(0, true));
    }

    #[test]
    fn non_empty_tables_require_force() {
        assert!(!should_seed(1, false));
        assert!(!should_seed(500, false));
        assert!(should_seed(500, true));
    }

    #[test]
    fn dataset_parses_with_camel_case_sections() {
        let data: SeedData = serde_json::from_str(
            r#"{
                "inventory": [{ "productId": "PROD-001", "locationId": "WH-EAST" }],
                "orders": [],
                "suppliers": [],
                "logistics": [],
                "demandForecast": [{ "productId": "PROD-001", "forecastDate": "2026-01-01" }]
            }"#,
        )
        .unwrap();
        assert_eq!(1, data.inventory.len());
        assert_eq!(1, data.demand_forecast.len());
    }

    #[test]
    fn item_labels_use_the_partition_key() {
        let spec = crate::config::TableSpec::new("supplysense-orders", "orderId");
        let value = serde_json::json!({ "orderId": "ORD-100", "quantity": 4 });
        assert_eq!("ORD-100", item_label(&spec, &value));
        let keyless = serde_json::json!({ "quantity": 4 });
        assert_eq!("unknown", item_label(&spec, &keyless));
    }
}
