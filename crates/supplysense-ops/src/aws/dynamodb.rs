//! AWS DynamoDB tables and items.

use std::collections::HashMap;

use aws_config::SdkConfig;
use aws_sdk_dynamodb::types::{AttributeValue, Select};

use crate::config::TableSpec;

/// One item, keyed by attribute name.
pub type Item = HashMap<String, AttributeValue>;

/// What happened to a conditional put.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PutOutcome {
    Inserted,
    /// The condition failed: an item with this key already exists.
    AlreadyExists,
}

/// Converts a JSON value into a DynamoDB attribute value. Numbers ride as
/// their decimal string form, which is what the document model expects.
pub fn attribute_value(value: &serde_json::Value) -> AttributeValue {
    match value {
        serde_json::Value::Null => AttributeValue::Null(true),
        serde_json::Value::Bool(b) => AttributeValue::Bool(*b),
        serde_json::Value::Number(n) => AttributeValue::N(n.to_string()),
        serde_json::Value::String(s) => AttributeValue::S(s.clone()),
        serde_json::Value::Array(values) => {
            AttributeValue::L(values.iter().map(attribute_value).collect())
        }
        serde_json::Value::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), attribute_value(v)))
                .collect(),
        ),
    }
}

/// Converts a JSON object into an item. Returns `None` for non-objects,
/// which cannot be put.
pub fn item_from_json(value: &serde_json::Value) -> Option<Item> {
    let map = value.as_object()?;
    Some(
        map.iter()
            .map(|(k, v)| (k.clone(), attribute_value(v)))
            .collect(),
    )
}

pub async fn table_exists(cfg: &SdkConfig, table: &str) -> anyhow::Result<bool> {
    let client = aws_sdk_dynamodb::Client::new(cfg);
    match client.describe_table().table_name(table).send().await {
        Ok(_) => Ok(true),
        Err(err) => {
            let err = err.into_service_error();
            if err.is_resource_not_found_exception() {
                Ok(false)
            } else {
                Err(err.into())
            }
        }
    }
}

/// Whether the table reports ACTIVE status. An absent table is not
/// active.
pub async fn table_active(cfg: &SdkConfig, table: &str) -> anyhow::Result<bool> {
    let client = aws_sdk_dynamodb::Client::new(cfg);
    match client.describe_table().table_name(table).send().await {
        Ok(out) => Ok(out
            .table()
            .and_then(|t| t.table_status())
            .map(|status| status.as_str() == "ACTIVE")
            .unwrap_or(false)),
        Err(err) => {
            let err = err.into_service_error();
            if err.is_resource_not_found_exception() {
                Ok(false)
            } else {
                Err(err.into())
            }
        }
    }
}

/// Deletes a table. Returns `false` if it did not exist.
pub async fn delete_table(cfg: &SdkConfig, table: &str) -> anyhow::Result<bool> {
    let client = aws_sdk_dynamodb::Client::new(cfg);
    match client.delete_table().table_name(table).send().await {
        Ok(_) => Ok(true),
        Err(err) => {
            let err = err.into_service_error();
            if err.is_resource_not_found_exception() {
                Ok(false)
            } else {
                Err(err.into())
            }
        }
    }
}

/// Counts items by scanning with `Select=COUNT`, following the
/// continuation key across pages.
pub async fn item_count(cfg: &SdkConfig, table: &str) -> anyhow::Result<usize> {
    let client = aws_sdk_dynamodb::Client::new(cfg);
    let mut total = 0usize;
    let mut start_key: Option<Item> = None;
    loop {
        let out = client
            .scan()
            .table_name(table)
            .select(Select::Count)
            .set_exclusive_start_key(start_key)
            .send()
            .await?;
        total += out.count() as usize;
        start_key = out.last_evaluated_key().cloned();
        if start_key.is_none() {
            break;
        }
    }
    Ok(total)
}

/// One page of items plus the continuation key for the next page.
pub async fn scan_page(
    cfg: &SdkConfig,
    table: &str,
    start_key: Option<Item>,
    limit: i32,
) -> anyhow::Result<(Vec<Item>, Option<Item>)> {
    let client = aws_sdk_dynamodb::Client::new(cfg);
    let out = client
        .scan()
        .table_name(table)
        .limit(limit)
        .set_exclusive_start_key(start_key)
        .send()
        .await?;
    let items = out.items().to_vec();
    let next = out.last_evaluated_key().cloned();
    Ok((items, next))
}

pub async fn delete_item(cfg: &SdkConfig, table: &str, key: Item) -> anyhow::Result<()> {
    let client = aws_sdk_dynamodb::Client::new(cfg);
    client
        .delete_item()
        .table_name(table)
        .set_key(Some(key))
        .send()
        .await?;
    Ok(())
}

/// The condition expression and attribute-name map that make a put
/// insert-only for the given key schema.
pub fn insert_condition(spec: &TableSpec) -> (String, HashMap<String, String>) {
    let mut names = HashMap::from([("#pk".to_owned(), spec.partition_key.clone())]);
    let expression = match &spec.sort_key {
        Some(sort_key) => {
            names.insert("#sk".to_owned(), sort_key.clone());
            "attribute_not_exists(#pk) AND attribute_not_exists(#sk)".to_owned()
        }
        None => "attribute_not_exists(#pk)".to_owned(),
    };
    (expression, names)
}

/// Writes an item. Without `overwrite` the put is conditional on the
/// table's key attributes not existing, so re-seeding never duplicates.
pub async fn put_item(
    cfg: &SdkConfig,
    spec: &TableSpec,
    item: Item,
    overwrite: bool,
) -> anyhow::Result<PutOutcome> {
    let client = aws_sdk_dynamodb::Client::new(cfg);
    let mut request = client
        .put_item()
        .table_name(&spec.name)
        .set_item(Some(item));
    if !overwrite {
        let (expression, names) = insert_condition(spec);
        request = request
            .condition_expression(expression)
            .set_expression_attribute_names(Some(names));
    }
    match request.send().await {
        Ok(_) => Ok(PutOutcome::Inserted),
        Err(err) => {
            let err = err.into_service_error();
            if err.is_conditional_check_failed_exception() {
                Ok(PutOutcome::AlreadyExists)
            } else {
                Err(err.into())
            }
        }
    }
}

/// Extracts the key attributes of an item per the table's key schema,
/// for deletes. Returns `None` when the item is missing a key attribute.
pub fn item_key(spec: &TableSpec, item: &Item) -> Option<Item> {
    let mut key = Item::new();
    key.insert(
        spec.partition_key.clone(),
        item.get(&spec.partition_key)?.clone(),
    );
    if let Some(sort_key) = &spec.sort_key {
        key.insert(sort_key.clone(), item.get(sort_key)?.clone());
    }
    Some(key)
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn json_values_map_to_attribute_values() {
        let value = serde_json::json!({
            "productId": "PROD-001",
            "quantity": 120,
            "unitCost": 4.25,
            "critical": true,
            "notes": null,
            "tags": ["raw", "fragile"],
            "dims": { "w": 2, "h": 3 }
        });
        let item = item_from_json(&value).unwrap();
        assert_eq!(
            &AttributeValue::S("PROD-001".to_owned()),
            item.get("productId").unwrap()
        );
        assert_eq!(
            &AttributeValue::N("120".to_owned()),
            item.get("quantity").unwrap()
        );
        assert_eq!(
            &AttributeValue::N("4.25".to_owned()),
            item.get("unitCost").unwrap()
        );
        assert_eq!(&AttributeValue::Bool(true), item.get("critical").unwrap());
        assert_eq!(&AttributeValue::Null(true), item.get("notes").unwrap());
        assert_eq!(
            &AttributeValue::L(vec![
                AttributeValue::S("raw".to_owned()),
                AttributeValue::S("fragile".to_owned()),
            ]),
            item.get("tags").unwrap()
        );
        assert!(matches!(item.get("dims").unwrap(), AttributeValue::M(_)));
    }

    #[test]
    fn non_objects_are_not_items() {
        assert!(item_from_json(&serde_json::json!("just a string")).is_none());
        assert!(item_from_json(&serde_json::json!([1, 2, 3])).is_none());
    }

    #[test]
    fn insert_condition_covers_the_whole_key() {
        let spec = TableSpec::new("supplysense-orders", "orderId");
        let (expression, names) = insert_condition(&spec);
        assert_eq!("attribute_not_exists(#pk)", expression);
        assert_eq!(Some(&"orderId".to_owned()), names.get("#pk"));

        let spec =
            TableSpec::with_sort_key("supplysense-inventory", "productId", "locationId");
        let (expression, names) = insert_condition(&spec);
        assert_eq!(
            "attribute_not_exists(#pk) AND attribute_not_exists(#sk)",
            expression
        );
        assert_eq!(Some(&"productId".to_owned()), names.get("#pk"));
        assert_eq!(Some(&"locationId".to_owned()), names.get("#sk"));
    }

    #[test]
    fn item_key_follows_the_key_schema() {
        let spec = TableSpec::with_sort_key("supplysense-actions", "PK", "SK");
        let item = item_from_json(&serde_json::json!({
            "PK": "ACTION#1",
            "SK": "2026-01-01",
            "payload": "ignored"
        }))
        .unwrap();
        let key = item_key(&spec, &item).unwrap();
        assert_eq!(2, key.len());
        assert!(key.contains_key("PK") && key.contains_key("SK"));

        let incomplete = item_from_json(&serde_json::json!({ "PK": "ACTION#1" })).unwrap();
        assert!(item_key(&spec, &incomplete).is_none(), "missing sort key");
    }
}
