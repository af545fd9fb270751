/*
 * Copyright 2022 Jordan Matelsky
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

#![cfg(feature = "table-dynamodb")]

use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::future::Future;

use anyhow::{anyhow, bail};
use aws_sdk_dynamodb::config::Region;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, KeySchemaElement, KeyType,
    ScalarAttributeType, TableStatus as DynamoDbStatus,
};
use aws_sdk_dynamodb::Client;
use serde_json::{Number, Value};
use tokio::runtime::{Builder, Runtime};

use super::{
    AttributeType, Item, KeyAttribute, OpenTableService, PutCondition, PutOutcome, Query,
    TableService, TableSpec, TableStatus,
};

/// The configuration for connecting to a [`DynamoDbTableService`].
///
/// Credentials are read from the environment the way every AWS SDK reads them.
///
/// [`DynamoDbTableService`]: crate::table::DynamoDbTableService
#[derive(Debug, PartialEq, Eq, Clone, Default)]
#[cfg_attr(docsrs, doc(cfg(feature = "table-dynamodb")))]
pub struct DynamoDbConfig {
    /// The AWS region, or `None` to use the SDK's default region.
    pub region: Option<String>,

    /// An endpoint override, such as a local DynamoDB instance.
    pub endpoint: Option<String>,
}

impl OpenTableService for DynamoDbConfig {
    type Service = DynamoDbTableService;

    fn open(&self) -> crate::Result<Self::Service> {
        let runtime = Builder::new_current_thread().enable_all().build()?;

        let mut loader = aws_config::from_env();
        if let Some(region) = &self.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &self.endpoint {
            loader = loader.endpoint_url(endpoint.clone());
        }
        let sdk_config = runtime.block_on(loader.load());

        Ok(DynamoDbTableService {
            client: Client::new(&sdk_config),
            runtime: Some(runtime),
        })
    }
}

/// A `TableService` which keeps tables in Amazon DynamoDB.
///
/// The SDK is asynchronous, so every call is driven to completion on a private single-threaded
/// runtime. Methods of this type must not be called from within another async runtime.
///
/// You can use [`DynamoDbConfig`] to connect to a table service of this type.
///
/// [`DynamoDbConfig`]: crate::table::DynamoDbConfig
#[cfg_attr(docsrs, doc(cfg(feature = "table-dynamodb")))]
pub struct DynamoDbTableService {
    client: Client,

    /// This is only `None` while the service is being dropped.
    runtime: Option<Runtime>,
}

impl Debug for DynamoDbTableService {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamoDbTableService")
            .field("region", &self.client.config().region())
            .finish_non_exhaustive()
    }
}

impl Drop for DynamoDbTableService {
    fn drop(&mut self) {
        // A runtime can't be dropped from an async context, which is where an HTTP server
        // drops its backend.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl DynamoDbTableService {
    fn block_on<F: Future>(&self, future: F) -> anyhow::Result<F::Output> {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| anyhow!("The DynamoDB runtime has shut down."))?;
        Ok(runtime.block_on(future))
    }
}

fn scalar_type(kind: AttributeType) -> ScalarAttributeType {
    match kind {
        AttributeType::String => ScalarAttributeType::S,
        AttributeType::Number => ScalarAttributeType::N,
    }
}

fn key_schema(
    attribute: &KeyAttribute,
    key_type: KeyType,
) -> anyhow::Result<(KeySchemaElement, AttributeDefinition)> {
    let element = KeySchemaElement::builder()
        .attribute_name(attribute.name.clone())
        .key_type(key_type)
        .build()?;
    let definition = AttributeDefinition::builder()
        .attribute_name(attribute.name.clone())
        .attribute_type(scalar_type(attribute.kind))
        .build()?;
    Ok((element, definition))
}

/// Convert a JSON value into a DynamoDB attribute value.
fn to_attribute(value: Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(value) => AttributeValue::Bool(value),
        Value::Number(value) => AttributeValue::N(value.to_string()),
        Value::String(value) => AttributeValue::S(value),
        Value::Array(values) => AttributeValue::L(values.into_iter().map(to_attribute).collect()),
        Value::Object(map) => AttributeValue::M(to_attributes(map)),
    }
}

fn to_attributes(item: Item) -> HashMap<String, AttributeValue> {
    item.into_iter()
        .map(|(name, value)| (name, to_attribute(value)))
        .collect()
}

/// Parse a DynamoDB number, preferring integers.
fn parse_number(number: &str) -> anyhow::Result<Value> {
    if let Ok(value) = number.parse::<i64>() {
        return Ok(Value::from(value));
    }
    if let Ok(value) = number.parse::<u64>() {
        return Ok(Value::from(value));
    }
    let value = number.parse::<f64>()?;
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| anyhow!("The number '{}' can't be represented in JSON.", number))
}

/// Convert a DynamoDB attribute value into a JSON value.
fn from_attribute(attribute: &AttributeValue) -> anyhow::Result<Value> {
    Ok(match attribute {
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Bool(value) => Value::Bool(*value),
        AttributeValue::N(number) => parse_number(number)?,
        AttributeValue::S(value) => Value::String(value.clone()),
        AttributeValue::L(values) => Value::Array(
            values
                .iter()
                .map(from_attribute)
                .collect::<anyhow::Result<_>>()?,
        ),
        AttributeValue::M(map) => Value::Object(from_attributes(map)?),
        AttributeValue::Ss(values) => Value::Array(values.iter().cloned().map(Value::String).collect()),
        AttributeValue::Ns(numbers) => Value::Array(
            numbers
                .iter()
                .map(|number| parse_number(number))
                .collect::<anyhow::Result<_>>()?,
        ),
        _ => bail!("Binary and unknown attribute types are not supported."),
    })
}

fn from_attributes(item: &HashMap<String, AttributeValue>) -> anyhow::Result<Item> {
    item.iter()
        .map(|(name, attribute)| Ok((name.clone(), from_attribute(attribute)?)))
        .collect()
}

impl TableService for DynamoDbTableService {
    fn list_tables(&mut self) -> anyhow::Result<Vec<String>> {
        let mut names = Vec::new();
        let mut start = None;

        loop {
            let output = self.block_on(
                self.client
                    .list_tables()
                    .set_exclusive_start_table_name(start.take())
                    .send(),
            )??;
            names.extend(output.table_names().iter().cloned());

            match output.last_evaluated_table_name() {
                Some(name) => start = Some(name.to_string()),
                None => break,
            }
        }

        Ok(names)
    }

    fn create_table(&mut self, spec: &TableSpec) -> anyhow::Result<()> {
        let mut key_elements = Vec::new();
        let mut definitions = Vec::new();

        let (element, definition) = key_schema(&spec.partition_key, KeyType::Hash)?;
        key_elements.push(element);
        definitions.push(definition);

        if let Some(sort_key) = &spec.sort_key {
            let (element, definition) = key_schema(sort_key, KeyType::Range)?;
            key_elements.push(element);
            definitions.push(definition);
        }

        self.block_on(
            self.client
                .create_table()
                .table_name(spec.name.clone())
                .set_key_schema(Some(key_elements))
                .set_attribute_definitions(Some(definitions))
                .billing_mode(BillingMode::PayPerRequest)
                .send(),
        )??;

        Ok(())
    }

    fn table_status(&mut self, table: &str) -> anyhow::Result<Option<TableStatus>> {
        let result = self.block_on(self.client.describe_table().table_name(table).send())?;

        match result {
            Ok(output) => Ok(output
                .table()
                .and_then(|description| description.table_status())
                .map(|status| match status {
                    DynamoDbStatus::Active | DynamoDbStatus::Updating => TableStatus::Active,
                    DynamoDbStatus::Deleting => TableStatus::Deleting,
                    _ => TableStatus::Creating,
                })),
            Err(error) => {
                let error = error.into_service_error();
                if error.is_resource_not_found_exception() {
                    Ok(None)
                } else {
                    Err(error.into())
                }
            }
        }
    }

    fn delete_table(&mut self, table: &str) -> anyhow::Result<()> {
        self.block_on(self.client.delete_table().table_name(table).send())??;
        Ok(())
    }

    fn get_item(&mut self, table: &str, key: &Item) -> anyhow::Result<Option<Item>> {
        let output = self.block_on(
            self.client
                .get_item()
                .table_name(table)
                .set_key(Some(to_attributes(key.clone())))
                .consistent_read(true)
                .send(),
        )??;

        output.item().map(from_attributes).transpose()
    }

    fn put_item(
        &mut self,
        table: &str,
        item: Item,
        condition: PutCondition,
    ) -> anyhow::Result<PutOutcome> {
        let mut request = self
            .client
            .put_item()
            .table_name(table)
            .set_item(Some(to_attributes(item)));

        if let PutCondition::IfAbsent { attribute } = condition {
            request = request
                .condition_expression("attribute_not_exists(#key)")
                .expression_attribute_names("#key", attribute);
        }

        match self.block_on(request.send())? {
            Ok(_) => Ok(PutOutcome::Written),
            Err(error) => {
                let error = error.into_service_error();
                if error.is_conditional_check_failed_exception() {
                    Ok(PutOutcome::ConditionFailed)
                } else {
                    Err(error.into())
                }
            }
        }
    }

    fn query(&mut self, table: &str, query: &Query) -> anyhow::Result<Vec<Item>> {
        let mut items = Vec::new();
        let mut start = None;

        loop {
            let remaining = match query.limit {
                Some(limit) if items.len() >= limit => break,
                Some(limit) => Some(i32::try_from(limit - items.len()).unwrap_or(i32::MAX)),
                None => None,
            };

            let output = self.block_on(
                self.client
                    .query()
                    .table_name(table)
                    .key_condition_expression("#partition = :partition")
                    .expression_attribute_names("#partition", query.partition_key.clone())
                    .expression_attribute_values(
                        ":partition",
                        AttributeValue::S(query.partition_value.clone()),
                    )
                    .scan_index_forward(query.ascending)
                    .set_limit(remaining)
                    .set_exclusive_start_key(start.take())
                    .send(),
            )??;

            for item in output.items() {
                items.push(from_attributes(item)?);
            }

            match output.last_evaluated_key() {
                Some(key) => start = Some(key.clone()),
                None => break,
            }
        }

        Ok(items)
    }
}
