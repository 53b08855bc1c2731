//! Per-item execution and dropdown option loading.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::client::XiboClient;
use crate::error::{Result, XiboError};
use crate::resource::{self, Operation, PreparedCall, Resource};
use crate::transport::Transport;
use crate::types::{Item, NodeOption, OutputItem};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteOptions {
    /// Record a failing item as `{"error": ...}` and keep going.
    pub continue_on_fail: bool,
}

/// A failure that stopped execution, tagged with the input item it came from.
#[derive(Debug, Error)]
#[error("item {item_index}: {source}")]
pub struct NodeError {
    pub item_index: usize,
    #[source]
    pub source: XiboError,
}

impl NodeError {
    fn at(item_index: usize, source: XiboError) -> Self {
        Self { item_index, source }
    }
}

/// Run `resource`/`operation` once per item, in order.
///
/// The access token is obtained once up front; a failure there stops the
/// run even with `continue_on_fail`, since no item could succeed.
pub fn execute<T: Transport>(
    client: &XiboClient<T>,
    resource: Resource,
    operation: Operation,
    items: &[Item],
    options: ExecuteOptions,
) -> Result<Vec<OutputItem>, NodeError> {
    if resource::descriptor(resource, operation).is_none() {
        return Err(NodeError::at(
            0,
            XiboError::UnsupportedOperation {
                resource: resource.to_string(),
                operation: operation.to_string(),
            },
        ));
    }
    if items.is_empty() {
        return Ok(Vec::new());
    }

    tracing::info!(%resource, %operation, items = items.len(), "executing");
    let token = client.access_token().map_err(|e| NodeError::at(0, e))?;

    let mut output = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let outcome = resource::resolve(resource, operation, &item.json, &item.binary)
            .and_then(|call| dispatch(client, &token, &call));

        match outcome {
            Ok(response) => flatten(response, index, &mut output),
            Err(err) if options.continue_on_fail => {
                tracing::warn!(item = index, error = %err, "item failed, continuing");
                output.push(OutputItem {
                    json: json!({ "error": err.to_string() }),
                    item: index,
                });
            }
            Err(err) => return Err(NodeError::at(index, err)),
        }
    }
    Ok(output)
}

/// Send a prepared call with an already obtained token.
pub fn dispatch<T: Transport>(
    client: &XiboClient<T>,
    access_token: &str,
    call: &PreparedCall,
) -> Result<Value> {
    match call {
        PreparedCall::Request { method, path, body } => {
            client.request_with_token(access_token, *method, path, body.as_ref(), None)
        }
        PreparedCall::List { path, query, limit } => client
            .request_all_items_with_token(access_token, path, query, *limit)
            .map(Value::Array),
        PreparedCall::Upload(upload) => client.upload_media_with_token(access_token, upload),
    }
}

// Arrays fan out to one output per element; `null` becomes an empty object.
fn flatten(response: Value, item: usize, output: &mut Vec<OutputItem>) {
    match response {
        Value::Array(values) => {
            output.extend(values.into_iter().map(|json| OutputItem { json, item }));
        }
        Value::Null => output.push(OutputItem {
            json: Value::Object(Map::new()),
            item,
        }),
        json => output.push(OutputItem { json, item }),
    }
}

/// Collections offered as dropdown choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionSource {
    Displays,
    Layouts,
    Campaigns,
    DisplayGroups,
}

impl OptionSource {
    pub const ALL: &'static [OptionSource] = &[
        OptionSource::Displays,
        OptionSource::Layouts,
        OptionSource::Campaigns,
        OptionSource::DisplayGroups,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OptionSource::Displays => "displays",
            OptionSource::Layouts => "layouts",
            OptionSource::Campaigns => "campaigns",
            OptionSource::DisplayGroups => "displayGroups",
        }
    }

    pub fn endpoint(self) -> &'static str {
        match self {
            OptionSource::Displays => "/api/display",
            OptionSource::Layouts => "/api/layout",
            OptionSource::Campaigns => "/api/campaign",
            OptionSource::DisplayGroups => "/api/displaygroup",
        }
    }

    /// `(label field, value field)` of each element.
    fn fields(self) -> (&'static str, &'static str) {
        match self {
            OptionSource::Displays => ("display", "displayId"),
            OptionSource::Layouts => ("layout", "layoutId"),
            OptionSource::Campaigns => ("campaign", "campaignId"),
            OptionSource::DisplayGroups => ("displayGroup", "displayGroupId"),
        }
    }
}

impl fmt::Display for OptionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptionSource {
    type Err = XiboError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|source| source.as_str() == s)
            .ok_or_else(|| XiboError::InvalidParameter {
                name: "source".to_string(),
                reason: format!("unknown option source \"{s}\""),
            })
    }
}

/// List `source` as name/value pairs. Elements lacking either field are skipped.
pub fn load_options<T: Transport>(
    client: &XiboClient<T>,
    source: OptionSource,
) -> Result<Vec<NodeOption>> {
    let (label, id) = source.fields();
    let elements = client.request_all_items(source.endpoint(), &Map::new(), None)?;

    Ok(elements
        .iter()
        .filter_map(|element| {
            let name = match element.get(label)? {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            let value = element.get(id).filter(|v| !v.is_null())?.clone();
            Some(NodeOption { name, value })
        })
        .collect())
}
