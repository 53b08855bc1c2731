use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use xibo_core::{
    execute, load_options, ExecuteOptions, Item, Operation, OptionSource, Resource, XiboClient,
};

/// Run one operation over the items in `items` (a JSON file, `-` for stdin)
/// or over a single item built from `params`.
pub fn run(
    client: &XiboClient,
    resource: Resource,
    operation: Operation,
    items: Option<&Path>,
    params: Option<&str>,
    continue_on_fail: bool,
) -> Result<()> {
    let items = match (items, params) {
        (Some(_), Some(_)) => bail!("--items and --params are mutually exclusive"),
        (Some(path), None) => read_items(path)?,
        (None, Some(params)) => vec![Item::new(parse_params(params)?)],
        (None, None) => vec![Item::default()],
    };

    let output = execute(
        client,
        resource,
        operation,
        &items,
        ExecuteOptions { continue_on_fail },
    )?;
    tracing::info!(outputs = output.len(), "done");
    print_json(&output)
}

pub fn options(client: &XiboClient, source: OptionSource) -> Result<()> {
    let options = load_options(client, source)?;
    print_json(&options)
}

pub fn test(client: &XiboClient) -> Result<()> {
    let about = client
        .test_credential()
        .context("credential test failed")?;
    tracing::info!(base_url = client.credential().base_url(), "credential accepted");
    print_json(&about)
}

fn parse_params(params: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str(params).context("--params must be JSON")? {
        Value::Object(map) => Ok(map),
        _ => bail!("--params must be a JSON object"),
    }
}

/// Items are either full `{json, binary}` records or bare parameter objects.
fn read_items(path: &Path) -> Result<Vec<Item>> {
    let text = if path.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
    };
    parse_items(&text)
}

fn parse_items(text: &str) -> Result<Vec<Item>> {
    let values: Vec<Value> = serde_json::from_str(text).context("items must be a JSON array")?;
    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            let is_record = value
                .as_object()
                .is_some_and(|o| o.contains_key("json") || o.contains_key("binary"));
            match value {
                value if is_record => serde_json::from_value(value)
                    .with_context(|| format!("item {index} is not a valid record")),
                Value::Object(map) => Ok(Item::new(map)),
                _ => bail!("item {index} must be a JSON object"),
            }
        })
        .collect()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}
