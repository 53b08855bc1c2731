//! Resource/operation routing.
//!
//! # Design
//! Every supported (resource, operation) pair has one row in a static
//! descriptor table: HTTP method, path template, the parameter that fills
//! `{id}`, and how the call is shaped. [`resolve`] evaluates a row against an
//! item's parameters and produces a [`PreparedCall`] that the executor hands
//! to the client. Adding an operation is a table edit.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, XiboError};
use crate::http::HttpMethod;
use crate::types::{BinaryData, MediaUpload};

/// Limit applied to `getAll` when `returnAll` is false and no `limit` is set.
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Binary property read by `library/upload` when none is named.
pub const DEFAULT_BINARY_PROPERTY: &str = "data";

macro_rules! named_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $text:literal,)+ }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant,)+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = XiboError;

            fn from_str(s: &str) -> Result<Self> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| XiboError::InvalidParameter {
                        name: $kind.to_string(),
                        reason: format!("unknown {} \"{s}\"", $kind),
                    })
            }
        }
    };
}

named_enum!(
    /// CMS entity family.
    Resource, "resource" {
        Display => "display",
        Layout => "layout",
        Library => "library",
        Schedule => "schedule",
        DisplayGroup => "displayGroup",
        Campaign => "campaign",
        Playlist => "playlist",
        Dataset => "dataset",
        Command => "command",
        Tag => "tag",
        User => "user",
        Notification => "notification",
        Folder => "folder",
    }
);

named_enum!(
    /// Action on a resource.
    Operation, "operation" {
        GetAll => "getAll",
        Get => "get",
        Create => "create",
        Update => "update",
        Delete => "delete",
        GetStatus => "getStatus",
        Authorize => "authorize",
        RequestScreenshot => "requestScreenshot",
        WakeOnLan => "wakeOnLan",
        Publish => "publish",
        Checkout => "checkout",
        Copy => "copy",
        Upload => "upload",
        ChangeLayout => "changeLayout",
        SendCommand => "sendCommand",
        AssignLayout => "assignLayout",
        GetData => "getData",
    }
);

/// How a `getAll` filter value is written to the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    /// Copied when non-empty.
    Value,
    /// Booleans become `1`/`0`.
    Flag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filter {
    pub key: &'static str,
    pub kind: FilterKind,
}

/// How a body field is taken from the item's parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldShape {
    /// Must be present and non-empty; copied as is.
    Required,
    /// Required comma-separated string, sent as an array of trimmed parts.
    CommaList,
    /// Optional number with a default.
    Defaulted(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub shape: FieldShape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Paginated collection read.
    List { filters: &'static [Filter] },
    /// No body.
    Bare,
    /// JSON body from named fields, then the entries of the `extra` object.
    Fields {
        fields: &'static [Field],
        extra: Option<&'static str>,
    },
    /// Multipart media upload.
    Upload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationDescriptor {
    pub method: HttpMethod,
    /// Path template; `{id}` is replaced by the `id_param` value.
    pub path: &'static str,
    pub id_param: Option<&'static str>,
    pub kind: CallKind,
}

/// A call ready for the client.
#[derive(Debug, Clone, PartialEq)]
pub enum PreparedCall {
    Request {
        method: HttpMethod,
        path: String,
        body: Option<Map<String, Value>>,
    },
    List {
        path: String,
        query: Map<String, Value>,
        limit: Option<usize>,
    },
    Upload(MediaUpload),
}

const fn list(path: &'static str, filters: &'static [Filter]) -> OperationDescriptor {
    OperationDescriptor {
        method: HttpMethod::Get,
        path,
        id_param: None,
        kind: CallKind::List { filters },
    }
}

const fn bare(method: HttpMethod, path: &'static str, id: &'static str) -> OperationDescriptor {
    OperationDescriptor {
        method,
        path,
        id_param: Some(id),
        kind: CallKind::Bare,
    }
}

const fn get(path: &'static str, id: &'static str) -> OperationDescriptor {
    bare(HttpMethod::Get, path, id)
}

const fn delete(path: &'static str, id: &'static str) -> OperationDescriptor {
    bare(HttpMethod::Delete, path, id)
}

const fn update(path: &'static str, id: &'static str) -> OperationDescriptor {
    OperationDescriptor {
        method: HttpMethod::Put,
        path,
        id_param: Some(id),
        kind: CallKind::Fields {
            fields: NO_FIELDS,
            extra: Some("updateFields"),
        },
    }
}

const fn body(
    method: HttpMethod,
    path: &'static str,
    id_param: Option<&'static str>,
    fields: &'static [Field],
    extra: Option<&'static str>,
) -> OperationDescriptor {
    OperationDescriptor {
        method,
        path,
        id_param,
        kind: CallKind::Fields { fields, extra },
    }
}

const fn create(path: &'static str, fields: &'static [Field]) -> OperationDescriptor {
    body(HttpMethod::Post, path, None, fields, None)
}

const fn required(name: &'static str) -> Field {
    Field {
        name,
        shape: FieldShape::Required,
    }
}

const fn comma_list(name: &'static str) -> Field {
    Field {
        name,
        shape: FieldShape::CommaList,
    }
}

const fn defaulted(name: &'static str, default: i64) -> Field {
    Field {
        name,
        shape: FieldShape::Defaulted(default),
    }
}

const fn value_filter(key: &'static str) -> Filter {
    Filter {
        key,
        kind: FilterKind::Value,
    }
}

const DISPLAY_FILTERS: &[Filter] = &[
    value_filter("display"),
    value_filter("displayGroupId"),
    Filter {
        key: "authorised",
        kind: FilterKind::Flag,
    },
];

const NO_FILTERS: &[Filter] = &[];

const LIBRARY_FILTERS: &[Filter] = &[
    value_filter("media"),
    value_filter("type"),
    value_filter("ownerId"),
];

const NO_FIELDS: &[Field] = &[];
const NAME_FIELDS: &[Field] = &[required("name")];
const SCHEDULE_FIELDS: &[Field] = &[
    required("eventTypeId"),
    comma_list("displayGroupIds"),
    required("fromDt"),
    required("toDt"),
];
const DISPLAY_GROUP_FIELDS: &[Field] = &[required("displayGroup")];
const CHANGE_LAYOUT_FIELDS: &[Field] = &[required("layoutId"), defaulted("duration", 0)];
const COMMAND_FIELDS: &[Field] = &[required("commandId")];
const LAYOUT_LIST_FIELDS: &[Field] = &[comma_list("layoutId")];
const DATASET_FIELDS: &[Field] = &[required("dataSet")];
const TAG_FIELDS: &[Field] = &[required("tag")];
const USER_FIELDS: &[Field] = &[required("userName"), required("userTypeId")];
const FOLDER_FIELDS: &[Field] = &[required("folderName")];

use HttpMethod::{Post, Put};
use Operation as Op;
use Resource as R;

#[rustfmt::skip]
static TABLE: &[(Resource, Operation, OperationDescriptor)] = &[
    (R::Display, Op::GetAll, list("/api/display", DISPLAY_FILTERS)),
    (R::Display, Op::Get, get("/api/display/{id}", "displayId")),
    (R::Display, Op::GetStatus, get("/api/display/status/{id}", "displayId")),
    (R::Display, Op::Update, update("/api/display/{id}", "displayId")),
    (R::Display, Op::Authorize, bare(Put, "/api/display/authorise/{id}", "displayId")),
    (R::Display, Op::RequestScreenshot, bare(Put, "/api/display/requestscreenshot/{id}", "displayId")),
    (R::Display, Op::WakeOnLan, bare(Post, "/api/display/wol/{id}", "displayId")),

    (R::Layout, Op::GetAll, list("/api/layout", NO_FILTERS)),
    (R::Layout, Op::Get, get("/api/layout/{id}", "layoutId")),
    (R::Layout, Op::Create, body(Post, "/api/layout", None, NAME_FIELDS, Some("additionalFields"))),
    (R::Layout, Op::Update, update("/api/layout/{id}", "layoutId")),
    (R::Layout, Op::Delete, delete("/api/layout/{id}", "layoutId")),
    (R::Layout, Op::Publish, bare(Put, "/api/layout/publish/{id}", "layoutId")),
    (R::Layout, Op::Checkout, bare(Put, "/api/layout/checkout/{id}", "layoutId")),
    (R::Layout, Op::Copy, body(Post, "/api/layout/copy/{id}", Some("layoutId"), NAME_FIELDS, None)),

    (R::Library, Op::GetAll, list("/api/library", LIBRARY_FILTERS)),
    (R::Library, Op::Get, get("/api/library/{id}", "mediaId")),
    (R::Library, Op::Update, update("/api/library/{id}", "mediaId")),
    (R::Library, Op::Delete, delete("/api/library/{id}", "mediaId")),
    (R::Library, Op::Upload, OperationDescriptor {
        method: Post,
        path: "/api/library",
        id_param: None,
        kind: CallKind::Upload,
    }),

    (R::Schedule, Op::GetAll, list("/api/schedule", NO_FILTERS)),
    (R::Schedule, Op::Get, get("/api/schedule/{id}", "eventId")),
    (R::Schedule, Op::Create, body(
        Post,
        "/api/schedule",
        None,
        SCHEDULE_FIELDS,
        Some("additionalFields"),
    )),
    (R::Schedule, Op::Update, update("/api/schedule/{id}", "eventId")),
    (R::Schedule, Op::Delete, delete("/api/schedule/{id}", "eventId")),

    (R::DisplayGroup, Op::GetAll, list("/api/displaygroup", NO_FILTERS)),
    (R::DisplayGroup, Op::Get, get("/api/displaygroup/{id}", "displayGroupId")),
    (R::DisplayGroup, Op::Create, create("/api/displaygroup", DISPLAY_GROUP_FIELDS)),
    (R::DisplayGroup, Op::Update, update("/api/displaygroup/{id}", "displayGroupId")),
    (R::DisplayGroup, Op::Delete, delete("/api/displaygroup/{id}", "displayGroupId")),
    (R::DisplayGroup, Op::ChangeLayout, body(
        Post,
        "/api/displaygroup/{id}/action/changeLayout",
        Some("displayGroupId"),
        CHANGE_LAYOUT_FIELDS,
        None,
    )),
    (R::DisplayGroup, Op::SendCommand, body(
        Post,
        "/api/displaygroup/{id}/action/command",
        Some("displayGroupId"),
        COMMAND_FIELDS,
        None,
    )),

    (R::Campaign, Op::GetAll, list("/api/campaign", NO_FILTERS)),
    (R::Campaign, Op::Get, get("/api/campaign/{id}", "campaignId")),
    (R::Campaign, Op::Create, create("/api/campaign", NAME_FIELDS)),
    (R::Campaign, Op::Update, update("/api/campaign/{id}", "campaignId")),
    (R::Campaign, Op::Delete, delete("/api/campaign/{id}", "campaignId")),
    (R::Campaign, Op::AssignLayout, body(
        Post,
        "/api/campaign/layout/assign/{id}",
        Some("campaignId"),
        LAYOUT_LIST_FIELDS,
        None,
    )),

    (R::Playlist, Op::GetAll, list("/api/playlist", NO_FILTERS)),
    (R::Playlist, Op::Get, get("/api/playlist/{id}", "playlistId")),
    (R::Playlist, Op::Create, create("/api/playlist", NAME_FIELDS)),
    (R::Playlist, Op::Update, update("/api/playlist/{id}", "playlistId")),
    (R::Playlist, Op::Delete, delete("/api/playlist/{id}", "playlistId")),

    (R::Dataset, Op::GetAll, list("/api/dataset", NO_FILTERS)),
    (R::Dataset, Op::Get, get("/api/dataset/{id}", "dataSetId")),
    (R::Dataset, Op::GetData, get("/api/dataset/data/{id}", "dataSetId")),
    (R::Dataset, Op::Create, create("/api/dataset", DATASET_FIELDS)),
    (R::Dataset, Op::Update, update("/api/dataset/{id}", "dataSetId")),
    (R::Dataset, Op::Delete, delete("/api/dataset/{id}", "dataSetId")),

    (R::Command, Op::GetAll, list("/api/command", NO_FILTERS)),
    (R::Command, Op::Get, get("/api/command/{id}", "commandId")),

    (R::Tag, Op::GetAll, list("/api/tag", NO_FILTERS)),
    (R::Tag, Op::Get, get("/api/tag/{id}", "tagId")),
    (R::Tag, Op::Create, create("/api/tag", TAG_FIELDS)),
    (R::Tag, Op::Update, body(Put, "/api/tag/{id}", Some("tagId"), TAG_FIELDS, None)),
    (R::Tag, Op::Delete, delete("/api/tag/{id}", "tagId")),

    (R::User, Op::GetAll, list("/api/user", NO_FILTERS)),
    (R::User, Op::Get, get("/api/user/{id}", "userId")),
    (R::User, Op::Create, create("/api/user", USER_FIELDS)),
    (R::User, Op::Update, update("/api/user/{id}", "userId")),
    (R::User, Op::Delete, delete("/api/user/{id}", "userId")),

    (R::Notification, Op::GetAll, list("/api/notification", NO_FILTERS)),
    (R::Notification, Op::Get, get("/api/notification/{id}", "notificationId")),

    (R::Folder, Op::GetAll, list("/api/folder", NO_FILTERS)),
    (R::Folder, Op::Get, get("/api/folder/{id}", "folderId")),
    (R::Folder, Op::Create, create("/api/folder", FOLDER_FIELDS)),
];

/// Descriptor for `(resource, operation)`, if the pair is supported.
pub fn descriptor(resource: Resource, operation: Operation) -> Option<&'static OperationDescriptor> {
    TABLE
        .iter()
        .find(|(r, o, _)| *r == resource && *o == operation)
        .map(|(_, _, d)| d)
}

/// Operations supported for `resource`, in table order.
pub fn operations(resource: Resource) -> impl Iterator<Item = Operation> {
    TABLE
        .iter()
        .filter(move |(r, _, _)| *r == resource)
        .map(|(_, o, _)| *o)
}

/// Evaluate the descriptor for `(resource, operation)` against one item.
pub fn resolve(
    resource: Resource,
    operation: Operation,
    params: &Map<String, Value>,
    binary: &HashMap<String, BinaryData>,
) -> Result<PreparedCall> {
    let descriptor =
        descriptor(resource, operation).ok_or_else(|| XiboError::UnsupportedOperation {
            resource: resource.to_string(),
            operation: operation.to_string(),
        })?;

    let path = match descriptor.id_param {
        Some(id_param) => descriptor.path.replace("{id}", &path_id(params, id_param)?),
        None => descriptor.path.to_string(),
    };

    match descriptor.kind {
        CallKind::List { filters } => Ok(PreparedCall::List {
            path,
            query: list_query(params, filters)?,
            limit: list_limit(params)?,
        }),
        CallKind::Bare => Ok(PreparedCall::Request {
            method: descriptor.method,
            path,
            body: None,
        }),
        CallKind::Fields { fields, extra } => Ok(PreparedCall::Request {
            method: descriptor.method,
            path,
            body: Some(build_body(params, fields, extra)?),
        }),
        CallKind::Upload => media_upload(params, binary).map(PreparedCall::Upload),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn required_param<'a>(params: &'a Map<String, Value>, name: &str) -> Result<&'a Value> {
    params
        .get(name)
        .filter(|v| !is_blank(v))
        .ok_or_else(|| XiboError::MissingParameter {
            name: name.to_string(),
        })
}

/// Object-valued parameter; absent or null reads as empty.
fn object_param<'a>(params: &'a Map<String, Value>, name: &str) -> Result<Option<&'a Map<String, Value>>> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(XiboError::InvalidParameter {
            name: name.to_string(),
            reason: "expected an object".to_string(),
        }),
    }
}

fn scalar_text(name: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(XiboError::InvalidParameter {
            name: name.to_string(),
            reason: "expected a string or number".to_string(),
        }),
    }
}

fn path_id(params: &Map<String, Value>, name: &str) -> Result<String> {
    let id = scalar_text(name, required_param(params, name)?)?;
    if id.chars().any(|c| matches!(c, '/' | '?' | '#') || c.is_whitespace()) {
        return Err(XiboError::InvalidParameter {
            name: name.to_string(),
            reason: format!("\"{id}\" is not a valid identifier"),
        });
    }
    Ok(id)
}

fn list_query(params: &Map<String, Value>, filters: &[Filter]) -> Result<Map<String, Value>> {
    let mut query = Map::new();
    let Some(given) = object_param(params, "filters")? else {
        return Ok(query);
    };

    for filter in filters {
        let Some(value) = given.get(filter.key) else {
            continue;
        };
        match filter.kind {
            FilterKind::Value => {
                if !is_blank(value) && *value != Value::Bool(false) {
                    query.insert(filter.key.to_string(), value.clone());
                }
            }
            FilterKind::Flag => match value {
                Value::Null => {}
                Value::Bool(flag) => {
                    query.insert(filter.key.to_string(), Value::from(u8::from(*flag)));
                }
                other => {
                    query.insert(filter.key.to_string(), other.clone());
                }
            },
        }
    }
    Ok(query)
}

fn list_limit(params: &Map<String, Value>) -> Result<Option<usize>> {
    let return_all = match params.get("returnAll") {
        None | Some(Value::Null) => true,
        Some(Value::Bool(flag)) => *flag,
        Some(_) => {
            return Err(XiboError::InvalidParameter {
                name: "returnAll".to_string(),
                reason: "expected a boolean".to_string(),
            })
        }
    };
    if return_all {
        return Ok(None);
    }

    match params.get("limit") {
        None | Some(Value::Null) => Ok(Some(DEFAULT_LIST_LIMIT)),
        Some(value) => value
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| XiboError::InvalidParameter {
                name: "limit".to_string(),
                reason: "expected a non-negative integer".to_string(),
            }),
    }
}

fn build_body(
    params: &Map<String, Value>,
    fields: &[Field],
    extra: Option<&str>,
) -> Result<Map<String, Value>> {
    let mut body = Map::new();
    for field in fields {
        let value = match field.shape {
            FieldShape::Required => required_param(params, field.name)?.clone(),
            FieldShape::CommaList => split_list(field.name, required_param(params, field.name)?)?,
            FieldShape::Defaulted(default) => match params.get(field.name) {
                None | Some(Value::Null) => Value::from(default),
                Some(value) => value.clone(),
            },
        };
        body.insert(field.name.to_string(), value);
    }

    // Extra entries win over named fields.
    if let Some(extra) = extra {
        if let Some(fields) = object_param(params, extra)? {
            body.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }
    Ok(body)
}

fn split_list(name: &str, value: &Value) -> Result<Value> {
    match value {
        Value::Array(_) => Ok(value.clone()),
        Value::String(s) => Ok(Value::Array(
            s.split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| Value::String(part.to_string()))
                .collect(),
        )),
        Value::Number(_) => Ok(Value::Array(vec![value.clone()])),
        _ => Err(XiboError::InvalidParameter {
            name: name.to_string(),
            reason: "expected a comma-separated list".to_string(),
        }),
    }
}

fn media_upload(
    params: &Map<String, Value>,
    binary: &HashMap<String, BinaryData>,
) -> Result<MediaUpload> {
    let property = match params.get("binaryPropertyName") {
        Some(value) if !is_blank(value) => scalar_text("binaryPropertyName", value)?,
        _ => DEFAULT_BINARY_PROPERTY.to_string(),
    };
    let data = binary
        .get(&property)
        .ok_or_else(|| XiboError::MissingBinaryData {
            property: property.clone(),
        })?;

    let file_name = match params.get("fileName").filter(|v| !is_blank(v)) {
        Some(value) => scalar_text("fileName", value)?,
        None => data
            .file_name
            .clone()
            .ok_or_else(|| XiboError::MissingParameter {
                name: "fileName".to_string(),
            })?,
    };

    let additional = object_param(params, "additionalFields")?;
    let optional_text = |key: &str| -> Result<Option<String>> {
        match additional.and_then(|fields| fields.get(key)) {
            Some(value) if !is_blank(value) => scalar_text(key, value).map(Some),
            _ => Ok(None),
        }
    };

    Ok(MediaUpload {
        file_name,
        mime_type: data.mime_type.clone(),
        data: data.data.clone(),
        tags: optional_text("tags")?,
        folder_id: optional_text("folderId")?,
    })
}
