//! CloudEvents 事件模型与编解码
//!
//! 支持两种内容模式：
//! - 结构化模式：整个事件是一个 JSON 对象（`application/cloudevents+json`）
//! - 二进制模式：属性放在 `ce-*` 头中，数据放在消息体中

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value};
use thiserror::Error;

/// 当前支持的规范版本
pub const SPEC_VERSION: &str = "1.0";
/// 结构化模式的内容类型
pub const STRUCTURED_CONTENT_TYPE: &str = "application/cloudevents+json";
/// 二进制模式属性头前缀
pub const HEADER_PREFIX: &str = "ce-";

const SUPPORTED_SPEC_VERSIONS: &[&str] = &["1.0", "0.3"];
const APPLICATION_JSON: &str = "application/json";

/// 事件编解码错误
#[derive(Error, Debug)]
pub enum EventError {
    #[error("missing required attribute '{0}'")]
    MissingAttribute(&'static str),

    #[error("attribute '{0}' must be a string")]
    InvalidAttribute(String),

    #[error("unsupported specversion '{0}'")]
    UnsupportedSpecVersion(String),

    #[error("invalid time '{0}'")]
    InvalidTime(String),

    #[error("invalid data_base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("invalid event json: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("event must be a json object")]
    NotAnObject,

    #[error("invalid header value for '{0}'")]
    InvalidHeader(String),

    #[error("request is not a cloudevent")]
    NotAnEvent,
}

/// 事件数据
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    Json(Value),
    Binary(Bytes),
}

impl Data {
    /// 编码为消息体
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Data::Json(value) => Bytes::from(value.to_string()),
            Data::Binary(bytes) => bytes.clone(),
        }
    }
}

/// CloudEvent
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: String,
    pub source: String,
    pub specversion: String,
    pub ty: String,
    pub datacontenttype: Option<String>,
    pub dataschema: Option<String>,
    pub subject: Option<String>,
    pub time: Option<DateTime<Utc>>,
    pub data: Option<Data>,
    pub extensions: BTreeMap<String, String>,
}

impl Event {
    pub fn new(id: impl Into<String>, source: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            specversion: SPEC_VERSION.to_string(),
            ty: ty.into(),
            datacontenttype: None,
            dataschema: None,
            subject: None,
            time: None,
            data: None,
            extensions: BTreeMap::new(),
        }
    }

    /// 设置 JSON 数据
    pub fn with_json(mut self, value: Value) -> Self {
        self.datacontenttype = Some(APPLICATION_JSON.to_string());
        self.data = Some(Data::Json(value));
        self
    }

    /// 设置二进制数据
    pub fn with_binary(mut self, content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.datacontenttype = Some(content_type.into());
        self.data = Some(Data::Binary(data.into()));
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_extension(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extensions.insert(name.into(), value.into());
        self
    }

    /// 把数据解释为 JSON：JSON 数据直接返回，二进制数据尝试解析
    pub fn json_data(&self) -> Option<Value> {
        match &self.data {
            Some(Data::Json(value)) => Some(value.clone()),
            Some(Data::Binary(bytes)) => serde_json::from_slice(bytes).ok(),
            None => None,
        }
    }

    /// 结构化模式解码
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, EventError> {
        let Value::Object(mut map) = serde_json::from_slice(bytes)? else {
            return Err(EventError::NotAnObject);
        };

        let specversion = required(&mut map, "specversion")?;
        if !SUPPORTED_SPEC_VERSIONS.contains(&specversion.as_str()) {
            return Err(EventError::UnsupportedSpecVersion(specversion));
        }

        let mut event = Event::new(
            required(&mut map, "id")?,
            required(&mut map, "source")?,
            required(&mut map, "type")?,
        );
        event.specversion = specversion;
        event.datacontenttype = optional(&mut map, "datacontenttype")?;
        event.dataschema = optional(&mut map, "dataschema")?;
        event.subject = optional(&mut map, "subject")?;
        event.time = optional(&mut map, "time")?.map(|t| parse_time(&t)).transpose()?;

        event.data = match (map.remove("data_base64"), map.remove("data")) {
            (Some(Value::String(encoded)), _) => Some(Data::Binary(Bytes::from(BASE64.decode(encoded)?))),
            (Some(_), _) => return Err(EventError::InvalidAttribute("data_base64".to_string())),
            (None, Some(Value::Null)) | (None, None) => None,
            (None, Some(value)) => Some(Data::Json(value)),
        };

        for (name, value) in map {
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            event.extensions.insert(name, value);
        }

        Ok(event)
    }

    /// 结构化模式编码
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("specversion".into(), Value::String(self.specversion.clone()));
        map.insert("id".into(), Value::String(self.id.clone()));
        map.insert("source".into(), Value::String(self.source.clone()));
        map.insert("type".into(), Value::String(self.ty.clone()));
        if let Some(v) = &self.datacontenttype {
            map.insert("datacontenttype".into(), Value::String(v.clone()));
        }
        if let Some(v) = &self.dataschema {
            map.insert("dataschema".into(), Value::String(v.clone()));
        }
        if let Some(v) = &self.subject {
            map.insert("subject".into(), Value::String(v.clone()));
        }
        if let Some(t) = &self.time {
            map.insert("time".into(), Value::String(t.to_rfc3339()));
        }
        match &self.data {
            Some(Data::Json(value)) => {
                map.insert("data".into(), value.clone());
            }
            Some(Data::Binary(bytes)) => {
                map.insert("data_base64".into(), Value::String(BASE64.encode(bytes)));
            }
            None => {}
        }
        for (name, value) in &self.extensions {
            map.insert(name.clone(), Value::String(value.clone()));
        }
        Value::Object(map)
    }

    /// 从 HTTP 头与消息体解码（结构化或二进制模式）
    pub fn from_http(headers: &HeaderMap, body: Bytes) -> Result<Self, EventError> {
        let content_type = header_str(headers, CONTENT_TYPE.as_str())?;
        if content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with(STRUCTURED_CONTENT_TYPE))
        {
            return Self::from_json_slice(&body);
        }

        let Some(specversion) = header_str(headers, "ce-specversion")? else {
            return Err(EventError::NotAnEvent);
        };
        if !SUPPORTED_SPEC_VERSIONS.contains(&specversion.as_str()) {
            return Err(EventError::UnsupportedSpecVersion(specversion));
        }

        let mut event = Event::new(
            header_str(headers, "ce-id")?.ok_or(EventError::MissingAttribute("id"))?,
            header_str(headers, "ce-source")?.ok_or(EventError::MissingAttribute("source"))?,
            header_str(headers, "ce-type")?.ok_or(EventError::MissingAttribute("type"))?,
        );
        event.specversion = specversion;
        event.subject = header_str(headers, "ce-subject")?;
        event.dataschema = header_str(headers, "ce-dataschema")?;
        event.time = header_str(headers, "ce-time")?
            .map(|t| parse_time(&t))
            .transpose()?;

        for (name, value) in headers {
            let Some(attribute) = name.as_str().strip_prefix(HEADER_PREFIX) else {
                continue;
            };
            if matches!(
                attribute,
                "specversion" | "id" | "source" | "type" | "subject" | "dataschema" | "time"
            ) {
                continue;
            }
            let value = value
                .to_str()
                .map_err(|_| EventError::InvalidHeader(name.to_string()))?;
            event.extensions.insert(attribute.to_string(), value.to_string());
        }

        event.datacontenttype = content_type;
        event.data = decode_body(event.datacontenttype.as_deref(), body);
        Ok(event)
    }

    /// 编码为二进制模式的 HTTP 头与消息体
    pub fn to_http(&self) -> Result<(HeaderMap, Bytes), EventError> {
        let mut headers = HeaderMap::new();
        insert_header(&mut headers, "ce-specversion", &self.specversion)?;
        insert_header(&mut headers, "ce-id", &self.id)?;
        insert_header(&mut headers, "ce-source", &self.source)?;
        insert_header(&mut headers, "ce-type", &self.ty)?;
        if let Some(v) = &self.subject {
            insert_header(&mut headers, "ce-subject", v)?;
        }
        if let Some(v) = &self.dataschema {
            insert_header(&mut headers, "ce-dataschema", v)?;
        }
        if let Some(t) = &self.time {
            insert_header(&mut headers, "ce-time", &t.to_rfc3339())?;
        }
        for (name, value) in &self.extensions {
            insert_header(&mut headers, &format!("{HEADER_PREFIX}{name}"), value)?;
        }

        let content_type = match (&self.datacontenttype, &self.data) {
            (Some(ct), _) => Some(ct.as_str()),
            (None, Some(Data::Json(_))) => Some(APPLICATION_JSON),
            _ => None,
        };
        if let Some(ct) = content_type {
            insert_header(&mut headers, CONTENT_TYPE.as_str(), ct)?;
        }

        let body = self.data.as_ref().map(Data::to_bytes).unwrap_or_default();
        Ok((headers, body))
    }
}

/// 按内容类型解码消息体：JSON 类型尝试解析，其余保持二进制
pub(crate) fn decode_body(content_type: Option<&str>, body: Bytes) -> Option<Data> {
    if body.is_empty() {
        return None;
    }
    let is_json = content_type.is_some_and(|ct| {
        let ct = ct.split(';').next().unwrap_or(ct).trim();
        ct == APPLICATION_JSON || ct.ends_with("+json")
    });
    if is_json {
        if let Ok(value) = serde_json::from_slice(&body) {
            return Some(Data::Json(value));
        }
    }
    Some(Data::Binary(body))
}

fn required(map: &mut Map<String, Value>, key: &'static str) -> Result<String, EventError> {
    match map.remove(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s),
        Some(Value::String(_)) | Some(Value::Null) | None => Err(EventError::MissingAttribute(key)),
        Some(_) => Err(EventError::InvalidAttribute(key.to_string())),
    }
}

fn optional(map: &mut Map<String, Value>, key: &'static str) -> Result<Option<String>, EventError> {
    match map.remove(key) {
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(EventError::InvalidAttribute(key.to_string())),
    }
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, EventError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| EventError::InvalidTime(value.to_string()))
}

fn header_str(headers: &HeaderMap, name: &str) -> Result<Option<String>, EventError> {
    headers
        .get(name)
        .map(|v| {
            v.to_str()
                .map(str::to_string)
                .map_err(|_| EventError::InvalidHeader(name.to_string()))
        })
        .transpose()
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<(), EventError> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| EventError::InvalidHeader(name.to_string()))?;
    let value = HeaderValue::from_str(value)
        .map_err(|_| EventError::InvalidHeader(name.to_string()))?;
    headers.insert(name, value);
    Ok(())
}
