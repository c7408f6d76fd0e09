//! ROS1 message definitions.
//!
//! Every connection record in a bag carries the full `.msg` text of its type,
//! with dependent types appended after `=====` separators and introduced by a
//! `MSG: pkg/Type` line. This module parses that text into a [`MessageSchema`]
//! and decodes serialized payloads into dynamic [`Value`]s, so fields can be
//! looked up by name instead of by hard-coded byte offsets.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;

/// Definition used for `Header` when a bag does not embed it.
const HEADER_DEFINITION: &str = "uint32 seq\ntime stamp\nstring frame_id\n";
const HEADER_TYPE: &str = "std_msgs/Header";

static FIELD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([A-Za-z][A-Za-z0-9_]*(?:/[A-Za-z][A-Za-z0-9_]*)?)(?:\[(\d*)\])?\s+([A-Za-z][A-Za-z0-9_]*)$",
    )
    .expect("field regex is valid")
});

#[derive(Debug, Error)]
pub enum MsgError {
    #[error("{msg_type} line {line}: cannot parse field definition `{text}`")]
    BadLine {
        msg_type: String,
        line: usize,
        text: String,
    },
    #[error("unknown message type `{0}`")]
    UnknownType(String),
    #[error("message type `{0}` contains itself")]
    Recursive(String),
    #[error("payload too short reading `{field}`: need {need} bytes at offset {offset}, have {len}")]
    Truncated {
        field: String,
        need: usize,
        offset: usize,
        len: usize,
    },
    #[error("field `{0}` is not valid UTF-8")]
    InvalidUtf8(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    String,
    Time,
    Duration,
}

impl Primitive {
    fn from_name(name: &str) -> Option<Self> {
        let p = match name {
            "bool" => Primitive::Bool,
            // `byte` and `char` are the deprecated aliases of int8 / uint8
            "int8" | "byte" => Primitive::Int8,
            "uint8" | "char" => Primitive::UInt8,
            "int16" => Primitive::Int16,
            "uint16" => Primitive::UInt16,
            "int32" => Primitive::Int32,
            "uint32" => Primitive::UInt32,
            "int64" => Primitive::Int64,
            "uint64" => Primitive::UInt64,
            "float32" => Primitive::Float32,
            "float64" => Primitive::Float64,
            "string" => Primitive::String,
            "time" => Primitive::Time,
            "duration" => Primitive::Duration,
            _ => return None,
        };
        Some(p)
    }

    fn is_byte(self) -> bool {
        matches!(self, Primitive::Int8 | Primitive::UInt8)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Primitive(Primitive),
    /// Fully qualified `pkg/Type` name
    Message(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Single,
    Fixed(usize),
    Dynamic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub ty: FieldType,
    pub arity: Arity,
}

/// A parsed message definition with all of its dependent types.
#[derive(Debug, Clone)]
pub struct MessageSchema {
    root: String,
    types: HashMap<String, Vec<FieldDef>>,
}

struct RawField {
    type_name: String,
    arity: Arity,
    name: String,
}

impl MessageSchema {
    /// Parse the definition text stored in a bag connection for `root_type`.
    pub fn parse(root_type: &str, definition: &str) -> Result<Self, MsgError> {
        let mut sections: Vec<(String, Vec<(usize, &str)>)> = Vec::new();
        let mut current_name = root_type.to_string();
        let mut current_lines = Vec::new();

        for (idx, line) in definition.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.starts_with("====") {
                sections.push((current_name, std::mem::take(&mut current_lines)));
                current_name = String::new();
                continue;
            }
            if let Some(name) = trimmed.strip_prefix("MSG:") {
                current_name = name.trim().to_string();
                continue;
            }
            current_lines.push((idx + 1, line));
        }
        sections.push((current_name, current_lines));

        let mut raw: Vec<(String, Vec<RawField>)> = Vec::with_capacity(sections.len());
        for (name, lines) in sections {
            if name.is_empty() {
                // separator with no MSG: line; nothing we can attach the fields to
                continue;
            }
            let fields = parse_section(&name, &lines)?;
            raw.push((name, fields));
        }

        let known: HashSet<String> = raw.iter().map(|(n, _)| n.clone()).collect();
        let mut needs_header = false;
        let mut types = HashMap::new();
        for (msg_type, fields) in &raw {
            let resolved = fields
                .iter()
                .map(|f| {
                    let ty = resolve_type(msg_type, &f.type_name, &known);
                    if ty == FieldType::Message(HEADER_TYPE.to_string()) {
                        needs_header = true;
                    }
                    FieldDef {
                        name: f.name.clone(),
                        ty,
                        arity: f.arity,
                    }
                })
                .collect::<Vec<_>>();
            tracing::trace!(%msg_type, fields = resolved.len(), "parsed message section");
            types.insert(msg_type.clone(), resolved);
        }

        if needs_header && !known.contains(HEADER_TYPE) {
            let lines: Vec<(usize, &str)> = HEADER_DEFINITION
                .lines()
                .enumerate()
                .map(|(i, l)| (i + 1, l))
                .collect();
            let fields = parse_section(HEADER_TYPE, &lines)?
                .into_iter()
                .map(|f| FieldDef {
                    name: f.name,
                    ty: resolve_type(HEADER_TYPE, &f.type_name, &known),
                    arity: f.arity,
                })
                .collect();
            types.insert(HEADER_TYPE.to_string(), fields);
        }

        let schema = MessageSchema {
            root: root_type.to_string(),
            types,
        };
        schema.check(&schema.root, &mut Vec::new())?;
        Ok(schema)
    }

    pub fn root_type(&self) -> &str {
        &self.root
    }

    /// Fields of the root message, in wire order.
    pub fn fields(&self) -> &[FieldDef] {
        self.types.get(&self.root).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Decode one serialized message. Bytes after the last field are ignored.
    pub fn decode(&self, payload: &[u8]) -> Result<MessageValue, MsgError> {
        let mut reader = Reader::new(payload);
        let value = self.decode_message(&self.root, &mut reader, "")?;
        if reader.remaining() > 0 {
            tracing::debug!(
                msg_type = %self.root,
                trailing = reader.remaining(),
                "ignoring trailing bytes after message"
            );
        }
        Ok(value)
    }

    fn check(&self, msg_type: &str, stack: &mut Vec<String>) -> Result<(), MsgError> {
        if stack.iter().any(|t| t == msg_type) {
            return Err(MsgError::Recursive(msg_type.to_string()));
        }
        let fields = self
            .types
            .get(msg_type)
            .ok_or_else(|| MsgError::UnknownType(msg_type.to_string()))?;
        stack.push(msg_type.to_string());
        for field in fields {
            if let FieldType::Message(nested) = &field.ty {
                self.check(nested, stack)?;
            }
        }
        stack.pop();
        Ok(())
    }

    fn decode_message(
        &self,
        msg_type: &str,
        reader: &mut Reader<'_>,
        prefix: &str,
    ) -> Result<MessageValue, MsgError> {
        let fields = self
            .types
            .get(msg_type)
            .ok_or_else(|| MsgError::UnknownType(msg_type.to_string()))?;
        let mut out = Vec::with_capacity(fields.len());
        for field in fields {
            let path = if prefix.is_empty() {
                field.name.clone()
            } else {
                format!("{prefix}.{}", field.name)
            };
            let value = match field.arity {
                Arity::Single => self.decode_single(&field.ty, reader, &path)?,
                Arity::Fixed(n) => self.decode_array(&field.ty, n, reader, &path)?,
                Arity::Dynamic => {
                    let n = reader.u32(&path)? as usize;
                    self.decode_array(&field.ty, n, reader, &path)?
                }
            };
            out.push((field.name.clone(), value));
        }
        Ok(MessageValue { fields: out })
    }

    fn decode_array(
        &self,
        ty: &FieldType,
        len: usize,
        reader: &mut Reader<'_>,
        path: &str,
    ) -> Result<Value, MsgError> {
        if let FieldType::Primitive(p) = ty
            && p.is_byte()
        {
            return Ok(Value::Bytes(reader.take(len, path)?.to_vec()));
        }
        let mut items = Vec::with_capacity(len.min(reader.remaining()));
        for i in 0..len {
            let item_path = format!("{path}[{i}]");
            items.push(self.decode_single(ty, reader, &item_path)?);
        }
        Ok(Value::Array(items))
    }

    fn decode_single(
        &self,
        ty: &FieldType,
        reader: &mut Reader<'_>,
        path: &str,
    ) -> Result<Value, MsgError> {
        let p = match ty {
            FieldType::Message(nested) => {
                return Ok(Value::Message(self.decode_message(nested, reader, path)?));
            }
            FieldType::Primitive(p) => *p,
        };
        let value = match p {
            Primitive::Bool => Value::Bool(reader.u8(path)? != 0),
            Primitive::Int8 => Value::Int(reader.u8(path)? as i8 as i64),
            Primitive::UInt8 => Value::UInt(reader.u8(path)? as u64),
            Primitive::Int16 => Value::Int(i16::from_le_bytes(reader.array(path)?) as i64),
            Primitive::UInt16 => Value::UInt(u16::from_le_bytes(reader.array(path)?) as u64),
            Primitive::Int32 => Value::Int(i32::from_le_bytes(reader.array(path)?) as i64),
            Primitive::UInt32 => Value::UInt(reader.u32(path)? as u64),
            Primitive::Int64 => Value::Int(i64::from_le_bytes(reader.array(path)?)),
            Primitive::UInt64 => Value::UInt(u64::from_le_bytes(reader.array(path)?)),
            Primitive::Float32 => Value::Float(f32::from_le_bytes(reader.array(path)?) as f64),
            Primitive::Float64 => Value::Float(f64::from_le_bytes(reader.array(path)?)),
            Primitive::String => {
                let len = reader.u32(path)? as usize;
                let bytes = reader.take(len, path)?;
                let s = std::str::from_utf8(bytes)
                    .map_err(|_| MsgError::InvalidUtf8(path.to_string()))?;
                Value::Str(s.to_string())
            }
            Primitive::Time => {
                let secs = reader.u32(path)?;
                let nsecs = reader.u32(path)?;
                Value::Time { secs, nsecs }
            }
            Primitive::Duration => {
                let secs = i32::from_le_bytes(reader.array(path)?);
                let nsecs = i32::from_le_bytes(reader.array(path)?);
                Value::Duration { secs, nsecs }
            }
        };
        Ok(value)
    }
}

fn parse_section(msg_type: &str, lines: &[(usize, &str)]) -> Result<Vec<RawField>, MsgError> {
    let mut fields = Vec::new();
    for &(line_no, line) in lines {
        let code = line.split('#').next().unwrap_or("").trim();
        if code.is_empty() || code.contains('=') {
            // blank, comment-only, or a constant
            continue;
        }
        let normalized = code.split_whitespace().collect::<Vec<_>>().join(" ");
        let caps = FIELD_RE
            .captures(&normalized)
            .ok_or_else(|| MsgError::BadLine {
                msg_type: msg_type.to_string(),
                line: line_no,
                text: code.to_string(),
            })?;
        let arity = match caps.get(2) {
            None => Arity::Single,
            Some(m) if m.as_str().is_empty() => Arity::Dynamic,
            Some(m) => Arity::Fixed(m.as_str().parse().map_err(|_| MsgError::BadLine {
                msg_type: msg_type.to_string(),
                line: line_no,
                text: code.to_string(),
            })?),
        };
        fields.push(RawField {
            type_name: caps[1].to_string(),
            arity,
            name: caps[3].to_string(),
        });
    }
    Ok(fields)
}

fn resolve_type(owner: &str, type_name: &str, known: &HashSet<String>) -> FieldType {
    if let Some(p) = Primitive::from_name(type_name) {
        return FieldType::Primitive(p);
    }
    if type_name == "Header" || type_name == HEADER_TYPE {
        return FieldType::Message(HEADER_TYPE.to_string());
    }
    if type_name.contains('/') {
        return FieldType::Message(type_name.to_string());
    }
    let package = owner.split_once('/').map(|(pkg, _)| pkg).unwrap_or("");
    let local = format!("{package}/{type_name}");
    if known.contains(&local) {
        return FieldType::Message(local);
    }
    let suffix = format!("/{type_name}");
    let mut candidates = known.iter().filter(|k| k.ends_with(&suffix));
    match (candidates.next(), candidates.next()) {
        (Some(only), None) => FieldType::Message(only.clone()),
        _ => FieldType::Message(local),
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize, field: &str) -> Result<&'a [u8], MsgError> {
        if self.remaining() < n {
            return Err(MsgError::Truncated {
                field: field.to_string(),
                need: n,
                offset: self.pos,
                len: self.data.len(),
            });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self, field: &str) -> Result<[u8; N], MsgError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, field)?);
        Ok(out)
    }

    fn u8(&mut self, field: &str) -> Result<u8, MsgError> {
        Ok(self.take(1, field)?[0])
    }

    fn u32(&mut self, field: &str) -> Result<u32, MsgError> {
        Ok(u32::from_le_bytes(self.array(field)?))
    }
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Time { secs: u32, nsecs: u32 },
    Duration { secs: i32, nsecs: i32 },
    /// `int8[]` / `uint8[]` payloads, kept as raw bytes
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Message(MessageValue),
}

impl Value {
    /// Integer view; floats are truncated toward zero.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            Value::Bool(b) => Some(*b as i64),
            Value::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::UInt(v) => Some(*v as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(*b as u8 as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&MessageValue> {
        match self {
            Value::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Time { .. } => "time",
            Value::Duration { .. } => "duration",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Message(_) => "message",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => f.write_str(s),
            // rospy renders time and duration as their nanosecond count
            Value::Time { secs, nsecs } => {
                write!(f, "{}", *secs as u64 * 1_000_000_000 + *nsecs as u64)
            }
            Value::Duration { secs, nsecs } => {
                write!(f, "{}", *secs as i64 * 1_000_000_000 + *nsecs as i64)
            }
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Array(items) => write!(f, "<{} items>", items.len()),
            Value::Message(m) => write!(f, "<{} fields>", m.fields.len()),
        }
    }
}

/// Decoded message: named fields in wire order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MessageValue {
    fields: Vec<(String, Value)>,
}

impl MessageValue {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Look up a nested field by dotted path, e.g. `header.frame_id`.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut value = self.get(parts.next()?)?;
        for part in parts {
            value = value.as_message()?.get(part)?;
        }
        Some(value)
    }
}
