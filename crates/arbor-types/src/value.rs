use std::cmp::Ordering;
use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use uuid::Uuid;

use crate::{Address, ArborError, NodeId, Result};

/// Type tags understood by [`Value::from_typed`] and the text codec, in display order.
pub const TYPE_TAGS: &[&str] = &[
    "string", "int", "float", "bool", "blob", "date", "time", "guid", "path", "node",
];

/// The value a node carries.
///
/// `Node` is a non-owning reference to another node of the same arena; it is
/// never followed for ownership, cloning, or destruction.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    None,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Bytes(Vec<u8>),
    DateTime(DateTime<Utc>),
    Duration(Duration),
    Guid(Uuid),
    Node(NodeId),
    Path(Address),
}

impl Value {
    /// The codec type tag of this value; `None` has no tag and reports `"null"`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "null",
            Value::Text(_) => "string",
            Value::Integer(_) => "int",
            Value::Float(_) => "float",
            Value::Boolean(_) => "bool",
            Value::Bytes(_) => "blob",
            Value::DateTime(_) => "date",
            Value::Duration(_) => "time",
            Value::Guid(_) => "guid",
            Value::Node(_) => "node",
            Value::Path(_) => "path",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Value::Node(id) => Some(*id),
            _ => None,
        }
    }

    /// Parse `literal` as the type named by `tag`.
    ///
    /// `node` literals need a tree to resolve against and are rejected here.
    pub fn from_typed(tag: &str, literal: &str) -> Result<Value> {
        let invalid = || ArborError::InvalidLiteral {
            type_name: tag.to_string(),
            literal: literal.to_string(),
        };
        let value = match tag {
            "string" => Value::Text(literal.to_string()),
            "int" => Value::Integer(literal.trim().parse().map_err(|_| invalid())?),
            "float" => Value::Float(literal.trim().parse().map_err(|_| invalid())?),
            "bool" => match literal.trim() {
                "true" => Value::Boolean(true),
                "false" => Value::Boolean(false),
                _ => return Err(invalid()),
            },
            "blob" => Value::Bytes(
                base64::engine::general_purpose::STANDARD
                    .decode(literal.trim())
                    .map_err(|_| invalid())?,
            ),
            "date" => Value::DateTime(parse_date(literal.trim()).ok_or_else(invalid)?),
            "time" => Value::Duration(parse_duration(literal.trim()).map_err(|_| invalid())?),
            "guid" => Value::Guid(Uuid::parse_str(literal.trim()).map_err(|_| invalid())?),
            "path" => Value::Path(literal.parse().map_err(|_| invalid())?),
            "node" => return Err(invalid()),
            other => {
                return Err(ArborError::syntax(
                    other,
                    format!("unknown type tag, expected one of {}", TYPE_TAGS.join(", ")),
                ))
            }
        };
        Ok(value)
    }

    /// Text form of the value without tree access.
    ///
    /// Returns `None` only for `Node` references, whose text form is their
    /// target's address and therefore needs the owning tree (see `Tree::stringify`).
    pub fn to_literal(&self) -> Option<String> {
        let text = match self {
            Value::None => String::new(),
            Value::Text(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Bytes(bytes) => base64::engine::general_purpose::STANDARD.encode(bytes),
            Value::DateTime(dt) => dt.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            Value::Duration(d) => format_duration(*d),
            Value::Guid(g) => g.hyphenated().to_string(),
            Value::Path(addr) => addr.to_string(),
            Value::Node(_) => return None,
        };
        Some(text)
    }

    /// Order two values, coercing where a sensible coercion exists.
    ///
    /// Integers and floats compare numerically, text is parsed as the other
    /// side's type, and `None` sorts before everything else. Returns `None`
    /// when the values cannot be compared at all; node references only compare
    /// equal to themselves.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::None, Value::None) => Some(Ordering::Equal),
            (Value::None, _) => Some(Ordering::Less),
            (_, Value::None) => Some(Ordering::Greater),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Integer(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::Duration(a), Value::Duration(b)) => Some(a.cmp(b)),
            (Value::Guid(a), Value::Guid(b)) => Some(a.cmp(b)),
            (Value::Path(a), Value::Path(b)) => Some(a.cmp(b)),
            (Value::Node(a), Value::Node(b)) if a == b => Some(Ordering::Equal),
            (Value::Node(_), _) | (_, Value::Node(_)) => None,
            (Value::Text(text), typed) => {
                let coerced = Value::from_typed(typed.type_name(), text).ok()?;
                coerced.compare(typed)
            }
            (typed, Value::Text(text)) => {
                let coerced = Value::from_typed(typed.type_name(), text).ok()?;
                typed.compare(&coerced)
            }
            _ => None,
        }
    }
}

fn parse_date(literal: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(literal) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(literal, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Render a duration in its largest exact unit (`d`, `h`, `m`, `s`, `ms`).
///
/// Sub-millisecond precision is dropped.
pub fn format_duration(duration: Duration) -> String {
    let ms = duration.as_millis();
    if ms == 0 {
        return "0ms".to_string();
    }
    const UNITS: &[(u128, &str)] = &[
        (86_400_000, "d"),
        (3_600_000, "h"),
        (60_000, "m"),
        (1_000, "s"),
    ];
    for (size, suffix) in UNITS {
        if ms % size == 0 {
            return format!("{}{}", ms / size, suffix);
        }
    }
    format!("{}ms", ms)
}

/// Parse a duration literal: digits followed by `ms`, `s`, `m`, `h` or `d`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("missing duration unit in '{}'", s))?;
    let (digits, suffix) = s.split_at(split);
    let n: u64 = digits
        .parse()
        .map_err(|e| format!("invalid duration '{}': {}", s, e))?;
    let secs = |mult: u64| {
        n.checked_mul(mult)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration '{}' overflows", s))
    };
    match suffix {
        "ms" => Ok(Duration::from_millis(n)),
        "s" => secs(1),
        "m" => secs(60),
        "h" => secs(3600),
        "d" => secs(86_400),
        _ => Err(format!("unknown duration unit in '{}'", s)),
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<Duration> for Value {
    fn from(d: Duration) -> Self {
        Value::Duration(d)
    }
}

impl From<Uuid> for Value {
    fn from(g: Uuid) -> Self {
        Value::Guid(g)
    }
}

impl From<Address> for Value {
    fn from(a: Address) -> Self {
        Value::Path(a)
    }
}

impl From<NodeId> for Value {
    fn from(id: NodeId) -> Self {
        Value::Node(id)
    }
}
