use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Primitive field types of the table format. Rendered in JSON as plain
/// strings, e.g. `"long"`, `"decimal(10,2)"`, `"fixed[16]"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrimitiveType {
    Boolean,
    Int,
    Long,
    Float,
    Double,
    Date,
    Time,
    Timestamp,
    Timestamptz,
    String,
    Uuid,
    Binary,
    Decimal { precision: u32, scale: u32 },
    Fixed(u64),
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimitiveType::Boolean => write!(f, "boolean"),
            PrimitiveType::Int => write!(f, "int"),
            PrimitiveType::Long => write!(f, "long"),
            PrimitiveType::Float => write!(f, "float"),
            PrimitiveType::Double => write!(f, "double"),
            PrimitiveType::Date => write!(f, "date"),
            PrimitiveType::Time => write!(f, "time"),
            PrimitiveType::Timestamp => write!(f, "timestamp"),
            PrimitiveType::Timestamptz => write!(f, "timestamptz"),
            PrimitiveType::String => write!(f, "string"),
            PrimitiveType::Uuid => write!(f, "uuid"),
            PrimitiveType::Binary => write!(f, "binary"),
            PrimitiveType::Decimal { precision, scale } => write!(f, "decimal({precision},{scale})"),
            PrimitiveType::Fixed(len) => write!(f, "fixed[{len}]"),
        }
    }
}

impl FromStr for PrimitiveType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "boolean" => Ok(PrimitiveType::Boolean),
            "int" => Ok(PrimitiveType::Int),
            "long" => Ok(PrimitiveType::Long),
            "float" => Ok(PrimitiveType::Float),
            "double" => Ok(PrimitiveType::Double),
            "date" => Ok(PrimitiveType::Date),
            "time" => Ok(PrimitiveType::Time),
            "timestamp" => Ok(PrimitiveType::Timestamp),
            "timestamptz" => Ok(PrimitiveType::Timestamptz),
            "string" => Ok(PrimitiveType::String),
            "uuid" => Ok(PrimitiveType::Uuid),
            "binary" => Ok(PrimitiveType::Binary),
            other => {
                if let Some(args) = other.strip_prefix("decimal(").and_then(|r| r.strip_suffix(')'))
                {
                    let mut parts = args.split(',').map(str::trim);
                    let precision = parts
                        .next()
                        .and_then(|p| p.parse::<u32>().ok())
                        .ok_or_else(|| format!("bad decimal precision in {other:?}"))?;
                    let scale = parts
                        .next()
                        .and_then(|p| p.parse::<u32>().ok())
                        .ok_or_else(|| format!("bad decimal scale in {other:?}"))?;
                    if parts.next().is_some() {
                        return Err(format!("bad decimal type {other:?}"));
                    }
                    return Ok(PrimitiveType::Decimal { precision, scale });
                }
                if let Some(len) = other.strip_prefix("fixed[").and_then(|r| r.strip_suffix(']')) {
                    let len = len
                        .trim()
                        .parse::<u64>()
                        .map_err(|_| format!("bad fixed length in {other:?}"))?;
                    return Ok(PrimitiveType::Fixed(len));
                }
                Err(format!("unknown primitive type {other:?}"))
            }
        }
    }
}

/// A field of a struct type (or of a schema, which is a struct at the root).
/// Field ids are stable across schema evolution and never reused.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestedField {
    pub id: i32,
    pub name: String,
    pub required: bool,
    #[serde(rename = "type")]
    pub field_type: Type,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

impl NestedField {
    pub fn required(id: i32, name: impl Into<String>, field_type: Type) -> Self {
        Self {
            id,
            name: name.into(),
            required: true,
            field_type,
            doc: None,
        }
    }

    pub fn optional(id: i32, name: impl Into<String>, field_type: Type) -> Self {
        Self {
            id,
            name: name.into(),
            required: false,
            field_type,
            doc: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructType {
    pub fields: Vec<NestedField>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListType {
    pub element_id: i32,
    pub element_required: bool,
    pub element: Type,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapType {
    pub key_id: i32,
    pub key: Type,
    pub value_id: i32,
    pub value_required: bool,
    pub value: Type,
}

/// A field type: primitive, or one of the composites. JSON form is a string
/// for primitives and a tagged object for composites, per the table-format
/// convention.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Type {
    Primitive(PrimitiveType),
    Struct(StructType),
    List(Box<ListType>),
    Map(Box<MapType>),
}

impl Type {
    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::Primitive(_))
    }

    /// The largest field id referenced anywhere inside this type, if any.
    pub fn max_field_id(&self) -> i32 {
        match self {
            Type::Primitive(_) => 0,
            Type::Struct(s) => s
                .fields
                .iter()
                .map(|f| f.id.max(f.field_type.max_field_id()))
                .max()
                .unwrap_or(0),
            Type::List(l) => l.element_id.max(l.element.max_field_id()),
            Type::Map(m) => m
                .key_id
                .max(m.value_id)
                .max(m.key.max_field_id())
                .max(m.value.max_field_id()),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Primitive(p) => write!(f, "{p}"),
            Type::Struct(s) => {
                write!(f, "struct<")?;
                for (i, field) in s.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", field.name, field.field_type)?;
                }
                write!(f, ">")
            }
            Type::List(l) => write!(f, "list<{}>", l.element),
            Type::Map(m) => write!(f, "map<{}, {}>", m.key, m.value),
        }
    }
}

// JSON wire helpers. Composite types carry a "type" discriminator next to
// their payload fields, primitives are bare strings.

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct StructTypeWire<'a> {
    r#type: &'static str,
    fields: &'a [NestedField],
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct ListTypeWire<'a> {
    r#type: &'static str,
    element_id: i32,
    element_required: bool,
    element: &'a Type,
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct MapTypeWire<'a> {
    r#type: &'static str,
    key_id: i32,
    key: &'a Type,
    value_id: i32,
    value_required: bool,
    value: &'a Type,
}

impl Serialize for Type {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Type::Primitive(p) => serializer.serialize_str(&p.to_string()),
            Type::Struct(s) => StructTypeWire {
                r#type: "struct",
                fields: &s.fields,
            }
            .serialize(serializer),
            Type::List(l) => ListTypeWire {
                r#type: "list",
                element_id: l.element_id,
                element_required: l.element_required,
                element: &l.element,
            }
            .serialize(serializer),
            Type::Map(m) => MapTypeWire {
                r#type: "map",
                key_id: m.key_id,
                key: &m.key,
                value_id: m.value_id,
                value_required: m.value_required,
                value: &m.value,
            }
            .serialize(serializer),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ListTypeOwned {
    element_id: i32,
    element_required: bool,
    element: Type,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct MapTypeOwned {
    key_id: i32,
    key: Type,
    value_id: i32,
    value_required: bool,
    value: Type,
}

#[derive(Deserialize)]
struct StructTypeOwned {
    fields: Vec<NestedField>,
}

impl<'de> Deserialize<'de> for Type {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        match &value {
            serde_json::Value::String(s) => PrimitiveType::from_str(s)
                .map(Type::Primitive)
                .map_err(D::Error::custom),
            serde_json::Value::Object(map) => {
                let tag = map
                    .get("type")
                    .and_then(|t| t.as_str())
                    .ok_or_else(|| D::Error::custom("composite type without a \"type\" tag"))?;
                match tag {
                    "struct" => {
                        let s: StructTypeOwned =
                            serde_json::from_value(value.clone()).map_err(D::Error::custom)?;
                        Ok(Type::Struct(StructType { fields: s.fields }))
                    }
                    "list" => {
                        let l: ListTypeOwned =
                            serde_json::from_value(value.clone()).map_err(D::Error::custom)?;
                        Ok(Type::List(Box::new(ListType {
                            element_id: l.element_id,
                            element_required: l.element_required,
                            element: l.element,
                        })))
                    }
                    "map" => {
                        let m: MapTypeOwned =
                            serde_json::from_value(value.clone()).map_err(D::Error::custom)?;
                        Ok(Type::Map(Box::new(MapType {
                            key_id: m.key_id,
                            key: m.key,
                            value_id: m.value_id,
                            value_required: m.value_required,
                            value: m.value,
                        })))
                    }
                    other => Err(D::Error::custom(format!("unknown composite type {other:?}"))),
                }
            }
            _ => Err(D::Error::custom("type must be a string or an object")),
        }
    }
}
