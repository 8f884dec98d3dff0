use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::types::{NestedField, Type};

/// A table schema: an ordered field list with a stable id. At the wire level
/// a schema is a struct type carrying a `schema-id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schema {
    pub schema_id: i32,
    pub fields: Vec<NestedField>,
}

impl Schema {
    pub fn new(schema_id: i32, fields: Vec<NestedField>) -> Self {
        Self { schema_id, fields }
    }

    pub fn field_by_id(&self, id: i32) -> Option<&NestedField> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&NestedField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The largest field id assigned anywhere in the schema, including
    /// element/key/value ids of nested types. New fields must be assigned
    /// strictly above this.
    pub fn highest_field_id(&self) -> i32 {
        self.fields
            .iter()
            .map(|f| f.id.max(f.field_type.max_field_id()))
            .max()
            .unwrap_or(0)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct SchemaWire<'a> {
    r#type: &'static str,
    schema_id: i32,
    fields: &'a [NestedField],
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct SchemaOwned {
    r#type: String,
    schema_id: i32,
    fields: Vec<NestedField>,
}

impl Serialize for Schema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        SchemaWire {
            r#type: "struct",
            schema_id: self.schema_id,
            fields: &self.fields,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Schema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let owned = SchemaOwned::deserialize(deserializer)?;
        if owned.r#type != "struct" {
            return Err(D::Error::custom(format!(
                "schema root must be a struct, got {:?}",
                owned.r#type
            )));
        }
        Ok(Schema {
            schema_id: owned.schema_id,
            fields: owned.fields,
        })
    }
}
