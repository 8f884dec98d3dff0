use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;

use arrow_schema::{DataType, Field, Fields, Schema as ArrowSchema, TimeUnit};
use parquet::arrow::PARQUET_FIELD_ID_META_KEY;
use tracing::warn;

use crate::error::{Error, Result};
use crate::spec::{ListType, MapType, NestedField, PrimitiveType, Schema, StructType, Type};

/// Translates an Arrow schema into a table schema.
///
/// When every top-level Arrow field carries an embedded field id (the
/// `PARQUET:field_id` metadata our own conversion writes), those ids are
/// reused so `iceberg -> arrow -> iceberg` preserves them. Otherwise fresh
/// ids are assigned breadth-first starting at 1.
pub fn arrow_to_iceberg_schema(arrow: &ArrowSchema) -> Result<Schema> {
    let all_tagged = !arrow.fields.is_empty() && arrow.fields.iter().all(|f| embedded_id(f).is_some());
    let mut fields = Vec::with_capacity(arrow.fields.len());
    for field in arrow.fields.iter() {
        fields.push(arrow_field_to_iceberg(field, all_tagged)?);
    }
    if !all_tagged {
        assign_ids_breadth_first(&mut fields, 1);
    }
    Ok(Schema::new(0, fields))
}

/// Translates a table schema into an Arrow schema, embedding field ids as
/// `PARQUET:field_id` metadata on every field.
pub fn iceberg_to_arrow_schema(schema: &Schema) -> Result<ArrowSchema> {
    let fields: Vec<Field> = schema
        .fields
        .iter()
        .map(iceberg_field_to_arrow)
        .collect::<Result<_>>()?;
    Ok(ArrowSchema::new(fields))
}

fn embedded_id(field: &Field) -> Option<i32> {
    field
        .metadata()
        .get(PARQUET_FIELD_ID_META_KEY)
        .and_then(|raw| raw.parse::<i32>().ok())
}

fn arrow_field_to_iceberg(field: &Field, use_embedded_ids: bool) -> Result<NestedField> {
    let id = if use_embedded_ids {
        embedded_id(field).unwrap_or(0)
    } else {
        0
    };
    Ok(NestedField {
        id,
        name: field.name().clone(),
        // nullability maps to required = !nullable
        required: !field.is_nullable(),
        field_type: arrow_type_to_iceberg(field.data_type(), field.name(), use_embedded_ids)?,
        doc: None,
    })
}

fn arrow_type_to_iceberg(data_type: &DataType, field_name: &str, use_embedded_ids: bool) -> Result<Type> {
    let primitive = match data_type {
        DataType::Boolean => Some(PrimitiveType::Boolean),
        // integer widths <= 32 bits widen to the 32-bit int
        DataType::Int8 | DataType::Int16 | DataType::Int32 => Some(PrimitiveType::Int),
        DataType::UInt8 | DataType::UInt16 => Some(PrimitiveType::Int),
        DataType::Int64 => Some(PrimitiveType::Long),
        // unsigned maps to the next-larger signed type; u64 is the producer's
        // responsibility when values exceed i64
        DataType::UInt32 | DataType::UInt64 => Some(PrimitiveType::Long),
        DataType::Float16 | DataType::Float32 => Some(PrimitiveType::Float),
        DataType::Float64 => Some(PrimitiveType::Double),
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => Some(PrimitiveType::String),
        DataType::Binary | DataType::LargeBinary | DataType::BinaryView => {
            Some(PrimitiveType::Binary)
        }
        DataType::Date32 | DataType::Date64 => Some(PrimitiveType::Date),
        DataType::Time32(_) | DataType::Time64(_) => Some(PrimitiveType::Time),
        DataType::Timestamp(_, None) => Some(PrimitiveType::Timestamp),
        DataType::Timestamp(_, Some(_)) => Some(PrimitiveType::Timestamptz),
        DataType::Decimal128(precision, scale) => Some(PrimitiveType::Decimal {
            precision: *precision as u32,
            scale: *scale as u32,
        }),
        DataType::FixedSizeBinary(len) => Some(PrimitiveType::Fixed(*len as u64)),
        _ => None,
    };
    if let Some(primitive) = primitive {
        return Ok(Type::Primitive(primitive));
    }

    match data_type {
        DataType::Struct(children) => {
            let fields = children
                .iter()
                .map(|child| arrow_field_to_iceberg(child, use_embedded_ids))
                .collect::<Result<Vec<_>>>()?;
            Ok(Type::Struct(StructType { fields }))
        }
        DataType::List(element) | DataType::LargeList(element) => {
            let element_field = arrow_field_to_iceberg(element, use_embedded_ids)?;
            Ok(Type::List(Box::new(ListType {
                element_id: element_field.id,
                element_required: element_field.required,
                element: element_field.field_type,
            })))
        }
        DataType::Map(entries, _) => {
            let DataType::Struct(kv) = entries.data_type() else {
                return Err(Error::schema_mismatch(format!(
                    "map field {field_name:?} has a non-struct entry type"
                )));
            };
            if kv.len() != 2 {
                return Err(Error::schema_mismatch(format!(
                    "map field {field_name:?} entries must have exactly a key and a value"
                )));
            }
            let key_field = arrow_field_to_iceberg(&kv[0], use_embedded_ids)?;
            let value_field = arrow_field_to_iceberg(&kv[1], use_embedded_ids)?;
            Ok(Type::Map(Box::new(MapType {
                key_id: key_field.id,
                key: key_field.field_type,
                value_id: value_field.id,
                value_required: value_field.required,
                value: value_field.field_type,
            })))
        }
        other => {
            // fallback for types with no table-format counterpart
            warn!(field = field_name, arrow_type = %other, "no direct type mapping, storing as string");
            Ok(Type::Primitive(PrimitiveType::String))
        }
    }
}

fn field_id_metadata(id: i32) -> HashMap<String, String> {
    HashMap::from([(PARQUET_FIELD_ID_META_KEY.to_string(), id.to_string())])
}

fn iceberg_field_to_arrow(field: &NestedField) -> Result<Field> {
    Ok(
        Field::new(&field.name, iceberg_type_to_arrow(&field.field_type)?, !field.required)
            .with_metadata(field_id_metadata(field.id)),
    )
}

fn iceberg_type_to_arrow(ty: &Type) -> Result<DataType> {
    Ok(match ty {
        Type::Primitive(p) => match p {
            PrimitiveType::Boolean => DataType::Boolean,
            PrimitiveType::Int => DataType::Int32,
            PrimitiveType::Long => DataType::Int64,
            PrimitiveType::Float => DataType::Float32,
            PrimitiveType::Double => DataType::Float64,
            PrimitiveType::Date => DataType::Date32,
            PrimitiveType::Time => DataType::Time64(TimeUnit::Microsecond),
            PrimitiveType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
            PrimitiveType::Timestamptz => {
                DataType::Timestamp(TimeUnit::Microsecond, Some("+00:00".into()))
            }
            PrimitiveType::String => DataType::Utf8,
            PrimitiveType::Uuid => DataType::FixedSizeBinary(16),
            PrimitiveType::Binary => DataType::Binary,
            PrimitiveType::Decimal { precision, scale } => {
                DataType::Decimal128(*precision as u8, *scale as i8)
            }
            PrimitiveType::Fixed(len) => DataType::FixedSizeBinary(*len as i32),
        },
        Type::Struct(s) => {
            let children: Vec<Field> = s
                .fields
                .iter()
                .map(iceberg_field_to_arrow)
                .collect::<Result<_>>()?;
            DataType::Struct(Fields::from(children))
        }
        Type::List(l) => {
            let element = Field::new("element", iceberg_type_to_arrow(&l.element)?, !l.element_required)
                .with_metadata(field_id_metadata(l.element_id));
            DataType::List(Arc::new(element))
        }
        Type::Map(m) => {
            let key = Field::new("key", iceberg_type_to_arrow(&m.key)?, false)
                .with_metadata(field_id_metadata(m.key_id));
            let value = Field::new("value", iceberg_type_to_arrow(&m.value)?, !m.value_required)
                .with_metadata(field_id_metadata(m.value_id));
            let entries = Field::new("entries", DataType::Struct(Fields::from(vec![key, value])), false);
            DataType::Map(Arc::new(entries), false)
        }
    })
}

/// Assigns field ids breadth-first starting at `start`: first all fields of a
/// level, then the ids their composite types introduce. Ids are never reused;
/// on evolution `start` must be strictly above the historical maximum.
pub fn assign_ids_breadth_first(fields: &mut [NestedField], start: i32) {
    let mut next = start;
    for field in fields.iter_mut() {
        field.id = next;
        next += 1;
    }
    let mut queue: VecDeque<&mut Type> = fields.iter_mut().map(|f| &mut f.field_type).collect();
    while let Some(ty) = queue.pop_front() {
        match ty {
            Type::Primitive(_) => {}
            Type::Struct(s) => {
                for field in s.fields.iter_mut() {
                    field.id = next;
                    next += 1;
                }
                for field in s.fields.iter_mut() {
                    queue.push_back(&mut field.field_type);
                }
            }
            Type::List(l) => {
                l.element_id = next;
                next += 1;
                queue.push_back(&mut l.element);
            }
            Type::Map(m) => {
                m.key_id = next;
                m.value_id = next + 1;
                next += 2;
                queue.push_back(&mut m.key);
                queue.push_back(&mut m.value);
            }
        }
    }
}

/// Structural type equality ignoring field ids. Used to decide write
/// compatibility when inputs match by name.
pub fn types_structurally_equal(a: &Type, b: &Type) -> bool {
    match (a, b) {
        (Type::Primitive(x), Type::Primitive(y)) => x == y,
        (Type::Struct(x), Type::Struct(y)) => {
            x.fields.len() == y.fields.len()
                && x.fields.iter().zip(y.fields.iter()).all(|(f, g)| {
                    f.name == g.name
                        && f.required == g.required
                        && types_structurally_equal(&f.field_type, &g.field_type)
                })
        }
        (Type::List(x), Type::List(y)) => {
            x.element_required == y.element_required
                && types_structurally_equal(&x.element, &y.element)
        }
        (Type::Map(x), Type::Map(y)) => {
            x.value_required == y.value_required
                && types_structurally_equal(&x.key, &y.key)
                && types_structurally_equal(&x.value, &y.value)
        }
        _ => false,
    }
}

/// Checks that an input Arrow schema can be written into a table with the
/// given schema: fields resolve by embedded id or by name, types match
/// structurally, and no required table column is nullable or absent in the
/// input.
pub fn validate_write_schema(table_schema: &Schema, input: &ArrowSchema) -> Result<()> {
    for field in input.fields.iter() {
        let table_field = match embedded_id(field).and_then(|id| table_schema.field_by_id(id)) {
            Some(found) => found,
            None => table_schema.field_by_name(field.name()).ok_or_else(|| {
                Error::schema_mismatch(format!("input column {:?} is not in the table schema", field.name()))
            })?,
        };
        let input_type = arrow_type_to_iceberg(field.data_type(), field.name(), false)?;
        if !types_structurally_equal(&input_type, &table_field.field_type) {
            return Err(Error::schema_mismatch(format!(
                "column {:?} has type {} but the table expects {}",
                field.name(),
                input_type,
                table_field.field_type
            )));
        }
        if table_field.required && field.is_nullable() {
            return Err(Error::schema_mismatch(format!(
                "column {:?} is nullable but the table requires it",
                field.name()
            )));
        }
    }
    for table_field in &table_schema.fields {
        if table_field.required && input.field_with_name(&table_field.name).is_err() {
            return Err(Error::schema_mismatch(format!(
                "required column {:?} is missing from the input",
                table_field.name
            )));
        }
    }
    Ok(())
}
