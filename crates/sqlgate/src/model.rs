//! Model descriptors and the metadata extracted from them.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::types::{FieldType, NormalizedType, normalize};
use crate::{Error, Result};

/// A type that maps to a database table.
pub trait Table: 'static {
    fn table_name() -> &'static str;
}

/// A table whose exposed fields are described by a static schema.
///
/// ```ignore
/// struct Employee;
///
/// impl Table for Employee {
///     fn table_name() -> &'static str {
///         "employees"
///     }
/// }
///
/// impl Model for Employee {
///     fn fields() -> &'static [FieldDef] {
///         const FIELDS: &[FieldDef] = &[
///             FieldDef::new("id", "id", FieldType::I64),
///             FieldDef::new("name", "name", FieldType::Text),
///             FieldDef::new("reportingTo", "reporting_to", FieldType::Array(&FieldType::I64)),
///         ];
///         FIELDS
///     }
/// }
/// ```
pub trait Model: Table {
    /// Exposed fields in declaration order.
    fn fields() -> &'static [FieldDef];
}

/// Schema entry for one exposed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    /// Name callers use in requests and see in results.
    pub external: &'static str,
    /// Storage column name.
    pub column: &'static str,
    pub ty: FieldType,
}

impl FieldDef {
    pub const fn new(external: &'static str, column: &'static str, ty: FieldType) -> Self {
        Self {
            external,
            column,
            ty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayInfo {
    pub element: NormalizedType,
    pub declared_element: FieldType,
}

/// A registered field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub external_name: String,
    pub column_name: String,
    pub declared: FieldType,
    pub normalized: NormalizedType,
    pub array: Option<ArrayInfo>,
}

impl Field {
    pub fn is_array(&self) -> bool {
        self.array.is_some()
    }
}

/// Everything the validator and builders know about a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMetadata {
    pub table_name: String,
    /// Keyed by external name, in declaration order.
    pub fields: IndexMap<String, Field>,
}

impl ModelMetadata {
    /// Extract metadata from a model's descriptors.
    pub fn of<M: Model>() -> Result<Self> {
        Self::from_defs(std::any::type_name::<M>(), M::table_name(), M::fields())
    }

    pub fn from_defs(model: &str, table_name: &str, defs: &[FieldDef]) -> Result<Self> {
        let fail = |reason: String| Error::Registration {
            model: model.to_owned(),
            reason,
        };

        if table_name.is_empty() {
            return Err(fail("table name is empty".into()));
        }

        let mut fields = IndexMap::with_capacity(defs.len());
        let mut columns = HashSet::with_capacity(defs.len());

        for def in defs {
            if def.external.is_empty() {
                return Err(fail(format!(
                    "field mapped to column {:?} has an empty name",
                    def.column
                )));
            }
            if def.column.is_empty() {
                return Err(fail(format!("field {} has an empty column name", def.external)));
            }
            if !columns.insert(def.column) {
                return Err(fail(format!("column {} is mapped more than once", def.column)));
            }

            let array = def.ty.element().map(|elem| ArrayInfo {
                element: normalize(elem),
                declared_element: *elem,
            });
            let field = Field {
                external_name: def.external.to_owned(),
                column_name: def.column.to_owned(),
                declared: def.ty,
                normalized: normalize(&def.ty),
                array,
            };
            if fields.insert(def.external.to_owned(), field).is_some() {
                return Err(fail(format!("field {} is declared more than once", def.external)));
            }
        }

        Ok(Self {
            table_name: table_name.to_owned(),
            fields,
        })
    }

    pub fn field(&self, external: &str) -> Option<&Field> {
        self.fields.get(external)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const I64: FieldType = FieldType::I64;

    struct Employee;

    impl Table for Employee {
        fn table_name() -> &'static str {
            "employees"
        }
    }

    impl Model for Employee {
        fn fields() -> &'static [FieldDef] {
            const FIELDS: &[FieldDef] = &[
                FieldDef::new("id", "id", FieldType::I64),
                FieldDef::new("name", "name", FieldType::Text),
                FieldDef::new("reportingTo", "reporting_to", FieldType::Array(&I64)),
            ];
            FIELDS
        }
    }

    #[test]
    fn extracts_fields_in_order() {
        let meta = ModelMetadata::of::<Employee>().unwrap();
        assert_eq!(meta.table_name, "employees");
        let names: Vec<_> = meta.fields.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["id", "name", "reportingTo"]);

        let reporting = meta.field("reportingTo").unwrap();
        assert_eq!(reporting.column_name, "reporting_to");
        assert_eq!(
            reporting.array,
            Some(ArrayInfo {
                element: NormalizedType::Integer,
                declared_element: FieldType::I64,
            })
        );
        assert!(!meta.field("id").unwrap().is_array());
    }

    #[test]
    fn rejects_duplicate_external_name() {
        let defs = [
            FieldDef::new("id", "id", FieldType::I64),
            FieldDef::new("id", "other_id", FieldType::I64),
        ];
        let err = ModelMetadata::from_defs("T", "t", &defs).unwrap_err();
        assert!(matches!(err, Error::Registration { .. }));
        assert!(err.to_string().contains("declared more than once"));
    }

    #[test]
    fn rejects_duplicate_column() {
        let defs = [
            FieldDef::new("a", "col", FieldType::I64),
            FieldDef::new("b", "col", FieldType::I64),
        ];
        let err = ModelMetadata::from_defs("T", "t", &defs).unwrap_err();
        assert!(err.to_string().contains("mapped more than once"));
    }

    #[test]
    fn rejects_empty_names() {
        let defs = [FieldDef::new("", "col", FieldType::I64)];
        assert!(ModelMetadata::from_defs("T", "t", &defs).is_err());
        let defs = [FieldDef::new("a", "", FieldType::I64)];
        assert!(ModelMetadata::from_defs("T", "t", &defs).is_err());
        assert!(ModelMetadata::from_defs("T", "", &[]).is_err());
    }
}
