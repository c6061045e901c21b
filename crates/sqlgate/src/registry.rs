//! Process-wide model registry.
//!
//! Maps model types to their extracted [`ModelMetadata`], plus two auxiliary
//! maps keyed by custom type name: scanners decode a column into a [`Value`]
//! and converters adapt a request value before it is bound.

use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::model::{Model, ModelMetadata};
use crate::value::Value;
use crate::{Error, Result};

/// Decodes column `idx` of a row.
pub type Scanner = Arc<dyn Fn(&tokio_postgres::Row, usize) -> Result<Value> + Send + Sync>;

/// Adapts a value before binding. The error message is reported against the field.
pub type Converter = Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;

/// A model registration collected at link time.
///
/// ```ignore
/// inventory::submit!(sqlgate::ModelRegistration::of::<Employee>());
/// ```
pub struct ModelRegistration {
    register: fn(&Registry) -> Result<()>,
}

impl ModelRegistration {
    pub const fn of<M: Model>() -> Self {
        Self {
            register: register_erased::<M>,
        }
    }
}

fn register_erased<M: Model>(registry: &Registry) -> Result<()> {
    registry.register::<M>()
}

inventory::collect!(ModelRegistration);

#[derive(Default)]
struct Inner {
    models: HashMap<TypeId, Arc<ModelMetadata>>,
    scanners: HashMap<String, Scanner>,
    converters: HashMap<String, Converter>,
}

#[derive(Default)]
pub struct Registry {
    inner: RwLock<Inner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(Registry::new)
    }

    /// Register a model.
    ///
    /// Registering a model twice is a no-op: the first metadata stays.
    /// Nothing is stored when extraction fails.
    pub fn register<M: Model>(&self) -> Result<()> {
        let id = TypeId::of::<M>();
        if self.inner.read().models.contains_key(&id) {
            tracing::debug!(model = type_name::<M>(), "model already registered");
            return Ok(());
        }

        // Extract outside the write lock; a racing registration wins.
        let meta = ModelMetadata::of::<M>()?;
        let mut inner = self.inner.write();
        inner.models.entry(id).or_insert_with(|| {
            tracing::debug!(
                model = type_name::<M>(),
                table = %meta.table_name,
                fields = meta.fields.len(),
                "registered model"
            );
            Arc::new(meta)
        });
        Ok(())
    }

    /// Register every model submitted with [`ModelRegistration`].
    pub fn register_collected(&self) -> Result<()> {
        for registration in inventory::iter::<ModelRegistration> {
            (registration.register)(self)?;
        }
        Ok(())
    }

    pub fn is_registered<M: Model>(&self) -> bool {
        self.inner.read().models.contains_key(&TypeId::of::<M>())
    }

    pub fn metadata<M: Model>(&self) -> Result<Arc<ModelMetadata>> {
        self.inner
            .read()
            .models
            .get(&TypeId::of::<M>())
            .cloned()
            .ok_or(Error::NotRegistered {
                model: type_name::<M>(),
            })
    }

    /// Like [`Registry::metadata`], registering the model on a miss.
    pub fn metadata_or_register<M: Model>(&self) -> Result<Arc<ModelMetadata>> {
        match self.metadata::<M>() {
            Err(Error::NotRegistered { .. }) => {
                self.register::<M>()?;
                self.metadata::<M>()
            }
            other => other,
        }
    }

    pub fn register_scanner(
        &self,
        type_name: impl Into<String>,
        scanner: impl Fn(&tokio_postgres::Row, usize) -> Result<Value> + Send + Sync + 'static,
    ) {
        self.inner
            .write()
            .scanners
            .insert(type_name.into(), Arc::new(scanner));
    }

    pub fn scanner(&self, type_name: &str) -> Option<Scanner> {
        self.inner.read().scanners.get(type_name).cloned()
    }

    pub fn register_converter(
        &self,
        type_name: impl Into<String>,
        converter: impl Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    ) {
        self.inner
            .write()
            .converters
            .insert(type_name.into(), Arc::new(converter));
    }

    pub fn converter(&self, type_name: &str) -> Option<Converter> {
        self.inner.read().converters.get(type_name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldDef, Table};
    use crate::types::FieldType;

    struct User;

    impl Table for User {
        fn table_name() -> &'static str {
            "users"
        }
    }

    impl Model for User {
        fn fields() -> &'static [FieldDef] {
            const FIELDS: &[FieldDef] = &[
                FieldDef::new("id", "id", FieldType::I64),
                FieldDef::new("email", "email", FieldType::Text),
            ];
            FIELDS
        }
    }

    struct Broken;

    impl Table for Broken {
        fn table_name() -> &'static str {
            "broken"
        }
    }

    impl Model for Broken {
        fn fields() -> &'static [FieldDef] {
            const FIELDS: &[FieldDef] = &[
                FieldDef::new("a", "x", FieldType::I64),
                FieldDef::new("b", "x", FieldType::I64),
            ];
            FIELDS
        }
    }

    struct Collected;

    impl Table for Collected {
        fn table_name() -> &'static str {
            "collected"
        }
    }

    impl Model for Collected {
        fn fields() -> &'static [FieldDef] {
            const FIELDS: &[FieldDef] = &[FieldDef::new("id", "id", FieldType::I32)];
            FIELDS
        }
    }

    inventory::submit!(ModelRegistration::of::<Collected>());

    #[test]
    fn unregistered_lookup_fails() {
        let registry = Registry::new();
        let err = registry.metadata::<User>().unwrap_err();
        assert!(matches!(err, Error::NotRegistered { .. }));
    }

    #[test]
    fn register_then_lookup() {
        let registry = Registry::new();
        registry.register::<User>().unwrap();
        let meta = registry.metadata::<User>().unwrap();
        assert_eq!(meta.table_name, "users");
        assert_eq!(meta.fields.len(), 2);
    }

    #[test]
    fn reregistration_is_a_noop() {
        let registry = Registry::new();
        registry.register::<User>().unwrap();
        let first = registry.metadata::<User>().unwrap();
        registry.register::<User>().unwrap();
        let second = registry.metadata::<User>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn failed_registration_stores_nothing() {
        let registry = Registry::new();
        assert!(registry.register::<Broken>().is_err());
        assert!(!registry.is_registered::<Broken>());
        assert!(registry.metadata_or_register::<Broken>().is_err());
    }

    #[test]
    fn lazy_registration_on_miss() {
        let registry = Registry::new();
        let meta = registry.metadata_or_register::<User>().unwrap();
        assert_eq!(meta.table_name, "users");
        assert!(registry.is_registered::<User>());
    }

    #[test]
    fn collected_models_register() {
        let registry = Registry::new();
        registry.register_collected().unwrap();
        assert!(registry.is_registered::<Collected>());
    }

    #[test]
    fn converters_and_scanners_by_name() {
        let registry = Registry::new();
        registry.register_converter("flag", |v| match v {
            Value::Bool(b) => Ok(Value::String(if b { "Y" } else { "N" }.into())),
            other => Err(format!("expected bool, got {}", other.kind())),
        });
        registry.register_scanner("flag", |row, idx| {
            let s: Option<String> = row.try_get(idx)?;
            Ok(Value::Bool(s.as_deref() == Some("Y")))
        });

        let convert = registry.converter("flag").unwrap();
        assert_eq!(convert(Value::Bool(true)).unwrap(), Value::from("Y"));
        assert!(convert(Value::I64(1)).is_err());
        assert!(registry.scanner("flag").is_some());
        assert!(registry.converter("other").is_none());
    }

    #[test]
    fn concurrent_registration_and_lookup() {
        let registry = Registry::new();
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..100 {
                        registry.register::<User>().unwrap();
                        let meta = registry.metadata::<User>().unwrap();
                        assert_eq!(meta.fields.len(), 2);
                    }
                });
            }
        });
        assert!(registry.is_registered::<User>());
    }
}
