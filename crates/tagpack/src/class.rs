//! # Class Registry
//!
//! Binds wire aliases to Rust types so structured values can travel as named,
//! field-tagged records.
//!
//! ## Invariants
//! - One lock guards both directions, so register-if-absent is atomic.
//! - An alias, once bound to a concrete type, is never rebound. Aliases first seen
//!   on the wire get a placeholder class that a later `register` may claim.

use std::any::Any;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Error;
use crate::error::Result;
use crate::value::Object;
use crate::value::Value;

/// The type descriptor an alias resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassType {
    alias: String,
    type_id: Option<TypeId>,
    type_name: Option<&'static str>,
}

impl ClassType {
    /// A class with no Rust type behind it. Objects of this class decode structurally.
    pub fn placeholder(alias: impl Into<String>) -> Self {
        Self { alias: alias.into(), type_id: None, type_name: None }
    }

    fn of<T: Any>(alias: String) -> Self {
        Self {
            alias,
            type_id: Some(TypeId::of::<T>()),
            type_name: Some(std::any::type_name::<T>()),
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn type_name(&self) -> Option<&'static str> {
        self.type_name
    }

    pub fn is_placeholder(&self) -> bool {
        self.type_id.is_none()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.type_id == Some(TypeId::of::<T>())
    }
}

/// A Rust type that converts to and from a structured object.
pub trait Class: Any + Sized {
    /// The fields in declaration order. This order becomes the class's wire field order.
    fn to_fields(&self) -> Vec<(String, Value)>;

    /// Rebuilds the value from a decoded object.
    fn from_object(object: &Object) -> Result<Self>;
}

#[derive(Default)]
struct Inner {
    by_alias: HashMap<String, Arc<ClassType>>,
    by_type: HashMap<TypeId, Arc<ClassType>>,
}

/// Alias <-> type cache shared by every codec instance of a process.
///
/// Construct once, share behind an `Arc`, and hand it to readers.
#[derive(Default)]
pub struct ClassRegistry {
    inner: Mutex<Inner>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `T` to `alias`.
    ///
    /// A placeholder created while decoding is replaced. A binding to a different
    /// concrete type is kept and the request is ignored.
    pub fn register<T: Any>(&self, alias: impl Into<String>) -> Arc<ClassType> {
        let alias = alias.into();
        let mut inner = self.inner.lock();

        if let Some(existing) = inner.by_alias.get(&alias) {
            if existing.is::<T>() {
                return existing.clone();
            }
            if !existing.is_placeholder() {
                tracing::warn!(
                    alias = %alias,
                    bound = existing.type_name().unwrap_or("?"),
                    requested = std::any::type_name::<T>(),
                    "class alias already bound, ignoring rebinding"
                );
                return existing.clone();
            }
        }

        let class = Arc::new(ClassType::of::<T>(alias.clone()));
        inner.by_alias.insert(alias, class.clone());
        inner.by_type.entry(TypeId::of::<T>()).or_insert_with(|| class.clone());
        class
    }

    /// Resolves an alias, creating a placeholder class when nothing is bound yet.
    pub fn class_for(&self, alias: &str) -> Arc<ClassType> {
        let mut inner = self.inner.lock();
        inner
            .by_alias
            .entry(alias.to_string())
            .or_insert_with(|| Arc::new(ClassType::placeholder(alias)))
            .clone()
    }

    /// Looks an alias up without creating anything.
    pub fn lookup(&self, alias: &str) -> Option<Arc<ClassType>> {
        self.inner.lock().by_alias.get(alias).cloned()
    }

    /// The class bound to `T`, deriving and registering an alias from the type path if needed.
    pub fn class_of<T: Any>(&self) -> Arc<ClassType> {
        if let Some(class) = self.inner.lock().by_type.get(&TypeId::of::<T>()) {
            return class.clone();
        }
        self.register::<T>(derive_alias(std::any::type_name::<T>()))
    }

    pub fn alias_for<T: Any>(&self) -> String {
        self.class_of::<T>().alias().to_string()
    }

    /// Converts a Rust value into an object of its registered class.
    pub fn to_object<T: Class>(&self, value: &T) -> Object {
        Object::with_fields(self.class_of::<T>(), value.to_fields())
    }

    /// Converts an object back into `T`, checking that its alias is bound to `T`.
    pub fn from_object<T: Class>(&self, object: &Object) -> Result<T> {
        let class = self.class_for(&object.alias());
        if !class.is::<T>() {
            return Err(Error::TypeMismatch {
                expected: std::any::type_name::<T>(),
                found: "object of another class",
            });
        }
        T::from_object(object)
    }
}

/// `my_crate::geo::Point` becomes `my_crate_geo_Point`.
fn derive_alias(type_name: &str) -> String {
    type_name.replace("::", "_")
}
