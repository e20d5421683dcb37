//! Typed property values.
//!
//! Properties are accessed through a type witness, [`PropertyType<T>`], and
//! carried untyped as [`PropertyValue`] — a tagged container that remembers
//! the witness it was created under. A read with the wrong witness fails at
//! the boundary with [`ValueError::TypeMismatch`] instead of a blind
//! downcast deeper in the pipeline.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

// ---------------------------------------------------------------------------
// PropertyType
// ---------------------------------------------------------------------------

/// A type witness for property values of run-time type `T`.
///
/// The name identifies the *declared* type (e.g. `"color"`, `"length"`);
/// two witnesses are interchangeable only when both the name and `T` agree.
/// `Copy` — only stores a static name.
pub struct PropertyType<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> PropertyType<T> {
    /// Declare a property type with the given name.
    pub const fn named(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// The declared type name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

// Manual impls so we don't require T: Copy/Clone for the witness itself.
impl<T> Copy for PropertyType<T> {}
impl<T> Clone for PropertyType<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for PropertyType<T> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
impl<T> Eq for PropertyType<T> {}

impl<T> fmt::Debug for PropertyType<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PropertyType").field(&self.name).finish()
    }
}

// ---------------------------------------------------------------------------
// PropertyValue
// ---------------------------------------------------------------------------

/// An untyped, cheaply clonable property value tagged with the name of the
/// [`PropertyType`] it was created under.
#[derive(Clone)]
pub struct PropertyValue {
    type_name: &'static str,
    value: Rc<dyn Any>,
}

impl PropertyValue {
    /// Wrap a typed value under the given witness.
    pub fn new<T: 'static>(ty: PropertyType<T>, value: T) -> Self {
        Self {
            type_name: ty.name,
            value: Rc::new(value),
        }
    }

    /// The declared type name this value was stored under.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns `true` if this value was stored under `ty`.
    pub fn is<T: 'static>(&self, ty: PropertyType<T>) -> bool {
        self.type_name == ty.name && self.value.is::<T>()
    }

    /// Extract the value under the given witness.
    ///
    /// Fails with [`ValueError::TypeMismatch`] if the witness disagrees with
    /// the one the value was stored under.
    pub fn get<T: Clone + 'static>(&self, ty: PropertyType<T>) -> Result<T, ValueError> {
        if self.type_name != ty.name {
            return Err(ValueError::TypeMismatch {
                stored: self.type_name,
                requested: ty.name,
            });
        }
        match self.value.downcast_ref::<T>() {
            Some(value) => Ok(value.clone()),
            // Same name declared over two different Rust types.
            None => Err(ValueError::TypeMismatch {
                stored: self.type_name,
                requested: ty.name,
            }),
        }
    }
}

impl fmt::Debug for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PropertyValue<{}>", self.type_name)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from typed property access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    /// A value was read under a different type than it was stored under.
    #[error("type mismatch: value stored as `{stored}`, requested as `{requested}`")]
    TypeMismatch {
        stored: &'static str,
        requested: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    const LENGTH: PropertyType<f32> = PropertyType::named("length");
    const LABEL: PropertyType<String> = PropertyType::named("label");

    #[test]
    fn round_trip() {
        let value = PropertyValue::new(LENGTH, 4.5);
        assert_eq!(value.get(LENGTH), Ok(4.5));
    }

    #[test]
    fn type_name_is_recorded() {
        let value = PropertyValue::new(LABEL, "hello".to_string());
        assert_eq!(value.type_name(), "label");
        assert!(value.is(LABEL));
        assert!(!value.is(LENGTH));
    }

    #[test]
    fn wrong_witness_is_mismatch() {
        let value = PropertyValue::new(LENGTH, 1.0);
        assert_eq!(
            value.get(LABEL),
            Err(ValueError::TypeMismatch {
                stored: "length",
                requested: "label",
            })
        );
    }

    #[test]
    fn same_name_different_rust_type_is_mismatch() {
        // Two witnesses with the same declared name over different types.
        const BAD: PropertyType<u32> = PropertyType::named("length");
        let value = PropertyValue::new(LENGTH, 1.0);
        assert!(value.get(BAD).is_err());
        assert!(!value.is(BAD));
    }

    #[test]
    fn clone_shares_value() {
        let value = PropertyValue::new(LABEL, "shared".to_string());
        let copy = value.clone();
        assert_eq!(copy.get(LABEL).unwrap(), "shared");
        assert_eq!(value.get(LABEL).unwrap(), "shared");
    }

    #[test]
    fn witness_is_copy() {
        let a = LENGTH;
        let b = a;
        assert_eq!(a, b);
        assert_eq!(b.name(), "length");
    }

    #[test]
    fn debug_formats() {
        let value = PropertyValue::new(LENGTH, 2.0);
        assert_eq!(format!("{value:?}"), "PropertyValue<length>");
        assert_eq!(format!("{LENGTH:?}"), "PropertyType(\"length\")");
    }
}
