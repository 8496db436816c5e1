use crate::object::ObjRef;

/// A runtime value.
///
/// Values are copied freely; only `Obj` carries a reference (a handle into
/// the [`Heap`](crate::heap::Heap)). Object equality is handle identity,
/// which is correct for strings because the heap interns them.
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    Obj(ObjRef),
}

impl Value {
    /// Nil and false are falsey; everything else is truthy.
    pub fn is_falsey(self) -> bool {
        matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn as_number(self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_obj(self) -> Option<ObjRef> {
        match self {
            Value::Obj(r) => Some(r),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<ObjRef> for Value {
    fn from(r: ObjRef) -> Self {
        Value::Obj(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falsiness() {
        assert!(Value::Nil.is_falsey());
        assert!(Value::Bool(false).is_falsey());
        assert!(!Value::Bool(true).is_falsey());
        assert!(!Value::Number(0.0).is_falsey());
        assert!(!Value::Obj(ObjRef::from_raw(0)).is_falsey());
    }

    #[test]
    fn equality_by_tag_and_payload() {
        assert_eq!(Value::Nil, Value::Nil);
        assert_eq!(Value::Bool(true), Value::Bool(true));
        assert_ne!(Value::Bool(true), Value::Bool(false));
        assert_eq!(Value::Number(1.5), Value::Number(1.5));
        assert_ne!(Value::Number(1.5), Value::Nil);
        assert_eq!(
            Value::Obj(ObjRef::from_raw(3)),
            Value::Obj(ObjRef::from_raw(3))
        );
        assert_ne!(
            Value::Obj(ObjRef::from_raw(3)),
            Value::Obj(ObjRef::from_raw(4))
        );
    }

    #[test]
    fn nan_is_not_equal_to_itself() {
        assert_ne!(Value::Number(f64::NAN), Value::Number(f64::NAN));
    }

    #[test]
    fn conversions() {
        assert_eq!(Value::from(2.5), Value::Number(2.5));
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(
            Value::from(ObjRef::from_raw(7)),
            Value::Obj(ObjRef::from_raw(7))
        );
    }
}
