use std::collections::HashMap;

use crate::object::{Obj, ObjBoundMethod, ObjClass, ObjClosure, ObjFunction, ObjInstance, ObjNative, ObjRef, ObjUpvalue};
use crate::value::Value;

/// Owner of every heap object, addressed by [`ObjRef`] handles.
///
/// Objects live until the heap is dropped; there is no collector. The heap
/// also holds the string intern table: at most one `Obj::String` exists per
/// distinct character sequence, which is what makes handle equality a valid
/// string equality test.
#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<Obj>,
    strings: HashMap<Box<str>, ObjRef>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Allocate a non-string object.
    pub fn alloc(&mut self, obj: Obj) -> ObjRef {
        debug_assert!(
            !matches!(obj, Obj::String(_)),
            "strings must go through intern"
        );
        self.push(obj)
    }

    /// Intern a string, copying the caller's data on a miss.
    pub fn intern(&mut self, s: &str) -> ObjRef {
        if let Some(&existing) = self.strings.get(s) {
            return existing;
        }
        let boxed: Box<str> = s.into();
        self.insert_string(boxed)
    }

    /// Intern a string the caller no longer needs; the buffer is adopted on
    /// a miss and dropped on a hit.
    pub fn intern_owned(&mut self, s: String) -> ObjRef {
        if let Some(&existing) = self.strings.get(s.as_str()) {
            return existing;
        }
        self.insert_string(s.into_boxed_str())
    }

    fn insert_string(&mut self, s: Box<str>) -> ObjRef {
        let handle = self.push(Obj::String(s.clone()));
        self.strings.insert(s, handle);
        handle
    }

    fn push(&mut self, obj: Obj) -> ObjRef {
        let handle = ObjRef::from_raw(self.objects.len() as u32);
        self.objects.push(obj);
        handle
    }

    pub fn get(&self, r: ObjRef) -> &Obj {
        &self.objects[r.index()]
    }

    pub fn get_mut(&mut self, r: ObjRef) -> &mut Obj {
        &mut self.objects[r.index()]
    }

    // Typed accessors for places where the object kind is an invariant the
    // bytecode already guarantees.

    pub fn string(&self, r: ObjRef) -> &str {
        match self.get(r) {
            Obj::String(s) => s,
            other => unreachable!("expected string, found {:?}", other),
        }
    }

    pub fn function(&self, r: ObjRef) -> &ObjFunction {
        match self.get(r) {
            Obj::Function(f) => f,
            other => unreachable!("expected function, found {:?}", other),
        }
    }

    pub fn closure(&self, r: ObjRef) -> &ObjClosure {
        match self.get(r) {
            Obj::Closure(c) => c,
            other => unreachable!("expected closure, found {:?}", other),
        }
    }

    pub fn upvalue(&self, r: ObjRef) -> &ObjUpvalue {
        match self.get(r) {
            Obj::Upvalue(u) => u,
            other => unreachable!("expected upvalue, found {:?}", other),
        }
    }

    pub fn upvalue_mut(&mut self, r: ObjRef) -> &mut ObjUpvalue {
        match self.get_mut(r) {
            Obj::Upvalue(u) => u,
            other => unreachable!("expected upvalue, found {:?}", other),
        }
    }

    pub fn class(&self, r: ObjRef) -> &ObjClass {
        match self.get(r) {
            Obj::Class(c) => c,
            other => unreachable!("expected class, found {:?}", other),
        }
    }

    pub fn class_mut(&mut self, r: ObjRef) -> &mut ObjClass {
        match self.get_mut(r) {
            Obj::Class(c) => c,
            other => unreachable!("expected class, found {:?}", other),
        }
    }

    pub fn instance(&self, r: ObjRef) -> &ObjInstance {
        match self.get(r) {
            Obj::Instance(i) => i,
            other => unreachable!("expected instance, found {:?}", other),
        }
    }

    pub fn instance_mut(&mut self, r: ObjRef) -> &mut ObjInstance {
        match self.get_mut(r) {
            Obj::Instance(i) => i,
            other => unreachable!("expected instance, found {:?}", other),
        }
    }

    pub fn native(&self, r: ObjRef) -> &ObjNative {
        match self.get(r) {
            Obj::Native(n) => n,
            other => unreachable!("expected native, found {:?}", other),
        }
    }

    pub fn bound_method(&self, r: ObjRef) -> &ObjBoundMethod {
        match self.get(r) {
            Obj::BoundMethod(b) => b,
            other => unreachable!("expected bound method, found {:?}", other),
        }
    }

    /// External (printed) representation of a value.
    pub fn format_value(&self, value: Value) -> String {
        match value {
            Value::Nil => "nil".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Obj(r) => self.format_obj(r),
        }
    }

    fn format_obj(&self, r: ObjRef) -> String {
        match self.get(r) {
            Obj::String(s) => s.to_string(),
            Obj::Function(f) => match &f.name {
                Some(name) => format!("<fn {}>", name),
                None => "<script>".to_string(),
            },
            Obj::Native(_) => "<native fn>".to_string(),
            Obj::Closure(c) => self.format_obj(c.function),
            Obj::Upvalue(_) => "upvalue".to_string(),
            Obj::Class(c) => c.name.clone(),
            Obj::Instance(i) => format!("{} instance", self.class(i.class).name),
            Obj::BoundMethod(b) => self.format_obj(self.closure(b.method).function),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Table;

    #[test]
    fn intern_same_content_returns_same_handle() {
        let mut heap = Heap::new();
        let a = heap.intern("hello");
        let b = heap.intern("hello");
        assert_eq!(a, b);
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn intern_owned_deduplicates_against_copied() {
        let mut heap = Heap::new();
        let a = heap.intern("ab");
        // Simulates a runtime concatenation result.
        let b = heap.intern_owned(String::from("a") + "b");
        assert_eq!(a, b);
    }

    #[test]
    fn intern_distinct_content_distinct_handles() {
        let mut heap = Heap::new();
        let a = heap.intern("a");
        let b = heap.intern("b");
        assert_ne!(a, b);
        assert_eq!(heap.string(a), "a");
        assert_eq!(heap.string(b), "b");
    }

    #[test]
    fn alloc_function_and_read_back() {
        let mut heap = Heap::new();
        let f = heap.alloc(Obj::Function(ObjFunction {
            arity: 2,
            ..Default::default()
        }));
        assert_eq!(heap.function(f).arity, 2);
    }

    #[test]
    fn format_values() {
        let mut heap = Heap::new();
        assert_eq!(heap.format_value(Value::Nil), "nil");
        assert_eq!(heap.format_value(Value::Bool(true)), "true");
        assert_eq!(heap.format_value(Value::Number(7.0)), "7");
        assert_eq!(heap.format_value(Value::Number(2.5)), "2.5");

        let s = heap.intern("hi");
        assert_eq!(heap.format_value(Value::Obj(s)), "hi");

        let f = heap.alloc(Obj::Function(ObjFunction {
            name: Some("area".to_string()),
            ..Default::default()
        }));
        assert_eq!(heap.format_value(Value::Obj(f)), "<fn area>");

        let script = heap.alloc(Obj::Function(ObjFunction::default()));
        assert_eq!(heap.format_value(Value::Obj(script)), "<script>");

        let class = heap.alloc(Obj::Class(ObjClass {
            name: "Point".to_string(),
            methods: Table::new(),
        }));
        assert_eq!(heap.format_value(Value::Obj(class)), "Point");

        let instance = heap.alloc(Obj::Instance(ObjInstance {
            class,
            fields: Table::new(),
        }));
        assert_eq!(heap.format_value(Value::Obj(instance)), "Point instance");
    }

    #[test]
    fn upvalue_open_to_closed_transition() {
        let mut heap = Heap::new();
        let u = heap.alloc(Obj::Upvalue(ObjUpvalue::Open(4)));
        assert_eq!(*heap.upvalue(u), ObjUpvalue::Open(4));

        *heap.upvalue_mut(u) = ObjUpvalue::Closed(Value::Number(9.0));
        assert_eq!(*heap.upvalue(u), ObjUpvalue::Closed(Value::Number(9.0)));
    }
}
