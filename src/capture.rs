//! Conversion of a call's argument array into [`ArgValue`]s.
//!
//! The walk only sees references through [`ObjectSource`]; the agent backs it
//! with JNI. Nested object arrays are expanded at most [`MAX_NESTING`] levels
//! deep. A deeper array, or one that contains itself, renders as `[...]`.

use crate::record::ArgValue;

/// Object array levels expanded below an argument. The argument itself is
/// level one.
pub const MAX_NESTING: usize = 32;

/// What a non-null reference turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// A scalar or primitive array, already read.
    Value(ArgValue),
    /// An array of references, expanded element by element.
    ObjectArray,
}

/// Read access to the objects behind an argument array.
pub trait ObjectSource {
    type Ref: Copy;

    fn is_null(&self, r: Self::Ref) -> bool;

    /// Classifies a non-null reference.
    fn shape(&self, r: Self::Ref) -> Shape;

    fn array_len(&self, array: Self::Ref) -> usize;

    /// A new reference to `array[index]`, handed back through [`release`].
    ///
    /// [`release`]: ObjectSource::release
    fn element(&self, array: Self::Ref, index: usize) -> Self::Ref;

    fn release(&self, r: Self::Ref);

    fn same_object(&self, a: Self::Ref, b: Self::Ref) -> bool;
}

/// Captures every element of `args`. A null array has no arguments.
pub fn capture_arguments<S: ObjectSource>(source: &S, args: S::Ref) -> Vec<ArgValue> {
    if source.is_null(args) {
        return Vec::new();
    }
    Walk { source, ancestors: Vec::new() }.elements(args)
}

struct Walk<'a, S: ObjectSource> {
    source: &'a S,
    /// Object arrays currently being expanded, outermost first.
    ancestors: Vec<S::Ref>,
}

impl<S: ObjectSource> Walk<'_, S> {
    fn elements(&mut self, array: S::Ref) -> Vec<ArgValue> {
        let len = self.source.array_len(array);
        let mut items = Vec::with_capacity(len);
        for index in 0..len {
            let elem = self.source.element(array, index);
            items.push(self.value(elem));
            self.source.release(elem);
        }
        items
    }

    fn value(&mut self, obj: S::Ref) -> ArgValue {
        if self.source.is_null(obj) {
            return ArgValue::Null;
        }
        match self.source.shape(obj) {
            Shape::Value(value) => value,
            Shape::ObjectArray => self.object_array(obj),
        }
    }

    fn object_array(&mut self, array: S::Ref) -> ArgValue {
        if self.ancestors.iter().any(|&a| self.source.same_object(a, array)) {
            return ArgValue::Cycle;
        }
        if self.ancestors.len() >= MAX_NESTING {
            return ArgValue::TooDeep;
        }
        self.ancestors.push(array);
        let items = self.elements(array);
        self.ancestors.pop();
        ArgValue::Objects(items)
    }
}
