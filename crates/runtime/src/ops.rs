//! Value operations
//!
//! `add` dispatches on the kinds of both operands:
//!
//! | left    | right   | result                                   |
//! |---------|---------|------------------------------------------|
//! | Integer | Integer | Integer (wrapping)                       |
//! | Integer | Float   | Float (integer promoted)                 |
//! | Float   | Integer | Float (integer promoted)                 |
//! | Float   | Float   | Float                                    |
//! | String  | String  | new String, bytes concatenated           |
//! | Vector3 | Vector3 | new Vector3 of axis-wise `add`           |
//! | Array   | Array   | new Array, elements shared by reference  |
//!
//! Every other pairing is a `TypeMismatch`. An `add` that fails after it
//! already created intermediate objects (say two of three Vector3 axes) frees
//! them before returning, so a failed call leaves the registry as it found it.

use crate::error::{HeapError, HeapResult};
use crate::heap::Heap;
use crate::value::{ObjRef, Value};

impl Heap {
    /// Logical length of a value
    ///
    /// Integer and Float are 1, String is its byte length, Vector3 is 3 and
    /// Array is its declared size.
    pub fn length(&self, obj: ObjRef) -> HeapResult<usize> {
        let len = match self.value(obj)? {
            Value::Integer(_) | Value::Float(_) => 1,
            Value::String(bytes) => bytes.len(),
            Value::Vector3(_) => 3,
            Value::Array(elements) => elements.len(),
        };
        Ok(len)
    }

    /// Add two values, producing a new object
    pub fn add(&mut self, a: ObjRef, b: ObjRef) -> HeapResult<ObjRef> {
        let checkpoint = self.objects.len();
        let result = self.add_values(a, b);
        if result.is_err() {
            self.rollback(checkpoint);
        }
        result
    }

    fn add_values(&mut self, a: ObjRef, b: ObjRef) -> HeapResult<ObjRef> {
        let left = self.value(a)?;
        let right = self.value(b)?;

        match (left, right) {
            (Value::Integer(x), Value::Integer(y)) => {
                let sum = x.wrapping_add(*y);
                self.new_integer(sum)
            }
            (Value::Integer(x), Value::Float(y)) => {
                let sum = *x as f64 + y;
                self.new_float(sum)
            }
            (Value::Float(x), Value::Integer(y)) => {
                let sum = x + *y as f64;
                self.new_float(sum)
            }
            (Value::Float(x), Value::Float(y)) => {
                let sum = x + y;
                self.new_float(sum)
            }
            (Value::String(x), Value::String(y)) => {
                let len = x.len() + y.len();
                self.alloc_string(len, |heap, buf| {
                    for part in [a, b] {
                        if let Some(bytes) = heap.as_bytes(part) {
                            buf.extend_from_slice(bytes);
                        }
                    }
                })
            }
            (Value::Vector3(x), Value::Vector3(y)) => {
                let (x, y) = (*x, *y);
                let sum_x = self.add_values(x.x, y.x)?;
                let sum_y = self.add_values(x.y, y.y)?;
                let sum_z = self.add_values(x.z, y.z)?;
                self.new_vector3(sum_x, sum_y, sum_z)
            }
            (Value::Array(x), Value::Array(y)) => {
                let split = x.len();
                let len = split + y.len();
                self.alloc_array(len, |heap, elements| {
                    if let Some(left) = heap.array_elements(a) {
                        elements[..split].copy_from_slice(left);
                    }
                    if let Some(right) = heap.array_elements(b) {
                        elements[split..].copy_from_slice(right);
                    }
                })
            }
            (left, right) => Err(HeapError::TypeMismatch {
                op: "add",
                left: left.kind(),
                right: Some(right.kind()),
            }),
        }
    }

    /// Read an Array slot
    ///
    /// `Ok(None)` is an in-range slot that was never set.
    pub fn array_get(&self, array: ObjRef, index: usize) -> HeapResult<Option<ObjRef>> {
        let elements = self.array_slots(array, "array_get")?;
        elements
            .get(index)
            .copied()
            .ok_or(HeapError::IndexOutOfBounds {
                index,
                len: elements.len(),
            })
    }

    /// Store a reference in an Array slot
    ///
    /// The array shares `value`; it does not take ownership of it.
    pub fn array_set(&mut self, array: ObjRef, index: usize, value: ObjRef) -> HeapResult<()> {
        if !self.contains(value) {
            return Err(HeapError::StaleReference(value));
        }
        let len = self.array_slots(array, "array_set")?.len();
        if index >= len {
            return Err(HeapError::IndexOutOfBounds { index, len });
        }

        if let Some(object) = self.get_mut(array)
            && let Value::Array(elements) = &mut object.value
        {
            elements[index] = Some(value);
        }
        Ok(())
    }

    fn array_slots(&self, array: ObjRef, op: &'static str) -> HeapResult<&[Option<ObjRef>]> {
        match self.value(array)? {
            Value::Array(elements) => Ok(&elements[..]),
            other => Err(HeapError::TypeMismatch {
                op,
                left: other.kind(),
                right: None,
            }),
        }
    }
}
