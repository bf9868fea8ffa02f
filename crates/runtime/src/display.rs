//! Human-readable rendering of heap values
//!
//! # Format Examples
//!
//! - Integer: `59`
//! - Float: `1.5`, `5.0`
//! - String: `"hi"` (with escaping)
//! - Array: `[1, null, "hi"]` (`null` is a slot that was never set)
//! - Vector3: `<1, 2, 3>`
//! - A container already being rendered further up: `[...]` / `<...>`
//! - A freed object: `<freed>`

use crate::heap::Heap;
use crate::value::{ObjRef, Value};
use std::fmt;

/// Borrowing wrapper returned by [`Heap::display`]
pub struct DisplayValue<'a> {
    heap: &'a Heap,
    obj: ObjRef,
}

impl Heap {
    /// Render `obj` and everything reachable from it
    pub fn display(&self, obj: ObjRef) -> DisplayValue<'_> {
        DisplayValue { heap: self, obj }
    }
}

impl fmt::Display for DisplayValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = String::new();
        let mut path = Vec::new();
        format_object(self.heap, self.obj, &mut path, &mut buf);
        f.write_str(&buf)
    }
}

fn format_object(heap: &Heap, obj: ObjRef, path: &mut Vec<ObjRef>, buf: &mut String) {
    let Ok(value) = heap.value(obj) else {
        buf.push_str("<freed>");
        return;
    };

    match value {
        Value::Integer(n) => buf.push_str(&n.to_string()),
        Value::Float(x) => buf.push_str(&format!("{:?}", x)),
        Value::String(bytes) => format_string(&String::from_utf8_lossy(bytes), buf),
        Value::Vector3(v) => {
            if path.contains(&obj) {
                buf.push_str("<...>");
                return;
            }
            path.push(obj);
            buf.push('<');
            for (i, axis) in v.axes().into_iter().enumerate() {
                if i > 0 {
                    buf.push_str(", ");
                }
                format_object(heap, axis, path, buf);
            }
            buf.push('>');
            path.pop();
        }
        Value::Array(elements) => {
            if path.contains(&obj) {
                buf.push_str("[...]");
                return;
            }
            path.push(obj);
            buf.push('[');
            for (i, element) in elements.iter().enumerate() {
                if i > 0 {
                    buf.push_str(", ");
                }
                match element {
                    Some(child) => format_object(heap, *child, path, buf),
                    None => buf.push_str("null"),
                }
            }
            buf.push(']');
            path.pop();
        }
    }
}

fn format_string(s: &str, buf: &mut String) {
    buf.push('"');
    for c in s.chars() {
        match c {
            '"' => buf.push_str("\\\""),
            '\\' => buf.push_str("\\\\"),
            '\n' => buf.push_str("\\n"),
            '\r' => buf.push_str("\\r"),
            '\t' => buf.push_str("\\t"),
            c if c.is_control() => {
                buf.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => buf.push(c),
        }
    }
    buf.push('"');
}
