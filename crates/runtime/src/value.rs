use std::fmt;

/// ObjRef: non-owning handle to an object in a [`Heap`](crate::Heap)
///
/// Handles are plain `Copy` data. Frames, Arrays and Vector3s store handles,
/// never the objects themselves; the heap's slot arena is the only owner.
///
/// A slot's generation is bumped every time the object in it is freed, so a
/// handle that outlives its object no longer matches and every lookup through
/// it returns `None` instead of reaching whatever was allocated there next.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl ObjRef {
    /// Slot index in the heap's arena
    pub fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot when this handle was issued
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjRef({}v{})", self.index, self.generation)
    }
}

/// Kind: the tag of a [`Value`], without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Integer,
    Float,
    String,
    Array,
    Vector3,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Integer => "Integer",
            Kind::Float => "Float",
            Kind::String => "String",
            Kind::Array => "Array",
            Kind::Vector3 => "Vector3",
        };
        f.write_str(name)
    }
}

/// Three-axis vector; each axis is a shared reference to another object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vector3 {
    pub x: ObjRef,
    pub y: ObjRef,
    pub z: ObjRef,
}

impl Vector3 {
    pub fn axes(&self) -> [ObjRef; 3] {
        [self.x, self.y, self.z]
    }
}

/// Value: What the runtime talks about
///
/// The variant set is closed. Scalars carry their payload inline; String and
/// Array own a heap buffer; Array and Vector3 refer to other objects only
/// through [`ObjRef`] handles, so one object may sit in any number of
/// containers and frames at once.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Integer value
    Integer(i64),

    /// Floating-point value (IEEE 754 double precision)
    Float(f64),

    /// Byte string, an owned copy of whatever it was built from
    String(Box<[u8]>),

    /// Fixed-size array of child slots; `None` until set
    Array(Box<[Option<ObjRef>]>),

    /// Vector of three child objects
    Vector3(Vector3),
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::Integer(_) => Kind::Integer,
            Value::Float(_) => Kind::Float,
            Value::String(_) => Kind::String,
            Value::Array(_) => Kind::Array,
            Value::Vector3(_) => Kind::Vector3,
        }
    }

    /// Child references this value holds, in slot order
    ///
    /// Vector3 yields its three axes (repeats included); Array yields every
    /// set slot. Scalars and strings have no children.
    pub fn children(&self) -> impl Iterator<Item = ObjRef> + '_ {
        let axes = match self {
            Value::Vector3(v) => Some(v.axes()),
            _ => None,
        };
        let elements: &[Option<ObjRef>] = match self {
            Value::Array(elements) => &elements[..],
            _ => &[],
        };
        axes.into_iter()
            .flatten()
            .chain(elements.iter().flatten().copied())
    }

    /// Size of the buffer this value owns besides its header
    pub(crate) fn buffer_bytes(&self) -> usize {
        match self {
            Value::String(bytes) => bytes.len(),
            Value::Array(elements) => elements.len() * std::mem::size_of::<Option<ObjRef>>(),
            Value::Integer(_) | Value::Float(_) | Value::Vector3(_) => 0,
        }
    }
}

/// Object: a value plus the collector's mark bit
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub(crate) marked: bool,
    pub(crate) value: Value,
}

/// Bytes charged to the allocation counter for every object header
pub const OBJECT_HEADER_BYTES: usize = std::mem::size_of::<Object>();

impl Object {
    pub(crate) fn new(value: Value) -> Self {
        Object {
            marked: false,
            value,
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn kind(&self) -> Kind {
        self.value.kind()
    }

    /// True only between the mark phase and the end of sweep
    pub fn is_marked(&self) -> bool {
        self.marked
    }
}
