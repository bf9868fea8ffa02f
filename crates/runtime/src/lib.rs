//! Snek Runtime: object heap and mark-sweep collector
//!
//! Key design principles:
//! - Value: closed set of kinds (Integer, Float, String, Vector3, Array)
//! - Heap: sole owner of every object; handles are generation-checked
//!   `ObjRef`s, so a freed object can never be reached again
//! - Frame: explicit rooting scope; an object survives a collection only if
//!   a live frame reaches it
//! - Collector: stop-the-world mark, trace and sweep, run on request
//!
//! ```
//! use snek_runtime::Heap;
//!
//! let mut heap = Heap::new();
//! let frame = heap.new_frame().unwrap();
//! let greeting = heap.new_string("Hello ").unwrap();
//! let name = heap.new_string("World!").unwrap();
//! let joined = heap.add(greeting, name).unwrap();
//! heap.frame_reference_object(frame, joined).unwrap();
//!
//! let stats = heap.collect_garbage().unwrap();
//! assert_eq!(stats.freed, 2);
//! assert_eq!(heap.display(joined).to_string(), "\"Hello World!\"");
//! ```

pub mod collector;
pub mod config;
pub mod display;
pub mod error;
pub mod frame;
pub mod heap;
pub mod ops;
pub mod value;

pub use collector::{CollectionStats, Collector, SweepStats};
pub use config::{ConfigError, HeapConfig};
pub use display::DisplayValue;
pub use error::{HeapError, HeapResult};
pub use frame::{Frame, FrameId};
pub use heap::Heap;
pub use value::{Kind, OBJECT_HEADER_BYTES, ObjRef, Object, Value, Vector3};

// Accounting lives in snek-core; re-exported so embedders need one crate
pub use snek_core::{AllocCounter, AllocStats};
