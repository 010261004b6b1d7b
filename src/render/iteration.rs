//! The iteration protocol behind `for` and its `loop` variable.
//!
//! Every iterable value is turned into a [`LoopCursor`]. Lists, maps and host
//! collections have a known length; a one-shot iterator does not, so
//! `loop.length` and `loop.revindex` drain what is left of it into a buffer the
//! loop then keeps consuming from.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::value::{Object, SharedIterator, Value};

struct CursorState {
    source: Option<SharedIterator>,
    buffered: VecDeque<Value>,
    yielded: usize,
    length: Option<usize>,
}

/// Shared position of one `for` loop.
pub struct LoopCursor {
    state: Mutex<CursorState>,
}

impl LoopCursor {
    /// Normalise `value` into a cursor. `None` when the value cannot be iterated.
    pub fn over(value: &Value) -> Option<Self> {
        match value {
            Value::List(items) => Some(Self::items(items.iter().cloned().collect())),
            Value::Map(map) => Some(Self::items(
                map.iter()
                    .map(|(key, value)| Value::map([("key", key.clone()), ("value", value.clone())]))
                    .collect(),
            )),
            Value::Iterator(iter) => Some(Self {
                state: Mutex::new(CursorState {
                    source: Some(iter.clone()),
                    buffered: VecDeque::new(),
                    yielded: 0,
                    length: None,
                }),
            }),
            Value::Object(object) => object.iter_values().map(|items| Self::items(items.into())),
            _ => None,
        }
    }

    fn items(items: VecDeque<Value>) -> Self {
        let length = items.len();
        Self {
            state: Mutex::new(CursorState {
                source: None,
                buffered: items,
                yielded: 0,
                length: Some(length),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CursorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn next_item(&self) -> Option<Value> {
        let mut state = self.lock();
        let item = match state.buffered.pop_front() {
            Some(item) => Some(item),
            None => state.source.as_ref().and_then(SharedIterator::next_value),
        };
        if item.is_some() {
            state.yielded += 1;
        }
        item
    }

    pub fn has_next(&self) -> bool {
        let mut state = self.lock();
        if !state.buffered.is_empty() {
            return true;
        }
        match state.source.as_ref().and_then(SharedIterator::next_value) {
            Some(item) => {
                state.buffered.push_back(item);
                true
            }
            None => false,
        }
    }

    /// Total number of items, draining a one-shot source if needed.
    pub fn length(&self) -> usize {
        let mut state = self.lock();
        if let Some(length) = state.length {
            return length;
        }
        if let Some(source) = state.source.take() {
            while let Some(item) = source.next_value() {
                state.buffered.push_back(item);
            }
        }
        let length = state.yielded + state.buffered.len();
        state.length = Some(length);
        length
    }
}

impl fmt::Debug for LoopCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("LoopCursor").field("yielded", &state.yielded).field("length", &state.length).finish()
    }
}

/// The `loop` variable of one iteration.
#[derive(Debug)]
pub struct LoopMeta {
    pub index: usize,
    pub first: bool,
    pub last: bool,
    cursor: Arc<LoopCursor>,
}

impl LoopMeta {
    pub fn new(index: usize, last: bool, cursor: Arc<LoopCursor>) -> Self {
        Self {
            index,
            first: index == 0,
            last,
            cursor,
        }
    }
}

impl Object for LoopMeta {
    fn type_name(&self) -> &str {
        "Loop"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn has_dynamic_attribute(&self, name: &Value) -> bool {
        matches!(name.as_str(), Some("index" | "first" | "last" | "length" | "revindex"))
    }

    fn dynamic_attribute(&self, name: &Value, _args: &[Value]) -> anyhow::Result<Value> {
        Ok(match name.as_str() {
            Some("index") => Value::from(self.index),
            Some("first") => Value::Bool(self.first),
            Some("last") => Value::Bool(self.last),
            Some("length") => Value::from(self.cursor.length()),
            Some("revindex") => Value::from(self.cursor.length().saturating_sub(self.index + 1)),
            _ => Value::Null,
        })
    }

    fn display(&self) -> String {
        format!("{{index={}, first={}, last={}}}", self.index, self.first, self.last)
    }
}
