//! Envelope: one input item on its way to a worker.

use super::context::Context;

/// Item + zero-based input index + shared context.
///
/// Indices are assigned by the producer in source order. An envelope is moved,
/// never shared: the worker that claims it owns it until it reaches the executor.
#[derive(Debug, Clone)]
pub struct Envelope<T> {
    index: u64,
    item: T,
    context: Context,
}

impl<T> Envelope<T> {
    pub fn new(index: u64, item: T, context: Context) -> Self {
        Self {
            index,
            item,
            context,
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn item(&self) -> &T {
        &self.item
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn into_item(self) -> T {
        self.item
    }
}
