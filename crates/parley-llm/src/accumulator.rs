//! Index-keyed assembly of streamed tool calls.

use std::collections::BTreeMap;

use parley_types::ToolCall;

#[derive(Debug, Default, Clone)]
struct ToolCallBuilder {
    id: String,
    name: String,
    arguments: String,
}

/// Collects tool-call fragments until the provider reports the turn ended
/// because of tool calls.
///
/// Fragments addressed to the same index are appended, never overwritten.
/// The first non-empty id for an index is kept.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    builders: BTreeMap<usize, ToolCallBuilder>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one fragment for the call at `index`.
    pub fn push(
        &mut self,
        index: usize,
        id: Option<&str>,
        name: Option<&str>,
        arguments: Option<&str>,
    ) {
        let builder = self.builders.entry(index).or_default();
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            if builder.id.is_empty() {
                builder.id = id.to_string();
            }
        }
        if let Some(name) = name {
            builder.name.push_str(name);
        }
        if let Some(arguments) = arguments {
            builder.arguments.push_str(arguments);
        }
    }

    /// Register a call delivered whole, at the next free index.
    pub fn push_complete(&mut self, id: &str, name: &str, arguments: &str) {
        let index = self.builders.keys().next_back().map_or(0, |i| i + 1);
        self.push(index, Some(id), Some(name), Some(arguments));
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }

    pub fn len(&self) -> usize {
        self.builders.len()
    }

    /// Finalize the pending builders into calls, ordered by index.
    ///
    /// Builders that never received an id get a generated one so every call
    /// can be answered by a tool-result message.
    pub fn finish(&mut self) -> Vec<ToolCall> {
        std::mem::take(&mut self.builders)
            .into_values()
            .map(|b| {
                let id = if b.id.is_empty() {
                    format!("call_{}", uuid::Uuid::new_v4().simple())
                } else {
                    b.id
                };
                ToolCall::new(id, b.name, b.arguments)
            })
            .collect()
    }

    /// Drop pending builders, returning how many there were.
    pub fn discard(&mut self) -> usize {
        let n = self.builders.len();
        self.builders.clear();
        n
    }
}
