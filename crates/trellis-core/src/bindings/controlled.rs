//! Values of controlled bindings, supplied by the host

use std::collections::BTreeMap;

use tracing::trace;

use super::{BindingError, BindingResult, BindingSource, ParsedBindings};

/// Live values of controlled bindings.
///
/// Seeds come from the binding parser; after that only the host changes
/// them. Re-parsing a page keeps the live value of every binding that is
/// still controlled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlledBindingStore {
    values: BTreeMap<String, BindingResult>,
}

impl ControlledBindingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track the controlled ids of `parsed`: new ids take their seed, known
    /// ids keep their value, ids no longer controlled are dropped
    pub fn sync(&mut self, parsed: &ParsedBindings) {
        self.values.retain(|id, _| parsed.controlled.contains(id));
        for id in &parsed.controlled {
            if self.values.contains_key(id) {
                continue;
            }
            let seed = match parsed.get(id).map(|binding| &binding.source) {
                Some(BindingSource::Result(result)) => result.clone(),
                _ => BindingResult::default(),
            };
            self.values.insert(id.clone(), seed);
        }
    }

    /// Write the live values into `parsed`, replacing the parser's seeds
    pub fn apply(&self, parsed: &mut ParsedBindings) {
        for (id, result) in &self.values {
            if let Some(binding) = parsed.bindings.get_mut(id) {
                binding.source = BindingSource::Result(result.clone());
            }
        }
    }

    pub fn set_controlled_binding(
        &mut self,
        id: &str,
        result: BindingResult,
    ) -> Result<(), BindingError> {
        let Some(slot) = self.values.get_mut(id) else {
            return Err(BindingError::NotControlled(id.to_string()));
        };
        trace!(binding = id, "set controlled binding");
        *slot = result;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&BindingResult> {
        self.values.get(id)
    }

    pub fn is_controlled(&self, id: &str) -> bool {
        self.values.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BindingResult)> {
        self.values.iter().map(|(id, result)| (id.as_str(), result))
    }
}
