//! Human-readable names for candidates.

use std::collections::HashMap;

use crate::heap::CallableId;
use crate::substrate::Substrate;

/// Name used when nothing better is known.
pub const UNKNOWN_FUNCTION: &str = "(unknown function)";

/// Resolves candidate names for diagnostics and generated comments.
///
/// An explicit name (for example the binding a tool recorded at
/// registration) wins over the function's own name.
#[derive(Debug, Clone, Default)]
pub struct NameResolver {
    overrides: HashMap<CallableId, String>,
}

impl NameResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, callable: CallableId, name: impl Into<String>) -> Self {
        self.set_name(callable, name);
        self
    }

    pub fn set_name(&mut self, callable: CallableId, name: impl Into<String>) {
        self.overrides.insert(callable, name.into());
    }

    pub fn resolve<S: Substrate>(&self, substrate: &S, callable: CallableId) -> String {
        if let Some(name) = self.overrides.get(&callable) {
            return name.clone();
        }
        substrate
            .function_signature(callable)
            .and_then(|sig| sig.name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| UNKNOWN_FUNCTION.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HeapModel;

    #[test]
    fn test_resolution_order() {
        let mut model = HeapModel::new("app.js");
        let named = model.define("render", vec![]);
        let anonymous = model.define_anonymous(vec![]);

        let names = NameResolver::new().with_name(anonymous, "App");
        assert_eq!(names.resolve(&model, named), "render");
        assert_eq!(names.resolve(&model, anonymous), "App");
        assert_eq!(NameResolver::new().resolve(&model, anonymous), UNKNOWN_FUNCTION);
        assert_eq!(names.resolve(&model, CallableId::new(42)), UNKNOWN_FUNCTION);
    }
}
