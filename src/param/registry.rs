use std::collections::HashSet;

use crate::core::ArcStr;
use crate::error::ParameterError;
use crate::param::Parameter;

/// The ordered, effective set of parameters of a task type.
///
/// Ancestor parameters come first in their declared order. A parameter
/// declared again further down replaces the earlier one in place, so the
/// position of a name never changes once it appears in a hierarchy.
#[derive(Clone, Debug, Default)]
pub struct ParamRegistry {
    params: Vec<Parameter>,
}

impl ParamRegistry {
    /// Builds the effective registry from a stack of layers, outermost first.
    /// Only the last layer, the type's own declarations, must be free of
    /// duplicate names.
    pub(crate) fn layered<'a>(
        task: &ArcStr,
        inherited: impl IntoIterator<Item = &'a ParamRegistry>,
        own: Vec<Parameter>,
    ) -> Result<Self, ParameterError> {
        {
            let mut seen = HashSet::new();
            for param in &own {
                if !seen.insert(param.name()) {
                    return Err(ParameterError::Duplicate {
                        task: task.clone(),
                        param: param.name_arc().clone(),
                    });
                }
            }
        }

        let mut registry = ParamRegistry::default();

        for layer in inherited {
            registry.overlay(layer.params.iter().cloned());
        }

        let own = own
            .into_iter()
            .map(Parameter::checked)
            .collect::<Result<Vec<_>, _>>()?;
        registry.overlay(own);

        Ok(registry)
    }

    fn overlay(&mut self, layer: impl IntoIterator<Item = Parameter>) {
        for param in layer {
            match self.position(param.name()) {
                Some(index) => self.params[index] = param,
                None => self.params.push(param),
            }
        }
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|param| param.name() == name)
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|param| param.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.params.iter()
    }

    pub fn significant(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter().filter(|param| param.is_significant())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(Parameter::name)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl<'a> IntoIterator for &'a ParamRegistry {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
