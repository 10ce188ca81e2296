//! Groups: named interior nodes of the harmonized tree.

use std::collections::BTreeMap;

use eo_common::Attributes;

use crate::error::{ModelError, Result};
use crate::variable::Variable;

/// A named node owning child groups, child variables and attributes.
///
/// The tree is strictly a tree: a group has exactly one parent and is
/// never shared. Groups are created on first reference and only removed
/// by explicit calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Group {
    name: String,
    attrs: Attributes,
    groups: BTreeMap<String, Group>,
    variables: BTreeMap<String, Variable>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut Attributes {
        &mut self.attrs
    }

    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.values()
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    pub fn group_mut(&mut self, name: &str) -> Option<&mut Group> {
        self.groups.get_mut(name)
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    pub fn variable_mut(&mut self, name: &str) -> Option<&mut Variable> {
        self.variables.get_mut(name)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.variables.is_empty()
    }

    /// Child group named `name`, created if absent.
    pub fn ensure_group(&mut self, name: &str) -> Result<&mut Group> {
        if self.variables.contains_key(name) {
            return Err(ModelError::InvalidStructure(format!(
                "'{name}' already names a variable"
            )));
        }
        Ok(self
            .groups
            .entry(name.to_string())
            .or_insert_with(|| Group::new(name)))
    }

    /// Insert (or replace) a variable as a direct child.
    pub fn set_variable(&mut self, variable: Variable) -> Result<()> {
        let name = variable.name().to_string();
        if self.groups.contains_key(&name) {
            return Err(ModelError::InvalidStructure(format!(
                "'{name}' already names a group"
            )));
        }
        self.variables.insert(name, variable);
        Ok(())
    }

    /// Remove a direct child group, returning it.
    pub fn remove_group(&mut self, name: &str) -> Option<Group> {
        self.groups.remove(name)
    }

    /// Remove a direct child variable, returning it.
    pub fn remove_variable(&mut self, name: &str) -> Option<Variable> {
        self.variables.remove(name)
    }
}
