//! The harmonized product: root of the output tree plus its optional
//! store binding.

use std::fmt;

use tracing::debug;

use eo_common::{merge_attrs, path, Attributes, NdArray};
use eo_store::{EntryKind, OpenMode, ProductStore};

use crate::error::{ModelError, Result};
use crate::group::Group;
use crate::variable::{Variable, VariableData};

/// Groups every valid product must contain.
pub const MANDATORY_GROUPS: [&str; 2] = ["measurements", "coordinates"];

/// Immutable reference to a node in the tree.
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Group(&'a Group),
    Variable(&'a Variable),
}

/// Root of the harmonized hierarchy.
///
/// Owns its group tree exclusively; the optional store binding is a
/// scoped resource, and closing it invalidates every lazy variable
/// still pointing into it.
pub struct Product {
    name: String,
    attrs: Attributes,
    root: Group,
    store: Option<Box<dyn ProductStore>>,
}

impl fmt::Debug for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Product")
            .field("name", &self.name)
            .field("attrs", &self.attrs)
            .field("root", &self.root)
            .field("store_bound", &self.store.is_some())
            .finish()
    }
}

impl Product {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), attrs: Attributes::new(), root: Group::new(""), store: None }
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

    pub fn root(&self) -> &Group {
        &self.root
    }

    // ----- tree construction -------------------------------------------------

    /// Group at `tree_path`, auto-creating every missing segment.
    ///
    /// Idempotent; adding `a/b/c` creates `a` and `a/b` when absent.
    pub fn add_group(&mut self, tree_path: &str) -> Result<&mut Group> {
        let norm = path::normalize(tree_path);
        let mut cur = &mut self.root;
        for seg in path::segments(&norm) {
            cur = cur.ensure_group(seg)?;
        }
        Ok(cur)
    }

    /// Add a variable at `tree_path`, auto-creating intermediate groups.
    ///
    /// A variable cannot live at the product root.
    pub fn add_variable(
        &mut self,
        tree_path: &str,
        array: NdArray,
        dims: Vec<String>,
        attrs: Attributes,
    ) -> Result<()> {
        let (parent, name) = path::upsplit(tree_path);
        let (parent, name) = match name {
            Some(name) if !parent.is_empty() => (parent, name),
            _ => {
                return Err(ModelError::InvalidStructure(format!(
                    "cannot add variable '{tree_path}' at the product root"
                )))
            }
        };
        let variable = Variable::new(name, array, dims, attrs)?;
        self.add_group(&parent)?.set_variable(variable)
    }

    /// Insert a pre-built variable under `parent_path`.
    pub fn set_variable(&mut self, parent_path: &str, variable: Variable) -> Result<()> {
        if path::normalize(parent_path).is_empty() {
            return Err(ModelError::InvalidStructure(format!(
                "cannot add variable '{}' at the product root",
                variable.name()
            )));
        }
        self.add_group(parent_path)?.set_variable(variable)
    }

    /// Merge attributes onto the node at `tree_path` (the empty path is
    /// the product root).
    pub fn merge_attrs_at(&mut self, tree_path: &str, attrs: &Attributes) -> Result<()> {
        let norm = path::normalize(tree_path);
        if norm.is_empty() {
            merge_attrs(&mut self.attrs, attrs);
            return Ok(());
        }
        merge_attrs(self.add_group(&norm)?.attrs_mut(), attrs);
        Ok(())
    }

    // ----- lookup ------------------------------------------------------------

    /// Node at `tree_path`. Paths are slash separated and the empty
    /// path is the root group; a dotted path without slashes is
    /// accepted as the attribute-style spelling of the same lookup.
    pub fn get(&self, tree_path: &str) -> Result<NodeRef<'_>> {
        let spelled = if !tree_path.contains('/') && tree_path.contains('.') {
            tree_path.replace('.', "/")
        } else {
            tree_path.to_string()
        };
        let norm = path::normalize(&spelled);
        let segs = path::segments(&norm);
        let mut cur = &self.root;
        for (i, seg) in segs.iter().enumerate() {
            if let Some(group) = cur.group(seg) {
                cur = group;
                continue;
            }
            if i + 1 == segs.len() {
                if let Some(var) = cur.variable(seg) {
                    return Ok(NodeRef::Variable(var));
                }
            }
            return Err(ModelError::KeyNotFound(norm));
        }
        Ok(NodeRef::Group(cur))
    }

    pub fn contains(&self, tree_path: &str) -> bool {
        self.get(tree_path).is_ok()
    }

    /// Coordinate variables for the variable at `var_path`, resolved by
    /// matching its dimension names against the nearest enclosing
    /// `coordinates` group. This is a derived relationship, recomputed
    /// on every call.
    pub fn coordinates_for(&self, var_path: &str) -> Result<Vec<&Variable>> {
        let variable = match self.get(var_path)? {
            NodeRef::Variable(v) => v,
            NodeRef::Group(_) => {
                return Err(ModelError::InvalidStructure(format!(
                    "'{var_path}' is a group, not a variable"
                )))
            }
        };
        // walk ancestors from the variable's parent up to the root
        let mut candidates: Vec<String> = Vec::new();
        let mut cur = path::upsplit(var_path).0;
        loop {
            candidates.push(cur.clone());
            if cur.is_empty() {
                break;
            }
            cur = path::upsplit(&cur).0;
        }
        for ancestor in &candidates {
            let group = match self.get(ancestor)? {
                NodeRef::Group(g) => g,
                NodeRef::Variable(_) => continue,
            };
            if let Some(coords) = group.group("coordinates") {
                let found: Vec<&Variable> = variable
                    .dims()
                    .iter()
                    .filter_map(|dim| coords.variable(dim))
                    .collect();
                if !found.is_empty() {
                    return Ok(found);
                }
            }
        }
        Ok(Vec::new())
    }

    // ----- validation --------------------------------------------------------

    /// Whether the mandatory `measurements` and `coordinates` groups
    /// exist.
    pub fn is_valid(&self) -> bool {
        MANDATORY_GROUPS.iter().all(|g| self.root.group(g).is_some())
    }

    /// Like [`Product::is_valid`], raising on failure.
    pub fn validate(&self) -> Result<()> {
        if !self.is_valid() {
            return Err(ModelError::InvalidProduct(format!(
                "product '{}' is missing one of the mandatory groups {MANDATORY_GROUPS:?}",
                self.name
            )));
        }
        Ok(())
    }

    // ----- store binding -----------------------------------------------------

    /// Bind and open a store for this product's lifetime.
    pub fn open(&mut self, mut store: Box<dyn ProductStore>, mode: OpenMode) -> Result<()> {
        store.open(mode)?;
        self.store = Some(store);
        Ok(())
    }

    pub fn store(&self) -> Option<&dyn ProductStore> {
        self.store.as_deref()
    }

    /// Close and drop the store binding. Lazy variables become
    /// unreadable rather than serving stale data.
    pub fn close(&mut self) -> Result<()> {
        let mut store = self.store.take().ok_or(ModelError::StoreNotDefined)?;
        store.close()?;
        Ok(())
    }

    /// Persist the whole tree through the bound store.
    pub fn write(&mut self) -> Result<()> {
        let store = self.store.as_mut().ok_or(ModelError::StoreNotDefined)?;
        store.write_attrs("", &self.attrs)?;
        let mut stack: Vec<(String, &Group)> = vec![(String::new(), &self.root)];
        while let Some((prefix, group)) = stack.pop() {
            if !prefix.is_empty() {
                store.write_attrs(&prefix, group.attrs())?;
            }
            for variable in group.variables() {
                let var_path = path::join(&[&prefix, variable.name()]);
                match variable.data() {
                    VariableData::Loaded(array) => {
                        store.write_variable(&var_path, array, variable.dims(), variable.attrs())?;
                    }
                    VariableData::Lazy { store_path, .. } => {
                        // a lazy payload only exists in the store it was
                        // fetched from; a rebound store may not hold it
                        if !store.is_variable(store_path).unwrap_or(false) {
                            return Err(ModelError::InvalidStructure(format!(
                                "lazy variable '{var_path}' has no payload in the bound store; \
                                 materialize it before writing"
                            )));
                        }
                        debug!(path = %var_path, "lazy variable already persisted");
                    }
                }
            }
            for child in group.groups() {
                stack.push((path::join(&[&prefix, child.name()]), child));
            }
        }
        Ok(())
    }

    /// Read the store's structure into the tree, leaving variable
    /// payloads lazy.
    pub fn fetch_structure(&mut self) -> Result<()> {
        let store = self.store.as_ref().ok_or(ModelError::StoreNotDefined)?;
        self.attrs = store.read_attrs("").unwrap_or_default();

        struct Pending {
            prefix: String,
        }
        let mut queue = vec![Pending { prefix: String::new() }];
        let mut groups: Vec<(String, Attributes)> = Vec::new();
        let mut variables: Vec<(String, Variable)> = Vec::new();

        while let Some(Pending { prefix }) = queue.pop() {
            for entry in store.listdir(&prefix)? {
                let child_path = path::join(&[&prefix, &entry.name]);
                match entry.kind {
                    EntryKind::Group => {
                        let attrs = store.read_attrs(&child_path).unwrap_or_default();
                        groups.push((child_path.clone(), attrs));
                        queue.push(Pending { prefix: child_path });
                    }
                    EntryKind::Variable => {
                        let stored = store.read_variable(&child_path)?;
                        let variable = Variable::new_lazy(
                            entry.name.clone(),
                            child_path.clone(),
                            stored.array.shape().to_vec(),
                            stored.dims,
                            stored.attrs,
                        )?;
                        variables.push((prefix.clone(), variable));
                    }
                }
            }
        }

        for (group_path, attrs) in groups {
            merge_attrs(self.add_group(&group_path)?.attrs_mut(), &attrs);
        }
        for (parent, variable) in variables {
            self.set_variable(&parent, variable)?;
        }
        Ok(())
    }

    /// Eagerly materialize every lazy variable (fetching the structure
    /// first when the tree is still empty).
    pub fn load(&mut self) -> Result<()> {
        if self.root.is_empty() {
            self.fetch_structure()?;
        }
        let mut lazy_paths = Vec::new();
        collect_lazy(&self.root, String::new(), &mut lazy_paths);
        for var_path in lazy_paths {
            self.materialize(&var_path)?;
        }
        Ok(())
    }

    /// Materialize one lazy variable through the bound store.
    pub fn materialize(&mut self, var_path: &str) -> Result<()> {
        let store = self.store.as_ref().ok_or(ModelError::StoreNotDefined)?;
        let norm = path::normalize(var_path);
        let store_path = {
            let variable = self.variable_at(&norm)?;
            match variable.data() {
                VariableData::Loaded(_) => return Ok(()),
                VariableData::Lazy { store_path, .. } => store_path.clone(),
            }
        };
        let stored = store.read_variable(&store_path)?;
        let array: NdArray = stored.array;
        let (parent, name) = path::upsplit(&norm);
        let name = name.ok_or_else(|| ModelError::KeyNotFound(norm.clone()))?;
        let group = self.add_group(&parent)?;
        let variable = group
            .variable_mut(&name)
            .ok_or(ModelError::KeyNotFound(norm))?;
        variable.materialize(array)
    }

    /// Materialized array of the variable at `var_path`, reading
    /// through the store binding when needed.
    pub fn variable_array(&mut self, var_path: &str) -> Result<&NdArray> {
        self.materialize(var_path)?;
        let variable = self.variable_at(&path::normalize(var_path))?;
        variable
            .array()
            .ok_or_else(|| ModelError::KeyNotFound(var_path.to_string()))
    }

    fn variable_at(&self, norm: &str) -> Result<&Variable> {
        match self.get(norm)? {
            NodeRef::Variable(v) => Ok(v),
            NodeRef::Group(_) => Err(ModelError::InvalidStructure(format!(
                "'{norm}' is a group, not a variable"
            ))),
        }
    }
}

fn collect_lazy(group: &Group, prefix: String, out: &mut Vec<String>) {
    for variable in group.variables() {
        if !variable.is_loaded() {
            out.push(path::join(&[&prefix, variable.name()]));
        }
    }
    for child in group.groups() {
        collect_lazy(child, path::join(&[&prefix, child.name()]), out);
    }
}
