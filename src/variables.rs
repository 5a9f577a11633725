use crate::error::{EditorError, Result};
use crate::workspace::BlockId;
use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap};
use std::fmt::{Display, Formatter};

pub const PATH_SEPARATOR: &str = "::";
pub const DISPLAY_SEPARATOR: &str = " \u{25B8} ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(usize);

impl Display for VarId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "var#{}", self.0)
    }
}

/// Either the single global scope or the lexical scope opened by a
/// declaring block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeId {
    Global,
    Block(BlockId),
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub id: VarId,
    pub name: String,
    /// Menu text; falls back to the name.
    pub title: Option<String>,
    pub var_type: Option<String>,
    pub readonly: bool,
    pub flags: BTreeSet<String>,
    pub options: Vec<String>,
    pub unit: Option<String>,
    pub namespace: String,
    pub scope: ScopeId,
    pub parent: Option<VarId>,
    attributes: Vec<VarId>,
}

impl Variable {
    pub fn attributes(&self) -> &[VarId] {
        &self.attributes
    }

    pub fn menu_label(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }

    pub fn is_global(&self) -> bool {
        self.scope == ScopeId::Global
    }
}

#[derive(Debug, Default, Clone)]
pub struct VariableRegistry {
    vars: Vec<Option<Variable>>,
    scopes: IndexMap<ScopeId, Vec<VarId>>,
    declarations: HashMap<BlockId, VarId>,
}

impl VariableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: VarId) -> Option<&Variable> {
        self.vars.get(id.0).and_then(Option::as_ref)
    }

    pub fn variable(&self, id: VarId) -> Result<&Variable> {
        self.get(id)
            .ok_or_else(|| EditorError::UnknownVariable(id.to_string()))
    }

    pub fn variable_mut(&mut self, id: VarId) -> Result<&mut Variable> {
        self.vars
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| EditorError::UnknownVariable(id.to_string()))
    }

    pub fn add_variable(&mut self, scope: ScopeId, name: &str, namespace: &str) -> VarId {
        let siblings = self.scopes.get(&scope).cloned().unwrap_or_default();
        let name = unique_name(name, |candidate| self.named_among(&siblings, candidate, None));
        let id = self.push(Variable {
            id: VarId(self.vars.len()),
            name,
            title: None,
            var_type: None,
            readonly: false,
            flags: BTreeSet::new(),
            options: Vec::new(),
            unit: None,
            namespace: namespace.to_string(),
            scope,
            parent: None,
            attributes: Vec::new(),
        });
        self.scopes.entry(scope).or_default().push(id);
        tracing::debug!(variable = %id, scope = ?scope, "added variable");
        id
    }

    pub fn add_attribute(&mut self, parent: VarId, name: &str) -> Result<VarId> {
        let owner = self.variable(parent)?;
        let siblings = owner.attributes.clone();
        let (scope, namespace) = (owner.scope, owner.namespace.clone());
        let name = unique_name(name, |candidate| self.named_among(&siblings, candidate, None));
        let id = self.push(Variable {
            id: VarId(self.vars.len()),
            name,
            title: None,
            var_type: None,
            readonly: false,
            flags: BTreeSet::new(),
            options: Vec::new(),
            unit: None,
            namespace,
            scope,
            parent: Some(parent),
            attributes: Vec::new(),
        });
        self.variable_mut(parent)?.attributes.push(id);
        Ok(id)
    }

    fn push(&mut self, variable: Variable) -> VarId {
        let id = variable.id;
        self.vars.push(Some(variable));
        id
    }

    fn named_among(&self, ids: &[VarId], name: &str, except: Option<VarId>) -> bool {
        ids.iter()
            .filter(|id| Some(**id) != except)
            .filter_map(|id| self.get(*id))
            .any(|v| v.name == name)
    }

    /// Removes a variable and its attributes. Returns every removed id.
    pub fn remove_variable(&mut self, id: VarId) -> Vec<VarId> {
        let Some(variable) = self.get(id) else {
            return Vec::new();
        };
        let (scope, parent) = (variable.scope, variable.parent);
        match parent {
            Some(parent) => {
                if let Ok(owner) = self.variable_mut(parent) {
                    owner.attributes.retain(|a| *a != id);
                }
            }
            None => {
                if let Some(ids) = self.scopes.get_mut(&scope) {
                    ids.retain(|v| *v != id);
                }
            }
        }
        let removed = self.subtree(id);
        for removed_id in &removed {
            if let Some(slot) = self.vars.get_mut(removed_id.0) {
                *slot = None;
            }
        }
        self.declarations.retain(|_, v| !removed.contains(v));
        tracing::debug!(variable = %id, removed = removed.len(), "removed variable");
        removed
    }

    pub fn clear_attributes(&mut self, id: VarId) -> Result<()> {
        let attributes = self.variable(id)?.attributes.clone();
        for attribute in attributes {
            self.remove_variable(attribute);
        }
        Ok(())
    }

    /// Renames in place, resolving collisions with sibling names. Returns the
    /// name actually assigned.
    pub fn rename(&mut self, id: VarId, requested: &str) -> Result<String> {
        self.rename_avoiding(id, requested, |_| false)
    }

    /// Like [`rename`](Self::rename), but also skips names for which
    /// `blocked` holds.
    pub fn rename_avoiding(
        &mut self,
        id: VarId,
        requested: &str,
        blocked: impl Fn(&str) -> bool,
    ) -> Result<String> {
        let variable = self.variable(id)?;
        let siblings = match variable.parent {
            Some(parent) => self.variable(parent)?.attributes.clone(),
            None => self.scopes.get(&variable.scope).cloned().unwrap_or_default(),
        };
        let name = unique_name(requested, |candidate| {
            blocked(candidate) || self.named_among(&siblings, candidate, Some(id))
        });
        self.variable_mut(id)?.name = name.clone();
        Ok(name)
    }

    /// `id` followed by all of its attributes, depth first.
    pub fn subtree(&self, id: VarId) -> Vec<VarId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(variable) = self.get(current) else {
                continue;
            };
            out.push(current);
            stack.extend(variable.attributes.iter().rev());
        }
        out
    }

    pub fn in_scope(&self, scope: ScopeId) -> &[VarId] {
        self.scopes.get(&scope).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Looks up a bare name or a `base::attr` path among the variables
    /// declared directly in `scope`.
    pub fn lookup(&self, scope: ScopeId, path: &str) -> Option<VarId> {
        let mut parts = path.split(PATH_SEPARATOR);
        let first = parts.next()?;
        let mut current = *self
            .in_scope(scope)
            .iter()
            .find(|id| self.get(**id).is_some_and(|v| v.name == first))?;
        for part in parts {
            current = *self
                .get(current)?
                .attributes
                .iter()
                .find(|id| self.get(**id).is_some_and(|v| v.name == part))?;
        }
        Some(current)
    }

    pub fn path(&self, id: VarId) -> String {
        let mut parts = Vec::new();
        let mut current = self.get(id);
        while let Some(variable) = current {
            parts.push(variable.name.as_str());
            current = variable.parent.and_then(|p| self.get(p));
        }
        parts.reverse();
        parts.join(PATH_SEPARATOR)
    }

    /// Field text for a bound reference: the owner's name followed by the
    /// attribute titles, e.g. `reactor ▸ Pump A ▸ Target`.
    pub fn display(&self, id: VarId) -> String {
        let mut parts = Vec::new();
        let mut current = self.get(id);
        while let Some(variable) = current {
            if variable.parent.is_some() {
                parts.push(variable.menu_label());
            } else {
                parts.push(variable.name.as_str());
            }
            current = variable.parent.and_then(|p| self.get(p));
        }
        parts.reverse();
        parts.join(DISPLAY_SEPARATOR)
    }

    pub fn root_of(&self, id: VarId) -> VarId {
        let mut current = id;
        while let Some(parent) = self.get(current).and_then(|v| v.parent) {
            current = parent;
        }
        current
    }

    pub fn declare(&mut self, block: BlockId, variable: VarId) {
        self.declarations.insert(block, variable);
    }

    pub fn declared_by(&self, block: BlockId) -> Option<VarId> {
        self.declarations.get(&block).copied()
    }

    pub fn undeclare(&mut self, block: BlockId) -> Option<VarId> {
        self.declarations.remove(&block)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.vars.iter().filter_map(Option::as_ref)
    }
}

/// Returns `requested`, or the first free name obtained by incrementing its
/// trailing number (a missing number counts as 1): `pump` -> `pump2`,
/// `pump7` -> `pump8`.
pub fn unique_name(requested: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(requested) {
        return requested.to_string();
    }
    let prefix = requested.trim_end_matches(|c: char| c.is_ascii_digit());
    let mut suffix = match &requested[prefix.len()..] {
        "" => "1".to_string(),
        digits => digits.to_string(),
    };
    loop {
        suffix = increment_digits(&suffix);
        let candidate = format!("{}{}", prefix, suffix);
        if !taken(&candidate) {
            return candidate;
        }
    }
}

/// Decimal increment on the digit string itself, so suffixes of any length
/// keep their width until they carry: `07` -> `08`, `99` -> `100`.
fn increment_digits(digits: &str) -> String {
    let mut out = digits.chars().collect::<Vec<_>>();
    for digit in out.iter_mut().rev() {
        if *digit == '9' {
            *digit = '0';
        } else {
            *digit = char::from(*digit as u8 + 1);
            return out.into_iter().collect();
        }
    }
    std::iter::once('1').chain(out).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collisions_increment_numeric_suffix() {
        let mut vars = VariableRegistry::new();
        let a = vars.add_variable(ScopeId::Global, "pump", "machine");
        let b = vars.add_variable(ScopeId::Global, "pump", "machine");
        let c = vars.add_variable(ScopeId::Global, "pump", "machine");
        let d = vars.add_variable(ScopeId::Global, "valve9", "machine");
        let e = vars.add_variable(ScopeId::Global, "valve9", "machine");
        let names = [a, b, c, d, e]
            .iter()
            .map(|id| vars.get(*id).unwrap().name.clone())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["pump", "pump2", "pump3", "valve9", "valve10"]);
    }

    #[test]
    fn oversized_suffixes_keep_counting() {
        let mut vars = VariableRegistry::new();
        let max = "x18446744073709551615";
        vars.add_variable(ScopeId::Global, max, "lexical");
        let next = vars.add_variable(ScopeId::Global, max, "lexical");
        assert_eq!(vars.get(next).unwrap().name, "x18446744073709551616");

        let long = "t999999999999999999999999";
        assert_eq!(unique_name(long, |c| c == long), "t1000000000000000000000000");
        assert_eq!(unique_name("run07", |c| c == "run07"), "run08");
    }

    #[test]
    fn lookup_walks_attribute_paths() {
        let mut vars = VariableRegistry::new();
        let reactor = vars.add_variable(ScopeId::Global, "reactor", "machine");
        let pump = vars.add_attribute(reactor, "pump1").unwrap();
        let target = vars.add_attribute(pump, "target").unwrap();
        vars.variable_mut(pump).unwrap().title = Some("Pump A".into());
        vars.variable_mut(target).unwrap().title = Some("Target".into());

        assert_eq!(vars.lookup(ScopeId::Global, "reactor::pump1::target"), Some(target));
        assert_eq!(vars.lookup(ScopeId::Global, "pump1"), None);
        assert_eq!(vars.path(target), "reactor::pump1::target");
        assert_eq!(vars.display(target), "reactor \u{25B8} Pump A \u{25B8} Target");
    }

    #[test]
    fn rename_moves_whole_subtree_path() {
        let mut vars = VariableRegistry::new();
        let reactor = vars.add_variable(ScopeId::Global, "reactor", "machine");
        vars.add_variable(ScopeId::Global, "flow", "machine");
        let power = vars.add_attribute(reactor, "power").unwrap();

        assert_eq!(vars.rename(reactor, "flow").unwrap(), "flow2");
        assert_eq!(vars.path(power), "flow2::power");
        assert_eq!(vars.rename(reactor, "flow2").unwrap(), "flow2");
    }

    #[test]
    fn removing_a_variable_removes_its_attributes() {
        let mut vars = VariableRegistry::new();
        let reactor = vars.add_variable(ScopeId::Global, "reactor", "machine");
        let power = vars.add_attribute(reactor, "power").unwrap();
        let removed = vars.remove_variable(reactor);
        assert_eq!(removed, vec![reactor, power]);
        assert!(vars.get(power).is_none());
        assert!(vars.in_scope(ScopeId::Global).is_empty());
    }
}
