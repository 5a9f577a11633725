use crate::blocks::Catalog;
use crate::error::Result;
use crate::variables::{ScopeId, VarId, Variable, VariableRegistry, PATH_SEPARATOR};
use crate::workspace::{BlockId, FieldValue, Workspace};
use std::collections::HashSet;

pub const BINDING_SEPARATOR: &str = "@@";
pub const NO_VARIABLES_MESSAGE: &str = "No variables defined";

/// Value of a variable-reference field: the text shown to the user plus,
/// once bound, the full path of the variable it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableRef {
    pub label: String,
    pub path: Option<String>,
}

impl VariableRef {
    pub fn unbound(label: &str) -> Self {
        Self {
            label: label.to_string(),
            path: None,
        }
    }

    pub fn bound(label: String, path: String) -> Self {
        Self {
            label,
            path: Some(path),
        }
    }

    /// Accepts `label@@path`, a `base::attr` path or a bare name.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(BINDING_SEPARATOR) {
            Some((label, path)) if !path.trim().is_empty() => {
                Self::bound(label.to_string(), path.to_string())
            }
            Some((label, _)) => Self::unbound(label),
            None => Self::unbound(raw),
        }
    }

    pub fn encode(&self) -> String {
        match &self.path {
            Some(path) => format!("{}{}{}", self.label, BINDING_SEPARATOR, path),
            None => self.label.clone(),
        }
    }

    /// Name used for lookup: the bound path, or the literal text.
    pub fn full_name(&self) -> &str {
        self.path.as_deref().unwrap_or(&self.label)
    }

    pub fn is_bound(&self) -> bool {
        self.path.is_some()
    }
}

/// Declarative pruning for the variable-selection listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableFilter {
    /// Accepted types; variables without a type always pass.
    pub types: Vec<String>,
    pub writable_only: bool,
    /// Flags a variable must carry.
    pub flags: Vec<String>,
}

impl VariableFilter {
    pub fn of_type(mut self, ty: &str) -> Self {
        self.types.push(ty.to_string());
        self
    }

    pub fn writable(mut self) -> Self {
        self.writable_only = true;
        self
    }

    pub fn with_flag(mut self, flag: &str) -> Self {
        self.flags.push(flag.to_string());
        self
    }

    pub fn accepts(&self, variable: &Variable) -> bool {
        if self.writable_only && variable.readonly {
            return false;
        }
        if let Some(ty) = &variable.var_type {
            if !self.types.is_empty() && !self.types.contains(ty) {
                return false;
            }
        }
        self.flags.iter().all(|flag| variable.flags.contains(flag))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuEntry {
    Item(MenuItem),
    Separator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    pub text: String,
    pub variable: Option<VarId>,
    pub enabled: bool,
    pub selected: bool,
    pub children: Vec<MenuEntry>,
}

/// Read-only view used for every scope query.
#[derive(Debug, Clone, Copy)]
pub struct ScopeContext<'a> {
    pub workspace: &'a Workspace,
    pub catalog: &'a Catalog,
    pub variables: &'a VariableRegistry,
}

impl<'a> ScopeContext<'a> {
    pub fn new(workspace: &'a Workspace, catalog: &'a Catalog, variables: &'a VariableRegistry) -> Self {
        Self {
            workspace,
            catalog,
            variables,
        }
    }

    /// Scopes visible from `block`, innermost lexical scope first and the
    /// global scope last.
    pub fn scope_chain(&self, block: BlockId) -> Vec<ScopeId> {
        let mut chain = Vec::new();
        let mut current = block;
        while let Some((outer, input)) = self.workspace.surrounding(current) {
            if self.opens_scope(outer, input) {
                chain.push(ScopeId::Block(outer));
            }
            current = outer;
        }
        chain.push(ScopeId::Global);
        chain
    }

    fn opens_scope(&self, block: BlockId, input: &str) -> bool {
        self.workspace
            .block(block)
            .and_then(|b| self.catalog.get(&b.block_type))
            .and_then(|ty| ty.declaration.as_ref())
            .is_some_and(|decl| decl.scoped_inputs.iter().any(|scoped| *scoped == input))
    }

    pub fn lookup(&self, block: BlockId, path: &str) -> Option<VarId> {
        self.scope_chain(block)
            .into_iter()
            .find_map(|scope| self.variables.lookup(scope, path))
    }

    /// Resolves a raw reference from the point of view of `block`. `None`
    /// means the reference dangles and stays a literal.
    pub fn resolve(&self, block: BlockId, raw: &str) -> Option<VarId> {
        self.lookup(block, VariableRef::parse(raw).full_name())
    }

    /// The variable-reference field of `block`, if its type declares one.
    pub fn reference(&self, block: BlockId) -> Option<(&'static str, &'a VariableRef)> {
        let b = self.workspace.block(block)?;
        let spec = self.catalog.get(&b.block_type)?.reference.as_ref()?;
        match b.field(spec.field)? {
            FieldValue::Variable(reference) => Some((spec.field, reference)),
            FieldValue::Text(_) => None,
        }
    }

    pub fn referenced_variable(&self, block: BlockId) -> Option<VarId> {
        let (_, reference) = self.reference(block)?;
        self.lookup(block, reference.full_name())
    }

    /// Globals sorted by namespace then name, and the lexical variables in
    /// scope, innermost first.
    pub fn visible_variables(&self, block: Option<BlockId>) -> (Vec<VarId>, Vec<VarId>) {
        let mut globals = self.variables.in_scope(ScopeId::Global).to_vec();
        globals.sort_by(|a, b| {
            let a = self.variables.get(*a);
            let b = self.variables.get(*b);
            let key = |v: Option<&'a Variable>| {
                v.map(|v| (v.namespace.clone(), v.name.clone()))
                    .unwrap_or_default()
            };
            key(a).cmp(&key(b))
        });
        let lexical = block
            .map(|block| {
                self.scope_chain(block)
                    .into_iter()
                    .filter(|scope| *scope != ScopeId::Global)
                    .flat_map(|scope| self.variables.in_scope(scope).to_vec())
                    .collect()
            })
            .unwrap_or_default();
        (globals, lexical)
    }

    /// Selection listing for the reference field of `block`.
    pub fn variable_menu(&self, block: BlockId, filter: &VariableFilter) -> Vec<MenuEntry> {
        let selected = self
            .reference(block)
            .and_then(|(_, reference)| reference.path.clone());
        let (globals, lexical) = self.visible_variables(Some(block));

        let (mut menu, _) = self.build_menu(&globals, filter, selected.as_deref());
        let (lexical_menu, _) = self.build_menu(&lexical, filter, selected.as_deref());
        if !menu.is_empty() && !lexical_menu.is_empty() {
            menu.push(MenuEntry::Separator);
        }
        menu.extend(lexical_menu);

        if menu.is_empty() {
            menu.push(MenuEntry::Item(MenuItem {
                text: NO_VARIABLES_MESSAGE.to_string(),
                variable: None,
                enabled: false,
                selected: false,
                children: Vec::new(),
            }));
        }
        menu
    }

    fn build_menu(
        &self,
        ids: &[VarId],
        filter: &VariableFilter,
        selected: Option<&str>,
    ) -> (Vec<MenuEntry>, bool) {
        let mut menu = Vec::new();
        let mut checked = false;
        for id in ids {
            let Some(variable) = self.variables.get(*id) else {
                continue;
            };
            let (children, child_checked) =
                self.build_menu(variable.attributes(), filter, selected);
            let enabled = filter.accepts(variable);
            let is_selected = if children.is_empty() {
                selected == Some(self.variables.path(*id).as_str())
            } else {
                child_checked
            };
            checked |= is_selected;
            if enabled || !children.is_empty() {
                menu.push(MenuEntry::Item(MenuItem {
                    text: variable.menu_label().to_string(),
                    variable: Some(*id),
                    enabled,
                    selected: is_selected,
                    children,
                }));
            }
        }
        (menu, checked)
    }
}

/// Re-resolves the reference fields of `root` and everything below it after
/// a move. References that resolve are rebound to the variable found from
/// the new position; the rest are left exactly as they were.
pub fn rebind_subtree(
    ws: &mut Workspace,
    catalog: &Catalog,
    vars: &VariableRegistry,
    root: BlockId,
) -> Result<usize> {
    let updates = {
        let ctx = ScopeContext::new(ws, catalog, vars);
        ws.descendants(root)
            .into_iter()
            .filter_map(|block| {
                let (field, reference) = ctx.reference(block)?;
                let variable = ctx.lookup(block, reference.full_name())?;
                let rebound = VariableRef::bound(vars.display(variable), vars.path(variable));
                (rebound != *reference).then_some((block, field, variable, rebound))
            })
            .collect::<Vec<_>>()
    };
    let count = updates.len();
    for (block, field, variable, rebound) in updates {
        apply_reference(ws, catalog, vars, block, field, variable, rebound)?;
    }
    if count > 0 {
        tracing::debug!(root = %root, rebound = count, "rebound variable references");
    }
    Ok(count)
}

/// Binds the reference field of `block` to `variable`.
pub fn bind_reference(
    ws: &mut Workspace,
    catalog: &Catalog,
    vars: &VariableRegistry,
    block: BlockId,
    variable: VarId,
) -> Result<()> {
    let field = {
        let ctx = ScopeContext::new(ws, catalog, vars);
        ctx.reference(block).map(|(field, _)| field)
    };
    let Some(field) = field else {
        return Ok(());
    };
    let rebound = VariableRef::bound(vars.display(variable), vars.path(variable));
    apply_reference(ws, catalog, vars, block, field, variable, rebound)
}

fn apply_reference(
    ws: &mut Workspace,
    catalog: &Catalog,
    vars: &VariableRegistry,
    block: BlockId,
    field: &str,
    variable: VarId,
    reference: VariableRef,
) -> Result<()> {
    let block_type = {
        let b = ws.get_mut(block)?;
        b.fields
            .insert(field.to_string(), FieldValue::Variable(reference));
        b.block_type.clone()
    };
    let typed_input = catalog
        .get(&block_type)
        .and_then(|ty| ty.reference.as_ref())
        .and_then(|spec| spec.typed_input);
    let var_type = vars.get(variable).and_then(|v| v.var_type.clone());
    if let (Some(input), Some(var_type)) = (typed_input, var_type) {
        if ws.input(block, input).is_some() {
            ws.set_input_check(block, input, vec![var_type])?;
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameOutcome {
    pub name: String,
    pub updated: Vec<BlockId>,
}

/// Renames `variable` and refreshes, before returning, every block whose
/// reference resolved to it or to one of its attributes. Literals that never
/// resolved are not touched. The assigned name is never one that an inner
/// scope of a referencing block already declares, nor one that another
/// reference in the variable's scope would start resolving to.
pub fn rename_variable(
    ws: &mut Workspace,
    catalog: &Catalog,
    vars: &mut VariableRegistry,
    variable: VarId,
    requested: &str,
) -> Result<RenameOutcome> {
    let affected_vars = vars.subtree(variable);
    let owner = vars.variable(variable)?;
    let home = owner.parent.is_none().then_some(owner.scope);
    let owner_name = owner.name.clone();
    let mut blocked = HashSet::new();
    let affected = {
        let ctx = ScopeContext::new(ws, catalog, vars);
        let mut affected = Vec::new();
        for block in ws.blocks() {
            let Some((field, reference)) = ctx.reference(block.id) else {
                continue;
            };
            let resolved = ctx.lookup(block.id, reference.full_name());
            let chain = ctx.scope_chain(block.id);
            // Only top-level names can be shadowed by, or capture, another reference.
            if let Some(position) = home.and_then(|home| chain.iter().position(|s| *s == home)) {
                let inner = &chain[..position];
                match resolved {
                    Some(resolved) if affected_vars.contains(&resolved) => {
                        for scope in inner {
                            blocked.extend(
                                vars.in_scope(*scope)
                                    .iter()
                                    .filter_map(|id| vars.get(*id))
                                    .map(|v| v.name.clone()),
                            );
                        }
                    }
                    _ => {
                        let root = reference.full_name().split(PATH_SEPARATOR).next();
                        if let Some(root) = root {
                            if !inner.iter().any(|s| vars.lookup(*s, root).is_some()) {
                                blocked.insert(root.to_string());
                            }
                        }
                    }
                }
            }
            if let Some(resolved) = resolved.filter(|r| affected_vars.contains(r)) {
                affected.push((block.id, field, resolved));
            }
        }
        affected
    };
    let declaring = ws
        .blocks()
        .filter(|block| vars.declared_by(block.id) == Some(variable))
        .filter_map(|block| {
            catalog
                .get(&block.block_type)
                .and_then(|ty| ty.declaration.as_ref())
                .map(|decl| (block.id, decl.field))
        })
        .collect::<Vec<_>>();

    blocked.remove(&owner_name);
    let name = vars.rename_avoiding(variable, requested, |candidate| blocked.contains(candidate))?;

    for (block, field) in declaring {
        ws.get_mut(block)?
            .fields
            .insert(field.to_string(), FieldValue::Text(name.clone()));
    }
    let mut updated = Vec::with_capacity(affected.len());
    for (block, field, resolved) in affected {
        let reference = VariableRef::bound(vars.display(resolved), vars.path(resolved));
        apply_reference(ws, catalog, vars, block, field, resolved, reference)?;
        updated.push(block);
    }
    tracing::debug!(
        variable = %variable,
        name = %name,
        updated = updated.len(),
        "renamed variable"
    );
    Ok(RenameOutcome { name, updated })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_encode_references() {
        let bound = VariableRef::parse("reactor \u{25B8} Power@@reactor::power");
        assert_eq!(bound.path.as_deref(), Some("reactor::power"));
        assert_eq!(bound.full_name(), "reactor::power");
        assert_eq!(bound.encode(), "reactor \u{25B8} Power@@reactor::power");

        let literal = VariableRef::parse("reactor::power");
        assert!(!literal.is_bound());
        assert_eq!(literal.full_name(), "reactor::power");

        let empty_binding = VariableRef::parse("x@@  ");
        assert_eq!(empty_binding, VariableRef::unbound("x"));
    }

    #[test]
    fn filter_semantics() {
        let mut vars = VariableRegistry::new();
        let id = vars.add_variable(ScopeId::Global, "reactor", "machine");
        {
            let v = vars.variable_mut(id).unwrap();
            v.var_type = Some("component".into());
            v.readonly = true;
            v.flags.insert("providesGSIOC".into());
        }
        let untyped = vars.add_variable(ScopeId::Global, "x", "global");
        let reactor = vars.get(id).unwrap();
        let plain = vars.get(untyped).unwrap();

        assert!(VariableFilter::default().accepts(reactor));
        assert!(!VariableFilter::default().writable().accepts(reactor));
        assert!(!VariableFilter::default().of_type("Number").accepts(reactor));
        assert!(VariableFilter::default().of_type("Number").accepts(plain));
        assert!(VariableFilter::default().with_flag("providesGSIOC").accepts(reactor));
        assert!(!VariableFilter::default().with_flag("providesGSIOC").accepts(plain));
    }
}
