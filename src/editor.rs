//! Editing session: every structural change to the block tree goes through
//! [`Editor`] so variable declarations and references stay consistent.

use crate::blocks::{self, AttributeSpec, Catalog};
use crate::codegen::{self, GeneratorOptions, GeneratorRegistry};
use crate::error::{EditorError, Result};
use crate::mutation::{self, ClauseEditor, MutationRecord, MutationState, ReconcileReport};
use crate::scope::{self, MenuEntry, RenameOutcome, ScopeContext, VariableFilter, VariableRef};
use crate::variables::{ScopeId, VarId, VariableRegistry};
use crate::workspace::{BlockId, FieldValue, Workspace};

#[derive(Debug, Clone)]
pub struct Editor {
    workspace: Workspace,
    variables: VariableRegistry,
    catalog: Catalog,
    generators: GeneratorRegistry,
}

impl Default for Editor {
    fn default() -> Self {
        Self::new()
    }
}

impl Editor {
    /// A session over an empty workspace with the standard block library.
    pub fn new() -> Self {
        let (catalog, generators) = blocks::standard_library();
        Self::with_library(catalog, generators)
    }

    pub fn with_library(catalog: Catalog, generators: GeneratorRegistry) -> Self {
        Self {
            workspace: Workspace::new(),
            variables: VariableRegistry::new(),
            catalog,
            generators,
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn variables(&self) -> &VariableRegistry {
        &self.variables
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn generators(&self) -> &GeneratorRegistry {
        &self.generators
    }

    pub fn scope(&self) -> ScopeContext<'_> {
        ScopeContext::new(&self.workspace, &self.catalog, &self.variables)
    }

    /// Creates a block in its default shape. A declaring block gets its
    /// variable immediately; the name field holds the name actually given.
    pub fn create_block(&mut self, block_type: &str, uid: Option<String>) -> Result<BlockId> {
        let id = self.catalog.instantiate(&mut self.workspace, block_type, uid)?;
        self.declare(id)?;
        Ok(id)
    }

    fn declare(&mut self, block: BlockId) -> Result<()> {
        let b = self.workspace.get(block)?;
        let Some(declaration) = self
            .catalog
            .get(&b.block_type)
            .and_then(|ty| ty.declaration.as_ref())
        else {
            return Ok(());
        };
        let requested = b.field_text(declaration.field).unwrap_or_default().to_string();
        let scope = if declaration.global {
            ScopeId::Global
        } else {
            ScopeId::Block(block)
        };
        let variable = self
            .variables
            .add_variable(scope, &requested, declaration.namespace);
        {
            let v = self.variables.variable_mut(variable)?;
            v.var_type = declaration.var_type.map(str::to_string);
            v.readonly = declaration.readonly;
            v.flags = declaration.flags.iter().map(|f| f.to_string()).collect();
        }
        let attributes = declaration.attributes_for(b.mutation());
        add_attributes(&mut self.variables, variable, &attributes)?;
        self.variables.declare(block, variable);

        let name = self.variables.variable(variable)?.name.clone();
        self.workspace
            .get_mut(block)?
            .fields
            .insert(declaration.field.to_string(), FieldValue::Text(name));
        Ok(())
    }

    pub fn set_position(&mut self, block: BlockId, x: f64, y: f64) -> Result<()> {
        self.workspace.get_mut(block)?.position = (x, y);
        Ok(())
    }

    pub fn set_comment(&mut self, block: BlockId, comment: Option<String>) -> Result<()> {
        self.workspace.get_mut(block)?.comment = comment;
        Ok(())
    }

    pub fn set_disabled(&mut self, block: BlockId, disabled: bool) -> Result<()> {
        self.workspace.get_mut(block)?.disabled = disabled;
        Ok(())
    }

    /// Sets a field from its text form. Editing a declaration's name renames
    /// the variable; editing a reference field re-resolves it in place.
    pub fn set_field(&mut self, block: BlockId, field: &str, value: &str) -> Result<()> {
        let block_type = self.workspace.get(block)?.block_type.clone();
        let block_type = self.catalog.require(&block_type)?;
        if !block_type.fields.iter().any(|spec| spec.name == field) {
            return Err(EditorError::UnknownField {
                block,
                field: field.to_string(),
            });
        }

        let declares = block_type
            .declaration
            .as_ref()
            .is_some_and(|decl| decl.field == field);
        let references = block_type
            .reference
            .as_ref()
            .is_some_and(|spec| spec.field == field);
        if declares {
            if let Some(variable) = self.variables.declared_by(block) {
                self.rename_variable(variable, value)?;
                return Ok(());
            }
        }

        let value = if references {
            FieldValue::Variable(VariableRef::parse(value))
        } else {
            FieldValue::Text(value.to_string())
        };
        self.workspace
            .get_mut(block)?
            .fields
            .insert(field.to_string(), value);
        if references {
            self.rebind(block)?;
        }
        Ok(())
    }

    pub fn connect_input(&mut self, parent: BlockId, input: &str, child: BlockId) -> Result<()> {
        let displaced = self
            .workspace
            .input_target(parent, input)
            .filter(|existing| *existing != child);
        self.workspace.connect_input(parent, input, child)?;
        self.rebind(child)?;
        if let Some(existing) = displaced {
            self.rebind(existing)?;
        }
        Ok(())
    }

    pub fn connect_next(&mut self, previous: BlockId, child: BlockId) -> Result<()> {
        self.workspace.connect_next(previous, child)?;
        self.rebind(child)?;
        Ok(())
    }

    /// Detaches `child` into a top-level root and re-resolves its references
    /// from there.
    pub fn disconnect(&mut self, child: BlockId) -> Result<bool> {
        let was_attached = self.workspace.disconnect(child)?;
        if was_attached {
            self.rebind(child)?;
        }
        Ok(was_attached)
    }

    /// Deletes `block` and its subtree. Variables declared by deleted blocks
    /// go with them; references to them are left as unresolved literals.
    pub fn delete(&mut self, block: BlockId, heal: bool) -> Result<Vec<BlockId>> {
        let healed = if heal {
            self.workspace.next_block(block)
        } else {
            None
        };
        let doomed = self.workspace.dispose(block, heal)?;
        for id in &doomed {
            if let Some(variable) = self.variables.undeclare(*id) {
                self.variables.remove_variable(variable);
            }
        }
        if let Some(next) = healed.filter(|next| self.workspace.contains(*next)) {
            self.rebind(next)?;
        }
        tracing::debug!(block = %block, deleted = doomed.len(), "deleted blocks");
        Ok(doomed)
    }

    fn rebind(&mut self, root: BlockId) -> Result<usize> {
        scope::rebind_subtree(&mut self.workspace, &self.catalog, &self.variables, root)
    }

    /// Re-resolves every reference in the workspace.
    pub fn rebind_all(&mut self) -> Result<usize> {
        let mut count = 0;
        for root in self.workspace.top_blocks() {
            count += self.rebind(root)?;
        }
        Ok(count)
    }

    /// Points the reference field of `block` at `variable`.
    pub fn set_variable_reference(&mut self, block: BlockId, variable: VarId) -> Result<()> {
        self.variables.variable(variable)?;
        scope::bind_reference(&mut self.workspace, &self.catalog, &self.variables, block, variable)
    }

    pub fn rename_variable(&mut self, variable: VarId, requested: &str) -> Result<RenameOutcome> {
        scope::rename_variable(
            &mut self.workspace,
            &self.catalog,
            &mut self.variables,
            variable,
            requested,
        )
    }

    /// Selection listing for the reference field of `block`, filtered the
    /// way its block type asks for.
    pub fn variable_menu(&self, block: BlockId) -> Result<Vec<MenuEntry>> {
        let block_type = &self.workspace.get(block)?.block_type;
        let filter = self
            .catalog
            .require(block_type)?
            .reference
            .as_ref()
            .map(|spec| spec.filter.clone())
            .unwrap_or_else(VariableFilter::default);
        Ok(self.scope().variable_menu(block, &filter))
    }

    /// Reshapes a mutable block. Children of removed inputs become top-level
    /// roots; option changes rebuild the attributes of a declared variable.
    pub fn mutate(&mut self, block: BlockId, target: &MutationState) -> Result<ReconcileReport> {
        let block_type = self.workspace.get(block)?.block_type.clone();
        let schema = self.catalog.schema(&block_type)?;
        let before = self.workspace.get(block)?.mutation().clone();
        let report = mutation::reconcile(&mut self.workspace, block, schema, target, None)?;
        self.after_reshape(block, &before, &report)?;
        Ok(report)
    }

    pub fn deserialize_mutation(&mut self, block: BlockId, record: &MutationRecord) -> Result<ReconcileReport> {
        let block_type = self.workspace.get(block)?.block_type.clone();
        let state = mutation::deserialize(self.catalog.schema(&block_type)?, record);
        self.mutate(block, &state)
    }

    pub fn serialize_mutation(&self, block: BlockId) -> Result<MutationRecord> {
        let b = self.workspace.get(block)?;
        let schema = self.catalog.schema(&b.block_type)?;
        Ok(mutation::serialize(schema, b.mutation()))
    }

    pub fn open_clause_editor(&mut self, block: BlockId) -> Result<ClauseEditor> {
        let block_type = self.workspace.get(block)?.block_type.clone();
        let schema = self.catalog.schema(&block_type)?;
        ClauseEditor::open(&mut self.workspace, block, schema)
    }

    /// Applies the helper list of `clauses` to its block, moving clause
    /// children along with their helpers.
    pub fn apply_clause_editor(&mut self, clauses: &mut ClauseEditor) -> Result<ReconcileReport> {
        let block = clauses.block();
        let block_type = self.workspace.get(block)?.block_type.clone();
        let schema = self.catalog.schema(&block_type)?;
        let before = self.workspace.get(block)?.mutation().clone();
        let (state, connections) = clauses.collapse(schema)?;
        let report =
            mutation::reconcile(&mut self.workspace, block, schema, &state, Some(&connections))?;
        clauses.sync(&mut self.workspace, schema)?;
        self.after_reshape(block, &before, &report)?;
        Ok(report)
    }

    fn after_reshape(
        &mut self,
        block: BlockId,
        before: &MutationState,
        report: &ReconcileReport,
    ) -> Result<()> {
        for orphan in &report.orphaned {
            if self.workspace.contains(*orphan) && self.workspace.parent(*orphan).is_none() {
                self.rebind(*orphan)?;
            }
        }
        if !report.connected.is_empty() || !report.disconnected.is_empty() {
            self.rebind(block)?;
        }
        if self.workspace.get(block)?.mutation() != before {
            self.refresh_attributes(block)?;
        }
        Ok(())
    }

    fn refresh_attributes(&mut self, block: BlockId) -> Result<()> {
        let Some(variable) = self.variables.declared_by(block) else {
            return Ok(());
        };
        let b = self.workspace.get(block)?;
        let Some(declaration) = self
            .catalog
            .get(&b.block_type)
            .and_then(|ty| ty.declaration.as_ref())
            .filter(|decl| decl.counted.is_some())
        else {
            return Ok(());
        };
        let attributes = declaration.attributes_for(b.mutation());
        self.variables.clear_attributes(variable)?;
        add_attributes(&mut self.variables, variable, &attributes)?;
        tracing::debug!(
            block = %block,
            attributes = attributes.len(),
            "rebuilt declared attributes"
        );
        self.rebind_all()?;
        Ok(())
    }

    pub fn generate(&self, options: &GeneratorOptions) -> Result<String> {
        codegen::generate(
            &self.workspace,
            &self.catalog,
            &self.variables,
            &self.generators,
            options,
        )
    }
}

fn add_attributes(vars: &mut VariableRegistry, parent: VarId, specs: &[AttributeSpec]) -> Result<()> {
    for spec in specs {
        let attribute = vars.add_attribute(parent, &spec.name)?;
        {
            let v = vars.variable_mut(attribute)?;
            v.title = Some(spec.title.clone());
            v.var_type = spec.var_type.map(str::to_string);
            v.readonly = spec.readonly;
            v.options = spec.options.iter().map(|o| o.to_string()).collect();
            v.unit = spec.unit.map(str::to_string);
        }
        add_attributes(vars, attribute, &spec.parts)?;
    }
    Ok(())
}
