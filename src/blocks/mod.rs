//! Block-type definitions and the generators that turn them into octo code.

use crate::codegen::GeneratorRegistry;
use crate::error::{EditorError, Result};
use crate::mutation::{self, MutationSchema, MutationState};
use crate::scope::{VariableFilter, VariableRef};
use crate::workspace::{BlockId, FieldValue, InputTemplate, Workspace};
use std::collections::HashMap;

pub mod control;
pub mod images;
pub mod logic;
pub mod machines;
pub mod math;
pub mod procedures;
pub mod text;
pub mod variables;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Variable,
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub default: &'static str,
    pub kind: FieldKind,
}

/// The block holds a reference to a variable in one of its fields.
#[derive(Debug, Clone)]
pub struct ReferenceSpec {
    pub field: &'static str,
    pub filter: VariableFilter,
    /// Value input whose type check follows the referenced variable's type.
    pub typed_input: Option<&'static str>,
}

/// Metadata for an attribute variable created under a declared variable.
#[derive(Debug, Clone)]
pub struct AttributeSpec {
    pub name: String,
    pub title: String,
    pub var_type: Option<&'static str>,
    pub readonly: bool,
    pub options: Vec<&'static str>,
    pub unit: Option<&'static str>,
    pub parts: Vec<AttributeSpec>,
}

impl AttributeSpec {
    pub fn new(name: impl Into<String>, title: impl Into<String>, var_type: &'static str) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            var_type: Some(var_type),
            readonly: false,
            options: Vec::new(),
            unit: None,
            parts: Vec::new(),
        }
    }

    /// A nested group; groups are typed `component` and read-only.
    pub fn group(name: impl Into<String>, title: impl Into<String>, parts: Vec<AttributeSpec>) -> Self {
        Self {
            var_type: Some("component"),
            readonly: true,
            parts,
            ..Self::new(name, title, "component")
        }
    }

    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    pub fn options(mut self, options: &[&'static str]) -> Self {
        self.options = options.to_vec();
        self
    }

    pub fn unit(mut self, unit: &'static str) -> Self {
        self.unit = Some(unit);
        self
    }
}

/// The block introduces a variable while it exists.
#[derive(Debug, Clone)]
pub struct Declaration {
    /// Field holding the declared name.
    pub field: &'static str,
    pub global: bool,
    pub namespace: &'static str,
    pub var_type: Option<&'static str>,
    pub readonly: bool,
    pub flags: Vec<&'static str>,
    /// Inputs in which a lexical declaration is visible.
    pub scoped_inputs: Vec<&'static str>,
    pub attributes: Vec<AttributeSpec>,
    pub counted: Option<CountedAttributes>,
}

/// Attributes created from a numeric mutation option: `%` in the name and
/// title is replaced with 1..=count.
#[derive(Debug, Clone)]
pub struct CountedAttributes {
    pub option: &'static str,
    pub name: &'static str,
    pub title: &'static str,
    pub var_type: &'static str,
    pub readonly: bool,
}

impl Declaration {
    pub fn global(field: &'static str, namespace: &'static str) -> Self {
        Self {
            field,
            global: true,
            namespace,
            var_type: None,
            readonly: false,
            flags: Vec::new(),
            scoped_inputs: Vec::new(),
            attributes: Vec::new(),
            counted: None,
        }
    }

    pub fn lexical(field: &'static str, scoped_inputs: &[&'static str]) -> Self {
        Self {
            global: false,
            scoped_inputs: scoped_inputs.to_vec(),
            ..Self::global(field, "local")
        }
    }

    pub fn of_type(mut self, var_type: &'static str) -> Self {
        self.var_type = Some(var_type);
        self
    }

    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    pub fn flags(mut self, flags: &[&'static str]) -> Self {
        self.flags = flags.to_vec();
        self
    }

    pub fn attributes(mut self, attributes: Vec<AttributeSpec>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn counted(mut self, counted: CountedAttributes) -> Self {
        self.counted = Some(counted);
        self
    }

    /// The attribute tree for a block in mutation state `state`.
    pub fn attributes_for(&self, state: &MutationState) -> Vec<AttributeSpec> {
        let mut attributes = self.attributes.clone();
        if let Some(counted) = &self.counted {
            let count = state
                .option(counted.option)
                .and_then(|raw| raw.trim().parse::<f64>().ok())
                .filter(|n| n.is_finite() && *n > 0.0)
                .map(|n| n as usize)
                .unwrap_or(0);
            for n in 1..=count {
                let number = n.to_string();
                let mut spec = AttributeSpec::new(
                    counted.name.replace('%', &number),
                    counted.title.replace('%', &number),
                    counted.var_type,
                );
                spec.readonly = counted.readonly;
                attributes.push(spec);
            }
        }
        attributes
    }
}

#[derive(Debug, Clone)]
pub struct BlockType {
    pub name: &'static str,
    pub inputs: Vec<InputTemplate>,
    pub fields: Vec<FieldSpec>,
    pub output: Option<Vec<&'static str>>,
    pub previous: bool,
    pub next: bool,
    pub mutation: Option<MutationSchema>,
    pub reference: Option<ReferenceSpec>,
    pub declaration: Option<Declaration>,
}

impl BlockType {
    /// A free-standing block with no connections of its own.
    pub fn top(name: &'static str) -> Self {
        Self {
            name,
            inputs: Vec::new(),
            fields: Vec::new(),
            output: None,
            previous: false,
            next: false,
            mutation: None,
            reference: None,
            declaration: None,
        }
    }

    pub fn statement(name: &'static str) -> Self {
        Self {
            previous: true,
            next: true,
            ..Self::top(name)
        }
    }

    pub fn value(name: &'static str, check: &[&'static str]) -> Self {
        Self {
            output: Some(check.to_vec()),
            ..Self::top(name)
        }
    }

    pub fn input(mut self, template: InputTemplate) -> Self {
        self.inputs.push(template);
        self
    }

    pub fn field(mut self, name: &'static str, default: &'static str) -> Self {
        self.fields.push(FieldSpec {
            name,
            default,
            kind: FieldKind::Text,
        });
        self
    }

    pub fn mutation(mut self, schema: MutationSchema) -> Self {
        self.mutation = Some(schema);
        self
    }

    /// Adds a variable-reference field.
    pub fn references(mut self, field: &'static str, filter: VariableFilter) -> Self {
        self.fields.push(FieldSpec {
            name: field,
            default: "",
            kind: FieldKind::Variable,
        });
        self.reference = Some(ReferenceSpec {
            field,
            filter,
            typed_input: None,
        });
        self
    }

    pub fn typed_input(mut self, input: &'static str) -> Self {
        if let Some(reference) = &mut self.reference {
            reference.typed_input = Some(input);
        }
        self
    }

    pub fn declares(mut self, declaration: Declaration) -> Self {
        self.declaration = Some(declaration);
        self
    }
}

#[derive(Debug, Default, Clone)]
pub struct Catalog {
    types: HashMap<&'static str, BlockType>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, block_type: BlockType) {
        self.types.insert(block_type.name, block_type);
    }

    pub fn get(&self, name: &str) -> Option<&BlockType> {
        self.types.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&BlockType> {
        self.get(name)
            .ok_or_else(|| EditorError::UnknownBlockType(name.to_string()))
    }

    pub fn schema(&self, name: &str) -> Result<&MutationSchema> {
        self.require(name)?
            .mutation
            .as_ref()
            .ok_or_else(|| EditorError::NotMutable(name.to_string()))
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names = self.types.keys().copied().collect::<Vec<_>>();
        names.sort_unstable();
        names
    }

    /// Creates a block of `name` with its base inputs, default fields and
    /// default mutation shape.
    pub fn instantiate(&self, ws: &mut Workspace, name: &str, uid: Option<String>) -> Result<BlockId> {
        let block_type = self.require(name)?;
        let id = ws.create_block(name, uid);
        {
            let block = ws.get_mut(id)?;
            block.output = block_type
                .output
                .as_ref()
                .map(|check| check.iter().map(|c| c.to_string()).collect());
            block.previous = block_type.previous;
            block.next_port = block_type.next;
            for field in &block_type.fields {
                let value = match field.kind {
                    FieldKind::Text => FieldValue::Text(field.default.to_string()),
                    FieldKind::Variable => FieldValue::Variable(VariableRef::unbound(field.default)),
                };
                block.fields.insert(field.name.to_string(), value);
            }
        }
        for template in &block_type.inputs {
            ws.append_input(id, template.instantiate(template.name.to_string()))?;
        }
        if let Some(schema) = &block_type.mutation {
            mutation::reconcile(ws, id, schema, &schema.default_state(), None)?;
        }
        Ok(id)
    }
}

/// Every block type shipped with the editor, with its generator.
pub fn standard_library() -> (Catalog, GeneratorRegistry) {
    let mut catalog = Catalog::new();
    let mut generators = GeneratorRegistry::new();
    logic::register(&mut catalog, &mut generators);
    math::register(&mut catalog, &mut generators);
    text::register(&mut catalog, &mut generators);
    images::register(&mut catalog, &mut generators);
    control::register(&mut catalog, &mut generators);
    variables::register(&mut catalog, &mut generators);
    procedures::register(&mut catalog, &mut generators);
    machines::register(&mut catalog, &mut generators);
    (catalog, generators)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_block_type_has_a_generator() {
        let (catalog, generators) = standard_library();
        for name in catalog.names() {
            assert!(generators.contains(name), "no generator for {}", name);
        }
    }

    #[test]
    fn instantiation_applies_default_mutation() {
        let (catalog, _) = standard_library();
        let mut ws = Workspace::new();
        let join = catalog.instantiate(&mut ws, "text_join", None).unwrap();
        let names = ws
            .get(join)
            .unwrap()
            .inputs()
            .iter()
            .map(|input| input.name.clone())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["ADD0", "ADD1"]);
        assert!(matches!(
            catalog.instantiate(&mut ws, "no_such_block", None),
            Err(EditorError::UnknownBlockType(_))
        ));
    }
}
