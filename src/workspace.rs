use crate::error::{EditorError, Result};
use crate::mutation::MutationState;
use crate::scope::VariableRef;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

/// Stable handle into a [`Workspace`]. Slots are never reused, so an id
/// stays unique (and orders by creation) for the lifetime of the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(usize);

impl BlockId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl Display for BlockId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Value,
    Statement,
    Dummy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    #[default]
    Left,
    Centre,
    Right,
}

/// Declarative description of an input, instantiated when a block is created
/// or when a mutation adds a clause.
#[derive(Debug, Clone, PartialEq)]
pub struct InputTemplate {
    pub name: &'static str,
    pub kind: InputKind,
    pub check: Vec<&'static str>,
    pub label: Option<&'static str>,
    pub align: Align,
}

impl InputTemplate {
    fn new(name: &'static str, kind: InputKind) -> Self {
        Self {
            name,
            kind,
            check: Vec::new(),
            label: None,
            align: Align::Left,
        }
    }

    pub fn value(name: &'static str) -> Self {
        Self::new(name, InputKind::Value)
    }

    pub fn statement(name: &'static str) -> Self {
        Self::new(name, InputKind::Statement)
    }

    pub fn dummy(name: &'static str) -> Self {
        Self::new(name, InputKind::Dummy)
    }

    pub fn check(mut self, type_name: &'static str) -> Self {
        self.check.push(type_name);
        self
    }

    pub fn label(mut self, text: &'static str) -> Self {
        self.label = Some(text);
        self
    }

    pub fn align(mut self, align: Align) -> Self {
        self.align = align;
        self
    }

    pub fn instantiate(&self, name: String) -> Input {
        Input {
            name,
            kind: self.kind,
            check: self.check.iter().map(|c| c.to_string()).collect(),
            label: self.label.map(str::to_string),
            align: self.align,
            target: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Input {
    pub name: String,
    pub kind: InputKind,
    pub check: Vec<String>,
    pub label: Option<String>,
    pub align: Align,
    target: Option<BlockId>,
}

impl Input {
    pub fn target(&self) -> Option<BlockId> {
        self.target
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Variable(VariableRef),
}

impl FieldValue {
    /// Persisted form of the field (`label@@path` for bound references).
    pub fn encode(&self) -> String {
        match self {
            FieldValue::Text(text) => text.clone(),
            FieldValue::Variable(reference) => reference.encode(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parent {
    Input { block: BlockId, input: String },
    Next(BlockId),
}

#[derive(Debug, Clone)]
pub struct Block {
    pub id: BlockId,
    /// Persistent identifier (the document's `id` attribute).
    pub uid: String,
    pub block_type: String,
    pub fields: IndexMap<String, FieldValue>,
    /// `Some(check)` for value-producing blocks.
    pub output: Option<Vec<String>>,
    pub previous: bool,
    pub next_port: bool,
    pub comment: Option<String>,
    pub disabled: bool,
    pub position: (f64, f64),
    inputs: Vec<Input>,
    next: Option<BlockId>,
    parent: Option<Parent>,
    pub(crate) mutation: MutationState,
    pub(crate) recorded: IndexMap<String, Option<BlockId>>,
}

impl Block {
    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn input(&self, name: &str) -> Option<&Input> {
        self.inputs.iter().find(|input| input.name == name)
    }

    pub fn input_index(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|input| input.name == name)
    }

    pub fn next(&self) -> Option<BlockId> {
        self.next
    }

    pub fn parent(&self) -> Option<&Parent> {
        self.parent.as_ref()
    }

    pub fn mutation(&self) -> &MutationState {
        &self.mutation
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn field_text(&self, name: &str) -> Option<&str> {
        match self.fields.get(name)? {
            FieldValue::Text(text) => Some(text.as_str()),
            FieldValue::Variable(reference) => Some(reference.label.as_str()),
        }
    }

    pub fn is_value(&self) -> bool {
        self.output.is_some()
    }

    /// True for value blocks plugged into a parent input.
    pub fn is_inline(&self) -> bool {
        self.output.is_some() && self.parent.is_some()
    }
}

#[derive(Debug, Default, Clone)]
pub struct Workspace {
    blocks: Vec<Option<Block>>,
    uids: HashMap<String, BlockId>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_block(&mut self, block_type: &str, uid: Option<String>) -> BlockId {
        let id = BlockId(self.blocks.len());
        let uid = match uid {
            Some(uid) if !self.uids.contains_key(&uid) => uid,
            _ => self.fresh_uid(),
        };
        self.uids.insert(uid.clone(), id);
        self.blocks.push(Some(Block {
            id,
            uid,
            block_type: block_type.to_string(),
            fields: IndexMap::new(),
            output: None,
            previous: false,
            next_port: false,
            comment: None,
            disabled: false,
            position: (0.0, 0.0),
            inputs: Vec::new(),
            next: None,
            parent: None,
            mutation: MutationState::default(),
            recorded: IndexMap::new(),
        }));
        id
    }

    fn fresh_uid(&self) -> String {
        let mut n = self.blocks.len();
        loop {
            let candidate = format!("b{}", n);
            if !self.uids.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    pub fn contains(&self, id: BlockId) -> bool {
        self.block(id).is_some()
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.0).and_then(Option::as_ref)
    }

    pub fn get(&self, id: BlockId) -> Result<&Block> {
        self.block(id).ok_or(EditorError::UnknownBlock(id))
    }

    pub fn get_mut(&mut self, id: BlockId) -> Result<&mut Block> {
        self.blocks
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(EditorError::UnknownBlock(id))
    }

    pub fn find_by_uid(&self, uid: &str) -> Option<BlockId> {
        self.uids.get(uid).copied()
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter().filter_map(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.blocks().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn append_input(&mut self, id: BlockId, input: Input) -> Result<()> {
        let block = self.get_mut(id)?;
        let index = block.inputs.len();
        insert_unique(block, index, input)
    }

    pub fn insert_input(&mut self, id: BlockId, index: usize, input: Input) -> Result<()> {
        let block = self.get_mut(id)?;
        let index = index.min(block.inputs.len());
        insert_unique(block, index, input)
    }

    /// Removes an input. A connected child is not destroyed: it is detached
    /// and returned as a new top-level root.
    pub fn remove_input(&mut self, id: BlockId, name: &str) -> Result<Option<BlockId>> {
        let target = self
            .get(id)?
            .input(name)
            .ok_or_else(|| EditorError::UnknownInput {
                block: id,
                input: name.to_string(),
            })?
            .target;
        if let Some(child) = target {
            self.unlink(child);
        }
        let block = self.get_mut(id)?;
        block.inputs.retain(|input| input.name != name);
        block.recorded.shift_remove(name);
        Ok(target)
    }

    pub fn input(&self, id: BlockId, name: &str) -> Option<&Input> {
        self.block(id)?.input(name)
    }

    pub fn input_target(&self, id: BlockId, name: &str) -> Option<BlockId> {
        self.input(id, name)?.target
    }

    pub fn set_input_check(&mut self, id: BlockId, name: &str, check: Vec<String>) -> Result<()> {
        let input = self
            .get_mut(id)?
            .inputs
            .iter_mut()
            .find(|input| input.name == name)
            .ok_or_else(|| EditorError::UnknownInput {
                block: id,
                input: name.to_string(),
            })?;
        input.check = check;
        Ok(())
    }

    pub fn next_block(&self, id: BlockId) -> Option<BlockId> {
        self.block(id)?.next
    }

    pub fn parent(&self, id: BlockId) -> Option<&Parent> {
        self.block(id)?.parent.as_ref()
    }

    pub fn parent_block(&self, id: BlockId) -> Option<BlockId> {
        match self.parent(id)? {
            Parent::Input { block, .. } => Some(*block),
            Parent::Next(block) => Some(*block),
        }
    }

    /// The block enclosing `id` through an input, skipping over statement
    /// predecessors, together with the name of that input.
    pub fn surrounding(&self, id: BlockId) -> Option<(BlockId, &str)> {
        let mut current = id;
        loop {
            match self.parent(current)? {
                Parent::Input { block, input } => return Some((*block, input.as_str())),
                Parent::Next(previous) => current = *previous,
            }
        }
    }

    pub fn connect_input(&mut self, parent: BlockId, name: &str, child: BlockId) -> Result<()> {
        let child_block = self.get(child)?;
        let input = self
            .get(parent)?
            .input(name)
            .ok_or_else(|| EditorError::UnknownInput {
                block: parent,
                input: name.to_string(),
            })?;
        match input.kind {
            InputKind::Dummy => {
                return Err(refused(child, format!("input '{}' takes no block", name)));
            }
            InputKind::Value => {
                let Some(output) = &child_block.output else {
                    return Err(refused(
                        child,
                        format!("'{}' has no output for value input '{}'", child_block.block_type, name),
                    ));
                };
                if !checks_compatible(&input.check, output) {
                    return Err(refused(
                        child,
                        format!(
                            "output type {:?} does not match input '{}' check {:?}",
                            output, name, input.check
                        ),
                    ));
                }
            }
            InputKind::Statement => {
                if !child_block.previous {
                    return Err(refused(
                        child,
                        format!("'{}' cannot start a statement chain", child_block.block_type),
                    ));
                }
            }
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(refused(child, "the connection would create a cycle".to_string()));
        }
        let displaced = input.target.filter(|existing| *existing != child);
        let kind = input.kind;

        self.unlink(child);
        if let Some(existing) = displaced {
            self.unlink(existing);
        }
        self.set_input_target(parent, name, Some(child))?;
        self.get_mut(child)?.parent = Some(Parent::Input {
            block: parent,
            input: name.to_string(),
        });
        if let (Some(existing), InputKind::Statement) = (displaced, kind) {
            self.reattach_after_chain(child, existing)?;
        }
        Ok(())
    }

    pub fn connect_next(&mut self, previous: BlockId, child: BlockId) -> Result<()> {
        let previous_block = self.get(previous)?;
        let child_block = self.get(child)?;
        if !previous_block.next_port {
            return Err(refused(
                child,
                format!("'{}' has no next connection", previous_block.block_type),
            ));
        }
        if !child_block.previous {
            return Err(refused(
                child,
                format!("'{}' has no previous connection", child_block.block_type),
            ));
        }
        if self.is_ancestor_or_self(child, previous) {
            return Err(refused(child, "the connection would create a cycle".to_string()));
        }
        let displaced = previous_block.next.filter(|existing| *existing != child);

        self.unlink(child);
        if let Some(existing) = displaced {
            self.unlink(existing);
        }
        self.get_mut(previous)?.next = Some(child);
        self.get_mut(child)?.parent = Some(Parent::Next(previous));
        if let Some(existing) = displaced {
            self.reattach_after_chain(child, existing)?;
        }
        Ok(())
    }

    /// Detaches `child` (with the rest of its statement chain) from its
    /// parent. Returns false when it already was a root.
    pub fn disconnect(&mut self, child: BlockId) -> Result<bool> {
        let was_attached = self.get(child)?.parent.is_some();
        self.unlink(child);
        Ok(was_attached)
    }

    /// Destroys a block and everything plugged into it. With `heal`, the
    /// statements following it take its place in the chain.
    pub fn dispose(&mut self, id: BlockId, heal: bool) -> Result<Vec<BlockId>> {
        let block = self.get(id)?;
        let parent = block.parent.clone();
        let healed = if heal { block.next } else { None };
        if let Some(next) = healed {
            self.unlink(next);
        }
        self.unlink(id);

        let doomed = self.descendants(id);
        for doomed_id in &doomed {
            if let Some(block) = self.blocks.get_mut(doomed_id.0).and_then(Option::take) {
                self.uids.remove(&block.uid);
            }
        }

        if let (Some(next), Some(parent)) = (healed, parent) {
            match parent {
                Parent::Input { block, input } => self.connect_input(block, &input, next)?,
                Parent::Next(previous) => self.connect_next(previous, next)?,
            }
        }
        Ok(doomed)
    }

    /// `id` itself, everything plugged into its inputs, and its statement
    /// successors, depth first.
    pub fn descendants(&self, id: BlockId) -> Vec<BlockId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(block) = self.block(current) else {
                continue;
            };
            out.push(current);
            if let Some(next) = block.next {
                stack.push(next);
            }
            for input in block.inputs.iter().rev() {
                if let Some(target) = input.target {
                    stack.push(target);
                }
            }
        }
        out
    }

    /// Statement chain starting at `head`.
    pub fn chain(&self, head: BlockId) -> Vec<BlockId> {
        let mut out = Vec::new();
        let mut current = Some(head);
        while let Some(id) = current {
            if !self.contains(id) || out.contains(&id) {
                break;
            }
            out.push(id);
            current = self.next_block(id);
        }
        out
    }

    /// Root blocks in document order: top to bottom, then left to right,
    /// then creation order.
    pub fn top_blocks(&self) -> Vec<BlockId> {
        let mut roots = self
            .blocks()
            .filter(|block| block.parent.is_none())
            .collect::<Vec<_>>();
        roots.sort_by(|a, b| {
            a.position
                .1
                .total_cmp(&b.position.1)
                .then(a.position.0.total_cmp(&b.position.0))
                .then(a.id.cmp(&b.id))
        });
        roots.into_iter().map(|block| block.id).collect()
    }

    fn is_ancestor_or_self(&self, candidate: BlockId, of: BlockId) -> bool {
        let mut current = Some(of);
        while let Some(id) = current {
            if id == candidate {
                return true;
            }
            current = self.parent_block(id);
        }
        false
    }

    fn unlink(&mut self, child: BlockId) {
        let Some(parent) = self
            .blocks
            .get_mut(child.0)
            .and_then(Option::as_mut)
            .and_then(|block| block.parent.take())
        else {
            return;
        };
        match parent {
            Parent::Input { block, input } => {
                let _ = self.set_input_target(block, &input, None);
            }
            Parent::Next(previous) => {
                if let Some(previous) = self.blocks.get_mut(previous.0).and_then(Option::as_mut) {
                    previous.next = None;
                }
            }
        }
    }

    fn set_input_target(&mut self, id: BlockId, name: &str, target: Option<BlockId>) -> Result<()> {
        let input = self
            .get_mut(id)?
            .inputs
            .iter_mut()
            .find(|input| input.name == name)
            .ok_or_else(|| EditorError::UnknownInput {
                block: id,
                input: name.to_string(),
            })?;
        input.target = target;
        Ok(())
    }

    fn reattach_after_chain(&mut self, head: BlockId, displaced: BlockId) -> Result<()> {
        let tail = self.chain(head).last().copied().unwrap_or(head);
        let can_attach = self.get(tail)?.next_port && self.get(displaced)?.previous;
        if can_attach {
            self.get_mut(tail)?.next = Some(displaced);
            self.get_mut(displaced)?.parent = Some(Parent::Next(tail));
        }
        Ok(())
    }
}

fn insert_unique(block: &mut Block, index: usize, input: Input) -> Result<()> {
    if block.input(&input.name).is_some() {
        return Err(EditorError::Document(format!(
            "block {} already has an input named '{}'",
            block.id, input.name
        )));
    }
    block.inputs.insert(index, input);
    Ok(())
}

fn checks_compatible(input_check: &[String], output_check: &[String]) -> bool {
    input_check.is_empty()
        || output_check.is_empty()
        || input_check.iter().any(|ty| output_check.contains(ty))
}

fn refused(child: BlockId, reason: String) -> EditorError {
    EditorError::ConnectionRefused { child, reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement(ws: &mut Workspace, ty: &str) -> BlockId {
        let id = ws.create_block(ty, None);
        let block = ws.get_mut(id).unwrap();
        block.previous = true;
        block.next_port = true;
        id
    }

    fn value(ws: &mut Workspace, check: &[&str]) -> BlockId {
        let id = ws.create_block("value", None);
        ws.get_mut(id).unwrap().output = Some(check.iter().map(|c| c.to_string()).collect());
        id
    }

    #[test]
    fn removing_input_orphans_child() {
        let mut ws = Workspace::new();
        let parent = statement(&mut ws, "host");
        ws.append_input(parent, InputTemplate::value("A").instantiate("A".into()))
            .unwrap();
        let child = value(&mut ws, &[]);
        ws.connect_input(parent, "A", child).unwrap();

        let orphan = ws.remove_input(parent, "A").unwrap();
        assert_eq!(orphan, Some(child));
        assert!(ws.contains(child));
        assert!(ws.parent(child).is_none());
        assert!(ws.top_blocks().contains(&child));
    }

    #[test]
    fn type_checks_are_enforced() {
        let mut ws = Workspace::new();
        let parent = statement(&mut ws, "host");
        ws.append_input(
            parent,
            InputTemplate::value("COND").check("Boolean").instantiate("COND".into()),
        )
        .unwrap();
        let number = value(&mut ws, &["Number"]);
        let boolean = value(&mut ws, &["Boolean"]);
        assert!(matches!(
            ws.connect_input(parent, "COND", number),
            Err(EditorError::ConnectionRefused { .. })
        ));
        ws.connect_input(parent, "COND", boolean).unwrap();
    }

    #[test]
    fn connecting_into_own_subtree_is_refused() {
        let mut ws = Workspace::new();
        let outer = statement(&mut ws, "outer");
        ws.append_input(outer, InputTemplate::statement("DO").instantiate("DO".into()))
            .unwrap();
        let inner = statement(&mut ws, "inner");
        ws.append_input(inner, InputTemplate::statement("DO").instantiate("DO".into()))
            .unwrap();
        ws.connect_input(outer, "DO", inner).unwrap();
        assert!(ws.connect_input(inner, "DO", outer).is_err());
    }

    #[test]
    fn inserting_into_chain_keeps_the_tail() {
        let mut ws = Workspace::new();
        let a = statement(&mut ws, "a");
        let b = statement(&mut ws, "b");
        let c = statement(&mut ws, "c");
        ws.connect_next(a, c).unwrap();
        ws.connect_next(a, b).unwrap();
        assert_eq!(ws.chain(a), vec![a, b, c]);
    }

    #[test]
    fn healing_dispose_reconnects_successor() {
        let mut ws = Workspace::new();
        let a = statement(&mut ws, "a");
        let b = statement(&mut ws, "b");
        let c = statement(&mut ws, "c");
        ws.connect_next(a, b).unwrap();
        ws.connect_next(b, c).unwrap();

        let gone = ws.dispose(b, true).unwrap();
        assert_eq!(gone, vec![b]);
        assert_eq!(ws.chain(a), vec![a, c]);
    }

    #[test]
    fn top_blocks_follow_document_order() {
        let mut ws = Workspace::new();
        let low = statement(&mut ws, "low");
        let high = statement(&mut ws, "high");
        let left = statement(&mut ws, "left");
        ws.get_mut(low).unwrap().position = (0.0, 100.0);
        ws.get_mut(high).unwrap().position = (50.0, 10.0);
        ws.get_mut(left).unwrap().position = (0.0, 10.0);
        assert_eq!(ws.top_blocks(), vec![left, high, low]);
    }
}
