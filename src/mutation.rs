use crate::error::{EditorError, Result};
use crate::workspace::{BlockId, InputTemplate, Workspace};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashMap;
use xmltree::Element;

/// Desired (or recorded) child per clause input name.
pub type ConnectionMap = IndexMap<String, Option<BlockId>>;

/// Persisted attribute bag. Entries equal to their schema default are
/// omitted, so an untouched block persists as an empty record.
pub type MutationRecord = IndexMap<String, MutationValue>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationValue {
    Count(usize),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct MutationPart {
    pub name: &'static str,
    pub default: usize,
    pub counter_start: usize,
    pub inputs: Vec<InputTemplate>,
    pub is_final: bool,
    pub helper: &'static str,
}

impl MutationPart {
    pub fn repeated(name: &'static str, default: usize) -> Self {
        Self {
            name,
            default,
            counter_start: 0,
            inputs: Vec::new(),
            is_final: false,
            helper: name,
        }
    }

    /// A non-repeating clause that is either present once or absent.
    pub fn terminal(name: &'static str) -> Self {
        Self {
            is_final: true,
            ..Self::repeated(name, 0)
        }
    }

    pub fn starting_at(mut self, counter_start: usize) -> Self {
        self.counter_start = counter_start;
        self
    }

    pub fn input(mut self, template: InputTemplate) -> Self {
        self.inputs.push(template);
        self
    }

    pub fn helper(mut self, block_type: &'static str) -> Self {
        self.helper = block_type;
        self
    }

    pub fn input_name(&self, template: &InputTemplate, repetition: usize) -> String {
        if self.is_final {
            template.name.to_string()
        } else {
            format!("{}{}", template.name, self.counter_start + repetition)
        }
    }

    /// Input names for `count` repetitions, repetition-major.
    pub fn input_names(&self, count: usize) -> Vec<String> {
        (0..count)
            .flat_map(|repetition| {
                self.inputs
                    .iter()
                    .map(move |template| self.input_name(template, repetition))
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct MutationOption {
    pub name: &'static str,
    pub default: &'static str,
}

#[derive(Debug, Clone)]
pub struct MutationSchema {
    /// Type of the root block on the clause-editing surface.
    pub container: &'static str,
    pub parts: Vec<MutationPart>,
    pub options: Vec<MutationOption>,
}

impl MutationSchema {
    pub fn new(container: &'static str) -> Self {
        Self {
            container,
            parts: Vec::new(),
            options: Vec::new(),
        }
    }

    pub fn part(mut self, part: MutationPart) -> Self {
        self.parts.push(part);
        self
    }

    pub fn option(mut self, name: &'static str, default: &'static str) -> Self {
        self.options.push(MutationOption { name, default });
        self
    }

    pub fn find_part(&self, name: &str) -> Option<&MutationPart> {
        self.parts.iter().find(|part| part.name == name)
    }

    fn part_for_helper(&self, block_type: &str) -> Option<usize> {
        self.parts.iter().position(|part| part.helper == block_type)
    }

    pub fn default_state(&self) -> MutationState {
        let mut state = MutationState::default();
        for part in &self.parts {
            state.set_count(part.name, part.default);
        }
        for option in &self.options {
            state.set_option(option.name, option.default);
        }
        state
    }

    /// Names of every clause input implied by `state`, in block order.
    pub fn clause_inputs(&self, state: &MutationState) -> Vec<String> {
        self.parts
            .iter()
            .flat_map(|part| part.input_names(state.count(part.name)))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationState {
    entries: IndexMap<String, MutationValue>,
}

impl MutationState {
    pub fn count(&self, part: &str) -> usize {
        match self.entries.get(part) {
            Some(MutationValue::Count(n)) => *n,
            _ => 0,
        }
    }

    pub fn option(&self, name: &str) -> Option<&str> {
        match self.entries.get(name) {
            Some(MutationValue::Text(text)) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn set_count(&mut self, part: &str, count: usize) {
        self.entries
            .insert(part.to_string(), MutationValue::Count(count));
    }

    pub fn set_option(&mut self, name: &str, value: &str) {
        self.entries
            .insert(name.to_string(), MutationValue::Text(value.to_string()));
    }

    pub fn with_count(mut self, part: &str, count: usize) -> Self {
        self.set_count(part, count);
        self
    }

    pub fn with_option(mut self, name: &str, value: &str) -> Self {
        self.set_option(name, value);
        self
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &MutationValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }
}

pub fn serialize(schema: &MutationSchema, state: &MutationState) -> MutationRecord {
    let mut record = MutationRecord::new();
    for part in &schema.parts {
        let count = state.count(part.name);
        if count != part.default {
            record.insert(part.name.to_string(), MutationValue::Count(count));
        }
    }
    for option in &schema.options {
        let value = state.option(option.name).unwrap_or(option.default);
        if value != option.default {
            record.insert(option.name.to_string(), MutationValue::Text(value.to_string()));
        }
    }
    record
}

/// Rebuilds a full state from a possibly partial record. Absent entries take
/// their defaults; counts that do not parse fall back to the default too.
pub fn deserialize(schema: &MutationSchema, record: &MutationRecord) -> MutationState {
    let mut state = schema.default_state();
    for part in &schema.parts {
        match record.get(part.name) {
            Some(MutationValue::Count(n)) => state.set_count(part.name, *n),
            Some(MutationValue::Text(text)) => match text.trim().parse::<usize>() {
                Ok(n) => state.set_count(part.name, n),
                Err(_) => tracing::warn!(
                    part = part.name,
                    value = %text,
                    "ignoring unparsable mutation count"
                ),
            },
            None => {}
        }
    }
    for option in &schema.options {
        match record.get(option.name) {
            Some(MutationValue::Text(text)) => state.set_option(option.name, text),
            Some(MutationValue::Count(n)) => state.set_option(option.name, &n.to_string()),
            None => {}
        }
    }
    state
}

pub fn record_to_json(record: &MutationRecord) -> Value {
    let mut map = Map::new();
    for (name, value) in record {
        let value = match value {
            MutationValue::Count(n) => Value::from(*n),
            MutationValue::Text(text) => Value::String(text.clone()),
        };
        map.insert(name.clone(), value);
    }
    Value::Object(map)
}

pub fn record_from_json(value: &Value) -> Result<MutationRecord> {
    let object = value.as_object().ok_or_else(|| {
        EditorError::Document(format!("mutation must be a JSON object, got {}", value))
    })?;
    let mut record = MutationRecord::new();
    for (name, value) in object {
        let entry = match value {
            Value::Null => continue,
            Value::Number(n) => match n.as_u64() {
                Some(n) => MutationValue::Count(n as usize),
                None => MutationValue::Text(n.to_string()),
            },
            Value::String(text) => MutationValue::Text(text.clone()),
            other => MutationValue::Text(other.to_string()),
        };
        record.insert(name.clone(), entry);
    }
    Ok(record)
}

/// `<mutation a="1" b="x"/>`, or nothing for an all-default record.
pub fn record_to_xml(record: &MutationRecord) -> Option<Element> {
    if record.is_empty() {
        return None;
    }
    let mut element = Element::new("mutation");
    for (name, value) in record {
        let text = match value {
            MutationValue::Count(n) => n.to_string(),
            MutationValue::Text(text) => text.clone(),
        };
        element.attributes.insert(name.clone(), text);
    }
    Some(element)
}

pub fn record_from_xml(element: &Element) -> MutationRecord {
    element
        .attributes
        .iter()
        .map(|(name, value)| (name.clone(), MutationValue::Text(value.clone())))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Children detached because their input was removed.
    pub orphaned: Vec<BlockId>,
    pub disconnected: Vec<String>,
    pub connected: Vec<String>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.disconnected.is_empty()
            && self.connected.is_empty()
    }
}

/// Rejects a target state before anything on the block is touched.
pub fn validate(schema: &MutationSchema, block_type: &str, state: &MutationState) -> Result<()> {
    for (name, _) in state.entries() {
        let known = schema.find_part(name).is_some()
            || schema.options.iter().any(|option| option.name == name);
        if !known {
            return Err(EditorError::UnknownMutationEntry {
                block_type: block_type.to_string(),
                entry: name.to_string(),
            });
        }
    }
    for part in schema.parts.iter().filter(|part| part.is_final) {
        let count = state.count(part.name);
        if count > 1 {
            return Err(EditorError::DuplicateTerminalClause {
                block_type: block_type.to_string(),
                part: part.name.to_string(),
                count,
            });
        }
    }
    Ok(())
}

/// Reshapes `block` so its clause inputs match `target`. Entries missing from
/// `target` keep their current value. With `connections`, inputs whose
/// desired child differs from the recorded one are first all disconnected,
/// then connected, so a subtree can move between inputs of the same block.
pub fn reconcile(
    ws: &mut Workspace,
    block: BlockId,
    schema: &MutationSchema,
    target: &MutationState,
    connections: Option<&ConnectionMap>,
) -> Result<ReconcileReport> {
    let (block_type, current) = {
        let b = ws.get(block)?;
        (b.block_type.clone(), b.mutation.clone())
    };
    validate(schema, &block_type, target)?;

    let mut next = current.clone();
    for (name, value) in target.entries() {
        match value {
            MutationValue::Count(n) => next.set_count(name, *n),
            MutationValue::Text(text) => next.set_option(name, text),
        }
    }

    let mut report = ReconcileReport::default();
    for (index, part) in schema.parts.iter().enumerate() {
        let have = current.count(part.name);
        let want = next.count(part.name);
        if want > have {
            let later = schema.parts[index + 1..]
                .iter()
                .flat_map(|later| later.input_names(current.count(later.name)))
                .collect::<Vec<_>>();
            for repetition in have..want {
                for template in &part.inputs {
                    let name = part.input_name(template, repetition);
                    let inputs = ws.get(block)?.inputs();
                    let position = inputs
                        .iter()
                        .position(|input| later.contains(&input.name))
                        .unwrap_or(inputs.len());
                    ws.insert_input(block, position, template.instantiate(name.clone()))?;
                    report.added.push(name);
                }
            }
        } else {
            for repetition in (want..have).rev() {
                for template in part.inputs.iter().rev() {
                    let name = part.input_name(template, repetition);
                    if ws.input(block, &name).is_none() {
                        continue;
                    }
                    if let Some(child) = ws.remove_input(block, &name)? {
                        report.orphaned.push(child);
                    }
                    report.removed.push(name);
                }
            }
        }
    }
    ws.get_mut(block)?.mutation = next.clone();

    let clause_inputs = schema.clause_inputs(&next);
    if let Some(desired) = connections {
        let mut pending = Vec::new();
        for name in &clause_inputs {
            let wanted = desired.get(name).copied().flatten();
            let before = ws.get(block)?.recorded.get(name).copied().flatten();
            if wanted == before {
                continue;
            }
            if let Some(child) = ws.input_target(block, name) {
                ws.disconnect(child)?;
                report.disconnected.push(name.clone());
            }
            pending.push((name.clone(), wanted));
        }
        for (name, wanted) in pending {
            let Some(child) = wanted else {
                continue;
            };
            if !ws.contains(child) {
                tracing::warn!(block = %block, input = %name, child = %child, "skipping deleted clause child");
                continue;
            }
            ws.connect_input(block, &name, child)?;
            report.connected.push(name);
        }
    }
    record_connections(ws, block, &clause_inputs)?;

    if !report.is_noop() {
        tracing::debug!(
            block = %block,
            block_type = %block_type,
            added = report.added.len(),
            removed = report.removed.len(),
            disconnected = report.disconnected.len(),
            connected = report.connected.len(),
            "reshaped block"
        );
    }
    Ok(report)
}

fn record_connections(ws: &mut Workspace, block: BlockId, clause_inputs: &[String]) -> Result<()> {
    let recorded = clause_inputs
        .iter()
        .map(|name| (name.clone(), ws.input_target(block, name)))
        .collect::<ConnectionMap>();
    ws.get_mut(block)?.recorded = recorded;
    Ok(())
}

/// True when the inputs present on `block` are exactly those its mutation
/// state implies.
pub fn check_shape(ws: &Workspace, block: BlockId, schema: &MutationSchema) -> Result<bool> {
    let b = ws.get(block)?;
    let state = b.mutation();
    for part in &schema.parts {
        let expected = part.input_names(state.count(part.name));
        if expected.iter().any(|name| b.input(name).is_none()) {
            return Ok(false);
        }
        for input in b.inputs() {
            if expected.contains(&input.name) {
                continue;
            }
            let belongs = part.inputs.iter().any(|template| {
                if part.is_final {
                    input.name == template.name
                } else {
                    input.name
                        .strip_prefix(template.name)
                        .and_then(|digits| digits.parse::<usize>().ok())
                        .is_some_and(|index| index >= part.counter_start)
                }
            });
            if belongs {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

/// Auxiliary editing surface for a mutable block: a container with one
/// helper block per clause. Helpers remember which children the clause they
/// stand for held, so reordering helpers moves the children with them.
#[derive(Debug)]
pub struct ClauseEditor {
    block: BlockId,
    block_type: String,
    base: MutationState,
    workspace: Workspace,
    root: BlockId,
    links: HashMap<BlockId, Vec<Option<BlockId>>>,
}

impl ClauseEditor {
    pub fn open(ws: &mut Workspace, block: BlockId, schema: &MutationSchema) -> Result<Self> {
        let (block_type, state) = {
            let b = ws.get(block)?;
            (b.block_type.clone(), b.mutation.clone())
        };
        let mut aux = Workspace::new();
        let root = aux.create_block(schema.container, None);
        aux.append_input(root, InputTemplate::statement("STACK").instantiate("STACK".into()))?;

        let mut tail = None;
        for part in &schema.parts {
            for _ in 0..state.count(part.name) {
                let helper = new_helper(&mut aux, part);
                match tail {
                    None => aux.connect_input(root, "STACK", helper)?,
                    Some(previous) => aux.connect_next(previous, helper)?,
                }
                tail = Some(helper);
            }
        }

        let mut editor = Self {
            block,
            block_type,
            base: state,
            workspace: aux,
            root,
            links: HashMap::new(),
        };
        editor.sync(ws, schema)?;
        Ok(editor)
    }

    pub fn block(&self) -> BlockId {
        self.block
    }

    pub fn root(&self) -> BlockId {
        self.root
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn workspace_mut(&mut self) -> &mut Workspace {
        &mut self.workspace
    }

    pub fn helpers(&self) -> Vec<BlockId> {
        self.workspace
            .input_target(self.root, "STACK")
            .map(|head| self.workspace.chain(head))
            .unwrap_or_default()
    }

    /// Re-reads the main block's clause children into the helpers, in chain
    /// order, and records them as the block's current connections.
    pub fn sync(&mut self, ws: &mut Workspace, schema: &MutationSchema) -> Result<()> {
        let state = ws.get(self.block)?.mutation.clone();
        let mut seen = vec![0usize; schema.parts.len()];
        self.links.clear();
        for helper in self.helpers() {
            let index = self.part_index(schema, helper)?;
            let part = &schema.parts[index];
            let repetition = seen[index];
            seen[index] += 1;
            let targets = part
                .inputs
                .iter()
                .map(|template| {
                    if repetition < state.count(part.name) {
                        ws.input_target(self.block, &part.input_name(template, repetition))
                    } else {
                        None
                    }
                })
                .collect();
            self.links.insert(helper, targets);
        }
        record_connections(ws, self.block, &schema.clause_inputs(&state))?;
        self.base = state;
        Ok(())
    }

    /// Adds a helper for `part` at the end of the list, ahead of a trailing
    /// terminal clause.
    pub fn append_helper(&mut self, schema: &MutationSchema, part: &str) -> Result<BlockId> {
        let index = schema
            .parts
            .iter()
            .position(|p| p.name == part)
            .ok_or_else(|| EditorError::UnknownMutationEntry {
                block_type: self.block_type.clone(),
                entry: part.to_string(),
            })?;
        let part = &schema.parts[index];
        let helpers = self.helpers();
        let trailing_final = helpers
            .last()
            .copied()
            .filter(|last| !self.workspace.block(*last).is_some_and(|b| b.next_port));
        if part.is_final && trailing_final.is_some() {
            return Err(EditorError::DuplicateTerminalClause {
                block_type: self.block_type.clone(),
                part: part.name.to_string(),
                count: 2,
            });
        }

        let helper = new_helper(&mut self.workspace, part);
        let anchor = match trailing_final {
            Some(_) => helpers.len().checked_sub(2).map(|i| helpers[i]),
            None => helpers.last().copied(),
        };
        match anchor {
            Some(previous) => self.workspace.connect_next(previous, helper)?,
            None => self.workspace.connect_input(self.root, "STACK", helper)?,
        }
        Ok(helper)
    }

    pub fn remove_helper(&mut self, helper: BlockId) -> Result<()> {
        self.workspace.dispose(helper, true)?;
        self.links.remove(&helper);
        Ok(())
    }

    /// Moves `helper` to `position` in the list. An order that puts a
    /// terminal helper ahead of another one is refused and leaves the list
    /// as it was.
    pub fn move_helper(&mut self, helper: BlockId, position: usize) -> Result<()> {
        let mut order = self.helpers();
        if !order.contains(&helper) {
            return Err(EditorError::UnknownBlock(helper));
        }
        order.retain(|h| *h != helper);
        order.insert(position.min(order.len()), helper);
        for pair in order.windows(2) {
            let previous = self.workspace.get(pair[0])?;
            if !previous.next_port {
                return Err(EditorError::ConnectionRefused {
                    child: pair[1],
                    reason: format!("'{}' has no next connection", previous.block_type),
                });
            }
        }
        for h in &order {
            self.workspace.disconnect(*h)?;
        }
        let mut tail = None;
        for h in order {
            match tail {
                None => self.workspace.connect_input(self.root, "STACK", h)?,
                Some(previous) => self.workspace.connect_next(previous, h)?,
            }
            tail = Some(h);
        }
        Ok(())
    }

    /// Reads the helper list back into a state and a desired connection map.
    pub fn collapse(&self, schema: &MutationSchema) -> Result<(MutationState, ConnectionMap)> {
        let mut counts = vec![0usize; schema.parts.len()];
        let mut connections = ConnectionMap::new();
        for helper in self.helpers() {
            let index = self.part_index(schema, helper)?;
            let part = &schema.parts[index];
            let repetition = counts[index];
            counts[index] += 1;
            let targets = self.links.get(&helper);
            for (slot, template) in part.inputs.iter().enumerate() {
                let target = targets.and_then(|t| t.get(slot).copied().flatten());
                connections.insert(part.input_name(template, repetition), target);
            }
        }
        let mut state = self.base.clone();
        for (part, count) in schema.parts.iter().zip(counts) {
            state.set_count(part.name, count);
        }
        Ok((state, connections))
    }

    fn part_index(&self, schema: &MutationSchema, helper: BlockId) -> Result<usize> {
        let helper_type = &self.workspace.get(helper)?.block_type;
        schema
            .part_for_helper(helper_type)
            .ok_or_else(|| EditorError::UnknownHelperBlock {
                block_type: self.block_type.clone(),
                helper: helper_type.clone(),
            })
    }
}

fn new_helper(aux: &mut Workspace, part: &MutationPart) -> BlockId {
    let helper = aux.create_block(part.helper, None);
    if let Ok(block) = aux.get_mut(helper) {
        block.previous = true;
        block.next_port = !part.is_final;
    }
    helper
}

#[cfg(test)]
mod tests {
    use super::*;

    fn branching_schema() -> MutationSchema {
        MutationSchema::new("branch_container")
            .part(
                MutationPart::repeated("branch", 1)
                    .helper("branch_item")
                    .input(InputTemplate::value("BRANCH")),
            )
            .part(
                MutationPart::terminal("otherwise")
                    .helper("otherwise_item")
                    .input(InputTemplate::statement("OTHERWISE")),
            )
    }

    #[test]
    fn default_state_serializes_to_empty_record() {
        let schema = branching_schema();
        assert!(serialize(&schema, &schema.default_state()).is_empty());
        assert!(record_to_xml(&MutationRecord::new()).is_none());
    }

    #[test]
    fn deserialize_fills_defaults_and_tolerates_garbage() {
        let schema = branching_schema();
        let mut record = MutationRecord::new();
        record.insert("otherwise".into(), MutationValue::Text("1".into()));
        let state = deserialize(&schema, &record);
        assert_eq!(state.count("branch"), 1);
        assert_eq!(state.count("otherwise"), 1);

        record.insert("branch".into(), MutationValue::Text("lots".into()));
        assert_eq!(deserialize(&schema, &record).count("branch"), 1);
    }

    #[test]
    fn round_trip_through_json_and_xml() {
        let schema = branching_schema().option("mode", "fast");
        let state = schema
            .default_state()
            .with_count("branch", 4)
            .with_option("mode", "slow");
        let record = serialize(&schema, &state);

        let json = record_from_json(&record_to_json(&record)).unwrap();
        assert_eq!(deserialize(&schema, &json), state);

        let xml = record_to_xml(&record).unwrap();
        assert_eq!(xml.attributes.get("branch").map(String::as_str), Some("4"));
        assert_eq!(deserialize(&schema, &record_from_xml(&xml)), state);
    }

    #[test]
    fn validation_rejects_duplicate_terminal_and_unknown_entries() {
        let schema = branching_schema();
        let doubled = schema.default_state().with_count("otherwise", 2);
        assert!(matches!(
            validate(&schema, "t", &doubled),
            Err(EditorError::DuplicateTerminalClause { count: 2, .. })
        ));
        let unknown = schema.default_state().with_count("mystery", 1);
        assert!(matches!(
            validate(&schema, "t", &unknown),
            Err(EditorError::UnknownMutationEntry { .. })
        ));
    }

    #[test]
    fn input_names_honour_counter_start() {
        let part = MutationPart::repeated("elseif", 0)
            .starting_at(1)
            .input(InputTemplate::value("IF"))
            .input(InputTemplate::statement("DO"));
        assert_eq!(part.input_names(2), vec!["IF1", "DO1", "IF2", "DO2"]);
    }
}
