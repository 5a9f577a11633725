use crate::blocks::Catalog;
use crate::error::{EditorError, Result};
use crate::mutation::MutationState;
use crate::names::{NameDb, NameKind};
use crate::scope::ScopeContext;
use crate::variables::{VarId, VariableRegistry};
use crate::workspace::{Block, BlockId, InputKind, Workspace};
use indexmap::IndexMap;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

pub const FUNCTION_NAME_PLACEHOLDER: &str = "{{FUNCTION_NAME}}";
const UNRESOLVED_NAME: &str = "_";

static IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(from\s+\S+\s+)?import\s+\S+").expect("import regex"));
static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\n+").expect("blank run regex"));
static LEADING_BLANK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s+\n").expect("leading regex"));
static TRAILING_BLANK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s+$").expect("trailing regex"));
static TRAILING_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+\n").expect("space regex"));

/// Binding strength of an emitted expression. Lower binds tighter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Order(u8);

impl Order {
    pub const ATOMIC: Order = Order(0);
    pub const COLLECTION: Order = Order(1);
    pub const STRING_CONVERSION: Order = Order(1);
    pub const MEMBER: Order = Order(2);
    pub const FUNCTION_CALL: Order = Order(2);
    pub const EXPONENTIATION: Order = Order(3);
    pub const UNARY_SIGN: Order = Order(4);
    pub const BITWISE_NOT: Order = Order(4);
    pub const MULTIPLICATIVE: Order = Order(5);
    pub const ADDITIVE: Order = Order(6);
    pub const BITWISE_SHIFT: Order = Order(7);
    pub const BITWISE_AND: Order = Order(8);
    pub const BITWISE_XOR: Order = Order(9);
    pub const BITWISE_OR: Order = Order(10);
    pub const RELATIONAL: Order = Order(11);
    pub const LOGICAL_NOT: Order = Order(12);
    pub const LOGICAL_AND: Order = Order(13);
    pub const LOGICAL_OR: Order = Order(14);
    pub const CONDITIONAL: Order = Order(15);
    pub const LAMBDA: Order = Order(16);
    pub const NONE: Order = Order(99);

    pub fn value(self) -> u8 {
        self.0
    }

    /// Whether code of order `inner` must be wrapped to sit in a slot that
    /// requires `self`. Equal orders and the ATOMIC/NONE sentinels never wrap.
    pub fn needs_parens(self, inner: Order) -> bool {
        self <= inner && self != inner && self != Order::ATOMIC && self != Order::NONE
    }
}

/// What a generator produced for one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generated {
    Statement(String),
    Expression(String, Order),
    /// The generator registered its output as a definition itself.
    Handled,
}

pub type GeneratorFn = fn(&mut CodeGenerator<'_>, BlockId) -> Result<Generated>;

#[derive(Debug, Default, Clone)]
pub struct GeneratorRegistry {
    generators: HashMap<&'static str, GeneratorFn>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, block_type: &'static str, generator: GeneratorFn) {
        self.generators.insert(block_type, generator);
    }

    pub fn get(&self, block_type: &str) -> Option<GeneratorFn> {
        self.generators.get(block_type).copied()
    }

    pub fn contains(&self, block_type: &str) -> bool {
        self.generators.contains_key(block_type)
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    pub indent: String,
    /// Emitted before every statement; `%1` becomes the quoted block id.
    pub statement_prefix: Option<String>,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            indent: "  ".to_string(),
            statement_prefix: None,
        }
    }
}

/// State of one generation pass over a workspace.
pub struct CodeGenerator<'a> {
    workspace: &'a Workspace,
    catalog: &'a Catalog,
    variables: &'a VariableRegistry,
    registry: &'a GeneratorRegistry,
    options: &'a GeneratorOptions,
    names: NameDb,
    definitions: IndexMap<String, String>,
    function_names: HashMap<String, String>,
    lexical_names: HashMap<VarId, String>,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(
        workspace: &'a Workspace,
        catalog: &'a Catalog,
        variables: &'a VariableRegistry,
        registry: &'a GeneratorRegistry,
        options: &'a GeneratorOptions,
    ) -> Self {
        Self {
            workspace,
            catalog,
            variables,
            registry,
            options,
            names: NameDb::new(),
            definitions: IndexMap::new(),
            function_names: HashMap::new(),
            lexical_names: HashMap::new(),
        }
    }

    fn init(&mut self) {
        self.names.reset();
        self.definitions.clear();
        self.function_names.clear();
        self.lexical_names.clear();
    }

    pub fn workspace(&self) -> &'a Workspace {
        self.workspace
    }

    pub fn variables(&self) -> &'a VariableRegistry {
        self.variables
    }

    pub fn scope(&self) -> ScopeContext<'a> {
        ScopeContext::new(self.workspace, self.catalog, self.variables)
    }

    pub fn options(&self) -> &'a GeneratorOptions {
        self.options
    }

    pub fn block(&self, id: BlockId) -> Result<&'a Block> {
        self.workspace.get(id)
    }

    pub fn mutation(&self, id: BlockId) -> Result<&'a MutationState> {
        Ok(self.block(id)?.mutation())
    }

    pub fn field(&self, id: BlockId, name: &str) -> Result<&'a str> {
        self.block(id)?
            .field_text(name)
            .ok_or_else(|| EditorError::UnknownField {
                block: id,
                field: name.to_string(),
            })
    }

    pub fn field_or(&self, id: BlockId, name: &str, default: &'a str) -> &'a str {
        self.block(id)
            .ok()
            .and_then(|block| block.field_text(name))
            .unwrap_or(default)
    }

    /// Runs the generator registered for `id` and checks that its output
    /// matches the block's shape.
    pub fn generate(&mut self, id: BlockId) -> Result<Generated> {
        let block = self.block(id)?;
        let generator = self
            .registry
            .get(&block.block_type)
            .ok_or_else(|| EditorError::UnsupportedBlock(block.block_type.clone()))?;
        let generated = generator(self, id)?;
        match (&generated, block.is_value()) {
            (Generated::Statement(_), true) => Err(EditorError::MalformedOutput {
                block_type: block.block_type.clone(),
                reason: "expecting an expression and order from a value block".to_string(),
            }),
            (Generated::Expression(..), false) => Err(EditorError::MalformedOutput {
                block_type: block.block_type.clone(),
                reason: "expecting code from a statement block".to_string(),
            }),
            _ => Ok(generated),
        }
    }

    /// Code of the expression plugged into `input`, parenthesized when the
    /// context binds tighter than the expression. `None` when nothing (or a
    /// disabled block) is connected.
    pub fn value_of(&mut self, id: BlockId, input: &str, context: Order) -> Result<Option<String>> {
        let Some(target) = self.workspace.input_target(id, input) else {
            return Ok(None);
        };
        if self.block(target)?.disabled {
            return Ok(None);
        }
        match self.generate(target)? {
            Generated::Expression(code, _) if code.is_empty() => Ok(None),
            Generated::Expression(code, inner) if context.needs_parens(inner) => {
                Ok(Some(format!("({})", code)))
            }
            Generated::Expression(code, _) => Ok(Some(code)),
            Generated::Statement(_) | Generated::Handled => Ok(None),
        }
    }

    pub fn value_or(&mut self, id: BlockId, input: &str, context: Order, default: &str) -> Result<String> {
        Ok(self
            .value_of(id, input, context)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// One code fragment per enabled block of the chain plugged into
    /// `input`, each preceded by its comments.
    pub fn statements_of(&mut self, id: BlockId, input: &str) -> Result<Vec<String>> {
        match self.workspace.input_target(id, input) {
            Some(head) => self.statement_chain(head),
            None => Ok(Vec::new()),
        }
    }

    pub fn statement_chain(&mut self, head: BlockId) -> Result<Vec<String>> {
        let mut fragments = Vec::new();
        for id in self.workspace.chain(head) {
            let block = self.block(id)?;
            if block.disabled {
                continue;
            }
            let code = match self.generate(id)? {
                Generated::Statement(code) => code,
                Generated::Handled => continue,
                Generated::Expression(..) => {
                    return Err(EditorError::MalformedOutput {
                        block_type: block.block_type.clone(),
                        reason: "expecting code from a statement block".to_string(),
                    });
                }
            };
            if code.is_empty() {
                continue;
            }
            let prefix = self.statement_prefix(id)?.unwrap_or_default();
            fragments.push(format!("{}{}{}", self.comments(id)?, prefix, code));
        }
        Ok(fragments)
    }

    /// The statement input as a single expression, or `None` when empty.
    pub fn statement_code(&mut self, id: BlockId, input: &str) -> Result<Option<String>> {
        let fragments = self.statements_of(id, input)?;
        Ok(self.make_sequence(fragments))
    }

    pub fn statement_or(&mut self, id: BlockId, input: &str, default: &str) -> Result<String> {
        Ok(self
            .statement_code(id, input)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// No fragments: `None`; one: the fragment itself; more: a `sequence(...)`.
    pub fn make_sequence(&self, mut fragments: Vec<String>) -> Option<String> {
        match fragments.len() {
            0 => None,
            1 => fragments.pop(),
            _ => Some(format!(
                "sequence(\n{}\n)",
                self.indent(&fragments.join(",\n"))
            )),
        }
    }

    pub fn indent(&self, text: &str) -> String {
        prefix_lines(text, &self.options.indent)
    }

    pub fn quote(&self, text: &str) -> String {
        quote(text)
    }

    /// The configured statement prefix for `id`, if any.
    pub fn statement_prefix(&self, id: BlockId) -> Result<Option<String>> {
        let Some(prefix) = &self.options.statement_prefix else {
            return Ok(None);
        };
        let uid = &self.block(id)?.uid;
        Ok(Some(prefix.replace("%1", &quote(uid))))
    }

    /// `# ` lines for the block's own comment and the comments of every block
    /// nested in its value inputs. Plugged-in value blocks emit nothing.
    pub fn comments(&self, id: BlockId) -> Result<String> {
        let block = self.block(id)?;
        if block.is_inline() {
            return Ok(String::new());
        }
        let mut out = String::new();
        if let Some(comment) = block.comment.as_deref().filter(|c| !c.is_empty()) {
            out.push_str(&prefix_lines(comment, "# "));
            out.push('\n');
        }
        for input in block.inputs() {
            if input.kind != InputKind::Value {
                continue;
            }
            let Some(child) = input.target() else {
                continue;
            };
            let nested = self
                .workspace
                .descendants(child)
                .into_iter()
                .filter_map(|d| self.workspace.block(d))
                .filter_map(|d| d.comment.as_deref())
                .filter(|c| !c.is_empty())
                .collect::<Vec<_>>();
            if !nested.is_empty() {
                out.push_str(&prefix_lines(&format!("{}\n", nested.join("\n")), "# "));
            }
        }
        Ok(out)
    }

    /// Registers a top-level definition. Re-registering a name replaces the
    /// code but keeps the original position.
    pub fn add_definition(&mut self, name: &str, code: impl Into<String>) {
        self.definitions.insert(name.to_string(), code.into());
    }

    pub fn definitions(&self) -> &IndexMap<String, String> {
        &self.definitions
    }

    /// Defines a helper function once per pass and returns the name it was
    /// given. `{{FUNCTION_NAME}}` in `lines` is replaced with that name.
    pub fn provide_function(&mut self, desired: &str, lines: &[&str]) -> String {
        if let Some(name) = self.function_names.get(desired) {
            return name.clone();
        }
        let name = self.names.get_distinct_name(desired);
        let code = lines.join("\n").replace(FUNCTION_NAME_PLACEHOLDER, &name);
        self.add_definition(desired, code);
        self.function_names.insert(desired.to_string(), name.clone());
        name
    }

    pub fn distinct_name(&mut self, desired: &str) -> String {
        self.names.get_distinct_name(desired)
    }

    pub fn procedure_name(&mut self, name: &str) -> String {
        self.names.get_name(name, NameKind::Procedure)
    }

    /// Identifier for a variable: globals carry their namespace as a prefix,
    /// attributes are reached with `.`.
    pub fn variable_name(&mut self, variable: VarId) -> String {
        let root = self.variables.root_of(variable);
        let Some(owner) = self.variables.get(root) else {
            return UNRESOLVED_NAME.to_string();
        };
        let base = if owner.is_global() {
            let name = self.names.get_name(&owner.name, NameKind::Variable);
            format!("{}_{}", owner.namespace, name)
        } else if let Some(name) = self.lexical_names.get(&root) {
            name.clone()
        } else {
            let name = self.names.get_distinct_name(&owner.name);
            self.lexical_names.insert(root, name.clone());
            name
        };
        let path = self.variables.path(variable);
        let attribute = path
            .split(crate::variables::PATH_SEPARATOR)
            .skip(1)
            .collect::<Vec<_>>();
        if attribute.is_empty() {
            base
        } else {
            format!("{}.{}", base, attribute.join("."))
        }
    }

    /// Identifier for the variable the block's reference field resolves to,
    /// or `_` when it does not resolve.
    pub fn reference_name(&mut self, id: BlockId) -> String {
        match self.scope().referenced_variable(id) {
            Some(variable) => self.variable_name(variable),
            None => UNRESOLVED_NAME.to_string(),
        }
    }

    /// Identifier for the variable declared by `id`.
    pub fn declared_name(&mut self, id: BlockId) -> String {
        match self.variables.declared_by(id) {
            Some(variable) => self.variable_name(variable),
            None => UNRESOLVED_NAME.to_string(),
        }
    }

    /// Source for the whole workspace: every top-level unit in document
    /// order, preceded by the collected imports and definitions.
    pub fn workspace_to_code(&mut self) -> Result<String> {
        self.init();
        let mut units = Vec::new();
        for root in self.workspace.top_blocks() {
            let block = self.block(root)?;
            let unit = if block.is_value() {
                if block.disabled {
                    continue;
                }
                match self.generate(root)? {
                    Generated::Expression(code, _) if !code.is_empty() => {
                        Some(format!("{}{}\n", self.comments(root)?, code))
                    }
                    _ => None,
                }
            } else {
                let fragments = self.statement_chain(root)?;
                self.make_sequence(fragments)
            };
            if let Some(unit) = unit {
                units.push(unit);
            }
        }
        tracing::debug!(
            units = units.len(),
            definitions = self.definitions.len(),
            "generated workspace"
        );
        let code = self.finish(&units.join("\n\n"));
        let code = LEADING_BLANK.replace(&code, "").into_owned();
        let code = TRAILING_BLANK.replace(&code, "\n").into_owned();
        let code = TRAILING_SPACE.replace_all(&code, "\n").into_owned();
        Ok(code)
    }

    /// Prepends imports, then the other definitions, to `code`.
    pub fn finish(&self, code: &str) -> String {
        let (imports, others): (Vec<&String>, Vec<&String>) = self
            .definitions
            .values()
            .partition(|definition| IMPORT.is_match(definition));
        let imports = imports.iter().map(|s| s.as_str()).collect::<Vec<_>>();
        let others = others.iter().map(|s| s.as_str()).collect::<Vec<_>>();
        let all = format!("{}\n\n{}", imports.join("\n"), others.join("\n\n"));
        let collapsed = BLANK_RUNS.replace_all(&all, "\n\n");
        format!("{}\n\n\n{}", collapsed.trim_end_matches('\n'), code)
    }
}

/// Generates source for every top-level block of `workspace`.
pub fn generate(
    workspace: &Workspace,
    catalog: &Catalog,
    variables: &VariableRegistry,
    registry: &GeneratorRegistry,
    options: &GeneratorOptions,
) -> Result<String> {
    CodeGenerator::new(workspace, catalog, variables, registry, options).workspace_to_code()
}

/// Prefixes every line of `text`; a trailing newline is left bare.
pub fn prefix_lines(text: &str, prefix: &str) -> String {
    let mut out = String::with_capacity(text.len() + prefix.len());
    out.push_str(prefix);
    let last = text.len().checked_sub(1);
    for (index, c) in text.char_indices() {
        out.push(c);
        if c == '\n' && Some(index) != last {
            out.push_str(prefix);
        }
    }
    out
}

/// Single-quoted string literal.
pub fn quote(text: &str) -> String {
    let escaped = text
        .replace('\\', "\\\\")
        .replace('\n', "\\\n")
        .replace('%', "\\%")
        .replace('\'', "\\'");
    format!("'{}'", escaped)
}

/// Number literal without a needless fractional part.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
