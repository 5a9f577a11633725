use std::collections::{HashMap, HashSet};

/// Python keywords and builtins plus the names the generated module relies
/// on at runtime.
const RESERVED_WORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "exec", "finally", "for", "from",
    "global", "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "print",
    "raise", "return", "try", "while", "with", "yield", "abs", "all", "any", "bool", "dict",
    "float", "int", "len", "list", "max", "min", "object", "range", "round", "set", "str",
    "sum", "tuple", "type", "math", "random", "sequence", "parallel", "do_if", "loop_while",
    "loop_until", "wait", "wait_until", "log", "run_later", "variable", "with_dependents",
    "tcp", "serial", "dummy", "run", "increment", "decrement", "vapourtec", "knauer", "vici",
    "wpi", "mt", "tracker",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameKind {
    Variable,
    Procedure,
}

/// Maps user-visible names to identifiers that are legal in the generated
/// program and do not collide with reserved words or with each other.
#[derive(Debug, Default, Clone)]
pub struct NameDb {
    reserved: HashSet<String>,
    assigned: HashMap<(NameKind, String), String>,
    taken: HashSet<String>,
}

impl NameDb {
    pub fn new() -> Self {
        let mut db = Self::default();
        db.reserve(RESERVED_WORDS.iter().copied());
        db
    }

    pub fn reserve<'a>(&mut self, words: impl IntoIterator<Item = &'a str>) {
        self.reserved.extend(words.into_iter().map(str::to_string));
    }

    pub fn reset(&mut self) {
        self.assigned.clear();
        self.taken.clear();
    }

    /// Stable identifier for `name`: the same input always yields the same
    /// output until the next reset.
    pub fn get_name(&mut self, name: &str, kind: NameKind) -> String {
        let key = (kind, name.to_string());
        if let Some(existing) = self.assigned.get(&key) {
            return existing.clone();
        }
        let safe = self.get_distinct_name(name);
        self.assigned.insert(key, safe.clone());
        safe
    }

    /// A fresh identifier derived from `name` that nothing else uses.
    pub fn get_distinct_name(&mut self, name: &str) -> String {
        let base = safe_name(name);
        let mut candidate = base.clone();
        let mut suffix = 2usize;
        while self.reserved.contains(&candidate) || self.taken.contains(&candidate) {
            candidate = format!("{}{}", base, suffix);
            suffix += 1;
        }
        self.taken.insert(candidate.clone());
        candidate
    }
}

/// Replaces every character that cannot appear in an identifier.
pub fn safe_name(name: &str) -> String {
    let cleaned = name
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect::<String>();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else if cleaned.starts_with(|c: char| c.is_ascii_digit()) {
        format!("my_{}", cleaned)
    } else {
        cleaned
    }
}
