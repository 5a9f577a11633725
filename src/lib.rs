pub mod blocks;
pub mod codegen;
pub mod editor;
pub mod error;
pub mod mutation;
pub mod names;
pub mod scope;
pub mod variables;
pub mod workspace;
pub mod xml;

#[cfg(not(target_arch = "wasm32"))]
pub mod cli;

#[cfg(all(target_arch = "wasm32", feature = "wasm-bindings"))]
pub mod wasm;

use anyhow::{Context, Result};
use codegen::GeneratorOptions;
use editor::Editor;
use std::path::{Path, PathBuf};
use variables::{ScopeId, VarId, VariableRegistry};

pub use error::EditorError;

#[cfg(not(target_arch = "wasm32"))]
pub fn run_cli(args: &cli::Args) -> Result<()> {
    let total_stages = 3 + usize::from(args.output.is_some());
    let progress = CliProgress::new("Generate", total_stages);
    let mut stage = 0usize;

    stage += 1;
    progress.emit(stage, "Resolving input path");
    let input = canonicalize_file(&args.input)?;

    stage += 1;
    progress.emit(stage, "Loading workspace document");
    let text = std::fs::read_to_string(&input)
        .with_context(|| format!("Failed to read '{}'.", input.display()))?;
    let editor = xml::load(&text).with_context(|| format!("Failed to load '{}'.", input.display()))?;

    if args.list_variables {
        for line in variable_listing(editor.variables()) {
            println!("{}", line);
        }
    }

    stage += 1;
    progress.emit(stage, "Generating octo source");
    let options = generator_options(args.indent, args.statement_prefix.clone());
    let code = editor.generate(&options)?;

    match &args.output {
        Some(output) => {
            stage += 1;
            progress.emit(stage, "Writing output");
            std::fs::write(output, code.as_bytes())
                .with_context(|| format!("Failed to write '{}'.", output.display()))?;
        }
        None if !args.list_variables => print!("{}", code),
        None => {}
    }
    Ok(())
}

pub fn generator_options(indent: usize, statement_prefix: Option<String>) -> GeneratorOptions {
    GeneratorOptions {
        indent: " ".repeat(indent),
        statement_prefix,
    }
}

/// Loads an XML workspace document and generates its program.
pub fn generate_from_xml_str(text: &str, options: &GeneratorOptions) -> Result<String> {
    let editor: Editor = xml::load(text)?;
    Ok(editor.generate(options)?)
}

/// One line per global variable and attribute, indented by depth:
/// `path  [type, readonly]`.
pub fn variable_listing(vars: &VariableRegistry) -> Vec<String> {
    let mut lines = Vec::new();
    for id in vars.in_scope(ScopeId::Global) {
        list_variable(vars, *id, 0, &mut lines);
    }
    lines
}

fn list_variable(vars: &VariableRegistry, id: VarId, depth: usize, lines: &mut Vec<String>) {
    let Some(variable) = vars.get(id) else {
        return;
    };
    let mut tags = Vec::new();
    if let Some(ty) = &variable.var_type {
        tags.push(ty.clone());
    }
    if variable.readonly {
        tags.push("readonly".to_string());
    }
    if let Some(unit) = &variable.unit {
        tags.push(unit.clone());
    }
    let tags = if tags.is_empty() {
        String::new()
    } else {
        format!("  [{}]", tags.join(", "))
    };
    lines.push(format!("{}{}{}", "  ".repeat(depth), vars.path(id), tags));
    for attribute in variable.attributes() {
        list_variable(vars, *attribute, depth + 1, lines);
    }
}

pub fn canonicalize_file(path: &Path) -> Result<PathBuf> {
    if !path.exists() || !path.is_file() {
        return Err(anyhow::anyhow!("Input file not found: '{}'.", path.display()));
    }
    Ok(path.canonicalize()?)
}

#[cfg(not(target_arch = "wasm32"))]
struct CliProgress {
    prefix: &'static str,
    total: usize,
}

#[cfg(not(target_arch = "wasm32"))]
impl CliProgress {
    fn new(prefix: &'static str, total: usize) -> Self {
        Self {
            prefix,
            total: total.max(1),
        }
    }

    fn emit(&self, step: usize, label: &str) {
        let step = step.clamp(1, self.total);
        let bar = render_progress_bar(step, self.total, 14);
        eprintln!(
            "[{}] {}... ({}/{}) {}",
            self.prefix, label, step, self.total, bar
        );
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn render_progress_bar(step: usize, total: usize, width: usize) -> String {
    let width = width.max(1);
    let filled = ((step * width) + (total / 2)) / total;
    let mut s = String::with_capacity(width + 2);
    s.push('[');
    for i in 0..width {
        s.push(if i < filled { '=' } else { '-' });
    }
    s.push(']');
    s
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    #[test]
    fn progress_bar_rounds_to_nearest_cell() {
        assert_eq!(render_progress_bar(1, 4, 8), "[==------]");
        assert_eq!(render_progress_bar(4, 4, 8), "[========]");
    }

    #[test]
    fn listing_indents_attributes() {
        let editor = xml::load(
            r#"<xml><block type="machine_mt_sics_balance" id="b"><field name="NAME">scale</field></block></xml>"#,
        )
        .unwrap();
        let lines = variable_listing(editor.variables());
        assert_eq!(lines[0], "scale  [component, readonly]");
        assert_eq!(lines[1], "  scale::status  [String, readonly]");
        assert_eq!(lines.len(), 3);
    }
}
