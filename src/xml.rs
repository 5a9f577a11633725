//! Reading and writing the block editor's XML workspace documents.
//!
//! ```xml
//! <xml>
//!   <block type="controls_if" id="a1" x="10" y="20">
//!     <mutation elseif="1" else="1"/>
//!     <value name="IF0"><block type="logic_boolean"/></value>
//!     <statement name="DO0">...</statement>
//!     <next>...</next>
//!   </block>
//! </xml>
//! ```

use crate::editor::Editor;
use crate::error::{EditorError, Result};
use crate::mutation;
use crate::workspace::{BlockId, InputKind};
use std::io::Cursor;
use xmltree::{Element, EmitterConfig, XMLNode};

/// Loads a document into a fresh editing session.
pub fn load(text: &str) -> Result<Editor> {
    let mut editor = Editor::new();
    load_into(&mut editor, text)?;
    Ok(editor)
}

/// Adds the blocks of a document to `editor`. Returns the top-level blocks
/// created, in document order.
pub fn load_into(editor: &mut Editor, text: &str) -> Result<Vec<BlockId>> {
    let root = Element::parse(Cursor::new(text.as_bytes()))
        .map_err(|e| EditorError::Document(e.to_string()))?;
    if root.name != "xml" {
        return Err(EditorError::Document(format!(
            "expected an <xml> root element, found <{}>",
            root.name
        )));
    }
    let mut roots = Vec::new();
    for element in child_elements(&root) {
        match element.name.as_str() {
            "block" | "shadow" => {
                let id = load_block(editor, element)?;
                let x = number_attribute(element, "x");
                let y = number_attribute(element, "y");
                editor.set_position(id, x, y)?;
                roots.push(id);
            }
            other => tracing::warn!(element = other, "skipping unknown top-level element"),
        }
    }
    // References may name variables declared further down the document.
    let rebound = editor.rebind_all()?;
    tracing::debug!(
        roots = roots.len(),
        blocks = editor.workspace().len(),
        rebound,
        "loaded workspace document"
    );
    Ok(roots)
}

fn load_block(editor: &mut Editor, element: &Element) -> Result<BlockId> {
    let block_type = element
        .attributes
        .get("type")
        .ok_or_else(|| EditorError::Document("<block> without a type attribute".to_string()))?;
    let uid = element.attributes.get("id").cloned();
    let id = editor.create_block(block_type, uid)?;
    if element.attributes.get("disabled").map(String::as_str) == Some("true") {
        editor.set_disabled(id, true)?;
    }

    // The shape has to exist before children are plugged into clause inputs.
    if let Some(mutation) = element.get_child("mutation") {
        if editor.catalog().require(block_type)?.mutation.is_some() {
            editor.deserialize_mutation(id, &mutation::record_from_xml(mutation))?;
        } else {
            tracing::warn!(block_type = %block_type, "ignoring mutation on a fixed-shape block");
        }
    }

    for child in child_elements(element) {
        match child.name.as_str() {
            "field" => {
                let Some(name) = child.attributes.get("name") else {
                    continue;
                };
                let value = child.get_text().unwrap_or_default();
                match editor.set_field(id, name, &value) {
                    Err(EditorError::UnknownField { .. }) => {
                        tracing::warn!(block_type = %block_type, field = %name, "ignoring unknown field");
                    }
                    other => other?,
                }
            }
            "comment" => {
                let text = child.get_text().map(|t| t.into_owned());
                editor.set_comment(id, text.filter(|t| !t.is_empty()))?;
            }
            "value" | "statement" => {
                let Some(name) = child.attributes.get("name") else {
                    continue;
                };
                let Some(nested) = first_block(child) else {
                    continue;
                };
                let target = load_block(editor, nested)?;
                if editor.workspace().input(id, name).is_none() {
                    tracing::warn!(
                        block_type = %block_type,
                        input = %name,
                        "input not present, leaving child at top level"
                    );
                    continue;
                }
                editor.connect_input(id, name, target)?;
            }
            "next" => {
                if let Some(nested) = first_block(child) {
                    let target = load_block(editor, nested)?;
                    editor.connect_next(id, target)?;
                }
            }
            _ => {}
        }
    }
    Ok(id)
}

fn child_elements(element: &Element) -> impl Iterator<Item = &Element> {
    element.children.iter().filter_map(XMLNode::as_element)
}

fn first_block(element: &Element) -> Option<&Element> {
    child_elements(element).find(|e| e.name == "block" || e.name == "shadow")
}

fn number_attribute(element: &Element, name: &str) -> f64 {
    element
        .attributes
        .get(name)
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(0.0)
}

/// Serializes every top-level block of `editor`.
pub fn to_xml(editor: &Editor) -> Result<String> {
    let mut root = Element::new("xml");
    for id in editor.workspace().top_blocks() {
        let mut block = block_element(editor, id)?;
        let (x, y) = editor.workspace().get(id)?.position;
        block.attributes.insert("x".to_string(), x.to_string());
        block.attributes.insert("y".to_string(), y.to_string());
        root.children.push(XMLNode::Element(block));
    }
    let mut out = Vec::new();
    let config = EmitterConfig::new().perform_indent(true);
    root.write_with_config(&mut out, config)
        .map_err(|e| EditorError::Document(e.to_string()))?;
    String::from_utf8(out).map_err(|e| EditorError::Document(e.to_string()))
}

fn block_element(editor: &Editor, id: BlockId) -> Result<Element> {
    let block = editor.workspace().get(id)?;
    let mut element = Element::new("block");
    element
        .attributes
        .insert("type".to_string(), block.block_type.clone());
    element.attributes.insert("id".to_string(), block.uid.clone());
    if block.disabled {
        element
            .attributes
            .insert("disabled".to_string(), "true".to_string());
    }
    if editor.catalog().require(&block.block_type)?.mutation.is_some() {
        if let Some(mutation) = mutation::record_to_xml(&editor.serialize_mutation(id)?) {
            element.children.push(XMLNode::Element(mutation));
        }
    }
    for (name, value) in &block.fields {
        let mut field = Element::new("field");
        field.attributes.insert("name".to_string(), name.clone());
        field.children.push(XMLNode::Text(value.encode()));
        element.children.push(XMLNode::Element(field));
    }
    if let Some(comment) = &block.comment {
        let mut node = Element::new("comment");
        node.children.push(XMLNode::Text(comment.clone()));
        element.children.push(XMLNode::Element(node));
    }
    for input in block.inputs() {
        let Some(target) = input.target() else {
            continue;
        };
        let tag = match input.kind {
            InputKind::Value => "value",
            InputKind::Statement => "statement",
            InputKind::Dummy => continue,
        };
        let mut node = Element::new(tag);
        node.attributes.insert("name".to_string(), input.name.clone());
        node.children
            .push(XMLNode::Element(block_element(editor, target)?));
        element.children.push(XMLNode::Element(node));
    }
    if let Some(next) = block.next() {
        let mut node = Element::new("next");
        node.children.push(XMLNode::Element(block_element(editor, next)?));
        element.children.push(XMLNode::Element(node));
    }
    Ok(element)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_foreign_documents() {
        assert!(matches!(load("<svg/>"), Err(EditorError::Document(_))));
        assert!(matches!(load("<xml><block/></xml>"), Err(EditorError::Document(_))));
        assert!(matches!(load("not xml"), Err(EditorError::Document(_))));
    }

    #[test]
    fn mutation_is_applied_before_children_connect() {
        let editor = load(
            r#"<xml><block type="text_join" id="j"><mutation items="3"/>
                <value name="ADD2"><block type="text" id="t"><field name="TEXT">c</field></block></value>
            </block></xml>"#,
        )
        .unwrap();
        let join = editor.workspace().find_by_uid("j").unwrap();
        let text = editor.workspace().find_by_uid("t").unwrap();
        assert_eq!(editor.workspace().input_target(join, "ADD2"), Some(text));
    }

    #[test]
    fn export_reloads_to_the_same_program() {
        let source = r#"<xml>
            <block type="global_declaration" id="g" x="0" y="0">
              <field name="NAME">speed</field>
              <value name="VALUE"><block type="math_number"><field name="NUM">5</field></block></value>
            </block>
            <block type="controls_run" id="r" x="0" y="100">
              <statement name="STACK">
                <block type="lexical_variable_set">
                  <field name="VAR">speed</field>
                  <value name="VALUE"><block type="math_number"><field name="NUM">7</field></block></value>
                </block>
              </statement>
            </block>
        </xml>"#;
        let first = load(source).unwrap();
        let exported = to_xml(&first).unwrap();
        let second = load(&exported).unwrap();
        let options = Default::default();
        assert_eq!(
            first.generate(&options).unwrap(),
            second.generate(&options).unwrap()
        );
    }
}
