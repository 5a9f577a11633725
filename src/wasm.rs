use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub fn generate_from_xml(document: &str) -> Result<String, JsValue> {
    generate_from_xml_with_options(document, 2, None)
}

#[wasm_bindgen]
pub fn generate_from_xml_with_options(
    document: &str,
    indent: usize,
    statement_prefix: Option<String>,
) -> Result<String, JsValue> {
    let options = crate::generator_options(indent, statement_prefix);
    crate::generate_from_xml_str(document, &options).map_err(|e| JsValue::from_str(&e.to_string()))
}
