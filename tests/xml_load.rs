use octoblocks_core::cli::Args;
use octoblocks_core::codegen::GeneratorOptions;
use octoblocks_core::editor::Editor;
use octoblocks_core::mutation::MutationState;
use octoblocks_core::{generate_from_xml_str, run_cli, xml, EditorError};

const PROTOCOL: &str = r#"<xml xmlns="https://developers.google.com/blockly/xml">
  <block type="controls_run" id="run" x="40" y="200">
    <statement name="STACK">
      <block type="controls_parallel" id="par">
        <mutation stacks="3"/>
        <statement name="STACK2">
          <block type="lexical_variable_set" id="set">
            <field name="VAR">flow</field>
            <value name="VALUE"><block type="math_number"><field name="NUM">2.5</field></block></value>
          </block>
        </statement>
        <next>
          <block type="controls_wait" id="w">
            <comment>settle</comment>
            <value name="TIME"><block type="math_number"><field name="NUM">30</field></block></value>
          </block>
        </next>
      </block>
    </statement>
  </block>
  <block type="global_declaration" id="decl" x="40" y="20">
    <field name="NAME">flow</field>
    <value name="VALUE"><block type="math_number"><field name="NUM">0</field></block></value>
  </block>
</xml>"#;

const EXPECTED: &str = "global_flow = variable(0)\n\nrun(sequence(\n  parallel(\n    set(global_flow, 2.5)\n  ),\n  # settle\n  wait(30)\n))";

#[test]
fn document_loads_forward_references() {
    let editor = xml::load(PROTOCOL).unwrap();
    let set = editor.workspace().find_by_uid("set").unwrap();
    let declaration = editor.workspace().find_by_uid("decl").unwrap();
    assert_eq!(
        editor.scope().referenced_variable(set),
        editor.variables().declared_by(declaration)
    );
    assert_eq!(
        editor.generate(&GeneratorOptions::default()).unwrap(),
        EXPECTED
    );
}

#[test]
fn document_and_built_tree_generate_the_same_code() {
    let mut editor = Editor::new();
    let declaration = editor.create_block("global_declaration", None).unwrap();
    editor.set_field(declaration, "NAME", "flow").unwrap();
    editor.set_position(declaration, 40.0, 20.0).unwrap();
    let zero = editor.create_block("math_number", None).unwrap();
    editor.connect_input(declaration, "VALUE", zero).unwrap();

    let run = editor.create_block("controls_run", None).unwrap();
    editor.set_position(run, 40.0, 200.0).unwrap();
    let parallel = editor.create_block("controls_parallel", None).unwrap();
    editor
        .mutate(parallel, &MutationState::default().with_count("stacks", 3))
        .unwrap();
    editor.connect_input(run, "STACK", parallel).unwrap();
    let set = editor.create_block("lexical_variable_set", None).unwrap();
    editor.connect_input(parallel, "STACK2", set).unwrap();
    editor.set_field(set, "VAR", "flow").unwrap();
    let rate = editor.create_block("math_number", None).unwrap();
    editor.set_field(rate, "NUM", "2.5").unwrap();
    editor.connect_input(set, "VALUE", rate).unwrap();
    let wait = editor.create_block("controls_wait", None).unwrap();
    editor.set_comment(wait, Some("settle".to_string())).unwrap();
    let time = editor.create_block("math_number", None).unwrap();
    editor.set_field(time, "NUM", "30").unwrap();
    editor.connect_input(wait, "TIME", time).unwrap();
    editor.connect_next(parallel, wait).unwrap();

    assert_eq!(editor.generate(&GeneratorOptions::default()).unwrap(), EXPECTED);
}

#[test]
fn exported_documents_keep_shape_and_bindings() {
    let editor = xml::load(PROTOCOL).unwrap();
    let exported = xml::to_xml(&editor).unwrap();
    assert!(exported.contains(r#"stacks="3""#), "{}", exported);
    assert!(exported.contains("flow@@flow"), "{}", exported);

    let reloaded = xml::load(&exported).unwrap();
    assert_eq!(
        reloaded.generate(&GeneratorOptions::default()).unwrap(),
        EXPECTED
    );
}

#[test]
fn unknown_fields_and_inputs_are_tolerated() {
    let editor = xml::load(
        r#"<xml>
          <block type="controls_wait" id="w">
            <field name="UNITS">seconds</field>
            <value name="DURATION"><block type="math_number" id="n"><field name="NUM">4</field></block></value>
          </block>
        </xml>"#,
    )
    .unwrap();
    let number = editor.workspace().find_by_uid("n").unwrap();
    assert!(editor.workspace().parent(number).is_none());
    assert_eq!(
        editor.generate(&GeneratorOptions::default()).unwrap(),
        "wait(0)\n\n4\n"
    );
}

#[test]
fn unknown_block_types_fail_the_load() {
    assert_eq!(
        xml::load(r#"<xml><block type="robot_arm"/></xml>"#).unwrap_err(),
        EditorError::UnknownBlockType("robot_arm".to_string())
    );
}

#[test]
fn options_apply_through_the_string_entry_point() {
    let options = octoblocks_core::generator_options(4, None);
    let code = generate_from_xml_str(PROTOCOL, &options).unwrap();
    assert!(code.contains("\n    parallel(\n        set(global_flow, 2.5)\n    ),"), "{}", code);
}

#[test]
fn cli_writes_generated_source() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("protocol.xml");
    let output = dir.path().join("protocol.py");
    std::fs::write(&input, PROTOCOL).unwrap();

    let args = Args {
        input: input.clone(),
        output: Some(output.clone()),
        indent: 2,
        statement_prefix: None,
        list_variables: false,
        verbose: false,
    };
    run_cli(&args).unwrap();
    assert_eq!(std::fs::read_to_string(&output).unwrap(), EXPECTED);

    let missing = Args {
        input: dir.path().join("absent.xml"),
        ..args
    };
    let err = run_cli(&missing).unwrap_err();
    assert!(err.to_string().contains("Input file not found"), "{}", err);
}
