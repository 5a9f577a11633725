use octoblocks_core::codegen::GeneratorOptions;
use octoblocks_core::editor::Editor;
use octoblocks_core::scope::{MenuEntry, MenuItem, VariableRef, NO_VARIABLES_MESSAGE};
use octoblocks_core::workspace::{BlockId, FieldValue};

fn reference(editor: &Editor, block: BlockId) -> VariableRef {
    match editor.workspace().get(block).unwrap().field("VAR") {
        Some(FieldValue::Variable(reference)) => reference.clone(),
        other => panic!("expected a reference field, got {:?}", other),
    }
}

fn global(editor: &mut Editor, name: &str) -> BlockId {
    let id = editor.create_block("global_declaration", None).unwrap();
    editor.set_field(id, "NAME", name).unwrap();
    id
}

fn items(menu: &[MenuEntry]) -> Vec<&MenuItem> {
    menu.iter()
        .filter_map(|entry| match entry {
            MenuEntry::Item(item) => Some(item),
            MenuEntry::Separator => None,
        })
        .collect()
}

fn item<'a>(menu: &'a [MenuEntry], text: &str) -> &'a MenuItem {
    items(menu)
        .into_iter()
        .find(|item| item.text == text)
        .unwrap_or_else(|| panic!("no menu item '{}'", text))
}

#[test]
fn rename_updates_every_resolved_reference_and_no_literals() {
    let mut editor = Editor::new();
    let declaration = global(&mut editor, "speed");
    let variable = editor.variables().declared_by(declaration).unwrap();

    let run = editor.create_block("controls_run", None).unwrap();
    let local = editor.create_block("local_declaration_statement", None).unwrap();
    editor.connect_input(run, "STACK", local).unwrap();
    let inner = editor.create_block("lexical_variable_set", None).unwrap();
    editor.connect_input(local, "STACK", inner).unwrap();
    editor.set_field(inner, "VAR", "speed").unwrap();
    let read = editor.create_block("lexical_variable_get", None).unwrap();
    editor.connect_input(inner, "VALUE", read).unwrap();
    editor.set_field(read, "VAR", "speed").unwrap();
    let outer = editor.create_block("lexical_variable_set", None).unwrap();
    editor.connect_next(local, outer).unwrap();
    editor.set_field(outer, "VAR", "speed").unwrap();
    let stray = editor.create_block("lexical_variable_get", None).unwrap();
    editor.set_field(stray, "VAR", "velocity").unwrap();

    let outcome = editor.rename_variable(variable, "flow").unwrap();
    assert_eq!(outcome.name, "flow");
    assert_eq!(outcome.updated.len(), 3);
    for block in [inner, read, outer] {
        let bound = reference(&editor, block);
        assert_eq!(bound.label, "flow");
        assert_eq!(bound.path.as_deref(), Some("flow"));
    }
    assert_eq!(reference(&editor, stray), VariableRef::unbound("velocity"));
    assert_eq!(
        editor.workspace().get(declaration).unwrap().field_text("NAME"),
        Some("flow")
    );
}

#[test]
fn renaming_into_a_taken_name_picks_the_next_free_one() {
    let mut editor = Editor::new();
    global(&mut editor, "flow");
    let second = global(&mut editor, "speed");
    let get = editor.create_block("lexical_variable_get", None).unwrap();
    editor.set_field(get, "VAR", "speed").unwrap();

    editor.set_field(second, "NAME", "flow").unwrap();
    assert_eq!(
        editor.workspace().get(second).unwrap().field_text("NAME"),
        Some("flow2")
    );
    assert_eq!(reference(&editor, get).path.as_deref(), Some("flow2"));
}

#[test]
fn rename_never_moves_a_reference_to_another_variable() {
    let mut editor = Editor::new();
    let declaration = global(&mut editor, "x");
    let global_var = editor.variables().declared_by(declaration).unwrap();
    let local = editor.create_block("local_declaration_statement", None).unwrap();
    editor.set_field(local, "NAME", "y").unwrap();
    let local_var = editor.variables().declared_by(local).unwrap();
    let set = editor.create_block("lexical_variable_set", None).unwrap();
    editor.connect_input(local, "STACK", set).unwrap();
    editor.set_field(set, "VAR", "x").unwrap();
    assert_eq!(editor.scope().referenced_variable(set), Some(global_var));

    // The local `y` would shadow the renamed global inside its stack.
    let outcome = editor.rename_variable(global_var, "y").unwrap();
    assert_eq!(outcome.name, "y2");
    assert_eq!(outcome.updated, vec![set]);
    assert_eq!(editor.scope().referenced_variable(set), Some(global_var));
    assert_eq!(reference(&editor, set).path.as_deref(), Some("y2"));

    // Renaming the local onto the global's name would capture the reference.
    let outcome = editor.rename_variable(local_var, "y2").unwrap();
    assert_eq!(outcome.name, "y3");
    assert!(outcome.updated.is_empty());
    assert_eq!(editor.scope().referenced_variable(set), Some(global_var));
    let code = editor.generate(&GeneratorOptions::default()).unwrap();
    assert!(code.contains("set(global_y2, 0)"), "{}", code);
}

#[test]
fn locals_shadow_globals_until_the_reference_moves_out() {
    let mut editor = Editor::new();
    let declaration = global(&mut editor, "count");
    let global_var = editor.variables().declared_by(declaration).unwrap();

    let local = editor.create_block("local_declaration_statement", None).unwrap();
    editor.set_field(local, "NAME", "count").unwrap();
    let local_var = editor.variables().declared_by(local).unwrap();
    assert_eq!(editor.variables().get(local_var).unwrap().name, "count");

    let set = editor.create_block("lexical_variable_set", None).unwrap();
    editor.set_field(set, "VAR", "count").unwrap();
    assert_eq!(editor.scope().referenced_variable(set), Some(global_var));

    editor.connect_input(local, "STACK", set).unwrap();
    assert_eq!(editor.scope().referenced_variable(set), Some(local_var));

    editor.disconnect(set).unwrap();
    assert_eq!(editor.scope().referenced_variable(set), Some(global_var));
    let code = editor.generate(&GeneratorOptions::default()).unwrap();
    assert!(code.contains("set(global_count, 0)"), "{}", code);
}

#[test]
fn attribute_paths_resolve_and_display_with_titles() {
    let mut editor = Editor::new();
    editor.create_block("machine_vapourtec_R2R4", None).unwrap();
    let change = editor.create_block("math_change", None).unwrap();
    editor.set_field(change, "VAR", "reactor::pump1::target").unwrap();

    let bound = reference(&editor, change);
    assert_eq!(bound.label, "reactor \u{25B8} Pump A \u{25B8} Target");
    assert_eq!(bound.encode(), "reactor \u{25B8} Pump A \u{25B8} Target@@reactor::pump1::target");
    let code = editor.generate(&GeneratorOptions::default()).unwrap();
    assert!(code.ends_with("increment(machine_reactor.pump1.target)"), "{}", code);
}

#[test]
fn deleting_a_declaration_leaves_a_dangling_literal() {
    let mut editor = Editor::new();
    let declaration = global(&mut editor, "speed");
    let run = editor.create_block("controls_run", None).unwrap();
    let set = editor.create_block("lexical_variable_set", None).unwrap();
    editor.connect_input(run, "STACK", set).unwrap();
    editor.set_field(set, "VAR", "speed").unwrap();

    editor.delete(declaration, false).unwrap();
    assert!(editor.scope().referenced_variable(set).is_none());
    assert_eq!(reference(&editor, set).label, "speed");
    assert_eq!(
        editor.generate(&GeneratorOptions::default()).unwrap(),
        "run(set(_, 0))"
    );

    // A new declaration with the same name picks the reference back up.
    global(&mut editor, "speed");
    editor.rebind_all().unwrap();
    assert!(editor.scope().referenced_variable(set).is_some());
}

#[test]
fn menu_lists_globals_then_lexicals_with_filtered_submenus() {
    let mut editor = Editor::new();
    global(&mut editor, "speed");
    editor.create_block("machine_vapourtec_R2R4", None).unwrap();
    let local = editor.create_block("local_declaration_statement", None).unwrap();
    editor.set_field(local, "NAME", "count").unwrap();
    let change = editor.create_block("math_change", None).unwrap();
    editor.connect_input(local, "STACK", change).unwrap();
    editor.set_field(change, "VAR", "reactor::pump1::target").unwrap();

    let menu = editor.variable_menu(change).unwrap();
    let texts = menu
        .iter()
        .map(|entry| match entry {
            MenuEntry::Item(item) => item.text.as_str(),
            MenuEntry::Separator => "---",
        })
        .collect::<Vec<_>>();
    assert_eq!(texts, vec!["speed", "reactor", "---", "count"]);

    // The component itself is read-only, so it only hosts its attributes.
    let reactor = item(&menu, "reactor");
    assert!(!reactor.enabled);
    assert!(reactor.selected);
    let pump = item(&reactor.children, "Pump A");
    assert!(!pump.enabled);
    assert!(pump.selected);
    let target = item(&pump.children, "Target");
    assert!(target.enabled && target.selected);
    // Read-only and non-numeric attributes are pruned.
    assert!(items(&pump.children).iter().all(|i| i.text != "Flow Rate"));
    assert!(items(&reactor.children).iter().all(|i| i.text != "Power"));
    assert!(!item(&reactor.children, "Pump B").selected);
    assert!(item(&menu, "speed").enabled);
}

#[test]
fn empty_menu_says_so() {
    let mut editor = Editor::new();
    let get = editor.create_block("lexical_variable_get", None).unwrap();
    let menu = editor.variable_menu(get).unwrap();
    assert_eq!(menu.len(), 1);
    let only = item(&menu, NO_VARIABLES_MESSAGE);
    assert!(!only.enabled);
    assert!(only.variable.is_none());
}
