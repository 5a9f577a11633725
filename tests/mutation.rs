use octoblocks_core::editor::Editor;
use octoblocks_core::mutation::{self, MutationState, MutationValue};
use octoblocks_core::workspace::BlockId;
use octoblocks_core::EditorError;

fn input_names(editor: &Editor, block: BlockId) -> Vec<String> {
    editor
        .workspace()
        .get(block)
        .unwrap()
        .inputs()
        .iter()
        .map(|input| input.name.clone())
        .collect()
}

fn boolean(editor: &mut Editor, value: &str) -> BlockId {
    let id = editor.create_block("logic_boolean", None).unwrap();
    editor.set_field(id, "BOOL", value).unwrap();
    id
}

#[test]
fn growing_elseif_keeps_existing_children_and_puts_else_last() {
    let mut editor = Editor::new();
    let branch = editor.create_block("controls_if", None).unwrap();
    let condition = boolean(&mut editor, "TRUE");
    editor.connect_input(branch, "IF0", condition).unwrap();

    let report = editor
        .mutate(branch, &MutationState::default().with_count("elseif", 2))
        .unwrap();
    assert_eq!(report.added, vec!["IF1", "DO1", "IF2", "DO2"]);
    assert_eq!(editor.workspace().input_target(branch, "IF0"), Some(condition));
    assert_eq!(editor.workspace().input_target(branch, "IF1"), None);

    editor
        .mutate(branch, &MutationState::default().with_count("else", 1))
        .unwrap();
    assert_eq!(
        input_names(&editor, branch),
        vec!["IF0", "DO0", "IF1", "DO1", "IF2", "DO2", "ELSE"]
    );

    // A new else-if goes in front of the terminal clause.
    editor
        .mutate(branch, &MutationState::default().with_count("elseif", 3))
        .unwrap();
    let names = input_names(&editor, branch);
    assert_eq!(names.last().map(String::as_str), Some("ELSE"));
    assert_eq!(names[6..8], ["IF3".to_string(), "DO3".to_string()]);

    let schema = editor.catalog().schema("controls_if").unwrap();
    assert!(mutation::check_shape(editor.workspace(), branch, schema).unwrap());
}

#[test]
fn shrinking_orphans_children_instead_of_deleting_them() {
    let mut editor = Editor::new();
    let join = editor.create_block("text_join", None).unwrap();
    editor
        .mutate(join, &MutationState::default().with_count("items", 3))
        .unwrap();
    let last = editor.create_block("text", None).unwrap();
    editor.connect_input(join, "ADD2", last).unwrap();

    let report = editor
        .mutate(join, &MutationState::default().with_count("items", 1))
        .unwrap();
    assert_eq!(report.removed, vec!["ADD2", "ADD1"]);
    assert_eq!(report.orphaned, vec![last]);
    assert!(editor.workspace().contains(last));
    assert!(editor.workspace().parent(last).is_none());
    assert!(editor.workspace().top_blocks().contains(&last));
}

#[test]
fn reconciling_twice_is_a_noop() {
    let mut editor = Editor::new();
    let parallel = editor.create_block("controls_parallel", None).unwrap();
    let target = MutationState::default().with_count("stacks", 4);
    assert!(!editor.mutate(parallel, &target).unwrap().is_noop());
    assert!(editor.mutate(parallel, &target).unwrap().is_noop());
    assert_eq!(
        input_names(&editor, parallel),
        vec!["STACK0", "STACK1", "STACK2", "STACK3"]
    );
}

#[test]
fn duplicate_terminal_clause_is_rejected_before_any_change() {
    let mut editor = Editor::new();
    let branch = editor.create_block("controls_if", None).unwrap();
    let before = input_names(&editor, branch);
    let err = editor
        .mutate(
            branch,
            &MutationState::default().with_count("elseif", 2).with_count("else", 2),
        )
        .unwrap_err();
    assert!(matches!(err, EditorError::DuplicateTerminalClause { count: 2, .. }));
    assert_eq!(input_names(&editor, branch), before);
}

#[test]
fn unknown_entries_and_fixed_shape_blocks_are_errors() {
    let mut editor = Editor::new();
    let branch = editor.create_block("controls_if", None).unwrap();
    assert!(matches!(
        editor.mutate(branch, &MutationState::default().with_count("items", 1)),
        Err(EditorError::UnknownMutationEntry { .. })
    ));
    let wait = editor.create_block("controls_wait", None).unwrap();
    assert!(matches!(
        editor.mutate(wait, &MutationState::default()),
        Err(EditorError::NotMutable(_))
    ));
}

#[test]
fn persisted_form_omits_defaults() {
    let mut editor = Editor::new();
    let parallel = editor.create_block("controls_parallel", None).unwrap();
    assert!(editor.serialize_mutation(parallel).unwrap().is_empty());

    editor
        .mutate(parallel, &MutationState::default().with_count("stacks", 5))
        .unwrap();
    let record = editor.serialize_mutation(parallel).unwrap();
    assert_eq!(record.get("stacks"), Some(&MutationValue::Count(5)));
    let json = mutation::record_to_json(&record);
    assert_eq!(json.to_string(), r#"{"stacks":5}"#);

    let copy = editor.create_block("controls_parallel", None).unwrap();
    editor
        .deserialize_mutation(copy, &mutation::record_from_json(&json).unwrap())
        .unwrap();
    assert_eq!(
        editor.workspace().get(copy).unwrap().mutation(),
        editor.workspace().get(parallel).unwrap().mutation()
    );
}

#[test]
fn unparsable_counts_fall_back_to_the_default() {
    let mut editor = Editor::new();
    let join = editor.create_block("text_join", None).unwrap();
    let mut record = mutation::MutationRecord::new();
    record.insert("items".to_string(), MutationValue::Text("many".to_string()));
    editor.deserialize_mutation(join, &record).unwrap();
    assert_eq!(input_names(&editor, join), vec!["ADD0", "ADD1"]);
}

#[test]
fn reordering_helpers_moves_clause_children() {
    let mut editor = Editor::new();
    let branch = editor.create_block("controls_if", None).unwrap();
    editor
        .mutate(branch, &MutationState::default().with_count("elseif", 2))
        .unwrap();
    let first = boolean(&mut editor, "TRUE");
    let second = boolean(&mut editor, "FALSE");
    editor.connect_input(branch, "IF1", first).unwrap();
    editor.connect_input(branch, "IF2", second).unwrap();

    let mut clauses = editor.open_clause_editor(branch).unwrap();
    let helpers = clauses.helpers();
    assert_eq!(helpers.len(), 2);
    clauses.move_helper(helpers[1], 0).unwrap();
    let report = editor.apply_clause_editor(&mut clauses).unwrap();
    assert!(report.added.is_empty() && report.removed.is_empty());
    assert_eq!(editor.workspace().input_target(branch, "IF1"), Some(second));
    assert_eq!(editor.workspace().input_target(branch, "IF2"), Some(first));

    // Nothing changed on the surface since the last apply.
    assert!(editor.apply_clause_editor(&mut clauses).unwrap().is_noop());
}

#[test]
fn removing_a_helper_drops_its_clause_and_keeps_the_rest() {
    let mut editor = Editor::new();
    let branch = editor.create_block("controls_if", None).unwrap();
    editor
        .mutate(branch, &MutationState::default().with_count("elseif", 2))
        .unwrap();
    let first = boolean(&mut editor, "TRUE");
    let second = boolean(&mut editor, "FALSE");
    editor.connect_input(branch, "IF1", first).unwrap();
    editor.connect_input(branch, "IF2", second).unwrap();

    let mut clauses = editor.open_clause_editor(branch).unwrap();
    let helpers = clauses.helpers();
    clauses.remove_helper(helpers[0]).unwrap();
    let schema = editor.catalog().schema("controls_if").unwrap().clone();
    clauses.append_helper(&schema, "else").unwrap();
    let report = editor.apply_clause_editor(&mut clauses).unwrap();

    assert_eq!(input_names(&editor, branch), vec!["IF0", "DO0", "IF1", "DO1", "ELSE"]);
    assert_eq!(editor.workspace().input_target(branch, "IF1"), Some(second));
    // The shrink detaches IF2's child before the connection pass moves it up.
    assert_eq!(report.orphaned, vec![second]);
    assert!(editor.workspace().contains(first));
    assert!(editor.workspace().parent(first).is_none());
}

#[test]
fn second_terminal_helper_is_refused() {
    let mut editor = Editor::new();
    let branch = editor.create_block("controls_if", None).unwrap();
    let schema = editor.catalog().schema("controls_if").unwrap().clone();
    let mut clauses = editor.open_clause_editor(branch).unwrap();
    clauses.append_helper(&schema, "elseif").unwrap();
    clauses.append_helper(&schema, "else").unwrap();
    assert!(matches!(
        clauses.append_helper(&schema, "else"),
        Err(EditorError::DuplicateTerminalClause { .. })
    ));
    // Else-ifs still slot in ahead of the else.
    clauses.append_helper(&schema, "elseif").unwrap();
    let (state, _) = clauses.collapse(&schema).unwrap();
    assert_eq!(state.count("elseif"), 2);
    assert_eq!(state.count("else"), 1);
}

#[test]
fn terminal_helper_cannot_move_ahead_of_others() {
    let mut editor = Editor::new();
    let branch = editor.create_block("controls_if", None).unwrap();
    editor
        .mutate(
            branch,
            &MutationState::default().with_count("elseif", 1).with_count("else", 1),
        )
        .unwrap();
    let condition = boolean(&mut editor, "TRUE");
    editor.connect_input(branch, "IF1", condition).unwrap();
    let schema = editor.catalog().schema("controls_if").unwrap().clone();

    let mut clauses = editor.open_clause_editor(branch).unwrap();
    let helpers = clauses.helpers();
    assert!(matches!(
        clauses.move_helper(helpers[1], 0),
        Err(EditorError::ConnectionRefused { .. })
    ));
    assert_eq!(clauses.helpers(), helpers);
    let (state, _) = clauses.collapse(&schema).unwrap();
    assert_eq!(state.count("elseif"), 1);
    assert_eq!(state.count("else"), 1);

    let report = editor.apply_clause_editor(&mut clauses).unwrap();
    assert!(report.is_noop());
    assert_eq!(editor.workspace().input_target(branch, "IF1"), Some(condition));
}

#[test]
fn foreign_helper_blocks_fail_the_collapse() {
    let mut editor = Editor::new();
    let branch = editor.create_block("controls_if", None).unwrap();
    let schema = editor.catalog().schema("controls_if").unwrap().clone();
    let mut clauses = editor.open_clause_editor(branch).unwrap();
    let elseif = clauses.append_helper(&schema, "elseif").unwrap();

    let stray = clauses.workspace_mut().create_block("text_create_join_item", None);
    clauses.workspace_mut().get_mut(stray).unwrap().previous = true;
    clauses.workspace_mut().connect_next(elseif, stray).unwrap();

    let err = clauses.collapse(&schema).unwrap_err();
    assert_eq!(
        err,
        EditorError::UnknownHelperBlock {
            block_type: "controls_if".to_string(),
            helper: "text_create_join_item".to_string(),
        }
    );
    assert!(matches!(
        editor.apply_clause_editor(&mut clauses),
        Err(EditorError::UnknownHelperBlock { .. })
    ));
    assert_eq!(input_names(&editor, branch), vec!["IF0", "DO0"]);
}
