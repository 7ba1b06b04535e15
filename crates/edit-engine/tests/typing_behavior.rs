//! Interactive typing: auto-closing pairs, auto-indent, and coalescing.

use edit_engine::{DocumentEditEngine, EngineConfig, Selection};

#[test]
fn openers_insert_their_closers() {
    for (opener, expected) in [('(', "()"), ('{', "{}"), ('[', "[]"), ('"', "\"\""), ('\'', "''")]
    {
        let mut engine = DocumentEditEngine::new();
        engine.type_char(opener);
        assert_eq!(engine.text(), expected);
        assert_eq!(engine.selection(), Selection::collapsed(1));
    }
}

#[test]
fn typing_the_matching_closer_skips_over_it() {
    let mut engine = DocumentEditEngine::new();
    engine.type_char('[');
    engine.type_char(']');
    assert_eq!(engine.text(), "[]");
    assert_eq!(engine.selection(), Selection::collapsed(2));
    assert_eq!(engine.revision(), 1, "the skip is not a mutation");
}

#[test]
fn quotes_pair_then_skip() {
    let mut engine = DocumentEditEngine::new();
    engine.type_char('"');
    engine.type_char('"');
    assert_eq!(engine.text(), "\"\"");
    assert_eq!(engine.selection(), Selection::collapsed(2));
}

#[test]
fn closer_without_a_match_is_inserted() {
    let mut engine = DocumentEditEngine::from_text("x");
    engine.set_selection(Selection::collapsed(0));
    engine.type_char(')');
    assert_eq!(engine.text(), ")x");
}

#[test]
fn pairs_can_be_disabled() {
    let config = EngineConfig {
        auto_closing_pairs: false,
        ..EngineConfig::default()
    };
    let mut engine = DocumentEditEngine::with_config("", config);
    engine.type_char('(');
    assert_eq!(engine.text(), "(");
}

#[test]
fn newline_carries_leading_whitespace() {
    let mut engine = DocumentEditEngine::from_text("\tindented");
    engine.move_document_end(false);
    engine.type_char('\n');
    assert_eq!(engine.text(), "\tindented\n\t");
}

#[test]
fn newline_adds_unit_after_colon() {
    let mut engine = DocumentEditEngine::from_text("def f():");
    engine.move_document_end(false);
    engine.type_char('\n');
    assert_eq!(engine.text(), "def f():\n    ");
}

#[test]
fn newline_between_braces_opens_an_indented_body() {
    let mut engine = DocumentEditEngine::from_text("  fn f() {}");
    engine.set_selection(Selection::collapsed(10));
    engine.type_char('\n');
    assert_eq!(engine.text(), "  fn f() {\n      \n  }");
    // Caret sits at the end of the blank body line.
    let (line, column) = engine.offset_to_position(engine.selection().extent);
    assert_eq!((line, column), (1, 6));
}

#[test]
fn typing_over_a_selection_replaces_it() {
    let mut engine = DocumentEditEngine::from_text("hello world");
    engine.set_selection(Selection::new(0, 5));
    engine.type_char('H');
    assert_eq!(engine.text(), "H world");
    assert_eq!(engine.selection(), Selection::collapsed(1));
}

#[test]
fn burst_of_characters_is_one_undo_entry() {
    let mut engine = DocumentEditEngine::new();
    for ch in "typed".chars() {
        engine.type_char(ch);
    }
    assert_eq!(engine.text(), "typed");
    assert!(engine.undo());
    assert_eq!(engine.text(), "");
    assert!(!engine.can_undo());
}

#[test]
fn space_after_a_word_starts_a_new_undo_entry() {
    let mut engine = DocumentEditEngine::new();
    for ch in "ab cd".chars() {
        engine.type_char(ch);
    }
    assert_eq!(engine.text(), "ab cd");
    assert!(engine.undo());
    assert_eq!(engine.text(), "ab ");
    assert!(engine.undo());
    assert_eq!(engine.text(), "ab");
    assert!(engine.undo());
    assert_eq!(engine.text(), "");
}

#[test]
fn moving_the_caret_flushes_but_keeps_coalescing_rules() {
    let mut engine = DocumentEditEngine::from_text("ab\ncd");
    engine.set_selection(Selection::collapsed(2));
    engine.type_char('!');
    engine.move_down(false);
    // The overlay was flushed by the navigation; the text is intact.
    assert_eq!(engine.text(), "ab!\ncd");
    engine.type_char('?');
    assert_eq!(engine.line_text(1), "cd?");
}

#[test]
fn word_prefix_with_extended_script_range() {
    let config = EngineConfig {
        extended_script_ranges: vec!['\u{0370}'..='\u{03ff}'],
        ..EngineConfig::default()
    };
    let mut engine = DocumentEditEngine::with_config("x λόγος", config);
    engine.move_document_end(false);
    assert_eq!(engine.current_word_prefix(), "λόγος");
}
