//! Equivalence of the engine against a flat-string reference model under
//! random edit sequences.

use edit_engine::{DocumentEditEngine, EngineConfig, Selection};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Apply `replace_range` semantics to a plain `String`, char-offset based and
/// clamped the same way the engine clamps.
fn reference_replace(text: &mut String, start: usize, end: usize, replacement: &str) {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let (start, end) = {
        let a = start.min(len);
        let b = end.min(len);
        (a.min(b), a.max(b))
    };
    let mut out: String = chars[..start].iter().collect();
    out.push_str(replacement);
    out.extend(&chars[end..]);
    *text = out;
}

fn random_snippet(rng: &mut StdRng) -> String {
    const ALPHABET: &[char] = &[
        'a', 'b', 'c', 'x', 'y', 'z', ' ', '_', '0', '9', '\n', 'é', '界',
    ];
    let len = rng.gen_range(0..6);
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())])
        .collect()
}

#[test]
fn replace_range_matches_reference_model() {
    for seed in 0..4u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut engine = DocumentEditEngine::from_text("fn main() {\n    return;\n}\n");
        let mut model = engine.text();

        for step in 0..200 {
            let len = model.chars().count();
            let start = rng.gen_range(0..=len + 2);
            let end = rng.gen_range(0..=len + 2);
            let replacement = random_snippet(&mut rng);
            engine.replace_range(start, end, &replacement, rng.gen_bool(0.3));
            reference_replace(&mut model, start, end, &replacement);
            assert_eq!(
                engine.text(),
                model,
                "diverged at seed {seed} step {step} ({start}..{end} -> {replacement:?})"
            );
            assert_eq!(engine.len(), model.chars().count());
        }
    }
}

#[test]
fn overlay_typing_matches_reference_model() {
    // Heuristics off so typing is a plain insertion in both models.
    let config = EngineConfig {
        auto_closing_pairs: false,
        auto_indent: false,
        ..EngineConfig::default()
    };
    for seed in 10..13u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut engine = DocumentEditEngine::with_config("one\ntwo\nthree\n", config.clone());
        let mut model = engine.text();

        for _ in 0..150 {
            let len = model.chars().count();
            let caret = rng.gen_range(0..=len);
            engine.set_selection(Selection::collapsed(caret));
            let ch = ['q', 'w', '(', '\n', '界'][rng.gen_range(0..5)];
            engine.type_char(ch);
            let mut buf = [0u8; 4];
            reference_replace(&mut model, caret, caret, ch.encode_utf8(&mut buf));
            assert_eq!(engine.text(), model, "diverged at seed {seed}");
        }
    }
}

#[test]
fn interleaved_reads_do_not_disturb_state() {
    let mut engine = DocumentEditEngine::from_text("alpha\nbeta");
    engine.set_selection(Selection::collapsed(10));
    engine.type_char('!');
    // Reads through the effective view while the overlay is dirty.
    assert_eq!(engine.line_text(1), "beta!");
    assert_eq!(engine.char_at(10), Some('!'));
    assert_eq!(engine.offset_to_position(11), (1, 5));
    assert_eq!(engine.position_to_offset(1, 5), 11);
    assert_eq!(engine.text(), "alpha\nbeta!");
    // A ground-truth mutation flushes and agrees.
    engine.replace_range(0, 5, "gamma", false);
    assert_eq!(engine.text(), "gamma\nbeta!");
}
