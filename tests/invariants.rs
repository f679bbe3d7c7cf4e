//! Property tests for the universally-quantified invariants of spec.md §8.
//!
//! Mirrors the teacher's `prop_piece_tree_matches_shadow` style
//! (`examples/yididiel7-fresh/tests/property_tests.rs`): generate random
//! sequences of operations, check a shadow model stays in sync, and assert
//! structural invariants hold throughout.

use proptest::prelude::*;
use vellum::document::{Document, MarkRefArg};
use vellum::mark::MarkGroup;

#[derive(Debug, Clone)]
enum Op {
    InsertAt(usize, String),
    DeleteAt(usize, usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (any::<usize>(), "[a-zA-Z0-9 \n]{1,8}").prop_map(|(p, s)| Op::InsertAt(p, s)),
        2 => (any::<usize>(), 1usize..6).prop_map(|(p, l)| Op::DeleteAt(p, l)),
    ]
}

/// Applies `op` to both the real document and the shadow string, clamping
/// positions/lengths into range exactly like a well-behaved caller would
/// (callers are expected to supply in-range marks; this harness isn't
/// testing out-of-range handling, just content/invariant consistency).
fn apply(doc: &mut Document, shadow: &mut String, op: &Op) {
    match op {
        Op::InsertAt(p, s) => {
            let at = p % (shadow.len() + 1);
            shadow.insert_str(at, s);
            let r = doc.ref_at_byte(at);
            doc.insert_at(MarkRefArg::At(r), s.as_bytes(), true).unwrap();
        }
        Op::DeleteAt(p, l) => {
            if shadow.is_empty() {
                return;
            }
            let at = p % shadow.len();
            let end = (at + l).min(shadow.len());
            shadow.replace_range(at..end, "");
            let from = doc.ref_at_byte(at);
            let to = doc.ref_at_byte(end);
            doc.delete_range(from, to, true).unwrap();
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 200, ..ProptestConfig::default() })]

    /// Invariants 1, 2, 3: after any sequence of inserts/deletes, every
    /// chunk is well-formed and non-overlapping within its arena, and the
    /// document's content exactly matches an independent shadow model.
    #[test]
    fn content_matches_shadow_and_chunks_stay_consistent(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let mut doc = Document::with_default_config();
        let mut shadow = String::new();
        for op in &ops {
            apply(&mut doc, &mut shadow, op);
            prop_assert_eq!(doc.content(doc.bof_ref(), None), shadow.clone());
            prop_assert!(doc.check_invariants().is_ok());
        }
    }

    /// Invariant 3/4: marks created at arbitrary points during a random
    /// edit sequence stay strictly ordered by position (then seq), and
    /// every view's sublist agrees with the global mark order.
    #[test]
    fn marks_and_views_stay_ordered_through_random_edits(
        ops in prop::collection::vec(op_strategy(), 1..40),
        mark_positions in prop::collection::vec(0usize..200, 0..15),
    ) {
        let mut doc = Document::with_default_config();
        let mut shadow = String::new();
        let owner = doc.new_observer_id();
        let view = doc.add_view(owner);

        for (i, op) in ops.iter().enumerate() {
            apply(&mut doc, &mut shadow, op);
            if let Some(&p) = mark_positions.get(i) {
                if !shadow.is_empty() {
                    let at = p % shadow.len();
                    let r = doc.ref_at_byte(at);
                    let group = if i % 2 == 0 { MarkGroup::View(view) } else { MarkGroup::Ungrouped };
                    doc.mark_new(r.into(), group).unwrap();
                }
            }
            prop_assert!(doc.check_invariants().is_ok());
        }
    }

    /// Invariant 6: undo immediately followed by redo (no intervening
    /// edits) returns the document to exactly the state redo left it in,
    /// and undo alone returns exactly to the pre-edit state.
    #[test]
    fn undo_then_redo_round_trips(initial in "[a-zA-Z0-9 \n]{0,20}", op in op_strategy()) {
        let mut doc = Document::with_default_config();
        doc.insert_at(MarkRefArg::Eof, initial.as_bytes(), true).unwrap();
        let before = doc.content(doc.bof_ref(), None);

        let mut shadow = initial.clone();
        apply(&mut doc, &mut shadow, &op);
        let after = doc.content(doc.bof_ref(), None);

        doc.reundo(false);
        prop_assert_eq!(doc.content(doc.bof_ref(), None), before);

        doc.reundo(true);
        prop_assert_eq!(doc.content(doc.bof_ref(), None), after);
    }
}
