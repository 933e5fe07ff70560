//! End-to-end editor scenarios driven through the public dispatch.

use std::sync::Arc;

use core_edit::{BasicEditContext, EditContext, EditorState, SyntaxStatus};
use core_events::{Event, ReadlineCmd};
use core_history::{History, HistoryItem};
use pretty_assertions::assert_eq;

fn editor_with_history(texts: &[&str]) -> (EditorState, BasicEditContext) {
    let history = Arc::new(History::in_memory("scenario"));
    for (n, text) in texts.iter().enumerate() {
        history.add(HistoryItem::with_timestamp(*text, n as i64));
    }
    (EditorState::new(history), BasicEditContext)
}

fn editor() -> (EditorState, BasicEditContext) {
    editor_with_history(&[])
}

fn apply(ed: &mut EditorState, ctx: &mut dyn EditContext, cmd: ReadlineCmd) {
    ed.apply(&Event::readline(cmd), ctx);
}

fn type_str(ed: &mut EditorState, ctx: &mut dyn EditContext, s: &str) {
    for cp in s.chars() {
        ed.apply(&Event::plain(cp), ctx);
    }
}

fn state(ed: &EditorState) -> (String, usize) {
    (ed.text(), ed.cursor())
}

#[test]
fn insert_then_backspace_is_identity() {
    let (mut ed, mut ctx) = editor();
    type_str(&mut ed, &mut ctx, "base");
    let before = state(&ed);

    type_str(&mut ed, &mut ctx, "extra");
    for _ in 0.."extra".len() {
        apply(&mut ed, &mut ctx, ReadlineCmd::BackwardDeleteChar);
    }
    assert_eq!(state(&ed), before);
}

#[test]
fn parallel_arrays_track_every_mutation() {
    let (mut ed, mut ctx) = editor();
    type_str(&mut ed, &mut ctx, "echo test");
    assert_eq!(ed.colors().len(), ed.buffer().len());
    assert_eq!(ed.indents().len(), ed.buffer().len());
    apply(&mut ed, &mut ctx, ReadlineCmd::BackwardKillWord);
    assert_eq!(ed.colors().len(), ed.buffer().len());
    assert_eq!(ed.indents().len(), ed.buffer().len());
    assert!(ed.cursor() <= ed.buffer().len());
}

#[test]
fn generation_bumps_on_writes_not_reads() {
    let (mut ed, mut ctx) = editor();
    type_str(&mut ed, &mut ctx, "ab");
    let after_insert = ed.generation();
    assert!(after_insert >= 2);

    apply(&mut ed, &mut ctx, ReadlineCmd::BackwardChar);
    apply(&mut ed, &mut ctx, ReadlineCmd::EndOfLine);
    assert_eq!(ed.generation(), after_insert, "cursor motion is a read");

    apply(&mut ed, &mut ctx, ReadlineCmd::BackwardDeleteChar);
    assert_eq!(ed.generation(), after_insert + 1);
}

#[test]
fn backward_kill_word_then_yank_restores_buffer_and_cursor() {
    let (mut ed, mut ctx) = editor();
    type_str(&mut ed, &mut ctx, "echo hi");
    apply(&mut ed, &mut ctx, ReadlineCmd::BackwardChar);
    let before = state(&ed);
    assert_eq!(before, ("echo hi".to_string(), 6));

    apply(&mut ed, &mut ctx, ReadlineCmd::BackwardKillWord);
    assert_eq!(state(&ed), ("echo i".to_string(), 5));

    apply(&mut ed, &mut ctx, ReadlineCmd::Yank);
    assert_eq!(state(&ed), before);
}

#[test]
fn forward_char_at_end_accepts_autosuggestion() {
    let (mut ed, mut ctx) = editor();
    type_str(&mut ed, &mut ctx, "echo hello");
    assert!(ed.offer_autosuggestion("echo hello", "echo hello world"));

    apply(&mut ed, &mut ctx, ReadlineCmd::ForwardChar);
    assert_eq!(state(&ed), ("echo hello world".to_string(), 16));
    assert_eq!(ed.autosuggestion(), "");
}

#[test]
fn forward_single_char_takes_one_suggested_char() {
    let (mut ed, mut ctx) = editor();
    type_str(&mut ed, &mut ctx, "ec");
    assert!(ed.offer_autosuggestion("ec", "echo"));
    apply(&mut ed, &mut ctx, ReadlineCmd::ForwardSingleChar);
    assert_eq!(state(&ed), ("ech".to_string(), 3));
}

#[test]
fn mid_buffer_forward_char_just_moves() {
    let (mut ed, mut ctx) = editor();
    type_str(&mut ed, &mut ctx, "ab");
    apply(&mut ed, &mut ctx, ReadlineCmd::BeginningOfLine);
    apply(&mut ed, &mut ctx, ReadlineCmd::ForwardChar);
    assert_eq!(ed.cursor(), 1);
}

#[test]
fn history_search_escape_restores_pending_text() {
    let (mut ed, mut ctx) = editor_with_history(&["ls -latr", "make"]);
    type_str(&mut ed, &mut ctx, "ls -l");
    apply(&mut ed, &mut ctx, ReadlineCmd::HistorySearchBackward);
    assert_eq!(ed.text(), "ls -latr");
    assert!(ed.is_searching());

    ed.apply(&Event::plain('\x1b'), &mut ctx);
    assert_eq!(state(&ed), ("ls -l".to_string(), 5));
    assert!(!ed.is_searching());
}

#[test]
fn history_search_forward_past_newest_restores_pending() {
    let (mut ed, mut ctx) = editor_with_history(&["echo one", "echo two"]);
    type_str(&mut ed, &mut ctx, "echo");
    apply(&mut ed, &mut ctx, ReadlineCmd::HistorySearchBackward);
    assert_eq!(ed.text(), "echo two");
    apply(&mut ed, &mut ctx, ReadlineCmd::HistorySearchBackward);
    assert_eq!(ed.text(), "echo one");
    apply(&mut ed, &mut ctx, ReadlineCmd::HistorySearchForward);
    assert_eq!(ed.text(), "echo two");
    apply(&mut ed, &mut ctx, ReadlineCmd::HistorySearchForward);
    assert_eq!(ed.text(), "echo");
}

#[test]
fn non_search_key_keeps_match_and_applies() {
    let (mut ed, mut ctx) = editor_with_history(&["git push"]);
    type_str(&mut ed, &mut ctx, "git");
    apply(&mut ed, &mut ctx, ReadlineCmd::HistorySearchBackward);
    assert_eq!(ed.text(), "git push");
    // Typing exits the search but keeps the match.
    ed.apply(&Event::plain('!'), &mut ctx);
    assert!(!ed.is_searching());
    assert_eq!(ed.text(), "git push!");
}

#[test]
fn successive_kill_words_merge_then_yank_restores_all() {
    let (mut ed, mut ctx) = editor();
    type_str(&mut ed, &mut ctx, "one two");
    apply(&mut ed, &mut ctx, ReadlineCmd::BeginningOfLine);
    apply(&mut ed, &mut ctx, ReadlineCmd::KillWord);
    assert_eq!(ed.text(), " two");
    apply(&mut ed, &mut ctx, ReadlineCmd::KillWord);
    assert_eq!(ed.text(), "");
    // Both kills merged into one entry.
    apply(&mut ed, &mut ctx, ReadlineCmd::Yank);
    assert_eq!(ed.text(), "one two");
}

#[test]
fn kill_line_then_yank_restores_text() {
    let (mut ed, mut ctx) = editor();
    type_str(&mut ed, &mut ctx, "foobar");
    for _ in 0..3 {
        apply(&mut ed, &mut ctx, ReadlineCmd::BackwardChar);
    }
    apply(&mut ed, &mut ctx, ReadlineCmd::KillLine);
    assert_eq!(state(&ed), ("foo".to_string(), 3));
    apply(&mut ed, &mut ctx, ReadlineCmd::Yank);
    assert_eq!(ed.text(), "foobar");
}

#[test]
fn backward_word_twice_with_punctuation_style() {
    let (mut ed, mut ctx) = editor();
    type_str(&mut ed, &mut ctx, "a b c");
    apply(&mut ed, &mut ctx, ReadlineCmd::BackwardWord);
    apply(&mut ed, &mut ctx, ReadlineCmd::BackwardWord);
    assert_eq!(state(&ed), ("a b c".to_string(), 2));
}

#[test]
fn yank_pop_swaps_in_older_kill() {
    let (mut ed, mut ctx) = editor();
    type_str(&mut ed, &mut ctx, "one");
    apply(&mut ed, &mut ctx, ReadlineCmd::KillWholeLine);
    type_str(&mut ed, &mut ctx, "two");
    apply(&mut ed, &mut ctx, ReadlineCmd::KillWholeLine);
    assert_eq!(ed.text(), "");

    apply(&mut ed, &mut ctx, ReadlineCmd::Yank);
    assert_eq!(ed.text(), "two");
    apply(&mut ed, &mut ctx, ReadlineCmd::YankPop);
    assert_eq!(ed.text(), "one");
}

#[test]
fn yank_pop_without_preceding_yank_is_inert() {
    let (mut ed, mut ctx) = editor();
    type_str(&mut ed, &mut ctx, "text");
    apply(&mut ed, &mut ctx, ReadlineCmd::YankPop);
    assert_eq!(ed.text(), "text");
}

#[test]
fn backspace_suppresses_autosuggestion_until_next_insert() {
    let (mut ed, mut ctx) = editor();
    type_str(&mut ed, &mut ctx, "gi");
    assert!(ed.offer_autosuggestion("gi", "git status"));

    apply(&mut ed, &mut ctx, ReadlineCmd::BackwardDeleteChar);
    assert_eq!(ed.autosuggestion(), "");
    assert!(!ed.offer_autosuggestion("g", "git status"));

    ed.apply(&Event::plain('i'), &mut ctx);
    assert!(ed.offer_autosuggestion("gi", "git status"));
}

#[test]
fn suggestion_must_be_case_insensitive_superstring() {
    let (mut ed, mut ctx) = editor();
    type_str(&mut ed, &mut ctx, "Echo");
    assert!(ed.offer_autosuggestion("Echo", "echo hello"));
    assert!(!ed.offer_autosuggestion("Echo", "ls -l"));
    // Stale snapshot is refused.
    assert!(!ed.offer_autosuggestion("Ech", "echo hello"));
}

#[test]
fn stale_highlight_results_are_dropped() {
    let (mut ed, mut ctx) = editor();
    type_str(&mut ed, &mut ctx, "ok");
    let generation = ed.generation();
    let colors = vec![7u32; 2];

    assert!(!ed.apply_colors(generation - 1, "ok", colors.clone()));
    assert!(!ed.apply_colors(generation, "different", colors.clone()));
    assert!(ed.apply_colors(generation, "ok", colors));
    assert_eq!(ed.colors(), &[7, 7]);
}

#[test]
fn execute_incomplete_inserts_newline() {
    struct IncompleteCtx;
    impl EditContext for IncompleteCtx {
        fn test_syntax(&mut self, _: &str) -> SyntaxStatus {
            SyntaxStatus::Incomplete
        }
    }
    let (mut ed, _) = editor();
    let mut ctx = IncompleteCtx;
    type_str(&mut ed, &mut ctx, "for x in");
    let outcome = ed.apply(&Event::readline(ReadlineCmd::Execute), &mut ctx);
    assert_eq!(outcome.commit, None);
    assert_eq!(ed.text(), "for x in\n");
}

#[test]
fn execute_complete_commits_buffer() {
    let (mut ed, mut ctx) = editor();
    type_str(&mut ed, &mut ctx, "echo hi");
    let outcome = ed.apply(&Event::readline(ReadlineCmd::Execute), &mut ctx);
    assert_eq!(outcome.commit.as_deref(), Some("echo hi"));
}

#[test]
fn transpose_chars_at_end_swaps_last_two() {
    let (mut ed, mut ctx) = editor();
    type_str(&mut ed, &mut ctx, "ab");
    apply(&mut ed, &mut ctx, ReadlineCmd::TransposeChars);
    assert_eq!(ed.text(), "ba");
}

#[test]
fn transpose_words_drags_previous_word_over() {
    let (mut ed, mut ctx) = editor();
    type_str(&mut ed, &mut ctx, "alpha beta");
    apply(&mut ed, &mut ctx, ReadlineCmd::TransposeWords);
    assert_eq!(ed.text(), "beta alpha");
    assert_eq!(ed.cursor(), 10);
}

#[test]
fn case_mutators() {
    let (mut ed, mut ctx) = editor();
    type_str(&mut ed, &mut ctx, "hello WORLD");
    apply(&mut ed, &mut ctx, ReadlineCmd::BeginningOfLine);
    apply(&mut ed, &mut ctx, ReadlineCmd::UpcaseWord);
    assert_eq!(ed.text(), "HELLO WORLD");
    apply(&mut ed, &mut ctx, ReadlineCmd::CapitalizeWord);
    assert_eq!(ed.text(), "HELLO World");
    apply(&mut ed, &mut ctx, ReadlineCmd::BeginningOfLine);
    apply(&mut ed, &mut ctx, ReadlineCmd::DowncaseWord);
    assert_eq!(ed.text(), "hello World");
}

#[test]
fn vertical_moves_keep_column() {
    let (mut ed, mut ctx) = editor();
    type_str(&mut ed, &mut ctx, "first\nsecond");
    // Cursor is at column 6 of "second"; line 0 is shorter, so clamp.
    apply(&mut ed, &mut ctx, ReadlineCmd::UpLine);
    assert_eq!(ed.cursor(), 5);
    apply(&mut ed, &mut ctx, ReadlineCmd::DownLine);
    assert_eq!(ed.cursor(), 11);
}

#[test]
fn token_search_replaces_token_and_cycles_back() {
    let (mut ed, mut ctx) =
        editor_with_history(&["cat notes.txt", "vim notes.txt readme.md"]);
    type_str(&mut ed, &mut ctx, "less notes");
    apply(&mut ed, &mut ctx, ReadlineCmd::HistoryTokenSearchBackward);
    assert_eq!(ed.text(), "less notes.txt");

    // Forward returns to the original token.
    apply(&mut ed, &mut ctx, ReadlineCmd::HistoryTokenSearchForward);
    assert_eq!(ed.text(), "less notes");
}

#[test]
fn token_search_escape_restores_original_line() {
    let (mut ed, mut ctx) = editor_with_history(&["grep pattern file.log"]);
    type_str(&mut ed, &mut ctx, "tail file");
    apply(&mut ed, &mut ctx, ReadlineCmd::HistoryTokenSearchBackward);
    assert_eq!(ed.text(), "tail file.log");
    ed.apply(&Event::plain('\x1b'), &mut ctx);
    assert_eq!(state(&ed), ("tail file".to_string(), 9));
}

#[test]
fn delete_or_exit_exits_only_on_empty_buffer() {
    let (mut ed, mut ctx) = editor();
    let outcome = ed.apply(&Event::readline(ReadlineCmd::DeleteOrExit), &mut ctx);
    assert!(outcome.exit);

    type_str(&mut ed, &mut ctx, "x");
    apply(&mut ed, &mut ctx, ReadlineCmd::BeginningOfLine);
    let outcome = ed.apply(&Event::readline(ReadlineCmd::DeleteOrExit), &mut ctx);
    assert!(!outcome.exit);
    assert_eq!(ed.text(), "");
}

#[test]
fn jump_commands_use_their_argument() {
    let (mut ed, mut ctx) = editor();
    type_str(&mut ed, &mut ctx, "a,b,c");
    apply(&mut ed, &mut ctx, ReadlineCmd::BeginningOfLine);
    ed.apply(
        &Event::Readline {
            cmd: ReadlineCmd::ForwardJump,
            seq: Vec::new(),
            arg: Some(','),
        },
        &mut ctx,
    );
    assert_eq!(ed.cursor(), 1);
    ed.apply(
        &Event::Readline {
            cmd: ReadlineCmd::ForwardJump,
            seq: Vec::new(),
            arg: Some(','),
        },
        &mut ctx,
    );
    assert_eq!(ed.cursor(), 3);
}

#[test]
fn not_first_insert_skipped_at_offset_zero() {
    let (mut ed, mut ctx) = editor();
    ed.apply(
        &Event::Char {
            cp: 'x',
            style: core_events::InsertStyle::NotFirst,
        },
        &mut ctx,
    );
    assert_eq!(ed.text(), "");
    type_str(&mut ed, &mut ctx, "a");
    ed.apply(
        &Event::Char {
            cp: 'x',
            style: core_events::InsertStyle::NotFirst,
        },
        &mut ctx,
    );
    assert_eq!(ed.text(), "ax");
}
