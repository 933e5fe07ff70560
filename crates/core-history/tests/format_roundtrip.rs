//! Serialization law: `parse(serialize(items)) == items` for any set of
//! valid-UTF-8 texts and nonnegative timestamps.

use core_history::file::{FileContents, FileFormat, FileIdentity, append_item, detect_format};
use core_history::HistoryItem;
use proptest::prelude::*;

fn arb_item() -> impl Strategy<Value = HistoryItem> {
    // The codec round-trips any non-empty text, including ones full of
    // backslashes and newlines; the store layer is what filters empties.
    (
        "[ -~\\n\\\\]{1,40}",
        0i64..=4_000_000_000,
        proptest::collection::vec("[ -~]{1,20}", 0..3),
    )
        .prop_map(|(text, when, paths)| HistoryItem {
            text,
            timestamp: when,
            required_paths: paths,
        })
}

proptest! {
    #[test]
    fn serialize_then_parse_is_identity(items in proptest::collection::vec(arb_item(), 1..12)) {
        let mut buffer = Vec::new();
        for item in &items {
            append_item(item, &mut buffer);
        }
        prop_assert_eq!(detect_format(&buffer), FileFormat::Current);

        let contents = FileContents {
            data: buffer,
            format: FileFormat::Current,
            identity: FileIdentity::default(),
        };
        let offsets = contents.scan_offsets(0);
        prop_assert_eq!(offsets.len(), items.len());
        let decoded: Vec<HistoryItem> =
            offsets.iter().map(|&off| contents.decode_item(off)).collect();
        prop_assert_eq!(decoded, items);
    }
}
