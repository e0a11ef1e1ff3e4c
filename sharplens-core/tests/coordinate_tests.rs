use proptest::prelude::*;
use sharplens_core::position::{normalize_path, LineIndex};
use sharplens_core::Position;
use std::path::Path;

fn source_text() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            Just("\n".to_string()),
            Just("\r\n".to_string()),
            "[a-z ;{}]{0,6}",
            Just("é".to_string()),
            Just("日本".to_string()),
        ],
        0..12,
    )
    .prop_map(|parts| parts.concat())
}

proptest! {
    /// Every position inside a line maps to an offset that maps back to it
    #[test]
    fn prop_position_offset_round_trip(text in source_text()) {
        let index = LineIndex::new(&text);
        for line in 0..index.line_count() as u32 {
            let content = index.line_text(&text, line).unwrap();
            for column in 0..=content.chars().count() as u32 {
                let position = Position::new(line, column);
                let offset = index.offset(&text, position).unwrap();
                prop_assert_eq!(index.position(&text, offset).unwrap(), position);
            }
        }
    }

    /// Offsets are monotonic in position order
    #[test]
    fn prop_offsets_increase_with_positions(text in source_text()) {
        let index = LineIndex::new(&text);
        let mut previous = None;
        for line in 0..index.line_count() as u32 {
            let length = index.line_text(&text, line).unwrap().chars().count() as u32;
            for column in 0..=length {
                let offset = index.offset(&text, Position::new(line, column)).unwrap();
                if let Some(previous) = previous {
                    prop_assert!(offset > previous);
                }
                previous = Some(offset);
            }
        }
    }

    /// Normalized paths never escape the root or carry backslashes
    #[test]
    fn prop_normalized_paths_are_relative(parts in prop::collection::vec("[a-z]{1,4}|\\.|\\.\\.", 1..6)) {
        let input = parts.join("\\");
        if let Ok(normalized) = normalize_path(Path::new("/work/repo"), &input) {
            prop_assert!(!normalized.contains('\\'));
            prop_assert!(!normalized.starts_with('/'));
            prop_assert!(normalized.split('/').all(|part| part != ".." && part != "."));
        }
    }
}
