//! Property tests for chunk bounds and lossless reconstruction.

use lawgpt_rag::chunking::{Chunker, FixedSizeChunker, RecursiveChunker, split};
use lawgpt_rag::document::{Chunk, Document};
use proptest::prelude::*;

/// Sizes with `chunk_size > 0` and `overlap < chunk_size`.
fn arb_sizes() -> impl Strategy<Value = (usize, usize)> {
    (1usize..64).prop_flat_map(|size| (Just(size), 0..size))
}

/// Text mixing words, sentence ends, line breaks, and multi-byte characters.
fn arb_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![
            4 => "[a-z]{1,9}",
            2 => Just(" ".to_string()),
            1 => Just(". ".to_string()),
            1 => Just("\n".to_string()),
            1 => Just("\n\n".to_string()),
            1 => "[धाराअपराध]{1,4}",
        ],
        0..80,
    )
    .prop_map(|parts| parts.concat())
}

/// Undo the overlaps between consecutive chunks.
fn reconstruct(chunks: &[Chunk]) -> String {
    let mut text = String::new();
    let mut covered = 0;
    for chunk in chunks {
        text.extend(chunk.text.chars().skip(covered - chunk.char_start.min(covered)));
        covered = chunk.char_end;
    }
    text
}

fn check_invariants(
    document: &Document,
    chunks: &[Chunk],
    size: usize,
    overlap: usize,
) -> Result<(), TestCaseError> {
    let total = document.text.chars().count();
    if total == 0 {
        prop_assert!(chunks.is_empty());
        return Ok(());
    }

    prop_assert_eq!(chunks[0].char_start, 0);
    prop_assert_eq!(chunks[chunks.len() - 1].char_end, total);
    for chunk in chunks {
        prop_assert!(
            chunk.char_len() <= size,
            "chunk of {} chars exceeds {}",
            chunk.char_len(),
            size
        );
        prop_assert_eq!(chunk.char_len(), chunk.text.chars().count());
        let expected: String =
            document.text.chars().skip(chunk.char_start).take(chunk.char_len()).collect();
        prop_assert_eq!(&chunk.text, &expected);
    }
    for pair in chunks.windows(2) {
        // Never skips text, never overlaps by more than the configured amount.
        prop_assert!(pair[1].char_start <= pair[0].char_end);
        prop_assert!(pair[0].char_end - pair[1].char_start <= overlap);
        prop_assert!(pair[1].char_start > pair[0].char_start);
    }
    prop_assert_eq!(reconstruct(chunks), document.text.clone());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn recursive_chunks_are_bounded_and_lossless(
        text in arb_text(),
        (size, overlap) in arb_sizes(),
    ) {
        let document = Document::new("doc", text, "ipc.txt");
        let chunks = split(&document, size, overlap).unwrap();
        check_invariants(&document, &chunks, size, overlap)?;
    }

    #[test]
    fn fixed_chunks_are_bounded_and_lossless(text in arb_text(), (size, overlap) in arb_sizes()) {
        let document = Document::new("doc", text, "ipc.txt");
        let chunks = FixedSizeChunker::new(size, overlap).unwrap().chunk(&document);
        check_invariants(&document, &chunks, size, overlap)?;
    }

    #[test]
    fn invalid_sizes_always_fail(size in 0usize..16, extra in 0usize..16) {
        let overlap = size + extra;
        prop_assert!(RecursiveChunker::new(size, overlap).is_err());
        prop_assert!(FixedSizeChunker::new(size, overlap).is_err());
    }
}

#[test]
fn chunk_ids_and_metadata_follow_the_document() {
    let mut document =
        Document::new("ipc_302", "Whoever commits murder shall be punished.", "data/ipc.txt");
    document.metadata.insert("act".to_string(), "IPC".to_string());

    let chunks = split(&document, 16, 4).unwrap();
    assert!(chunks.len() > 1);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.id, format!("ipc_302_{i}"));
        assert_eq!(chunk.document_id, "ipc_302");
        assert_eq!(chunk.metadata["chunk_index"], i.to_string());
        assert_eq!(chunk.metadata["source"], "data/ipc.txt");
        assert_eq!(chunk.metadata["act"], "IPC");
    }
}
