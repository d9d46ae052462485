use readaloud::chunker::{normalize_whitespace, split_text_into_chunks, LOCAL_MAX_CHUNK_CHARS, REMOTE_MAX_CHUNK_CHARS};

const ARTICLE: &str = "The committee met on Tuesday to review the budget.  Several members raised \
concerns about the timeline!\nOthers asked whether the new system would be ready in time? \
After a long discussion, the chair proposed a compromise that everyone could accept. \
The vote passed with a clear majority, and the minutes were published the next morning. \
Reporters called it \"a rare moment of agreement.\" Nobody expected the follow-up meeting \
to be shorter, yet it ended in under an hour with every item resolved.";

#[test]
fn local_chunks_rebuild_the_normalized_article() {
    let chunks = split_text_into_chunks(ARTICLE, LOCAL_MAX_CHUNK_CHARS, false);

    assert!(chunks.len() >= 3, "expected several chunks, got {chunks:?}");
    assert!(chunks.iter().all(|chunk| chunk.chars().count() <= LOCAL_MAX_CHUNK_CHARS));
    assert!(chunks.iter().all(|chunk| !chunk.is_empty()));
    assert_eq!(chunks.join(" "), normalize_whitespace(ARTICLE));
}

#[test]
fn remote_chunks_keep_paragraphs_apart() {
    let text = format!("{ARTICLE}\n\n   \nShort closing paragraph.");
    let chunks = split_text_into_chunks(&text, REMOTE_MAX_CHUNK_CHARS, true);

    assert_eq!(chunks.last().map(String::as_str), Some("Short closing paragraph."));
    assert!(chunks.iter().all(|chunk| chunk.chars().count() <= REMOTE_MAX_CHUNK_CHARS));
    assert_eq!(chunks[..chunks.len() - 1].join(" "), normalize_whitespace(ARTICLE));
}

#[test]
fn rechunking_output_changes_nothing() {
    let chunks = split_text_into_chunks(ARTICLE, LOCAL_MAX_CHUNK_CHARS, false);
    for chunk in &chunks {
        assert_eq!(split_text_into_chunks(chunk, LOCAL_MAX_CHUNK_CHARS, false), vec![chunk.clone()]);
    }
}

#[test]
fn blank_input_produces_no_chunks() {
    assert!(split_text_into_chunks("", LOCAL_MAX_CHUNK_CHARS, false).is_empty());
    assert!(split_text_into_chunks(" \n\n\t ", REMOTE_MAX_CHUNK_CHARS, true).is_empty());
}
