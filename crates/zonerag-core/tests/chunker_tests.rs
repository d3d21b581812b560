use zonerag_core::chunker::{chunk, Chunker};
use zonerag_core::config::ChunkingConfig;
use zonerag_core::error::{Error, MalformedInputError};
use zonerag_core::tokenize::WordTokenizer;
use zonerag_core::traits::{TokenSpan, Tokenizer};
use zonerag_core::types::{ParsedDocument, ParsedPage};

fn page(number: u32, text: &str) -> ParsedPage {
    ParsedPage { number, text: text.to_string(), tables: Vec::new() }
}

fn doc(pages: Vec<ParsedPage>) -> ParsedDocument {
    ParsedDocument { city: "San Francisco".into(), document_id: "sf_planning".into(), zoning_label: None, pages }
}

fn words(range: std::ops::Range<usize>) -> String {
    range.map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
}

fn token_texts(text: &str) -> Vec<String> {
    WordTokenizer.tokenize(text).unwrap().iter().map(|s| text[s.start..s.end].to_string()).collect()
}

#[test]
fn hard_cuts_respect_budget_and_overlap_exactly() {
    let d = doc(vec![page(1, &words(0..100))]);
    let out = chunk(&d, 20, 5).expect("valid budget");
    assert!(out.skipped.is_empty());

    let starts: Vec<String> = out.chunks.iter().map(|c| token_texts(&c.text)[0].clone()).collect();
    assert_eq!(starts, vec!["w0", "w15", "w30", "w45", "w60", "w75", "w90"]);

    let last = out.chunks.len() - 1;
    for (i, c) in out.chunks.iter().enumerate() {
        assert!(c.token_count <= 20, "chunk {i} has {} tokens", c.token_count);
        if i < last {
            assert!(c.token_count >= 18, "chunk {i} below min: {}", c.token_count);
        }
        assert_eq!(c.token_count, token_texts(&c.text).len());
        assert_eq!(c.chunk_index, i);
    }
    assert_eq!(out.chunks[last].token_count, 10);

    for pair in out.chunks.windows(2) {
        let a = token_texts(&pair[0].text);
        let b = token_texts(&pair[1].text);
        assert_eq!(a[a.len() - 5..], b[..5], "consecutive chunks share exactly the overlap");
    }
}

#[test]
fn cut_moves_back_to_sentence_end_inside_lookback() {
    // 18 words, a period, then more words: the period is token 18.
    let text = format!("{}. {}", words(0..18), words(18..60));
    let out = chunk(&doc(vec![page(1, &text)]), 20, 5).expect("valid budget");
    let first = &out.chunks[0];
    assert_eq!(first.token_count, 19);
    assert!(first.text.ends_with("w17."), "got {:?}", first.text);
}

#[test]
fn line_break_counts_as_boundary() {
    let text = format!("{}\n{}", words(0..19), words(19..60));
    let out = chunk(&doc(vec![page(1, &text)]), 20, 5).expect("valid budget");
    assert_eq!(out.chunks[0].token_count, 19);
    assert_eq!(out.chunks[0].line_range.start, 1);
    assert_eq!(out.chunks[0].line_range.end, 1);
    assert_eq!(out.chunks[1].line_range.start, 1);
    assert_eq!(out.chunks[1].line_range.end, 2);
}

#[test]
fn line_ranges_match_byte_offsets() {
    let text: String = (0..30).map(|l| format!("{}\n", words(l * 4..l * 4 + 4))).collect();
    let d = doc(vec![page(7, &text)]);
    let out = chunk(&d, 20, 5).expect("valid budget");
    for c in &out.chunks {
        let (start, end) = c.byte_range;
        assert_eq!(&text[start..end], c.text);
        let expected_start = 1 + text[..start].matches('\n').count() as u32;
        let expected_end = 1 + text[..end - 1].matches('\n').count() as u32;
        assert_eq!(c.line_range.start, expected_start);
        assert_eq!(c.line_range.end, expected_end);
        assert_eq!(c.page_number, 7);
    }
}

#[test]
fn chunks_never_span_pages() {
    let d = doc(vec![page(1, &words(0..30)), page(2, &words(100..130))]);
    let out = chunk(&d, 20, 5).expect("valid budget");
    for c in &out.chunks {
        let source = &d.pages.iter().find(|p| p.number == c.page_number).unwrap().text;
        assert!(source.contains(&c.text));
        assert_eq!(c.source_document_id, "sf_planning");
        assert_eq!(c.city, "San Francisco");
    }
    let page_two: Vec<_> = out.chunks.iter().filter(|c| c.page_number == 2).collect();
    assert_eq!(page_two[0].chunk_index, 0);
    assert!(page_two[0].text.starts_with("w100"));
}

#[test]
fn empty_and_duplicate_pages_are_skipped() {
    let d = doc(vec![page(1, &words(0..10)), page(2, "  \n "), page(3, &words(10..20)), page(3, "again")]);
    let out = chunk(&d, 20, 5).expect("valid budget");
    assert_eq!(out.skipped.len(), 2);
    assert!(out.skipped[0].location.contains("page 2"));
    assert!(out.skipped[1].reason.contains("duplicate"));
    let pages: Vec<u32> = out.chunks.iter().map(|c| c.page_number).collect();
    assert_eq!(pages, vec![1, 3]);
}

#[test]
fn invalid_document_yields_no_chunks() {
    let mut d = doc(vec![page(1, "text")]);
    d.city = " ".into();
    let out = chunk(&d, 20, 5).expect("valid budget");
    assert!(out.chunks.is_empty());
    assert_eq!(out.skipped.len(), 1);
}

#[test]
fn chunking_is_deterministic() {
    let text = format!("{}. {}\n{}", words(0..40), words(40..80), words(80..150));
    let d = doc(vec![page(1, &text), page(2, &words(0..45))]);
    let a = chunk(&d, 25, 6).expect("valid budget");
    let b = chunk(&d, 25, 6).expect("valid budget");
    assert_eq!(a.chunks, b.chunks);
}

#[test]
fn overlap_must_fit_inside_min_budget() {
    let err = chunk(&doc(vec![page(1, "x")]), 10, 9).unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
}

#[test]
fn zoning_codes_tag_unlabelled_chunks() {
    let config = ChunkingConfig { zoning_codes: vec!["RH-1".into(), "RH-2".into()], ..ChunkingConfig::new(20, 5) };
    let chunker = Chunker::new(config).expect("valid config");
    let d = doc(vec![page(1, "In RH-2 districts two units are allowed."), page(2, "RH-1 and RH-2 differ.")]);
    let out = chunker.chunk(&d);
    assert_eq!(out.chunks[0].zoning_label.as_deref(), Some("RH-2"));
    assert_eq!(out.chunks[1].zoning_label, None);

    let mut labelled = d.clone();
    labelled.zoning_label = Some("RM-1".into());
    assert!(chunker.chunk(&labelled).chunks.iter().all(|c| c.zoning_label.as_deref() == Some("RM-1")));
}

#[test]
fn shipped_zoning_codes_tag_the_longest_match() {
    let codes = ["RH-1", "RH-1(D)", "RH-2", "RH-3", "RM-1", "RM-2", "RS-1", "RD-1", "RD-2"];
    let config =
        ChunkingConfig { zoning_codes: codes.iter().map(|c| c.to_string()).collect(), ..ChunkingConfig::new(20, 5) };
    let chunker = Chunker::new(config).expect("valid config");
    let d = doc(vec![
        page(1, "Lots in RH-1(D) districts need 4000 sqft."),
        page(2, "Lots in RH-1 districts need 2500 sqft."),
        page(3, "RH-1(D) differs from RH-1."),
    ]);
    let out = chunker.chunk(&d);
    let labels: Vec<Option<&str>> = out.chunks.iter().map(|c| c.zoning_label.as_deref()).collect();
    assert_eq!(labels, vec![Some("RH-1(D)"), Some("RH-1"), None]);
}

#[test]
fn same_document_name_in_two_cities_gets_distinct_ids() {
    let sf = ParsedDocument { document_id: "Zoning_Code".into(), ..doc(vec![page(1, &words(0..30))]) };
    let oak = ParsedDocument { city: "Oakland".into(), ..sf.clone() };
    let a = chunk(&sf, 20, 5).expect("valid budget");
    let b = chunk(&oak, 20, 5).expect("valid budget");
    assert_eq!(a.chunks.len(), b.chunks.len());
    for (x, y) in a.chunks.iter().zip(&b.chunks) {
        assert_eq!(x.byte_range, y.byte_range);
        assert_ne!(x.id, y.id);
    }
}

struct FailingTokenizer;

impl Tokenizer for FailingTokenizer {
    fn tokenize(&self, text: &str) -> Result<Vec<TokenSpan>, MalformedInputError> {
        if text.contains("BAD") {
            return Err(MalformedInputError::new("tokenizer", "unsupported input"));
        }
        WordTokenizer.tokenize(text)
    }
}

#[test]
fn tokenizer_failure_skips_only_that_page() {
    let chunker = Chunker::with_tokenizer(FailingTokenizer, ChunkingConfig::new(20, 5)).expect("valid config");
    let out = chunker.chunk(&doc(vec![page(1, "BAD page"), page(2, "good page")]));
    assert_eq!(out.skipped.len(), 1);
    assert!(out.skipped[0].reason.contains("token count unavailable"));
    assert_eq!(out.chunks.len(), 1);
    assert_eq!(out.chunks[0].page_number, 2);
}
