use std::cell::{Cell, RefCell};

use pagescribe_core::{
    annotate, decode_data_url, encode_data_url, BatchOrchestrator, BatchOutcome, BatchResult,
    ExtractionOutcome, PageSource, TextExtractor,
};
use proptest::prelude::*;

/// Replies from the page payload: `ok:<text>` succeeds with `<text>`,
/// anything else fails. Tracks call order and in-flight calls.
#[derive(Default)]
struct ScriptedExtractor {
    in_flight: Cell<usize>,
    max_in_flight: Cell<usize>,
    calls: RefCell<Vec<String>>,
}

impl TextExtractor for ScriptedExtractor {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn submit(&self, image_data_url: &str) -> ExtractionOutcome {
        self.in_flight.set(self.in_flight.get() + 1);
        self.max_in_flight
            .set(self.max_in_flight.get().max(self.in_flight.get()));
        tokio::task::yield_now().await;
        let payload = String::from_utf8(decode_data_url(image_data_url).unwrap()).unwrap();
        self.calls.borrow_mut().push(payload.clone());
        self.in_flight.set(self.in_flight.get() - 1);
        match payload.strip_prefix("ok:") {
            Some(text) => ExtractionOutcome::success(text),
            None => ExtractionOutcome::failure(format!("provider rejected {payload}")),
        }
    }
}

fn page(payload: &str) -> PageSource {
    PageSource::DataUrl(encode_data_url("image/jpeg", payload.as_bytes()))
}

fn run(extractor: &ScriptedExtractor, sources: &[PageSource]) -> BatchResult {
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    rt.block_on(async {
        let mut orchestrator = BatchOrchestrator::new(extractor);
        orchestrator.process_images(sources).await
    })
}

#[test]
fn partial_failure_keeps_original_labels() {
    let extractor = ScriptedExtractor::default();
    let sources = vec![page("ok:Dear diary"), page("rate limited"), page("ok:It [rained]")];
    let batch = run(&extractor, &sources);

    assert_eq!(batch.results.len(), 3);
    assert_eq!(
        batch.combined_text,
        "[Page 1]\nDear diary\n\n[Page 3]\nIt [rained]"
    );
    assert_eq!(
        batch.outcome(),
        BatchOutcome::PartialSuccess {
            failed_pages: vec![2]
        }
    );
    assert_eq!(
        batch.results[1].error.as_deref(),
        Some("provider rejected rate limited")
    );
    assert_eq!(batch.results[2].error_ranges.len(), 1);
}

#[test]
fn all_failed_batch_offers_manual_entry() {
    let extractor = ScriptedExtractor::default();
    let batch = run(&extractor, &[page("x"), page("y")]);
    assert_eq!(batch.combined_text, "");
    assert!(batch.outcome().offers_manual_entry());
}

#[test]
fn calls_are_issued_one_at_a_time_in_order() {
    let extractor = ScriptedExtractor::default();
    let sources: Vec<_> = (1..=5).map(|i| page(&format!("ok:{i}"))).collect();
    run(&extractor, &sources);
    assert_eq!(extractor.max_in_flight.get(), 1);
    assert_eq!(
        *extractor.calls.borrow(),
        vec!["ok:1", "ok:2", "ok:3", "ok:4", "ok:5"]
    );
}

#[test]
fn combined_text_has_no_trailing_whitespace() {
    let extractor = ScriptedExtractor::default();
    let batch = run(&extractor, &[page("ok:last line  \n\n")]);
    assert_eq!(batch.combined_text, "[Page 1]\nlast line");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn results_match_inputs_and_labels_match_positions(
        pages in prop::collection::vec((any::<bool>(), "[a-z ]{0,12}"), 0..12)
    ) {
        let sources: Vec<_> = pages
            .iter()
            .map(|(ok, text)| if *ok { page(&format!("ok:{text}")) } else { page("fail") })
            .collect();
        let extractor = ScriptedExtractor::default();
        let batch = run(&extractor, &sources);

        prop_assert_eq!(batch.results.len(), pages.len());
        for (idx, ((ok, text), result)) in pages.iter().zip(&batch.results).enumerate() {
            prop_assert_eq!(result.success, *ok);
            if *ok {
                prop_assert_eq!(&result.extracted_text, text);
                let label = format!("[Page {}]", idx + 1);
                prop_assert!(batch.combined_text.contains(&label));
            } else {
                let label = format!("[Page {}]", idx + 1);
                prop_assert!(!batch.combined_text.contains(&label));
            }
        }
        let labels = batch.combined_text.matches("[Page ").count();
        prop_assert_eq!(labels, pages.iter().filter(|(ok, _)| *ok).count());
    }

    #[test]
    fn annotated_ranges_are_ordered_bracket_spans(text in "[a-z\\[\\] ]{0,40}") {
        let ranges = annotate(&text);
        let mut last_end = 0;
        for range in &ranges {
            prop_assert!(range.start >= last_end);
            prop_assert!(range.end > range.start);
            let span = range.slice(&text).unwrap();
            prop_assert!(span.starts_with('['));
            prop_assert!(span.ends_with(']'));
            prop_assert_eq!(span.matches(']').count(), 1);
            last_end = range.end;
        }
    }
}
