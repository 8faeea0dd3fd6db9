//! Incremental assembly of a streamed feedback answer.
//!
//! A feedback stream carries two payloads: the answer shown to the user and,
//! after [`QUESTIONS_MARKER`], a newline-delimited list of suggested follow-up
//! questions. The marker is only recognised when a single fragment contains
//! it whole; a marker split across fragments stays part of the answer text.

use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::constants::{FEEDBACK_ERROR_MESSAGE, QUESTIONS_MARKER};
use crate::core::generator::StreamError;

/// What the user sees for one exercise attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackPayload {
    pub main_text: String,
    pub follow_up_questions: Vec<String>,
}

impl FeedbackPayload {
    pub fn clear(&mut self) {
        self.main_text.clear();
        self.follow_up_questions.clear();
    }
}

/// How a stream consumer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed,
    /// The stream errored; the payload already carries the error message.
    Failed,
    /// The owner went away; the payload was left as it was.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct StreamDecoder {
    marker: String,
    main_text: String,
    pending_questions: String,
    marker_seen: bool,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new(QUESTIONS_MARKER)
    }
}

impl StreamDecoder {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            main_text: String::new(),
            pending_questions: String::new(),
            marker_seen: false,
        }
    }

    /// Feed one fragment. Returns the part that was appended to the main
    /// text, or `None` when the fragment belonged to the question list.
    pub fn push<'f>(&mut self, fragment: &'f str) -> Option<&'f str> {
        if self.marker_seen {
            self.pending_questions.push_str(fragment);
            return None;
        }

        match fragment.split_once(self.marker.as_str()) {
            None => {
                self.main_text.push_str(fragment);
                Some(fragment)
            }
            Some((before, after)) => {
                self.main_text.push_str(before);
                self.pending_questions.push_str(after);
                self.marker_seen = true;
                Some(before)
            }
        }
    }

    pub fn marker_seen(&self) -> bool {
        self.marker_seen
    }

    /// The follow-up questions collected so far.
    pub fn follow_up_questions(&self) -> Vec<String> {
        parse_follow_up_questions(&self.pending_questions)
    }

    pub fn finish(self) -> FeedbackPayload {
        let follow_up_questions = parse_follow_up_questions(&self.pending_questions);
        FeedbackPayload {
            main_text: self.main_text,
            follow_up_questions,
        }
    }
}

/// One question per line; lines are trimmed and blanks dropped.
pub fn parse_follow_up_questions(buffer: &str) -> Vec<String> {
    buffer
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Consume `fragments` into `payload`, calling `on_update` after every change
/// to the main text and once more when the question list is published.
///
/// Errors are absorbed: the main text is replaced with
/// [`FEEDBACK_ERROR_MESSAGE`] and the question list cleared. Cancellation is
/// checked before every write to `payload`.
pub async fn decode_into<S, F>(
    mut fragments: S,
    payload: &mut FeedbackPayload,
    cancel: &CancellationToken,
    mut on_update: F,
) -> StreamOutcome
where
    S: Stream<Item = Result<String, StreamError>> + Unpin,
    F: FnMut(&FeedbackPayload),
{
    let mut decoder = StreamDecoder::default();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return StreamOutcome::Cancelled,
            next = fragments.next() => next,
        };

        match next {
            Some(Ok(fragment)) => {
                if cancel.is_cancelled() {
                    return StreamOutcome::Cancelled;
                }
                if let Some(appended) = decoder.push(&fragment) {
                    payload.main_text.push_str(appended);
                    on_update(payload);
                }
            }
            Some(Err(err)) => {
                if cancel.is_cancelled() {
                    return StreamOutcome::Cancelled;
                }
                warn!(error = %err, "feedback stream failed");
                payload.main_text = FEEDBACK_ERROR_MESSAGE.to_string();
                payload.follow_up_questions.clear();
                on_update(payload);
                return StreamOutcome::Failed;
            }
            None => break,
        }
    }

    if cancel.is_cancelled() {
        return StreamOutcome::Cancelled;
    }

    let questions = decoder.follow_up_questions();
    debug!(
        marker_seen = decoder.marker_seen(),
        questions = questions.len(),
        "feedback stream finished"
    );
    if !questions.is_empty() {
        payload.follow_up_questions = questions;
        on_update(payload);
    }
    StreamOutcome::Completed
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn decode_all(fragments: &[&str]) -> FeedbackPayload {
        let mut decoder = StreamDecoder::default();
        for fragment in fragments {
            decoder.push(fragment);
        }
        decoder.finish()
    }

    #[test]
    fn splits_main_text_and_questions_at_marker() {
        let decoded = decode_all(&["Good call.", QUESTIONS_MARKER, "What next?"]);
        assert_eq!(decoded.main_text, "Good call.");
        assert_eq!(decoded.follow_up_questions, vec!["What next?"]);
    }

    #[test]
    fn marker_straddling_fragments_is_not_detected() {
        let decoded = decode_all(&["foo%%%QUES", "TIONS%%%bar"]);
        assert_eq!(decoded.main_text, "foo%%%QUESTIONS%%%bar");
        assert!(decoded.follow_up_questions.is_empty());
    }

    #[test]
    fn splits_on_first_marker_only() {
        let decoded = decode_all(&["a%%%QUESTIONS%%%Q1\n%%%QUESTIONS%%%Q2"]);
        assert_eq!(decoded.main_text, "a");
        assert_eq!(decoded.follow_up_questions, vec!["Q1", "%%%QUESTIONS%%%Q2"]);
    }

    #[test]
    fn fragments_after_marker_go_to_questions_verbatim() {
        let mut decoder = StreamDecoder::default();
        assert_eq!(decoder.push("intro"), Some("intro"));
        assert_eq!(decoder.push("%%%QUESTIONS%%%Why"), Some(""));
        assert_eq!(decoder.push("?\nHow"), None);
        assert_eq!(decoder.push("?"), None);
        let decoded = decoder.finish();
        assert_eq!(decoded.main_text, "intro");
        assert_eq!(decoded.follow_up_questions, vec!["Why?", "How?"]);
    }

    #[test]
    fn blank_question_lines_are_dropped() {
        assert_eq!(parse_follow_up_questions("Q1\n\nQ2\n  \n"), vec!["Q1", "Q2"]);
        assert!(parse_follow_up_questions("").is_empty());
    }

    #[test]
    fn custom_marker_is_honoured() {
        let mut decoder = StreamDecoder::new("##");
        decoder.push("answer##one\ntwo");
        let decoded = decoder.finish();
        assert_eq!(decoded.main_text, "answer");
        assert_eq!(decoded.follow_up_questions, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn decode_into_emits_update_per_main_fragment() {
        let fragments = stream::iter(vec![
            Ok("Intro text ".to_string()),
            Ok("more ".to_string()),
            Ok("%%%QUESTIONS%%%Why?\nHow?".to_string()),
        ]);
        let mut payload = FeedbackPayload::default();
        let mut seen = Vec::new();

        let outcome = decode_into(
            fragments,
            &mut payload,
            &CancellationToken::new(),
            |p: &FeedbackPayload| seen.push(p.main_text.clone()),
        )
        .await;

        assert_eq!(outcome, StreamOutcome::Completed);
        assert_eq!(payload.main_text, "Intro text more ");
        assert_eq!(payload.follow_up_questions, vec!["Why?", "How?"]);
        assert_eq!(
            seen,
            vec![
                "Intro text ",
                "Intro text more ",
                "Intro text more ",
                "Intro text more "
            ]
        );
    }

    #[tokio::test]
    async fn empty_stream_completes_with_empty_payload() {
        let mut payload = FeedbackPayload::default();
        let mut updates = 0;
        let outcome = decode_into(
            stream::iter(Vec::<Result<String, StreamError>>::new()),
            &mut payload,
            &CancellationToken::new(),
            |_: &FeedbackPayload| updates += 1,
        )
        .await;

        assert_eq!(outcome, StreamOutcome::Completed);
        assert_eq!(payload, FeedbackPayload::default());
        assert_eq!(updates, 0);
    }

    #[tokio::test]
    async fn error_replaces_partial_text() {
        let fragments = stream::iter(vec![
            Ok("partial".to_string()),
            Err(StreamError::Api("boom".to_string())),
            Ok("never seen".to_string()),
        ]);
        let mut payload = FeedbackPayload::default();

        let outcome = decode_into(
            fragments,
            &mut payload,
            &CancellationToken::new(),
            |_: &FeedbackPayload| {},
        )
        .await;

        assert_eq!(outcome, StreamOutcome::Failed);
        assert_eq!(payload.main_text, FEEDBACK_ERROR_MESSAGE);
        assert!(payload.follow_up_questions.is_empty());
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_any_write() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut payload = FeedbackPayload::default();

        let outcome = decode_into(
            stream::iter(vec![Ok("ignored".to_string())]),
            &mut payload,
            &cancel,
            |_: &FeedbackPayload| panic!("no updates after cancellation"),
        )
        .await;

        assert_eq!(outcome, StreamOutcome::Cancelled);
        assert!(payload.main_text.is_empty());
    }

    #[tokio::test]
    async fn cancellation_mid_stream_leaves_earlier_text() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let fragments = stream::iter(vec![Ok("first".to_string()), Ok("second".to_string())]);
        let mut payload = FeedbackPayload::default();

        let outcome = decode_into(fragments, &mut payload, &cancel, |_: &FeedbackPayload| {
            trigger.cancel()
        })
        .await;

        assert_eq!(outcome, StreamOutcome::Cancelled);
        assert_eq!(payload.main_text, "first");
    }
}
