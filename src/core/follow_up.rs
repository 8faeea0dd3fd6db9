//! Splicing a follow-up answer onto feedback that is already on screen.
//!
//! The answer is streamed like any other, but instead of appending each
//! fragment the displayed text is rebuilt as "everything before the answer"
//! plus "the answer so far". The splice point is found by trimming exactly the
//! previously appended answer off the end of the text.

use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::core::constants::{follow_up_header, FOLLOW_UP_ERROR_MESSAGE};
use crate::core::decoder::{FeedbackPayload, StreamOutcome};
use crate::core::generator::StreamError;

#[derive(Debug, Default)]
pub struct FollowUpSplice {
    answer: String,
}

impl FollowUpSplice {
    /// Append the answer heading for `question` and retire the question list
    /// so nothing else can be picked while the answer streams.
    pub fn begin(payload: &mut FeedbackPayload, question: &str) -> Self {
        payload.follow_up_questions.clear();
        Self::start(&mut payload.main_text, question)
    }

    /// Append the answer heading to free-standing text, such as a chat turn.
    pub fn start(text: &mut String, question: &str) -> Self {
        text.push_str(&follow_up_header(question));
        Self::default()
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    /// Replace the previously spliced answer at the end of `main_text` with
    /// the answer extended by `fragment`.
    pub fn apply(&mut self, main_text: &mut String, fragment: &str) {
        if main_text.ends_with(self.answer.as_str()) {
            main_text.truncate(main_text.len() - self.answer.len());
            self.answer.push_str(fragment);
            main_text.push_str(&self.answer);
        } else {
            // Someone else rewrote the tail; appending is the only safe move.
            warn!("follow-up splice point lost; appending fragment");
            self.answer.push_str(fragment);
            main_text.push_str(fragment);
        }
    }
}

/// Stream a follow-up answer into `payload` behind a header written by
/// [`FollowUpSplice::begin`].
///
/// On error the partial answer is kept and [`FOLLOW_UP_ERROR_MESSAGE`] is
/// appended after it.
pub async fn splice_into<S, F>(
    mut fragments: S,
    payload: &mut FeedbackPayload,
    mut splice: FollowUpSplice,
    cancel: &CancellationToken,
    mut on_update: F,
) -> StreamOutcome
where
    S: Stream<Item = Result<String, StreamError>> + Unpin,
    F: FnMut(&FeedbackPayload),
{
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return StreamOutcome::Cancelled,
            next = fragments.next() => next,
        };

        if cancel.is_cancelled() {
            return StreamOutcome::Cancelled;
        }

        match next {
            Some(Ok(fragment)) => {
                splice.apply(&mut payload.main_text, &fragment);
                on_update(payload);
            }
            Some(Err(err)) => {
                warn!(error = %err, "follow-up stream failed");
                payload.main_text.push_str(FOLLOW_UP_ERROR_MESSAGE);
                on_update(payload);
                return StreamOutcome::Failed;
            }
            None => return StreamOutcome::Completed,
        }
    }
}
