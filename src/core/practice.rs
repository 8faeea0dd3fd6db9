//! Driving a category run against a text generator.
//!
//! [`Practice`] owns the [`CategoryRun`] and the generator handle. Every
//! stream it starts is tied to a child of the practice's own cancellation
//! token, so dropping the practice stops any consumer that is still running.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::constants::{FEEDBACK_ERROR_MESSAGE, FOLLOW_UP_ERROR_MESSAGE, MENTOR_INSTRUCTION};
use crate::core::decoder::{decode_into, FeedbackPayload, StreamOutcome};
use crate::core::follow_up::splice_into;
use crate::core::generator::{FragmentStream, GenerationRequest, StreamError, TextGenerator};
use crate::core::prompts::{choice_feedback_prompt, follow_up_prompt, structured_feedback_prompt};
use crate::core::session::{Advance, CategoryRun, ExerciseSession, SessionError};

pub struct Practice {
    generator: Arc<dyn TextGenerator>,
    run: CategoryRun,
    lifetime: CancellationToken,
}

impl Practice {
    pub fn new(generator: Arc<dyn TextGenerator>, run: CategoryRun) -> Self {
        Self {
            generator,
            run,
            lifetime: CancellationToken::new(),
        }
    }

    pub fn run(&self) -> &CategoryRun {
        &self.run
    }

    pub fn session(&self) -> &ExerciseSession {
        self.run.current()
    }

    /// A token the caller may cancel to stop the next stream early.
    pub fn stop_handle(&self) -> CancellationToken {
        self.lifetime.child_token()
    }

    /// Select a choice and stream feedback for it into the session payload.
    pub async fn choose<F>(
        &mut self,
        choice_id: &str,
        stop: &CancellationToken,
        mut on_update: F,
    ) -> Result<StreamOutcome, SessionError>
    where
        F: FnMut(&FeedbackPayload),
    {
        let session = self.run.current_mut();
        let choice = session.select_choice(choice_id)?.clone();
        debug!(exercise = %session.exercise().id, choice = %choice.id, "streaming feedback");

        let request = GenerationRequest::prompt(choice_feedback_prompt(session.exercise(), &choice))
            .with_instruction(MENTOR_INSTRUCTION);

        let outcome = match open_stream(self.generator.as_ref(), request, stop).await {
            Some(Ok(fragments)) => {
                decode_into(fragments, session.payload_mut(), stop, &mut on_update).await
            }
            Some(Err(err)) => {
                warn!(error = %err, "feedback request failed");
                let payload = session.payload_mut();
                payload.main_text = FEEDBACK_ERROR_MESSAGE.to_string();
                payload.follow_up_questions.clear();
                on_update(payload);
                StreamOutcome::Failed
            }
            None => StreamOutcome::Cancelled,
        };

        session.finish_feedback(outcome)?;
        Ok(outcome)
    }

    /// Non-streamed variant: one structured request fills the payload at once.
    pub async fn choose_structured(
        &mut self,
        choice_id: &str,
    ) -> Result<StreamOutcome, SessionError> {
        let session = self.run.current_mut();
        let choice = session.select_choice(choice_id)?.clone();
        let request =
            GenerationRequest::prompt(structured_feedback_prompt(session.exercise(), &choice))
                .with_instruction(MENTOR_INSTRUCTION);

        let outcome = match self.generator.generate_structured(request).await {
            Ok(structured) => {
                let payload = session.payload_mut();
                payload.main_text = structured.feedback;
                payload.follow_up_questions = structured
                    .follow_up_questions
                    .into_iter()
                    .map(|q| q.trim().to_string())
                    .filter(|q| !q.is_empty())
                    .collect();
                StreamOutcome::Completed
            }
            Err(err) => {
                warn!(error = %err, "structured feedback request failed");
                let payload = session.payload_mut();
                payload.main_text = FEEDBACK_ERROR_MESSAGE.to_string();
                payload.follow_up_questions.clear();
                StreamOutcome::Failed
            }
        };

        session.finish_feedback(outcome)?;
        Ok(outcome)
    }

    /// Answer one of the offered follow-up questions below the feedback.
    pub async fn ask_follow_up<F>(
        &mut self,
        question: &str,
        stop: &CancellationToken,
        mut on_update: F,
    ) -> Result<StreamOutcome, SessionError>
    where
        F: FnMut(&FeedbackPayload),
    {
        let session = self.run.current_mut();
        let previous_feedback = session.payload().main_text.clone();
        let splice = session.begin_follow_up(question)?;
        on_update(session.payload());

        let request =
            GenerationRequest::prompt(follow_up_prompt(session.exercise(), &previous_feedback, question))
                .with_instruction(MENTOR_INSTRUCTION);

        let outcome = match open_stream(self.generator.as_ref(), request, stop).await {
            Some(Ok(fragments)) => {
                splice_into(fragments, session.payload_mut(), splice, stop, &mut on_update).await
            }
            Some(Err(err)) => {
                warn!(error = %err, "follow-up request failed");
                session.payload_mut().main_text.push_str(FOLLOW_UP_ERROR_MESSAGE);
                on_update(session.payload());
                StreamOutcome::Failed
            }
            None => StreamOutcome::Cancelled,
        };

        session.finish_follow_up()?;
        Ok(outcome)
    }

    pub fn next(&mut self) -> Result<Advance, SessionError> {
        self.run.advance()
    }
}

impl Drop for Practice {
    fn drop(&mut self) {
        self.lifetime.cancel();
    }
}

/// `None` when `stop` fired before the provider answered.
async fn open_stream(
    generator: &dyn TextGenerator,
    request: GenerationRequest,
    stop: &CancellationToken,
) -> Option<Result<FragmentStream, StreamError>> {
    tokio::select! {
        biased;
        _ = stop.cancelled() => None,
        result = generator.stream_text(request) => Some(result),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::ExerciseCatalog;
    use crate::core::constants::follow_up_header;
    use crate::core::generator::testing::{ok, ScriptedGenerator};
    use crate::core::session::Phase;
    use crate::core::structured::{StructuredFeedback, StructuredFeedbackError};

    fn single_exercise_catalog() -> ExerciseCatalog {
        ExerciseCatalog::from_toml(
            r#"
            [[exercises]]
            id = "e1"
            category = "intro"
            title = "First week"
            description = "A teammate asks for help"
            choices = [
              { id = "c1", text = "Help right away", correct = true },
              { id = "c2", text = "Ignore it" },
            ]
            "#,
        )
        .unwrap()
    }

    fn practice_with(generator: ScriptedGenerator) -> (Practice, Arc<ScriptedGenerator>) {
        let generator = Arc::new(generator);
        let run = CategoryRun::new(&single_exercise_catalog(), "intro").unwrap();
        (Practice::new(generator.clone(), run), generator)
    }

    #[tokio::test]
    async fn choice_streams_feedback_and_publishes_questions() {
        let (mut practice, generator) = practice_with(ScriptedGenerator::new(vec![ok(&[
            "Intro text ",
            "more ",
            "%%%QUESTIONS%%%Why?\nHow?",
        ])]));
        let stop = practice.stop_handle();
        let mut updates = Vec::new();

        let outcome = practice
            .choose("c1", &stop, |p: &FeedbackPayload| updates.push(p.main_text.clone()))
            .await
            .unwrap();

        assert_eq!(outcome, StreamOutcome::Completed);
        let session = practice.session();
        assert_eq!(session.payload().main_text, "Intro text more ");
        assert_eq!(session.payload().follow_up_questions, vec!["Why?", "How?"]);
        assert_eq!(session.phase(), Phase::AwaitingFollowUp);
        assert!(!session.is_loading());
        assert_eq!(updates.first().map(String::as_str), Some("Intro text "));

        let request = &generator.recorded()[0];
        assert_eq!(request.instruction.as_deref(), Some(MENTOR_INSTRUCTION));
        assert!(request.messages[0].content.contains("Help right away"));
    }

    #[tokio::test]
    async fn empty_stream_still_clears_loading() {
        let (mut practice, _) = practice_with(ScriptedGenerator::new(vec![vec![]]));
        let stop = practice.stop_handle();

        let outcome = practice
            .choose("c1", &stop, |_: &FeedbackPayload| {})
            .await
            .unwrap();

        assert_eq!(outcome, StreamOutcome::Completed);
        assert_eq!(practice.session().payload(), &FeedbackPayload::default());
        assert!(!practice.session().is_loading());
    }

    #[tokio::test]
    async fn stream_error_substitutes_message_and_clears_loading() {
        let (mut practice, _) = practice_with(ScriptedGenerator::new(vec![vec![
            Ok("partial ".to_string()),
            Err(StreamError::Api("overloaded".to_string())),
        ]]));
        let stop = practice.stop_handle();

        let outcome = practice
            .choose("c1", &stop, |_: &FeedbackPayload| {})
            .await
            .unwrap();

        assert_eq!(outcome, StreamOutcome::Failed);
        assert_eq!(practice.session().payload().main_text, FEEDBACK_ERROR_MESSAGE);
        assert!(practice.session().payload().follow_up_questions.is_empty());
        assert!(!practice.session().is_loading());
        assert!(practice.session().can_advance());
    }

    #[tokio::test]
    async fn request_failure_is_reported_like_a_stream_failure() {
        // No scripts: the generator fails before producing a stream.
        let (mut practice, _) = practice_with(ScriptedGenerator::new(vec![]));
        let stop = practice.stop_handle();

        let outcome = practice
            .choose("c1", &stop, |_: &FeedbackPayload| {})
            .await
            .unwrap();

        assert_eq!(outcome, StreamOutcome::Failed);
        assert_eq!(practice.session().payload().main_text, FEEDBACK_ERROR_MESSAGE);
        assert_eq!(practice.session().phase(), Phase::AwaitingFollowUp);
    }

    #[tokio::test]
    async fn follow_up_is_spliced_after_header() {
        let (mut practice, generator) = practice_with(ScriptedGenerator::new(vec![
            ok(&["Nice.", "%%%QUESTIONS%%%Why?\nHow?"]),
            ok(&["Because ", "it ", "helps."]),
        ]));
        let stop = practice.stop_handle();
        practice
            .choose("c1", &stop, |_: &FeedbackPayload| {})
            .await
            .unwrap();

        let header = follow_up_header("Why?");
        let mut seen = Vec::new();
        let outcome = practice
            .ask_follow_up("Why?", &stop, |p: &FeedbackPayload| {
                seen.push(p.main_text.clone())
            })
            .await
            .unwrap();

        assert_eq!(outcome, StreamOutcome::Completed);
        assert_eq!(
            seen,
            vec![
                format!("Nice.{header}"),
                format!("Nice.{header}Because "),
                format!("Nice.{header}Because it "),
                format!("Nice.{header}Because it helps."),
            ]
        );
        let session = practice.session();
        assert!(session.payload().follow_up_questions.is_empty());
        assert_eq!(session.phase(), Phase::AwaitingFollowUp);
        assert!(!session.is_follow_up_loading());
        assert!(generator.recorded()[1].messages[0].content.contains("Nice."));
    }

    #[tokio::test]
    async fn follow_up_failure_appends_error_after_partial_answer() {
        let (mut practice, _) = practice_with(ScriptedGenerator::new(vec![
            ok(&["Nice.%%%QUESTIONS%%%Why?"]),
            vec![
                Ok("Part".to_string()),
                Err(StreamError::Disconnected),
            ],
        ]));
        let stop = practice.stop_handle();
        practice
            .choose("c1", &stop, |_: &FeedbackPayload| {})
            .await
            .unwrap();
        let outcome = practice
            .ask_follow_up("Why?", &stop, |_: &FeedbackPayload| {})
            .await
            .unwrap();

        assert_eq!(outcome, StreamOutcome::Failed);
        assert_eq!(
            practice.session().payload().main_text,
            format!("Nice.{}Part{}", follow_up_header("Why?"), FOLLOW_UP_ERROR_MESSAGE)
        );
        assert!(practice.session().can_advance());
    }

    #[tokio::test]
    async fn stopped_stream_leaves_payload_untouched() {
        let (mut practice, _) = practice_with(ScriptedGenerator::new(vec![ok(&["text"])]));
        let stop = practice.stop_handle();
        stop.cancel();

        let outcome = practice
            .choose("c1", &stop, |_: &FeedbackPayload| panic!("no update expected"))
            .await
            .unwrap();

        assert_eq!(outcome, StreamOutcome::Cancelled);
        assert!(practice.session().payload().main_text.is_empty());
        assert!(!practice.session().is_loading());
    }

    #[tokio::test]
    async fn dropping_practice_cancels_handed_out_tokens() {
        let (practice, _) = practice_with(ScriptedGenerator::new(vec![]));
        let stop = practice.stop_handle();
        drop(practice);
        assert!(stop.is_cancelled());
    }

    #[tokio::test]
    async fn structured_feedback_fills_payload() {
        let (mut practice, _) = practice_with(ScriptedGenerator::new(vec![]).with_structured(Ok(
            StructuredFeedback {
                feedback: "Solid choice.".to_string(),
                follow_up_questions: vec!["Why?".to_string(), "  ".to_string()],
            },
        )));

        let outcome = practice.choose_structured("c1").await.unwrap();

        assert_eq!(outcome, StreamOutcome::Completed);
        assert_eq!(practice.session().payload().main_text, "Solid choice.");
        assert_eq!(practice.session().payload().follow_up_questions, vec!["Why?"]);
    }

    #[tokio::test]
    async fn structured_feedback_error_uses_error_message() {
        let (mut practice, _) = practice_with(
            ScriptedGenerator::new(vec![])
                .with_structured(Err(StructuredFeedbackError::Invalid(
                    "missing field `feedback`".to_string(),
                ))),
        );

        let outcome = practice.choose_structured("c2").await.unwrap();

        assert_eq!(outcome, StreamOutcome::Failed);
        assert_eq!(practice.session().payload().main_text, FEEDBACK_ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn finishing_the_only_exercise_completes_the_category() {
        let (mut practice, _) =
            practice_with(ScriptedGenerator::new(vec![ok(&["ok"])]));
        let stop = practice.stop_handle();
        practice
            .choose("c1", &stop, |_: &FeedbackPayload| {})
            .await
            .unwrap();

        match practice.next().unwrap() {
            Advance::CategoryComplete(score) => assert!(score.passed()),
            other => panic!("expected completion, got {other:?}"),
        }
    }
}
