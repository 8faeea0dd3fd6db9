//! Per-exercise interaction state.
//!
//! [`ExerciseSession`] sequences one attempt at one exercise:
//!
//! ```text
//! Idle ──select──▶ Streaming ──stream ends──▶ AwaitingFollowUp ──next──▶ Advancing
//!                                              │        ▲
//!                                  pick question        follow-up ends
//!                                              ▼        │
//!                                            FollowUpStreaming
//! ```
//!
//! [`CategoryRun`] walks every exercise of one category, starting a fresh
//! session (and a fresh payload) for each.

use std::error::Error;
use std::fmt;

use crate::core::catalog::{Choice, Exercise, ExerciseCatalog};
use crate::core::decoder::{FeedbackPayload, StreamOutcome};
use crate::core::follow_up::FollowUpSplice;
use crate::core::quiz::QuizScore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Streaming,
    AwaitingFollowUp,
    FollowUpStreaming,
    Advancing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// A feedback or follow-up stream is still running.
    StreamInFlight,
    UnknownChoice(String),
    /// The question is not among the currently offered follow-ups.
    UnknownQuestion(String),
    /// "Next" before any choice was made.
    NoChoiceMade,
    /// A stream completion arrived for a phase that was not streaming.
    NotStreaming(Phase),
    /// The attempt already advanced.
    Finished,
    EmptyCategory(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::StreamInFlight => write!(f, "a response is still streaming"),
            SessionError::UnknownChoice(id) => write!(f, "unknown choice '{id}'"),
            SessionError::UnknownQuestion(q) => write!(f, "'{q}' is not an offered follow-up"),
            SessionError::NoChoiceMade => write!(f, "choose an answer before moving on"),
            SessionError::NotStreaming(phase) => {
                write!(f, "no stream in flight (phase {phase:?})")
            }
            SessionError::Finished => write!(f, "this exercise is already finished"),
            SessionError::EmptyCategory(category) => {
                write!(f, "no exercises in category '{category}'")
            }
        }
    }
}

impl Error for SessionError {}

#[derive(Debug, Clone)]
pub struct ExerciseSession {
    exercise: Exercise,
    phase: Phase,
    selected_choice: Option<String>,
    payload: FeedbackPayload,
}

impl ExerciseSession {
    pub fn new(exercise: Exercise) -> Self {
        Self {
            exercise,
            phase: Phase::Idle,
            selected_choice: None,
            payload: FeedbackPayload::default(),
        }
    }

    pub fn exercise(&self) -> &Exercise {
        &self.exercise
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn payload(&self) -> &FeedbackPayload {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut FeedbackPayload {
        &mut self.payload
    }

    pub fn selected_choice(&self) -> Option<&Choice> {
        self.selected_choice
            .as_deref()
            .and_then(|id| self.exercise.choice(id))
    }

    /// Pick a choice and enter `Streaming`. Selections made while a stream is
    /// in flight are refused and leave the session untouched.
    pub fn select_choice(&mut self, choice_id: &str) -> Result<&Choice, SessionError> {
        match self.phase {
            Phase::Streaming | Phase::FollowUpStreaming => {
                return Err(SessionError::StreamInFlight)
            }
            Phase::Advancing => return Err(SessionError::Finished),
            Phase::Idle | Phase::AwaitingFollowUp => {}
        }

        let choice = self
            .exercise
            .choice(choice_id)
            .ok_or_else(|| SessionError::UnknownChoice(choice_id.to_string()))?;

        self.selected_choice = Some(choice.id.clone());
        self.payload.clear();
        self.phase = Phase::Streaming;
        Ok(choice)
    }

    /// The primary stream stopped, whatever the reason.
    pub fn finish_feedback(&mut self, outcome: StreamOutcome) -> Result<(), SessionError> {
        if self.phase != Phase::Streaming {
            return Err(SessionError::NotStreaming(self.phase));
        }
        if outcome == StreamOutcome::Failed {
            self.payload.follow_up_questions.clear();
        }
        self.phase = Phase::AwaitingFollowUp;
        Ok(())
    }

    /// Pick one of the offered follow-up questions. The answer header is
    /// written immediately and the offered list is retired.
    pub fn begin_follow_up(&mut self, question: &str) -> Result<FollowUpSplice, SessionError> {
        match self.phase {
            Phase::AwaitingFollowUp => {}
            Phase::Streaming | Phase::FollowUpStreaming => {
                return Err(SessionError::StreamInFlight)
            }
            Phase::Advancing => return Err(SessionError::Finished),
            Phase::Idle => return Err(SessionError::NoChoiceMade),
        }
        if !self.payload.follow_up_questions.iter().any(|q| q == question) {
            return Err(SessionError::UnknownQuestion(question.to_string()));
        }

        let splice = FollowUpSplice::begin(&mut self.payload, question);
        self.phase = Phase::FollowUpStreaming;
        Ok(splice)
    }

    pub fn finish_follow_up(&mut self) -> Result<(), SessionError> {
        if self.phase != Phase::FollowUpStreaming {
            return Err(SessionError::NotStreaming(self.phase));
        }
        self.phase = Phase::AwaitingFollowUp;
        Ok(())
    }

    /// The explicit "next" action.
    pub fn advance(&mut self) -> Result<(), SessionError> {
        match self.phase {
            Phase::AwaitingFollowUp => {
                self.phase = Phase::Advancing;
                Ok(())
            }
            Phase::Streaming | Phase::FollowUpStreaming => Err(SessionError::StreamInFlight),
            Phase::Idle => Err(SessionError::NoChoiceMade),
            Phase::Advancing => Err(SessionError::Finished),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.phase == Phase::Streaming
    }

    pub fn is_follow_up_loading(&self) -> bool {
        self.phase == Phase::FollowUpStreaming
    }

    pub fn can_select_choice(&self) -> bool {
        matches!(self.phase, Phase::Idle | Phase::AwaitingFollowUp)
    }

    pub fn can_pick_follow_up(&self) -> bool {
        self.phase == Phase::AwaitingFollowUp && !self.payload.follow_up_questions.is_empty()
    }

    pub fn can_advance(&self) -> bool {
        self.phase == Phase::AwaitingFollowUp
    }

    /// `None` when the exercise is unscored or nothing was chosen yet.
    pub fn answered_correctly(&self) -> Option<bool> {
        self.exercise.correct_choice()?;
        self.selected_choice().map(|choice| choice.correct)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// A fresh session for the next exercise is ready.
    Next,
    CategoryComplete(QuizScore),
}

#[derive(Debug, Clone)]
pub struct CategoryRun {
    category: String,
    exercises: Vec<Exercise>,
    index: usize,
    current: ExerciseSession,
    score: QuizScore,
}

impl CategoryRun {
    pub fn new(catalog: &ExerciseCatalog, category: &str) -> Result<Self, SessionError> {
        let exercises: Vec<Exercise> = catalog
            .by_category(category)
            .into_iter()
            .cloned()
            .collect();
        let first = exercises
            .first()
            .cloned()
            .ok_or_else(|| SessionError::EmptyCategory(category.to_string()))?;

        Ok(Self {
            category: category.to_string(),
            exercises,
            index: 0,
            current: ExerciseSession::new(first),
            score: QuizScore::default(),
        })
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn current(&self) -> &ExerciseSession {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut ExerciseSession {
        &mut self.current
    }

    /// One-based position of the current exercise and the total count.
    pub fn position(&self) -> (usize, usize) {
        (self.index + 1, self.exercises.len())
    }

    pub fn score(&self) -> QuizScore {
        self.score
    }

    pub fn advance(&mut self) -> Result<Advance, SessionError> {
        self.current.advance()?;
        if let Some(correct) = self.current.answered_correctly() {
            self.score.record(correct);
        }

        match self.exercises.get(self.index + 1) {
            Some(next) => {
                self.current = ExerciseSession::new(next.clone());
                self.index += 1;
                Ok(Advance::Next)
            }
            None => Ok(Advance::CategoryComplete(self.score)),
        }
    }
}
