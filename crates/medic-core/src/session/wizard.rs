//! Follow-up question wizard.
//!
//! Drives the user through the server-assigned follow-up questions one at a
//! time: record an answer, move forward only once the current answer is
//! non-empty, move backward without ever losing recorded answers, and hand
//! the completed question->answer map to the submission pipeline exactly
//! once.

use crate::error::{MedicError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where the wizard currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WizardState {
    /// No questions loaded yet.
    Idle,
    /// Presenting the question at `cursor` (0 <= cursor < question count).
    Active { cursor: usize },
    /// Every question answered; waiting for the submit affordance.
    ReadyToSubmit,
    /// A submission is in flight; further submit calls are rejected.
    Submitting,
    /// Submission accepted. The wizard is not reusable past this point.
    Submitted,
}

/// The follow-up question state machine.
///
/// Answers are recorded per question index so that backward navigation
/// restores exactly what was previously entered. The `Submitting` state is
/// the double-submission guard: `begin_submit` yields the answer map once,
/// and a second call before `submit_failed`/`submit_succeeded` is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpWizard {
    questions: Vec<String>,
    answers: Vec<String>,
    state: WizardState,
}

impl FollowUpWizard {
    /// Creates a wizard with no questions loaded.
    pub fn new() -> Self {
        Self {
            questions: Vec::new(),
            answers: Vec::new(),
            state: WizardState::Idle,
        }
    }

    /// Loads the server-assigned question list.
    ///
    /// Moves to `Active(0)` when the list is non-empty; an empty list keeps
    /// the wizard idle. The list is immutable once loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if questions were already loaded.
    pub fn load_questions(&mut self, questions: Vec<String>) -> Result<()> {
        if self.state != WizardState::Idle {
            return Err(MedicError::session("follow-up questions already loaded"));
        }

        if questions.is_empty() {
            return Ok(());
        }

        self.answers = vec![String::new(); questions.len()];
        self.questions = questions;
        self.state = WizardState::Active { cursor: 0 };
        Ok(())
    }

    /// Returns the current state.
    pub fn state(&self) -> &WizardState {
        &self.state
    }

    /// Returns the loaded questions.
    pub fn questions(&self) -> &[String] {
        &self.questions
    }

    /// Returns the question currently presented, if any.
    pub fn current_question(&self) -> Option<&str> {
        match self.state {
            WizardState::Active { cursor } => self.questions.get(cursor).map(String::as_str),
            _ => None,
        }
    }

    /// Returns the recorded answer for the current question, if any.
    ///
    /// Used to restore the input field after backward navigation.
    pub fn current_answer(&self) -> Option<&str> {
        match self.state {
            WizardState::Active { cursor } => self.answers.get(cursor).map(String::as_str),
            _ => None,
        }
    }

    /// Records the answer for the current question without advancing.
    ///
    /// Advancing is a separate, explicit action so that forward navigation
    /// can insist on a non-empty answer.
    ///
    /// # Errors
    ///
    /// Returns an error unless a question is currently presented.
    pub fn answer(&mut self, text: impl Into<String>) -> Result<()> {
        match self.state {
            WizardState::Active { cursor } => {
                self.answers[cursor] = text.into();
                Ok(())
            }
            _ => Err(MedicError::session("no question is currently presented")),
        }
    }

    /// Moves to the next question, or to `ReadyToSubmit` past the last one.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the current answer is empty or
    /// whitespace-only, and a session error outside `Active`.
    pub fn next(&mut self) -> Result<()> {
        let cursor = match self.state {
            WizardState::Active { cursor } => cursor,
            _ => return Err(MedicError::session("wizard is not presenting a question")),
        };

        if self.answers[cursor].trim().is_empty() {
            return Err(MedicError::validation(
                "answer the current question before continuing",
            ));
        }

        if cursor + 1 == self.questions.len() {
            self.state = WizardState::ReadyToSubmit;
        } else {
            self.state = WizardState::Active { cursor: cursor + 1 };
        }
        Ok(())
    }

    /// Moves back to the previous question.
    ///
    /// Recorded answers are never cleared by navigation; the caller reads
    /// `current_answer` to restore the input field.
    ///
    /// # Errors
    ///
    /// Returns an error at the first question or outside `Active`.
    pub fn prev(&mut self) -> Result<()> {
        match self.state {
            WizardState::Active { cursor } if cursor > 0 => {
                self.state = WizardState::Active { cursor: cursor - 1 };
                Ok(())
            }
            WizardState::Active { .. } => {
                Err(MedicError::session("already at the first question"))
            }
            _ => Err(MedicError::session("wizard is not presenting a question")),
        }
    }

    /// Begins the submission, yielding the completed question->answer map.
    ///
    /// Transitions to `Submitting`, so a second invocation before the
    /// in-flight submission settles is rejected and cannot trigger a
    /// duplicate network call.
    ///
    /// # Errors
    ///
    /// Returns an error outside `ReadyToSubmit`, or if any answer turns out
    /// empty (which navigation should have made impossible).
    pub fn begin_submit(&mut self) -> Result<HashMap<String, String>> {
        match self.state {
            WizardState::ReadyToSubmit => {}
            WizardState::Submitting => {
                return Err(MedicError::session("a submission is already in flight"));
            }
            _ => return Err(MedicError::session("not every question has been answered")),
        }

        if self.answers.iter().any(|a| a.trim().is_empty()) {
            return Err(MedicError::validation("every question must be answered"));
        }

        self.state = WizardState::Submitting;
        Ok(self
            .questions
            .iter()
            .cloned()
            .zip(self.answers.iter().cloned())
            .collect())
    }

    /// Records that the in-flight submission failed.
    ///
    /// The wizard returns to `ReadyToSubmit` so the user can retry.
    pub fn submit_failed(&mut self) {
        if self.state == WizardState::Submitting {
            self.state = WizardState::ReadyToSubmit;
        }
    }

    /// Records that the in-flight submission succeeded.
    ///
    /// `Submitted` is terminal: a new session creates a new wizard.
    pub fn submit_succeeded(&mut self) {
        if self.state == WizardState::Submitting {
            self.state = WizardState::Submitted;
        }
    }
}

impl Default for FollowUpWizard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(questions: &[&str]) -> FollowUpWizard {
        let mut wizard = FollowUpWizard::new();
        wizard
            .load_questions(questions.iter().map(|q| q.to_string()).collect())
            .unwrap();
        wizard
    }

    #[test]
    fn empty_question_list_stays_idle() {
        let mut wizard = FollowUpWizard::new();
        wizard.load_questions(Vec::new()).unwrap();
        assert_eq!(*wizard.state(), WizardState::Idle);
    }

    #[test]
    fn exactly_n_forward_transitions_reach_ready_to_submit() {
        let questions = ["How long?", "Severity 1-10?", "Any medication?"];
        let mut wizard = loaded(&questions);

        for (i, _) in questions.iter().enumerate() {
            assert_eq!(*wizard.state(), WizardState::Active { cursor: i });
            wizard.answer(format!("answer {i}")).unwrap();
            wizard.next().unwrap();
        }

        assert_eq!(*wizard.state(), WizardState::ReadyToSubmit);
        // The cursor can never exceed the question count.
        assert!(wizard.next().is_err());
    }

    #[test]
    fn prev_then_next_round_trips_the_recorded_answer() {
        let mut wizard = loaded(&["How long?", "Severity 1-10?"]);
        wizard.answer("3 days").unwrap();
        wizard.next().unwrap();
        wizard.answer("6").unwrap();

        wizard.prev().unwrap();
        assert_eq!(wizard.current_answer(), Some("3 days"));
        wizard.next().unwrap();
        assert_eq!(wizard.current_answer(), Some("6"));
    }

    #[test]
    fn forward_navigation_rejects_empty_and_whitespace_answers() {
        let mut wizard = loaded(&["How long?"]);
        assert!(wizard.next().unwrap_err().is_validation());

        wizard.answer("   ").unwrap();
        assert!(wizard.next().unwrap_err().is_validation());

        wizard.answer("3 days").unwrap();
        wizard.next().unwrap();
        assert_eq!(*wizard.state(), WizardState::ReadyToSubmit);
    }

    #[test]
    fn prev_at_first_question_is_rejected() {
        let mut wizard = loaded(&["How long?"]);
        assert!(wizard.prev().is_err());
    }

    #[test]
    fn begin_submit_yields_the_full_answer_map_once() {
        let mut wizard = loaded(&["How long?", "Severity 1-10?"]);
        wizard.answer("3 days").unwrap();
        wizard.next().unwrap();
        wizard.answer("6").unwrap();
        wizard.next().unwrap();

        let answers = wizard.begin_submit().unwrap();
        assert_eq!(answers["How long?"], "3 days");
        assert_eq!(answers["Severity 1-10?"], "6");

        // Second call within the pending window is a guarded no-op.
        assert!(wizard.begin_submit().is_err());
        assert_eq!(*wizard.state(), WizardState::Submitting);
    }

    #[test]
    fn failed_submission_returns_to_ready_for_retry() {
        let mut wizard = loaded(&["How long?"]);
        wizard.answer("3 days").unwrap();
        wizard.next().unwrap();

        wizard.begin_submit().unwrap();
        wizard.submit_failed();
        assert_eq!(*wizard.state(), WizardState::ReadyToSubmit);

        // Retry succeeds and the wizard terminates.
        wizard.begin_submit().unwrap();
        wizard.submit_succeeded();
        assert_eq!(*wizard.state(), WizardState::Submitted);
        assert!(wizard.begin_submit().is_err());
    }

    #[test]
    fn submission_is_unreachable_before_the_last_answer() {
        let mut wizard = loaded(&["How long?", "Severity 1-10?"]);
        wizard.answer("3 days").unwrap();
        wizard.next().unwrap();

        // Current answer still empty: neither next nor submit is reachable.
        assert!(wizard.next().is_err());
        assert!(wizard.begin_submit().is_err());
    }
}
