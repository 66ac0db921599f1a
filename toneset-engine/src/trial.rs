//! Trials and subject responses
//!
//! A [`Trial`] is created when a stimulus starts playing and finalized when its
//! response window closes. Correctness is computed once, against the expected
//! answer of the active [`ResponseMode`].

use crate::tone::{Direction, Tone};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Answer codes a response source can emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AnswerCode {
    #[default]
    None,
    Up,
    Down,
    Flat,
    Heard,
}

impl AnswerCode {
    /// Directional answer matching a stimulus direction
    pub fn from_direction(direction: Direction) -> Self {
        match direction {
            Direction::Up => AnswerCode::Up,
            Direction::Down => AnswerCode::Down,
            Direction::Flat => AnswerCode::Flat,
        }
    }
}

impl fmt::Display for AnswerCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AnswerCode::None => "None",
            AnswerCode::Up => "Up",
            AnswerCode::Down => "Down",
            AnswerCode::Flat => "Flat",
            AnswerCode::Heard => "Heard",
        };
        f.write_str(label)
    }
}

/// One subject response, timed from the start of its trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEvent {
    pub offset: Duration,
    pub answer: AnswerCode,
}

/// How a trial's responses are scored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseMode {
    /// Correct when the subject responded at all
    Detection,
    /// Correct when the last response names the tone's direction
    Direction,
}

impl ResponseMode {
    pub fn expected_answer(&self, tone: &Tone) -> AnswerCode {
        match self {
            ResponseMode::Detection => AnswerCode::Heard,
            ResponseMode::Direction => AnswerCode::from_direction(tone.direction()),
        }
    }

    pub fn is_correct(&self, tone: &Tone, responses: &[ResponseEvent]) -> bool {
        let mut answers = responses.iter().filter(|r| r.answer != AnswerCode::None);
        match self {
            ResponseMode::Detection => answers.next().is_some(),
            ResponseMode::Direction => answers
                .last()
                .is_some_and(|r| r.answer == self.expected_answer(tone)),
        }
    }
}

/// A presented stimulus and the subject's responses to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    tone: Tone,
    started_at: DateTime<Utc>,
    responses: Vec<ResponseEvent>,
    correct: Option<bool>,
}

impl Trial {
    /// Open a trial as the stimulus begins
    pub fn start(tone: Tone) -> Self {
        Self {
            tone,
            started_at: Utc::now(),
            responses: Vec::new(),
            correct: None,
        }
    }

    /// Close the response window and score the trial
    pub fn finalize(mut self, responses: Vec<ResponseEvent>, mode: ResponseMode) -> Self {
        self.correct = Some(mode.is_correct(&self.tone, &responses));
        self.responses = responses;
        self
    }

    pub fn tone(&self) -> &Tone {
        &self.tone
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn responses(&self) -> &[ResponseEvent] {
        &self.responses
    }

    /// `None` until finalized
    pub fn correct(&self) -> Option<bool> {
        self.correct
    }

    pub fn is_finalized(&self) -> bool {
        self.correct.is_some()
    }

    /// Responses rendered as `[(Heard 350), <Up 1210>]`
    pub fn clicks_string(&self) -> String {
        let parts: Vec<String> = self
            .responses
            .iter()
            .map(|r| {
                let ms = r.offset.as_millis();
                match r.answer {
                    AnswerCode::Heard => format!("({} {})", r.answer, ms),
                    _ => format!("<{} {}>", r.answer, ms),
                }
            })
            .collect();
        format!("[{}]", parts.join(", "))
    }

    /// Result-sink line for a finalized trial
    ///
    /// `Heard` marks a correct trial in either response mode.
    pub fn log_line(&self) -> String {
        let outcome = if self.correct.unwrap_or(false) {
            "Heard"
        } else {
            "NotHeard"
        };
        format!(
            "freq(Hz) {:.1}, vol {:.4}, {}, {} clicks: {}",
            self.tone.frequency(),
            self.tone.volume(),
            outcome,
            self.responses.len(),
            self.clicks_string()
        )
    }
}
