//! Grading answers to a quiz.
//!
//! Questions are plain data so a front end can store them between showing
//! the quiz and grading it.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Question {
    MultipleChoice {
        question: String,
        options: Vec<String>,
        correct_answer: String,
    },
    TrueFalse {
        question: String,
        correct_answer: bool,
    },
    /// Answers are compared ignoring case and surrounding whitespace.
    FillBlank {
        question: String,
        correct_answer: String,
    },
}

impl Question {
    pub fn prompt(&self) -> &str {
        match self {
            Question::MultipleChoice { question, .. }
            | Question::TrueFalse { question, .. }
            | Question::FillBlank { question, .. } => question,
        }
    }

    /// The correct answer, written the way a user would give it.
    pub fn expected_answer(&self) -> String {
        match self {
            Question::MultipleChoice { correct_answer, .. }
            | Question::FillBlank { correct_answer, .. } => {
                correct_answer.clone()
            },
            Question::TrueFalse { correct_answer, .. } => {
                String::from(if *correct_answer { "True" } else { "False" })
            },
        }
    }

    pub fn is_correct(&self, answer: &str) -> bool {
        match self {
            Question::MultipleChoice { correct_answer, .. } => {
                answer == correct_answer
            },
            Question::TrueFalse { .. } => answer == self.expected_answer(),
            Question::FillBlank { correct_answer, .. } => {
                answer.trim().to_lowercase()
                    == correct_answer.trim().to_lowercase()
            },
        }
    }
}

/// How one question was answered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    /// The question's 1-based position in the quiz.
    pub question: usize,
    pub correct: bool,
    pub expected: String,
}

/// Feedback based on the percentage of correct answers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Perfect,
    Great,
    GoodEffort,
    KeepStudying,
}

impl Tier {
    pub fn for_percentage(percentage: f64) -> Self {
        if percentage >= 100.0 {
            Tier::Perfect
        } else if percentage >= 70.0 {
            Tier::Great
        } else if percentage >= 50.0 {
            Tier::GoodEffort
        } else {
            Tier::KeepStudying
        }
    }
}

impl Display for Tier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Perfect => write!(f, "Perfect score!"),
            Tier::Great => write!(f, "Great job!"),
            Tier::GoodEffort => write!(f, "Good effort! Keep practicing!"),
            Tier::KeepStudying => {
                write!(f, "Keep studying! You'll do better next time!")
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Grade {
    pub outcomes: Vec<Outcome>,
    pub score: usize,
    pub total: usize,
    pub percentage: f64,
    pub tier: Tier,
}

/// Grade a set of answers, where `answers[i]` answers `questions[i]`.
///
/// Unanswered questions (a `None`, or no answer at all because `answers` is
/// too short) are wrong. An empty quiz scores 0%.
pub fn grade<S>(questions: &[Question], answers: &[Option<S>]) -> Grade
where
    S: AsRef<str>,
{
    let outcomes: Vec<Outcome> = questions
        .iter()
        .enumerate()
        .map(|(i, question)| {
            let answer = answers.get(i).and_then(|a| a.as_ref());

            Outcome {
                question: i + 1,
                correct: answer
                    .map(|a| question.is_correct(a.as_ref()))
                    .unwrap_or(false),
                expected: question.expected_answer(),
            }
        })
        .collect();

    let score = outcomes.iter().filter(|o| o.correct).count();
    let total = questions.len();
    let percentage = if total == 0 {
        0.0
    } else {
        score as f64 / total as f64 * 100.0
    };

    Grade {
        outcomes,
        score,
        total,
        percentage,
        tier: Tier::for_percentage(percentage),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiz() -> Vec<Question> {
        vec![
            Question::MultipleChoice {
                question: String::from("Which statement is correct?"),
                options: vec![
                    String::from("Water boils at 100C"),
                    String::from("Not true: Water boils at 100C"),
                ],
                correct_answer: String::from("Water boils at 100C"),
            },
            Question::TrueFalse {
                question: String::from("The sky is green."),
                correct_answer: false,
            },
            Question::FillBlank {
                question: String::from("The capital of France is ____."),
                correct_answer: String::from("Paris"),
            },
        ]
    }

    #[test]
    fn fill_in_the_blank_ignores_case_and_whitespace() {
        let question = &quiz()[2];

        assert!(question.is_correct("paris"));
        assert!(question.is_correct("  PARIS "));
        assert!(!question.is_correct("Lyon"));
    }

    #[test]
    fn other_questions_need_an_exact_match() {
        let questions = quiz();

        assert!(questions[0].is_correct("Water boils at 100C"));
        assert!(!questions[0].is_correct("water boils at 100c"));
        assert!(questions[1].is_correct("False"));
        assert!(!questions[1].is_correct("false"));
    }

    #[test]
    fn grade_a_quiz() {
        let water = Some("Water boils at 100C");
        let inputs = vec![
            (vec![water, Some("False"), Some("paris")], 3, Tier::Perfect),
            (vec![water, Some("True"), Some("Paris")], 2, Tier::GoodEffort),
            (vec![water, None, None], 1, Tier::KeepStudying),
            (vec![], 0, Tier::KeepStudying),
        ];
        let questions = quiz();

        for (answers, score, tier) in inputs {
            let got = grade(&questions, &answers);

            assert_eq!(got.score, score, "{:?}", answers);
            assert_eq!(got.total, 3);
            assert_eq!(got.tier, tier, "{:?}", answers);
        }
    }

    #[test]
    fn outcomes_show_the_expected_answer() {
        let answers: Vec<Option<String>> = vec![None, Some("True".into())];

        let got = grade(&quiz(), &answers);

        let should_be = vec![
            Outcome {
                question: 1,
                correct: false,
                expected: String::from("Water boils at 100C"),
            },
            Outcome {
                question: 2,
                correct: false,
                expected: String::from("False"),
            },
            Outcome {
                question: 3,
                correct: false,
                expected: String::from("Paris"),
            },
        ];
        assert_eq!(got.outcomes, should_be);
    }

    #[test]
    fn tier_boundaries() {
        let inputs = vec![
            (100.0, Tier::Perfect),
            (99.9, Tier::Great),
            (70.0, Tier::Great),
            (69.9, Tier::GoodEffort),
            (50.0, Tier::GoodEffort),
            (49.9, Tier::KeepStudying),
            (0.0, Tier::KeepStudying),
        ];

        for (percentage, should_be) in inputs {
            assert_eq!(Tier::for_percentage(percentage), should_be);
        }
    }

    #[test]
    fn an_empty_quiz_scores_zero() {
        let got = grade::<&str>(&[], &[]);

        assert_eq!(got.score, 0);
        assert_eq!(got.total, 0);
        assert_eq!(got.percentage, 0.0);
        assert_eq!(got.tier, Tier::KeepStudying);
    }

    #[test]
    fn questions_round_trip_through_json() {
        let src = r#"{"type":"true_false","question":"2 + 2 = 4","correct_answer":true}"#;

        let got: Question = serde_json::from_str(src).unwrap();

        assert_eq!(
            got,
            Question::TrueFalse {
                question: String::from("2 + 2 = 4"),
                correct_answer: true,
            }
        );
        assert_eq!(got.prompt(), "2 + 2 = 4");
        assert_eq!(serde_json::to_string(&got).unwrap(), src);
    }
}
