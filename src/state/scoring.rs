use crate::state::session::Question;

/// Result of scoring one submitted answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreOutcome {
    /// Whether the chosen option was correct.
    pub is_correct: bool,
    /// Points awarded; zero for incorrect or blank answers.
    pub points: u32,
}

/// Score a submitted answer.
///
/// A correct answer earns at least half the question's base points however
/// late it arrives; the remaining half scales linearly with the time left on
/// the clock. Out-of-range or absent option indexes are plainly incorrect,
/// never an error, so this is safe to call with whatever a client sent.
///
/// Pure and deterministic; clients may call it for optimistic feedback, but
/// only the value the coordinator persists is authoritative.
pub fn score(
    question: &Question,
    answer_index: Option<usize>,
    time_remaining: f64,
    time_limit: u32,
) -> ScoreOutcome {
    let is_correct = answer_index
        .and_then(|index| question.answers.get(index))
        .is_some_and(|option| option.is_correct);

    if !is_correct {
        return ScoreOutcome {
            is_correct: false,
            points: 0,
        };
    }

    let time_fraction = if time_limit == 0 {
        0.0
    } else {
        (time_remaining / f64::from(time_limit)).clamp(0.0, 1.0)
    };

    let points = (f64::from(question.points) * (0.5 + 0.5 * time_fraction)).round() as u32;

    ScoreOutcome {
        is_correct: true,
        points,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::session::AnswerOption;
    use uuid::Uuid;

    fn question(points: u32, time_limit: u32) -> Question {
        Question {
            id: Uuid::new_v4(),
            text: "capital of France?".into(),
            answers: vec![
                AnswerOption {
                    text: "Paris".into(),
                    is_correct: true,
                },
                AnswerOption {
                    text: "Lyon".into(),
                    is_correct: false,
                },
                AnswerOption {
                    text: "Marseille".into(),
                    is_correct: false,
                },
            ],
            time_limit,
            points,
        }
    }

    #[test]
    fn instant_correct_answer_earns_full_points() {
        let outcome = score(&question(1000, 30), Some(0), 30.0, 30);
        assert!(outcome.is_correct);
        assert_eq!(outcome.points, 1000);
    }

    #[test]
    fn last_moment_correct_answer_earns_half_points() {
        let outcome = score(&question(1000, 30), Some(0), 0.0, 30);
        assert!(outcome.is_correct);
        assert_eq!(outcome.points, 500);
    }

    #[test]
    fn half_time_answer_earns_three_quarters() {
        // 1000 base points, answered with 15 of 30 seconds left.
        let outcome = score(&question(1000, 30), Some(0), 15.0, 30);
        assert_eq!(outcome.points, 750);
    }

    #[test]
    fn wrong_answer_earns_nothing() {
        let outcome = score(&question(1000, 30), Some(1), 30.0, 30);
        assert!(!outcome.is_correct);
        assert_eq!(outcome.points, 0);
    }

    #[test]
    fn out_of_range_and_blank_answers_are_incorrect_not_errors() {
        assert_eq!(score(&question(1000, 30), Some(7), 30.0, 30).points, 0);
        assert_eq!(score(&question(1000, 30), None, 30.0, 30).points, 0);
    }

    #[test]
    fn zero_time_limit_does_not_divide_by_zero() {
        let outcome = score(&question(1000, 0), Some(0), 0.0, 0);
        assert!(outcome.is_correct);
        assert_eq!(outcome.points, 500);
    }

    #[test]
    fn remaining_time_is_clamped_to_the_limit() {
        // A skewed clock can report more time left than allotted.
        let outcome = score(&question(1000, 30), Some(0), 90.0, 30);
        assert_eq!(outcome.points, 1000);

        let outcome = score(&question(1000, 30), Some(0), -5.0, 30);
        assert_eq!(outcome.points, 500);
    }

    #[test]
    fn points_stay_within_bounds_across_the_range() {
        let q = question(987, 20);
        for tenths in 0..=200 {
            let remaining = f64::from(tenths) / 10.0;
            let outcome = score(&q, Some(0), remaining, 20);
            assert!(outcome.points >= 494, "low at {remaining}");
            assert!(outcome.points <= 987, "high at {remaining}");
        }
    }
}
