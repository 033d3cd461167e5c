use crate::error::AppError;
use crate::models::classify_types::{Notification, ProbabilityPair, Verdict};

pub const NOT_FULL_MESSAGE: &str = "ถังขยะยังไม่เต็ม!";
pub const FULL_MESSAGE: &str = "ถังขยะเต็มแล้ว!";
pub const LOAD_FAILED_MESSAGE: &str = "Failed to load the model!";

impl ProbabilityPair {
    /// Takes the first two scores; any extra classes are ignored.
    pub fn from_scores(scores: &[f32]) -> Result<Self, AppError> {
        match scores {
            [not_full, full, ..] => Ok(Self {
                not_full: *not_full,
                full: *full,
            }),
            _ => Err(AppError::Inference(format!(
                "Expected at least 2 class scores, model produced {}",
                scores.len()
            ))),
        }
    }
}

/// Equal scores (and NaN) leave the verdict open.
pub fn decide(pair: ProbabilityPair) -> Verdict {
    if pair.not_full > pair.full {
        Verdict::NotFull
    } else if pair.not_full < pair.full {
        Verdict::Full
    } else {
        Verdict::Undecided
    }
}

impl Verdict {
    pub fn notification(&self) -> Option<Notification> {
        match self {
            Verdict::NotFull => Some(Notification::error(NOT_FULL_MESSAGE)),
            Verdict::Full => Some(Notification::success(FULL_MESSAGE)),
            Verdict::Undecided => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::classify_types::NotificationLevel;

    fn pair(not_full: f32, full: f32) -> ProbabilityPair {
        ProbabilityPair { not_full, full }
    }

    #[test]
    fn mostly_empty_bin_is_not_full() {
        let verdict = decide(pair(0.9, 0.1));
        assert_eq!(verdict, Verdict::NotFull);

        let note = verdict.notification().unwrap();
        assert_eq!(note.message, NOT_FULL_MESSAGE);
        assert_eq!(note.level, NotificationLevel::Error);
    }

    #[test]
    fn mostly_full_bin_is_full() {
        let verdict = decide(pair(0.1, 0.9));
        assert_eq!(verdict, Verdict::Full);

        let note = verdict.notification().unwrap();
        assert_eq!(note.message, FULL_MESSAGE);
        assert_eq!(note.level, NotificationLevel::Success);
    }

    #[test]
    fn tie_shows_nothing() {
        let verdict = decide(pair(0.5, 0.5));
        assert_eq!(verdict, Verdict::Undecided);
        assert!(verdict.notification().is_none());
    }

    #[test]
    fn nan_is_undecided() {
        assert_eq!(decide(pair(f32::NAN, 0.2)), Verdict::Undecided);
    }

    #[test]
    fn pair_uses_first_two_scores() {
        let p = ProbabilityPair::from_scores(&[0.7, 0.2, 0.1]).unwrap();
        assert_eq!(p, pair(0.7, 0.2));
    }

    #[test]
    fn single_score_is_rejected() {
        let err = ProbabilityPair::from_scores(&[1.0]).unwrap_err();
        assert_eq!(err.kind(), "inference");
    }
}
