//! Expense splitting.
//!
//! All arithmetic happens on integer cents so that the computed shares always
//! add back up to the expense total.

use std::collections::HashSet;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use thiserror::Error;

use crate::schemas::{Participant, SplitMode, UserId};

const CENT_SCALE: u32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SplitErrorReason {
    SumMismatch,
    NegativeValue,
    EmptyParticipants,
    NonPositiveAmount,
    DuplicateParticipant,
    MixedModes,
    InvalidPrecision,
    AmountTooLarge,
}

impl SplitErrorReason {
    pub fn code(&self) -> &'static str {
        match self {
            SplitErrorReason::SumMismatch => "SUM_MISMATCH",
            SplitErrorReason::NegativeValue => "NEGATIVE_VALUE",
            SplitErrorReason::EmptyParticipants => "EMPTY_PARTICIPANTS",
            SplitErrorReason::NonPositiveAmount => "NON_POSITIVE_AMOUNT",
            SplitErrorReason::DuplicateParticipant => "DUPLICATE_PARTICIPANT",
            SplitErrorReason::MixedModes => "MIXED_MODES",
            SplitErrorReason::InvalidPrecision => "INVALID_PRECISION",
            SplitErrorReason::AmountTooLarge => "AMOUNT_TOO_LARGE",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("invalid split ({}): {message}", .reason.code())]
pub struct InvalidSplitError {
    pub reason: SplitErrorReason,
    pub message: String,
}

impl InvalidSplitError {
    fn new(reason: SplitErrorReason, message: impl Into<String>) -> Self {
        InvalidSplitError {
            reason,
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UserShare {
    pub user: UserId,
    pub amount: Decimal,
}

/// Splits `amount` between `participants`, returning one share per
/// participant in list order. The shares always sum to `amount` exactly.
pub fn compute_shares(
    amount: Decimal,
    participants: &[Participant],
) -> Result<Vec<UserShare>, InvalidSplitError> {
    let first = participants.first().ok_or_else(|| {
        InvalidSplitError::new(
            SplitErrorReason::EmptyParticipants,
            "an expense needs at least one participant",
        )
    })?;
    if amount <= Decimal::ZERO {
        return Err(InvalidSplitError::new(
            SplitErrorReason::NonPositiveAmount,
            format!("expense amount must be positive, got {amount}"),
        ));
    }
    let total_cents = to_cents(amount)?;
    validate_participants(first, participants)?;

    let cents = match first.split {
        SplitMode::Equal => split_equal(total_cents, participants.len()),
        SplitMode::Exact(_) => split_exact(total_cents, participants)?,
        SplitMode::Percent(_) => split_percent(total_cents, participants)?,
    };

    Ok(participants
        .iter()
        .zip(cents)
        .map(|(participant, cents)| UserShare {
            user: participant.user,
            amount: from_cents(cents),
        })
        .collect())
}

fn validate_participants(
    first: &Participant,
    participants: &[Participant],
) -> Result<(), InvalidSplitError> {
    let mut seen = HashSet::new();
    for participant in participants {
        if !seen.insert(participant.user) {
            return Err(InvalidSplitError::new(
                SplitErrorReason::DuplicateParticipant,
                format!("user {} appears more than once", participant.user),
            ));
        }
        if participant.split.kind() != first.split.kind() {
            return Err(InvalidSplitError::new(
                SplitErrorReason::MixedModes,
                format!(
                    "user {} uses {} but the split is {}",
                    participant.user,
                    participant.split.kind(),
                    first.split.kind()
                ),
            ));
        }
        match participant.split {
            SplitMode::Exact(value) | SplitMode::Percent(value) if value < Decimal::ZERO => {
                return Err(InvalidSplitError::new(
                    SplitErrorReason::NegativeValue,
                    format!("user {} has a negative value {value}", participant.user),
                ));
            }
            _ => {}
        }
    }
    Ok(())
}

// The remainder goes one cent at a time to the earliest participants.
fn split_equal(total_cents: i64, count: usize) -> Vec<i64> {
    let count = count as i64;
    let base = total_cents / count;
    let remainder = total_cents % count;
    (0..count)
        .map(|i| if i < remainder { base + 1 } else { base })
        .collect()
}

fn split_exact(
    total_cents: i64,
    participants: &[Participant],
) -> Result<Vec<i64>, InvalidSplitError> {
    let cents = participants
        .iter()
        .map(|participant| match participant.split {
            SplitMode::Exact(value) => to_cents(value),
            _ => unreachable!("modes are validated before splitting"),
        })
        .collect::<Result<Vec<_>, _>>()?;
    let sum = sum_cents(&cents)?;
    if sum != total_cents {
        return Err(InvalidSplitError::new(
            SplitErrorReason::SumMismatch,
            format!(
                "exact amounts add up to {} but the expense is {}",
                from_cents(sum),
                from_cents(total_cents)
            ),
        ));
    }
    Ok(cents)
}

fn split_percent(
    total_cents: i64,
    participants: &[Participant],
) -> Result<Vec<i64>, InvalidSplitError> {
    let hundred = Decimal::ONE_HUNDRED;
    let percents: Vec<Decimal> = participants
        .iter()
        .map(|participant| match participant.split {
            SplitMode::Percent(value) => value,
            _ => unreachable!("modes are validated before splitting"),
        })
        .collect();
    let percent_sum = percents
        .iter()
        .try_fold(Decimal::ZERO, |acc, percent| acc.checked_add(*percent))
        .ok_or_else(|| too_large("percentages"))?;
    if percent_sum != hundred {
        return Err(InvalidSplitError::new(
            SplitErrorReason::SumMismatch,
            format!("percentages add up to {percent_sum}, expected 100"),
        ));
    }

    let total = Decimal::from(total_cents);
    let mut cents = percents
        .iter()
        .map(|percent| {
            total
                .checked_mul(*percent)
                .and_then(|scaled| scaled.checked_div(hundred))
                .and_then(|share| {
                    share
                        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                        .to_i64()
                })
                .ok_or_else(|| too_large("percentage share"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    // Rounding drift lands on the last participant. A share is never pushed
    // below zero; whatever it cannot absorb moves to the one before it.
    // Widened because rounded shares may add up to one past i64::MAX.
    let assigned: i128 = cents.iter().map(|share| i128::from(*share)).sum();
    let mut drift = i128::from(total_cents) - assigned;
    for share in cents.iter_mut().rev() {
        if drift == 0 {
            break;
        }
        let adjusted = i128::from(*share) + drift;
        if adjusted >= 0 {
            *share = i64::try_from(adjusted).map_err(|_| too_large("percentage share"))?;
            drift = 0;
        } else {
            drift = adjusted;
            *share = 0;
        }
    }
    Ok(cents)
}

fn to_cents(amount: Decimal) -> Result<i64, InvalidSplitError> {
    let normalized = amount.normalize();
    if normalized.scale() > CENT_SCALE {
        return Err(InvalidSplitError::new(
            SplitErrorReason::InvalidPrecision,
            format!("{amount} has more than {CENT_SCALE} decimal places"),
        ));
    }
    normalized
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|cents| cents.to_i64())
        .ok_or_else(|| too_large(&amount.to_string()))
}

fn sum_cents(cents: &[i64]) -> Result<i64, InvalidSplitError> {
    cents
        .iter()
        .try_fold(0i64, |acc, cents| acc.checked_add(*cents))
        .ok_or_else(|| too_large("sum of shares"))
}

fn too_large(what: &str) -> InvalidSplitError {
    InvalidSplitError::new(
        SplitErrorReason::AmountTooLarge,
        format!("{what} does not fit in whole cents"),
    )
}

fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, CENT_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn amounts(shares: &[UserShare]) -> Vec<Decimal> {
        shares.iter().map(|share| share.amount).collect()
    }

    fn reason(result: Result<Vec<UserShare>, InvalidSplitError>) -> SplitErrorReason {
        result.unwrap_err().reason
    }

    #[test]
    fn equal_split_gives_remainder_to_earliest() {
        let participants: Vec<_> = (0..3).map(Participant::equal).collect();
        let shares = compute_shares(dec!(10.00), &participants).unwrap();
        assert_eq!(amounts(&shares), vec![dec!(3.34), dec!(3.33), dec!(3.33)]);
        assert_eq!(
            shares.iter().map(|s| s.user).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn equal_split_single_participant_takes_everything() {
        let shares = compute_shares(dec!(42.17), &[Participant::equal(9)]).unwrap();
        assert_eq!(amounts(&shares), vec![dec!(42.17)]);
    }

    #[test]
    fn equal_split_smaller_than_participant_count() {
        let participants: Vec<_> = (0..5).map(Participant::equal).collect();
        let shares = compute_shares(dec!(0.03), &participants).unwrap();
        assert_eq!(
            amounts(&shares),
            vec![dec!(0.01), dec!(0.01), dec!(0.01), dec!(0), dec!(0)]
        );
    }

    #[test]
    fn percent_split_whole_numbers() {
        let participants = vec![
            Participant::percent(1, dec!(33)),
            Participant::percent(2, dec!(33)),
            Participant::percent(3, dec!(34)),
        ];
        let shares = compute_shares(dec!(100.00), &participants).unwrap();
        assert_eq!(amounts(&shares), vec![dec!(33.00), dec!(33.00), dec!(34.00)]);
    }

    #[test]
    fn percent_split_corrects_drift_on_last_participant() {
        // 10.00 at 33.33% is 333.3 cents, rounded to 333 each.
        let participants = vec![
            Participant::percent(1, dec!(33.33)),
            Participant::percent(2, dec!(33.33)),
            Participant::percent(3, dec!(33.34)),
        ];
        let shares = compute_shares(dec!(10.00), &participants).unwrap();
        assert_eq!(amounts(&shares), vec![dec!(3.33), dec!(3.33), dec!(3.34)]);
        assert_eq!(amounts(&shares).iter().sum::<Decimal>(), dec!(10.00));
    }

    #[test]
    fn percent_split_rounds_half_away_from_zero() {
        // 0.03 at 50/50/0: 1.5 cents each rounds up to 2, the drift of -1
        // cannot go on the zero share so it moves to the second one.
        let participants = vec![
            Participant::percent(1, dec!(50)),
            Participant::percent(2, dec!(50)),
            Participant::percent(3, dec!(0)),
        ];
        let shares = compute_shares(dec!(0.03), &participants).unwrap();
        assert_eq!(amounts(&shares), vec![dec!(0.02), dec!(0.01), dec!(0)]);
    }

    #[test]
    fn percent_split_must_total_hundred() {
        let participants = vec![
            Participant::percent(1, dec!(50)),
            Participant::percent(2, dec!(40)),
        ];
        assert_eq!(
            reason(compute_shares(dec!(10), &participants)),
            SplitErrorReason::SumMismatch
        );
    }

    #[test]
    fn exact_split_uses_given_amounts() {
        let participants = vec![
            Participant::exact(1, dec!(7.50)),
            Participant::exact(2, dec!(2.5)),
        ];
        let shares = compute_shares(dec!(10), &participants).unwrap();
        assert_eq!(amounts(&shares), vec![dec!(7.50), dec!(2.50)]);
    }

    #[test]
    fn exact_split_short_of_total_is_a_mismatch() {
        let participants = vec![
            Participant::exact(1, dec!(4.00)),
            Participant::exact(2, dec!(5.00)),
        ];
        let err = compute_shares(dec!(10.00), &participants).unwrap_err();
        assert_eq!(err.reason, SplitErrorReason::SumMismatch);
        assert_eq!(err.reason.code(), "SUM_MISMATCH");
        assert!(err.to_string().starts_with("invalid split (SUM_MISMATCH)"));
    }

    #[test]
    fn empty_participants() {
        assert_eq!(
            reason(compute_shares(dec!(10), &[])),
            SplitErrorReason::EmptyParticipants
        );
    }

    #[test]
    fn negative_exact_value() {
        let participants = vec![
            Participant::exact(1, dec!(15.00)),
            Participant::exact(2, dec!(-5.00)),
        ];
        assert_eq!(
            reason(compute_shares(dec!(10.00), &participants)),
            SplitErrorReason::NegativeValue
        );
    }

    #[test]
    fn negative_percent_value() {
        let participants = vec![
            Participant::percent(1, dec!(110)),
            Participant::percent(2, dec!(-10)),
        ];
        assert_eq!(
            reason(compute_shares(dec!(10.00), &participants)),
            SplitErrorReason::NegativeValue
        );
    }

    #[test]
    fn rejects_non_positive_total() {
        let participants = vec![Participant::equal(1)];
        assert_eq!(
            reason(compute_shares(dec!(0), &participants)),
            SplitErrorReason::NonPositiveAmount
        );
        assert_eq!(
            reason(compute_shares(dec!(-3), &participants)),
            SplitErrorReason::NonPositiveAmount
        );
    }

    #[test]
    fn rejects_duplicate_users() {
        let participants = vec![Participant::equal(1), Participant::equal(1)];
        assert_eq!(
            reason(compute_shares(dec!(10), &participants)),
            SplitErrorReason::DuplicateParticipant
        );
    }

    #[test]
    fn rejects_mixed_modes() {
        let participants = vec![Participant::equal(1), Participant::exact(2, dec!(5))];
        assert_eq!(
            reason(compute_shares(dec!(10), &participants)),
            SplitErrorReason::MixedModes
        );
    }

    #[test]
    fn rejects_sub_cent_amounts() {
        assert_eq!(
            reason(compute_shares(dec!(10.005), &[Participant::equal(1)])),
            SplitErrorReason::InvalidPrecision
        );
        let participants = vec![
            Participant::exact(1, dec!(5.001)),
            Participant::exact(2, dec!(4.999)),
        ];
        assert_eq!(
            reason(compute_shares(dec!(10), &participants)),
            SplitErrorReason::InvalidPrecision
        );
    }

    #[test]
    fn huge_total_is_rejected_not_overflowed() {
        assert_eq!(
            reason(compute_shares(Decimal::MAX, &[Participant::equal(1)])),
            SplitErrorReason::AmountTooLarge
        );
    }

    #[test]
    fn exact_values_overflowing_their_sum() {
        let each = Decimal::new(i64::MAX / 2 + 10, 2);
        let participants: Vec<_> = (0..3).map(|user| Participant::exact(user, each)).collect();
        assert_eq!(
            reason(compute_shares(dec!(10.00), &participants)),
            SplitErrorReason::AmountTooLarge
        );
    }

    #[test]
    fn percent_values_overflowing_their_sum() {
        let participants = vec![
            Participant::percent(1, Decimal::MAX),
            Participant::percent(2, Decimal::MAX),
        ];
        assert_eq!(
            reason(compute_shares(dec!(10.00), &participants)),
            SplitErrorReason::AmountTooLarge
        );
    }

    #[test]
    fn largest_representable_total_still_splits() {
        let total = Decimal::new(i64::MAX, 2);
        let participants: Vec<_> = (0..3).map(Participant::equal).collect();
        let shares = compute_shares(total, &participants).unwrap();
        assert_eq!(amounts(&shares).iter().sum::<Decimal>(), total);

        let participants = vec![
            Participant::percent(1, dec!(50)),
            Participant::percent(2, dec!(50)),
        ];
        let shares = compute_shares(total, &participants).unwrap();
        assert_eq!(amounts(&shares).iter().sum::<Decimal>(), total);
    }

    #[test]
    fn trailing_zeros_are_not_extra_precision() {
        let shares = compute_shares(dec!(10.0000), &[Participant::equal(1)]).unwrap();
        assert_eq!(amounts(&shares), vec![dec!(10.00)]);
    }
}
