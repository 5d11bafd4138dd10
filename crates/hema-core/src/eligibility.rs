//! Donation eligibility — the 90-day window between completed donations.
//!
//! The advisory computation shown to donors and the submission-time
//! enforcement share one constant and one selection rule, so the two can
//! never disagree.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{
  error::Error,
  request::{Donation, FulfillmentStatus},
};

/// Minimum interval between a donor's completed donations.
pub const ELIGIBILITY_WINDOW_DAYS: u64 = 90;

/// Display classification only — never an access control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EligibilityBand {
  /// Eligible now.
  Ready,
  /// 1–14 days left; flagged urgently.
  Urgent,
  /// 15–45 days left.
  Caution,
  /// More than 45 days left.
  Distant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eligibility {
  pub eligible:      bool,
  /// Whole days until the window reopens; zero when eligible.
  pub days_left:     i64,
  /// `None` when the donor has no completed donation on record.
  pub next_eligible: Option<NaiveDate>,
  pub band:          EligibilityBand,
}

/// The single selection rule shared by display and enforcement: the most
/// recent **completed** donation, by preferred date.
pub fn latest_completed(history: &[Donation]) -> Option<&Donation> {
  history
    .iter()
    .filter(|d| d.status == FulfillmentStatus::Completed)
    .max_by_key(|d| d.preferred_date)
}

fn window_end(last: &Donation) -> NaiveDate {
  last
    .preferred_date
    .checked_add_days(Days::new(ELIGIBILITY_WINDOW_DAYS))
    .unwrap_or(NaiveDate::MAX)
}

/// Advisory computation for display. No history means eligible now.
pub fn compute(history: &[Donation], today: NaiveDate) -> Eligibility {
  let Some(last) = latest_completed(history) else {
    return Eligibility {
      eligible:      true,
      days_left:     0,
      next_eligible: None,
      band:          EligibilityBand::Ready,
    };
  };

  let next_eligible = window_end(last);
  let days_left = (next_eligible - today).num_days();
  let band = match days_left {
    ..=0 => EligibilityBand::Ready,
    1..=14 => EligibilityBand::Urgent,
    15..=45 => EligibilityBand::Caution,
    _ => EligibilityBand::Distant,
  };

  Eligibility {
    eligible: days_left <= 0,
    days_left: days_left.max(0),
    next_eligible: Some(next_eligible),
    band,
  }
}

/// Submission-time enforcement of the same rule. Rejects with the next
/// eligible date when the window has not elapsed.
pub fn enforce(history: &[Donation], today: NaiveDate) -> Result<(), Error> {
  match latest_completed(history) {
    None => Ok(()),
    Some(last) => {
      let next_eligible = window_end(last);
      if today >= next_eligible {
        Ok(())
      } else {
        Err(Error::DonationWindow { next_eligible })
      }
    }
  }
}
