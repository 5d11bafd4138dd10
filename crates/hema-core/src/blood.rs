//! Blood group taxonomy.

use serde::{Deserialize, Serialize};

/// The eight ABO/Rh blood groups, displayed in their clinical notation
/// (`A+`, `O-`, …).
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
pub enum BloodGroup {
  #[serde(rename = "A+")]
  #[strum(serialize = "A+")]
  APositive,
  #[serde(rename = "A-")]
  #[strum(serialize = "A-")]
  ANegative,
  #[serde(rename = "B+")]
  #[strum(serialize = "B+")]
  BPositive,
  #[serde(rename = "B-")]
  #[strum(serialize = "B-")]
  BNegative,
  #[serde(rename = "AB+")]
  #[strum(serialize = "AB+")]
  AbPositive,
  #[serde(rename = "AB-")]
  #[strum(serialize = "AB-")]
  AbNegative,
  #[serde(rename = "O+")]
  #[strum(serialize = "O+")]
  OPositive,
  #[serde(rename = "O-")]
  #[strum(serialize = "O-")]
  ONegative,
}
