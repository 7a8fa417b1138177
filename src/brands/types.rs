use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Review state of a brand record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrandStatus {
  /// Submitted, awaiting review.
  #[default]
  Pending,
  /// Accepted by the registry.
  Active,
  /// Declined by the registry.
  Rejected,
}

impl BrandStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      BrandStatus::Pending => "Pending",
      BrandStatus::Active => "Active",
      BrandStatus::Rejected => "Rejected",
    }
  }
}

#[derive(Debug, Error)]
#[error("unknown brand status: {0}")]
pub struct InvalidStatus(String);

impl FromStr for BrandStatus {
  type Err = InvalidStatus;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "pending" => Ok(BrandStatus::Pending),
      "active" => Ok(BrandStatus::Active),
      "rejected" => Ok(BrandStatus::Rejected),
      _ => Err(InvalidStatus(s.to_string())),
    }
  }
}

impl std::fmt::Display for BrandStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.pad(self.as_str())
  }
}

/// A synchronized brand record.
///
/// `id` is a UUID assigned at creation, locally generated when the record is
/// synthesized offline. Identity never depends on server-assigned sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Brand {
  pub id: String,
  pub name: String,
  pub owner: String,
  /// Locale the record was created under.
  pub lang: String,
  pub status: BrandStatus,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Fields supplied when registering a new brand.
#[derive(Debug, Clone, Serialize)]
pub struct BrandDraft {
  pub name: String,
  pub owner: String,
  pub lang: String,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BrandPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub owner: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub lang: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<BrandStatus>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn test_status_round_trips_through_str() {
    for status in [BrandStatus::Pending, BrandStatus::Active, BrandStatus::Rejected] {
      assert_eq!(status.as_str().parse::<BrandStatus>().unwrap(), status);
    }
    assert!("approved".parse::<BrandStatus>().is_err());
  }

  #[test]
  fn test_brand_serializes_camel_case() {
    let brand = Brand {
      id: "b3c2".to_string(),
      name: "Acme".to_string(),
      owner: "Jane".to_string(),
      lang: "en".to_string(),
      status: BrandStatus::Pending,
      created_at: Utc::now(),
      updated_at: Utc::now(),
    };

    let json = serde_json::to_value(&brand).unwrap();
    assert_eq!(json["status"], "Pending");
    assert!(json.get("createdAt").is_some());
    assert!(json.get("updatedAt").is_some());
  }

  #[test]
  fn test_patch_omits_absent_fields() {
    let patch = BrandPatch {
      status: Some(BrandStatus::Active),
      ..Default::default()
    };

    let json = serde_json::to_value(&patch).unwrap();
    assert_eq!(json.as_object().unwrap().len(), 1);
    assert_eq!(json["status"], "Active");
  }
}
