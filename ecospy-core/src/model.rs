//! Domain data structures for detections, price entries, users, and history records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Waste type reported when no single category describes a transaction.
pub const MIXED_WASTE_TYPE: &str = "Mixed";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
/// Lower-cased name of one recognized object class.
pub struct DetectedLabel(String);

impl DetectedLabel {
    /// Normalize a raw model label (trimmed, lower-cased).
    #[must_use]
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_lowercase())
    }

    /// Borrow the normalized label.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DetectedLabel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<&str> for DetectedLabel {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// Axis-aligned box in frame pixel coordinates.
pub struct BoundingBox {
    /// Left edge.
    pub x1: f32,
    /// Top edge.
    pub y1: f32,
    /// Right edge.
    pub x2: f32,
    /// Bottom edge.
    pub y2: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// One object instance reported by the detector.
pub struct Detection {
    /// Raw class name as reported by the model.
    pub label: String,
    /// Model confidence in `0.0..=1.0`.
    pub confidence: f32,
    /// Location of the object in the frame.
    pub bbox: BoundingBox,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Encoded image (JPEG) captured by the camera.
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    /// Wrap encoded image bytes.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Encoded bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether the camera returned no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Recyclable labels and how often each was seen, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecyclableCounts {
    entries: Vec<(DetectedLabel, u32)>,
}

impl RecyclableCounts {
    /// Empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more occurrence of `label`.
    pub fn record(&mut self, label: DetectedLabel) {
        self.add(label, 1);
    }

    /// Add `count` occurrences of `label`. A zero count is ignored.
    pub fn add(&mut self, label: DetectedLabel, count: u32) {
        if count == 0 {
            return;
        }
        if let Some((_, existing)) = self.entries.iter_mut().find(|(known, _)| *known == label) {
            *existing = existing.saturating_add(count);
        } else {
            self.entries.push((label, count));
        }
    }

    /// Fold another mapping into this one.
    pub fn merge(&mut self, other: &Self) {
        for (label, count) in other.iter() {
            self.add(label.clone(), count);
        }
    }

    /// Count for a single label, zero if never seen.
    #[must_use]
    pub fn get(&self, label: &DetectedLabel) -> u32 {
        self.entries
            .iter()
            .find(|(known, _)| known == label)
            .map_or(0, |(_, count)| *count)
    }

    /// Iterate `(label, count)` pairs in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&DetectedLabel, u32)> {
        self.entries.iter().map(|(label, count)| (label, *count))
    }

    /// Number of distinct labels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing recyclable was seen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all counts.
    #[must_use]
    pub fn total_items(&self) -> u32 {
        self.entries
            .iter()
            .fold(0_u32, |total, (_, count)| total.saturating_add(*count))
    }
}

impl FromIterator<(DetectedLabel, u32)> for RecyclableCounts {
    fn from_iter<T: IntoIterator<Item = (DetectedLabel, u32)>>(iter: T) -> Self {
        let mut counts = Self::new();
        for (label, count) in iter {
            counts.add(label, count);
        }
        counts
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Reference pricing for one recyclable item.
pub struct PriceEntry {
    /// Value credited per unit of weight.
    pub price: f64,
    /// Weight of one item.
    pub weight: f64,
    /// Category tag such as `Plastic` or `Metal`.
    #[serde(rename = "type")]
    pub waste_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Store identifier for a user record.
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// User fields that can identify a person at the kiosk.
pub enum IdentityField {
    /// Registered email address.
    Email,
    /// Phone number.
    Phone,
    /// Mobile number.
    Mobile,
}

impl IdentityField {
    /// Lookup order used when resolving a typed identifier.
    pub const PRIORITY: [Self; 3] = [Self::Email, Self::Phone, Self::Mobile];

    /// Field name inside the user document.
    #[must_use]
    pub fn field_name(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Mobile => "mobile",
        }
    }
}

impl fmt::Display for IdentityField {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.field_name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Registered kiosk user and their cumulative totals.
pub struct UserRecord {
    /// Store identifier.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Registered email address.
    pub email: Option<String>,
    /// Phone number.
    pub phone: Option<String>,
    /// Mobile number.
    pub mobile: Option<String>,
    /// Cumulative reward balance.
    pub ecopoints: f64,
    /// Cumulative collected weight.
    pub wastecollected: f64,
}

impl UserRecord {
    /// Value stored under an identity field.
    #[must_use]
    pub fn identity(&self, field: IdentityField) -> Option<&str> {
        match field {
            IdentityField::Email => self.email.as_deref(),
            IdentityField::Phone => self.phone.as_deref(),
            IdentityField::Mobile => self.mobile.as_deref(),
        }
    }

    /// Phone number, falling back to the mobile number.
    #[must_use]
    pub fn contact_number(&self) -> Option<&str> {
        self.phone
            .as_deref()
            .filter(|number| !number.is_empty())
            .or(self.mobile.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
/// Identifier of a history record under a user.
pub struct HistoryId(pub String);

impl HistoryId {
    /// Sequence-based identifier (`DOC001`, `DOC002`, ...).
    #[must_use]
    pub fn sequential(number: usize) -> Self {
        Self(format!("DOC{number:03}"))
    }
}

impl fmt::Display for HistoryId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// Latitude/longitude of the kiosk.
pub struct GeoPoint {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Immutable audit entry for one completed transaction.
pub struct HistoryRecord {
    /// When the items were handed in.
    pub collection_date: DateTime<Utc>,
    /// Where the items were handed in.
    pub location: GeoPoint,
    /// Payout credited for the transaction.
    pub points_earned: f64,
    /// Processing status, e.g. `Recycled`.
    pub status: String,
    /// Resolved waste type.
    pub waste_type: String,
    /// Total weight of the transaction.
    pub weight_kg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Result of pricing a set of recyclable items.
pub struct Payout {
    /// Points to credit.
    pub total_payout: f64,
    /// Weight to add to the user's cumulative total.
    pub total_weight: f64,
    /// Resolved waste type.
    pub waste_type: String,
}

impl Payout {
    /// A payout for nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            total_payout: 0.0,
            total_weight: 0.0,
            waste_type: MIXED_WASTE_TYPE.to_owned(),
        }
    }
}
