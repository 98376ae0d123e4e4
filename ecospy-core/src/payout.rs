//! Prices a set of recyclable items against the reference catalog.

use tracing::debug;

use crate::model::{MIXED_WASTE_TYPE, Payout, RecyclableCounts};
use crate::ports::{PortError, PriceCatalogPort};

/// Computes payout, weight, and waste type for recyclable counts.
///
/// The waste type is the single category shared by every priced item. When no item
/// is priced, or priced items span more than one category, the result is
/// [`MIXED_WASTE_TYPE`].
pub struct PayoutCalculator<'port> {
    catalog: &'port dyn PriceCatalogPort,
}

impl<'port> PayoutCalculator<'port> {
    /// Bind the calculator to a price catalog.
    #[must_use]
    pub fn new(catalog: &'port dyn PriceCatalogPort) -> Self {
        Self { catalog }
    }

    /// Price every label in `counts`. Labels without a catalog entry contribute nothing.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when a catalog lookup fails.
    pub async fn calculate(&self, counts: &RecyclableCounts) -> Result<Payout, PortError> {
        let mut total_payout = 0.0_f64;
        let mut total_weight = 0.0_f64;
        let mut types: Vec<String> = Vec::new();

        for (label, count) in counts.iter() {
            let Some(entry) = self.catalog.price_entry(label.as_str()).await? else {
                debug!(%label, "no price entry, skipping");
                continue;
            };

            let quantity = f64::from(count);
            total_payout += entry.price * entry.weight * quantity;
            total_weight += entry.weight * quantity;
            if !types.contains(&entry.waste_type) {
                types.push(entry.waste_type);
            }
        }

        let waste_type = match types.as_slice() {
            [only] => only.clone(),
            _ => MIXED_WASTE_TYPE.to_owned(),
        };

        Ok(Payout {
            total_payout,
            total_weight,
            waste_type,
        })
    }
}
