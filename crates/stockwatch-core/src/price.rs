//! Per-symbol price resolution state.

use crate::decimal::Price;
use serde::{Deserialize, Serialize};

/// Error marker for a symbol whose price could not be resolved.
pub const UNAVAILABLE: &str = "unavailable";

/// Price state of one symbol, keyed by symbol in the price map.
///
/// A symbol missing from the map has not been requested yet. A resolved
/// entry always has `loading == false` and either a price or an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceEntry {
    pub symbol: String,
    pub price: Option<Price>,
    pub loading: bool,
    pub error: Option<String>,
}

impl PriceEntry {
    /// Entry for a request that is still in flight.
    pub fn pending(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            price: None,
            loading: true,
            error: None,
        }
    }

    /// Entry for a resolved price.
    pub fn resolved(symbol: impl Into<String>, price: Price) -> Self {
        Self {
            symbol: symbol.into(),
            price: Some(price),
            loading: false,
            error: None,
        }
    }

    /// Entry for a symbol the backend could not price.
    pub fn unavailable(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            price: None,
            loading: false,
            error: Some(UNAVAILABLE.to_string()),
        }
    }

    /// `Some(price)` resolves, `None` becomes the unavailable marker.
    pub fn from_lookup(symbol: impl Into<String>, price: Option<Price>) -> Self {
        match price {
            Some(p) => Self::resolved(symbol, p),
            None => Self::unavailable(symbol),
        }
    }

    /// Whether the entry reached a final state.
    pub fn is_settled(&self) -> bool {
        !self.loading && (self.price.is_some() || self.error.is_some())
    }

    /// Display text: `$12.34`, or `N/A` when unavailable.
    pub fn display(&self) -> String {
        match (&self.price, &self.error, self.loading) {
            (_, _, true) => "...".to_string(),
            (Some(p), None, false) => format!("${:.2}", p.rounded(2).inner()),
            _ => "N/A".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_from_lookup() {
        let ok = PriceEntry::from_lookup("AAPL", Some(Price::new(dec!(187.3))));
        assert!(ok.is_settled());
        assert_eq!(ok.error, None);

        let missing = PriceEntry::from_lookup("ZZZZ", None);
        assert!(missing.is_settled());
        assert_eq!(missing.error.as_deref(), Some(UNAVAILABLE));
    }

    #[test]
    fn test_pending_is_not_settled() {
        assert!(!PriceEntry::pending("TSLA").is_settled());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            PriceEntry::resolved("AAPL", Price::new(dec!(187.3))).display(),
            "$187.30"
        );
        assert_eq!(PriceEntry::unavailable("AAPL").display(), "N/A");
        assert_eq!(PriceEntry::pending("AAPL").display(), "...");
    }
}
