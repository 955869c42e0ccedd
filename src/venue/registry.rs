use super::VenueAdapter;
use crate::models::Venue;
use std::collections::HashMap;
use std::sync::Arc;

/// Adapters are stateless handles keyed by venue tag; the Aggregator and
/// ArbitrageEngine hold the registry by reference, never the adapters
/// directly, so there are no back-pointers between engines and adapters.
#[derive(Clone, Default)]
pub struct VenueRegistry {
    adapters: HashMap<Venue, Arc<dyn VenueAdapter>>,
}

impl VenueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn VenueAdapter>) {
        self.adapters.insert(adapter.venue(), adapter);
    }

    pub fn get(&self, venue: Venue) -> Option<Arc<dyn VenueAdapter>> {
        self.adapters.get(&venue).cloned()
    }

    pub fn enabled_venues(&self) -> Vec<Venue> {
        self.adapters.keys().copied().collect()
    }
}
