//! Serializes "change what I'm looking at" against "act on what I'm looking at".

use shared::domain::IncidenceFilter;

use crate::cache::CacheKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Affordances {
    pub reorder: bool,
    pub toggle: bool,
    pub select: bool,
    pub bulk: bool,
}

impl Affordances {
    fn all(enabled: bool) -> Self {
        Self {
            reorder: enabled,
            toggle: enabled,
            select: enabled,
            bulk: enabled,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterGate {
    filter: IncidenceFilter,
    page: u32,
    has_loaded: bool,
    refetching: bool,
    latest_ticket: u64,
}

impl Default for FilterGate {
    fn default() -> Self {
        Self {
            filter: IncidenceFilter::All,
            page: 1,
            has_loaded: false,
            refetching: false,
            latest_ticket: 0,
        }
    }
}

impl FilterGate {
    pub fn filter(&self) -> IncidenceFilter {
        self.filter
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn active_key(&self) -> CacheKey {
        CacheKey::incidences(self.filter, self.page)
    }

    /// Returns true when the filter actually changed. A new filter starts on page 1.
    pub fn set_filter(&mut self, filter: IncidenceFilter) -> bool {
        if self.filter == filter {
            return false;
        }
        self.filter = filter;
        self.page = 1;
        true
    }

    pub fn set_page(&mut self, page: u32) -> bool {
        let page = page.max(1);
        if self.page == page {
            return false;
        }
        self.page = page;
        true
    }

    pub fn fetch_started(&mut self) -> u64 {
        self.latest_ticket += 1;
        self.refetching = true;
        self.latest_ticket
    }

    /// Only the most recent fetch clears the in-progress flag. Returns whether
    /// `ticket` was that fetch.
    pub fn fetch_settled(&mut self, ticket: u64, loaded: bool) -> bool {
        if ticket != self.latest_ticket {
            return false;
        }
        self.refetching = false;
        if loaded {
            self.has_loaded = true;
        }
        true
    }

    pub fn is_initial_load(&self) -> bool {
        !self.has_loaded
    }

    pub fn is_filter_loading(&self) -> bool {
        self.refetching && !self.is_initial_load()
    }

    pub fn affordances(&self) -> Affordances {
        Affordances::all(!self.is_filter_loading())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_load_is_not_a_filter_transition() {
        let mut gate = FilterGate::default();
        let ticket = gate.fetch_started();

        assert!(gate.is_initial_load());
        assert!(!gate.is_filter_loading());
        assert!(gate.affordances().bulk);

        assert!(gate.fetch_settled(ticket, true));
        assert!(!gate.is_initial_load());
    }

    #[test]
    fn background_refetch_after_first_load_disables_mutations() {
        let mut gate = FilterGate::default();
        let first = gate.fetch_started();
        gate.fetch_settled(first, true);

        assert!(gate.set_filter(IncidenceFilter::New));
        let second = gate.fetch_started();

        assert!(gate.is_filter_loading());
        assert_eq!(gate.affordances(), Affordances::all(false));

        gate.fetch_settled(second, true);
        assert_eq!(gate.affordances(), Affordances::all(true));
    }

    #[test]
    fn older_fetch_settling_does_not_reopen_the_gate() {
        let mut gate = FilterGate::default();
        let first = gate.fetch_started();
        gate.fetch_settled(first, true);

        gate.set_filter(IncidenceFilter::New);
        let older = gate.fetch_started();
        gate.set_filter(IncidenceFilter::Regressions);
        let newer = gate.fetch_started();

        assert!(!gate.fetch_settled(older, true));
        assert!(gate.is_filter_loading());
        assert!(gate.fetch_settled(newer, true));
        assert!(!gate.is_filter_loading());
    }

    #[test]
    fn changing_filter_resets_page() {
        let mut gate = FilterGate::default();
        gate.set_page(3);
        gate.set_filter(IncidenceFilter::Regressions);

        assert_eq!(gate.active_key(), CacheKey::incidences(IncidenceFilter::Regressions, 1));
        assert!(!gate.set_filter(IncidenceFilter::Regressions));
    }
}
