use serde::Serialize;

/// Search times already tried by a staking wallet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StakeWindow {
    pub best_height: u32,
    /// most recent mask-aligned candidate
    pub search_time: u64,
    /// last search time a kernel check ran at
    pub last_search_time: u64,
}

impl StakeWindow {
    pub fn is_consumed(&self, search_time: u64) -> bool {
        search_time <= self.last_search_time
    }

    /// Claims `search_time` for an attempt on top of `best_height`.
    /// Returns false, leaving the window untouched, when the time is not
    /// strictly after the last attempt.
    pub fn advance(&mut self, best_height: u32, search_time: u64) -> bool {
        if self.is_consumed(search_time) {
            return false;
        }
        self.best_height = best_height;
        self.search_time = search_time;
        self.last_search_time = search_time;
        true
    }
}
