use std::collections::{HashMap, HashSet};

use crate::crypto::keys::KeyStore;
use crate::crypto::PublicKey;

/// Transparent keys the wallet watches. Keys are derived a fixed distance
/// past the last used index so payments to not-yet-issued addresses are
/// still recognised.
pub struct AddressBook {
    keys: HashMap<PublicKey, u32>,
    change: HashSet<u32>,
    next_index: u32,
}

impl AddressBook {
    const LOOKAHEAD: u32 = 20;

    pub fn new(keys: &dyn KeyStore) -> Self {
        let mut book = Self {
            keys: HashMap::new(),
            change: HashSet::new(),
            next_index: 0,
        };
        book.top_up(keys);
        book
    }

    fn top_up(&mut self, keys: &dyn KeyStore) {
        let derived = self.keys.len() as u32;
        for index in derived..self.next_index + Self::LOOKAHEAD {
            self.keys.insert(keys.transparent_public_key(index), index);
        }
    }

    pub fn index_of(&self, key: &PublicKey) -> Option<u32> {
        self.keys.get(key).copied()
    }

    pub fn is_change(&self, key: &PublicKey) -> bool {
        self.index_of(key)
            .map_or(false, |index| self.change.contains(&index))
    }

    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    /// Hands out `index`, as a receiving or a change key.
    pub fn reserve(&mut self, index: u32, change: bool, keys: &dyn KeyStore) {
        if change {
            self.change.insert(index);
        }
        self.mark_used(index, keys);
    }

    pub fn mark_used(&mut self, index: u32, keys: &dyn KeyStore) {
        if index >= self.next_index {
            self.next_index = index + 1;
            self.top_up(keys);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::crypto::keys::{KeyStore, SeedKeyStore};
    use crate::wallet::address_book::AddressBook;

    #[test]
    fn lookahead_follows_usage() {
        let keys = SeedKeyStore::from_seed([3u8; 32]);
        let mut book = AddressBook::new(&keys);
        assert_eq!(book.index_of(&keys.transparent_public_key(19)), Some(19));
        assert_eq!(book.index_of(&keys.transparent_public_key(20)), None);

        book.mark_used(15, &keys);
        assert_eq!(book.next_index(), 16);
        assert_eq!(book.index_of(&keys.transparent_public_key(35)), Some(35));

        book.reserve(16, true, &keys);
        assert!(book.is_change(&keys.transparent_public_key(16)));
        assert!(!book.is_change(&keys.transparent_public_key(15)));
        assert_eq!(book.next_index(), 17);
    }
}
