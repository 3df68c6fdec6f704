// Copyright 2025 Stoolap Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Hash collections keyed by [`FrequencyKey`]
//!
//! - `KeyMap`/`KeySet` for single-threaded use (FxHash)
//! - `ConcurrentKeyMap` for concurrent access (DashMap)

use dashmap::DashMap;
use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use std::hash::BuildHasherDefault;

use crate::core::FrequencyKey;

/// Type alias for FxHash's BuildHasher
pub type FxBuildHasher = BuildHasherDefault<FxHasher>;

/// Fast single-threaded map keyed by (relation, attribute)
pub type KeyMap<V> = FxHashMap<FrequencyKey, V>;

/// Fast single-threaded set of (relation, attribute) keys
pub type KeySet = FxHashSet<FrequencyKey>;

/// Concurrent map keyed by (relation, attribute)
///
/// Uses DashMap with FxHash: sharded, lock-free reads and fine-grained
/// locking for writes, so unrelated keys rarely touch the same shard lock.
pub type ConcurrentKeyMap<V> = DashMap<FrequencyKey, V, FxBuildHasher>;

/// Create a new ConcurrentKeyMap with default capacity
#[inline]
pub fn new_concurrent_key_map<V>() -> ConcurrentKeyMap<V> {
    DashMap::with_hasher(FxBuildHasher::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_key_set_dedups() {
        let mut set = KeySet::default();
        assert!(set.insert(FrequencyKey::new(1, 1)));
        assert!(!set.insert(FrequencyKey::new(1, 1)));
        assert!(set.insert(FrequencyKey::new(1, 2)));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_concurrent_key_map() {
        let map: Arc<ConcurrentKeyMap<u64>> = Arc::new(new_concurrent_key_map());

        let handles: Vec<_> = (0i16..4)
            .map(|t| {
                let map = Arc::clone(&map);
                thread::spawn(move || {
                    for rel in 0u32..100 {
                        map.insert(FrequencyKey::new(rel, t), u64::from(rel));
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(map.len(), 400);
        assert_eq!(*map.get(&FrequencyKey::new(42, 3)).unwrap(), 42);
    }
}
