// EDB - Ethereum Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use std::{cell::RefCell, fmt, sync::Arc};

use tracing::trace;

/// A memoized fact.
///
/// The leaf remembers the key of its last computation, which is built from the
/// dependencies it read. A read with an equal key returns the remembered value;
/// any other key recomputes and replaces it.
pub struct Leaf<K, V> {
    name: &'static str,
    memo: RefCell<Option<(K, V)>>,
}

impl<K, V> Leaf<K, V> {
    /// Create an empty leaf
    pub fn new(name: &'static str) -> Self {
        Self { name, memo: RefCell::new(None) }
    }

    /// Name of the fact, as used in paths
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Forget the remembered value
    pub fn invalidate(&self) {
        self.memo.borrow_mut().take();
    }
}

impl<K: PartialEq, V: Clone> Leaf<K, V> {
    /// Return the value for `key`, computing it if the dependencies changed
    pub fn get(&self, key: K, compute: impl FnOnce() -> V) -> V {
        if let Some(value) = self.cached(&key) {
            return value;
        }
        let value = compute();
        self.store(key, value.clone());
        value
    }

    /// Like [`Leaf::get`] for fallible facts. Errors are not remembered.
    pub fn try_get<E>(&self, key: K, compute: impl FnOnce() -> Result<V, E>) -> Result<V, E> {
        if let Some(value) = self.cached(&key) {
            return Ok(value);
        }
        let value = compute()?;
        self.store(key, value.clone());
        Ok(value)
    }

    fn cached(&self, key: &K) -> Option<V> {
        let memo = self.memo.borrow();
        let (cached_key, value) = memo.as_ref()?;
        if cached_key == key {
            trace!(leaf = self.name, "memo hit");
            Some(value.clone())
        } else {
            None
        }
    }

    fn store(&self, key: K, value: V) {
        trace!(leaf = self.name, "memo miss");
        *self.memo.borrow_mut() = Some((key, value));
    }
}

impl<K, V> fmt::Debug for Leaf<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Leaf")
            .field("name", &self.name)
            .field("computed", &self.memo.borrow().is_some())
            .finish()
    }
}

/// Compares shared values by pointer, so that memo keys follow identity.
#[derive(Debug)]
pub struct ArcKey<T>(pub Arc<T>);

impl<T> ArcKey<T> {
    /// Key for an optional shared value
    pub fn of(value: Option<&Arc<T>>) -> Option<Self> {
        value.map(|value| Self(Arc::clone(value)))
    }
}

impl<T> Clone for ArcKey<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> PartialEq for ArcKey<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Eq for ArcKey<T> {}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn test_recomputes_only_on_key_change() {
        let leaf: Leaf<usize, String> = Leaf::new("test");
        let runs = Cell::new(0);
        let compute = |key: usize| {
            runs.set(runs.get() + 1);
            format!("value {key}")
        };

        assert_eq!(leaf.get(1, || compute(1)), "value 1");
        assert_eq!(leaf.get(1, || compute(1)), "value 1");
        assert_eq!(runs.get(), 1);

        assert_eq!(leaf.get(2, || compute(2)), "value 2");
        assert_eq!(runs.get(), 2);

        leaf.invalidate();
        leaf.get(2, || compute(2));
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn test_errors_are_not_remembered() {
        let leaf: Leaf<usize, usize> = Leaf::new("fallible");
        assert_eq!(leaf.try_get(0, || Err::<usize, _>("boom")), Err("boom"));
        assert_eq!(leaf.try_get(0, || Ok::<_, &str>(7)), Ok(7));
        assert_eq!(leaf.try_get(0, || Err::<usize, _>("ignored")), Ok(7));
    }

    #[test]
    fn test_arc_key_identity() {
        let a = Arc::new(1);
        let b = Arc::new(1);
        assert_eq!(ArcKey(a.clone()), ArcKey(a.clone()));
        assert_ne!(ArcKey(a), ArcKey(b));
    }
}
