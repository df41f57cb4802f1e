//! Bounded parallel mapping over independent work items.
//!
//! The weighting layers are pure functions of their own inputs, so components,
//! period bands and events can be evaluated on the rayon pool. Items are
//! dispatched in chunks of at most `max_concurrent` to cap peak memory when each
//! item allocates a dense distance matrix.

use std::collections::BTreeMap;

use rayon::prelude::*;

/// Default cap on items in flight.
pub const DEFAULT_MAX_CONCURRENT: usize = 16;

/// Maps `f` over `items` in parallel and returns the results in input order.
///
/// Stops at the first chunk that contains an error and returns it. Items within
/// the failing chunk may still have been processed.
///
/// # Panics
///
/// Panics if `max_concurrent` is 0.
pub fn try_par_map_limited<T, R, E, F>(
    items: &[T],
    max_concurrent: usize,
    f: F,
) -> Result<Vec<R>, E>
where
    T: Sync,
    R: Send,
    E: Send,
    F: Fn(&T) -> Result<R, E> + Sync,
{
    assert!(max_concurrent > 0, "max_concurrent must be > 0");

    let mut results = Vec::with_capacity(items.len());
    for chunk in items.chunks(max_concurrent) {
        let chunk_results: Result<Vec<R>, E> = chunk.par_iter().map(&f).collect();
        results.extend(chunk_results?);
    }
    Ok(results)
}

/// Like [`try_par_map_limited`], but over the entries of a map, keeping the keys.
pub fn try_par_map_keyed<K, V, R, E, F>(
    items: &BTreeMap<K, V>,
    max_concurrent: usize,
    f: F,
) -> Result<BTreeMap<K, R>, E>
where
    K: Ord + Clone + Sync + Send,
    V: Sync,
    R: Send,
    E: Send,
    F: Fn(&K, &V) -> Result<R, E> + Sync,
{
    let entries: Vec<(&K, &V)> = items.iter().collect();
    let values = try_par_map_limited(&entries, max_concurrent, |(key, value)| f(key, value))?;
    Ok(entries
        .into_iter()
        .map(|(key, _)| key.clone())
        .zip(values)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_try_par_map_limited_preserves_order() {
        let items: Vec<i32> = (0..100).collect();
        let result: Result<Vec<i32>, ()> = try_par_map_limited(&items, 4, |&x| Ok(x * 2));
        let expected: Vec<i32> = (0..100).map(|x| x * 2).collect();
        assert_eq!(result.unwrap(), expected);
    }

    #[test]
    fn test_try_par_map_limited_err() {
        let items: Vec<i32> = (0..10).collect();
        let result: Result<Vec<i32>, String> = try_par_map_limited(&items, 3, |&x| {
            if x == 5 {
                Err(format!("bad item {x}"))
            } else {
                Ok(x)
            }
        });
        assert_eq!(result.unwrap_err(), "bad item 5");
    }

    #[test]
    fn test_try_par_map_limited_empty() {
        let items: Vec<i32> = vec![];
        let result: Result<Vec<i32>, ()> = try_par_map_limited(&items, 3, |&x| Ok(x));
        assert!(result.unwrap().is_empty());
    }

    #[test]
    #[should_panic(expected = "max_concurrent must be > 0")]
    fn test_try_par_map_limited_zero_panics() {
        let _: Result<Vec<i32>, ()> = try_par_map_limited(&[1, 2, 3], 0, |&x| Ok(x));
    }

    #[test]
    fn test_try_par_map_limited_concurrency_cap() {
        let items: Vec<i32> = (0..20).collect();
        let in_flight = AtomicUsize::new(0);
        let max_observed = AtomicUsize::new(0);

        let _: Result<Vec<i32>, ()> = try_par_map_limited(&items, 3, |&x| {
            let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            max_observed.fetch_max(current, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(5));
            in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(x)
        });

        let max = max_observed.load(Ordering::SeqCst);
        assert!(max <= 3, "max in-flight was {max}, expected <= 3");
    }

    #[test]
    fn test_try_par_map_keyed_keeps_keys() {
        let mut items = BTreeMap::new();
        items.insert("BHZ".to_string(), 3_usize);
        items.insert("BHR".to_string(), 5_usize);
        items.insert("BHT".to_string(), 7_usize);

        let result: BTreeMap<String, usize> =
            try_par_map_keyed(&items, 2, |_, &v| Ok::<_, ()>(v * 10)).unwrap();

        assert_eq!(result["BHR"], 50);
        assert_eq!(result["BHT"], 70);
        assert_eq!(result["BHZ"], 30);
    }
}
