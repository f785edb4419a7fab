//! Per-key in-flight population tracking (singleflight).

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::{BoxFuture, FutureExt, Shared};

use super::{error::HybridCacheError, local::CachedValue};

pub(crate) type FlightResult = Result<CachedValue, HybridCacheError>;
pub(crate) type Flight = Shared<BoxFuture<'static, FlightResult>>;

/// Tracks populations that are currently running, one per key.
///
/// The map lock is held only while a flight is looked up or registered; the
/// population itself runs outside it.
#[derive(Default, Clone)]
pub(crate) struct InFlight {
    flights: Arc<DashMap<String, Flight>>,
}

impl InFlight {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Join the running flight for `key`, or register a new one built by `start`.
    ///
    /// Returns the flight and whether this caller registered it. `start` is
    /// only called for a new flight and receives the guard that unregisters it;
    /// the returned future must not be polled before this function returns.
    pub(crate) fn join_or_start<S>(&self, key: &str, start: S) -> (Flight, bool)
    where
        S: FnOnce(FlightGuard) -> BoxFuture<'static, FlightResult>,
    {
        match self.flights.entry(key.to_string()) {
            Entry::Occupied(occupied) => (occupied.get().clone(), false),
            Entry::Vacant(vacant) => {
                let guard = FlightGuard {
                    key: key.to_string(),
                    flights: Arc::clone(&self.flights),
                };
                let flight = start(guard).shared();
                vacant.insert(flight.clone());
                (flight, true)
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.flights.len()
    }
}

/// Unregisters a flight when dropped, including on panic or cancellation.
pub(crate) struct FlightGuard {
    key: String,
    flights: Arc<DashMap<String, Flight>>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.flights.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn ready(value: u32, guard: FlightGuard) -> BoxFuture<'static, FlightResult> {
        async move {
            drop(guard);
            let value: CachedValue = Arc::new(value);
            Ok(value)
        }
        .boxed()
    }

    #[tokio::test]
    async fn second_caller_joins_existing_flight() {
        let in_flight = InFlight::new();

        let (first, first_started) = in_flight.join_or_start("k", |guard| ready(7, guard));
        let (second, second_started) =
            in_flight.join_or_start("k", |_guard| panic!("must not start a second flight"));

        assert!(first_started);
        assert!(!second_started);
        assert_eq!(in_flight.len(), 1);

        let a = first.await.expect("first result");
        let b = second.await.expect("second result");
        assert_eq!(a.downcast_ref::<u32>(), Some(&7));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(in_flight.len(), 0);
    }

    #[tokio::test]
    async fn distinct_keys_start_distinct_flights() {
        let in_flight = InFlight::new();

        let (a, a_started) = in_flight.join_or_start("a", |guard| ready(1, guard));
        let (b, b_started) = in_flight.join_or_start("b", |guard| ready(2, guard));

        assert!(a_started && b_started);
        assert_eq!(in_flight.len(), 2);
        let _ = futures::join!(a, b);
        assert_eq!(in_flight.len(), 0);
    }

    #[tokio::test]
    async fn finished_flight_allows_a_new_one() {
        let in_flight = InFlight::new();
        let (flight, _) = in_flight.join_or_start("k", |guard| ready(1, guard));
        assert_eq!(in_flight.len(), 1);

        flight.await.expect("flight result");
        assert_eq!(in_flight.len(), 0);

        let (_again, started) = in_flight.join_or_start("k", |guard| ready(2, guard));
        assert!(started);
    }
}
