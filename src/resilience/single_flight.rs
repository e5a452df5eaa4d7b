use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};

type Flight<T> = Shared<BoxFuture<'static, Option<T>>>;
type Slots<T> = Arc<Mutex<HashMap<String, (u64, Flight<T>)>>>;

/// Result of [`SingleFlight::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlightOutcome<T> {
    /// `None` when the work panicked or was aborted.
    pub value: Option<T>,
    /// true when this caller attached to work started by another caller
    pub joined: bool,
}

/// Collapses concurrent work for the same key into one spawned task.
///
/// The first caller for a key spawns the work, later callers await the same
/// shared result. The key is released when the task ends, so the next caller
/// after that starts fresh work. The task keeps running when every caller goes
/// away.
///
/// [`SingleFlight::run_fresh`] never joins: it always spawns its own work and
/// takes over the key, so callers arriving after it share the newer result.
pub struct SingleFlight<T> {
    inflight: Slots<T>,
    next_id: Arc<AtomicU64>,
}

impl<T> Clone for SingleFlight<T> {
    fn clone(&self) -> Self {
        Self { inflight: self.inflight.clone(), next_id: self.next_id.clone() }
    }
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the key when the spawned task ends, panics included.
/// A slot already taken over by a newer flight is left alone.
struct Release<T> {
    inflight: Slots<T>,
    key: String,
    id: u64,
}

impl<T> Drop for Release<T> {
    fn drop(&mut self) {
        let mut map = self.inflight.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if map.get(&self.key).is_some_and(|(id, _)| *id == self.id) {
            map.remove(&self.key);
        }
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self { inflight: Arc::new(Mutex::new(HashMap::new())), next_id: Arc::new(AtomicU64::new(0)) }
    }

    pub async fn run<F>(&self, key: &str, work: F) -> FlightOutcome<T>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let (flight, joined) = self.attach(key, work, false);
        FlightOutcome { value: flight.await, joined }
    }

    /// Like [`SingleFlight::run`] but never attaches to work already in progress.
    pub async fn run_fresh<F>(&self, key: &str, work: F) -> FlightOutcome<T>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let (flight, joined) = self.attach(key, work, true);
        FlightOutcome { value: flight.await, joined }
    }

    fn attach<F>(&self, key: &str, work: F, fresh: bool) -> (Flight<T>, bool)
    where
        F: Future<Output = T> + Send + 'static,
    {
        let mut map = self.inflight.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !fresh {
            if let Some((_, flight)) = map.get(key) {
                return (flight.clone(), true);
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let release = Release { inflight: self.inflight.clone(), key: key.to_string(), id };
        let handle = tokio::spawn(async move {
            let _release = release;
            work.await
        });
        let flight: Flight<T> = async move { handle.await.ok() }.boxed().shared();
        map.insert(key.to_string(), (id, flight.clone()));
        (flight, false)
    }

    /// Number of keys with work in progress.
    pub fn in_flight(&self) -> usize {
        self.inflight.lock().map(|map| map.len()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn concurrent_callers_share_one_execution() {
        let flights: SingleFlight<String> = SingleFlight::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let leader = {
            let flights = flights.clone();
            let runs = runs.clone();
            tokio::spawn(async move {
                flights
                    .run("k", async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        let _ = release_rx.await;
                        "value".to_string()
                    })
                    .await
            })
        };
        while flights.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        let follower = {
            let flights = flights.clone();
            let runs = runs.clone();
            tokio::spawn(async move {
                flights
                    .run("k", async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        "other".to_string()
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let _ = release_tx.send(());

        let leader = leader.await.unwrap();
        let follower = follower.await.unwrap();
        assert_eq!(leader, FlightOutcome { value: Some("value".into()), joined: false });
        assert_eq!(follower.value.as_deref(), Some("value"));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn key_is_released_after_completion() {
        let flights: SingleFlight<u32> = SingleFlight::new();
        assert_eq!(flights.run("k", async { 1 }).await.value, Some(1));
        assert_eq!(flights.in_flight(), 0);
        assert_eq!(flights.run("k", async { 2 }).await.value, Some(2));
    }

    #[tokio::test]
    async fn distinct_keys_do_not_share() {
        let flights: SingleFlight<&'static str> = SingleFlight::new();
        let (a, b) = tokio::join!(flights.run("a", async { "A" }), flights.run("b", async { "B" }));
        assert_eq!(a.value, Some("A"));
        assert_eq!(b.value, Some("B"));
        assert!(!a.joined && !b.joined);
    }

    #[tokio::test]
    async fn fresh_run_never_joins_and_newer_flight_owns_the_key() {
        let flights: SingleFlight<&'static str> = SingleFlight::new();
        let (first_tx, first_rx) = oneshot::channel::<()>();
        let (second_tx, second_rx) = oneshot::channel::<()>();

        let first = {
            let flights = flights.clone();
            tokio::spawn(async move {
                flights
                    .run("k", async move {
                        let _ = first_rx.await;
                        "stale"
                    })
                    .await
            })
        };
        while flights.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        let forced = {
            let flights = flights.clone();
            tokio::spawn(async move {
                flights
                    .run_fresh("k", async move {
                        let _ = second_rx.await;
                        "fresh"
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        // the older flight finishing must not release the key held by the forced one
        let _ = first_tx.send(());
        assert_eq!(first.await.unwrap().value, Some("stale"));
        assert_eq!(flights.in_flight(), 1);

        let joiner = {
            let flights = flights.clone();
            tokio::spawn(async move { flights.run("k", async { "unused" }).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let _ = second_tx.send(());

        assert_eq!(forced.await.unwrap(), FlightOutcome { value: Some("fresh"), joined: false });
        assert_eq!(joiner.await.unwrap(), FlightOutcome { value: Some("fresh"), joined: true });
        assert_eq!(flights.in_flight(), 0);
    }

    async fn explode() -> u32 {
        panic!("extractor blew up")
    }

    #[tokio::test]
    async fn panicking_work_resolves_to_none_and_releases() {
        let flights: SingleFlight<u32> = SingleFlight::new();
        let outcome = flights.run("boom", explode()).await;
        assert_eq!(outcome.value, None);
        assert_eq!(flights.in_flight(), 0);
    }
}
