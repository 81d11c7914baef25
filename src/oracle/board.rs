//! Per-cycle price board
//!
//! Computed prices are published to the board and fanned out to subscribers
//! interested in them. A subscriber first receives the latest value of every
//! pair it asks for, then each later update. Its channel closes once every
//! pair it is interested in has finished producing for the cycle.

use std::collections::{HashMap, HashSet};
use tokio::sync::{mpsc, Mutex};

use crate::types::{Pair, PairPrice};

struct Subscriber {
    interest: HashSet<Pair>,
    tx: mpsc::UnboundedSender<PairPrice>,
}

#[derive(Default)]
struct BoardState {
    latest: HashMap<Pair, PairPrice>,
    pending: HashSet<Pair>,
    subscribers: Vec<Subscriber>,
}

impl BoardState {
    fn prune(&mut self) {
        let pending = &self.pending;
        self.subscribers
            .retain(|s| !s.tx.is_closed() && s.interest.iter().any(|p| pending.contains(p)));
    }
}

/// Replaying publish/subscribe hub for one evaluation cycle
pub struct PriceBoard {
    state: Mutex<BoardState>,
}

impl PriceBoard {
    /// `producers` lists every pair that will be published this cycle.
    pub fn new(producers: impl IntoIterator<Item = Pair>) -> Self {
        Self {
            state: Mutex::new(BoardState {
                pending: producers.into_iter().collect(),
                ..BoardState::default()
            }),
        }
    }

    /// Subscribe to updates of `interest`, replaying values already published.
    pub async fn subscribe(&self, interest: &[Pair]) -> mpsc::UnboundedReceiver<PairPrice> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().await;

        let interest: HashSet<Pair> = interest.iter().cloned().collect();
        for pair in &interest {
            if let Some(price) = state.latest.get(pair) {
                // Receiver is alive: it is returned below
                let _ = tx.send(price.clone());
            }
        }

        if interest.iter().any(|p| state.pending.contains(p)) {
            state.subscribers.push(Subscriber { interest, tx });
        }

        rx
    }

    /// Publish a computed price to every interested subscriber.
    pub async fn publish(&self, price: PairPrice) {
        let mut state = self.state.lock().await;
        for subscriber in &state.subscribers {
            if subscriber.interest.contains(&price.pair) {
                // A closed receiver belongs to a finished consumer
                let _ = subscriber.tx.send(price.clone());
            }
        }
        state.latest.insert(price.pair.clone(), price);
    }

    /// Mark `pair` as done for the cycle, closing subscribers with nothing
    /// left to wait for.
    pub async fn finish(&self, pair: &Pair) {
        let mut state = self.state.lock().await;
        state.pending.remove(pair);
        state.prune();
    }

    pub async fn latest(&self, pair: &Pair) -> Option<PairPrice> {
        self.state.lock().await.latest.get(pair).cloned()
    }
}
