//! Network simulator for deterministic testing.
//!
//! Real networks drop, duplicate and reorder datagrams.  To exercise the reliability
//! mechanisms without depending on actual network conditions, this module
//! provides a [`Simulator`] that wraps any [`DatagramChannel`] and applies a
//! fault model to everything *sent* through it:
//!
//! | Fault            | Description                                        |
//! |------------------|----------------------------------------------------|
//! | Packet loss      | Drop a datagram with probability `loss_rate`.      |
//! | Duplication      | Deliver a datagram twice.                          |
//! | Targeted drop    | Drop the next N datagrams matching a predicate.    |
//! | Reordering       | Hold a matching datagram back behind later sends.  |
//!
//! Faults are applied on the sending side only; wrap both peers' channels to
//! impair both directions.  The RNG is seeded so failures are reproducible.

use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::socket::{DatagramChannel, SocketError};

/// Configuration for the fault-injection model.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Probability that any given datagram is silently dropped.
    pub loss_rate: f64,
    /// Probability that a delivered datagram is sent a second time.
    pub duplicate_rate: f64,
    /// Seed for the fault RNG.
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default — simulator is a transparent pass-through.
        Self {
            loss_rate: 0.0,
            duplicate_rate: 0.0,
            seed: 0,
        }
    }
}

/// Counters of what the simulator did with outbound datagrams.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SimStats {
    /// Datagrams handed to `send_to`.
    pub offered: usize,
    /// Datagrams dropped (random loss or targeted).
    pub dropped: usize,
    /// Extra copies delivered.
    pub duplicated: usize,
    /// Datagrams held back and delivered after later ones.
    pub reordered: usize,
}

type Matcher = Box<dyn Fn(&[u8]) -> bool + Send>;

#[derive(Clone, Copy)]
enum Action {
    Drop,
    /// Deliver after this many further datagrams have been offered.
    Hold { behind: usize },
}

struct Rule {
    matches: Matcher,
    remaining: usize,
    action: Action,
}

struct Held {
    buf: Vec<u8>,
    dest: SocketAddr,
    behind: usize,
}

enum Fate {
    Drop,
    Hold,
    Deliver { copies: usize },
}

/// A fault-injecting wrapper around another channel.
pub struct Simulator<C> {
    inner: C,
    config: SimulatorConfig,
    rng: Mutex<StdRng>,
    rules: Mutex<Vec<Rule>>,
    held: Mutex<Vec<Held>>,
    offered: Mutex<Vec<(Vec<u8>, SocketAddr)>>,
    stats: Mutex<SimStats>,
}

impl<C: DatagramChannel> Simulator<C> {
    pub fn new(inner: C, config: SimulatorConfig) -> Self {
        let config = SimulatorConfig {
            loss_rate: config.loss_rate.clamp(0.0, 1.0),
            duplicate_rate: config.duplicate_rate.clamp(0.0, 1.0),
            ..config
        };
        Self {
            inner,
            rng: Mutex::new(StdRng::seed_from_u64(config.seed)),
            config,
            rules: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
            offered: Mutex::new(Vec::new()),
            stats: Mutex::new(SimStats::default()),
        }
    }

    /// A simulator that injects no random faults.
    pub fn transparent(inner: C) -> Self {
        Self::new(inner, SimulatorConfig::default())
    }

    /// Drop the next `count` outbound datagrams for which `matches` is true.
    pub fn drop_next(&self, count: usize, matches: impl Fn(&[u8]) -> bool + Send + 'static) {
        self.add_rule(count, matches, Action::Drop);
    }

    /// Hold back the next `count` outbound datagrams for which `matches` is
    /// true, delivering each one right after `behind` further datagrams.
    ///
    /// A held datagram still pending when the simulator is dropped is lost.
    pub fn reorder_next(
        &self,
        count: usize,
        behind: usize,
        matches: impl Fn(&[u8]) -> bool + Send + 'static,
    ) {
        self.add_rule(count, matches, Action::Hold { behind: behind.max(1) });
    }

    fn add_rule(&self, count: usize, matches: impl Fn(&[u8]) -> bool + Send + 'static, action: Action) {
        lock(&self.rules).push(Rule {
            matches: Box::new(matches),
            remaining: count,
            action,
        });
    }

    /// Every datagram handed to `send_to`, in order, whether or not it was
    /// delivered.
    pub fn offered(&self) -> Vec<(Vec<u8>, SocketAddr)> {
        lock(&self.offered).clone()
    }

    pub fn stats(&self) -> SimStats {
        *lock(&self.stats)
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Decide what happens to `buf`, and release held datagrams that are now
    /// due.  Released datagrams go out after `buf` itself.
    fn decide(&self, buf: &[u8], dest: SocketAddr) -> (Fate, Vec<Held>) {
        lock(&self.offered).push((buf.to_vec(), dest));
        let mut stats = lock(&self.stats);
        stats.offered += 1;

        let mut held = lock(&self.held);
        for h in held.iter_mut() {
            h.behind -= 1;
        }
        let (due, waiting): (Vec<Held>, Vec<Held>) = held.drain(..).partition(|h| h.behind == 0);
        *held = waiting;

        let targeted = match lock(&self.rules)
            .iter_mut()
            .find(|rule| rule.remaining > 0 && (rule.matches)(buf))
        {
            Some(rule) => {
                rule.remaining -= 1;
                Some(rule.action)
            }
            None => None,
        };

        let mut rng = lock(&self.rng);
        let fate = match targeted {
            Some(Action::Drop) => Fate::Drop,
            Some(Action::Hold { behind }) => {
                held.push(Held {
                    buf: buf.to_vec(),
                    dest,
                    behind,
                });
                Fate::Hold
            }
            None if rng.random_bool(self.config.loss_rate) => Fate::Drop,
            None if rng.random_bool(self.config.duplicate_rate) => Fate::Deliver { copies: 2 },
            None => Fate::Deliver { copies: 1 },
        };
        match fate {
            Fate::Drop => stats.dropped += 1,
            Fate::Hold => stats.reordered += 1,
            Fate::Deliver { copies } => stats.duplicated += copies - 1,
        }
        (fate, due)
    }
}

#[async_trait]
impl<C: DatagramChannel> DatagramChannel for Simulator<C> {
    async fn send_to(&self, buf: &[u8], dest: SocketAddr) -> Result<(), SocketError> {
        let (fate, due) = self.decide(buf, dest);
        match fate {
            Fate::Drop => log::debug!("[sim] dropped {} byte(s) to {dest}", buf.len()),
            Fate::Hold => log::debug!("[sim] holding {} byte(s) to {dest}", buf.len()),
            Fate::Deliver { copies } => {
                for _ in 0..copies {
                    self.inner.send_to(buf, dest).await?;
                }
            }
        }
        for held in due {
            log::debug!("[sim] releasing {} held byte(s) to {}", held.buf.len(), held.dest);
            self.inner.send_to(&held.buf, held.dest).await?;
        }
        Ok(())
    }

    async fn recv_from(&self) -> Result<(Vec<u8>, SocketAddr), SocketError> {
        self.inner.recv_from().await
    }
}

/// Lock ignoring poison: a panicking test thread must not wedge the others.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::socket::Socket;

    async fn pair() -> (Simulator<Socket>, Socket) {
        let a = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        (Simulator::transparent(a), b)
    }

    #[tokio::test]
    async fn transparent_by_default() {
        let (sim, b) = pair().await;
        sim.send_to(b"one", b.local_addr).await.unwrap();
        let (data, _) = b.recv_timeout(Duration::from_secs(2)).await.unwrap();
        assert_eq!(data, b"one");
        assert_eq!(
            sim.stats(),
            SimStats {
                offered: 1,
                dropped: 0,
                duplicated: 0,
                reordered: 0,
            }
        );
    }

    #[tokio::test]
    async fn targeted_drop_applies_count_times() {
        let (sim, b) = pair().await;
        sim.drop_next(2, |buf| buf.starts_with(b"x"));

        for msg in [&b"x1"[..], b"y1", b"x2", b"x3"] {
            sim.send_to(msg, b.local_addr).await.unwrap();
        }

        let (first, _) = b.recv_timeout(Duration::from_secs(2)).await.unwrap();
        let (second, _) = b.recv_timeout(Duration::from_secs(2)).await.unwrap();
        assert_eq!(first, b"y1");
        assert_eq!(second, b"x3");
        assert!(b.recv_timeout(Duration::from_millis(50)).await.is_err());

        assert_eq!(sim.stats().dropped, 2);
        assert_eq!(sim.offered().len(), 4);
    }

    #[tokio::test]
    async fn held_datagram_arrives_after_later_ones() {
        let (sim, b) = pair().await;
        sim.reorder_next(1, 2, |buf| buf == b"late");

        for msg in [&b"late"[..], b"first", b"second", b"third"] {
            sim.send_to(msg, b.local_addr).await.unwrap();
        }

        let mut arrived = Vec::new();
        for _ in 0..4 {
            let (data, _) = b.recv_timeout(Duration::from_secs(2)).await.unwrap();
            arrived.push(data);
        }
        assert_eq!(
            arrived,
            vec![
                b"first".to_vec(),
                b"second".to_vec(),
                b"late".to_vec(),
                b"third".to_vec()
            ]
        );
        assert_eq!(sim.stats().reordered, 1);
        assert_eq!(sim.stats().dropped, 0);
    }

    #[tokio::test]
    async fn full_loss_drops_everything() {
        let a = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let sim = Simulator::new(
            a,
            SimulatorConfig {
                loss_rate: 1.0,
                ..Default::default()
            },
        );

        sim.send_to(b"gone", b.local_addr).await.unwrap();
        assert!(matches!(
            b.recv_timeout(Duration::from_millis(50)).await,
            Err(SocketError::Timeout)
        ));
        assert_eq!(sim.stats().dropped, 1);
    }

    #[tokio::test]
    async fn full_duplication_sends_twice() {
        let a = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let sim = Simulator::new(
            a,
            SimulatorConfig {
                duplicate_rate: 1.0,
                ..Default::default()
            },
        );

        sim.send_to(b"twice", b.local_addr).await.unwrap();
        for _ in 0..2 {
            let (data, _) = b.recv_timeout(Duration::from_secs(2)).await.unwrap();
            assert_eq!(data, b"twice");
        }
        assert_eq!(sim.stats().duplicated, 1);
    }
}
