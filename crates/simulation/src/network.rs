//! Simulated network with deterministic delay, loss, duplication, and
//! rate limiting.
//!
//! The transport owns the nodes and routes the actions they return; nodes
//! never hold a reference back to the network. Deliveries live in a
//! min-heap keyed by `(delivery_time, seq)` — the monotone sequence breaks
//! ties deterministically.

use crate::journal::EventLog;
use quorumsim_core::{Action, Envelope};
use quorumsim_node::ValidatorNode;
use quorumsim_types::NodeId;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::time::Duration;
use tracing::{info, trace};

/// Configuration for the simulated transport.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Minimum per-hop delivery delay in seconds.
    pub min_delay: f64,
    /// Maximum per-hop delivery delay in seconds.
    pub max_delay: f64,
    /// Per-hop drop probability (0.0 - 1.0).
    pub drop_rate: f64,
    /// Per-hop duplication probability (0.0 - 1.0).
    pub duplicate_rate: f64,
    /// Messages per sender per simulated second.
    pub rate_limit: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            min_delay: 0.01,
            max_delay: 0.5,
            drop_rate: 0.05,
            duplicate_rate: 0.02,
            rate_limit: 100,
        }
    }
}

/// Counters collected while the simulation runs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NetworkStats {
    /// Sends accepted by the rate limiter (broadcast counts once).
    pub messages_sent: u64,
    /// Per-hop deliveries handed to a recipient.
    pub messages_delivered: u64,
    /// Per-hop drops.
    pub messages_dropped: u64,
    /// Extra copies injected by the duplicator.
    pub messages_duplicated: u64,
    /// Sends refused by the rate limiter.
    pub messages_rate_limited: u64,
}

impl NetworkStats {
    /// Fraction of scheduled hops that survived the drop filter.
    pub fn delivery_rate(&self) -> f64 {
        let total = self.messages_delivered + self.messages_dropped;
        if total == 0 {
            1.0
        } else {
            self.messages_delivered as f64 / total as f64
        }
    }
}

/// A message sitting in the delivery heap.
#[derive(Debug)]
struct Scheduled {
    time: Duration,
    seq: u64,
    from: NodeId,
    to: NodeId,
    envelope: Envelope,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.time, self.seq).cmp(&(other.time, other.seq))
    }
}

/// Per-sender sliding rate window.
#[derive(Debug)]
struct RateWindow {
    count: u32,
    window_start: Duration,
}

/// The virtual-time transport.
///
/// A virtual clock starts at zero and advances only inside [`NetSim::step`].
/// The only nondeterminism is the fault sampling, which is driven by a
/// seeded ChaCha8 RNG: the same seed replays the same run exactly.
pub struct NetSim {
    config: NetworkConfig,
    nodes: BTreeMap<NodeId, ValidatorNode>,
    queue: BinaryHeap<Reverse<Scheduled>>,
    seq: u64,
    now: Duration,
    rng: ChaCha8Rng,
    windows: HashMap<NodeId, RateWindow>,
    journal: EventLog,
    stats: NetworkStats,
}

impl NetSim {
    pub fn new(config: NetworkConfig, seed: u64) -> Self {
        Self {
            config,
            nodes: BTreeMap::new(),
            queue: BinaryHeap::new(),
            seq: 0,
            now: Duration::ZERO,
            rng: ChaCha8Rng::seed_from_u64(seed),
            windows: HashMap::new(),
            journal: EventLog::new(),
            stats: NetworkStats::default(),
        }
    }

    // ─── Accessors ───

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn node(&self, id: &NodeId) -> Option<&ValidatorNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut ValidatorNode> {
        self.nodes.get_mut(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ValidatorNode> {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().cloned().collect()
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn journal(&self) -> &EventLog {
        &self.journal
    }

    /// Run-level records (from the orchestrator) share the same stream.
    pub fn journal_mut(&mut self) -> &mut EventLog {
        &mut self.journal
    }

    /// Number of deliveries still sitting in the heap.
    pub fn pending_deliveries(&self) -> usize {
        self.queue.len()
    }

    // ─── Wiring ───

    /// Add a node to the routing table and start its rate window.
    pub fn register_node(&mut self, node: ValidatorNode) {
        let id = node.node_id().clone();
        self.windows.insert(
            id.clone(),
            RateWindow {
                count: 0,
                window_start: self.now,
            },
        );
        info!(node = %id, "registered node");
        self.nodes.insert(id, node);
    }

    /// Execute a node's outbound actions at the current virtual time.
    pub fn execute(&mut self, sender: &NodeId, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Broadcast(envelope) => self.broadcast(sender, envelope),
                Action::Send { to, envelope } => self.send(sender, &to, envelope),
            }
        }
    }

    // ─── Sending ───

    /// Fan a message out to every registered node except the sender.
    pub fn broadcast(&mut self, sender: &NodeId, envelope: Envelope) {
        if !self.check_rate_limit(sender) {
            self.stats.messages_rate_limited += 1;
            self.log_event("rate_limited", sender, &envelope, json!({"broadcast": true}));
            return;
        }
        self.stats.messages_sent += 1;
        self.log_event("send", sender, &envelope, json!({"broadcast": true}));

        let recipients: Vec<NodeId> = self
            .nodes
            .keys()
            .filter(|id| *id != sender)
            .cloned()
            .collect();
        for to in recipients {
            self.schedule_delivery(sender.clone(), to, envelope.clone());
        }
    }

    /// Unicast a message to one recipient.
    pub fn send(&mut self, sender: &NodeId, recipient: &NodeId, envelope: Envelope) {
        if !self.check_rate_limit(sender) {
            self.stats.messages_rate_limited += 1;
            self.log_event(
                "rate_limited",
                sender,
                &envelope,
                json!({"recipient": recipient}),
            );
            return;
        }
        self.stats.messages_sent += 1;
        self.log_event("send", sender, &envelope, json!({"recipient": recipient}));
        self.schedule_delivery(sender.clone(), recipient.clone(), envelope);
    }

    /// Sliding window: the first send opens the window, a full simulated
    /// second closes it and resets the counter to 1.
    fn check_rate_limit(&mut self, sender: &NodeId) -> bool {
        let now = self.now;
        let window = self.windows.entry(sender.clone()).or_insert(RateWindow {
            count: 0,
            window_start: now,
        });

        if now - window.window_start >= Duration::from_secs(1) {
            window.count = 1;
            window.window_start = now;
            return true;
        }
        if window.count >= self.config.rate_limit {
            return false;
        }
        window.count += 1;
        true
    }

    fn schedule_delivery(&mut self, from: NodeId, to: NodeId, envelope: Envelope) {
        if self.rng.gen::<f64>() < self.config.drop_rate {
            self.stats.messages_dropped += 1;
            trace!(from = %from, to = %to, msg_id = %envelope.msg_id, "dropping message");
            self.log_event("drop", &to, &envelope, json!({"reason": "random_drop"}));
            return;
        }

        let delay = self
            .rng
            .gen_range(self.config.min_delay..=self.config.max_delay);
        let delivery_time = self.now + Duration::from_secs_f64(delay);
        self.push(delivery_time, from.clone(), to.clone(), envelope.clone());
        self.log_event(
            "delay",
            &to,
            &envelope,
            json!({"delay": delay, "delivery_time": delivery_time.as_secs_f64()}),
        );

        if self.rng.gen::<f64>() < self.config.duplicate_rate {
            let dup_delay = delay + self.rng.gen_range(0.01..=0.1);
            let dup_time = self.now + Duration::from_secs_f64(dup_delay);
            self.push(dup_time, from.clone(), to.clone(), envelope.clone());
            self.stats.messages_duplicated += 1;
            self.log_event(
                "duplicate",
                &to,
                &envelope,
                json!({"original_delay": delay, "dup_delay": dup_delay}),
            );
        }
    }

    fn push(&mut self, time: Duration, from: NodeId, to: NodeId, envelope: Envelope) {
        self.seq += 1;
        self.queue.push(Reverse(Scheduled {
            time,
            seq: self.seq,
            from,
            to,
            envelope,
        }));
    }

    // ─── Clock ───

    /// Advance virtual time by `dt`, delivering everything due on the way.
    pub fn step(&mut self, dt: Duration) {
        let deadline = self.now + dt;
        loop {
            let due = matches!(
                self.queue.peek(),
                Some(Reverse(scheduled)) if scheduled.time <= deadline
            );
            if !due {
                break;
            }
            let Some(Reverse(scheduled)) = self.queue.pop() else {
                break;
            };
            self.now = scheduled.time;
            self.deliver(scheduled);
        }
        self.now = deadline;
    }

    fn deliver(&mut self, scheduled: Scheduled) {
        let Scheduled {
            from, to, envelope, ..
        } = scheduled;

        let actions = match self.nodes.get_mut(&to) {
            Some(node) => {
                node.set_time(self.now);
                node.handle_envelope(envelope.clone())
            }
            None => return,
        };

        self.stats.messages_delivered += 1;
        self.log_event("receive", &to, &envelope, json!({"from": from}));
        self.execute(&to, actions);
    }

    fn log_event(&mut self, kind: &str, node: &NodeId, envelope: &Envelope, mut details: Value) {
        // Every record carries the block height when the payload has one.
        if let Value::Object(map) = &mut details {
            map.insert("height".to_string(), json!(envelope.height_hint()));
        }
        let data = json!({
            "node": node,
            "msg_type": envelope.msg_type(),
            "msg_id": envelope.msg_id.to_string(),
            "details": details,
        });
        self.journal.append(self.now.as_secs_f64(), kind, data);
    }
}
