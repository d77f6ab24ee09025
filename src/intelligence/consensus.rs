use std::collections::{BTreeMap, HashMap};

use crate::models::{ConsensusSignal, Signal, SignalKind, WalletSignal};

/// Pairs must have co-entered more than this many times to be considered
/// one entity.
pub const CLUSTER_MIN_CO_ENTRIES: u32 = 3;
/// ...and on more than this share (percent) of either wallet's entries.
pub const CLUSTER_MIN_OVERLAP_PCT: u32 = 80;

/// Entry history used to tell independent agreement from one operator
/// running several wallets.
#[derive(Debug, Default, Clone)]
pub struct CoEntryTracker {
    entries: HashMap<String, u32>,
    co_entries: HashMap<(String, String), u32>,
}

fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

impl CoEntryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self, wallet: &str) -> u32 {
        self.entries.get(wallet).copied().unwrap_or(0)
    }

    pub fn co_entries(&self, a: &str, b: &str) -> u32 {
        self.co_entries.get(&pair_key(a, b)).copied().unwrap_or(0)
    }

    /// Record that `wallets` all newly entered the same (market, outcome).
    pub fn record_group(&mut self, wallets: &[String]) {
        for w in wallets {
            *self.entries.entry(w.clone()).or_insert(0) += 1;
        }
        for (i, a) in wallets.iter().enumerate() {
            for b in &wallets[i + 1..] {
                *self.co_entries.entry(pair_key(a, b)).or_insert(0) += 1;
            }
        }
    }

    /// True when the pair co-entered more than 3 times and on over 80% of
    /// either wallet's entries.
    pub fn is_clustered(&self, a: &str, b: &str) -> bool {
        let co = self.co_entries(a, b);
        if co <= CLUSTER_MIN_CO_ENTRIES {
            return false;
        }
        let over = |total: u32| total > 0 && co * 100 > total * CLUSTER_MIN_OVERLAP_PCT;
        over(self.entries(a)) || over(self.entries(b))
    }
}

/// Disjoint-set over indices of one signal group.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = x;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    /// Merge so that the root stays the lower index (the higher-scored wallet,
    /// since members are sorted by score).
    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        let (keep, drop) = if ra < rb { (ra, rb) } else { (rb, ra) };
        self.parent[drop] = keep;
    }
}

/// Outcome of reducing one (market, outcome) group of entry signals.
#[derive(Debug, Clone)]
pub struct GroupVerdict {
    pub kept: Vec<WalletSignal>,
    pub dropped: Vec<String>,
}

impl GroupVerdict {
    pub fn independent_count(&self) -> usize {
        self.kept.len()
    }
}

/// Collapse clustered wallets within a group; the highest-scored member of
/// each cluster survives.
pub fn cluster_group(group: Vec<WalletSignal>, tracker: &CoEntryTracker) -> GroupVerdict {
    // One signal per wallet; keep the larger move if a wallet appears twice.
    let mut by_wallet: HashMap<String, WalletSignal> = HashMap::new();
    for s in group {
        match by_wallet.get(&s.wallet) {
            Some(existing) if existing.value_delta >= s.value_delta => {}
            _ => {
                by_wallet.insert(s.wallet.clone(), s);
            }
        }
    }

    let mut members: Vec<WalletSignal> = by_wallet.into_values().collect();
    members.sort_by(|a, b| {
        b.wallet_score
            .cmp(&a.wallet_score)
            .then_with(|| a.wallet.cmp(&b.wallet))
    });

    let mut uf = UnionFind::new(members.len());
    for i in 0..members.len() {
        for j in i + 1..members.len() {
            if tracker.is_clustered(&members[i].wallet, &members[j].wallet) {
                uf.union(i, j);
            }
        }
    }

    let mut kept = Vec::new();
    let mut dropped = Vec::new();
    for (i, m) in members.into_iter().enumerate() {
        if uf.find(i) == i {
            kept.push(m);
        } else {
            dropped.push(m.wallet);
        }
    }

    GroupVerdict { kept, dropped }
}

/// Reduce one poll's wallet signals to actionable signals.
///
/// Exits are forwarded untouched. Entries are grouped by (market, outcome),
/// corrected for clustering, and emitted as consensus once the number of
/// independent wallets reaches `min_consensus`. New entries of this poll are
/// recorded in the tracker after the groups are judged.
pub fn reduce(
    signals: Vec<WalletSignal>,
    tracker: &mut CoEntryTracker,
    min_consensus: usize,
) -> Vec<Signal> {
    let mut out = Vec::new();
    let mut groups: BTreeMap<(String, String), Vec<WalletSignal>> = BTreeMap::new();

    for s in signals {
        if s.kind.is_exit() {
            out.push(Signal::Exit(s));
        } else {
            groups
                .entry((s.market_id.clone(), s.outcome.clone()))
                .or_default()
                .push(s);
        }
    }

    let mut new_entry_groups: Vec<Vec<String>> = Vec::new();

    for ((market_id, outcome), group) in groups {
        let mut fresh: Vec<String> = group
            .iter()
            .filter(|s| s.kind == SignalKind::NewEntry)
            .map(|s| s.wallet.clone())
            .collect();
        fresh.sort();
        fresh.dedup();

        let verdict = cluster_group(group, tracker);
        let count = verdict.independent_count();

        if !verdict.dropped.is_empty() {
            tracing::info!(
                market = %market_id,
                outcome = %outcome,
                dropped = ?verdict.dropped,
                independent = count,
                "Clustered wallets collapsed"
            );
        }

        if count >= min_consensus.max(1) {
            let wallets: Vec<String> = verdict.kept.iter().map(|s| s.wallet.clone()).collect();
            let representative = verdict.kept[0].clone();
            out.push(Signal::Consensus(ConsensusSignal {
                market_id,
                outcome,
                representative,
                wallets,
                dropped: verdict.dropped,
                independent_count: count,
            }));
        } else {
            tracing::debug!(
                market = %market_id,
                outcome = %outcome,
                independent = count,
                required = min_consensus,
                "Consensus not reached"
            );
        }

        if !fresh.is_empty() {
            new_entry_groups.push(fresh);
        }
    }

    for wallets in &new_entry_groups {
        tracker.record_group(wallets);
    }

    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
