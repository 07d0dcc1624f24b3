/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Read-only snapshot of the infrastructure being reconfigured.
//!
//! Three pieces of data feed the planner:
//!
//! ```text
//! Mapping     ── where every VM sits today, which nodes are powered
//! Attributes  ── per-element key/values (template, clone, boot, migrate…)
//! NetworkView ── optional bandwidth estimates for live migrations
//! ```
//!
//! # Ownership model
//! An [`Infrastructure`] is built once (usually from a scenario file, see
//! [`crate::config::Scenario`]) and then only borrowed by the planner.  The
//! transitions never mutate it.  Identifiers for cloned VMs come from a
//! [`VmIdPool`] that is handed out by value for each plan assembly.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

// ── Element identifiers ───────────────────────────────────────────────────────

/// Opaque virtual machine identifier, unique within a planning session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Vm(pub u32);

impl fmt::Display for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vm#{}", self.0)
    }
}

/// Opaque physical node identifier, unique within a planning session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Node(pub u32);

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Either kind of element.  Used as the key for attributes and duration
/// estimates, which apply to VMs and nodes alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Element {
    Vm(Vm),
    Node(Node),
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Vm(v) => v.fmt(f),
            Element::Node(n) => n.fmt(f),
        }
    }
}

impl From<Vm> for Element {
    fn from(v: Vm) -> Self {
        Element::Vm(v)
    }
}

impl From<Node> for Element {
    fn from(n: Node) -> Self {
        Element::Node(n)
    }
}

// ── States ────────────────────────────────────────────────────────────────────

/// Lifecycle state of a VM.
///
/// `Init` is the state of a VM that does not exist yet in the mapping (it
/// must be forged from a template before it can be booted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmState {
    Init,
    Ready,
    Running,
    Sleeping,
    Killed,
}

impl fmt::Display for VmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VmState::Init => "init",
            VmState::Ready => "ready",
            VmState::Running => "running",
            VmState::Sleeping => "sleeping",
            VmState::Killed => "killed",
        };
        f.write_str(s)
    }
}

/// Power state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Online,
    Offline,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeState::Online => f.write_str("online"),
            NodeState::Offline => f.write_str("offline"),
        }
    }
}

// ── Mapping ───────────────────────────────────────────────────────────────────

/// Current placement of VMs on nodes.
///
/// Every collection is a `BTree*` so iteration is ordered by identifier,
/// which keeps element indexing (and therefore the whole plan) deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping {
    online: BTreeSet<Node>,
    offline: BTreeSet<Node>,
    running: BTreeMap<Vm, Node>,
    sleeping: BTreeMap<Vm, Node>,
    ready: BTreeSet<Vm>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `n` online.  Always succeeds.
    pub fn add_online_node(&mut self, n: Node) {
        self.offline.remove(&n);
        self.online.insert(n);
    }

    /// Declare `n` offline.
    ///
    /// Returns `false` (and changes nothing) if the node still hosts running
    /// or sleeping VMs.
    pub fn add_offline_node(&mut self, n: Node) -> bool {
        if self.vms_on(n).next().is_some() {
            return false;
        }
        self.online.remove(&n);
        self.offline.insert(n);
        true
    }

    /// Place `vm` in the running state on `n`.  `n` must be online.
    pub fn add_running_vm(&mut self, vm: Vm, n: Node) -> bool {
        if !self.online.contains(&n) {
            return false;
        }
        self.forget_vm(vm);
        self.running.insert(vm, n);
        true
    }

    /// Place `vm` in the sleeping state on `n`.  `n` must be online.
    pub fn add_sleeping_vm(&mut self, vm: Vm, n: Node) -> bool {
        if !self.online.contains(&n) {
            return false;
        }
        self.forget_vm(vm);
        self.sleeping.insert(vm, n);
        true
    }

    /// Declare `vm` ready (known but not placed anywhere).
    pub fn add_ready_vm(&mut self, vm: Vm) {
        self.forget_vm(vm);
        self.ready.insert(vm);
    }

    fn forget_vm(&mut self, vm: Vm) {
        self.running.remove(&vm);
        self.sleeping.remove(&vm);
        self.ready.remove(&vm);
    }

    /// Current state of `vm`.  A VM unknown to the mapping is in `Init`.
    pub fn vm_state(&self, vm: Vm) -> VmState {
        if self.running.contains_key(&vm) {
            VmState::Running
        } else if self.sleeping.contains_key(&vm) {
            VmState::Sleeping
        } else if self.ready.contains(&vm) {
            VmState::Ready
        } else {
            VmState::Init
        }
    }

    /// Node hosting `vm` (running or sleeping), if any.
    pub fn vm_location(&self, vm: Vm) -> Option<Node> {
        self.running
            .get(&vm)
            .or_else(|| self.sleeping.get(&vm))
            .copied()
    }

    /// Current state of `n`, or `None` if the node is unknown.
    pub fn node_state(&self, n: Node) -> Option<NodeState> {
        if self.online.contains(&n) {
            Some(NodeState::Online)
        } else if self.offline.contains(&n) {
            Some(NodeState::Offline)
        } else {
            None
        }
    }

    pub fn online_nodes(&self) -> impl Iterator<Item = Node> + '_ {
        self.online.iter().copied()
    }

    pub fn offline_nodes(&self) -> impl Iterator<Item = Node> + '_ {
        self.offline.iter().copied()
    }

    pub fn running_vms(&self) -> impl Iterator<Item = Vm> + '_ {
        self.running.keys().copied()
    }

    pub fn sleeping_vms(&self) -> impl Iterator<Item = Vm> + '_ {
        self.sleeping.keys().copied()
    }

    pub fn ready_vms(&self) -> impl Iterator<Item = Vm> + '_ {
        self.ready.iter().copied()
    }

    /// Every VM the mapping knows about, ordered by identifier.
    pub fn all_vms(&self) -> BTreeSet<Vm> {
        self.running
            .keys()
            .chain(self.sleeping.keys())
            .chain(self.ready.iter())
            .copied()
            .collect()
    }

    /// Running and sleeping VMs placed on `n`.
    pub fn vms_on(&self, n: Node) -> impl Iterator<Item = Vm> + '_ {
        self.running
            .iter()
            .chain(self.sleeping.iter())
            .filter(move |(_, host)| **host == n)
            .map(|(vm, _)| *vm)
    }
}

// ── Attributes ────────────────────────────────────────────────────────────────

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(b) => b.fmt(f),
            AttrValue::Int(i) => i.fmt(f),
            AttrValue::Str(s) => f.write_str(s),
        }
    }
}

/// Per-element key/value store (`template`, `clone`, `postCopy`, duration
/// overrides such as `boot` or `migrate`, …).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    values: BTreeMap<Element, BTreeMap<String, AttrValue>>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` on `e`, returning the previous value if any.
    pub fn put(
        &mut self,
        e: impl Into<Element>,
        key: impl Into<String>,
        value: AttrValue,
    ) -> Option<AttrValue> {
        self.values
            .entry(e.into())
            .or_default()
            .insert(key.into(), value)
    }

    pub fn get(&self, e: impl Into<Element>, key: &str) -> Option<&AttrValue> {
        self.values.get(&e.into()).and_then(|m| m.get(key))
    }

    pub fn is_set(&self, e: impl Into<Element>, key: &str) -> bool {
        self.get(e, key).is_some()
    }

    /// Boolean attribute, or `default` when unset or of another type.
    pub fn get_bool(&self, e: impl Into<Element>, key: &str, default: bool) -> bool {
        match self.get(e, key) {
            Some(AttrValue::Bool(b)) => *b,
            _ => default,
        }
    }

    /// Integer attribute, or `None` when unset or of another type.
    pub fn get_int(&self, e: impl Into<Element>, key: &str) -> Option<i64> {
        match self.get(e, key) {
            Some(AttrValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    /// String attribute, or `None` when unset or of another type.
    pub fn get_str(&self, e: impl Into<Element>, key: &str) -> Option<&str> {
        match self.get(e, key) {
            Some(AttrValue::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }
}

// ── Network view ──────────────────────────────────────────────────────────────

/// Optional networking view.
///
/// When attached, every live migration is planned with an explicit bandwidth
/// (Mb/s) which is carried into the resulting `MigrateVm` action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkView {
    /// Bandwidth used for any VM without an explicit override.
    pub default_bandwidth: i64,

    /// Per-VM bandwidth overrides.
    #[serde(default)]
    pub vm_bandwidth: BTreeMap<Vm, i64>,
}

impl NetworkView {
    pub fn new(default_bandwidth: i64) -> Self {
        Self {
            default_bandwidth,
            vm_bandwidth: BTreeMap::new(),
        }
    }

    pub fn bandwidth_for(&self, vm: Vm) -> i64 {
        self.vm_bandwidth
            .get(&vm)
            .copied()
            .unwrap_or(self.default_bandwidth)
    }
}

// ── Infrastructure ────────────────────────────────────────────────────────────

/// Snapshot of the infrastructure the planner starts from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Infrastructure {
    pub mapping: Mapping,
    pub attributes: Attributes,
    pub network: Option<NetworkView>,

    /// Exclusive upper bound for VM identifiers.  Cloning a VM during a
    /// re-instantiation fails once the pool reaches it.  `None` = unbounded.
    pub vm_id_limit: Option<u32>,
}

impl Infrastructure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier pool for VMs created while assembling a plan.
    ///
    /// The pool starts right after the highest identifier known to the
    /// mapping, so two pools obtained from the same snapshot hand out the
    /// same sequence.
    pub fn vm_id_pool(&self) -> VmIdPool {
        let next = self
            .mapping
            .all_vms()
            .iter()
            .map(|v| v.0.saturating_add(1))
            .max()
            .unwrap_or(0);
        VmIdPool {
            next,
            limit: self.vm_id_limit.unwrap_or(u32::MAX),
        }
    }
}

/// Allocator of fresh VM identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmIdPool {
    next: u32,
    limit: u32,
}

impl VmIdPool {
    /// Next free identifier, or `None` once the pool is exhausted.
    pub fn allocate(&mut self) -> Option<Vm> {
        if self.next >= self.limit {
            return None;
        }
        let vm = Vm(self.next);
        self.next += 1;
        Some(vm)
    }

    /// Never hand out `vm` or anything below it.
    pub fn reserve(&mut self, vm: Vm) {
        self.next = self.next.max(vm.0.saturating_add(1));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Mapping ───────────────────────────────────────────────────────────────

    #[test]
    fn running_vm_requires_online_host() {
        let mut m = Mapping::new();
        m.add_offline_node(Node(0));
        assert!(!m.add_running_vm(Vm(1), Node(0)));
        m.add_online_node(Node(0));
        assert!(m.add_running_vm(Vm(1), Node(0)));
        assert_eq!(m.vm_state(Vm(1)), VmState::Running);
        assert_eq!(m.vm_location(Vm(1)), Some(Node(0)));
    }

    #[test]
    fn node_hosting_vms_cannot_go_offline() {
        let mut m = Mapping::new();
        m.add_online_node(Node(0));
        m.add_sleeping_vm(Vm(3), Node(0));
        assert!(!m.add_offline_node(Node(0)));
        assert_eq!(m.node_state(Node(0)), Some(NodeState::Online));
    }

    #[test]
    fn unknown_vm_is_in_init_state() {
        let m = Mapping::new();
        assert_eq!(m.vm_state(Vm(42)), VmState::Init);
        assert_eq!(m.vm_location(Vm(42)), None);
        assert_eq!(m.node_state(Node(42)), None);
    }

    #[test]
    fn changing_vm_state_replaces_previous_placement() {
        let mut m = Mapping::new();
        m.add_online_node(Node(0));
        m.add_running_vm(Vm(1), Node(0));
        m.add_ready_vm(Vm(1));
        assert_eq!(m.vm_state(Vm(1)), VmState::Ready);
        assert_eq!(m.vm_location(Vm(1)), None);
        assert_eq!(m.vms_on(Node(0)).count(), 0);
    }

    // ── Attributes ────────────────────────────────────────────────────────────

    #[test]
    fn typed_attribute_getters_ignore_other_types() {
        let mut a = Attributes::new();
        a.put(Vm(1), "clone", AttrValue::Bool(true));
        a.put(Vm(1), "template", AttrValue::Str("small".into()));
        a.put(Node(0), "boot", AttrValue::Int(7));

        assert!(a.get_bool(Vm(1), "clone", false));
        assert!(!a.get_bool(Vm(1), "template", false));
        assert_eq!(a.get_str(Vm(1), "template"), Some("small"));
        assert_eq!(a.get_int(Node(0), "boot"), Some(7));
        assert_eq!(a.get_int(Vm(0), "boot"), None);
        assert!(a.is_set(Vm(1), "template"));
    }

    // ── VmIdPool ──────────────────────────────────────────────────────────────

    #[test]
    fn pool_starts_after_highest_known_vm() {
        let mut infra = Infrastructure::new();
        infra.mapping.add_online_node(Node(0));
        infra.mapping.add_running_vm(Vm(4), Node(0));
        infra.mapping.add_ready_vm(Vm(1));

        let mut pool = infra.vm_id_pool();
        assert_eq!(pool.allocate(), Some(Vm(5)));
        assert_eq!(pool.allocate(), Some(Vm(6)));

        // a fresh pool replays the same sequence
        assert_eq!(infra.vm_id_pool().allocate(), Some(Vm(5)));
    }

    #[test]
    fn pool_is_exhausted_at_limit() {
        let mut infra = Infrastructure::new();
        infra.mapping.add_ready_vm(Vm(0));
        infra.vm_id_limit = Some(2);

        let mut pool = infra.vm_id_pool();
        assert_eq!(pool.allocate(), Some(Vm(1)));
        assert_eq!(pool.allocate(), None);
    }

    #[test]
    fn network_view_uses_override_then_default() {
        let mut net = NetworkView::new(1_000);
        net.vm_bandwidth.insert(Vm(2), 250);
        assert_eq!(net.bandwidth_for(Vm(2)), 250);
        assert_eq!(net.bandwidth_for(Vm(3)), 1_000);
    }
}
