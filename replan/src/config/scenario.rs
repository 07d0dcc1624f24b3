/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Scenario files: the infrastructure snapshot plus what to change.
//!
//! ```yaml
//! nodes:
//!   - { id: 0, state: online }
//!   - { id: 1, state: offline, target: online, attributes: { boot: 5 } }
//! vms:
//!   - id: 1
//!     state: running
//!     host: 0
//!     attributes: { clone: true, template: small, migrate: 20 }
//!   - { id: 2, state: ready, target: running }
//!   - { id: 3, state: init, target: ready, attributes: { template: small } }
//!   - { id: 4, state: sleeping, host: 0, manageable: false }
//! network:
//!   default_bandwidth: 1000
//!   vm_bandwidth: { 1: 500 }
//! vm_id_limit: 64
//! ```
//!
//! Nodes are declared before VMs are placed, so a running or sleeping VM
//! must name an online host.  A VM in state `init` is not part of the
//! mapping; it only needs a `target`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::model::{AttrValue, Infrastructure, NetworkView, Node, NodeState, Vm, VmState};
use crate::scheduler::TargetStates;

// ── Private YAML deserialization types ────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScenarioFile {
    #[serde(default)]
    nodes: Vec<NodeEntry>,
    #[serde(default)]
    vms: Vec<VmEntry>,
    network: Option<NetworkView>,
    vm_id_limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NodeEntry {
    id: u32,
    state: NodeState,
    target: Option<NodeState>,
    #[serde(default)]
    attributes: BTreeMap<String, AttrValue>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VmEntry {
    id: u32,
    state: VmState,
    host: Option<u32>,
    target: Option<VmState>,
    #[serde(default = "default_manageable")]
    manageable: bool,
    #[serde(default)]
    attributes: BTreeMap<String, AttrValue>,
}

fn default_manageable() -> bool {
    true
}

// ── Scenario ──────────────────────────────────────────────────────────────────

/// Everything a planning run needs besides its parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scenario {
    pub infrastructure: Infrastructure,
    pub targets: TargetStates,
    pub unmanageable: BTreeSet<Vm>,
}

impl Scenario {
    /// Parse `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid YAML, or
    /// describes an impossible mapping (duplicate identifiers, a placed VM
    /// without an online host, a VM that is already killed).
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading scenario from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open scenario file: {}", path.display()))?;
        let scenario = Self::from_yaml(&content)
            .with_context(|| format!("Invalid scenario file: {}", path.display()))?;

        let mapping = &scenario.infrastructure.mapping;
        info!(
            online = mapping.online_nodes().count(),
            offline = mapping.offline_nodes().count(),
            vms = mapping.all_vms().len(),
            targets = scenario.targets.vms.len() + scenario.targets.nodes.len(),
            unmanageable = scenario.unmanageable.len(),
            "Scenario loaded"
        );
        Ok(scenario)
    }

    /// Parse a YAML document.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let file: ScenarioFile = serde_yaml::from_str(content).context("Failed to parse YAML")?;
        let mut s = Scenario::default();
        let infra = &mut s.infrastructure;
        infra.network = file.network;
        infra.vm_id_limit = file.vm_id_limit;

        let mut seen = BTreeSet::new();
        for entry in file.nodes {
            let n = Node(entry.id);
            if !seen.insert(n) {
                bail!("{n} is declared twice");
            }
            match entry.state {
                NodeState::Online => infra.mapping.add_online_node(n),
                NodeState::Offline => {
                    infra.mapping.add_offline_node(n);
                }
            }
            if let Some(target) = entry.target {
                s.targets.nodes.insert(n, target);
            }
            for (key, value) in entry.attributes {
                infra.attributes.put(n, key, value);
            }
            debug!(node = %n, state = %entry.state, "node declared");
        }

        let mut seen = BTreeSet::new();
        for entry in file.vms {
            let vm = Vm(entry.id);
            if !seen.insert(vm) {
                bail!("{vm} is declared twice");
            }
            let host = entry.host.map(Node);
            let placed = match (entry.state, host) {
                (VmState::Init, None) => true,
                (VmState::Ready, None) => {
                    infra.mapping.add_ready_vm(vm);
                    true
                }
                (VmState::Running, Some(n)) => infra.mapping.add_running_vm(vm, n),
                (VmState::Sleeping, Some(n)) => infra.mapping.add_sleeping_vm(vm, n),
                (VmState::Running | VmState::Sleeping, None) => {
                    bail!("{vm} is {} but has no host", entry.state)
                }
                (VmState::Init | VmState::Ready, Some(n)) => {
                    bail!("{vm} is {} and cannot be placed on {n}", entry.state)
                }
                (VmState::Killed, _) => bail!("{vm} is already killed"),
            };
            if !placed {
                bail!("{vm} is placed on a node that is not online");
            }
            if let Some(target) = entry.target {
                s.targets.vms.insert(vm, target);
            } else if entry.state == VmState::Init {
                bail!("{vm} does not exist yet and has no target state");
            }
            if !entry.manageable {
                s.unmanageable.insert(vm);
            }
            for (key, value) in entry.attributes {
                infra.attributes.put(vm, key, value);
            }
            debug!(vm = %vm, state = %entry.state, host = ?host, "VM declared");
        }

        Ok(s)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
