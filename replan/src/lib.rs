/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Replan – datacenter reconfiguration planner.
//!
//! Given where VMs run today and the state every element should reach, the
//! planner builds one transition per element inside a constraint model,
//! solves it, and decodes the solution into timestamped actions.
//!
//! ```text
//! lib.rs
//! ├── model.rs       – VM/node identifiers, states, mapping, attributes
//! ├── duration/      – action duration estimators
//! ├── solver/        – constraint contract + finite-domain engine
//! ├── transition/    – slices, VM and node transitions, builder factory
//! ├── plan/          – actions and reconfiguration plans
//! ├── scheduler/     – problem construction, solving, plan assembly, errors
//! └── config/        – YAML parameters and scenario files
//! ```
//!
//! # Example
//! ```rust,ignore
//! let scenario = Scenario::load_from_file(path)?;
//! let plan = ProblemBuilder::new(&scenario.infrastructure)
//!     .with_targets(scenario.targets.clone())
//!     .build()?
//!     .solve()?;
//! ```

pub mod config;
pub mod duration;
pub mod model;
pub mod plan;
pub mod scheduler;
pub mod solver;
pub mod transition;
