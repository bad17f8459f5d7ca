// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Keep kustomization resource lists in sync with the directory tree.
//!
//! Every directory below a base directory gets a `kustomization.yaml` whose
//! `resources` list names the YAML files and subdirectories next to it. Remote
//! resources already declared in the list are kept. Everything else in the
//! manifest is left exactly as it was written.
//!
//! # Skipping Things
//!
//! Entries matched by a `.gitignore` rule of their directory, or of any
//! ancestor up to the base directory, never end up in a resource list. User
//! supplied skip patterns offer finer control, see [`walk::skip`] for their
//! syntax.

pub mod config;
pub mod manifest;
pub mod path;
pub mod reconcile;
pub mod report;
pub mod walk;

pub use config::{KarmaConfig, Options, ResourceGroup, ResourceOrder};
pub use manifest::Manifest;
pub use reconcile::Reconciliation;
pub use report::{EventLog, Reporter, Stats, TracingReporter};
pub use walk::{run, CancelToken, Walker};
