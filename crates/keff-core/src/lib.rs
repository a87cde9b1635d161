// ─────────────────────────────────────────────────────────────────────
// SCPN Criticality — Core
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Distributed Monte Carlo k-eigenvalue transport.
//!
//! Leaves: random streams, decomposition, geometry, particles, banks,
//! material, tally, communicator.
//! Engine: source, transport, eigenvalue iteration, driver, output.

pub mod bank;
pub mod comm;
pub mod decomposition;
pub mod driver;
pub mod eigenvalue;
pub mod geometry;
pub mod material;
pub mod output;
pub mod particle;
pub mod random;
pub mod runtime;
pub mod source;
pub mod tally;
pub mod transport;

pub use driver::{run_local, run_rank, RunSummary};
pub use eigenvalue::{BatchObserver, BatchReport};
