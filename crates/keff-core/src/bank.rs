// ─────────────────────────────────────────────────────────────────────
// SCPN Criticality — Particle Bank
// © 1998–2026 Miroslav Šotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Growable particle container with explicit capacity accounting.

use crate::particle::Particle;
use keff_types::error::{KeffError, KeffResult};

/// Ordered collection of particle sites.
///
/// Appending to a full bank doubles its capacity. Reservation failure is
/// reported as `BankAllocation` rather than aborting the process.
#[derive(Debug, Clone, Default)]
pub struct Bank {
    sites: Vec<Particle>,
    capacity: usize,
}

fn reserve(sites: &mut Vec<Particle>, total: usize) -> KeffResult<()> {
    let extra = total.saturating_sub(sites.len());
    sites
        .try_reserve_exact(extra)
        .map_err(|_| KeffError::BankAllocation { requested: total })
}

impl Bank {
    pub fn new(capacity: usize) -> KeffResult<Self> {
        let mut sites = Vec::new();
        reserve(&mut sites, capacity)?;
        Ok(Bank { sites, capacity })
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Logical capacity; grows by doubling.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn append(&mut self, p: Particle) -> KeffResult<()> {
        if self.sites.len() >= self.capacity {
            let grown = self
                .capacity
                .checked_mul(2)
                .ok_or(KeffError::BankAllocation {
                    requested: usize::MAX,
                })?
                .max(1);
            reserve(&mut self.sites, grown)?;
            log::trace!("bank grown {} -> {} sites", self.capacity, grown);
            self.capacity = grown;
        }
        self.sites.push(p);
        Ok(())
    }

    pub fn extend<I: IntoIterator<Item = Particle>>(&mut self, sites: I) -> KeffResult<()> {
        for p in sites {
            self.append(p)?;
        }
        Ok(())
    }

    /// Empty the bank, keeping capacity.
    pub fn reset(&mut self) {
        self.sites.clear();
    }

    /// Empty the bank and give back its storage.
    pub fn release(&mut self) {
        self.sites = Vec::new();
        self.capacity = 0;
    }

    pub fn as_slice(&self) -> &[Particle] {
        &self.sites
    }

    pub fn as_mut_slice(&mut self) -> &mut [Particle] {
        &mut self.sites
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Particle> {
        self.sites.iter()
    }

    pub fn get(&self, i: usize) -> Option<&Particle> {
        self.sites.get(i)
    }

    /// Exchange contents with another bank.
    pub fn swap(&mut self, other: &mut Bank) {
        std::mem::swap(self, other);
    }
}

impl<'a> IntoIterator for &'a Bank {
    type Item = &'a Particle;
    type IntoIter = std::slice::Iter<'a, Particle>;

    fn into_iter(self) -> Self::IntoIter {
        self.sites.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decomposition::CartesianTopology;
    use crate::geometry::Geometry;
    use crate::random::RandomStreams;
    use keff_types::config::SimulationConfig;

    fn particle(rng: &mut RandomStreams) -> Particle {
        let cfg = SimulationConfig::default();
        let topo = CartesianTopology::new([1, 1, 1], 1).expect("topology");
        let g = Geometry::new(&cfg, &topo, 0);
        Particle::sample_source(&g, rng).expect("sample")
    }

    #[test]
    fn test_append_within_capacity() {
        let mut rng = RandomStreams::new(1);
        let mut bank = Bank::new(4).expect("bank");
        for _ in 0..4 {
            bank.append(particle(&mut rng)).expect("append");
        }
        assert_eq!(bank.len(), 4);
        assert_eq!(bank.capacity(), 4);
    }

    #[test]
    fn test_append_doubles_when_full() {
        let mut rng = RandomStreams::new(1);
        let mut bank = Bank::new(3).expect("bank");
        let p = particle(&mut rng);
        for _ in 0..4 {
            bank.append(p).expect("append");
        }
        assert_eq!(bank.capacity(), 6);
        assert_eq!(bank.len(), 4);
        assert_eq!(bank.get(3), Some(&p));
    }

    #[test]
    fn test_zero_capacity_grows_to_one() {
        let mut rng = RandomStreams::new(1);
        let mut bank = Bank::new(0).expect("bank");
        bank.append(particle(&mut rng)).expect("append");
        assert_eq!(bank.capacity(), 1);
    }

    #[test]
    fn test_reset_keeps_capacity_release_drops_it() {
        let mut rng = RandomStreams::new(1);
        let mut bank = Bank::new(2).expect("bank");
        bank.append(particle(&mut rng)).expect("append");
        bank.reset();
        assert!(bank.is_empty());
        assert_eq!(bank.capacity(), 2);
        bank.release();
        assert_eq!(bank.capacity(), 0);
    }

    #[test]
    fn test_huge_allocation_is_reported() {
        match Bank::new(usize::MAX / 2) {
            Err(KeffError::BankAllocation { requested }) => assert_eq!(requested, usize::MAX / 2),
            other => panic!("Unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_swap_exchanges_sites_and_capacity() {
        let mut rng = RandomStreams::new(5);
        let mut full = Bank::new(2).expect("bank");
        full.append(particle(&mut rng)).expect("append");
        full.append(particle(&mut rng)).expect("append");
        let first = full.get(0).copied();
        let mut empty = Bank::new(8).expect("bank");

        full.swap(&mut empty);
        assert!(full.is_empty());
        assert!(full.capacity() >= 8);
        assert_eq!(empty.len(), 2);
        assert_eq!(empty.get(0).copied(), first);
    }
}
