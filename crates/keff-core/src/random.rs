// ─────────────────────────────────────────────────────────────────────
// SCPN Criticality — Random Streams
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Reproducible, seekable random streams.
//!
//! A 63-bit linear congruential generator with O(log n) skip-ahead
//! (Brown, "Random Number Generation with Arbitrary Strides", 1994).
//! Each named stream owns its own cursor so that setup sampling never
//! shifts the sequence seen by the tracking loop. The generator state is
//! an explicit value passed to every sampling call; there is no ambient
//! global state.

use rand::{RngCore, SeedableRng};

/// LCG multiplier, modulus 2^63.
const PRN_MULT: u64 = 2_806_196_910_506_780_709;
const PRN_ADD: u64 = 1;
const PRN_MASK: u64 = (1u64 << 63) - 1;
/// 2^-53: maps the top 53 state bits onto [0, 1).
const PRN_NORM: f64 = 1.0 / (1u64 << 53) as f64;

/// Draws reserved for one history before the next history's block starts.
pub const PRN_STRIDE: u64 = 152_917;

pub const N_STREAMS: usize = 3;

/// Named, independently addressable streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// Material construction and initial source sampling.
    Init = 0,
    /// Particle tracking, reseeded per history.
    Track = 1,
    /// Population control and everything else between generations.
    Other = 2,
}

impl Stream {
    pub const ALL: [Stream; N_STREAMS] = [Stream::Init, Stream::Track, Stream::Other];

    fn index(self) -> usize {
        self as usize
    }
}

/// Seed of the generator after `n` further draws from `seed`.
pub fn future_seed(n: u64, seed: u64) -> u64 {
    let mut g = PRN_MULT;
    let mut c = PRN_ADD;
    let mut g_new = 1u64;
    let mut c_new = 0u64;
    let mut n = n & PRN_MASK;
    while n > 0 {
        if n & 1 == 1 {
            g_new = g_new.wrapping_mul(g) & PRN_MASK;
            c_new = c_new.wrapping_mul(g).wrapping_add(c) & PRN_MASK;
        }
        c = g.wrapping_add(1).wrapping_mul(c) & PRN_MASK;
        g = g.wrapping_mul(g) & PRN_MASK;
        n >>= 1;
    }
    g_new.wrapping_mul(seed).wrapping_add(c_new) & PRN_MASK
}

/// Random-stream context: one global seed, one cursor per stream,
/// and an explicitly selected active stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomStreams {
    seed0: u64,
    seeds: [u64; N_STREAMS],
    active: Stream,
}

impl RandomStreams {
    /// Seed every stream from `seed`; the Init stream starts active.
    pub fn new(seed: u64) -> Self {
        let mut seeds = [0u64; N_STREAMS];
        for s in Stream::ALL {
            seeds[s.index()] = Self::base_of(seed, s);
        }
        RandomStreams {
            seed0: seed,
            seeds,
            active: Stream::Init,
        }
    }

    fn base_of(seed0: u64, stream: Stream) -> u64 {
        seed0.wrapping_add(stream.index() as u64) & PRN_MASK
    }

    pub fn select(&mut self, stream: Stream) {
        self.active = stream;
    }

    #[inline]
    fn step(&mut self) -> u64 {
        let i = self.active.index();
        self.seeds[i] = PRN_MULT.wrapping_mul(self.seeds[i]).wrapping_add(PRN_ADD) & PRN_MASK;
        self.seeds[i]
    }

    /// Uniform double on [0, 1) from the active stream.
    #[inline]
    pub fn prn(&mut self) -> f64 {
        (self.step() >> 10) as f64 * PRN_NORM
    }

    /// Uniform integer on [lo, hi). Returns `lo` for an empty range.
    pub fn rni(&mut self, lo: usize, hi: usize) -> usize {
        if hi <= lo {
            return lo;
        }
        let span = hi - lo;
        lo + ((self.prn() * span as f64) as usize).min(span - 1)
    }

    /// Skip `n` draws ahead on the active stream.
    pub fn advance(&mut self, n: u64) {
        let i = self.active.index();
        self.seeds[i] = future_seed(n, self.seeds[i]);
    }

    /// Position `stream` at the start of block `block` (block × stride
    /// draws past the stream's base seed), independent of its history.
    pub fn seek(&mut self, stream: Stream, block: u64) {
        let base = Self::base_of(self.seed0, stream);
        self.seeds[stream.index()] = future_seed(block.wrapping_mul(PRN_STRIDE), base);
    }

    /// Seek every stream to the block of history `id`.
    pub fn set_history(&mut self, id: u64) {
        for s in Stream::ALL {
            self.seek(s, id);
        }
    }

    /// Raw cursor of a stream, used to carry a history across ranks.
    pub fn state(&self, stream: Stream) -> u64 {
        self.seeds[stream.index()]
    }

    pub fn restore(&mut self, stream: Stream, state: u64) {
        self.seeds[stream.index()] = state & PRN_MASK;
    }
}

impl SeedableRng for RandomStreams {
    type Seed = [u8; 8];

    fn from_seed(seed: Self::Seed) -> Self {
        RandomStreams::new(u64::from_le_bytes(seed))
    }
}

impl RngCore for RandomStreams {
    #[inline]
    fn next_u32(&mut self) -> u32 {
        (self.step() >> 31) as u32
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        let hi = u64::from(self.next_u32());
        let lo = u64::from(self.next_u32());
        (hi << 32) | lo
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}
