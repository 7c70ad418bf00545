//! Probe and gallery sampling.
//!
//! The probe and gallery draws are independent, so a template may land in
//! both sets. Each draw is uniform without replacement.

use crate::trace::trace_event;
use crate::util::{FpMatchError, FpMatchResult};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Probe and gallery subsets drawn from one template population.
#[derive(Clone, Debug)]
pub struct Sample<T> {
    /// Items matched against the gallery.
    pub probes: Vec<T>,
    /// Items every probe is scored against.
    pub gallery: Vec<T>,
}

/// Random subset drawer.
#[derive(Clone, Debug)]
pub struct Sampler {
    rng: StdRng,
}

impl Sampler {
    /// Creates a sampler seeded from the operating system.
    pub fn from_os_rng() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Creates a reproducible sampler.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Draws `floor(fraction * items.len())` distinct elements.
    pub fn draw<T: Clone>(
        &mut self,
        items: &[T],
        fraction: f64,
        name: &'static str,
    ) -> FpMatchResult<Vec<T>> {
        let amount = sample_size(items.len(), fraction, name)?;
        let picked = rand::seq::index::sample(&mut self.rng, items.len(), amount);
        Ok(picked.into_iter().map(|idx| items[idx].clone()).collect())
    }

    /// Draws independent probe and gallery sets.
    pub fn sample<T: Clone>(
        &mut self,
        items: &[T],
        probe_fraction: f64,
        gallery_fraction: f64,
    ) -> FpMatchResult<Sample<T>> {
        // validate both before drawing so a bad gallery fraction consumes no randomness
        sample_size(items.len(), probe_fraction, "probe")?;
        sample_size(items.len(), gallery_fraction, "gallery")?;

        let probes = self.draw(items, probe_fraction, "probe")?;
        let gallery = self.draw(items, gallery_fraction, "gallery")?;
        trace_event!(
            "sampled",
            population = items.len(),
            probes = probes.len(),
            gallery = gallery.len()
        );
        Ok(Sample { probes, gallery })
    }
}

/// Returns `floor(fraction * n)`, rejecting fractions outside `[0, 1]`.
pub fn sample_size(n: usize, fraction: f64, name: &'static str) -> FpMatchResult<usize> {
    if !(0.0..=1.0).contains(&fraction) {
        return Err(FpMatchError::InvalidFraction {
            name,
            value: fraction,
        });
    }
    Ok(((fraction * n as f64).floor() as usize).min(n))
}
