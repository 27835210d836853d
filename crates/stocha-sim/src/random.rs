//! Random sources and the distribution samplers layered on top.

use rand::RngCore;

/// An integer generator producing values uniformly in the closed range
/// `[min, max]`. Everything the simulator draws is derived from this
/// through [`standard_uniform`].
pub trait RandomSource {
    fn min(&self) -> u64;
    fn max(&self) -> u64;
    fn next(&mut self) -> u64;
}

/// Adapter making any [`rand`] generator usable as a [`RandomSource`].
#[derive(Debug)]
pub struct EngineSource<R> {
    rng: R,
}

impl<R: RngCore> EngineSource<R> {
    pub fn new(rng: R) -> EngineSource<R> {
        EngineSource { rng }
    }
}

impl<R: RngCore> RandomSource for EngineSource<R> {
    fn min(&self) -> u64 {
        0
    }

    fn max(&self) -> u64 {
        u64::MAX
    }

    fn next(&mut self) -> u64 {
        self.rng.next_u64()
    }
}

/// A draw from `[0, 1)`: linear rescale of the source's closed range.
pub fn standard_uniform<R: RandomSource + ?Sized>(rng: &mut R) -> f64 {
    let min = rng.min();
    let span = (rng.max() - min) as f64 + 1.0;
    (rng.next() - min) as f64 / span
}

/// `Exponential(rate)` by inversion; `1 - U` keeps the argument of `ln`
/// strictly positive.
pub fn exponential<R: RandomSource + ?Sized>(rng: &mut R, rate: f64) -> f64 {
    -(1.0 - standard_uniform(rng)).ln() / rate
}

/// `Weibull(scale, shape)` by inversion of the CDF.
pub fn weibull<R: RandomSource + ?Sized>(rng: &mut R, scale: f64, shape: f64) -> f64 {
    scale * (-(1.0 - standard_uniform(rng)).ln()).powf(1.0 / shape)
}

/// `Lognormal(scale, shape)` where `scale` is the median (`e^mu`) and
/// `shape` the log standard deviation; the underlying normal draw uses
/// Box-Muller.
pub fn lognormal<R: RandomSource + ?Sized>(rng: &mut R, scale: f64, shape: f64) -> f64 {
    let u1 = 1.0 - standard_uniform(rng);
    let u2 = standard_uniform(rng);
    let normal = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    scale * (shape * normal).exp()
}

/// `Uniform(low, high)` over the half-open interval `[low, high)`.
pub fn uniform<R: RandomSource + ?Sized>(rng: &mut R, low: f64, high: f64) -> f64 {
    low + standard_uniform(rng) * (high - low)
}

/// Replays a fixed draw sequence over the closed range `[0, max]`;
/// panics when the sequence runs dry, so tests also assert how much
/// randomness is consumed.
#[cfg(test)]
pub(crate) struct FakeSource {
    max: u64,
    draws: Vec<u64>,
    pub(crate) cursor: usize,
}

#[cfg(test)]
impl FakeSource {
    pub(crate) fn new(max: u64, draws: Vec<u64>) -> FakeSource {
        FakeSource {
            max,
            draws,
            cursor: 0,
        }
    }
}

#[cfg(test)]
impl RandomSource for FakeSource {
    fn min(&self) -> u64 {
        0
    }

    fn max(&self) -> u64 {
        self.max
    }

    fn next(&mut self) -> u64 {
        let draw = self.draws[self.cursor];
        self.cursor += 1;
        draw
    }
}
