//! Self-organizing color quantizer.
//!
//! A 256-neuron network trained by leaky competitive learning over a stream
//! of RGB samples (Dekker's NeuQuant, 1994). After training, the network is
//! sorted by green channel and answers nearest-color queries through a
//! two-direction search seeded from a per-green-value index table.

extern crate alloc;
use alloc::vec;
use alloc::vec::Vec;

const NETSIZE: usize = 256;
const MAXNETPOS: usize = NETSIZE - 1;

/// Learning cycles per training run; alpha and radius decay once per cycle.
const NCYCLES: usize = 100;

// Channel values train left-shifted by NETBIASSHIFT; freq and bias live in
// INTBIASSHIFT fixed-point.
const NETBIASSHIFT: i32 = 4;
const INTBIASSHIFT: i32 = 16;
const INTBIAS: i32 = 1 << INTBIASSHIFT;
const GAMMASHIFT: i32 = 10;
const BETASHIFT: i32 = 10;
const BETA: i32 = INTBIAS >> BETASHIFT;
const BETAGAMMA: i32 = INTBIAS << (GAMMASHIFT - BETASHIFT);

// Neighbourhood radius starts at netsize/8 biased by 6 bits and decays by a
// factor of 1/30 per cycle.
const INITRAD: i32 = (NETSIZE >> 3) as i32;
const RADIUSBIASSHIFT: i32 = 6;
const RADIUSBIAS: i32 = 1 << RADIUSBIASSHIFT;
const INITRADIUS: i32 = INITRAD * RADIUSBIAS;
const RADIUSDEC: i32 = 30;

// Alpha starts at 1.0 in ALPHABIASSHIFT fixed-point.
const ALPHABIASSHIFT: i32 = 10;
const INITALPHA: i32 = 1 << ALPHABIASSHIFT;

const RADBIASSHIFT: i32 = 8;
const RADBIAS: i32 = 1 << RADBIASSHIFT;
const ALPHARADBSHIFT: i32 = ALPHABIASSHIFT + RADBIASSHIFT;
const ALPHARADBIAS: i32 = 1 << ALPHARADBSHIFT;

// Four primes near 500. Sampling strides by the first one that does not
// divide the buffer length, so successive samples sweep the whole buffer
// without periodic aliasing.
const PRIME1: usize = 499;
const PRIME2: usize = 491;
const PRIME3: usize = 487;
const PRIME4: usize = 503;

/// Below this many sample bytes the sampling factor collapses to 1.
const MIN_PICTURE_BYTES: usize = 3 * PRIME4;

/// One network unit: channel intensities in sample-byte order, plus the
/// pre-sort position tag that survives the green sort.
#[derive(Debug, Clone, Copy)]
struct Neuron {
    r: f64,
    g: f64,
    b: f64,
    tag: usize,
}

/// Trained 256-color network with a green-channel search index.
///
/// [`NeuQuant::train`] runs the whole learning pipeline, so every instance
/// you can hold is fully trained; `lookup` and `palette` never mutate and
/// may be shared freely afterwards.
#[derive(Debug, Clone)]
pub struct NeuQuant {
    network: Vec<Neuron>,
    /// Green value -> first sorted-network position with green >= value.
    netindex: [usize; 256],
    bias: Vec<i32>,
    freq: Vec<i32>,
    radpower: [i32; NETSIZE >> 3],
    sample_fac: u32,
}

impl NeuQuant {
    /// Train a network on a flat R,G,B sample buffer.
    ///
    /// `sample_fac` ranges 1..=30; lower samples more pixels per run. Short
    /// buffers are always sampled at factor 1.
    pub fn train(samples: &[u8], sample_fac: u32) -> Self {
        let network = (0..NETSIZE)
            .map(|i| {
                // linear gray ramp, pre-biased
                let v = ((i << (NETBIASSHIFT + 8)) / NETSIZE) as f64;
                Neuron {
                    r: v,
                    g: v,
                    b: v,
                    tag: 0,
                }
            })
            .collect();

        let mut quant = Self {
            network,
            netindex: [0; 256],
            bias: vec![0; NETSIZE],
            freq: vec![INTBIAS / NETSIZE as i32; NETSIZE],
            radpower: [0; NETSIZE >> 3],
            sample_fac,
        };

        quant.learn(samples);
        quant.unbias();
        quant.build_index();
        quant
    }

    /// Nearest palette index for an RGB triple.
    ///
    /// Walks outward from `netindex[g]` in both directions of the
    /// green-sorted network; a direction is dropped as soon as its green
    /// distance alone exceeds the best total distance seen, which the sort
    /// makes a valid bound.
    pub fn lookup(&self, r: u8, g: u8, b: u8) -> u8 {
        let r = i32::from(r);
        let g = i32::from(g);
        let b = i32::from(b);

        let mut best_dist = 1000;
        let mut best = 0usize;

        let mut i = self.netindex[g as usize] as i32;
        let mut j = i - 1;

        while i < NETSIZE as i32 || j >= 0 {
            if i < NETSIZE as i32 {
                let n = self.network[i as usize];
                let mut dist = n.g as i32 - g;
                if dist >= best_dist {
                    i = NETSIZE as i32;
                } else {
                    i += 1;
                    dist = dist.abs() + (n.r as i32 - r).abs();
                    if dist < best_dist {
                        dist += (n.b as i32 - b).abs();
                        if dist < best_dist {
                            best_dist = dist;
                            best = n.tag;
                        }
                    }
                }
            }

            if j >= 0 {
                let n = self.network[j as usize];
                let mut dist = g - n.g as i32;
                if dist >= best_dist {
                    j = -1;
                } else {
                    j -= 1;
                    dist = dist.abs() + (n.r as i32 - r).abs();
                    if dist < best_dist {
                        dist += (n.b as i32 - b).abs();
                        if dist < best_dist {
                            best_dist = dist;
                            best = n.tag;
                        }
                    }
                }
            }
        }

        best as u8
    }

    /// Flattened 768-byte R,G,B palette in lookup-index order.
    pub fn palette(&self) -> [u8; 768] {
        let mut position = [0usize; NETSIZE];
        for (i, n) in self.network.iter().enumerate() {
            position[n.tag] = i;
        }

        let mut map = [0u8; 768];
        for (index, entry) in map.chunks_exact_mut(3).enumerate() {
            let n = self.network[position[index]];
            entry[0] = n.r as u8;
            entry[1] = n.g as u8;
            entry[2] = n.b as u8;
        }
        map
    }

    fn learn(&mut self, samples: &[u8]) {
        let len = samples.len();
        if len < MIN_PICTURE_BYTES {
            self.sample_fac = 1;
        }

        let alphadec = 30.0 + (self.sample_fac - 1) as f64 / 3.0;
        let sample_pixels = len / (3 * self.sample_fac as usize);
        let delta = (sample_pixels / NCYCLES).max(1);

        let mut alpha = f64::from(INITALPHA);
        let mut radius = f64::from(INITRADIUS);
        let mut rad = radius as i32 >> RADIUSBIASSHIFT;
        if rad <= 1 {
            rad = 0;
        }
        self.fill_radpower(rad, alpha);

        let step = if len < MIN_PICTURE_BYTES {
            3
        } else if len % PRIME1 != 0 {
            3 * PRIME1
        } else if len % PRIME2 != 0 {
            3 * PRIME2
        } else if len % PRIME3 != 0 {
            3 * PRIME3
        } else {
            3 * PRIME4
        };

        let mut pix = 0;
        for i in 0..sample_pixels {
            let r = f64::from(i32::from(samples[pix]) << NETBIASSHIFT);
            let g = f64::from(i32::from(samples[pix + 1]) << NETBIASSHIFT);
            let b = f64::from(i32::from(samples[pix + 2]) << NETBIASSHIFT);

            let winner = self.contest(r, g, b);
            self.alter_single(alpha, winner, r, g, b);
            if rad != 0 {
                self.alter_neigh(rad, winner, r, g, b);
            }

            pix += step;
            if pix >= len {
                pix -= len;
            }

            if i % delta == 0 {
                alpha -= alpha / alphadec;
                radius -= radius / f64::from(RADIUSDEC);
                rad = radius as i32 >> RADIUSBIASSHIFT;
                if rad <= 1 {
                    rad = 0;
                }
                self.fill_radpower(rad, alpha);
            }
        }
    }

    /// Find the best-matching neuron for a biased sample.
    ///
    /// Returns the bias-adjusted winner; the frequency boost and bias cut go
    /// to the plain-distance winner. The per-neuron decay keeps rarely
    /// chosen neurons competitive.
    fn contest(&mut self, r: f64, g: f64, b: f64) -> usize {
        let mut best_dist = f64::from(i32::MAX);
        let mut best_bias_dist = best_dist;
        let mut best_pos = 0;
        let mut best_bias_pos = 0;

        for i in 0..NETSIZE {
            let n = self.network[i];
            let dist = (n.r - r).abs() + (n.g - g).abs() + (n.b - b).abs();

            if dist < best_dist {
                best_dist = dist;
                best_pos = i;
            }

            let bias_dist = dist - f64::from(self.bias[i] >> (INTBIASSHIFT - NETBIASSHIFT));
            if bias_dist < best_bias_dist {
                best_bias_dist = bias_dist;
                best_bias_pos = i;
            }

            let beta_freq = self.freq[i] >> BETASHIFT;
            self.freq[i] -= beta_freq;
            self.bias[i] += beta_freq << GAMMASHIFT;
        }

        self.freq[best_pos] += BETA;
        self.bias[best_pos] -= BETAGAMMA;

        best_bias_pos
    }

    /// Pull neuron `i` toward the sample by `alpha / INITALPHA`.
    fn alter_single(&mut self, alpha: f64, i: usize, r: f64, g: f64, b: f64) {
        let n = &mut self.network[i];
        n.r -= alpha * (n.r - r) / f64::from(INITALPHA);
        n.g -= alpha * (n.g - g) / f64::from(INITALPHA);
        n.b -= alpha * (n.b - b) / f64::from(INITALPHA);
    }

    /// Pull neurons around `i` toward the sample, weighted by the cached
    /// radius falloff. The window is in neuron-index space, not color space.
    fn alter_neigh(&mut self, rad: i32, i: usize, r: f64, g: f64, b: f64) {
        let i = i as i32;
        let lo = (i - rad).abs();
        let hi = (i + rad).min(NETSIZE as i32);

        let mut j = i + 1;
        let mut k = i - 1;
        let mut m = 1;

        while j < hi || k > lo {
            let a = f64::from(self.radpower[m]);
            m += 1;

            if j < hi {
                let n = &mut self.network[j as usize];
                n.r -= a * (n.r - r) / f64::from(ALPHARADBIAS);
                n.g -= a * (n.g - g) / f64::from(ALPHARADBIAS);
                n.b -= a * (n.b - b) / f64::from(ALPHARADBIAS);
                j += 1;
            }

            if k > lo {
                let n = &mut self.network[k as usize];
                n.r -= a * (n.r - r) / f64::from(ALPHARADBIAS);
                n.g -= a * (n.g - g) / f64::from(ALPHARADBIAS);
                n.b -= a * (n.b - b) / f64::from(ALPHARADBIAS);
                k -= 1;
            }
        }
    }

    /// Rebuild the falloff table for a new radius; weight vanishes at the
    /// radius boundary. Stored truncated to integers.
    fn fill_radpower(&mut self, rad: i32, alpha: f64) {
        for i in 0..rad as usize {
            let falloff = ((rad * rad - (i * i) as i32) * RADBIAS) as f64 / (rad * rad) as f64;
            self.radpower[i] = (alpha * falloff) as i32;
        }
    }

    /// Shift channels back to 0..=255 and stamp each neuron with its
    /// pre-sort position.
    fn unbias(&mut self) {
        for (i, n) in self.network.iter_mut().enumerate() {
            n.r = f64::from(n.r as i32 >> NETBIASSHIFT);
            n.g = f64::from(n.g as i32 >> NETBIASSHIFT);
            n.b = f64::from(n.b as i32 >> NETBIASSHIFT);
            n.tag = i;
        }
    }

    /// Sort the network ascending by green and build the per-green-value
    /// start positions used by `lookup`. Selection sort keeps the tie order
    /// deterministic.
    fn build_index(&mut self) {
        let mut previous_col = 0usize;
        let mut start_pos = 0usize;

        for i in 0..NETSIZE {
            let mut small_pos = i;
            let mut small_val = self.network[i].g as i32;

            for j in (i + 1)..NETSIZE {
                if (self.network[j].g as i32) < small_val {
                    small_pos = j;
                    small_val = self.network[j].g as i32;
                }
            }

            if i != small_pos {
                self.network.swap(i, small_pos);
            }

            let small_val = small_val as usize;
            if small_val != previous_col {
                self.netindex[previous_col] = (start_pos + i) >> 1;
                for slot in &mut self.netindex[(previous_col + 1)..small_val] {
                    *slot = i;
                }
                previous_col = small_val;
                start_pos = i;
            }
        }

        self.netindex[previous_col] = (start_pos + MAXNETPOS) >> 1;
        for slot in &mut self.netindex[(previous_col + 1)..] {
            *slot = MAXNETPOS;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_samples(pixels: usize) -> Vec<u8> {
        let mut samples = Vec::with_capacity(pixels * 3);
        for i in 0..pixels {
            samples.push((i % 256) as u8);
            samples.push((255 - i % 256) as u8);
            samples.push((i * 7 % 256) as u8);
        }
        samples
    }

    #[test]
    fn palette_is_768_bytes_with_unique_tags() {
        let quant = NeuQuant::train(&gradient_samples(2000), 10);
        assert_eq!(quant.palette().len(), 768);

        let mut seen = [false; NETSIZE];
        for n in &quant.network {
            assert!(!seen[n.tag], "tag {} assigned twice", n.tag);
            seen[n.tag] = true;
        }
        assert!(seen.iter().all(|&s| s), "tags are not a full permutation");
    }

    #[test]
    fn network_is_green_sorted_after_training() {
        let quant = NeuQuant::train(&gradient_samples(2000), 10);
        for pair in quant.network.windows(2) {
            assert!(pair[0].g <= pair[1].g);
        }
    }

    #[test]
    fn lookup_is_total_and_idempotent() {
        let quant = NeuQuant::train(&gradient_samples(600), 1);
        // coarse sweep of the whole input cube
        for r in (0..256).step_by(17) {
            for g in (0..256).step_by(17) {
                for b in (0..256).step_by(17) {
                    let (r, g, b) = (r as u8, g as u8, b as u8);
                    let first = quant.lookup(r, g, b);
                    assert_eq!(first, quant.lookup(r, g, b));
                }
            }
        }
    }

    #[test]
    fn training_is_deterministic() {
        let samples = gradient_samples(3000);
        let a = NeuQuant::train(&samples, 10);
        let b = NeuQuant::train(&samples, 10);
        assert_eq!(a.palette(), b.palette());
        for (r, g, bl) in [(1u8, 2u8, 3u8), (250, 128, 64), (66, 66, 66)] {
            assert_eq!(a.lookup(r, g, bl), b.lookup(r, g, bl));
        }
    }

    #[test]
    fn repeated_color_converges_onto_sample() {
        let mut samples = Vec::new();
        for _ in 0..300 {
            samples.extend_from_slice(&[10, 20, 30]);
        }
        let quant = NeuQuant::train(&samples, 10);

        let index = quant.lookup(10, 20, 30) as usize;
        let palette = quant.palette();
        let entry = &palette[index * 3..index * 3 + 3];
        assert!(
            entry[0].abs_diff(10) <= 2 && entry[1].abs_diff(20) <= 2 && entry[2].abs_diff(30) <= 2,
            "palette entry {entry:?} strayed from the training color"
        );
    }

    #[test]
    fn small_buffers_force_dense_sampling() {
        // 600 bytes sit below the prime threshold, so even factor 30 samples
        // every pixel and the single color still wins the palette.
        let samples = vec![7u8; 600];
        let quant = NeuQuant::train(&samples, 30);

        let index = quant.lookup(7, 7, 7) as usize;
        let palette = quant.palette();
        assert!(
            palette[index * 3].abs_diff(7) <= 2,
            "expected an entry near 7, got {}",
            palette[index * 3]
        );
    }
}
