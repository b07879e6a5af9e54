//! Special functions needed by the Wright-Malécot identity function.
//!
//! Everything here works in plain `f64` and is accurate to a few ulps over the
//! ranges the model uses:
//!
//! - `polylog_exp(s, w)` evaluates the polylogarithm `Li_s(e^w)` for integer
//!   orders and `w < 0`. The mutation-scaled argument `z = exp(-2μ)` sits very
//!   close to 1 for realistic mutation rates, where the defining series
//!   `Σ z^n / n^s` converges far too slowly, so we expand around `w = 0`.
//! - `zeta(n)` is the Riemann zeta function at integer arguments, used by the
//!   polylogarithm expansion.
//! - `bessel_k0(x)` is the modified Bessel function of the second kind of
//!   order zero.

use std::f64::consts::PI;

/// Euler–Mascheroni constant γ.
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Bernoulli numbers `B_2, B_4, …, B_14` used in the Euler–Maclaurin tail.
const BERNOULLI_EVEN: [f64; 7] = [
    1.0 / 6.0,
    -1.0 / 30.0,
    1.0 / 42.0,
    -1.0 / 30.0,
    5.0 / 66.0,
    -691.0 / 2730.0,
    7.0 / 6.0,
];

/// Number of leading terms summed explicitly before the Euler–Maclaurin tail.
const ZETA_DIRECT_TERMS: u32 = 12;

/// Hard cap on the number of terms in any series below.
const MAX_SERIES_TERMS: usize = 400;

/// Relative size at which a series term no longer changes the sum.
const SERIES_EPSILON: f64 = 1e-17;

/// Riemann zeta function at an integer argument `n != 1`.
///
/// Positive arguments use Euler–Maclaurin summation. Non-positive arguments use
/// the functional equation `ζ(1-2j) = (-1)^j · 2·(2j-1)!·ζ(2j) / (2π)^{2j}`, with
/// the trivial zeros at negative even integers. Returns NaN at the pole `n == 1`.
pub fn zeta(n: i32) -> f64 {
    match n {
        1 => f64::NAN,
        0 => -0.5,
        n if n < 0 => {
            let m = (-n) as u32;
            if m % 2 == 0 {
                return 0.0;
            }
            let j = (m + 1) / 2;
            let sign = if j % 2 == 1 { -1.0 } else { 1.0 };
            let two_j = 2 * j;
            // m! / (2π)^{2j} accumulated as a product to stay in range.
            let mut ratio = 1.0 / (2.0 * PI);
            for i in 1..=m {
                ratio *= i as f64 / (2.0 * PI);
            }
            sign * 2.0 * ratio * zeta(two_j as i32)
        }
        n => zeta_positive(n as f64),
    }
}

fn zeta_positive(s: f64) -> f64 {
    let big_n = ZETA_DIRECT_TERMS as f64;
    let mut total: f64 = (1..ZETA_DIRECT_TERMS).map(|k| (k as f64).powf(-s)).sum();
    total += big_n.powf(1.0 - s) / (s - 1.0) + 0.5 * big_n.powf(-s);

    // Σ B_{2j}/(2j)! · s(s+1)…(s+2j-2) · N^{-s-2j+1}
    let mut rising = s;
    let mut factorial = 2.0;
    for (idx, bernoulli) in BERNOULLI_EVEN.iter().enumerate() {
        let order = 2.0 * (idx as f64 + 1.0);
        total += bernoulli / factorial * rising * big_n.powf(-s - order + 1.0);
        rising *= (s + order - 1.0) * (s + order);
        factorial *= (order + 1.0) * (order + 2.0);
    }
    total
}

/// Polylogarithm `Li_s(e^w)` for an integer order `s >= 1` and `w < 0`.
///
/// For `|w| < π` this uses the expansion
///
/// `Li_s(e^w) = w^{s-1}/(s-1)! · (H_{s-1} - ln(-w)) + Σ_{k≠s-1} ζ(s-k)·w^k/k!`
///
/// which converges quickly when `e^w` is close to one. Further away the
/// defining series is summed directly. Returns NaN outside the domain.
pub fn polylog_exp(s: u32, w: f64) -> f64 {
    if s == 0 || !w.is_finite() || w >= 0.0 {
        return f64::NAN;
    }
    if s == 1 {
        return -(-w.exp_m1()).ln();
    }
    if w > -PI {
        polylog_near_one(s, w)
    } else {
        polylog_direct(s, w.exp())
    }
}

fn polylog_near_one(s: u32, w: f64) -> f64 {
    let order = s as i32;
    let harmonic: f64 = (1..s).map(|i| 1.0 / i as f64).sum();

    let mut singular = 1.0;
    for k in 1..s {
        singular *= w / k as f64;
    }
    let mut total = singular * (harmonic - (-w).ln());

    // power holds w^k / k!
    let mut power = 1.0;
    for k in 0..(s as usize + MAX_SERIES_TERMS) {
        if k > 0 {
            power *= w / k as f64;
        }
        let shifted = order - k as i32;
        if shifted == 1 {
            continue;
        }
        let term = zeta(shifted) * power;
        total += term;
        // Zeta vanishes at negative even integers, so only judge convergence
        // on the odd ones.
        if shifted < 0 && shifted % 2 != 0 && term.abs() < SERIES_EPSILON * total.abs() {
            break;
        }
    }
    total
}

fn polylog_direct(s: u32, z: f64) -> f64 {
    let mut total = 0.0;
    let mut z_pow = 1.0;
    for n in 1..=MAX_SERIES_TERMS {
        z_pow *= z;
        let term = z_pow / (n as f64).powi(s as i32);
        total += term;
        if term < SERIES_EPSILON * total {
            break;
        }
    }
    total
}

/// Modified Bessel function of the second kind, order zero.
///
/// `K0(0)` is `+∞`; negative or NaN arguments give NaN. Large arguments
/// underflow gracefully to zero.
pub fn bessel_k0(x: f64) -> f64 {
    if x.is_nan() || x < 0.0 {
        return f64::NAN;
    }
    if x == 0.0 {
        return f64::INFINITY;
    }
    if x.is_infinite() {
        return 0.0;
    }
    if x <= 2.0 {
        bessel_k0_series(x)
    } else {
        bessel_k0_integral(x)
    }
}

/// Ascending series `K0(x) = -(ln(x/2) + γ)·I0(x) + Σ (x²/4)^k/(k!)² · H_k`.
fn bessel_k0_series(x: f64) -> f64 {
    let quarter_sq = 0.25 * x * x;
    let mut term = 1.0;
    let mut i0 = 1.0;
    let mut harmonic = 0.0;
    let mut tail = 0.0;
    for k in 1..MAX_SERIES_TERMS {
        let kf = k as f64;
        term *= quarter_sq / (kf * kf);
        harmonic += 1.0 / kf;
        i0 += term;
        tail += term * harmonic;
        if term < SERIES_EPSILON * i0 {
            break;
        }
    }
    -((0.5 * x).ln() + EULER_GAMMA) * i0 + tail
}

/// Trapezoid rule on `K0(x) = e^{-x} ∫₀^∞ exp(-2x·sinh²(t/2)) dt`.
///
/// The integrand is analytic and doubly-exponentially decaying, so the plain
/// trapezoid rule converges geometrically in the step size. The step shrinks
/// with `1/sqrt(x)` to follow the width of the peak at `t = 0`.
fn bessel_k0_integral(x: f64) -> f64 {
    let step = (0.5 / x.sqrt()).min(0.1);
    let mut total = 0.5;
    let mut t = step;
    loop {
        let half = (0.5 * t).sinh();
        let value = (-2.0 * x * half * half).exp();
        total += value;
        if value < SERIES_EPSILON * total {
            break;
        }
        t += step;
    }
    (-x).exp() * total * step
}
