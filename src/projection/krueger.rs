//! Krüger series for the Transverse Mercator projection.
//!
//! Coefficients follow Karney (2011), "Transverse Mercator with an accuracy
//! of a few nanometers", truncated at sixth order in the third flattening `n`.
//! Conformal latitude is handled through `tau = tan(phi)` to stay well
//! conditioned near the poles.

/// Number of trigonometric terms kept in each series.
pub const ORDER: usize = 6;

const MAX_NEWTON_ITERATIONS: usize = 10;

/// Precomputed series coefficients for one ellipsoid.
#[derive(Debug, Clone, PartialEq)]
pub struct KruegerSeries {
    /// Rectifying radius `A`: meridian quadrant length divided by pi/2.
    pub rectifying_radius: f64,
    /// Forward coefficients (conformal sphere to rectifying sphere).
    pub alpha: [f64; ORDER],
    /// Inverse coefficients.
    pub beta: [f64; ORDER],
}

impl KruegerSeries {
    /// Builds the series for an ellipsoid with semi-major axis `a` and flattening `f`.
    pub fn new(a: f64, f: f64) -> Self {
        let n = f / (2.0 - f);
        let n2 = n * n;
        let n3 = n2 * n;
        let n4 = n3 * n;
        let n5 = n4 * n;
        let n6 = n5 * n;

        let rectifying_radius = a / (1.0 + n) * (1.0 + n2 / 4.0 + n4 / 64.0 + n6 / 256.0);

        let alpha = [
            n / 2.0 - 2.0 * n2 / 3.0 + 5.0 * n3 / 16.0 + 41.0 * n4 / 180.0
                - 127.0 * n5 / 288.0
                + 7891.0 * n6 / 37800.0,
            13.0 * n2 / 48.0 - 3.0 * n3 / 5.0 + 557.0 * n4 / 1440.0 + 281.0 * n5 / 630.0
                - 1983433.0 * n6 / 1935360.0,
            61.0 * n3 / 240.0 - 103.0 * n4 / 140.0
                + 15061.0 * n5 / 26880.0
                + 167603.0 * n6 / 181440.0,
            49561.0 * n4 / 161280.0 - 179.0 * n5 / 168.0 + 6601661.0 * n6 / 7257600.0,
            34729.0 * n5 / 80640.0 - 3418889.0 * n6 / 1995840.0,
            212378941.0 * n6 / 319334400.0,
        ];

        let beta = [
            n / 2.0 - 2.0 * n2 / 3.0 + 37.0 * n3 / 96.0 - n4 / 360.0 - 81.0 * n5 / 512.0
                + 96199.0 * n6 / 604800.0,
            n2 / 48.0 + n3 / 15.0 - 437.0 * n4 / 1440.0 + 46.0 * n5 / 105.0
                - 1118711.0 * n6 / 3870720.0,
            17.0 * n3 / 480.0 - 37.0 * n4 / 840.0 - 209.0 * n5 / 4480.0
                + 5569.0 * n6 / 90720.0,
            4397.0 * n4 / 161280.0 - 11.0 * n5 / 504.0 - 830251.0 * n6 / 7257600.0,
            4583.0 * n5 / 161280.0 - 108847.0 * n6 / 3991680.0,
            20648693.0 * n6 / 638668800.0,
        ];

        Self {
            rectifying_radius,
            alpha,
            beta,
        }
    }

    /// Maps conformal-sphere coordinates `(xi', eta')` to `(xi, eta)`.
    pub fn forward(&self, xi_p: f64, eta_p: f64) -> (f64, f64) {
        apply(&self.alpha, xi_p, eta_p, 1.0)
    }

    /// Maps `(xi, eta)` back to conformal-sphere coordinates.
    pub fn inverse(&self, xi: f64, eta: f64) -> (f64, f64) {
        apply(&self.beta, xi, eta, -1.0)
    }
}

fn apply(coefficients: &[f64; ORDER], xi: f64, eta: f64, sign: f64) -> (f64, f64) {
    let mut out_xi = xi;
    let mut out_eta = eta;
    for (j, c) in coefficients.iter().enumerate() {
        let k = 2.0 * (j + 1) as f64;
        out_xi += sign * c * (k * xi).sin() * (k * eta).cosh();
        out_eta += sign * c * (k * xi).cos() * (k * eta).sinh();
    }
    (out_xi, out_eta)
}

/// Conformal `tau' = tan(chi)` from geodetic `tau = tan(phi)`.
pub fn conformal_tau(tau: f64, e: f64) -> f64 {
    if !tau.is_finite() {
        return tau;
    }
    let tau1 = 1.0_f64.hypot(tau);
    let sig = (e * (e * tau / tau1).atanh()).sinh();
    1.0_f64.hypot(sig) * tau - sig * tau1
}

/// Inverts [`conformal_tau`] by Newton iteration.
pub fn geodetic_tau(tau_p: f64, e: f64) -> f64 {
    if !tau_p.is_finite() {
        return tau_p;
    }
    let e2m = 1.0 - e * e;
    let tolerance = f64::EPSILON * tau_p.abs().max(1.0);
    let mut tau = tau_p / e2m;
    for _ in 0..MAX_NEWTON_ITERATIONS {
        let tau_pa = conformal_tau(tau, e);
        let delta = (tau_p - tau_pa) * (1.0 + e2m * tau * tau)
            / (e2m * 1.0_f64.hypot(tau) * 1.0_f64.hypot(tau_pa));
        tau += delta;
        if delta.abs() <= tolerance {
            break;
        }
    }
    tau
}
