#[allow(unused_imports)]
use num_traits::Float;
use serde::{Deserialize, Serialize};

/// Gains and operating point of a [`Pid2`] controller.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pid2Config {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Time constant of the derivative low-pass filter
    pub tf: f32,
    /// Feedback gain of the anti-windup tracking loop
    pub kt: f32,
    /// Set-point weight of the proportional term
    pub beta: f32,
    /// Output the controller starts from when it is (re)configured
    pub u0: f32,
    /// Output bias
    pub va: f32,
    /// Output scale
    pub vb: f32,
}

/// Two degree of freedom PID controller with set-point weighting, filtered
/// derivative on measurement, anti-windup by back-calculation and bumpless
/// transfer. The output is `va + vb * (P + I + D)`, clamped to the bounds
/// given on every update.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pid2 {
    kp: f32,
    beta: f32,
    bi: f32,
    br: f32,
    ad: f32,
    bd: f32,
    u0: f32,
    va: f32,
    vb: f32,
    p: f32,
    i: f32,
    d: f32,
    y_old: f32,
    reconfigure: bool,
}

impl Default for Pid2 {
    fn default() -> Self {
        Self::new()
    }
}

impl Pid2 {
    #[must_use]
    pub const fn new() -> Self {
        Pid2 {
            kp: 0.0,
            beta: 1.0,
            bi: 0.0,
            br: 0.0,
            ad: 0.0,
            bd: 0.0,
            u0: 0.0,
            va: 0.0,
            vb: 1.0,
            p: 0.0,
            i: 0.0,
            d: 0.0,
            y_old: 0.0,
            reconfigure: true,
        }
    }

    /// Program the controller for a sample time of `dt` seconds. The internal
    /// state is re-seated on the next update so the output starts at `u0`.
    pub fn configure(&mut self, config: Pid2Config, dt: f32) {
        self.reconfigure = true;

        self.u0 = config.u0;
        self.va = config.va;
        self.vb = config.vb;
        self.kp = config.kp;
        self.beta = config.beta;

        self.bi = config.ki * dt;
        self.br = if config.vb.abs() > 0.0 {
            config.kt * dt / config.vb
        } else {
            0.0
        };
        self.ad = config.tf / (config.tf + dt);
        self.bd = config.kd / (config.tf + dt);
    }

    /// Bumpless transfer, the next update continues from the output `u0`.
    pub fn transfer(&mut self, u0: f32) {
        self.u0 = u0;
        self.reconfigure = true;
    }

    /// Change the output bias. Combine with [`Pid2::transfer`] to avoid a step.
    pub fn set_bias(&mut self, va: f32) {
        self.va = va;
    }

    pub fn integral(&self) -> f32 {
        self.i
    }

    /// Shift the integral term by `delta`.
    pub fn offset_integral(&mut self, delta: f32) {
        self.i += delta;
    }

    /// Update the controller with set-point `r` and measurement `y`, bounding
    /// the output to `[u_low, u_high]`.
    pub fn update(&mut self, r: f32, y: f32, u_low: f32, u_high: f32) -> f32 {
        // On reconfigure, choose the integral such that the output equals u0
        if self.reconfigure {
            self.reconfigure = false;
            self.y_old = y;
            self.d = 0.0;
            let bias = if self.vb.abs() > 0.0 {
                (self.u0 - self.va) / self.vb
            } else {
                0.0
            };
            self.i = bias - self.kp * (self.beta * r - y);
        }

        self.p = self.kp * (self.beta * r - y);
        self.d = self.ad * self.d - self.bd * (y - self.y_old);

        let v = self.va + self.vb * (self.p + self.i + self.d);
        let u = v.max(u_low).min(u_high);

        // Integral with back-calculation of the saturation
        self.i += self.bi * (r - y) + self.br * (u - v);
        self.y_old = y;

        u
    }
}
