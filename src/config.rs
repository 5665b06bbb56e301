//! Tunable constants of the ECR model, injected into the
//! [`crate::engine::Engine`] at construction rather than read from global
//! state.

/// The seven knobs of the ECR energy/estimation model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Constants {
    /// Constant battery drain per tick.
    pub d_c: f64,
    /// Per-forwarded-packet battery drain.
    pub d_p: f64,
    /// EMA weight on historical `p_hat`.
    pub alpha: f64,
    /// Per-hop discount applied to propagated `lat_r`.
    pub gamma: f64,
    /// Ticks before an outstanding RD is declared failed.
    pub rd_timeout: u64,
    /// After this many RPs along a route, emit selective RDs to other neighbors.
    pub rd_resend: u64,
    /// Minimum tick gap between successive RU emissions for the same route.
    pub ru_min_interval: u64,
}

impl Default for Constants {
    fn default() -> Self {
        Constants { d_c: 0.001, d_p: 0.0003, alpha: 0.8, gamma: 0.98, rd_timeout: 100, rd_resend: 10, ru_min_interval: 5 }
    }
}

impl Constants {
    /// Applies a single `name=value` override, as accepted by `ecr-sim
    /// --constant`. Unknown names are ignored by the caller, not here —
    /// see `ecr_sim::apply_constant_override`.
    pub fn set_by_name(&mut self, name: &str, value: f64) -> bool {
        match name {
            "d_c" => self.d_c = value,
            "d_p" => self.d_p = value,
            "alpha" => self.alpha = value,
            "gamma" => self.gamma = value,
            "rd_timeout" => self.rd_timeout = value as u64,
            "rd_resend" => self.rd_resend = value as u64,
            "ru_min_interval" => self.ru_min_interval = value as u64,
            _ => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let c = Constants::default();
        assert_eq!(c.d_c, 0.001);
        assert_eq!(c.d_p, 0.0003);
        assert_eq!(c.alpha, 0.8);
        assert_eq!(c.gamma, 0.98);
        assert_eq!(c.rd_timeout, 100);
        assert_eq!(c.rd_resend, 10);
        assert_eq!(c.ru_min_interval, 5);
    }

    #[test]
    fn set_by_name_rejects_unknown() {
        let mut c = Constants::default();
        assert!(!c.set_by_name("nope", 1.0));
        assert!(c.set_by_name("gamma", 0.5));
        assert_eq!(c.gamma, 0.5);
    }
}
