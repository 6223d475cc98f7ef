use thiserror::Error;

/// Bandwidth/delay/jitter/loss shaping for one link.
///
/// Shaping is applied as an htb root qdisc carrying the rate limit with a
/// netem child for delay, jitter and loss. Zero-valued netem parameters are
/// left out; if all of them are zero no netem qdisc is installed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkImpairment {
    pub bandwidth_mbit: f64,
    pub delay_ms: u32,
    pub jitter_ms: u32,
    pub loss_percent: u32,
}

#[derive(Debug, Error)]
pub enum ImpairmentError {
    #[error("bandwidth must be a positive number of Mbit/s, got {0}")]
    InvalidBandwidth(f64),
    #[error("loss must be between 0 and 100 percent, got {0}")]
    InvalidLoss(u32),
}

impl LinkImpairment {
    pub fn new(
        bandwidth_mbit: f64,
        delay_ms: u32,
        jitter_ms: u32,
        loss_percent: u32,
    ) -> Result<Self, ImpairmentError> {
        if !bandwidth_mbit.is_finite() || bandwidth_mbit <= 0.0 {
            return Err(ImpairmentError::InvalidBandwidth(bandwidth_mbit));
        }
        if loss_percent > 100 {
            return Err(ImpairmentError::InvalidLoss(loss_percent));
        }
        Ok(Self {
            bandwidth_mbit,
            delay_ms,
            jitter_ms,
            loss_percent,
        })
    }

    /// The shaping for each end of a link that should add up to this
    /// round-trip impairment: half the delay per direction (integer
    /// division), full jitter, full loss.
    pub fn per_direction(&self) -> Self {
        Self {
            delay_ms: self.delay_ms / 2,
            ..*self
        }
    }

    fn has_netem_params(&self) -> bool {
        self.delay_ms > 0 || self.jitter_ms > 0 || self.loss_percent > 0
    }

    /// netem parameter list: `delay <d>ms [<j>ms] [loss <l>%]`
    pub fn netem_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.delay_ms > 0 || self.jitter_ms > 0 {
            args.push("delay".into());
            args.push(format!("{}ms", self.delay_ms));
            if self.jitter_ms > 0 {
                args.push(format!("{}ms", self.jitter_ms));
            }
        }

        if self.loss_percent > 0 {
            args.push("loss".into());
            args.push(format!("{}%", self.loss_percent));
        }

        args
    }

    /// Every `tc` argument list needed to shape `interface`, in order
    pub fn tc_commands(&self, interface: &str) -> Vec<Vec<String>> {
        let own = |args: &[&str]| args.iter().map(|arg| arg.to_string()).collect::<Vec<_>>();
        let rate = format!("{}Mbit", self.bandwidth_mbit);

        let mut commands = vec![
            own(&["qdisc", "add", "dev", interface, "root", "handle", "5:0", "htb", "default", "1"]),
            own(&[
                "class", "add", "dev", interface, "parent", "5:0", "classid", "5:1", "htb", "rate", &rate,
                "burst", "15k",
            ]),
        ];

        if self.has_netem_params() {
            let mut netem = own(&["qdisc", "add", "dev", interface, "parent", "5:1", "handle", "10:", "netem"]);
            netem.extend(self.netem_args());
            commands.push(netem);
        }

        commands
    }
}
