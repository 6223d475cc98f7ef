//! All-pairs reachability check between the emulated hosts.

use std::fmt;

use log::{info, warn};

use crate::emulation::{CommandRunner, CommandSpec, Network, NetworkError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingResult {
    pub from: String,
    pub to: String,
    pub ok: bool,
}

/// Outcome of one `pingall` round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PingReport {
    pub results: Vec<PingResult>,
}

impl PingReport {
    pub fn sent(&self) -> usize {
        self.results.len()
    }

    pub fn received(&self) -> usize {
        self.results.iter().filter(|result| result.ok).count()
    }

    pub fn drop_percent(&self) -> f64 {
        if self.results.is_empty() {
            return 0.0;
        }
        let dropped = self.sent() - self.received();
        100.0 * dropped as f64 / self.sent() as f64
    }
}

impl fmt::Display for PingReport {
    /// One line per source host listing the reachable targets, `X` for the
    /// unreachable ones, then the summary line
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "*** Ping: testing ping reachability")?;

        let mut current: Option<&str> = None;
        for result in &self.results {
            if current != Some(result.from.as_str()) {
                if current.is_some() {
                    writeln!(f)?;
                }
                write!(f, "{} ->", result.from)?;
                current = Some(result.from.as_str());
            }
            if result.ok {
                write!(f, " {}", result.to)?;
            } else {
                write!(f, " X")?;
            }
        }
        if current.is_some() {
            writeln!(f)?;
        }

        write!(
            f,
            "*** Results: {:.0}% dropped ({}/{} received)",
            self.drop_percent(),
            self.received(),
            self.sent()
        )
    }
}

/// `ping -c1 -W1` from every host to the first address of every other host
pub fn ping_all<R: CommandRunner>(network: &Network<R>) -> Result<PingReport, NetworkError> {
    let plan = network.plan();
    let hosts: Vec<&str> = plan.hosts().map(|node| node.name.as_str()).collect();
    let mut report = PingReport::default();

    for &from in &hosts {
        for &to in &hosts {
            if from == to {
                continue;
            }
            let target = plan
                .primary_address(to)
                .ok_or_else(|| NetworkError::NoAddress(to.to_string()))?;

            let command = network.command_in(
                from,
                CommandSpec::new("ping").args(["-c1", "-W1"]).arg(target.to_string()),
            )?;
            // A ping that cannot be started counts as lost
            let ok = match network.runner().output(&command) {
                Ok(output) if output.status.success() => true,
                Ok(_) => {
                    warn!("{} cannot reach {} ({})", from, to, target);
                    false
                }
                Err(err) => {
                    warn!("Ping from {} to {} did not run: {}", from, to, err);
                    false
                }
            };
            report.results.push(PingResult {
                from: from.to_string(),
                to: to.to_string(),
                ok,
            });
        }
    }

    info!(
        "Connectivity check: {}/{} received",
        report.received(),
        report.sent()
    );
    Ok(report)
}
