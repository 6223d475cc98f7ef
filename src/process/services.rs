//! Command lines for the auxiliary services.
//!
//! The name server and the per-origin servers are external programs; this
//! module only knows how to invoke them.

use std::path::Path;

use crate::emulation::CommandSpec;

/// Control path every origin server exposes for resetting its replay state
pub const RESET_PATH: &str = "/__har_server/reset";

/// `dnsmasq` answering from `hosts_file` only, kept in the foreground so it
/// can be stopped with the rest of the network
pub fn dnsmasq_command(hosts_file: &Path, log_dir: &Path) -> CommandSpec {
    CommandSpec::new("dnsmasq").args([
        "-k".to_string(),
        "-R".to_string(),
        "-h".to_string(),
        "-H".to_string(),
        hosts_file.display().to_string(),
        format!("--log-facility={}", log_dir.join("dns").display()),
    ])
}

/// The configured startup command of an origin host, run through `sh`
pub fn origin_command(command_line: &str) -> CommandSpec {
    CommandSpec::shell(command_line)
}

/// `curl -X PUT` against the origin's reset endpoint
pub fn reset_command(origin: &str) -> CommandSpec {
    let url = format!("{}{}", origin.trim_end_matches('/'), RESET_PATH);
    CommandSpec::new("curl").args(["-X", "PUT", "-v", "-s"]).arg(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dnsmasq_command() {
        let spec = dnsmasq_command(Path::new("/opt/src/hosts"), Path::new("/var/log/har"));
        assert_eq!(
            spec.to_string(),
            "dnsmasq -k -R -h -H /opt/src/hosts --log-facility=/var/log/har/dns"
        );
    }

    #[test]
    fn test_reset_command() {
        assert_eq!(
            reset_command("https://www.example.com:443").to_string(),
            "curl -X PUT -v -s https://www.example.com:443/__har_server/reset"
        );
        assert_eq!(
            reset_command("http://a.test:80/").to_string(),
            "curl -X PUT -v -s http://a.test:80/__har_server/reset"
        );
    }

    #[test]
    fn test_origin_command_runs_through_shell() {
        let spec = origin_command("./har-server.js page.har http://a.test:80 10.0.0.5");
        assert_eq!(spec.program, "sh");
        assert_eq!(spec.args[0], "-c");
        assert_eq!(spec.args[1], "./har-server.js page.har http://a.test:80 10.0.0.5");
    }
}
