//! The subset of the HAR 1.2 format the generator reads.

use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Har {
    pub log: HarLog,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HarLog {
    #[serde(default)]
    pub entries: Vec<HarEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HarEntry {
    pub request: HarRequest,
    /// Address the request was sent to; IPv6 addresses are bracketed.
    /// Empty when the browser did not record one.
    #[serde(rename = "serverIPAddress", default)]
    pub server_ip_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HarRequest {
    pub url: String,
    #[serde(default)]
    pub method: String,
}

pub fn load_har(path: &Path) -> Result<Har> {
    let file = File::open(path).wrap_err_with(|| format!("Failed to open HAR file '{}'", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .wrap_err_with(|| format!("Failed to parse HAR file '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_har_ignores_unknown_fields() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"log": {{"version": "1.2", "entries": [
                {{"request": {{"method": "GET", "url": "https://a.test/x", "headers": []}},
                  "response": {{"status": 200}},
                  "serverIPAddress": "93.184.216.34"}},
                {{"request": {{"method": "GET", "url": "https://a.test/y"}}}}
            ]}}}}"#
        )
        .unwrap();

        let har = load_har(file.path()).unwrap();
        assert_eq!(har.log.entries.len(), 2);
        assert_eq!(har.log.entries[0].server_ip_address, "93.184.216.34");
        assert_eq!(har.log.entries[0].request.method, "GET");
        assert!(har.log.entries[1].server_ip_address.is_empty());
    }

    #[test]
    fn test_load_har_rejects_garbage() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(load_har(file.path()).is_err());
    }
}
