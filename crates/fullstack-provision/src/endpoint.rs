//! Reachable service endpoints

use serde::Serialize;
use std::collections::BTreeMap;

/// Where a provisioned service can be reached from the host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    /// Host name or address
    pub host: String,
    /// Container port -> host port
    pub ports: BTreeMap<u16, u16>,
    /// Container port listed first in the service definition
    pub primary: Option<u16>,
}

impl Endpoint {
    /// Endpoint on the loopback interface
    pub fn local() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            ports: BTreeMap::new(),
            primary: None,
        }
    }

    /// Record a port mapping; the first one becomes the primary port
    pub fn with_port(mut self, container: u16, host: u16) -> Self {
        self.ports.insert(container, host);
        if self.primary.is_none() {
            self.primary = Some(container);
        }
        self
    }

    /// Host port for a container port
    pub fn port(&self, container: u16) -> Option<u16> {
        self.ports.get(&container).copied()
    }

    /// Host port of the primary container port
    pub fn primary_port(&self) -> Option<u16> {
        self.primary.and_then(|p| self.port(p))
    }

    /// `host:port` for a container port
    pub fn address(&self, container: u16) -> Option<String> {
        self.port(container).map(|p| format!("{}:{}", self.host, p))
    }
}

/// Parse the output of `docker port <container> <port>/tcp`
///
/// Lines look like `0.0.0.0:49153` or `[::]:49153`; IPv4 bindings are
/// preferred.
pub fn parse_port_binding(output: &str) -> Option<u16> {
    let mut fallback = None;

    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some((addr, port)) = line.rsplit_once(':') else {
            continue;
        };
        let Ok(port) = port.parse::<u16>() else {
            continue;
        };
        if !addr.starts_with('[') {
            return Some(port);
        }
        fallback.get_or_insert(port);
    }

    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_port_is_first_declared() {
        let endpoint = Endpoint::local().with_port(8080, 18080).with_port(5432, 15432);
        assert_eq!(endpoint.primary_port(), Some(18080));
        assert_eq!(endpoint.port(5432), Some(15432));
        assert_eq!(endpoint.address(8080).as_deref(), Some("127.0.0.1:18080"));
        assert_eq!(endpoint.port(9999), None);
    }

    #[test]
    fn test_parse_port_binding() {
        assert_eq!(parse_port_binding("0.0.0.0:49153\n[::]:49153\n"), Some(49153));
        assert_eq!(parse_port_binding("127.0.0.1:32768"), Some(32768));
        assert_eq!(parse_port_binding("[::]:40000\n"), Some(40000));
        assert_eq!(parse_port_binding("[::]:40000\n0.0.0.0:40001\n"), Some(40001));
        assert_eq!(parse_port_binding(""), None);
        assert_eq!(parse_port_binding("Error: no public port"), None);
    }
}
