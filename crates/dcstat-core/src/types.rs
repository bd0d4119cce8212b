//! Shared types used across dcstat crates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identity of a remote datacenter.
pub type EndpointId = i32;

/// Application credentials presented when opening any session.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub app_id: i32,
    pub app_hash: String,
}

impl Identity {
    pub fn new(app_id: i32, app_hash: impl Into<String>) -> Self {
        Self {
            app_id,
            app_hash: app_hash.into(),
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("app_id", &self.app_id)
            .field("app_hash", &"<redacted>")
            .finish()
    }
}

/// A `host:port` connection target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointAddress {
    pub host: String,
    pub port: u16,
}

impl EndpointAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host:port` or `[v6]:port`.
    pub fn parse(s: &str) -> Option<Self> {
        let (host, port) = s.trim().rsplit_once(':')?;
        let port = port.parse::<u16>().ok()?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            return None;
        }
        Some(Self::new(host, port))
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Classification of an advertised option. Any set flag takes the option
/// out of probing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExcludeFlags {
    pub ipv6: bool,
    pub tcpo_only: bool,
    pub is_static: bool,
    pub cdn: bool,
    pub media_only: bool,
}

impl ExcludeFlags {
    pub fn any(&self) -> bool {
        self.ipv6 || self.tcpo_only || self.is_static || self.cdn || self.media_only
    }

    /// Names of the flags that are set, for logging.
    pub fn reasons(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.ipv6 {
            out.push("ipv6");
        }
        if self.tcpo_only {
            out.push("tcpo_only");
        }
        if self.is_static {
            out.push("static");
        }
        if self.cdn {
            out.push("cdn");
        }
        if self.media_only {
            out.push("media_only");
        }
        out
    }
}

/// One entry of the remote's advertised datacenter list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DcOption {
    pub id: EndpointId,
    pub ip_address: String,
    pub port: u16,
    #[serde(default)]
    pub ipv6: bool,
    #[serde(default)]
    pub tcpo_only: bool,
    #[serde(default, rename = "static")]
    pub is_static: bool,
    #[serde(default)]
    pub cdn: bool,
    #[serde(default)]
    pub media_only: bool,
}

impl DcOption {
    /// A plain IPv4 option with no exclusion flags.
    pub fn new(id: EndpointId, ip_address: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            ip_address: ip_address.into(),
            port,
            ipv6: false,
            tcpo_only: false,
            is_static: false,
            cdn: false,
            media_only: false,
        }
    }

    pub fn address(&self) -> EndpointAddress {
        EndpointAddress::new(self.ip_address.clone(), self.port)
    }

    pub fn flags(&self) -> ExcludeFlags {
        ExcludeFlags {
            ipv6: self.ipv6,
            tcpo_only: self.tcpo_only,
            is_static: self.is_static,
            cdn: self.cdn,
            media_only: self.media_only,
        }
    }

    pub fn is_probeable(&self) -> bool {
        !self.flags().any()
    }
}

/// Global configuration returned by the configuration-fetch RPC.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub dc_options: Vec<DcOption>,
}

impl RemoteConfig {
    pub fn new(dc_options: Vec<DcOption>) -> Self {
        Self { dc_options }
    }

    /// Canonical address for `id`: the first probeable option with that id.
    pub fn address_for(&self, id: EndpointId) -> Option<EndpointAddress> {
        self.dc_options
            .iter()
            .find(|dc| dc.id == id && dc.is_probeable())
            .map(DcOption::address)
    }
}

/// Identity, initial address and classification of one probe target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub id: EndpointId,
    pub address: EndpointAddress,
    pub flags: ExcludeFlags,
}

impl From<&DcOption> for EndpointDescriptor {
    fn from(dc: &DcOption) -> Self {
        Self {
            id: dc.id,
            address: dc.address(),
            flags: dc.flags(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_display_and_parse() {
        let v4 = EndpointAddress::new("10.0.0.1", 443);
        assert_eq!(v4.to_string(), "10.0.0.1:443");
        assert_eq!(EndpointAddress::parse("10.0.0.1:443"), Some(v4));

        let v6 = EndpointAddress::new("2001:db8::1", 443);
        assert_eq!(v6.to_string(), "[2001:db8::1]:443");
        assert_eq!(EndpointAddress::parse("[2001:db8::1]:443"), Some(v6));
    }

    #[test]
    fn address_parse_rejects_garbage() {
        assert_eq!(EndpointAddress::parse("no-port"), None);
        assert_eq!(EndpointAddress::parse(":443"), None);
        assert_eq!(EndpointAddress::parse("host:99999"), None);
    }

    #[test]
    fn any_flag_excludes() {
        let plain = DcOption::new(1, "10.0.0.1", 443);
        assert!(plain.is_probeable());

        let variants = [
            DcOption { ipv6: true, ..plain.clone() },
            DcOption { tcpo_only: true, ..plain.clone() },
            DcOption { is_static: true, ..plain.clone() },
            DcOption { cdn: true, ..plain.clone() },
            DcOption { media_only: true, ..plain.clone() },
        ];
        for dc in variants {
            assert!(!dc.is_probeable(), "{:?} should be excluded", dc.flags());
            assert_eq!(dc.flags().reasons().len(), 1);
        }
    }

    #[test]
    fn address_for_skips_excluded_options() {
        let config = RemoteConfig::new(vec![
            DcOption {
                media_only: true,
                ..DcOption::new(2, "10.0.0.9", 443)
            },
            DcOption::new(2, "10.0.0.2", 443),
            DcOption::new(3, "10.0.0.3", 80),
        ]);
        assert_eq!(
            config.address_for(2),
            Some(EndpointAddress::new("10.0.0.2", 443))
        );
        assert_eq!(config.address_for(4), None);
    }

    #[test]
    fn identity_debug_hides_hash() {
        let id = Identity::new(42, "secret-hash");
        let dbg = format!("{id:?}");
        assert!(dbg.contains("42"));
        assert!(!dbg.contains("secret-hash"));
    }
}
