//! Compiled ignore lists
//!
//! Built from the raw configuration strings during verification. Invalid
//! entries are configuration errors and keep the feeder disabled.

use ipnet::IpNet;
use regex::Regex;
use std::net::IpAddr;

use crate::config::{ConfigError, FeederConfig};

/// Compiled ignore lists. Built once when the configuration is verified
/// and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    pub networks: Vec<IpNet>,
    pub url_patterns: Vec<Regex>,
    pub user_agents: Vec<String>,
}

impl IgnoreRules {
    pub fn compile(config: &FeederConfig) -> Result<Self, ConfigError> {
        let networks = config
            .ignore_ips
            .iter()
            .map(|entry| parse_network(entry))
            .collect::<Result<Vec<_>, _>>()?;

        let url_patterns = config
            .ignore_urls
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| ConfigError::InvalidIgnoreUrl {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            networks,
            url_patterns,
            user_agents: config.ignore_user_agents.clone(),
        })
    }

    pub fn ignores_ip(&self, ip: IpAddr) -> bool {
        self.networks.iter().any(|net| net.contains(&ip))
    }

    /// Case-sensitive substring match against the ignore list.
    pub fn ignores_user_agent(&self, user_agent: &str) -> bool {
        self.user_agents
            .iter()
            .any(|ignored| user_agent.contains(ignored.as_str()))
    }

    pub fn ignores_url(&self, url: &str) -> bool {
        self.url_patterns.iter().any(|re| re.is_match(url))
    }
}

/// Parse a CIDR range; a bare address becomes a single-host network.
fn parse_network(entry: &str) -> Result<IpNet, ConfigError> {
    let entry = entry.trim();
    entry
        .parse::<IpNet>()
        .or_else(|err| entry.parse::<IpAddr>().map(IpNet::from).map_err(|_| err))
        .map_err(|source| ConfigError::InvalidIgnoreIp {
            entry: entry.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(ips: &[&str], urls: &[&str]) -> FeederConfig {
        FeederConfig {
            ignore_ips: ips.iter().map(|s| s.to_string()).collect(),
            ignore_urls: urls.iter().map(|s| s.to_string()).collect(),
            ..FeederConfig::default()
        }
    }

    #[test]
    fn test_bare_ipv4_is_host_prefix() {
        let rules = IgnoreRules::compile(&config_with(&["10.0.0.5"], &[])).unwrap();
        assert_eq!(rules.networks[0].to_string(), "10.0.0.5/32");
        assert!(rules.ignores_ip("10.0.0.5".parse().unwrap()));
        assert!(!rules.ignores_ip("10.0.0.6".parse().unwrap()));
    }

    #[test]
    fn test_bare_ipv6_is_host_prefix() {
        let rules = IgnoreRules::compile(&config_with(&["2001:db8::1"], &[])).unwrap();
        assert_eq!(rules.networks[0].prefix_len(), 128);
    }

    #[test]
    fn test_cidr_range_contains() {
        let rules = IgnoreRules::compile(&config_with(&["192.168.0.0/16"], &[])).unwrap();
        assert!(rules.ignores_ip("192.168.44.3".parse().unwrap()));
        assert!(!rules.ignores_ip("192.169.0.1".parse().unwrap()));
    }

    #[test]
    fn test_invalid_ip_is_config_error() {
        let err = IgnoreRules::compile(&config_with(&["10.0.0.300"], &[])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidIgnoreIp { ref entry, .. } if entry == "10.0.0.300"));
    }

    #[test]
    fn test_invalid_url_pattern_is_config_error() {
        let err = IgnoreRules::compile(&config_with(&[], &["/admin/("])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidIgnoreUrl { .. }));
    }

    #[test]
    fn test_user_agent_match_is_case_sensitive() {
        let rules = IgnoreRules {
            user_agents: vec!["Googlebot".to_string()],
            ..IgnoreRules::default()
        };
        assert!(rules.ignores_user_agent("Mozilla/5.0 (compatible; Googlebot/2.1)"));
        assert!(!rules.ignores_user_agent("mozilla/5.0 (compatible; googlebot/2.1)"));
    }
}
