use std::env;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has an invalid value: {value}")]
    Invalid { var: &'static str, value: String },
}

/// One backend entry from `MIST_BACKENDS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSpec {
    pub index: usize,
    pub title: String,
    pub provider: String,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub api_url: String,
    pub api_token: Option<String>,
    pub backends: Vec<BackendSpec>,
}

impl WatchConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let poll_interval = match lookup("MIST_POLL_INTERVAL_SECS") {
            Some(raw) => parse_secs("MIST_POLL_INTERVAL_SECS", &raw)?,
            None => Duration::from_secs(10),
        };

        let raw_backends = lookup("MIST_BACKENDS").ok_or(ConfigError::Missing("MIST_BACKENDS"))?;
        let backends = parse_backends(&raw_backends, poll_interval)?;
        if backends.is_empty() {
            return Err(ConfigError::Missing("MIST_BACKENDS"));
        }

        Ok(Self {
            api_url: lookup("MIST_API_URL").unwrap_or_else(|| "http://localhost:6543".into()),
            api_token: lookup("MIST_API_TOKEN").filter(|t| !t.is_empty()),
            backends,
        })
    }
}

fn parse_secs(var: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::Invalid {
            var,
            value: raw.to_string(),
        }),
    }
}

/// Parse `index:title:provider[:interval_secs]` entries separated by commas.
fn parse_backends(raw: &str, default_interval: Duration) -> Result<Vec<BackendSpec>, ConfigError> {
    let invalid = |entry: &str| ConfigError::Invalid {
        var: "MIST_BACKENDS",
        value: entry.to_string(),
    };

    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
            let (index, title, provider, interval) = match parts.as_slice() {
                [index, title, provider] => (index, title, provider, None),
                [index, title, provider, interval] => (index, title, provider, Some(interval)),
                _ => return Err(invalid(entry)),
            };

            let index = index.parse::<usize>().map_err(|_| invalid(entry))?;
            if title.is_empty() || provider.is_empty() {
                return Err(invalid(entry));
            }
            let poll_interval = match interval {
                Some(secs) => parse_secs("MIST_BACKENDS", secs)?,
                None => default_interval,
            };

            Ok(BackendSpec {
                index,
                title: title.to_string(),
                provider: provider.to_string(),
                poll_interval,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<WatchConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WatchConfig::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[("MIST_BACKENDS", "0:EC2 US East:ec2_us_east")]).unwrap();

        assert_eq!(config.api_url, "http://localhost:6543");
        assert_eq!(config.api_token, None);
        assert_eq!(
            config.backends,
            vec![BackendSpec {
                index: 0,
                title: "EC2 US East".into(),
                provider: "ec2_us_east".into(),
                poll_interval: Duration::from_secs(10),
            }]
        );
    }

    #[test]
    fn test_per_backend_interval() {
        let config = config(&[
            ("MIST_BACKENDS", "0:EC2:ec2_us_east, 1:My Linode:linode:30,"),
            ("MIST_POLL_INTERVAL_SECS", "5"),
            ("MIST_API_URL", "https://mist.example.com"),
            ("MIST_API_TOKEN", "abc"),
        ])
        .unwrap();

        assert_eq!(config.api_url, "https://mist.example.com");
        assert_eq!(config.api_token.as_deref(), Some("abc"));
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.backends[0].poll_interval, Duration::from_secs(5));
        assert_eq!(config.backends[1].title, "My Linode");
        assert_eq!(config.backends[1].poll_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(config(&[]), Err(ConfigError::Missing("MIST_BACKENDS"))));
        assert!(matches!(
            config(&[("MIST_BACKENDS", " , ")]),
            Err(ConfigError::Missing("MIST_BACKENDS"))
        ));
        assert!(matches!(
            config(&[("MIST_BACKENDS", "x:EC2:ec2")]),
            Err(ConfigError::Invalid { var: "MIST_BACKENDS", .. })
        ));
        assert!(matches!(
            config(&[("MIST_BACKENDS", "0:EC2")]),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            config(&[("MIST_BACKENDS", "0:EC2:ec2"), ("MIST_POLL_INTERVAL_SECS", "0")]),
            Err(ConfigError::Invalid {
                var: "MIST_POLL_INTERVAL_SECS",
                ..
            })
        ));
    }
}
