use lb_core::ConfigError;
use std::str::FromStr;
use std::time::Duration;

/// Connection settings for the load balancer controller
#[derive(Clone, Debug)]
pub struct RestConfig {
    /// Base URL, e.g. `https://lb-controller.example.com`
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Sent as `X-Avi-Version` on every request
    pub api_version: String,
    pub tenant: String,
    pub insecure_skip_verify: bool,
    /// Objects per inventory page
    pub page_size: u32,
    pub timeout: Duration,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: "https://localhost".to_string(),
            username: "admin".to_string(),
            password: String::new(),
            api_version: "22.1.3".to_string(),
            tenant: "admin".to_string(),
            insecure_skip_verify: false,
            page_size: 100,
            timeout: Duration::from_secs(30),
        }
    }
}

impl RestConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let base_url = lookup("LB_CONTROLLER_URL").ok_or(ConfigError::Empty("LB_CONTROLLER_URL"))?;
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ConfigError::Empty("LB_CONTROLLER_URL"));
        }
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Invalid { name: "LB_CONTROLLER_URL", value: base_url });
        }

        Ok(Self {
            base_url,
            username: lookup("LB_USERNAME").unwrap_or(defaults.username),
            password: lookup("LB_PASSWORD").unwrap_or(defaults.password),
            api_version: lookup("LB_API_VERSION").unwrap_or(defaults.api_version),
            tenant: lookup("TENANT").unwrap_or(defaults.tenant),
            insecure_skip_verify: parse(&lookup, "LB_INSECURE_SKIP_VERIFY", false)?,
            page_size: parse(&lookup, "LB_PAGE_SIZE", defaults.page_size)?.max(1),
            timeout: Duration::from_secs(parse(&lookup, "REST_TIMEOUT", 30)?),
        })
    }
}

fn parse<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_from_lookup() {
        let config = RestConfig::from_lookup(lookup(&[
            ("LB_CONTROLLER_URL", "https://lb.example.com/"),
            ("LB_USERNAME", "ops"),
            ("LB_INSECURE_SKIP_VERIFY", "true"),
            ("LB_PAGE_SIZE", "25"),
        ]))
        .unwrap();
        assert_eq!(config.base_url, "https://lb.example.com");
        assert_eq!(config.username, "ops");
        assert!(config.insecure_skip_verify);
        assert_eq!(config.page_size, 25);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_url_is_required() {
        assert!(matches!(RestConfig::from_lookup(lookup(&[])), Err(ConfigError::Empty("LB_CONTROLLER_URL"))));
        assert!(matches!(
            RestConfig::from_lookup(lookup(&[("LB_CONTROLLER_URL", "lb.example.com")])),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let result = RestConfig::from_lookup(lookup(&[
            ("LB_CONTROLLER_URL", "https://lb"),
            ("LB_PAGE_SIZE", "many"),
        ]));
        assert!(matches!(result, Err(ConfigError::Invalid { name: "LB_PAGE_SIZE", .. })));
    }
}
