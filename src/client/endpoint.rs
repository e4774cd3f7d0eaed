//! Regional endpoint resolution for the Frontend Observability API.
//!
//! Frontend Observability is partitioned by region. The base URL for a stack
//! is derived from its region slug, with two kinds of exceptions: regions that
//! moved to a new cluster for stacks created after a cutover date, and legacy
//! regions whose API lives under a fixed host.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};

/// A region that moved to a new endpoint for stacks created after `cutoff`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cutover {
    /// Stacks created strictly after this instant use `url`.
    pub cutoff: DateTime<Utc>,
    /// The post-cutover endpoint.
    pub url: String,
}

/// Immutable endpoint tables plus the cloud API host used by the template.
#[derive(Debug, Clone)]
pub struct EndpointResolver {
    override_url: Option<String>,
    cloud_api_host: String,
    region_exceptions: HashMap<String, String>,
    cutovers: HashMap<String, Cutover>,
}

impl EndpointResolver {
    /// Resolver with the built-in Grafana Cloud tables.
    pub fn new(cloud_api_host: impl Into<String>) -> Self {
        Self::with_tables(cloud_api_host, default_region_exceptions(), default_cutovers())
    }

    /// Resolver with explicit tables.
    pub fn with_tables(
        cloud_api_host: impl Into<String>,
        region_exceptions: HashMap<String, String>,
        cutovers: HashMap<String, Cutover>,
    ) -> Self {
        Self {
            override_url: None,
            cloud_api_host: cloud_api_host.into(),
            region_exceptions,
            cutovers,
        }
    }

    /// Always resolve to `url`. Empty strings are ignored.
    pub fn with_override(mut self, url: Option<String>) -> Self {
        self.override_url = url.filter(|u| !u.is_empty());
        self
    }

    /// The host used by the templated URL, e.g. `grafana.net`.
    pub fn cloud_api_host(&self) -> &str {
        &self.cloud_api_host
    }

    /// Base URL for a stack in `region_slug` created at `created_at`.
    ///
    /// Precedence: override, cutover (strictly after the cutoff), static
    /// exception, then `https://faro-api-{region}.{host}/faro`.
    pub fn resolve(&self, region_slug: &str, created_at: DateTime<Utc>) -> String {
        if let Some(url) = &self.override_url {
            return url.clone();
        }

        if let Some(cutover) = self.cutovers.get(region_slug) {
            if created_at > cutover.cutoff {
                return cutover.url.clone();
            }
        }

        if let Some(url) = self.region_exceptions.get(region_slug) {
            return url.clone();
        }

        format!("https://faro-api-{}.{}/faro", region_slug, self.cloud_api_host)
    }
}

/// Legacy regions with a fixed endpoint.
pub fn default_region_exceptions() -> HashMap<String, String> {
    [
        ("au", "https://faro-api-prod-au-southeast-0.grafana.net/faro"),
        ("eu", "https://faro-api-prod-eu-west-0.grafana.net/faro"),
        ("us-azure", "https://faro-api-prod-us-central-7.grafana.net/faro"),
        ("us", "https://faro-api-prod-us-central-0.grafana.net/faro"),
    ]
    .into_iter()
    .map(|(region, url)| (region.to_string(), url.to_string()))
    .collect()
}

/// Regions that moved cluster for newer stacks.
pub fn default_cutovers() -> HashMap<String, Cutover> {
    let mut cutovers = HashMap::new();
    if let Some(cutoff) = Utc.with_ymd_and_hms(2024, 12, 18, 0, 0, 0).single() {
        cutovers.insert(
            "prod-us-east-0".to_string(),
            Cutover {
                cutoff,
                url: "https://faro-api-prod-us-east-2.grafana.net/faro".to_string(),
            },
        );
    }
    cutovers
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn cutoff() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 12, 18, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_override_wins_over_everything() {
        let resolver = EndpointResolver::new("grafana.net")
            .with_override(Some("http://localhost:8080/faro".to_string()));

        assert_eq!(resolver.resolve("us", cutoff()), "http://localhost:8080/faro");
        assert_eq!(
            resolver.resolve("prod-us-east-0", cutoff() + Duration::days(1)),
            "http://localhost:8080/faro"
        );
    }

    #[test]
    fn test_empty_override_is_ignored() {
        let resolver = EndpointResolver::new("grafana.net").with_override(Some(String::new()));
        assert_eq!(
            resolver.resolve("eu", cutoff()),
            "https://faro-api-prod-eu-west-0.grafana.net/faro"
        );
    }

    #[test]
    fn test_cutover_boundary_is_strict() {
        let resolver = EndpointResolver::new("grafana.net");

        assert_eq!(
            resolver.resolve("prod-us-east-0", cutoff()),
            "https://faro-api-prod-us-east-0.grafana.net/faro"
        );
        assert_eq!(
            resolver.resolve("prod-us-east-0", cutoff() + Duration::nanoseconds(1)),
            "https://faro-api-prod-us-east-2.grafana.net/faro"
        );
        assert_eq!(
            resolver.resolve("prod-us-east-0", cutoff() - Duration::days(30)),
            "https://faro-api-prod-us-east-0.grafana.net/faro"
        );
    }

    #[test]
    fn test_static_exceptions() {
        let resolver = EndpointResolver::new("grafana.net");
        let cases = [
            ("au", "https://faro-api-prod-au-southeast-0.grafana.net/faro"),
            ("eu", "https://faro-api-prod-eu-west-0.grafana.net/faro"),
            ("us-azure", "https://faro-api-prod-us-central-7.grafana.net/faro"),
            ("us", "https://faro-api-prod-us-central-0.grafana.net/faro"),
        ];
        for (region, expected) in cases {
            assert_eq!(resolver.resolve(region, cutoff()), expected, "region {region}");
        }
    }

    #[test]
    fn test_template_uses_cloud_host() {
        let resolver = EndpointResolver::new("grafana-dev.net");
        assert_eq!(
            resolver.resolve("dev-eu-west-2", cutoff()),
            "https://faro-api-dev-eu-west-2.grafana-dev.net/faro"
        );
    }

    #[test]
    fn test_exact_match_only() {
        let resolver = EndpointResolver::new("grafana.net");
        assert_eq!(
            resolver.resolve("US", cutoff()),
            "https://faro-api-US.grafana.net/faro"
        );
    }

    #[test]
    fn test_injected_tables() {
        let mut exceptions = HashMap::new();
        exceptions.insert("lab".to_string(), "https://lab.example/faro".to_string());
        let mut cutovers = HashMap::new();
        cutovers.insert(
            "lab".to_string(),
            Cutover {
                cutoff: cutoff(),
                url: "https://lab-2.example/faro".to_string(),
            },
        );
        let resolver = EndpointResolver::with_tables("example", exceptions, cutovers);

        assert_eq!(resolver.resolve("lab", cutoff()), "https://lab.example/faro");
        assert_eq!(
            resolver.resolve("lab", cutoff() + Duration::seconds(1)),
            "https://lab-2.example/faro"
        );
        assert_eq!(resolver.resolve("us", cutoff()), "https://faro-api-us.example/faro");
    }
}
