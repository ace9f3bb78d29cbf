use clap::Args;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_CURRENCY: &str = "USD";

/// Provider calls made while a claim is held: charge, transfer and a possible refund.
const CALLS_PER_CLAIM: u32 = 3;

/// Settings for the payment provider facade.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Secret key of the live provider. Without it the mock provider is used.
    pub live_api_key: Option<String>,
    pub currency: String,
    /// Upper bound for a single provider call. Expiry counts as failure.
    pub timeout: Duration,
    pub mock_charge_latency: Duration,
    pub mock_refund_latency: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            live_api_key: None,
            currency: DEFAULT_CURRENCY.to_string(),
            timeout: Duration::from_secs(30),
            mock_charge_latency: Duration::from_millis(1500),
            mock_refund_latency: Duration::from_millis(800),
        }
    }
}

impl GatewaySettings {
    /// Mock provider without simulated latency.
    pub fn instant() -> Self {
        Self {
            mock_charge_latency: Duration::ZERO,
            mock_refund_latency: Duration::ZERO,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub gateway: GatewaySettings,
    /// How long an external payment claim blocks other attempts on the same invoice.
    pub claim_ttl: Duration,
    /// Prefix of idempotency keys derived for callers that supply none.
    pub idempotency_scope: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gateway: GatewaySettings::default(),
            claim_ttl: Duration::from_secs(15 * 60),
            idempotency_scope: "IDEM".to_string(),
        }
    }
}

/// Command-line and environment configuration, flattened into the binary's CLI.
#[derive(Args, Debug, Clone, Default)]
pub struct SettingsArgs {
    /// Secret key for the live payment provider
    #[arg(long, env = "STRIPE_SECRET_KEY", hide_env_values = true)]
    pub stripe_secret_key: Option<String>,

    /// Currency used for external charges
    #[arg(long, env = "RENTLEDGER_CURRENCY")]
    pub currency: Option<String>,

    /// Timeout for a single payment provider call, in milliseconds
    #[arg(long, env = "RENTLEDGER_GATEWAY_TIMEOUT_MS")]
    pub gateway_timeout_ms: Option<u64>,

    /// Simulated latency of the mock provider, in milliseconds
    #[arg(long, env = "RENTLEDGER_MOCK_LATENCY_MS")]
    pub mock_latency_ms: Option<u64>,

    /// Lifetime of an in-flight payment claim, in seconds
    #[arg(long, env = "RENTLEDGER_CLAIM_TTL_SECS")]
    pub claim_ttl_secs: Option<u64>,
}

impl SettingsArgs {
    pub fn into_settings(self) -> Settings {
        let mut settings = Settings::default();
        settings.gateway.live_api_key = self.stripe_secret_key.filter(|k| !k.trim().is_empty());
        if let Some(currency) = self.currency {
            settings.gateway.currency = currency.to_uppercase();
        }
        if let Some(ms) = self.gateway_timeout_ms {
            settings.gateway.timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.mock_latency_ms {
            settings.gateway.mock_charge_latency = Duration::from_millis(ms);
            settings.gateway.mock_refund_latency = Duration::from_millis(ms);
        }
        if let Some(secs) = self.claim_ttl_secs {
            settings.claim_ttl = Duration::from_secs(secs);
        }
        settings.enforce_claim_floor();
        settings
    }
}

impl Settings {
    /// Shortest claim lifetime that still outlives every provider call of one attempt.
    pub fn min_claim_ttl(&self) -> Duration {
        self.gateway.timeout.saturating_mul(CALLS_PER_CLAIM)
    }

    /// Raises `claim_ttl` to [`Settings::min_claim_ttl`]; a claim must not expire while
    /// its charge can still be in flight.
    pub fn enforce_claim_floor(&mut self) {
        let floor = self.min_claim_ttl();
        if self.claim_ttl < floor {
            warn!(
                claim_ttl_ms = self.claim_ttl.as_millis() as u64,
                floor_ms = floor.as_millis() as u64,
                "claim TTL is shorter than the gateway calls it guards, raising it"
            );
            self.claim_ttl = floor;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = SettingsArgs::default().into_settings();
        assert_eq!(settings.gateway.currency, "USD");
        assert!(settings.gateway.live_api_key.is_none());
        assert_eq!(settings.gateway.mock_charge_latency, Duration::from_millis(1500));
        assert_eq!(settings.claim_ttl, Duration::from_secs(900));
    }

    #[test]
    fn test_overrides() {
        let args = SettingsArgs {
            stripe_secret_key: Some("   ".into()),
            currency: Some("eur".into()),
            gateway_timeout_ms: Some(250),
            mock_latency_ms: Some(0),
            claim_ttl_secs: Some(5),
        };
        let settings = args.into_settings();
        assert!(settings.gateway.live_api_key.is_none());
        assert_eq!(settings.gateway.currency, "EUR");
        assert_eq!(settings.gateway.timeout, Duration::from_millis(250));
        assert_eq!(settings.gateway.mock_refund_latency, Duration::ZERO);
        assert_eq!(settings.claim_ttl, Duration::from_secs(5));
    }

    #[test]
    fn test_claim_ttl_outlives_gateway_calls() {
        let args = SettingsArgs {
            gateway_timeout_ms: Some(10_000),
            claim_ttl_secs: Some(5),
            ..SettingsArgs::default()
        };
        let settings = args.into_settings();
        assert_eq!(settings.claim_ttl, Duration::from_secs(30));

        let args = SettingsArgs {
            claim_ttl_secs: Some(0),
            ..SettingsArgs::default()
        };
        let settings = args.into_settings();
        assert!(settings.claim_ttl > settings.gateway.timeout);
        assert_eq!(settings.claim_ttl, settings.min_claim_ttl());
    }
}
