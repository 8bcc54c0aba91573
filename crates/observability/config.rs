use std::env;
use url::Url;

#[derive(Clone, Debug)]
pub(crate) struct ServiceContext {
    pub(crate) service_name: String,
    pub(crate) environment: String,
    pub(crate) component: String,
}

#[derive(Clone, Debug)]
pub(crate) struct ObservabilityConfig {
    pub(crate) service_context: ServiceContext,
    pub(crate) operator_webhook: Option<Url>,
    /// Collected while parsing and logged once tracing is up.
    pub(crate) warnings: Vec<String>,
}

impl ObservabilityConfig {
    pub(crate) fn from_env(component: &str) -> Self {
        let component = component.trim().to_string();

        let service_name = env_string("SERVICE_NAME")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| component.clone());

        let environment = env_string("STAGE")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "unknown".to_string());

        let (operator_webhook, warnings) = operator_webhook_from_env();

        Self {
            service_context: ServiceContext {
                service_name,
                environment,
                component,
            },
            operator_webhook,
            warnings,
        }
    }
}

fn operator_webhook_from_env() -> (Option<Url>, Vec<String>) {
    let mut warnings = Vec::new();

    if !env_bool("OPERATOR_NOTIFY_ENABLED").unwrap_or(true) {
        return (None, warnings);
    }

    let Some(raw) = env_string("OPERATOR_WEBHOOK_URL").filter(|v| !v.trim().is_empty()) else {
        return (None, warnings);
    };

    match Url::parse(raw.trim()) {
        Ok(url) => (Some(url), warnings),
        Err(err) => {
            // The URL embeds a secret; only the parse error is reported.
            warnings.push(format!(
                "OPERATOR_WEBHOOK_URL is set but invalid; operator alerts are log-only (parse error: {err})"
            ));
            (None, warnings)
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_bool(key: &str) -> Option<bool> {
    let raw = env::var(key).ok()?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}
