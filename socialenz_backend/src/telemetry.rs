use crate::config::Environment;
use tracing_subscriber::EnvFilter;

fn default_directives(environment: Environment) -> &'static str {
    match environment {
        Environment::Development => "socialenz_backend=debug,tower_http=debug",
        Environment::Production => "socialenz_backend=info,tower_http=warn",
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over the per-environment
/// default. Repeat calls are no-ops.
pub fn init_tracing(environment: Environment) {
    let env_filter = std::env::var("RUST_LOG")
        .map(EnvFilter::new)
        .unwrap_or_else(|_| EnvFilter::new(default_directives(environment)));
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_target(environment.is_development())
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn development_logs_more_than_production() {
        assert!(default_directives(Environment::Development).contains("debug"));
        assert!(!default_directives(Environment::Production).contains("debug"));
        init_tracing(Environment::Production);
        init_tracing(Environment::Development);
    }

    #[test]
    fn config_warnings_are_visible_once_tracing_is_up() {
        init_tracing(Environment::from_env());
        assert!(tracing::enabled!(
            target: "socialenz_backend::config",
            tracing::Level::WARN
        ));
    }
}
