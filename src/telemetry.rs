use tracing_subscriber::EnvFilter;

use crate::config::Environment;

/// Installs the global subscriber. `RUST_LOG` overrides the default level.
pub fn init(environment: Environment) {
    let default_level = match environment {
        Environment::Production => "info,tower_http=info",
        Environment::Development => "debug,tower_http=debug,hyper=info,reqwest=info",
        Environment::Test => "warn",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let result = match environment {
        Environment::Production => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .try_init(),
        Environment::Development | Environment::Test => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .try_init(),
    };

    if let Err(e) = result {
        eprintln!("tracing subscriber already installed: {}", e);
    }
}
