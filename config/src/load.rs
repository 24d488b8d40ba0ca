use serde::de::DeserializeOwned;

use crate::environment::Environment;

/// Directory containing configuration files relative to the working directory.
const CONFIGURATION_DIR: &str = "configuration";

const BASE_CONFIG_FILE: &str = "base.yaml";

/// Prefix for environment variable overrides.
const ENV_PREFIX: &str = "APP";

const ENV_PREFIX_SEPARATOR: &str = "_";

/// Separator for nested keys in environment variables.
///
/// Example: `APP_CAPTURE__FLUSH_INTERVAL_SECS=30` sets `capture.flush_interval_secs`.
const ENV_SEPARATOR: &str = "__";

/// Loads layered configuration.
///
/// Sources are applied in this order, later ones overriding earlier ones:
/// 1. `configuration/base.yaml`
/// 2. `configuration/{environment}.yaml`
/// 3. environment variables prefixed with `APP_`
pub fn load_config<T>() -> Result<T, rust_cli_config::ConfigError>
where
    T: DeserializeOwned,
{
    let base_path = std::env::current_dir().map_err(|err| {
        rust_cli_config::ConfigError::Message(format!(
            "failed to determine the current directory: {err}"
        ))
    })?;
    let configuration_directory = base_path.join(CONFIGURATION_DIR);

    let environment = Environment::load().map_err(|err| {
        rust_cli_config::ConfigError::Message(format!("failed to parse APP_ENVIRONMENT: {err}"))
    })?;
    let environment_filename = format!("{environment}.yaml");

    let environment_source = rust_cli_config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR);

    let settings = rust_cli_config::Config::builder()
        .add_source(rust_cli_config::File::from(
            configuration_directory.join(BASE_CONFIG_FILE),
        ))
        .add_source(
            rust_cli_config::File::from(configuration_directory.join(environment_filename))
                .required(false),
        )
        // E.g. `APP_DESTINATION__SNOWFLAKE__WAREHOUSE=etl_wh` sets the Snowflake warehouse.
        .add_source(environment_source)
        .build()?;

    settings.try_deserialize::<T>()
}
