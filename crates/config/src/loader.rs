use std::{fmt::Write, path::Path, str::FromStr};

use anyhow::bail;
use indoc::indoc;
use serde::Deserialize;
use serde_dynamic_string::DynamicString;
use toml::Value;

use crate::Config;

/// Loads and validates the gateway configuration from a TOML file,
/// expanding `${ENV_VAR}`/`{{ env.VAR }}` references against the process
/// environment before deserializing.
pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref().to_path_buf();
    let content = std::fs::read_to_string(&path)?;
    let mut raw_config: Value = toml::from_str(&content)?;

    expand_dynamic_strings(&mut Vec::new(), &mut raw_config)?;

    let config = Config::deserialize(raw_config)?;
    validate_has_endpoints(&config)?;

    Ok(config)
}

pub(crate) fn validate_has_endpoints(config: &Config) -> anyhow::Result<()> {
    if !config.gateway.enabled {
        return Ok(());
    }

    let has_enabled_endpoint = config.gateway.endpoints.values().any(|endpoint| endpoint.enabled);

    if !config.gateway.endpoints.is_empty() && !has_enabled_endpoint {
        bail!(indoc! {r#"
            All configured endpoints are disabled. At least one endpoint must be enabled
            for the gateway to route any traffic.
        "#});
    }

    let protocols = &config.gateway.protocols;
    let any_protocol_enabled = protocols.openai_chat.enabled
        || protocols.openai_cli.enabled
        || protocols.claude_chat.enabled
        || protocols.claude_cli.enabled
        || protocols.gemini_chat.enabled
        || protocols.gemini_cli.enabled;

    if has_enabled_endpoint && !any_protocol_enabled {
        bail!(indoc! {r#"
            Gateway endpoints are configured but no client-facing protocol is enabled.
            At least one of [gateway.protocols.*] must be enabled to accept traffic.
        "#});
    }

    Ok(())
}

/// Recursively walks a parsed TOML document, replacing every string value
/// with its `${ENV_VAR}`/`{{ env.VAR }}` expansion.
fn expand_dynamic_strings<'a>(path: &mut Vec<Result<&'a str, usize>>, value: &'a mut Value) -> anyhow::Result<()> {
    match value {
        Value::String(s) => match DynamicString::<String>::from_str(s) {
            Ok(out) => *s = out.into_inner(),
            Err(err) => {
                let mut p = String::new();

                for segment in path {
                    match segment {
                        Ok(s) => {
                            p.push_str(s);
                            p.push('.');
                        }
                        Err(i) => write!(p, "[{i}]").unwrap(),
                    }
                }

                if p.ends_with('.') {
                    p.pop();
                }

                bail!("Failed to expand dynamic string at path '{p}': {err}");
            }
        },
        Value::Array(values) => {
            for (i, value) in values.iter_mut().enumerate() {
                path.push(Err(i));
                expand_dynamic_strings(path, value)?;
                path.pop();
            }
        }
        Value::Table(map) => {
            for (key, value) in map {
                path.push(Ok(key.as_str()));
                expand_dynamic_strings(path, value)?;
                path.pop();
            }
        }
        Value::Integer(_) | Value::Float(_) | Value::Boolean(_) | Value::Datetime(_) => (),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    #[test]
    fn env_var_expansion() {
        // SAFETY: test-only, no concurrent readers of this var in this process.
        unsafe { std::env::set_var("GATEWAY_TEST_API_KEY", "sk-expanded") };

        let mut value: Value = toml::from_str(indoc! {r#"
            [gateway.endpoints.main]
            api_key = "${GATEWAY_TEST_API_KEY}"
        "#})
        .unwrap();

        expand_dynamic_strings(&mut Vec::new(), &mut value).unwrap();

        let expanded = value["gateway"]["endpoints"]["main"]["api_key"].as_str().unwrap();
        assert_eq!(expanded, "sk-expanded");
    }

    #[test]
    fn missing_env_var_fails_with_path() {
        let mut value: Value = toml::from_str(indoc! {r#"
            [gateway.endpoints.main]
            api_key = "${GATEWAY_TEST_MISSING_VAR_XYZ}"
        "#})
        .unwrap();

        let err = expand_dynamic_strings(&mut Vec::new(), &mut value).unwrap_err();
        assert!(err.to_string().contains("gateway.endpoints.main.api_key"));
    }

    #[test]
    fn disabled_endpoints_only_is_an_error() {
        let config: Config = toml::from_str(indoc! {r#"
            [gateway]
            enabled = true

            [gateway.endpoints.main]
            enabled = false
        "#})
        .unwrap();

        assert!(validate_has_endpoints(&config).is_err());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[gateway.endpoints.main]\nbase_url = \"https://api.openai.com/v1\"").unwrap();

        let config = load(file.path()).unwrap();
        assert!(config.gateway.endpoints.contains_key("main"));
    }
}
