use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::env;

static ENV_VAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid env var pattern"));

/// Expand environment variables in a string using ${VAR_NAME} syntax.
/// Unset variables are left verbatim.
pub fn expand_env_var_in_string(value: &str) -> String {
    ENV_VAR_PATTERN
        .replace_all(value, |caps: &regex::Captures| {
            env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

pub fn expand_env_vars(env: &HashMap<String, String>) -> HashMap<String, String> {
    env.iter()
        .map(|(key, value)| (key.clone(), expand_env_var_in_string(value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expands_set_variable() {
        env::set_var("TOOLCHAT_TEST_EXPAND", "value");
        assert_eq!(
            expand_env_var_in_string("a-${TOOLCHAT_TEST_EXPAND}-b"),
            "a-value-b"
        );
    }

    #[test]
    fn test_unset_variable_is_kept() {
        assert_eq!(
            expand_env_var_in_string("${TOOLCHAT_TEST_SURELY_UNSET_42}"),
            "${TOOLCHAT_TEST_SURELY_UNSET_42}"
        );
    }

    #[test]
    fn test_replacement_is_not_rescanned() {
        env::set_var("TOOLCHAT_TEST_NESTED", "${HOME}");
        assert_eq!(expand_env_var_in_string("${TOOLCHAT_TEST_NESTED}"), "${HOME}");
    }
}
