use std::fmt;

/// Credential resolved from the environment. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// First variable in `names` holding a non-blank value.
    #[must_use]
    pub fn from_env(names: &[&str]) -> Option<Self> {
        names.iter().find_map(|name| {
            let value = std::env::var(name).ok()?;
            let value = value.trim();
            (!value.is_empty()).then(|| Self::new(value))
        })
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    fn secret_is_redacted() {
        let secret = Secret::new("sk-live-123");
        assert_eq!(format!("{secret:?}"), "[REDACTED]");
        assert_eq!(format!("{secret}"), "[REDACTED]");
        assert_eq!(secret.expose(), "sk-live-123");
    }

    #[test]
    #[serial]
    fn from_env_skips_blank_values() {
        unsafe {
            std::env::set_var("MEDRAG_TEST_SECRET_A", "  ");
            std::env::set_var("MEDRAG_TEST_SECRET_B", " key-b ");
        }
        let secret = Secret::from_env(&["MEDRAG_TEST_SECRET_A", "MEDRAG_TEST_SECRET_B"]);
        let missing = Secret::from_env(&["MEDRAG_TEST_SECRET_UNSET"]);
        unsafe {
            std::env::remove_var("MEDRAG_TEST_SECRET_A");
            std::env::remove_var("MEDRAG_TEST_SECRET_B");
        }
        assert_eq!(secret.unwrap().expose(), "key-b");
        assert!(missing.is_none());
    }
}
