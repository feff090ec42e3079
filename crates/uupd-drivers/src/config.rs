use crate::session::User;
use std::collections::HashMap;

/// Run-wide settings every driver is constructed from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitConfiguration {
    pub dry_run: bool,
    /// Running under continuous integration; the system driver starts disabled.
    pub ci: bool,
    /// Variables consulted for binary path overrides.
    pub environment: HashMap<String, String>,
}

impl InitConfiguration {
    /// Capture every `UUPD_*` variable of the current process.
    pub fn from_process_env(dry_run: bool, ci: bool) -> Self {
        let environment = std::env::vars()
            .filter(|(key, _)| key.starts_with("UUPD_"))
            .collect();
        Self {
            dry_run,
            ci,
            environment,
        }
    }
}

/// Descriptor of one driver's identity and run-time switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfiguration {
    pub title: &'static str,
    pub description: &'static str,
    /// Prefix for per-user contexts; only multi-user drivers have one.
    pub user_description: Option<&'static str>,
    pub enabled: bool,
    pub multi_user: bool,
    pub dry_run: bool,
    pub environment: HashMap<String, String>,
}

impl DriverConfiguration {
    pub fn single_user(
        title: &'static str,
        description: &'static str,
        init: &InitConfiguration,
    ) -> Self {
        Self {
            title,
            description,
            user_description: None,
            enabled: true,
            multi_user: false,
            dry_run: init.dry_run,
            environment: init.environment.clone(),
        }
    }

    pub fn multi_user(
        title: &'static str,
        description: &'static str,
        user_description: &'static str,
        init: &InitConfiguration,
    ) -> Self {
        Self {
            user_description: Some(user_description),
            multi_user: true,
            ..Self::single_user(title, description, init)
        }
    }

    /// Context label for the per-user pass, e.g. `Apps for User: alice`.
    pub fn user_context(&self, user: &User) -> String {
        match self.user_description {
            Some(prefix) => format!("{prefix} {}", user.name),
            None => format!("{} for User: {}", self.description, user.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_user_context() {
        let init = InitConfiguration::default();
        let config = DriverConfiguration::multi_user("Flatpak", "System Apps", "Apps for User:", &init);
        let alice = User {
            uid: 1000,
            name: "alice".to_owned(),
        };
        assert!(config.multi_user);
        assert!(config.enabled);
        assert_eq!(config.user_context(&alice), "Apps for User: alice");
    }

    #[test]
    fn single_user_inherits_dry_run() {
        let init = InitConfiguration {
            dry_run: true,
            ..InitConfiguration::default()
        };
        let config = DriverConfiguration::single_user("Brew", "CLI Apps", &init);
        assert!(config.dry_run);
        assert!(!config.multi_user);
        assert_eq!(config.user_description, None);
    }
}
