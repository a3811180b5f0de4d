use std::collections::BTreeMap;

use crate::config::Settings;

/// Source of per-command configuration defaults
pub trait ConfigDefaults: Send + Sync {
    /// Values configured for `command`, keyed by parameter name.
    fn values_with_prefix(&self, command: &str) -> BTreeMap<String, String>;
}

/// `[commands.<command>]` tables from the loaded settings.
///
/// Table and key names are compared without case, since the config crate
/// lowercases keys coming from the environment.
#[derive(Debug, Clone, Default)]
pub struct SettingsDefaults {
    tables: BTreeMap<String, BTreeMap<String, String>>,
}

impl SettingsDefaults {
    pub fn new(tables: BTreeMap<String, BTreeMap<String, String>>) -> Self {
        let tables = tables
            .into_iter()
            .map(|(command, values)| {
                let values = values
                    .into_iter()
                    .map(|(k, v)| (k.to_ascii_lowercase(), v))
                    .collect();
                (command.to_ascii_lowercase(), values)
            })
            .collect();
        Self { tables }
    }

    /// Builds defaults from settings, seeding `purgehistory.retentiondays`
    /// from `scheduler.history_retention_days` unless it is set explicitly.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut defaults = Self::new(settings.commands.clone());
        defaults
            .tables
            .entry("purgehistory".to_string())
            .or_default()
            .entry("retentiondays".to_string())
            .or_insert_with(|| settings.scheduler.history_retention_days.to_string());
        defaults
    }
}

impl ConfigDefaults for SettingsDefaults {
    fn values_with_prefix(&self, command: &str) -> BTreeMap<String, String> {
        self.tables
            .get(&command.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_ignores_case() {
        let mut tables = BTreeMap::new();
        tables.insert(
            "Shell".to_string(),
            BTreeMap::from([("WorkingDirectory".to_string(), "/srv".to_string())]),
        );
        let defaults = SettingsDefaults::new(tables);

        let values = defaults.values_with_prefix("SHELL");
        assert_eq!(values.get("workingdirectory").map(String::as_str), Some("/srv"));
        assert!(defaults.values_with_prefix("echo").is_empty());
    }

    #[test]
    fn test_retention_seeded_from_scheduler() {
        let mut settings = Settings::default();
        settings.scheduler.history_retention_days = 7;
        let defaults = SettingsDefaults::from_settings(&settings);
        assert_eq!(
            defaults.values_with_prefix("PurgeHistory").get("retentiondays").map(String::as_str),
            Some("7")
        );

        settings.commands.insert(
            "purgehistory".to_string(),
            BTreeMap::from([("retentiondays".to_string(), "90".to_string())]),
        );
        let defaults = SettingsDefaults::from_settings(&settings);
        assert_eq!(
            defaults.values_with_prefix("purgehistory").get("retentiondays").map(String::as_str),
            Some("90")
        );
    }
}
