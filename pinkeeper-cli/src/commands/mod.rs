//! Command handlers -- one module per subcommand

pub mod audit;
pub mod config;
pub mod sync;

use pinkeeper_core::config::{DepPaths, PinkeeperConfig};

use crate::cli::{ProviderArgs, WorkspaceArgs};

/// Apply workspace flags on top of file and env configuration.
pub(crate) fn apply_workspace_args(config: &mut PinkeeperConfig, args: &WorkspaceArgs) {
    if let Some(root) = &args.root {
        config.workspace.root = root.display().to_string();
    }
    if let Some(dep_paths) = &args.dep_paths {
        config.workspace.dep_paths = Some(DepPaths::from_csv(dep_paths));
    }
    config.workspace.ignore.extend(args.ignore.iter().cloned());
    if args.no_dev {
        config.workspace.include_dev = false;
    }
}

/// Apply provider flags. Naming providers implies the scan is wanted.
pub(crate) fn apply_provider_args(config: &mut PinkeeperConfig, args: &ProviderArgs) {
    if !args.providers.is_empty() {
        config
            .security
            .set_provider_ids(args.providers.iter().map(|s| s.trim()));
        config.security.enabled = true;
    }
    if let Some(severity) = &args.severity {
        config.security.severity_threshold = severity.clone();
    }
    if let Some(timeout) = args.timeout {
        config.security.timeout_secs = timeout;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_workspace_flags_override_config() {
        let mut config = PinkeeperConfig::default();
        config.workspace.ignore = vec!["fixtures/**".to_owned()];

        apply_workspace_args(
            &mut config,
            &WorkspaceArgs {
                root: Some(PathBuf::from("repo")),
                dep_paths: Some("apps/*, packages/*".to_owned()),
                ignore: vec!["packages/legacy".to_owned()],
                no_dev: true,
            },
        );

        assert_eq!(config.workspace.root, "repo");
        assert_eq!(
            config.workspace.dep_paths,
            Some(DepPaths::Globs(vec!["apps/*".to_owned(), "packages/*".to_owned()]))
        );
        assert_eq!(config.workspace.ignore, vec!["fixtures/**", "packages/legacy"]);
        assert!(!config.workspace.include_dev);
    }

    #[test]
    fn test_provider_flags_enable_security() {
        let mut config = PinkeeperConfig::default();
        assert!(!config.security.enabled);

        apply_provider_args(
            &mut config,
            &ProviderArgs {
                providers: vec!["github".to_owned(), "offline".to_owned()],
                severity: Some("critical".to_owned()),
                timeout: Some(5),
            },
        );

        assert!(config.security.enabled);
        let ids: Vec<&str> = config.security.providers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["github", "offline"]);
        assert_eq!(config.security.severity_threshold, "critical");
        assert_eq!(config.security.timeout_secs, 5);
    }
}
