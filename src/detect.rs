//! Runtime platform detection.
//!
//! Looks at well-known environment variables and a few files to tell which
//! platforms the process runs on. Settings use the result to gate providers
//! (`when: aws`) and to turn on CI mode when `detect_ci` is set.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

const K8S_TOKEN: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Aws,
    Azure,
    Kubernetes,
    Docker,
    Ci,
}

impl Platform {
    pub const ALL: [Platform; 5] = [
        Platform::Aws,
        Platform::Azure,
        Platform::Kubernetes,
        Platform::Docker,
        Platform::Ci,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Aws => "aws",
            Platform::Azure => "azure",
            Platform::Kubernetes => "kubernetes",
            Platform::Docker => "docker",
            Platform::Ci => "ci",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown platform '{}'. Valid: aws, azure, kubernetes, docker, ci", s))
    }
}

/// What the process appears to be running on. Several flags can be set at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Runtime {
    pub aws: bool,
    pub azure: bool,
    pub kubernetes: bool,
    pub docker: bool,
    pub ci: bool,
}

impl Runtime {
    /// Inspect the live process environment and filesystem.
    pub fn detect() -> Self {
        Self::detect_with(
            |key| std::env::var(key).ok(),
            |path| std::fs::read_to_string(path).ok(),
        )
    }

    /// Detect from the given lookups. `read` returns `None` for missing or
    /// unreadable files.
    pub fn detect_with<E, R>(env: E, read: R) -> Self
    where
        E: Fn(&str) -> Option<String>,
        R: Fn(&Path) -> Option<String>,
    {
        let set = |key: &str| env(key).is_some_and(|v| !v.is_empty());
        let exists = |path: &str| read(Path::new(path)).is_some();

        let aws = ["AWS_EXECUTION_ENV", "AWS_LAMBDA_FUNCTION_NAME", "ECS_CONTAINER_METADATA_URI_V4"]
            .into_iter()
            .any(set)
            // EC2 hypervisor UUIDs start with "ec2".
            || read(Path::new("/sys/hypervisor/uuid")).is_some_and(|uuid| uuid.trim().starts_with("ec2"));

        let azure = [
            "WEBSITE_INSTANCE_ID",
            "MSI_ENDPOINT",
            "IDENTITY_ENDPOINT",
            "FUNCTIONS_WORKER_RUNTIME",
            "ACI_CONTAINER_GROUP",
        ]
        .into_iter()
        .any(set);

        let kubernetes = set("KUBERNETES_SERVICE_HOST") || exists(K8S_TOKEN);

        let docker = exists("/.dockerenv")
            || read(Path::new("/proc/self/cgroup"))
                .is_some_and(|cgroup| cgroup.contains("docker") || cgroup.contains("containerd"));

        let ci = env("CI").is_some_and(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            || ["GITHUB_ACTIONS", "GITLAB_CI", "BUILDKITE", "CIRCLECI", "JENKINS_URL", "TF_BUILD"]
                .into_iter()
                .any(set);

        Self {
            aws,
            azure,
            kubernetes,
            docker,
            ci,
        }
    }

    pub fn is(&self, platform: Platform) -> bool {
        match platform {
            Platform::Aws => self.aws,
            Platform::Azure => self.azure,
            Platform::Kubernetes => self.kubernetes,
            Platform::Docker => self.docker,
            Platform::Ci => self.ci,
        }
    }

    pub fn platforms(&self) -> Vec<Platform> {
        Platform::ALL.into_iter().filter(|p| self.is(*p)).collect()
    }

    /// Secret backends that usually make sense on the detected platforms.
    pub fn recommended_providers(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.azure {
            out.push("azure-keyvault");
        }
        if self.aws {
            out.extend(["aws-secrets-manager", "aws-ssm"]);
        }
        if self.kubernetes {
            out.push("kubernetes");
        }
        if self.docker {
            out.push("docker");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn runtime(vars: &[(&str, &str)], files: &[(&str, &str)]) -> Runtime {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        let files: HashMap<String, String> = files.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Runtime::detect_with(
            |key| vars.get(key).cloned(),
            |path| files.get(path.to_str()?).cloned(),
        )
    }

    #[test]
    fn test_nothing_detected() {
        let rt = runtime(&[("HOME", "/root")], &[]);
        assert_eq!(rt, Runtime::default());
        assert!(rt.platforms().is_empty());
        assert!(rt.recommended_providers().is_empty());
    }

    #[test]
    fn test_lambda_in_ci() {
        let rt = runtime(&[("AWS_LAMBDA_FUNCTION_NAME", "handler"), ("GITHUB_ACTIONS", "true")], &[]);
        assert_eq!(rt.platforms(), vec![Platform::Aws, Platform::Ci]);
        assert_eq!(rt.recommended_providers(), vec!["aws-secrets-manager", "aws-ssm"]);
    }

    #[test]
    fn test_file_markers() {
        let rt = runtime(
            &[],
            &[
                ("/sys/hypervisor/uuid", "ec2e1916-9099-7caf-fd21-012345abcdef\n"),
                (K8S_TOKEN, "eyJ..."),
                ("/proc/self/cgroup", "0::/system.slice/containerd.service\n"),
            ],
        );
        assert!(rt.aws && rt.kubernetes && rt.docker);
        assert!(!rt.azure);

        let xen = runtime(&[], &[("/sys/hypervisor/uuid", "4b2f1c3a-0000")]);
        assert!(!xen.aws);
    }

    #[test]
    fn test_ci_flag_values() {
        assert!(runtime(&[("CI", "true")], &[]).ci);
        assert!(runtime(&[("CI", "1")], &[]).ci);
        assert!(!runtime(&[("CI", "false")], &[]).ci);
        assert!(!runtime(&[("GITLAB_CI", "")], &[]).ci);
    }

    #[test]
    fn test_platform_parse() {
        assert_eq!("Azure".parse::<Platform>().unwrap(), Platform::Azure);
        assert!("gcp".parse::<Platform>().is_err());
        let parsed: Platform = serde_yaml::from_str("kubernetes").unwrap();
        assert_eq!(parsed, Platform::Kubernetes);
    }
}
