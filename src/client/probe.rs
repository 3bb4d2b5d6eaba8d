//! Remote system probe.
//!
//! SSH, Docker and kubectl targets have no local API for system details, so
//! their `info` runs a small shell script and parses its `key=value` output.

use serde::Serialize;

/// Shell script printing one `key=value` line per fact.
pub const PROBE_SCRIPT: &str = "echo \"os=$(uname -s 2>/dev/null)\"; \
echo \"kernel=$(uname -r 2>/dev/null)\"; \
echo \"arch=$(uname -m 2>/dev/null)\"; \
echo \"hostname=$(hostname 2>/dev/null || cat /etc/hostname 2>/dev/null)\"; \
echo \"distribution=$( (. /etc/os-release 2>/dev/null && echo \"$PRETTY_NAME\") )\"; \
echo \"shell=$SHELL\"";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SystemProbe {
    pub os: Option<String>,
    pub kernel: Option<String>,
    pub arch: Option<String>,
    pub hostname: Option<String>,
    pub distribution: Option<String>,
    pub shell: Option<String>,
}

impl SystemProbe {
    /// Parse probe output. Unknown keys and empty values are ignored.
    pub fn parse(output: &str) -> Self {
        let mut probe = SystemProbe::default();

        for line in output.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let value = Some(value.to_string());

            match key.trim() {
                "os" => probe.os = value,
                "kernel" => probe.kernel = value,
                "arch" => probe.arch = value,
                "hostname" => probe.hostname = value,
                "distribution" => probe.distribution = value,
                "shell" => probe.shell = value,
                _ => {}
            }
        }

        probe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_output() {
        let output = "os=Linux\nkernel=6.1.0-18-amd64\narch=x86_64\nhostname=build-01\n\
                      distribution=Debian GNU/Linux 12 (bookworm)\nshell=/bin/bash\n";
        let probe = SystemProbe::parse(output);

        assert_eq!(probe.os.as_deref(), Some("Linux"));
        assert_eq!(probe.kernel.as_deref(), Some("6.1.0-18-amd64"));
        assert_eq!(probe.arch.as_deref(), Some("x86_64"));
        assert_eq!(probe.hostname.as_deref(), Some("build-01"));
        assert_eq!(
            probe.distribution.as_deref(),
            Some("Debian GNU/Linux 12 (bookworm)")
        );
        assert_eq!(probe.shell.as_deref(), Some("/bin/bash"));
    }

    #[test]
    fn test_parse_skips_empty_and_garbage() {
        let probe = SystemProbe::parse("os=Linux\ndistribution=\nnoise\nextra=1\n");
        assert_eq!(probe.os.as_deref(), Some("Linux"));
        assert_eq!(probe.distribution, None);
        assert_eq!(probe.kernel, None);
    }

    #[tokio::test]
    async fn test_probe_script_runs_locally() {
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(PROBE_SCRIPT)
            .output()
            .await
            .unwrap();
        let probe = SystemProbe::parse(&String::from_utf8_lossy(&output.stdout));
        assert!(probe.os.is_some());
    }
}
