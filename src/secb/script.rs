//! The three-stage evaluation script run inside the sandbox.
//!
//! Each stage prints an entry banner (`Step N: <label>`) and a completion
//! banner (`SUCCESS: ...` or `FAIL_STEP: ...`). Log parsing downstream relies
//! on these exact strings to recover how far the script got, even when the
//! process is killed before it can print anything else.

use serde::{Deserialize, Serialize};

use super::config::EvalConfig;

/// Prefix of the banner printed when a stage fails.
pub const FAIL_STEP_PREFIX: &str = "FAIL_STEP:";

/// One of the three ordered evaluation stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Apply the candidate patch to the working tree.
    Apply,
    /// Build the project.
    Build,
    /// Run the proof-of-concept trigger.
    Reproduce,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 3] = [Stage::Apply, Stage::Build, Stage::Reproduce];

    /// 1-based position of the stage.
    pub fn number(self) -> u8 {
        match self {
            Stage::Apply => 1,
            Stage::Build => 2,
            Stage::Reproduce => 3,
        }
    }

    /// Label used in the banners.
    pub fn label(self) -> &'static str {
        match self {
            Stage::Apply => "Git apply",
            Stage::Build => "Compile",
            Stage::Reproduce => "Run PoC",
        }
    }

    /// Looks a stage up by its banner label.
    pub fn from_label(label: &str) -> Option<Stage> {
        Stage::ALL.into_iter().find(|s| s.label() == label)
    }

    /// Line printed when the stage starts, e.g. `Step 3: Run PoC`.
    pub fn entry_banner(self) -> String {
        format!("Step {}: {}", self.number(), self.label())
    }

    /// Line printed when the stage fails with `code`.
    pub fn failure_banner(self, code: &str) -> String {
        format!("{FAIL_STEP_PREFIX} {}; exit code={code}", self.label())
    }

    /// Line printed when the stage succeeds with `code`.
    pub fn success_banner(self, code: &str) -> String {
        format!("SUCCESS: {} passed; exit code={code}", self.label())
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Apply => write!(f, "apply"),
            Stage::Build => write!(f, "build"),
            Stage::Reproduce => write!(f, "reproduce"),
        }
    }
}

/// Marker printed after the reproduce stage with its raw exit code.
pub fn reproduce_exit_marker(code: i64) -> String {
    format!("{} exit code: {code}", Stage::Reproduce.label())
}

/// Parses a `FAIL_STEP: <label>; exit code=N` line into its stage.
pub fn parse_failure_banner(line: &str) -> Option<Stage> {
    let rest = line.trim().strip_prefix(FAIL_STEP_PREFIX)?;
    let label = rest.split(';').next()?.trim();
    Stage::from_label(label)
}

/// Renders the bash script executed in the sandbox.
///
/// Stages 1 and 2 abort the script with their own exit code on failure.
/// Stage 3 runs under `timeout` and the script exits with its code.
pub fn render_script(config: &EvalConfig) -> String {
    let mut script = String::from("\n");

    for stage in Stage::ALL {
        script.push_str(&format!("echo \"{}\"\n", stage.entry_banner()));
        match stage {
            Stage::Apply => script.push_str(&format!("{}\n", config.apply_command)),
            Stage::Build => script.push_str(&format!("{}\n", config.build_command)),
            Stage::Reproduce => script.push_str(&format!(
                "timeout {} {}\n",
                config.poc_timeout_secs, config.reproduce_command
            )),
        }
        script.push_str("ret=$?\n");
        if stage == Stage::Reproduce {
            script.push_str(&format!(
                "echo \"{} exit code: ${{ret}}\"\n",
                Stage::Reproduce.label()
            ));
        }
        script.push_str("if [ ${ret} -ne 0 ]; then\n");
        script.push_str(&format!("    echo \"{}\"\n", stage.failure_banner("${ret}")));
        script.push_str("    exit ${ret}\n");
        script.push_str("else\n");
        script.push_str(&format!("    echo \"{}\"\n", stage.success_banner("${ret}")));
        if stage == Stage::Reproduce {
            script.push_str("    exit 0\n");
        }
        script.push_str("fi\n\n");
    }

    script
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_banners() {
        assert_eq!(Stage::Apply.entry_banner(), "Step 1: Git apply");
        assert_eq!(Stage::Build.entry_banner(), "Step 2: Compile");
        assert_eq!(Stage::Reproduce.entry_banner(), "Step 3: Run PoC");
        assert_eq!(
            Stage::Build.failure_banner("2"),
            "FAIL_STEP: Compile; exit code=2"
        );
        assert_eq!(reproduce_exit_marker(124), "Run PoC exit code: 124");
    }

    #[test]
    fn test_parse_failure_banner() {
        assert_eq!(
            parse_failure_banner("FAIL_STEP: Git apply; exit code=1"),
            Some(Stage::Apply)
        );
        assert_eq!(
            parse_failure_banner("  FAIL_STEP: Run PoC; exit code=139\r"),
            Some(Stage::Reproduce)
        );
        assert_eq!(parse_failure_banner("FAIL_STEP: Lint; exit code=1"), None);
        assert_eq!(parse_failure_banner("SUCCESS: Compile passed"), None);
    }

    #[test]
    fn test_render_script_order_and_commands() {
        let script = render_script(&EvalConfig::default());

        let apply = script.find("secb patch").unwrap();
        let build = script.find("secb build").unwrap();
        let repro = script.find("timeout 10 secb repro").unwrap();
        assert!(apply < build && build < repro);

        assert!(script.contains("echo \"Step 1: Git apply\""));
        assert!(script.contains("echo \"FAIL_STEP: Compile; exit code=${ret}\""));
        assert!(script.contains("echo \"Run PoC exit code: ${ret}\""));
        assert!(script.trim_end().ends_with("fi"));
    }

    #[test]
    fn test_render_script_uses_configured_timeout() {
        let config = EvalConfig::default().with_poc_timeout_secs(42);
        let script = render_script(&config);
        assert!(script.contains("timeout 42 secb repro"));
        assert!(!script.contains("timeout 42 secb build"));
    }

    #[test]
    fn test_only_reproduce_stage_exits_zero_on_success() {
        let script = render_script(&EvalConfig::default());
        assert_eq!(script.matches("exit 0").count(), 1);
        assert_eq!(script.matches("exit ${ret}").count(), 3);
    }
}
