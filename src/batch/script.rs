// src/batch/script.rs

//! Job-wrapper protocol.
//!
//! The wrapper runs the job command, then appends exactly one terminal
//! `Pass`/`Fail` event to every participant's status log. The event's
//! trailing free text is the content of `$WAREHOUSE_MESSAGE_FILE` if the
//! command wrote one, and empty otherwise.

use std::fmt::Write as _;
use std::path::PathBuf;

/// Environment variable naming the message file inside the job.
pub const MESSAGE_FILE_ENV: &str = "WAREHOUSE_MESSAGE_FILE";

/// Scheduler directives emitted as `#SBATCH` lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directives {
    pub partition: Option<String>,
    pub account: Option<String>,
    pub time_limit: Option<String>,
    /// Directory for the scheduler's stdout/stderr capture.
    pub output_dir: Option<PathBuf>,
}

pub struct WrapperSpec<'a> {
    pub name: &'a str,
    pub command: &'a str,
    /// Major and minor of the terminal event, e.g. `POSTPROCESS`, `ClimoGen`.
    pub major: &'a str,
    pub minor: &'a str,
    pub status_logs: &'a [PathBuf],
    pub directives: &'a Directives,
}

/// Sets `$ts` to a status-log timestamp. `%6N` is a GNU extension; other
/// `date` implementations echo it back, and then the second is padded with
/// `999999` so the terminal event still sorts after an Engaged event written
/// earlier in the same second.
const TIMESTAMP_SNIPPET: &str = r#"ts="$(date -u +%Y%m%d_%H%M%S_%6N)"
case "$ts" in
    *_[0-9][0-9][0-9][0-9][0-9][0-9]) ;;
    *) ts="$(date -u +%Y%m%d_%H%M%S)_999999" ;;
esac
"#;

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

pub fn render_wrapper(spec: &WrapperSpec<'_>) -> String {
    let d = spec.directives;
    let mut out = String::from("#!/bin/sh\n");
    let _ = writeln!(out, "#SBATCH --job-name={}", spec.name);
    if let Some(p) = &d.partition {
        let _ = writeln!(out, "#SBATCH --partition={p}");
    }
    if let Some(a) = &d.account {
        let _ = writeln!(out, "#SBATCH --account={a}");
    }
    if let Some(t) = &d.time_limit {
        let _ = writeln!(out, "#SBATCH --time={t}");
    }
    if let Some(dir) = &d.output_dir {
        let _ = writeln!(out, "#SBATCH --output={}/{}.%j.out", dir.display(), spec.name);
    }

    let _ = writeln!(
        out,
        "\n{MESSAGE_FILE_ENV}=\"${{TMPDIR:-/tmp}}/{}.$$.msg\"\nexport {MESSAGE_FILE_ENV}\nrm -f \"${MESSAGE_FILE_ENV}\"\n",
        spec.name
    );
    let _ = writeln!(out, "(\n{}\n)\nrc=$?\n", spec.command.trim_end());
    out.push_str("if [ \"$rc\" -eq 0 ]; then verb=Pass; else verb=Fail; fi\n");
    let _ = writeln!(
        out,
        "msg=\"\"\nif [ -f \"${MESSAGE_FILE_ENV}\" ]; then\n    msg=\"$(tr '\\n:' ' ^' < \"${MESSAGE_FILE_ENV}\")\"\n    rm -f \"${MESSAGE_FILE_ENV}\"\nfi"
    );
    out.push_str(TIMESTAMP_SNIPPET);
    for log in spec.status_logs {
        let _ = writeln!(
            out,
            "printf 'STAT:%s:{}:{}:%s:%s\\n' \"$ts\" \"$verb\" \"$msg\" >> {}",
            spec.major,
            spec.minor,
            quote(&log.display().to_string())
        );
    }
    out.push_str("exit \"$rc\"\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Timestamp;

    #[test]
    fn one_terminal_append_per_participant() {
        let logs = vec![PathBuf::from("/status/a.status"), PathBuf::from("/status/it's.status")];
        let directives = Directives {
            partition: Some("debug".into()),
            ..Default::default()
        };
        let script = render_wrapper(&WrapperSpec {
            name: "ClimoGen-a",
            command: "echo hi",
            major: "POSTPROCESS",
            minor: "ClimoGen",
            status_logs: &logs,
            directives: &directives,
        });

        assert!(script.starts_with("#!/bin/sh\n#SBATCH --job-name=ClimoGen-a\n#SBATCH --partition=debug\n"));
        assert!(!script.contains("--account"));
        assert_eq!(script.matches("STAT:%s:POSTPROCESS:ClimoGen:%s:%s").count(), 2);
        assert!(script.contains(r"'/status/it'\''s.status'"));
        assert!(script.trim_end().ends_with("exit \"$rc\""));
        assert!(script.contains(TIMESTAMP_SNIPPET));
    }

    #[test]
    fn timestamp_without_microsecond_support_still_parses() {
        // Stand in for a `date` that prints `%6N` literally.
        let snippet = TIMESTAMP_SNIPPET.replacen(
            "ts=\"$(date -u +%Y%m%d_%H%M%S_%6N)\"",
            "ts=\"$(date -u +%Y%m%d_%H%M%S)_6N\"",
            1,
        );
        assert_ne!(snippet, TIMESTAMP_SNIPPET);
        for script in [TIMESTAMP_SNIPPET.to_string(), snippet] {
            let out = std::process::Command::new("sh")
                .arg("-c")
                .arg(format!("{script}printf '%s' \"$ts\""))
                .output()
                .unwrap();
            let ts = String::from_utf8(out.stdout).unwrap();
            assert!(Timestamp::parse(&ts).is_some(), "{ts}");
        }
    }
}
