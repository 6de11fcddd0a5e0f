//! # Trace records
//!
//! Parsing of the ftrace text format, as found in `trace_pipe`. A record
//! looks like:
//!
//! ```text
//!            bash-1234    [002] d..3.  5130.104573: sched_process_exec: filename=/bin/ls pid=1234 old_pid=1234
//!            bash-1234    [002] d..3.  5130.104320: my_probe: (__x64_sys_execve+0x0/0x50) arg0="/bin/ls"
//! ```

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

/// Record header: task, pid, optional tgid, cpu, optional flags, timestamp
/// and event name. The remaining part is the event body.
static RECORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?P<comm>.*?)-(?P<pid>\d+)\s+(?:\(\s*(?:\d+|-+)\)\s+)?\[(?P<cpu>\d+)\]\s+(?:[^\s:]+\s+)?(?P<secs>\d+)\.(?P<frac>\d+):\s+(?P<event>[^:\s]+):(?P<body>.*)$",
    )
    .unwrap()
});

/// `key=value` and `key="quoted value"` arguments in a record body.
static ARG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:^|\s)(?P<key>[A-Za-z_][\w.\[\]]*)=(?:"(?P<quoted>[^"]*)"|(?P<raw>\S*))"#)
        .unwrap()
});

/// Errors returned when a line can't be converted into a `TraceRecord`.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("Not a trace record: {0:?}")]
    Format(String),
    #[error("Invalid pid {0:?}")]
    Pid(String),
    #[error("Invalid cpu {0:?}")]
    Cpu(String),
    #[error("Invalid timestamp {0:?}")]
    Timestamp(String),
}

/// A single ftrace record, split into its fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceRecord {
    /// Name of the task, as printed by the kernel (can be truncated).
    pub comm: String,
    /// Process id.
    pub pid: i32,
    /// CPU the record was emitted on.
    pub cpu: u32,
    /// Trace clock timestamp, in nanoseconds.
    pub timestamp: u64,
    /// Event name token (probe or tracepoint name).
    pub event: String,
    /// Arguments found in the record body. Tokens not following the
    /// `key=value` form are ignored.
    pub args: BTreeMap<String, String>,
}

impl TraceRecord {
    /// Parse a raw `trace_pipe` line.
    pub fn from_line(line: &str) -> Result<TraceRecord, ParseError> {
        let caps = RECORD
            .captures(line)
            .ok_or_else(|| ParseError::Format(line.to_string()))?;

        let pid = &caps["pid"];
        let pid = pid
            .parse::<i32>()
            .map_err(|_| ParseError::Pid(pid.to_string()))?;
        let cpu = &caps["cpu"];
        let cpu = cpu
            .parse::<u32>()
            .map_err(|_| ParseError::Cpu(cpu.to_string()))?;
        let timestamp = parse_timestamp(&caps["secs"], &caps["frac"])?;

        let args = ARG
            .captures_iter(&caps["body"])
            .map(|arg| {
                let val = arg
                    .name("quoted")
                    .or_else(|| arg.name("raw"))
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                (arg["key"].to_string(), val.to_string())
            })
            .collect();

        Ok(TraceRecord {
            comm: caps["comm"].trim().to_string(),
            pid,
            cpu,
            timestamp,
            event: caps["event"].to_string(),
            args,
        })
    }
}

/// Convert a `<secs>.<fraction>` trace clock value to nanoseconds. The
/// fraction is usually microseconds but its width depends on the clock used.
fn parse_timestamp(secs: &str, frac: &str) -> Result<u64, ParseError> {
    let err = || ParseError::Timestamp(format!("{secs}.{frac}"));

    if frac.len() > 9 {
        return Err(err());
    }

    let secs = secs.parse::<u64>().map_err(|_| err())?;
    let frac = frac.parse::<u64>().map_err(|_| err())? * 10u64.pow(9 - frac.len() as u32);

    secs.checked_mul(1_000_000_000)
        .and_then(|ns| ns.checked_add(frac))
        .ok_or_else(err)
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn tracepoint_record() {
        let rec = TraceRecord::from_line(
            "            bash-1234    [002] d..3.  5130.104573: sched_process_exec: filename=/bin/ls pid=1234 old_pid=1234",
        )
        .unwrap();

        assert_eq!(rec.comm, "bash");
        assert_eq!(rec.pid, 1234);
        assert_eq!(rec.cpu, 2);
        assert_eq!(rec.timestamp, 5_130_104_573_000);
        assert_eq!(rec.event, "sched_process_exec");
        assert_eq!(rec.args.len(), 3);
        assert_eq!(rec.args["filename"], "/bin/ls");
        assert_eq!(rec.args["old_pid"], "1234");
    }

    #[test]
    fn kprobe_record() {
        let rec = TraceRecord::from_line(
            r#"           <...>-4242  [000] ...1.   88.000001: test_probe: (__x64_sys_execve+0x0/0x50) arg0="/usr/bin/git" arg1="log -p" arg2=(fault)"#,
        )
        .unwrap();

        assert_eq!(rec.comm, "<...>");
        assert_eq!(rec.pid, 4242);
        assert_eq!(rec.event, "test_probe");
        assert_eq!(rec.args["arg0"], "/usr/bin/git");
        assert_eq!(rec.args["arg1"], "log -p");
        assert_eq!(rec.args["arg2"], "(fault)");
        assert!(!rec.args.contains_key("__x64_sys_execve+0x0/0x50"));
    }

    #[test_case("gnome-shell-2010 [003] .... 1.5: sched_process_fork: parent_comm=gnome-shell", "gnome-shell", 2010 ; "dashed comm")]
    #[test_case("kworker/u8:2-77 [001] 10.000100: sched_process_exec: filename=x", "kworker/u8:2", 77 ; "no flags")]
    #[test_case("sshd-900 (  900) [000] d... 3.000000: sched_process_exec: filename=x", "sshd", 900 ; "tgid field")]
    #[test_case("Web Content-3377 [001] .N.. 7.1: sched_process_exec: filename=x", "Web Content", 3377 ; "comm with space")]
    fn record_header(line: &str, comm: &str, pid: i32) {
        let rec = TraceRecord::from_line(line).unwrap();
        assert_eq!(rec.comm, comm);
        assert_eq!(rec.pid, pid);
    }

    #[test_case("" ; "empty")]
    #[test_case("# tracer: nop" ; "comment")]
    #[test_case("bash-12 [000] d... 1.0 sched_process_exec filename=x" ; "missing separators")]
    #[test_case("bash [000] d... 1.0: sched_process_exec: filename=x" ; "missing pid")]
    fn invalid_record(line: &str) {
        assert!(matches!(
            TraceRecord::from_line(line),
            Err(ParseError::Format(_))
        ));
    }

    #[test]
    fn invalid_values() {
        assert_eq!(
            TraceRecord::from_line("bash-99999999999 [000] d... 1.0: ev: a=b"),
            Err(ParseError::Pid("99999999999".to_string()))
        );
        assert_eq!(
            TraceRecord::from_line("bash-1 [000] d... 1.0123456789: ev: a=b"),
            Err(ParseError::Timestamp("1.0123456789".to_string()))
        );
    }

    #[test_case("1", "5", 1_500_000_000 ; "short fraction")]
    #[test_case("0", "000001", 1_000 ; "microseconds")]
    #[test_case("2", "123456789", 2_123_456_789 ; "nanoseconds")]
    fn timestamps(secs: &str, frac: &str, ns: u64) {
        assert_eq!(parse_timestamp(secs, frac), Ok(ns));
    }
}
