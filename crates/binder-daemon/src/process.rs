use std::process::Command;
use std::thread;
use std::time::Duration;
use tracing::debug;

const GRACE_STEP: Duration = Duration::from_millis(100);
const GRACE_CHECKS: u32 = 30;

/// Verify if a process with the given PID is running
#[cfg(unix)]
pub fn verify_process_running(pid: u32) -> bool {
    // kill -0 only checks that the process exists
    Command::new("kill")
        .args(["-0", &pid.to_string()])
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(windows)]
pub fn verify_process_running(pid: u32) -> bool {
    Command::new("tasklist")
        .args(["/FI", &format!("PID eq {}", pid), "/NH"])
        .output()
        .map(|output| String::from_utf8_lossy(&output.stdout).contains(&pid.to_string()))
        .unwrap_or(false)
}

#[cfg(not(any(unix, windows)))]
pub fn verify_process_running(_pid: u32) -> bool {
    false
}

/// Ask a process to exit, then force it after a short grace period.
/// Returns whether the process is gone afterwards.
pub fn terminate_process(pid: u32) -> bool {
    let pid_arg = pid.to_string();

    #[cfg(unix)]
    let (graceful, forced): (Vec<&str>, Vec<&str>) = (vec![pid_arg.as_str()], vec!["-9", pid_arg.as_str()]);
    #[cfg(unix)]
    let program = "kill";

    #[cfg(windows)]
    let (graceful, forced): (Vec<&str>, Vec<&str>) =
        (vec!["/PID", pid_arg.as_str()], vec!["/F", "/T", "/PID", pid_arg.as_str()]);
    #[cfg(windows)]
    let program = "taskkill";

    #[cfg(any(unix, windows))]
    {
        if let Ok(status) = Command::new(program).args(&graceful).status() {
            debug!(pid, success = status.success(), "Sent termination signal");
        }
        // Give the worker time to finish an in-flight fire and clean up.
        for _ in 0..GRACE_CHECKS {
            if !verify_process_running(pid) {
                break;
            }
            thread::sleep(GRACE_STEP);
        }

        if verify_process_running(pid) {
            debug!(pid, "Process still alive, forcing");
            let _ = Command::new(program).args(&forced).status();
            thread::sleep(Duration::from_millis(200));
        }
    }

    !verify_process_running(pid)
}
