//! Best-effort checks for the OS permission a global keyboard hook needs.
//!
//! Nothing here blocks startup. A missing permission only means triggers
//! are stored but never fire, which the registry reports as degraded mode.

/// A hint for the user when the hook is likely to be refused, else `None`.
pub fn hook_permission_hint() -> Option<String> {
    #[cfg(target_os = "macos")]
    {
        if !has_accessibility_permission() {
            return Some(
                "binder needs Accessibility access: System Settings > Privacy & Security > \
                 Accessibility, then enable your terminal application"
                    .to_string(),
            );
        }
    }

    #[cfg(target_os = "linux")]
    {
        if !has_input_permission() {
            return Some(
                "binder cannot read /dev/input, so combos cannot be suppressed. Add your user \
                 to the 'input' group (sudo usermod -a -G input $USER) and log in again"
                    .to_string(),
            );
        }
    }

    None
}

#[cfg(target_os = "macos")]
fn has_accessibility_permission() -> bool {
    use std::process::Command;

    // System Events refuses scripting without Accessibility access.
    Command::new("osascript")
        .arg("-e")
        .arg("tell application \"System Events\" to return name of first process")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(target_os = "linux")]
fn has_input_permission() -> bool {
    use std::path::Path;

    let device = Path::new("/dev/input/event0");
    if device.exists() {
        return std::fs::File::open(device).is_ok();
    }

    std::process::Command::new("groups")
        .output()
        .ok()
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|groups| groups.split_whitespace().any(|g| g == "input"))
        .unwrap_or(false)
}
