//! Environment readiness check.

use anyhow::Result;
use std::path::Path;

use crate::renderer::chromium::find_chromium;

/// Check Chromium availability, input files, output directory, and memory.
pub async fn run() -> Result<()> {
    println!("Reelscan Doctor");
    println!("===============");
    println!();

    // OS and architecture
    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    println!("OS:   {os}");
    println!("Arch: {arch}");
    println!();

    // Check Chromium
    let chromium = find_chromium();
    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!("[!!] Chromium NOT found. Browser rendering is unavailable."),
    }

    // Check available memory. Each browser session wants a few hundred MB;
    // the plain HTTP path runs fine in far less.
    match available_memory_mb() {
        Some(mb) => {
            if mb >= 512 {
                println!("[OK] Available memory: {mb}MB (>= 512MB for browser sessions)");
            } else {
                println!("[!!] Available memory: {mb}MB (< 512MB, prefer plain HTTP scans)");
            }
        }
        None => println!("[??] Could not determine available memory"),
    }

    // Check default input files
    check_input("target list", "targets.json");
    check_input("game catalog", "catalog.json");

    // Check output directory
    match std::fs::create_dir_all("scans") {
        Ok(()) => println!("[OK] Output directory writable: scans/"),
        Err(e) => println!("[!!] Cannot create output directory scans/: {e}"),
    }

    println!();
    if chromium.is_some() {
        println!("Status: READY");
    } else {
        println!("Status: READY (HTTP only)");
        println!("  Install Chromium or set REELSCAN_CHROMIUM_PATH to enable browser rendering.");
    }

    Ok(())
}

fn check_input(label: &str, path: &str) {
    if Path::new(path).exists() {
        println!("[OK] Default {label} present: ./{path}");
    } else {
        println!("[!!] No default {label} at ./{path} (pass --targets/--catalog explicitly)");
    }
}

/// Available memory in MB (platform-specific).
fn available_memory_mb() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
        let line = meminfo.lines().find(|l| l.starts_with("MemAvailable:"))?;
        let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
        Some(kb / 1024)
    }
    #[cfg(target_os = "macos")]
    {
        let output = std::process::Command::new("sysctl")
            .args(["-n", "hw.memsize"])
            .output()
            .ok()?;
        let bytes: u64 = String::from_utf8_lossy(&output.stdout).trim().parse().ok()?;
        Some(bytes / 1_048_576)
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        None
    }
}
