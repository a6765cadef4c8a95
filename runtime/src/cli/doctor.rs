//! Environment readiness check.

use crate::config::{BrowserSettings, Config};
use crate::renderer::chromium::find_chromium;
use anyhow::Result;
use std::path::Path;

/// Minimum free memory for one headless Chromium.
const MIN_MEMORY_MB: u64 = 512;

/// Check Chromium, configuration, work directory and available memory.
pub async fn run() -> Result<()> {
    println!("Scanrelay Doctor");
    println!("================");
    println!();

    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    let config = Config::from_env();
    let settings = match &config {
        Ok(c) => c.browser.clone(),
        Err(_) => BrowserSettings::default(),
    };

    let chromium = find_chromium(&settings);
    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Install Chrome/Chromium or set SCANRELAY_CHROMIUM_PATH."
        ),
    }

    match &config {
        Ok(c) => {
            println!("[OK] Site credentials loaded for user '{}'", c.credentials.user_id);
            match &c.upstream {
                Some(up) => println!("[OK] Upstream endpoint: {}", up.url),
                None => println!("[??] No upstream configured; runs will not publish"),
            }
            check_work_dir(&c.work_dir);
        }
        Err(e) => println!("[!!] Configuration error: {e}"),
    }

    match available_memory_mb() {
        Some(mb) if mb >= MIN_MEMORY_MB => {
            println!("[OK] Available memory: {mb}MB (>= {MIN_MEMORY_MB}MB required)")
        }
        Some(mb) => println!("[!!] Available memory: {mb}MB (< {MIN_MEMORY_MB}MB, may be insufficient)"),
        None => println!("[??] Could not determine available memory"),
    }

    println!();
    if chromium.is_some() && config.is_ok() {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }

    Ok(())
}

fn check_work_dir(dir: &Path) {
    let marker = dir.join(".scanrelay-doctor");
    let writable = std::fs::create_dir_all(dir).is_ok() && std::fs::write(&marker, b"ok").is_ok();
    let _ = std::fs::remove_file(&marker);
    if writable {
        println!("[OK] Work directory {} is writable", dir.display());
    } else {
        println!("[!!] Work directory {} is not writable", dir.display());
    }
}

/// Available memory in MB, where the platform exposes it cheaply.
fn available_memory_mb() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
        let line = meminfo.lines().find(|l| l.starts_with("MemAvailable:"))?;
        let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
        Some(kb / 1024)
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}
