//! Environment readiness check.

use std::path::Path;
use std::process::Command;

use anyhow::Result;

use crate::cli::output::{self, Styled};
use crate::config::{BackendKind, RuntimeConfig};
use crate::renderer::chromium::find_chromium;

/// Check config, vocabulary, Chromium availability, checkpoint directory,
/// and available memory.
pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let s = Styled::new();
    let mut checks: Vec<(&str, bool, String)> = Vec::new();

    let config = match RuntimeConfig::load(config_path) {
        Ok(c) => {
            checks.push(("config", true, format!("backend {}", c.backend)));
            c
        }
        Err(e) => {
            checks.push(("config", false, format!("{e:#}")));
            RuntimeConfig::default()
        }
    };

    match config.vocabulary() {
        Ok(v) => checks.push(("vocabulary", true, format!("{} categories", v.categories.len()))),
        Err(e) => checks.push(("vocabulary", false, format!("{e:#}"))),
    }

    let chromium = find_chromium(config.chromium_path.as_ref());
    let needs_chromium = config.backend == BackendKind::Chromium;
    match &chromium {
        Some(path) => checks.push(("chromium", true, path.display().to_string())),
        None => checks.push((
            "chromium",
            !needs_chromium,
            "not found; set PLACERANK_CHROMIUM_PATH or use the http backend".to_string(),
        )),
    }

    let dir = &config.checkpoint_dir;
    let probe = dir.join(".doctor-probe");
    let writable = std::fs::create_dir_all(dir).is_ok() && std::fs::write(&probe, b"ok").is_ok();
    let _ = std::fs::remove_file(&probe);
    checks.push(("checkpoints", writable, dir.display().to_string()));

    let mem = get_available_memory_mb();
    if let Some(mb) = mem {
        checks.push(("memory", mb >= 256, format!("{mb}MB available")));
    }

    let ready = checks.iter().all(|(_, ok, _)| *ok);

    if output::is_json() {
        let items: Vec<_> = checks
            .iter()
            .map(|(name, ok, detail)| serde_json::json!({ "check": name, "ok": ok, "detail": detail }))
            .collect();
        output::print_json(&serde_json::json!({ "ready": ready, "checks": items }));
        return Ok(());
    }

    println!("PlaceRank Doctor");
    println!("================");
    println!();
    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();
    for (name, ok, detail) in &checks {
        let sym = if *ok { s.ok_sym() } else { s.warn_sym() };
        println!("{sym} {name}: {detail}");
    }
    if mem.is_none() {
        println!("[??] Could not determine available memory");
    }
    println!();
    println!("Status: {}", if ready { "READY" } else { "NOT READY" });
    Ok(())
}

/// Get available memory in MB (platform-specific).
fn get_available_memory_mb() -> Option<u64> {
    #[cfg(target_os = "macos")]
    {
        let output = Command::new("sysctl")
            .args(["-n", "hw.memsize"])
            .output()
            .ok()?;
        let s = String::from_utf8_lossy(&output.stdout);
        let bytes: u64 = s.trim().parse().ok()?;
        Some(bytes / 1_048_576)
    }
    #[cfg(target_os = "linux")]
    {
        let output = Command::new("free").args(["-m"]).output().ok()?;
        let s = String::from_utf8_lossy(&output.stdout);
        s.lines()
            .find(|l| l.starts_with("Mem:"))
            .and_then(|l| l.split_whitespace().nth(6))
            .and_then(|v| v.parse().ok())
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        None
    }
}
