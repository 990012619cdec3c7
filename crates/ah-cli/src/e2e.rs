use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use thirtyfour::prelude::*;
use thirtyfour::ChromeCapabilities;

/// Time for the content script to start and its first evaluation to run.
const STARTUP_WAIT: Duration = Duration::from_secs(3);
/// Covers one mutation callback plus the first verification.
const REACTION_WAIT: Duration = Duration::from_millis(1500);

pub struct E2eOptions {
    pub chromedriver_url: String,
    pub extension_path: String,
    pub watch_url: String,
    pub headless: bool,
}

pub fn run_e2e(opts: E2eOptions) -> Result<(), String> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to start tokio runtime: {}", e))?;
    runtime.block_on(run_e2e_async(opts))
}

async fn run_e2e_async(opts: E2eOptions) -> Result<(), String> {
    let extension_path = canonicalize_path(&opts.extension_path)?;

    let mut caps = ChromeCapabilities::new();
    let args = [
        format!("--disable-extensions-except={}", extension_path.display()),
        format!("--load-extension={}", extension_path.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--autoplay-policy=no-user-gesture-required".to_string(),
    ];
    for arg in &args {
        caps.add_arg(arg)
            .map_err(|e| format!("Failed to set chrome arg: {}", e))?;
    }
    if opts.headless {
        for arg in ["--headless=new", "--disable-gpu"] {
            caps.add_arg(arg)
                .map_err(|e| format!("Failed to set chrome arg: {}", e))?;
        }
    }

    let driver = WebDriver::new(&opts.chromedriver_url, caps)
        .await
        .map_err(|e| format!("Failed to connect to chromedriver: {}", e))?;

    let result = check_ad_break(&driver, &opts.watch_url).await;
    driver.quit().await.ok();

    result?;
    println!("✓ E2E checks passed");
    Ok(())
}

/// Fake an ad break by toggling the player's `ad-showing` class and watch
/// the audio go away and come back.
async fn check_ad_break(driver: &WebDriver, url: &str) -> Result<(), String> {
    driver
        .goto(url)
        .await
        .map_err(|e| format!("Failed to open '{}': {}", url, e))?;
    driver
        .find(By::Css("#movie_player video"))
        .await
        .map_err(|e| format!("No player on '{}': {}", url, e))?;
    tokio::time::sleep(STARTUP_WAIT).await;

    let before = eval_f64(driver, "return document.querySelector('#movie_player video').volume;")
        .await
        .map_err(|e| format!("Failed to read volume: {}", e))?;
    if before <= 0.0 {
        eval(driver, "document.querySelector('#movie_player video').volume = 0.6;")
            .await
            .map_err(|e| format!("Failed to set starting volume: {}", e))?;
    }
    let expected = if before > 0.0 { before } else { 0.6 };

    eval(driver, "document.getElementById('movie_player').classList.add('ad-showing');")
        .await
        .map_err(|e| format!("Failed to start ad break: {}", e))?;
    tokio::time::sleep(REACTION_WAIT).await;

    let silent = eval_bool(
        driver,
        "const v = document.querySelector('#movie_player video'); return v.muted || v.volume === 0;",
    )
    .await
    .map_err(|e| format!("Failed to read mute state: {}", e))?;
    if !silent {
        return Err("Audio still playing during ad break".to_string());
    }

    eval(driver, "document.getElementById('movie_player').classList.remove('ad-showing');")
        .await
        .map_err(|e| format!("Failed to end ad break: {}", e))?;
    tokio::time::sleep(REACTION_WAIT).await;

    let restored = eval_bool(driver, "return !document.querySelector('#movie_player video').muted;")
        .await
        .map_err(|e| format!("Failed to read mute state: {}", e))?;
    let after = eval_f64(driver, "return document.querySelector('#movie_player video').volume;")
        .await
        .map_err(|e| format!("Failed to read volume: {}", e))?;
    if !restored || (after - expected).abs() > 0.01 {
        return Err(format!(
            "Audio not restored after ad break (volume {after:.2}, expected {expected:.2})"
        ));
    }

    Ok(())
}

async fn eval(driver: &WebDriver, script: &str) -> WebDriverResult<()> {
    driver.execute(script, Vec::<Value>::new()).await?;
    Ok(())
}

async fn eval_bool(driver: &WebDriver, script: &str) -> WebDriverResult<bool> {
    let result = driver.execute(script, Vec::<Value>::new()).await?;
    Ok(result.json().as_bool().unwrap_or(false))
}

async fn eval_f64(driver: &WebDriver, script: &str) -> WebDriverResult<f64> {
    let result = driver.execute(script, Vec::<Value>::new()).await?;
    Ok(result.json().as_f64().unwrap_or(0.0))
}

fn canonicalize_path(path: &str) -> Result<PathBuf, String> {
    std::fs::canonicalize(path)
        .map_err(|e| format!("Failed to resolve '{}': {}", path, e))
}
