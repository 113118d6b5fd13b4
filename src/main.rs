pub mod accounts;
pub mod alerts;
pub mod auth;
pub mod classifier;
pub mod config;
pub mod db {
    pub mod memory;
    pub mod models;
    pub mod pg;
    pub mod store;
}
pub mod error;
pub mod inventory;
pub mod retention;
pub mod schema;
pub mod telemetry;
pub mod utils;
pub mod view;
pub mod services {
    pub mod simulate;
}

use crate::accounts::{Access, Accounts};
use crate::alerts::AlertCenter;
use crate::auth::TokenAuthority;
use crate::config::Config;
use crate::db::memory::MemoryStore;
use crate::db::pg::PgStore;
use crate::db::store::Store;
use crate::inventory::InventoryLedger;
use crate::services::simulate;
use crate::telemetry::{Metric, TelemetryIngestor};
use crate::view::FridgeView;
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug)]
struct LoadedEnvFile {
    path: PathBuf,
    explicit: bool,
    applied: usize,
}

fn open_store(cfg: &Config) -> Result<Arc<dyn Store>, String> {
    if cfg.uses_memory_store() {
        info!("Using in-memory store; nothing is persisted");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let store = PgStore::connect(&cfg.database_url, cfg.db_pool_size)?;
    info!("Connected to database (pool_size={})", cfg.db_pool_size);
    store.apply_migrations()?;
    Ok(Arc::new(store))
}

pub fn run() -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (user_token={}d/renew {}d, fridge_token={}d/renew {}d, grace={}d, simulate={})",
        cfg.token_policy.user.ttl.num_days(),
        cfg.token_policy.user.renew_before.num_days(),
        cfg.token_policy.fridge.ttl.num_days(),
        cfg.token_policy.fridge.renew_before.num_days(),
        cfg.token_policy.grace.num_days(),
        cfg.simulation
            .map(|s| format!("{}h", s.hours))
            .unwrap_or_else(|| "off".to_string()),
    );

    // 2) Storage
    let store = open_store(&cfg)?;

    // 3) Core components
    let tokens = Arc::new(TokenAuthority::new(cfg.token_secret.as_bytes(), cfg.token_policy));
    let accounts = Accounts::new(store.clone(), tokens.clone());
    let telemetry = TelemetryIngestor::new(store.clone(), tokens.clone());
    let inventory = InventoryLedger::new(store.clone(), tokens);
    let alerts = AlertCenter::new(store);

    // 4) Optional synthetic fleet
    let Some(sim) = cfg.simulation else {
        info!("Simulation disabled via SIMULATE_ENABLED; storage and tokens are ready");
        return Ok(());
    };
    let summary = simulate::run(&accounts, &telemetry, &inventory, sim)?;

    // 5) Report what the owner sees
    let fridge_id = summary.fridge_id;
    let user_token = accounts
        .login(simulate::DEMO_EMAIL, simulate::DEMO_PASSWORD)
        .map_err(|e| format!("demo login failed: {}", e))?;
    let view = FridgeView::new(&accounts, &telemetry, &inventory, &alerts);
    let owner = Access::Owner {
        user_token: &user_token,
        fridge_id,
    };
    let temperature = view
        .stats(owner, Some(sim.hours), Metric::Temperature)
        .map_err(|e| format!("temperature stats failed: {}", e))?
        .value;
    let power = view
        .stats(owner, Some(sim.hours), Metric::Power)
        .map_err(|e| format!("power stats failed: {}", e))?
        .value;
    info!(
        "Fridge {}: temperature avg={:.1} min={:.1} max={:.1}, power avg={:.2} max={:.2} ({} samples)",
        fridge_id, temperature.average, temperature.min, temperature.max, power.average, power.max, temperature.count
    );
    for entry in view
        .alert_statistics(owner, None)
        .map_err(|e| format!("alert statistics failed: {}", e))?
        .value
    {
        info!("Fridge {}: {} x{} (latest {})", fridge_id, entry.category, entry.count, entry.latest);
    }
    let critical = view
        .critical_alerts(owner, Some(sim.hours))
        .map_err(|e| format!("critical alerts failed: {}", e))?
        .value;
    info!("Fridge {}: {} critical alert(s) in the simulated window", fridge_id, critical.len());
    let doors = view
        .door_statistics(owner, Some(sim.hours))
        .map_err(|e| format!("door statistics failed: {}", e))?
        .value;
    info!(
        "Fridge {}: door opened {} time(s), {:.0}s on average, {:.0}s at most",
        fridge_id, doors.total_openings, doors.avg_open_seconds, doors.max_open_seconds
    );
    for share in view
        .category_breakdown(owner)
        .map_err(|e| format!("category breakdown failed: {}", e))?
        .value
    {
        info!(
            "Fridge {}: {} -> {} product(s), {} unit(s)",
            fridge_id, share.category, share.products, share.quantity
        );
    }
    let dashboard = view
        .dashboard(owner)
        .map_err(|e| format!("dashboard failed: {}", e))?
        .value;
    let trend = view
        .temperature_trend(owner, None)
        .map_err(|e| format!("temperature trend failed: {}", e))?
        .value;
    info!(
        "Fridge {}: {} product(s) stocked, {:.3} kWh over the last day (cost {:.2}), temperature {:?}",
        fridge_id, dashboard.product_count, dashboard.energy_today_kwh, dashboard.energy_today_cost, trend
    );

    Ok(())
}

fn configure_env_from_cli() -> Result<Option<LoadedEnvFile>, String> {
    let mut args = std::env::args_os();
    args.next(); // skip program name

    let mut env_file: Option<PathBuf> = None;
    while let Some(arg) = args.next() {
        let path = match arg.to_str() {
            Some("--env-file") => args
                .next()
                .map(PathBuf::from)
                .ok_or_else(|| "`--env-file` requires a path argument".to_string())?,
            Some(s) if s.starts_with("--env-file=") => match &s["--env-file=".len()..] {
                "" => return Err("`--env-file` requires a path argument".to_string()),
                p => PathBuf::from(p),
            },
            Some("--") => break,
            Some(other) => return Err(format!("unrecognised argument: {}", other)),
            None => return Err("argument contains invalid UTF-8".to_string()),
        };
        if env_file.replace(path).is_some() {
            return Err("`--env-file` provided more than once".to_string());
        }
    }

    let (path, explicit) = match env_file {
        Some(path) if !path.is_file() => return Err(format!("env file not found: {}", path.display())),
        Some(path) => (path, true),
        None => {
            let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
            let default_path = cwd.join(".env");
            if !default_path.is_file() {
                return Ok(None);
            }
            (default_path, false)
        }
    };
    let applied = config::load_env_file(&path)?;
    Ok(Some(LoadedEnvFile { path, explicit, applied }))
}

fn main() {
    let loaded_env = match configure_env_from_cli() {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!(
            "Environment loaded from {} .env file: {} ({} variable(s) applied)",
            origin,
            info.path.display(),
            info.applied
        );
    }

    info!(
        "smart-fridge {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run() {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
