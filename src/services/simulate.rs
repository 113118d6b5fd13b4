use crate::accounts::Accounts;
use crate::config::SimulationConfig;
use crate::db::models::ProductCategory;
use crate::error::FridgeError;
use crate::inventory::InventoryLedger;
use crate::telemetry::TelemetryIngestor;
use chrono::{DateTime, Duration, DurationRound, Timelike, Utc};
use log::info;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::f64::consts::PI;

pub const DEMO_EMAIL: &str = "demo@smart-fridge.local";
pub const DEMO_PASSWORD: &str = "demo-fridge-password";
const DEFAULT_SEED: u64 = 0x5EED_F71D_6E00_0001;
const STEP_MINUTES: i64 = 5;
const PRODUCTS: [(&str, ProductCategory); 9] = [
    ("milk", ProductCategory::Dairy),
    ("yogurt", ProductCategory::Dairy),
    ("cheese", ProductCategory::Dairy),
    ("chicken breast", ProductCategory::Meat),
    ("salmon", ProductCategory::Fish),
    ("carrot", ProductCategory::Vegetables),
    ("lettuce", ProductCategory::Vegetables),
    ("bread", ProductCategory::Bread),
    ("eggs", ProductCategory::Other),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulationSummary {
    pub fridge_id: i64,
    pub measurements: usize,
    pub door_openings: usize,
    pub movements: usize,
}

fn fail(step: &str) -> impl Fn(FridgeError) -> String + '_ {
    move |e| format!("Simulation: {} failed: {}", step, e)
}

/// Pushes a synthetic history for one demo fridge through the public write paths.
pub fn run(
    accounts: &Accounts,
    telemetry: &TelemetryIngestor,
    inventory: &InventoryLedger,
    cfg: SimulationConfig,
) -> Result<SimulationSummary, String> {
    let user_token = match accounts.register_user(DEMO_EMAIL, DEMO_PASSWORD) {
        Ok(token) => token,
        Err(FridgeError::Conflict(_)) => accounts.login(DEMO_EMAIL, DEMO_PASSWORD).map_err(fail("demo login"))?,
        Err(e) => return Err(fail("demo registration")(e)),
    };
    let fridge = accounts
        .register_fridge(&user_token, "kitchen (simulated)")
        .map_err(fail("fridge registration"))?;
    let product_ids = ensure_products(inventory)?;

    let end = align_to_step(Utc::now());
    let start = end - Duration::hours(i64::from(cfg.hours));
    let mut rng = SmallRng::seed_from_u64(cfg.seed.unwrap_or(DEFAULT_SEED));
    info!(
        "Simulation: fridge {} from {} to {} (seed={})",
        fridge.fridge_id,
        start,
        end,
        cfg.seed.map(|s| s.to_string()).unwrap_or_else(|| "default".to_string())
    );

    let mut token = fridge.token;
    let mut stock: HashMap<i64, i64> = HashMap::new();
    let mut summary = SimulationSummary {
        fridge_id: fridge.fridge_id,
        ..SimulationSummary::default()
    };
    let mut ts = start;
    while ts < end {
        if ts.hour() == 0 && ts.minute() == 0 {
            // a real device re-checks its token once a day
            token = accounts.is_authorized_fridge(&token).map_err(fail("token refresh"))?;
        }

        let door_open = rng.random_bool(0.03);
        let (temperature, power) = reading(ts, door_open, &mut rng);
        telemetry
            .record_measurement(&token, temperature, power, Some(ts))
            .map_err(fail("measurement"))?;
        summary.measurements += 1;

        if door_open {
            telemetry
                .record_door_event(&token, true, Some(ts))
                .map_err(fail("door event"))?;
            summary.door_openings += 1;

            if rng.random_bool(0.4) {
                let product_id = product_ids[rng.random_range(0..product_ids.len())];
                let held = stock.get(&product_id).copied().unwrap_or(0);
                let delta = if held > 0 && rng.random_bool(0.55) {
                    -rng.random_range(1..=held.min(2))
                } else {
                    rng.random_range(1..=3)
                };
                inventory
                    .record_movement(&token, product_id, delta, Some(ts + Duration::seconds(30)))
                    .map_err(fail("movement"))?;
                *stock.entry(product_id).or_insert(0) += delta;
                summary.movements += 1;
            }

            let closed_at = ts + Duration::seconds(rng.random_range(45..=150));
            telemetry
                .record_door_event(&token, false, Some(closed_at))
                .map_err(fail("door event"))?;
        }

        ts += Duration::minutes(STEP_MINUTES);
    }

    info!(
        "Simulation: complete (measurements={}, door_openings={}, movements={})",
        summary.measurements, summary.door_openings, summary.movements
    );
    Ok(summary)
}

fn ensure_products(inventory: &InventoryLedger) -> Result<Vec<i64>, String> {
    PRODUCTS
        .iter()
        .map(|(name, category)| match inventory.find_product_by_name(name) {
            Ok(Some(product)) => Ok(product.id),
            Ok(None) => inventory
                .register_product(name, None, *category)
                .map_err(fail("product registration")),
            Err(e) => Err(fail("product lookup")(e)),
        })
        .collect()
}

fn align_to_step(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(Duration::minutes(STEP_MINUTES)).unwrap_or(ts)
}

/// Compressor cycling around 4 °C with a slow daily drift, rare excursions and
/// power spikes so the alert rules get exercised.
fn reading(ts: DateTime<Utc>, door_open: bool, rng: &mut SmallRng) -> (f64, f64) {
    let day_fraction = ts.time().num_seconds_from_midnight() as f64 / 86_400.0;
    let cycle = ((ts.minute() as f64 / 60.0) * 2.0 * PI).sin();
    let diurnal = 0.6 * (2.0 * PI * (day_fraction - 0.35)).sin();

    let mut temperature = 4.2 + diurnal - 0.8 * cycle + rng.random_range(-0.3..=0.3);
    if door_open {
        temperature += rng.random_range(1.0..=3.0);
    }
    if rng.random_bool(0.004) {
        temperature = rng.random_range(21.0..=28.0);
    }

    let compressor_on = cycle > 0.0;
    let mut power = if compressor_on {
        95.0 + 20.0 * cycle + rng.random_range(0.0..=8.0)
    } else {
        rng.random_range(2.0..=6.0)
    };
    if rng.random_bool(0.003) {
        power = rng.random_range(520.0..=680.0);
    }
    (temperature.clamp(-40.0, 60.0), power.clamp(0.0, 10_000.0))
}
