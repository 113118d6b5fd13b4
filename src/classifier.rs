//! Threshold rules that turn a telemetry reading into alert categories.

use crate::db::models::AlertCategory;
use crate::error::{FridgeError, FridgeResult};

pub const TEMPERATURE_RANGE_C: (f64, f64) = (-40.0, 60.0);
pub const POWER_RANGE_W: (f64, f64) = (0.0, 10_000.0);

/// Below this the fridge is in the freezing zone.
pub const LOW_TEMP_C: f64 = 12.0;
pub const HIGH_TEMP_C: f64 = 20.0;
pub const CRITIC_TEMP_C: f64 = 25.0;
pub const CRITIC_POWER_W: f64 = 500.0;

/// Rejects sensor-fault values (including NaN); these never reach storage.
pub fn validate_reading(temperature: f64, power: f64) -> FridgeResult<()> {
    let (t_min, t_max) = TEMPERATURE_RANGE_C;
    let (p_min, p_max) = POWER_RANGE_W;
    if !(t_min..=t_max).contains(&temperature) {
        return Err(FridgeError::InvalidInput(format!(
            "temperature {} outside [{}, {}] °C",
            temperature, t_min, t_max
        )));
    }
    if !(p_min..=p_max).contains(&power) {
        return Err(FridgeError::InvalidInput(format!(
            "power {} outside [{}, {}] W",
            power, p_min, p_max
        )));
    }
    Ok(())
}

/// Temperature and power rules are independent: at most one temperature
/// category plus `critic_power`. Order is temperature first, then power.
pub fn classify(temperature: f64, power: f64) -> Vec<AlertCategory> {
    let mut out = Vec::with_capacity(2);
    if temperature < LOW_TEMP_C {
        out.push(AlertCategory::LowTemp);
    } else if temperature > CRITIC_TEMP_C {
        out.push(AlertCategory::CriticTemp);
    } else if temperature > HIGH_TEMP_C {
        out.push(AlertCategory::HighTemp);
    }
    if power > CRITIC_POWER_W {
        out.push(AlertCategory::CriticPower);
    }
    out
}

/// Message template per category, embedding the reading that triggered it.
pub fn alert_message(category: AlertCategory, temperature: f64, power: f64) -> String {
    match category {
        AlertCategory::LowTemp => format!("Low temperature {:.1}°C: freezing zone", temperature),
        AlertCategory::HighTemp => format!("High temperature {:.1}°C", temperature),
        AlertCategory::CriticTemp => format!("Critical temperature {:.1}°C", temperature),
        AlertCategory::CriticPower => format!("Critical power draw {:.2} W", power),
        AlertCategory::DoorOpen => "Door opened".to_string(),
        AlertCategory::DoorClosed => "Door closed".to_string(),
        AlertCategory::DoorLeftOpen => "Door left open".to_string(),
        AlertCategory::SensorOffline => "Sensor offline".to_string(),
    }
}
