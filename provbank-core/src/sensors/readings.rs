//! Sensor reading synthesis.
//!
//! Produces plausible per-type readings so workloads exercise realistic
//! payload shapes and sizes: temperatures drift slowly around a baseline,
//! GPS coordinates random-walk, motion sensors flip between burst and idle.
//! Readings are serialized to JSON and treated as opaque bytes from there on.

use rand::rngs::SmallRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Supported sensor families. `Generic` covers anything a scenario names
/// that has no dedicated synthesis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    Temperature,
    Humidity,
    Motion,
    Gps,
    Light,
    Co2,
    Generic,
}

/// Per-session synthesis state. Stateful types (temperature drift, GPS
/// walk, motion phases) keep their evolution here so consecutive readings
/// from one sensor are correlated the way real devices are.
#[derive(Debug)]
pub(crate) struct ReadingSynth {
    kind: SensorType,
    temp_mean: f64,
    lat: f64,
    lon: f64,
    in_motion: bool,
}

impl ReadingSynth {
    pub(crate) fn new(kind: SensorType, rng: &mut SmallRng) -> Self {
        Self {
            kind,
            temp_mean: rng.random_range(-30.0..50.0),
            lat: 23.8 + rng.random_range(-0.5..0.5),
            lon: 90.4 + rng.random_range(-0.5..0.5),
            in_motion: rng.random_bool(0.5),
        }
    }

    /// Synthesizes the next reading as a JSON payload.
    pub(crate) fn sample(&mut self, device: &str, rng: &mut SmallRng) -> Vec<u8> {
        let value = match self.kind {
            SensorType::Temperature => {
                self.temp_mean += rng.random_range(-0.1..0.1);
                let reading = self.temp_mean + rng.random_range(-1.0..1.0);
                json!({ "value": (reading * 10.0).round() / 10.0, "unit": "C" })
            }
            SensorType::Humidity => {
                let base = 50.0 + (self.temp_mean - 20.0) * 0.5;
                let reading = (base + rng.random_range(-5.0..5.0)).clamp(0.0, 100.0);
                json!({ "value": (reading * 10.0).round() / 10.0, "unit": "%" })
            }
            SensorType::Motion => {
                if self.in_motion && rng.random_bool(0.05) {
                    self.in_motion = false;
                } else if !self.in_motion && rng.random_bool(0.2) {
                    self.in_motion = true;
                }
                json!({ "detected": self.in_motion })
            }
            SensorType::Gps => {
                self.lat += rng.random_range(-0.001..0.001);
                self.lon += rng.random_range(-0.001..0.001);
                json!({ "lat": self.lat, "lon": self.lon })
            }
            SensorType::Light => {
                json!({ "value": (rng.random_range(0.0..1000.0_f64)).round(), "unit": "lux" })
            }
            SensorType::Co2 => {
                json!({ "value": (rng.random_range(400.0..1000.0_f64)).round(), "unit": "ppm" })
            }
            SensorType::Generic => {
                json!({ "value": (rng.random_range(0.0..100.0_f64) * 100.0).round() / 100.0 })
            }
        };
        serde_json::to_vec(&json!({ "dev_id": device, "reading": value })).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn readings_are_valid_json_with_device_tag() {
        let mut rng = SmallRng::seed_from_u64(1);
        for kind in [
            SensorType::Temperature,
            SensorType::Humidity,
            SensorType::Motion,
            SensorType::Gps,
            SensorType::Light,
            SensorType::Co2,
            SensorType::Generic,
        ] {
            let mut synth = ReadingSynth::new(kind, &mut rng);
            let payload = synth.sample("temp_0", &mut rng);
            let parsed: serde_json::Value = serde_json::from_slice(&payload).unwrap();
            assert_eq!(parsed["dev_id"], "temp_0");
            assert!(parsed.get("reading").is_some());
        }
    }

    #[test]
    fn temperature_drifts_slowly() {
        let mut rng = SmallRng::seed_from_u64(2);
        let mut synth = ReadingSynth::new(SensorType::Temperature, &mut rng);
        let start = synth.temp_mean;
        for _ in 0..100 {
            synth.sample("t", &mut rng);
        }
        assert!((synth.temp_mean - start).abs() < 10.0);
    }
}
