//! Synthetic register values
//!
//! Each tick turns every register definition into a raw 16-bit word:
//! nominal value, slow sinusoidal trend, optional gaussian noise, engine
//! state overrides, then conversion to raw counts with clamping. Boolean
//! registers are OR-ed into their shared status word.

use std::collections::BTreeMap;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use tokio::time::Instant;
use tracing::{debug, info};

use gcs_model::{RegisterDefinition, RegisterKind, RegisterMap};

use crate::config::{EngineState, SimulationConfig};

/// Engineering value served by exhaust and bearing sensors of a stopped engine
pub const STOPPED_AMBIENT: f64 = 80.0;

/// Period divisor of the trend sine, seconds
const TREND_PERIOD_SECS: f64 = 300.0;

const TREND_AMPLITUDE: f64 = 0.01;

const RAW_MAX: f64 = 65535.0;

/// What a stopped engine does to a register category
#[derive(Debug, Clone, Copy, PartialEq)]
enum StoppedEffect {
    Zero,
    Ambient,
}

fn stopped_effect(category: Option<&str>) -> Option<StoppedEffect> {
    let category = category?;
    match category {
        "engine" | "compressor" => Some(StoppedEffect::Zero),
        c if c.starts_with("stage") => Some(StoppedEffect::Zero),
        "exhaust" | "bearing" | "bearings" => Some(StoppedEffect::Ambient),
        _ => None,
    }
}

pub struct Simulator {
    map: RegisterMap,
    settings: SimulationConfig,
    engine_state: EngineState,
    started: Instant,
    rng: StdRng,
}

impl Simulator {
    pub fn new(map: RegisterMap, settings: SimulationConfig) -> Self {
        Self::with_rng(map, settings, StdRng::from_entropy())
    }

    /// Deterministic noise for tests and replays
    pub fn with_seed(map: RegisterMap, settings: SimulationConfig, seed: u64) -> Self {
        Self::with_rng(map, settings, StdRng::seed_from_u64(seed))
    }

    fn with_rng(map: RegisterMap, settings: SimulationConfig, rng: StdRng) -> Self {
        info!("Simulator loaded {} register definitions", map.len());
        Self {
            engine_state: settings.engine_state,
            map,
            settings,
            started: Instant::now(),
            rng,
        }
    }

    /// Swap in a new map and simulation parameters; the trend clock keeps running
    pub fn load(&mut self, map: RegisterMap, settings: SimulationConfig) {
        info!("Simulator loaded {} register definitions", map.len());
        if settings.engine_state != self.settings.engine_state {
            self.engine_state = settings.engine_state;
        }
        self.map = map;
        self.settings = settings;
    }

    pub fn map(&self) -> &RegisterMap {
        &self.map
    }

    pub fn settings(&self) -> &SimulationConfig {
        &self.settings
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.settings.update_interval_ms.max(1))
    }

    pub fn engine_state(&self) -> EngineState {
        self.engine_state
    }

    pub fn set_engine_state(&mut self, state: EngineState) {
        if state != self.engine_state {
            info!("Engine state {:?} -> {:?}", self.engine_state, state);
            self.engine_state = state;
        }
    }

    fn trend_factor(&self, elapsed: Duration) -> f64 {
        if self.settings.trend_enabled {
            1.0 + TREND_AMPLITUDE * (elapsed.as_secs_f64() / TREND_PERIOD_SECS).sin()
        } else {
            1.0
        }
    }

    fn noise(&mut self, std_dev: f64) -> f64 {
        if !self.settings.noise_enabled || std_dev <= 0.0 {
            return 0.0;
        }
        match Normal::new(0.0, std_dev) {
            Ok(normal) => normal.sample(&mut self.rng),
            Err(e) => {
                debug!("Noise {} unusable: {}", std_dev, e);
                0.0
            },
        }
    }

    /// Raw register value for `def` at `elapsed` since start
    pub fn simulated_value(&mut self, def: &RegisterDefinition, elapsed: Duration) -> u16 {
        // Static point: a default without a nominal is served as-is
        if let (Some(default), None) = (def.default, def.nominal) {
            return saturate(default.trunc());
        }

        let scale = def.scale();
        if self.engine_state == EngineState::Stopped {
            match stopped_effect(def.category_lower().as_deref()) {
                Some(StoppedEffect::Zero) => return 0,
                Some(StoppedEffect::Ambient) => return saturate((STOPPED_AMBIENT / scale).trunc()),
                None => {},
            }
        }

        let nominal = def.nominal.or(def.default).unwrap_or(0.0);
        let mut value = nominal * self.trend_factor(elapsed);
        value += self.noise(def.noise.unwrap_or(0.0));

        let raw = (value / scale).trunc();
        let (lo, hi) = match def.kind {
            RegisterKind::Numeric { clamp, .. } => (
                (clamp.min.unwrap_or(0.0) / scale).trunc(),
                (clamp.max.unwrap_or(RAW_MAX) / scale).trunc(),
            ),
            RegisterKind::Boolean { .. } => (0.0, RAW_MAX),
        };
        saturate(raw.min(hi).max(lo).max(0.0))
    }

    /// One full tick: `(address, word)` pairs with flags composed into their word
    pub fn generate_at(&mut self, elapsed: Duration) -> Vec<(u16, u16)> {
        let map = std::mem::take(&mut self.map);
        let mut words: BTreeMap<u16, u16> = BTreeMap::new();

        for def in map.iter().filter(|d| d.bit().is_none()) {
            let value = self.simulated_value(def, elapsed);
            words.insert(def.address, value);
        }

        for def in map.iter() {
            let Some(bit) = def.bit() else { continue };
            let value = self.simulated_value(def, elapsed);
            let word = words.entry(def.address).or_insert(0);
            if f64::from(value) >= 0.5 {
                *word |= 1 << bit;
            } else {
                *word &= !(1 << bit);
            }
        }

        self.map = map;
        words.into_iter().collect()
    }

    pub fn generate(&mut self) -> Vec<(u16, u16)> {
        let elapsed = self.started.elapsed();
        self.generate_at(elapsed)
    }
}

fn saturate(value: f64) -> u16 {
    if value.is_nan() {
        return 0;
    }
    value.clamp(0.0, RAW_MAX) as u16
}
