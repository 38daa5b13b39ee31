use anyhow::{bail, Context};
use energy_client::domain::EnergyType;
use serde::Deserialize;
use std::{fs, time::Duration};

pub const DEFAULT_API_URL: &str = "https://api.octopus.energy/v1";

/// m³ of gas to kWh: volume correction 1.02264, calorific value 39.5 MJ/m³,
/// 3.6 MJ per kWh.
pub const DEFAULT_GAS_M3_TO_KWH: f64 = 1.02264 * 39.5 / 3.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: StoreKind,
    #[serde(default)]
    pub uri: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_api_url")]
    pub base_url: String,
    pub product_code: String,
    /// Usually supplied through `OCTOPUS_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Delay between consecutive remote calls within a run.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeterConfig {
    #[serde(default)]
    pub meter_point: String,
    #[serde(default)]
    pub serial_number: String,
    pub tariff_code: String,
    #[serde(default)]
    pub conversion_factor: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleConfig {
    /// Run every `interval_secs`; a single run when absent.
    #[serde(default)]
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub electricity: MeterConfig,
    pub gas: MeterConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    pub metrics: Option<MetricsConfig>,
}

/// Everything that differs between electricity and gas, resolved once.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyParams {
    pub energy: EnergyType,
    pub meter_point: String,
    pub serial_number: String,
    pub tariff_code: String,
    /// Multiplier turning source consumption units into kWh.
    pub conversion_factor: f64,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("INGESTION_CONFIG").unwrap_or_else(|_| "ingestion-config.toml".to_string());
        let contents = fs::read_to_string(&path).with_context(|| format!("failed to read config {path}"))?;
        let mut cfg = Self::from_toml_str(&contents)?;
        cfg.apply_overrides(|key| env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents).context("invalid ingestion config")?;
        Ok(cfg)
    }

    /// Secrets and meter identifiers normally live in the environment rather
    /// than in the config file.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |target: &mut String, key: &str| {
            if let Some(v) = lookup(key).filter(|v| !v.trim().is_empty()) {
                *target = v;
            }
        };

        if let Some(key) = lookup("OCTOPUS_API_KEY").filter(|v| !v.trim().is_empty()) {
            self.source.api_key = Some(key);
        }
        set(&mut self.store.uri, "DATABASE_URL");
        set(&mut self.electricity.meter_point, "ELECTRICITY_MPAN");
        set(&mut self.electricity.serial_number, "ELECTRICITY_SERIAL_NO");
        set(&mut self.gas.meter_point, "GAS_MPRN");
        set(&mut self.gas.serial_number, "GAS_SERIAL_NO");
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.source.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            bail!("source.api_key (or OCTOPUS_API_KEY) is required for consumption endpoints");
        }
        if self.store.kind == StoreKind::Postgres && self.store.uri.trim().is_empty() {
            bail!("store.uri (or DATABASE_URL) is required for the postgres store");
        }
        for (name, meter) in [("electricity", &self.electricity), ("gas", &self.gas)] {
            if meter.meter_point.trim().is_empty() || meter.serial_number.trim().is_empty() {
                bail!("{name} meter_point and serial_number must be set");
            }
            if meter.tariff_code.trim().is_empty() {
                bail!("{name}.tariff_code must be set");
            }
        }
        if self.electricity.conversion_factor.is_some_and(|f| f != 1.0) {
            bail!("electricity readings are already in kWh; remove electricity.conversion_factor");
        }
        let gas_factor = self.gas_conversion_factor();
        if !(gas_factor.is_finite() && gas_factor > 0.0) {
            bail!("gas.conversion_factor must be a positive number, got {gas_factor}");
        }
        Ok(())
    }

    pub fn gas_conversion_factor(&self) -> f64 {
        self.gas.conversion_factor.unwrap_or(DEFAULT_GAS_M3_TO_KWH)
    }

    pub fn energy_params(&self, energy: EnergyType) -> EnergyParams {
        let (meter, conversion_factor) = match energy {
            EnergyType::Electricity => (&self.electricity, 1.0),
            EnergyType::Gas => (&self.gas, self.gas_conversion_factor()),
        };
        EnergyParams {
            energy,
            meter_point: meter.meter_point.clone(),
            serial_number: meter.serial_number.clone(),
            tariff_code: meter.tariff_code.clone(),
            conversion_factor,
        }
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.source.pacing_ms)
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_max_connections() -> u32 {
    4
}

fn default_batch_size() -> usize {
    500
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_pacing_ms() -> u64 {
    1_000
}

fn default_request_timeout_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [source]
        product_code = "SILVER-23-12-06"

        [electricity]
        tariff_code = "E-1R-SILVER-23-12-06-B"

        [gas]
        tariff_code = "G-1R-SILVER-23-12-06-B"

        [store]
        uri = "postgres://localhost/energy"
    "#;

    fn env_of(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key: &str| pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
    }

    #[test]
    fn defaults_fill_optional_sections() {
        let cfg = AppConfig::from_toml_str(SAMPLE).unwrap();

        assert_eq!(cfg.source.base_url, DEFAULT_API_URL);
        assert_eq!(cfg.store.kind, StoreKind::Postgres);
        assert_eq!(cfg.store.batch_size, 500);
        assert!(cfg.schedule.interval_secs.is_none());
        assert!(cfg.metrics.is_none());
        assert_eq!(cfg.pacing(), Duration::from_secs(1));
    }

    #[test]
    fn environment_supplies_secrets_and_meters() {
        let mut cfg = AppConfig::from_toml_str(SAMPLE).unwrap();
        assert!(cfg.validate().is_err());

        cfg.apply_overrides(env_of(&[
            ("OCTOPUS_API_KEY", "sk_live_x"),
            ("ELECTRICITY_MPAN", "1900000000000"),
            ("ELECTRICITY_SERIAL_NO", "E1"),
            ("GAS_MPRN", "8800000000"),
            ("GAS_SERIAL_NO", "G1"),
            ("DATABASE_URL", "postgres://db/override"),
        ]));

        cfg.validate().unwrap();
        assert_eq!(cfg.source.api_key.as_deref(), Some("sk_live_x"));
        assert_eq!(cfg.store.uri, "postgres://db/override");
        assert_eq!(cfg.gas.meter_point, "8800000000");
    }

    #[test]
    fn energy_params_apply_conversion_to_gas_only() {
        let cfg = AppConfig::from_toml_str(SAMPLE).unwrap();

        let electricity = cfg.energy_params(EnergyType::Electricity);
        let gas = cfg.energy_params(EnergyType::Gas);

        assert_eq!(electricity.conversion_factor, 1.0);
        assert_eq!(gas.conversion_factor, DEFAULT_GAS_M3_TO_KWH);
        assert_eq!(gas.tariff_code, "G-1R-SILVER-23-12-06-B");
    }

    #[test]
    fn rejects_non_positive_gas_factor() {
        let toml = SAMPLE.replace(
            "tariff_code = \"G-1R-SILVER-23-12-06-B\"",
            "tariff_code = \"G-1R-SILVER-23-12-06-B\"\nconversion_factor = 0.0",
        );
        let mut cfg = AppConfig::from_toml_str(&toml).unwrap();
        cfg.apply_overrides(env_of(&[
            ("OCTOPUS_API_KEY", "k"),
            ("ELECTRICITY_MPAN", "1"),
            ("ELECTRICITY_SERIAL_NO", "2"),
            ("GAS_MPRN", "3"),
            ("GAS_SERIAL_NO", "4"),
        ]));

        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("conversion_factor"));
    }

    #[test]
    fn memory_store_needs_no_uri() {
        let toml = SAMPLE.replace("uri = \"postgres://localhost/energy\"", "kind = \"memory\"");
        let mut cfg = AppConfig::from_toml_str(&toml).unwrap();
        cfg.apply_overrides(env_of(&[
            ("OCTOPUS_API_KEY", "k"),
            ("ELECTRICITY_MPAN", "1"),
            ("ELECTRICITY_SERIAL_NO", "2"),
            ("GAS_MPRN", "3"),
            ("GAS_SERIAL_NO", "4"),
        ]));

        assert_eq!(cfg.store.kind, StoreKind::Memory);
        cfg.validate().unwrap();
    }
}
