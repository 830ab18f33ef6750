use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tracing::{info, warn};

use crate::container::ContainerConfig;

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub simulation: SimulationConfig,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig::from_env(),
            simulation: SimulationConfig::from_env(),
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    bind_ip: IpAddr,
    display_host: String,
    port: u16,
}

impl ApiConfig {
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_PORT: u16 = 8080;
    const HOST_VAR: &'static str = "BOX_STACKING_API_HOST";
    const PORT_VAR: &'static str = "BOX_STACKING_API_PORT";

    fn from_env() -> Self {
        let host_value =
            env_string(Self::HOST_VAR).unwrap_or_else(|| Self::DEFAULT_HOST.to_string());
        let (bind_ip, effective_host) = match host_value.parse::<IpAddr>() {
            Ok(ip) => (ip, host_value),
            Err(err) => {
                warn!(
                    "Could not parse {} ('{}'): {}. Using {}.",
                    Self::HOST_VAR,
                    host_value,
                    err,
                    Self::DEFAULT_HOST
                );
                (
                    IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                    Self::DEFAULT_HOST.to_string(),
                )
            }
        };

        let port = match env_string(Self::PORT_VAR) {
            Some(raw) => match raw.parse::<u16>() {
                Ok(value) if value != 0 => value,
                Ok(_) => {
                    warn!(
                        "{} must not be 0. Using {}.",
                        Self::PORT_VAR,
                        Self::DEFAULT_PORT
                    );
                    Self::DEFAULT_PORT
                }
                Err(err) => {
                    warn!(
                        "Could not parse {} ('{}'): {}. Using {}.",
                        Self::PORT_VAR,
                        raw,
                        err,
                        Self::DEFAULT_PORT
                    );
                    Self::DEFAULT_PORT
                }
            },
            None => Self::DEFAULT_PORT,
        };

        Self {
            bind_ip,
            display_host: effective_host,
            port,
        }
    }

    /// Socket address to bind the server to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Visible hostname for logging and hints.
    pub fn display_host(&self) -> &str {
        &self.display_host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Indicates whether binding to all interfaces.
    pub fn binds_to_all_interfaces(&self) -> bool {
        match self.bind_ip {
            IpAddr::V4(addr) => addr == Ipv4Addr::UNSPECIFIED,
            IpAddr::V6(addr) => addr == Ipv6Addr::UNSPECIFIED,
        }
    }

    /// Checks whether the hostname matches the default value.
    pub fn uses_default_host(&self) -> bool {
        self.display_host == Self::DEFAULT_HOST
    }
}

/// Default container and scoring parameters for evaluations that do not override them.
#[derive(Clone, Debug)]
pub struct SimulationConfig {
    container: ContainerConfig,
    height_bias: f64,
}

impl SimulationConfig {
    pub const DEFAULT_HEIGHT_BIAS: f64 = 1.0;

    const GRID_WIDTH_VAR: &'static str = "BOX_STACKING_GRID_WIDTH";
    const GRID_HEIGHT_VAR: &'static str = "BOX_STACKING_GRID_HEIGHT";
    const PENALTY_MULTIPLIER_VAR: &'static str = "BOX_STACKING_PENALTY_MULTIPLIER";
    const FLATNESS_TOLERANCE_VAR: &'static str = "BOX_STACKING_FLATNESS_TOLERANCE";
    const HEIGHT_BIAS_VAR: &'static str = "BOX_STACKING_HEIGHT_BIAS";

    fn from_env() -> Self {
        let width = load_usize_with_warning(
            Self::GRID_WIDTH_VAR,
            ContainerConfig::DEFAULT_WIDTH,
            |value| value > 0,
            "must be greater than 0",
        );

        let height = load_usize_with_warning(
            Self::GRID_HEIGHT_VAR,
            ContainerConfig::DEFAULT_HEIGHT,
            |value| value > 0,
            "must be greater than 0",
        );

        let penalty_multiplier = load_f64_with_warning(
            Self::PENALTY_MULTIPLIER_VAR,
            ContainerConfig::DEFAULT_PENALTY_MULTIPLIER,
            |value| value.is_finite() && value > 1.0,
            "must be greater than 1",
            "Adjusted penalty multiplier changes how strongly unstable stacks are punished",
        );

        let flatness_tolerance = load_f64_with_warning(
            Self::FLATNESS_TOLERANCE_VAR,
            ContainerConfig::DEFAULT_FLATNESS_TOLERANCE,
            |value| value.is_finite() && value >= 0.0,
            "must not be negative",
            "Adjusted flatness tolerance may accept uneven surfaces as stable",
        );

        let height_bias = load_f64_with_warning(
            Self::HEIGHT_BIAS_VAR,
            Self::DEFAULT_HEIGHT_BIAS,
            |value| value.is_finite() && value > 0.0,
            "must be greater than 0",
            "Adjusted height bias scales every bounding volume score",
        );

        let container = ContainerConfig::builder()
            .width(width)
            .height(height)
            .penalty_multiplier(penalty_multiplier)
            .flatness_tolerance(flatness_tolerance)
            .build();

        Self {
            container,
            height_bias,
        }
    }

    /// Returns the configured ContainerConfig.
    pub fn container_config(&self) -> ContainerConfig {
        self.container
    }

    pub fn height_bias(&self) -> f64 {
        self.height_bias
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            container: ContainerConfig::default(),
            height_bias: Self::DEFAULT_HEIGHT_BIAS,
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            warn!("Access to {} failed: {}. Using default value.", name, err);
            None
        }
    }
}

fn parse_f64_with_warning(
    var_name: &str,
    raw: &str,
    default: f64,
    validator: impl Fn(f64) -> bool,
    invalid_hint: &str,
    warning: &str,
) -> f64 {
    match raw.parse::<f64>() {
        Ok(value) => {
            if !validator(value) {
                warn!(
                    "{} contains invalid value '{}': {}. Using {}.",
                    var_name, raw, invalid_hint, default
                );
                default
            } else {
                let tolerance = (default.abs().max(1.0)) * 1e-9;
                if (value - default).abs() > tolerance {
                    info!("{} ({} = {}).", warning, var_name, value);
                }
                value
            }
        }
        Err(err) => {
            warn!(
                "Could not parse {} ('{}') as number: {}. Using {}.",
                var_name, raw, err, default
            );
            default
        }
    }
}

fn load_f64_with_warning(
    var_name: &str,
    default: f64,
    validator: impl Fn(f64) -> bool,
    invalid_hint: &str,
    warning: &str,
) -> f64 {
    match env_string(var_name) {
        Some(raw) => {
            parse_f64_with_warning(var_name, &raw, default, validator, invalid_hint, warning)
        }
        None => default,
    }
}

fn parse_usize_with_warning(
    var_name: &str,
    raw: &str,
    default: usize,
    validator: impl Fn(usize) -> bool,
    invalid_hint: &str,
) -> usize {
    match raw.parse::<usize>() {
        Ok(value) if validator(value) => value,
        Ok(_) => {
            warn!(
                "{} contains invalid value '{}': {}. Using {}.",
                var_name, raw, invalid_hint, default
            );
            default
        }
        Err(err) => {
            warn!(
                "Could not parse {} ('{}') as integer: {}. Using {}.",
                var_name, raw, err, default
            );
            default
        }
    }
}

fn load_usize_with_warning(
    var_name: &str,
    default: usize,
    validator: impl Fn(usize) -> bool,
    invalid_hint: &str,
) -> usize {
    match env_string(var_name) {
        Some(raw) => parse_usize_with_warning(var_name, &raw, default, validator, invalid_hint),
        None => default,
    }
}
