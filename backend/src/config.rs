use std::env;
use std::str::FromStr;

use shared::HeatmapStyle;

/// Runtime settings, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_address: String,
    pub model_path: String,
    pub static_dir: String,
    pub heatmap_style: HeatmapStyle,
    pub heatmap_alpha: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = env::var("PORT").unwrap_or_else(|_| "8081".to_string());
        let bind_address = format!("0.0.0.0:{}", port);

        let model_path =
            env::var("MODEL_PATH").unwrap_or_else(|_| "mobilenetv2.safetensors".to_string());

        let static_dir = env::var("STATIC_DIR").unwrap_or_else(|_| default_static_dir());

        let heatmap_style = match env::var("HEATMAP_STYLE") {
            Ok(value) => parse_style(&value)?,
            Err(_) => HeatmapStyle::default(),
        };

        let heatmap_alpha = match env::var("HEATMAP_ALPHA") {
            Ok(value) => parse_alpha(&value)?,
            Err(_) => 0.5,
        };

        Ok(Self {
            bind_address,
            model_path,
            static_dir,
            heatmap_style,
            heatmap_alpha,
        })
    }
}

fn default_static_dir() -> String {
    if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
        format!("{}/../static", manifest_dir)
    } else {
        "/usr/src/app/static".to_string()
    }
}

fn parse_style(value: &str) -> Result<HeatmapStyle, ConfigError> {
    HeatmapStyle::from_str(value).map_err(|_| ConfigError::Invalid {
        name: "HEATMAP_STYLE",
        value: value.to_string(),
    })
}

fn parse_alpha(value: &str) -> Result<f32, ConfigError> {
    let alpha: f32 = value.parse().map_err(|_| ConfigError::Invalid {
        name: "HEATMAP_ALPHA",
        value: value.to_string(),
    })?;
    if !alpha.is_finite() {
        return Err(ConfigError::Invalid {
            name: "HEATMAP_ALPHA",
            value: value.to_string(),
        });
    }
    Ok(alpha.clamp(0.0, 1.0))
}
