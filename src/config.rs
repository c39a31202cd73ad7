use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// The `CountNumberMatched` policy: whether `number_matched` is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "u8")]
pub enum CountPolicy {
    Never,
    Always,
    FirstPageOnly,
}

impl From<u8> for CountPolicy {
    fn from(value: u8) -> Self {
        match value {
            0 => CountPolicy::Never,
            2 => CountPolicy::FirstPageOnly,
            _ => CountPolicy::Always,
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    #[serde(default)]
    pub max_page_size_default: Option<u32>,
    #[serde(default)]
    pub max_page_size_geojson: Option<u32>,
    #[serde(default)]
    pub max_page_size_csv: Option<u32>,

    #[serde(default = "default_true")]
    pub capabilities_bounding_box: bool,
    #[serde(default)]
    pub use_db_rendering: bool,
    #[serde(default)]
    pub supported_crs_only: bool,
    #[serde(default = "default_count_policy")]
    pub count_number_matched: CountPolicy,
    #[serde(default)]
    pub wfs_strict_standard: bool,
    #[serde(default = "default_true")]
    pub wrap_filter_db_errors: bool,
    #[serde(default)]
    pub force_xy_epsg4326: bool,
    #[serde(default)]
    pub force_xy_old_crs: bool,
}

// Custom Debug implementation mirrors the field-by-field style used
// elsewhere in this codebase for config structs, even though nothing here
// is secret.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("base_url", &self.base_url)
            .field("default_page_size", &self.default_page_size)
            .field("max_page_size_default", &self.max_page_size_default)
            .field("max_page_size_geojson", &self.max_page_size_geojson)
            .field("max_page_size_csv", &self.max_page_size_csv)
            .field("capabilities_bounding_box", &self.capabilities_bounding_box)
            .field("use_db_rendering", &self.use_db_rendering)
            .field("supported_crs_only", &self.supported_crs_only)
            .field("count_number_matched", &self.count_number_matched)
            .field("wfs_strict_standard", &self.wfs_strict_standard)
            .field("wrap_filter_db_errors", &self.wrap_filter_db_errors)
            .field("force_xy_epsg4326", &self.force_xy_epsg4326)
            .field("force_xy_old_crs", &self.force_xy_old_crs)
            .finish()
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_page_size() -> u32 {
    5000
}

fn default_count_policy() -> CountPolicy {
    CountPolicy::Always
}

fn default_true() -> bool {
    true
}

impl Config {
    pub fn load() -> Result<Arc<Self>, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("WFS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Config = config.try_deserialize()?;
        Ok(Arc::new(settings))
    }

    /// Page size cap for a given output format, after applying the
    /// per-format override or falling back to the default cap.
    pub fn max_page_size(&self, format: &str) -> Option<u32> {
        match format {
            "geojson" => self.max_page_size_geojson,
            "csv" => self.max_page_size_csv,
            _ => self.max_page_size_default,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: default_host(),
            port: default_port(),
            base_url: default_base_url(),
            default_page_size: default_page_size(),
            max_page_size_default: None,
            max_page_size_geojson: None,
            max_page_size_csv: None,
            capabilities_bounding_box: true,
            use_db_rendering: false,
            supported_crs_only: false,
            count_number_matched: CountPolicy::Always,
            wfs_strict_standard: false,
            wrap_filter_db_errors: true,
            force_xy_epsg4326: false,
            force_xy_old_crs: false,
        }
    }
}
