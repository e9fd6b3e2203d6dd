//! Configuration vault – reads/writes `~/.skymcl/config.toml`.

use serde::{Deserialize, Serialize};
use skymcl_perception::{FrameIds, MotionNoise};
use skymcl_types::MclError;
use std::fs;
use std::path::{Path, PathBuf};

/// Diffusion noise scale per axis (the `[movement]` table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementConfig {
    #[serde(default = "default_std_dev")]
    pub x_std_dev: f64,
    #[serde(default = "default_std_dev")]
    pub y_std_dev: f64,
    #[serde(default = "default_std_dev")]
    pub z_std_dev: f64,
    #[serde(default = "default_std_dev")]
    pub roll_std_dev: f64,
    #[serde(default = "default_std_dev")]
    pub pitch_std_dev: f64,
    #[serde(default = "default_std_dev")]
    pub yaw_std_dev: f64,
}

/// Coordinate frames the transform buffer resolves against (`[frames]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramesConfig {
    #[serde(default = "default_world_frame")]
    pub world_frame_id: String,
    #[serde(default = "default_base_footprint_frame")]
    pub base_footprint_frame_id: String,
    #[serde(default = "default_base_link_frame")]
    pub base_link_frame_id: String,
}

/// Particle set and lookup tuning (`[filter]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_particle_count")]
    pub particle_count: usize,
    /// Noise seed; `0` seeds from OS entropy.
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,
    #[serde(default = "default_cache_window_s")]
    pub cache_window_s: f64,
}

/// Persisted configuration stored in `~/.skymcl/config.toml`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub movement: MovementConfig,
    #[serde(default)]
    pub frames: FramesConfig,
    #[serde(default)]
    pub filter: FilterConfig,
}

fn default_std_dev() -> f64 {
    0.2
}
fn default_world_frame() -> String {
    "world".to_string()
}
fn default_base_footprint_frame() -> String {
    "base_footprint".to_string()
}
fn default_base_link_frame() -> String {
    "base_link".to_string()
}
fn default_particle_count() -> usize {
    500
}
fn default_lookup_timeout_ms() -> u64 {
    100
}
fn default_cache_window_s() -> f64 {
    10.0
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            x_std_dev: default_std_dev(),
            y_std_dev: default_std_dev(),
            z_std_dev: default_std_dev(),
            roll_std_dev: default_std_dev(),
            pitch_std_dev: default_std_dev(),
            yaw_std_dev: default_std_dev(),
        }
    }
}

impl Default for FramesConfig {
    fn default() -> Self {
        Self {
            world_frame_id: default_world_frame(),
            base_footprint_frame_id: default_base_footprint_frame(),
            base_link_frame_id: default_base_link_frame(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            particle_count: default_particle_count(),
            seed: 0,
            lookup_timeout_ms: default_lookup_timeout_ms(),
            cache_window_s: default_cache_window_s(),
        }
    }
}

impl Config {
    pub fn noise(&self) -> MotionNoise {
        let m = &self.movement;
        MotionNoise {
            x_std_dev: m.x_std_dev,
            y_std_dev: m.y_std_dev,
            z_std_dev: m.z_std_dev,
            roll_std_dev: m.roll_std_dev,
            pitch_std_dev: m.pitch_std_dev,
            yaw_std_dev: m.yaw_std_dev,
        }
    }

    pub fn frame_ids(&self) -> FrameIds {
        FrameIds {
            world: self.frames.world_frame_id.clone(),
            base_footprint: self.frames.base_footprint_frame_id.clone(),
            base_link: self.frames.base_link_frame_id.clone(),
        }
    }

    /// `None` when the configured seed asks for OS entropy.
    pub fn seed(&self) -> Option<u64> {
        (self.filter.seed != 0).then_some(self.filter.seed)
    }

    /// # Errors
    ///
    /// Returns [`MclError::InvalidNoise`] for a bad standard deviation and
    /// [`MclError::Config`] for an empty particle set or an invalid window.
    pub fn validate(&self) -> Result<(), MclError> {
        self.noise().validate()?;
        if self.filter.particle_count == 0 {
            return Err(MclError::Config("particle_count must be at least 1".into()));
        }
        if !self.filter.cache_window_s.is_finite() || self.filter.cache_window_s < 0.0 {
            return Err(MclError::Config(format!(
                "cache_window_s must be a non-negative number, got {}",
                self.filter.cache_window_s
            )));
        }
        Ok(())
    }
}

/// Return the path to `~/.skymcl/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".skymcl").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, MclError> {
    load_from(&config_path())
}

/// Load the config from a specific path and apply env overrides.
pub fn load_from(path: &Path) -> Result<Option<Config>, MclError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        MclError::Config(format!("Failed to read config at {}: {}", path.display(), e))
    })?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| MclError::Config(format!("Failed to parse config: {}", e)))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `SKYMCL_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `SKYMCL_PARTICLES` | `filter.particle_count` |
/// | `SKYMCL_SEED` | `filter.seed` |
/// | `SKYMCL_LOOKUP_TIMEOUT_MS` | `filter.lookup_timeout_ms` |
/// | `SKYMCL_WORLD_FRAME` | `frames.world_frame_id` |
///
/// Unparseable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("SKYMCL_PARTICLES")
        && let Ok(n) = v.parse::<usize>()
    {
        cfg.filter.particle_count = n;
    }
    if let Ok(v) = std::env::var("SKYMCL_SEED")
        && let Ok(seed) = v.parse::<u64>()
    {
        cfg.filter.seed = seed;
    }
    if let Ok(v) = std::env::var("SKYMCL_LOOKUP_TIMEOUT_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.filter.lookup_timeout_ms = ms;
    }
    if let Ok(v) = std::env::var("SKYMCL_WORLD_FRAME") {
        cfg.frames.world_frame_id = v;
    }
}

/// Save the config to disk, creating `~/.skymcl/` if necessary.
pub fn save(cfg: &Config) -> Result<(), MclError> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), MclError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| MclError::Config(format!("Failed to create config directory: {}", e)))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(|e| {
                MclError::Config(format!("Failed to set config directory permissions: {}", e))
            })?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| MclError::Config(format!("Failed to serialize config: {}", e)))?;
    fs::write(path, raw).map_err(|e| {
        MclError::Config(format!("Failed to write config at {}: {}", path.display(), e))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_movement_model() {
        let cfg = Config::default();
        assert_eq!(cfg.noise(), MotionNoise::uniform(0.2));
        assert_eq!(cfg.frame_ids(), FrameIds::default());
        assert_eq!(cfg.filter.lookup_timeout_ms, 100);
        assert_eq!(cfg.seed(), None);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [movement]
            x_std_dev = 0.5
            yaw_std_dev = 0.05

            [frames]
            world_frame_id = "map"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.movement.x_std_dev, 0.5);
        assert_eq!(cfg.movement.y_std_dev, 0.2);
        assert_eq!(cfg.movement.yaw_std_dev, 0.05);
        assert_eq!(cfg.frames.world_frame_id, "map");
        assert_eq!(cfg.frames.base_link_frame_id, "base_link");
        assert_eq!(cfg.filter.particle_count, 500);
    }

    #[test]
    fn validate_rejects_negative_std_dev() {
        let mut cfg = Config::default();
        cfg.movement.roll_std_dev = -0.1;
        assert!(matches!(cfg.validate(), Err(MclError::InvalidNoise { .. })));
    }

    #[test]
    fn validate_rejects_empty_particle_set() {
        let mut cfg = Config::default();
        cfg.filter.particle_count = 0;
        assert!(matches!(cfg.validate(), Err(MclError::Config(_))));
    }

    #[test]
    fn nonzero_seed_is_deterministic() {
        let mut cfg = Config::default();
        cfg.filter.seed = 17;
        assert_eq!(cfg.seed(), Some(17));
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.movement, cfg.movement);
        assert_eq!(loaded.frames.base_link_frame_id, "base_link");
    }

    #[cfg(unix)]
    #[test]
    fn config_directory_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        save_to(&Config::default(), &path).expect("save");

        let meta = std::fs::metadata(path.parent().unwrap()).unwrap();
        let mode = meta.permissions().mode() & 0o777;
        assert_eq!(mode, 0o700);
    }

    #[test]
    fn config_path_points_to_skymcl_dir() {
        let p = config_path_for_home("/home/pilot");
        assert!(p.to_string_lossy().contains(".skymcl"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[movement\nx_std_dev = ").unwrap();
        assert!(matches!(load_from(&path), Err(MclError::Config(_))));
    }

    #[test]
    fn apply_env_overrides_changes_particles() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("SKYMCL_PARTICLES", "64") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.filter.particle_count, 64);
        unsafe { std::env::remove_var("SKYMCL_PARTICLES") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_seed() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("SKYMCL_SEED", "not-a-seed") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.filter.seed, 0);
        unsafe { std::env::remove_var("SKYMCL_SEED") };
    }

    #[test]
    fn apply_env_overrides_changes_world_frame() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("SKYMCL_WORLD_FRAME", "odom") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.frames.world_frame_id, "odom");
        unsafe { std::env::remove_var("SKYMCL_WORLD_FRAME") };
    }
}
