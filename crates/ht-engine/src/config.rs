//! Search configuration: JSON file, then environment, then command line.

use ht_optimizer::{Prior, ScoringConfig, SearchSettings, SearchSpace, TrainerSettings};
use ht_types::{config_error, HtResult};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Overrides the checkpoint path.
pub const ENV_CHECKPOINT: &str = "HYPERTUNE_CHECKPOINT";
/// Overrides the search seed.
pub const ENV_SEED: &str = "HYPERTUNE_SEED";

/// External trainer invocation. The program receives the training
/// configuration as trailing `key=value` arguments and must print a JSON
/// object of metrics as its last line on stdout.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

/// Everything a `tune` invocation needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuneConfig {
    pub space: SearchSpace,
    pub trainer: TrainerSettings,
    pub command: TrainerCommand,
    pub scoring: ScoringConfig,
    pub search: SearchSettings,
    pub checkpoint_path: PathBuf,
    pub result_path: PathBuf,
    pub chart_path: PathBuf,
}

impl Default for TuneConfig {
    fn default() -> Self {
        Self {
            space: default_space(),
            trainer: TrainerSettings::default(),
            command: TrainerCommand::default(),
            scoring: ScoringConfig::default(),
            search: SearchSettings::default(),
            checkpoint_path: PathBuf::from("./checkpoint.json"),
            result_path: PathBuf::from("./result.json"),
            chart_path: PathBuf::from("./convergence.png"),
        }
    }
}

/// Momentum, initial learning rate and weight decay of a detection trainer.
pub fn default_space() -> SearchSpace {
    SearchSpace::new()
        .add_real("momentum", 0.8, 0.99, Prior::Uniform)
        .add_log_real("lr0", 0.001, 0.1)
        .add_log_real("weight_decay", 0.0001, 0.001)
}

impl TuneConfig {
    pub fn load(path: &Path) -> HtResult<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| config_error!("reading {}: {}", path.display(), e))?;
        serde_json::from_slice(&bytes).map_err(|e| config_error!("parsing {}: {}", path.display(), e))
    }

    /// Apply `HYPERTUNE_*` variables from the process environment.
    pub fn apply_env(&mut self) -> HtResult<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    pub fn apply_env_from<F>(&mut self, lookup: F) -> HtResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_CHECKPOINT).filter(|v| !v.is_empty()) {
            self.checkpoint_path = PathBuf::from(path);
        }
        if let Some(seed) = lookup(ENV_SEED).filter(|v| !v.is_empty()) {
            self.search.seed = seed
                .trim()
                .parse()
                .map_err(|e| config_error!("{}={:?} is not a valid seed: {}", ENV_SEED, seed, e))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> HtResult<()> {
        self.space.validate()?;
        self.trainer.check_names(self.space.names())?;
        if self.command.program.trim().is_empty() {
            return Err(config_error!("command.program is not set; no trainer to run"));
        }
        let outputs = [
            ("checkpoint", &self.checkpoint_path),
            ("result", &self.result_path),
            ("chart", &self.chart_path),
        ];
        for (i, (name, path)) in outputs.iter().enumerate() {
            for (other, other_path) in &outputs[i + 1..] {
                if normalize(path) == normalize(other_path) {
                    return Err(config_error!(
                        "{} and {} must be separate files, both are {}",
                        name,
                        other,
                        path.display()
                    ));
                }
            }
        }
        ht_report::check_chart_path(&self.chart_path)
    }
}

/// Lexical form used to compare output paths; drops `.` components.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Command-line overrides, applied last.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub calls: Option<usize>,
    pub random_starts: Option<usize>,
    pub seed: Option<u64>,
    pub checkpoint: Option<PathBuf>,
    pub result: Option<PathBuf>,
    pub chart: Option<PathBuf>,
}

impl Overrides {
    pub fn apply(self, config: &mut TuneConfig) {
        if let Some(n) = self.calls {
            config.search.n_calls = n;
        }
        if let Some(n) = self.random_starts {
            config.search.n_random_starts = n;
        }
        if let Some(seed) = self.seed {
            config.search.seed = seed;
        }
        if let Some(path) = self.checkpoint {
            config.checkpoint_path = path;
        }
        if let Some(path) = self.result {
            config.result_path = path;
        }
        if let Some(path) = self.chart {
            config.chart_path = path;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ht_types::HtError;
    use std::collections::HashMap;

    fn configured() -> TuneConfig {
        let mut config = TuneConfig::default();
        config.command.program = "train-and-validate".into();
        config
    }

    #[test]
    fn defaults_match_detection_search() {
        let config = TuneConfig::default();
        assert_eq!(config.search.n_calls, 75);
        assert_eq!(config.search.n_random_starts, 10);
        assert_eq!(config.search.seed, 0);
        assert_eq!(config.trainer.epochs, 100);
        assert_eq!(config.trainer.patience, 10);
        assert_eq!(config.space.names().collect::<Vec<_>>(), vec!["momentum", "lr0", "weight_decay"]);
        assert!(configured().validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tune.json");
        std::fs::write(
            &path,
            r#"{
                "command": {"program": "python", "args": ["train.py"]},
                "search": {"n_calls": 20},
                "trainer": {"data": "custom.yaml", "single_cls": true}
            }"#,
        )
        .unwrap();

        let config = TuneConfig::load(&path).unwrap();
        assert_eq!(config.command.args, vec!["train.py".to_string()]);
        assert_eq!(config.search.n_calls, 20);
        assert_eq!(config.search.n_random_starts, 10);
        assert_eq!(config.trainer.data, "custom.yaml");
        assert!(config.trainer.single_cls);
        assert_eq!(config.trainer.epochs, 100);
        assert_eq!(config.space, default_space());
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tune.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert!(matches!(TuneConfig::load(&path), Err(HtError::Config(_))));
        assert!(matches!(
            TuneConfig::load(&dir.path().join("missing.json")),
            Err(HtError::Config(_))
        ));
    }

    #[test]
    fn environment_overrides_file() {
        let env: HashMap<&str, &str> =
            [(ENV_CHECKPOINT, "/runs/ckpt.json"), (ENV_SEED, "42")].into_iter().collect();
        let mut config = configured();
        config
            .apply_env_from(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.checkpoint_path, PathBuf::from("/runs/ckpt.json"));
        assert_eq!(config.search.seed, 42);

        let mut config = configured();
        let err = config
            .apply_env_from(|k| (k == ENV_SEED).then(|| "forty-two".to_string()))
            .unwrap_err();
        assert!(matches!(err, HtError::Config(_)));
    }

    #[test]
    fn overrides_apply_last() {
        let mut config = configured();
        Overrides {
            calls: Some(5),
            seed: Some(9),
            chart: Some("out/chart.png".into()),
            ..Overrides::default()
        }
        .apply(&mut config);
        assert_eq!(config.search.n_calls, 5);
        assert_eq!(config.search.seed, 9);
        assert_eq!(config.chart_path, PathBuf::from("out/chart.png"));
        assert_eq!(config.result_path, PathBuf::from("./result.json"));
    }

    #[test]
    fn validation_catches_misconfiguration() {
        assert!(matches!(TuneConfig::default().validate(), Err(HtError::Config(_))));

        let mut same_paths = configured();
        same_paths.result_path = same_paths.checkpoint_path.clone();
        assert!(matches!(same_paths.validate(), Err(HtError::Config(_))));

        let mut chart_over_checkpoint = configured();
        chart_over_checkpoint.chart_path = PathBuf::from("checkpoint.json");
        assert!(matches!(chart_over_checkpoint.validate(), Err(HtError::Config(_))));

        let mut chart_over_result = configured();
        chart_over_result.result_path = PathBuf::from("out/run.png");
        chart_over_result.chart_path = PathBuf::from("./out/run.png");
        assert!(matches!(chart_over_result.validate(), Err(HtError::Config(_))));

        let mut jpeg_chart = configured();
        jpeg_chart.chart_path = PathBuf::from("convergence.jpg");
        assert!(matches!(jpeg_chart.validate(), Err(HtError::Report(_))));

        let mut shadowing = configured();
        shadowing.space = shadowing
            .space
            .add_integer("patience", 5, 50, Prior::Uniform);
        assert!(matches!(shadowing.validate(), Err(HtError::Objective(_))));

        let mut bad_space = configured();
        bad_space.space = SearchSpace::new();
        assert!(matches!(bad_space.validate(), Err(HtError::Space(_))));
    }
}
